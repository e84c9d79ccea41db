use std::{fmt, sync::Arc};

use busline_error::ConnectionError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::{drain::ShutdownToken, lifecycle};
use crate::{
    config::BusConfig,
    transport::{ConnectOptions, Connector, Transport, TransportError},
};

/// Состояние соединения в его жизненном цикле.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Соединение устанавливается
    Connecting,
    /// Соединение активно
    Connected,
    /// Связь потеряна, транспорт переподключается
    Disconnected,
    /// Идёт drain: новые подписки и публикации не принимаются
    Draining,
    /// Соединение закрыто окончательно
    Closed,
}

/// Соединение с шиной.
///
/// Одно на экземпляр клиента. Владеет транспортом, состоянием жизненного
/// цикла и токеном завершения, который освобождается по событию
/// `Closed`.
pub struct Connection {
    client_id: String,
    name: String,
    transport: Arc<dyn Transport>,
    state: Arc<watch::Sender<ConnectionState>>,
    shutdown: ShutdownToken,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }

    /// Принимает ли соединение новые подписки и публикации.
    pub fn accepts_work(&self) -> bool {
        !matches!(self, Self::Draining | Self::Closed)
    }
}

impl Connection {
    /// Проверяет конфигурацию, назначает id клиента, подключается и
    /// запускает задачу наблюдения за жизненным циклом.
    ///
    /// # Ошибки
    /// - `ConnectionError::InvalidConfig`: нет адресов или имени
    /// - `ConnectionError::Transport` / `Timeout` / `AuthenticationFailed`:
    ///   транспорт не смог подключиться; повторов нет
    pub async fn open(
        config: &BusConfig,
        connector: &dyn Connector,
    ) -> Result<Arc<Self>, ConnectionError> {
        config.validate()?;

        let client_id = config.resolve_client_id();
        let mut options = ConnectOptions::from_config(config, client_id.clone());
        options.addresses = config.addresses();
        let addresses = options.joined_addresses();

        debug!(%client_id, %addresses, "Connecting to bus");

        let (state, _) = watch::channel(ConnectionState::Connecting);
        let state = Arc::new(state);
        let shutdown = ShutdownToken::new();
        shutdown.acquire();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connect = connector.connect(&options, events_tx);
        let transport = tokio::time::timeout(options.connect_timeout, connect)
            .await
            .map_err(|_| ConnectionError::Timeout {
                addresses: addresses.clone(),
            })?
            .map_err(|e| {
                warn!(%client_id, %addresses, error = %e, "Connect to bus failed");
                connect_error(e, &addresses)
            })?;

        state.send_replace(ConnectionState::Connected);
        tokio::spawn(lifecycle::run(
            client_id.clone(),
            events_rx,
            state.clone(),
            shutdown.clone(),
        ));

        info!(%client_id, name = %config.name, %addresses, "Connected to bus");

        Ok(Arc::new(Self {
            client_id,
            name: config.name.clone(),
            transport,
            state,
            shutdown,
        }))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Подписка на изменения состояния.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn shutdown_token(&self) -> &ShutdownToken {
        &self.shutdown
    }

    /// Переводит `Connected`/`Disconnected` в `Draining`.
    ///
    /// Возвращает прежнее состояние или текущее, если переход невозможен.
    pub(crate) fn begin_drain(&self) -> Result<ConnectionState, ConnectionState> {
        let mut result = Err(ConnectionState::Closed);
        self.state.send_if_modified(|state| match *state {
            ConnectionState::Connected | ConnectionState::Disconnected => {
                result = Ok(*state);
                *state = ConnectionState::Draining;
                true
            }
            other => {
                result = Err(other);
                false
            }
        });
        result
    }

    /// Возвращает состояние после неудачного drain, если его никто не
    /// поменял.
    pub(crate) fn abort_drain(
        &self,
        previous: ConnectionState,
    ) {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Draining {
                *state = previous;
                true
            } else {
                false
            }
        });
    }
}

fn connect_error(
    err: TransportError,
    addresses: &str,
) -> ConnectionError {
    match err {
        TransportError::Auth { reason } => ConnectionError::AuthenticationFailed { reason },
        TransportError::Timeout { addresses } => ConnectionError::Timeout { addresses },
        TransportError::Connect { addresses, reason } => {
            ConnectionError::Transport { addresses, reason }
        }
        other => ConnectionError::Transport {
            addresses: addresses.to_string(),
            reason: other.to_string(),
        },
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for ConnectionState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Connection {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Connection")
            .field("client_id", &self.client_id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
