//! Транспортный шов между клиентом и конкретной шиной сообщений.
//!
//! Клиент работает только с трейтами [`Connector`] и [`Transport`]. Шина
//! сообщает о смене состояния соединения через канал [`TransportEvent`],
//! который читает одна задача жизненного цикла.

pub mod memory;
#[cfg(feature = "nats")]
pub mod nats;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::{MemoryBus, MemoryConnector, MemoryTransport};

use crate::{
    config::BusConfig,
    message::{InboundMessage, OutboundMessage},
};

/// Поток входящих сообщений одной подписки.
pub type MessageStream = BoxStream<'static, InboundMessage>;

/// Сторона отправки событий жизненного цикла.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Событие жизненного цикла соединения, приходящее от транспорта.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Соединение восстановлено после обрыва.
    Reconnected,
    /// Соединение потеряно; `error` пуст при штатном отключении.
    Disconnected { error: Option<String> },
    /// Асинхронная ошибка транспорта (например, медленный потребитель).
    Error {
        subject: Option<String>,
        reason: String,
    },
    /// Соединение закрыто окончательно. Приходит после завершения drain.
    Closed,
}

/// Ошибки транспортного уровня.
///
/// Клиент переводит их в доменные ошибки `busline-error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("cannot connect to {addresses}: {reason}")]
    Connect { addresses: String, reason: String },

    #[error("authentication failed: {reason}")]
    Auth { reason: String },

    #[error("connect to {addresses} timed out")]
    Timeout { addresses: String },

    #[error("connection is closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// Параметры подключения, которые видит транспорт.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub addresses: Vec<String>,
    /// Имя соединения, видимое на стороне сервера.
    pub name: String,
    pub client_id: String,
    pub account: Option<String>,
    pub password: Option<String>,
    /// Предел переподключений; при `None` без ограничения.
    pub max_reconnects: Option<usize>,
    pub reconnect_wait: Duration,
    pub connect_timeout: Duration,
}

/// Установленное соединение с шиной.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Отправляет сообщение. Повторов на этом уровне нет.
    async fn publish(
        &self,
        msg: OutboundMessage,
    ) -> Result<(), TransportError>;

    /// Подписывается на тему. При `group = Some(..)` каждое сообщение
    /// получает ровно один участник группы.
    async fn subscribe(
        &self,
        topic: &str,
        group: Option<&str>,
    ) -> Result<MessageStream, TransportError>;

    /// Перестаёт принимать новые сообщения, сбрасывает буфер публикаций и
    /// закрывает соединение. Завершение сообщается событием
    /// [`TransportEvent::Closed`].
    async fn drain(&self) -> Result<(), TransportError>;
}

/// Фабрика соединений.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        options: &ConnectOptions,
        events: EventSender,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ConnectOptions {
    /// Собирает параметры из конфигурации и уже выбранного id клиента.
    pub fn from_config(
        config: &BusConfig,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            addresses: config.address.clone(),
            name: config.name.clone(),
            client_id: client_id.into(),
            account: config.account.clone().filter(|a| !a.is_empty()),
            password: config.password.clone().filter(|p| !p.is_empty()),
            max_reconnects: config.reconnect.max_reconnects,
            reconnect_wait: Duration::from_millis(config.reconnect.wait_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }

    /// Адреса одной строкой, через запятую.
    pub fn joined_addresses(&self) -> String {
        self.addresses.join(",")
    }
}
