use std::{sync::Arc, time::Duration};

use busline_error::{BuslineResult, ResultExt};
use bytes::Bytes;
use tokio::sync::watch;
use tracing::info;

use super::{
    report, Connection, ConnectionState, DispatchSnapshot, DrainCoordinator, MessageHandler,
    PublishGateway, Subscription, SubscriptionInfo, SubscriptionRegistry,
};
use crate::{
    config::BusConfig,
    message::Headers,
    trace::TraceContext,
    transport::Connector,
};

/// Клиент шины сообщений.
///
/// Высокоуровневый интерфейс: одно соединение, публикация с
/// трассировочными заголовками, подписки и синхронный drain.
pub struct BusClient {
    connection: Arc<Connection>,
    publisher: PublishGateway,
    registry: SubscriptionRegistry,
    drainer: DrainCoordinator,
}

impl BusClient {
    /// Подключается к шине через `connector`.
    pub async fn connect(
        config: &BusConfig,
        connector: &dyn Connector,
    ) -> BuslineResult<Self> {
        info!(name = %config.name, "Connecting bus client");

        let connection = logged(
            "connect",
            Connection::open(config, connector)
                .await
                .context("open bus connection"),
        )?;

        Ok(Self {
            publisher: PublishGateway::new(connection.clone()),
            registry: SubscriptionRegistry::new(connection.clone()),
            drainer: DrainCoordinator::new(connection.clone()),
            connection,
        })
    }

    /// Подключается к серверу NATS.
    #[cfg(feature = "nats")]
    pub async fn connect_nats(config: &BusConfig) -> BuslineResult<Self> {
        Self::connect(config, &crate::transport::nats::NatsConnector).await
    }

    pub fn client_id(&self) -> &str {
        self.connection.client_id()
    }

    pub fn name(&self) -> &str {
        self.connection.name()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.connection.state_changes()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Публикует сообщение; см. [`PublishGateway::publish`].
    pub async fn publish(
        &self,
        trace: &TraceContext,
        topic: &str,
        headers: Option<Headers>,
        payload: impl Into<Bytes>,
    ) -> BuslineResult<()> {
        let result = self
            .publisher
            .publish(trace, topic, headers, payload)
            .await
            .context("publish message");
        logged("publish", result)
    }

    /// Широковещательная подписка на `topic`.
    pub async fn subscribe(
        &self,
        topic: &str,
        handler: impl MessageHandler,
    ) -> BuslineResult<()> {
        let result = self
            .registry
            .subscribe(topic, handler)
            .await
            .context("subscribe");
        logged("subscribe", result)
    }

    /// Регистрирует набор подписок; см.
    /// [`SubscriptionRegistry::register_group`].
    pub async fn register_group(
        &self,
        subscriptions: Vec<Subscription>,
    ) -> BuslineResult<()> {
        let result = self
            .registry
            .register_group(subscriptions)
            .await
            .context("register subscription group");
        logged("register_group", result)
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.registry.subscriptions()
    }

    pub fn dispatch_stats(&self) -> DispatchSnapshot {
        self.registry.stats()
    }

    /// Дожидается полного закрытия соединения.
    pub async fn drain(&self) -> BuslineResult<()> {
        logged("drain", self.drainer.drain().await.context("drain connection"))
    }

    /// Drain с ограничением ожидания; после таймаута используйте
    /// [`BusClient::wait_closed`].
    pub async fn drain_timeout(
        &self,
        timeout: Duration,
    ) -> BuslineResult<()> {
        let result = self
            .drainer
            .drain_timeout(timeout)
            .await
            .context("drain connection");
        logged("drain", result)
    }

    /// Ждёт закрытия соединения, начатого ранее через drain.
    pub async fn wait_closed(&self) {
        self.drainer.wait_closed().await;
    }
}

/// Логирует ошибку операции и возвращает результат без изменений.
fn logged<T>(
    operation: &'static str,
    result: BuslineResult<T>,
) -> BuslineResult<T> {
    result.inspect_err(|err| report::operation_failed(operation, err))
}

impl std::fmt::Debug for BusClient {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("BusClient")
            .field("connection", &self.connection)
            .field("subscriptions", &self.subscriptions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use busline_error::{ConnectionError, PublishError, StatusCode};

    use super::*;
    use crate::transport::MemoryBus;

    fn config() -> BusConfig {
        BusConfig {
            address: vec!["memory://local".into()],
            name: "facade".into(),
            client_id: Some("facade-1".into()),
            ..BusConfig::default()
        }
    }

    /// Тест проверяет полный цикл: подключение, публикация, drain.
    #[tokio::test]
    async fn test_lifecycle() {
        let bus = MemoryBus::new();
        let client = BusClient::connect(&config(), &bus.connector())
            .await
            .unwrap();
        assert_eq!(client.client_id(), "facade-1");
        assert_eq!(client.state(), ConnectionState::Connected);

        client
            .publish(&TraceContext::new(), "t", None, Bytes::new())
            .await
            .unwrap();
        client.drain().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Closed);

        let err = client
            .publish(&TraceContext::new(), "t", None, Bytes::new())
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<PublishError>().is_some());
        assert_eq!(err.status_code(), StatusCode::Internal);
    }

    /// Тест проверяет, что ошибка подключения несёт контекст и исходный
    /// тип.
    #[tokio::test]
    async fn test_connect_error_context() {
        let bus = MemoryBus::new();
        bus.refuse_connections(true);
        let err = BusClient::connect(&config(), &bus.connector())
            .await
            .unwrap_err();
        assert_eq!(err.frames()[0].message, "open bus connection");
        assert!(matches!(
            err.downcast_ref::<ConnectionError>(),
            Some(ConnectionError::Transport { .. })
        ));
        assert_eq!(err.status_code(), StatusCode::ConnectionFailed);
    }
}
