//! Транспорт поверх NATS (`async-nats`).

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_nats::{
    header::HeaderMap, ConnectErrorKind, Event, Message as NatsMessage,
};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use super::{
    ConnectOptions, Connector, EventSender, MessageStream, Transport, TransportError,
    TransportEvent,
};
use crate::message::{Headers, InboundMessage, OutboundMessage};

/// Подключение к серверу NATS.
#[derive(Debug, Clone, Copy, Default)]
pub struct NatsConnector;

/// Соединение с сервером NATS.
pub struct NatsTransport {
    client: async_nats::Client,
}

#[async_trait]
impl Connector for NatsConnector {
    async fn connect(
        &self,
        options: &ConnectOptions,
        events: EventSender,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let addresses = options.joined_addresses();
        let wait = options.reconnect_wait;
        let connected_once = Arc::new(AtomicBool::new(false));

        let mut builder = async_nats::ConnectOptions::new()
            .name(&options.name)
            .max_reconnects(options.max_reconnects)
            .connection_timeout(options.connect_timeout)
            .reconnect_delay_callback(move |_attempts| wait)
            .event_callback(move |event| {
                let events = events.clone();
                let connected_once = connected_once.clone();
                async move {
                    if let Some(event) = map_event(event, &connected_once) {
                        let _ = events.send(event);
                    }
                }
            });

        if let (Some(user), Some(pass)) = (&options.account, &options.password) {
            builder = builder.user_and_password(user.clone(), pass.clone());
        }

        let client = builder
            .connect(addresses.as_str())
            .await
            .map_err(|e| match e.kind() {
                ConnectErrorKind::Authentication | ConnectErrorKind::AuthorizationViolation => {
                    TransportError::Auth {
                        reason: e.to_string(),
                    }
                }
                ConnectErrorKind::TimedOut => TransportError::Timeout {
                    addresses: addresses.clone(),
                },
                _ => TransportError::Connect {
                    addresses: addresses.clone(),
                    reason: e.to_string(),
                },
            })?;

        debug!(client_id = %options.client_id, %addresses, "NATS transport connected");
        Ok(Arc::new(NatsTransport { client }))
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn publish(
        &self,
        msg: OutboundMessage,
    ) -> Result<(), TransportError> {
        let mut headers = HeaderMap::new();
        for (key, values) in msg.headers.iter() {
            for value in values {
                headers.append(key, value.as_str());
            }
        }
        self.client
            .publish_with_headers(msg.topic, headers, msg.payload)
            .await
            .map_err(|e| TransportError::Other(e.to_string()))
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: Option<&str>,
    ) -> Result<MessageStream, TransportError> {
        let subscriber = match group {
            Some(group) => {
                self.client
                    .queue_subscribe(topic.to_string(), group.to_string())
                    .await
            }
            None => self.client.subscribe(topic.to_string()).await,
        }
        .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(subscriber.map(into_inbound).boxed())
    }

    async fn drain(&self) -> Result<(), TransportError> {
        self.client
            .drain()
            .await
            .map_err(|e| TransportError::Other(e.to_string()))
    }
}

/// Первое `Connected` относится к начальному подключению и пропускается;
/// каждое следующее означает восстановление связи.
fn map_event(
    event: Event,
    connected_once: &AtomicBool,
) -> Option<TransportEvent> {
    match event {
        Event::Connected => connected_once
            .swap(true, Ordering::AcqRel)
            .then_some(TransportEvent::Reconnected),
        Event::Disconnected => Some(TransportEvent::Disconnected { error: None }),
        Event::Closed => Some(TransportEvent::Closed),
        Event::SlowConsumer(sid) => Some(TransportEvent::Error {
            subject: None,
            reason: format!("slow consumer, sid {sid}"),
        }),
        Event::ServerError(err) => Some(TransportEvent::Error {
            subject: None,
            reason: err.to_string(),
        }),
        Event::ClientError(err) => Some(TransportEvent::Error {
            subject: None,
            reason: err.to_string(),
        }),
        _ => None,
    }
}

fn into_inbound(msg: NatsMessage) -> InboundMessage {
    let mut headers = Headers::new();
    if let Some(map) = &msg.headers {
        for (name, values) in map.iter() {
            for value in values {
                headers.append(name.to_string(), value.as_str());
            }
        }
    }
    InboundMessage::new(msg.subject.as_str(), headers, msg.payload)
}
