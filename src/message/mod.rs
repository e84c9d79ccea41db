//! Сообщения шины: заголовки и входящие/исходящие сообщения.

pub mod headers;

use std::sync::Arc;

use bytes::Bytes;
pub use headers::Headers;

/// Сообщение, полученное из шины.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Тема, на которую было опубликовано сообщение.
    pub topic: Arc<str>,
    pub headers: Headers,
    /// Непрозрачная полезная нагрузка.
    pub payload: Bytes,
}

/// Сообщение, отправляемое в шину.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub topic: String,
    pub headers: Headers,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(
        topic: impl Into<Arc<str>>,
        headers: Headers,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            topic: topic.into(),
            headers,
            payload: payload.into(),
        }
    }
}

impl OutboundMessage {
    pub fn new(
        topic: impl Into<String>,
        headers: Headers,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            topic: topic.into(),
            headers,
            payload: payload.into(),
        }
    }

    /// Превращает исходящее сообщение во входящее, как его увидит
    /// подписчик.
    pub fn into_inbound(self) -> InboundMessage {
        InboundMessage {
            topic: Arc::from(self.topic),
            headers: self.headers,
            payload: self.payload,
        }
    }
}
