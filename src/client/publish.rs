use std::sync::Arc;

use busline_error::PublishError;
use bytes::Bytes;
use tracing::debug;

use super::connection::Connection;
use crate::{
    message::{Headers, OutboundMessage},
    trace::{MessageContextBuilder, TraceContext, REQUEST_ID_HEADER},
};

/// Отправка сообщений с трассировочными заголовками.
#[derive(Debug, Clone)]
pub struct PublishGateway {
    connection: Arc<Connection>,
}

impl PublishGateway {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    /// Публикует `payload` в `topic`.
    ///
    /// Заголовки всегда содержат `request_id` и `time` из `trace`
    /// (новый id и текущее время, если их там нет). Заголовки вызывающего
    /// добавляются после и могут их перезаписать. Повторов нет.
    pub async fn publish(
        &self,
        trace: &TraceContext,
        topic: &str,
        extra_headers: Option<Headers>,
        payload: impl Into<Bytes>,
    ) -> Result<(), PublishError> {
        if topic.is_empty() {
            return Err(PublishError::InvalidTopic);
        }
        if !self.connection.state().accepts_work() {
            return Err(PublishError::ConnectionClosed {
                topic: topic.to_string(),
            });
        }

        let mut headers = Headers::new();
        MessageContextBuilder::inject(trace, &mut headers);
        if let Some(extra) = extra_headers {
            headers.merge(extra);
        }

        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .unwrap_or_default()
            .to_string();
        let msg = OutboundMessage::new(topic, headers, payload);

        self.connection
            .transport()
            .publish(msg)
            .await
            .map_err(|e| PublishError::Transport {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        debug!(topic, %request_id, "Message published");
        Ok(())
    }
}
