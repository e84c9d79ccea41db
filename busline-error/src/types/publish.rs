use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки публикации сообщений.
///
/// Клиент никогда не повторяет публикацию сам: политика повторов остаётся
/// за вызывающей стороной.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Пустое имя темы
    #[error("Cannot publish: topic must not be empty")]
    InvalidTopic,
    /// Соединение дренируется или уже закрыто
    #[error("Cannot publish to '{topic}': connection is closed")]
    ConnectionClosed { topic: String },
    /// Транспорт не смог отправить сообщение
    #[error("Fail to publish to '{topic}': {reason}")]
    Transport { topic: String, reason: String },
}

impl ErrorExt for PublishError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidTopic => StatusCode::InvalidArgs,
            Self::ConnectionClosed { .. } | Self::Transport { .. } => StatusCode::Internal,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("kind", "bus_publish".to_string()),
            ("status_code", self.status_code().code().to_string()),
        ];

        if let Self::ConnectionClosed { topic } | Self::Transport { topic, .. } = self {
            tags.push(("topic", topic.clone()));
        }

        tags
    }
}
