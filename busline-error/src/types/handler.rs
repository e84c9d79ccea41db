use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Сбой пользовательского обработчика сообщения.
///
/// Никогда не пробрасывается за границу диспетчеризации: только
/// логируется вместе с темой и request id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerFault {
    /// Обработчик вернул ошибку
    #[error("channel: {topic}, error: {reason}")]
    Failed {
        topic: String,
        request_id: String,
        reason: String,
    },
    /// Обработчик запаниковал
    #[error("channel: {topic}, panic: {message}")]
    Panicked {
        topic: String,
        request_id: String,
        message: String,
    },
}

impl HandlerFault {
    pub fn topic(&self) -> &str {
        match self {
            Self::Failed { topic, .. } | Self::Panicked { topic, .. } => topic,
        }
    }
}

impl ErrorExt for HandlerFault {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Failed { .. } => StatusCode::HandlerFailed,
            Self::Panicked { .. } => StatusCode::HandlerPanicked,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("kind", "bus_handler".to_string()),
            ("status_code", self.status_code().code().to_string()),
            ("topic", self.topic().to_string()),
        ]
    }
}
