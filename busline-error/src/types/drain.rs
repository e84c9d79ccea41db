use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки graceful shutdown (drain).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrainError {
    /// Drain вызван в неподходящем состоянии (повторно или после закрытия)
    #[error("Cannot drain connection in state {state}")]
    InvalidState { state: String },
    /// Транспорт не смог сбросить буферы
    #[error("Fail to drain connection: {reason}")]
    Flush { reason: String },
    /// Событие закрытия не пришло за отведённое время
    #[error("Connection was not closed within {waited_ms}ms")]
    Timeout { waited_ms: u64 },
}

impl ErrorExt for DrainError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidState { .. } => StatusCode::InvalidOperation,
            Self::Flush { .. } => StatusCode::Internal,
            Self::Timeout { .. } => StatusCode::Timeout,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("kind", "bus_drain".to_string()),
            ("status_code", self.status_code().code().to_string()),
        ]
    }
}
