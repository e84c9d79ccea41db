use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки установления соединения с шиной.
///
/// Любая из них фатальна для экземпляра клиента: повторные попытки
/// подключения не выполняются на этом уровне.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Некорректная конфигурация подключения
    #[error("Invalid bus configuration: {reason}")]
    InvalidConfig { reason: String },
    /// Транспорт не удалось установить
    #[error("Failed to connect to {addresses}: {reason}")]
    Transport { addresses: String, reason: String },
    /// Таймаут подключения
    #[error("Connection timeout to {addresses}")]
    Timeout { addresses: String },
    /// Брокер отверг учётные данные
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },
}

impl ErrorExt for ConnectionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidConfig { .. } => StatusCode::InvalidArgs,
            Self::Transport { .. } => StatusCode::ConnectionFailed,
            Self::Timeout { .. } => StatusCode::Timeout,
            Self::AuthenticationFailed { .. } => StatusCode::InvalidCredentials,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::InvalidConfig { reason } => format!("Invalid bus configuration: {reason}"),
            Self::Transport { .. } => "Message bus unavailable".to_string(),
            Self::Timeout { .. } => "Connection timeout".to_string(),
            Self::AuthenticationFailed { .. } => "Authentication failed".to_string(),
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("kind", "bus_connection".to_string()),
            ("status_code", self.status_code().code().to_string()),
        ];

        if let Self::Transport { addresses, .. } | Self::Timeout { addresses } = self {
            tags.push(("addresses", addresses.clone()));
        }

        tags
    }
}
