use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки регистрации подписок.
///
/// При пакетной регистрации ошибка указывает на первую неудавшуюся
/// подписку; уже зарегистрированные подписки остаются активными.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// Пустое имя темы
    #[error("Cannot subscribe: topic must not be empty")]
    InvalidTopic,
    /// Соединение дренируется или уже закрыто
    #[error("Cannot subscribe to '{topic}': connection is closed")]
    ConnectionClosed { topic: String },
    /// Транспорт отклонил подписку
    #[error("Fail to subscribe to '{topic}'{}: {reason}", group_suffix(.group))]
    Registration {
        topic: String,
        group: Option<String>,
        reason: String,
    },
}

impl SubscriptionError {
    /// Тема, на которой произошла ошибка (если известна).
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::InvalidTopic => None,
            Self::ConnectionClosed { topic } | Self::Registration { topic, .. } => Some(topic),
        }
    }
}

fn group_suffix(group: &Option<String>) -> String {
    group
        .as_deref()
        .map(|g| format!(" (group '{g}')"))
        .unwrap_or_default()
}

impl ErrorExt for SubscriptionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidTopic => StatusCode::InvalidArgs,
            Self::ConnectionClosed { .. } | Self::Registration { .. } => StatusCode::Internal,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("kind", "bus_subscription".to_string()),
            ("status_code", self.status_code().code().to_string()),
        ];
        if let Some(topic) = self.topic() {
            tags.push(("topic", topic.to_string()));
        }
        tags
    }
}
