use std::{any::Any, error::Error};

use crate::StatusCode;

/// Общий интерфейс ошибок клиента шины (object-safe).
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Код статуса; ошибка без доменного кода считается внутренней.
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    fn as_any(&self) -> &dyn Any;

    /// Сообщение, которое можно показать внешнему клиенту.
    ///
    /// Для внутренних ошибок детали (адреса брокеров, причины от
    /// транспорта) скрываются.
    fn client_message(&self) -> String {
        match self.status_code() {
            StatusCode::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Метки для логов: вид ошибки, код и доменные поля (тема, адрес).
    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![("status_code", self.status_code().code().to_string())]
    }
}

/// Склеивает метки в строку `key=value` через пробел.
pub fn format_tags(tags: &[(&'static str, String)]) -> String {
    tags.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use super::*;

    #[derive(Debug)]
    struct Opaque;

    impl fmt::Display for Opaque {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "nats://10.0.0.1:4222 refused")
        }
    }

    impl Error for Opaque {}

    impl ErrorExt for Opaque {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Тест проверяет, что ошибка без кода внутренняя и её детали скрыты.
    #[test]
    fn test_default_is_internal_and_hidden() {
        assert_eq!(Opaque.status_code(), StatusCode::Internal);
        assert_eq!(Opaque.client_message(), "Internal server error");
        assert_eq!(format_tags(&Opaque.metrics_tags()), "status_code=1003");
    }

    #[test]
    fn test_format_tags() {
        let tags = [("kind", "bus_publish".to_string()), ("topic", "a.b".to_string())];
        assert_eq!(format_tags(&tags), "kind=bus_publish topic=a.b");
        assert_eq!(format_tags(&[]), "");
    }
}
