use std::fmt;

/// Коды статуса ошибок клиента шины.
///
/// # Диапазоны:
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки состояния
/// - 3xxx: Учётные данные
/// - 6xxx: Сеть
/// - 9xxx: Обработка сообщений
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    Internal = 1003,
    InvalidArgs = 1004,

    InvalidOperation = 2003,

    InvalidCredentials = 3002,

    Timeout = 6002,
    ConnectionFailed = 6004,

    HandlerFailed = 9000,
    HandlerPanicked = 9001,
}

/// Уровень, на котором ошибку с данным кодом стоит логировать.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Рекомендуемый уровень логирования.
    ///
    /// Ошибка пользовательского обработчика и ошибки вызывающей стороны
    /// не считаются сбоем клиента; паника обработчика считается.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::InvalidArgs => LogLevel::Info,
            Self::InvalidOperation | Self::Timeout | Self::HandlerFailed => LogLevel::Warn,
            Self::Internal
            | Self::InvalidCredentials
            | Self::ConnectionFailed
            | Self::HandlerPanicked => LogLevel::Error,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
