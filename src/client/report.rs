//! Логирование ошибок клиента на уровне, который задаёт их код статуса.

use busline_error::{format_tags, ErrorExt, HandlerFault, LogLevel, StackError};

macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Info => tracing::info!($($arg)+),
            LogLevel::Warn => tracing::warn!($($arg)+),
            LogLevel::Error => tracing::error!($($arg)+),
        }
    };
}

/// Сбой обработчика: ошибка уходит в лог как предупреждение, паника как
/// ошибка вместе с backtrace.
pub(crate) fn handler_fault(
    fault: &HandlerFault,
    backtrace: Option<&str>,
) {
    let code = fault.status_code();
    let tags = format_tags(&fault.metrics_tags());
    match backtrace {
        Some(backtrace) => event_at!(
            code.log_level(),
            code = code.code(),
            tags = %tags,
            backtrace,
            "{fault}"
        ),
        None => event_at!(code.log_level(), code = code.code(), tags = %tags, "{fault}"),
    }
}

/// Ошибка операции фасада перед возвратом вызывающему коду.
pub(crate) fn operation_failed(
    operation: &'static str,
    err: &StackError,
) {
    let tags = format_tags(&err.metrics_tags());
    event_at!(
        err.log_level(),
        operation,
        code = err.status_code().code(),
        tags = %tags,
        "{err}"
    );
}
