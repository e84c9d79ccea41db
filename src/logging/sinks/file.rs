use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::Layer, registry::LookupSpan};

use crate::logging::config::FileConfig;

/// Файловый layer с ежедневной ротацией и неблокирующей записью.
///
/// Возвращённый `WorkerGuard` нужно держать живым: при его удалении
/// буфер сбрасывается на диск.
pub fn layer_with_config<S>(config: &FileConfig) -> (Box<dyn Layer<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = rolling::daily(&config.dir, &config.prefix);
    let (writer, guard) = non_blocking(appender);

    let layer: Box<dyn Layer<S> + Send + Sync> = if config.json {
        Box::new(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer),
        )
    } else {
        Box::new(fmt::layer().with_ansi(false).with_writer(writer))
    };

    (layer, guard)
}
