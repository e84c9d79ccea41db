//! Клиент шины publish/subscribe.
//!
//! Управляет жизненным циклом соединения, доставляет входящие сообщения
//! обработчикам (в том числе через очереди), переносит трассировочные
//! метаданные в заголовках и обеспечивает синхронное завершение работы.

/// Connection, publishing, subscriptions, handler isolation, drain.
pub mod client;
/// Bus configuration loading.
pub mod config;
/// Flexible logging (filters, console and file sinks).
pub mod logging;
/// Message headers and inbound/outbound messages.
pub mod message;
/// Trace propagation: request ids, timestamps, per-message context.
pub mod trace;
/// Transport seam: traits, lifecycle events, in-memory and NATS transports.
pub mod transport;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Error taxonomy shared with callers.
pub use busline_error::{
    BuslineResult, ConnectionError, DrainError, ErrorExt, HandlerFault, PublishError, StackError,
    StatusCode, SubscriptionError,
};
/// Client facade and its components.
pub use client::{
    BusClient, Connection, ConnectionState, DispatchSnapshot, DrainCoordinator, HandlerOutcome,
    MessageHandler, PublishGateway, RecoveryWrapper, ShutdownToken, Subscription,
    SubscriptionInfo, SubscriptionRegistry,
};
/// Configuration.
pub use config::{BusConfig, ReconnectPolicy};
/// Logging.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Messages.
pub use message::{Headers, InboundMessage, OutboundMessage};
/// Trace propagation.
pub use trace::{MessageContext, MessageContextBuilder, TraceContext, HANDLER_DEADLINE};
/// Transports.
pub use transport::{Connector, MemoryBus, Transport, TransportEvent};
