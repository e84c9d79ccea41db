//! Распространение трассировочных метаданных через заголовки сообщений.
//!
//! - `request_id`: генерация идентификаторов запросов.
//! - `time`: источник времени в миллисекундах от эпохи.
//! - `context`: типизированный контекст распространения и построитель
//!   контекста выполнения для входящих сообщений.

pub mod context;
pub mod request_id;
pub mod time;

pub use context::*;
pub use request_id::new_request_id;
pub use time::{elapsed_millis, now_millis};

/// Заголовок с идентификатором запроса.
pub const REQUEST_ID_HEADER: &str = "request_id";
/// Заголовок с временем отправки (epoch millis, десятичная строка).
pub const TIME_HEADER: &str = "time";
