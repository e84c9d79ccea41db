//! Конфигурация клиента шины.

pub mod settings;

pub use settings::*;
