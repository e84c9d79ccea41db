pub mod connection;
pub mod core;
pub mod drain;
pub mod handler;
pub mod lifecycle;
pub mod publish;
pub mod recovery;
pub mod registry;

mod report;

// Публичный экспорт всех типов и функций из вложенных модулей, чтобы
// упростить доступ к ним из внешнего кода.
pub use core::*;

pub use connection::*;
pub use drain::*;
pub use handler::*;
pub use publish::*;
pub use recovery::*;
pub use registry::*;
