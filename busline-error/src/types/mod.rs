pub mod connection;
pub mod drain;
pub mod handler;
pub mod publish;
pub mod subscription;

// Публичный экспорт всех типов ошибок, чтобы упростить доступ к ним из
// внешнего кода.
pub use connection::*;
pub use drain::*;
pub use handler::*;
pub use publish::*;
pub use subscription::*;
