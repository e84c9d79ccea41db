//! Таксономия ошибок клиента шины.
//!
//! Каждая ошибка отдаёт стабильный числовой код, рекомендуемый уровень
//! логирования и безопасное для внешнего клиента сообщение. На фасаде
//! клиента ошибки оборачиваются в [`StackError`] с цепочкой контекстов.

pub mod ext;
pub mod stack;
pub mod status_code;
pub mod types;

pub use ext::*;
pub use stack::*;
pub use status_code::*;
pub use types::*;

pub type BuslineResult<T> = Result<T, StackError>;
