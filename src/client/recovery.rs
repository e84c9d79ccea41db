use std::{
    any::Any,
    backtrace::Backtrace,
    cell::{Cell, RefCell},
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    task::{Context, Poll},
};

use busline_error::HandlerFault;
use futures::FutureExt;
use once_cell::sync::OnceCell;

use super::report;

/// Итог выполнения обработчика.
#[derive(Debug)]
pub enum HandlerOutcome {
    Completed,
    /// Обработчик вернул ошибку.
    Failed(anyhow::Error),
    /// Обработчик запаниковал; паника перехвачена.
    Panicked {
        message: String,
        backtrace: Option<String>,
    },
}

/// Изолирует сбои обработчиков от пути доставки.
///
/// Паника внутри обработчика перехватывается, логируется вместе с
/// сообщением, темой и backtrace и превращается в
/// [`HandlerOutcome::Panicked`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryWrapper;

thread_local! {
    /// Выставлен, пока поток опрашивает защищённый обработчик.
    static IN_GUARD: Cell<bool> = const { Cell::new(false) };
    /// Backtrace последней перехваченной паники на этом потоке.
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Future, выставляющий `IN_GUARD` на время каждого опроса.
struct Guarded<F> {
    inner: Pin<Box<F>>,
}

/// Восстанавливает прежнее значение `IN_GUARD`, в том числе при раскрутке.
struct GuardScope {
    previous: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl RecoveryWrapper {
    /// Выполняет обработчик под защитой и логирует его сбой.
    pub async fn run<F>(
        topic: &str,
        request_id: &str,
        fut: F,
    ) -> HandlerOutcome
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        let outcome = Self::guard(fut).await;
        if let Some(fault) = outcome.fault(topic, request_id) {
            report::handler_fault(&fault, outcome.backtrace());
        }
        outcome
    }

    /// Выполняет обработчик под защитой без логирования.
    pub async fn guard<F>(fut: F) -> HandlerOutcome
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        install_panic_hook();

        let guarded = Guarded {
            inner: Box::pin(fut),
        };
        match AssertUnwindSafe(guarded).catch_unwind().await {
            Ok(Ok(())) => HandlerOutcome::Completed,
            Ok(Err(err)) => HandlerOutcome::Failed(err),
            Err(payload) => HandlerOutcome::Panicked {
                message: panic_message(payload.as_ref()),
                backtrace: LAST_BACKTRACE.with(|slot| slot.borrow_mut().take()),
            },
        }
    }
}

impl HandlerOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Backtrace перехваченной паники, если его удалось снять.
    pub fn backtrace(&self) -> Option<&str> {
        match self {
            Self::Panicked { backtrace, .. } => backtrace.as_deref(),
            _ => None,
        }
    }

    /// Ошибка для лога; `None`, если обработчик завершился успешно.
    pub fn fault(
        &self,
        topic: &str,
        request_id: &str,
    ) -> Option<HandlerFault> {
        match self {
            Self::Completed => None,
            Self::Failed(err) => Some(HandlerFault::Failed {
                topic: topic.to_string(),
                request_id: request_id.to_string(),
                reason: format!("{err:#}"),
            }),
            Self::Panicked { message, .. } => Some(HandlerFault::Panicked {
                topic: topic.to_string(),
                request_id: request_id.to_string(),
                message: message.clone(),
            }),
        }
    }
}

impl GuardScope {
    fn enter() -> Self {
        let previous = IN_GUARD.with(|flag| flag.replace(true));
        Self { previous }
    }
}

/// Ставит глобальный хук паники один раз за процесс.
///
/// Хук снимает backtrace только для паник внутри защищённых обработчиков,
/// остальные передаются прежнему хуку.
fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if IN_GUARD.with(Cell::get) {
                let backtrace = Backtrace::force_capture().to_string();
                LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            } else {
                previous(info);
            }
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl<F: Future> Future for Guarded<F> {
    type Output = F::Output;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        let _scope = GuardScope::enter();
        self.inner.as_mut().poll(cx)
    }
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        let previous = self.previous;
        IN_GUARD.with(|flag| flag.set(previous));
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::anyhow;
    use busline_error::{ErrorExt, StatusCode};

    use super::*;

    async fn explode(after: Duration) -> anyhow::Result<()> {
        tokio::time::sleep(after).await;
        panic!("boom {}", 42);
    }

    /// Тест проверяет, что успешный обработчик даёт `Completed`.
    #[tokio::test]
    async fn test_completed() {
        let outcome = RecoveryWrapper::guard(async { Ok::<(), anyhow::Error>(()) }).await;
        assert!(outcome.is_completed());
        assert!(outcome.fault("t", "r").is_none());
        assert!(outcome.backtrace().is_none());
    }

    /// Тест проверяет, что ошибка обработчика возвращается как `Failed`.
    #[tokio::test]
    async fn test_failed() {
        let outcome = RecoveryWrapper::guard(async { Err::<(), _>(anyhow!("db down")) }).await;
        let fault = outcome.fault("orders", "req-1").unwrap();
        assert_eq!(fault.to_string(), "channel: orders, error: db down");
        assert_eq!(fault.status_code(), StatusCode::HandlerFailed);
    }

    /// Тест проверяет перехват паники со строковым сообщением и снятие
    /// backtrace.
    #[tokio::test]
    async fn test_panic_is_caught() {
        let outcome = RecoveryWrapper::run("orders", "req-2", explode(Duration::from_millis(1))).await;

        match outcome {
            HandlerOutcome::Panicked { ref message, .. } => {
                assert_eq!(message, "boom 42");
                assert!(outcome.backtrace().is_some());
                assert_eq!(
                    outcome.fault("orders", "req-2").map(|f| f.status_code()),
                    Some(StatusCode::HandlerPanicked)
                );
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    /// Тест проверяет, что после паники поток выходит из защищённого
    /// режима и следующий вызов работает штатно.
    #[tokio::test]
    async fn test_guard_flag_restored() {
        let _ = RecoveryWrapper::guard(explode(Duration::ZERO)).await;
        assert!(!IN_GUARD.with(Cell::get));

        let outcome = RecoveryWrapper::guard(async { Ok::<(), anyhow::Error>(()) }).await;
        assert!(outcome.is_completed());
    }

    /// Тест проверяет извлечение сообщения из нестрокового payload.
    #[test]
    fn test_panic_message_non_string() {
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
