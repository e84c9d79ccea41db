use std::{sync::Arc, time::Duration};

use busline_error::DrainError;
use tokio::sync::watch;
use tracing::{info, warn};

use super::connection::Connection;

/// Счётчик завершения соединения.
///
/// Увеличивается при открытии соединения и уменьшается ровно один раз,
/// когда шина сообщает о полном закрытии. [`ShutdownToken::wait`]
/// блокируется, пока счётчик не обнулится.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    count: Arc<watch::Sender<usize>>,
}

/// Синхронное завершение работы клиента.
#[derive(Debug, Clone)]
pub struct DrainCoordinator {
    connection: Arc<Connection>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ShutdownToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            count: Arc::new(tx),
        }
    }

    pub fn acquire(&self) {
        self.count.send_modify(|c| *c += 1);
    }

    /// Уменьшает счётчик; `false`, если он уже был нулевым.
    pub fn release(&self) -> bool {
        self.count.send_if_modified(|c| {
            if *c == 0 {
                return false;
            }
            *c -= 1;
            true
        })
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Ждёт обнуления счётчика.
    pub async fn wait(&self) {
        let mut rx = self.count.subscribe();
        // Отправитель живёт, пока жив `self`, поэтому ошибки здесь нет.
        let _ = rx.wait_for(|c| *c == 0).await;
    }
}

impl DrainCoordinator {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    /// Переводит соединение в `Draining`, просит транспорт сбросить буфер и
    /// закрыться, затем ждёт события `Closed`.
    ///
    /// Обработчики, уже получившие сообщения, не прерываются.
    ///
    /// # Ошибки
    /// - `DrainError::InvalidState`: соединение не в `Connected` или
    ///   `Disconnected` (в том числе повторный drain)
    /// - `DrainError::Flush`: транспорт не смог сбросить буфер; прежнее
    ///   состояние восстанавливается
    pub async fn drain(&self) -> Result<(), DrainError> {
        let client_id = self.connection.client_id();
        let previous = self
            .connection
            .begin_drain()
            .map_err(|state| DrainError::InvalidState {
                state: state.to_string(),
            })?;

        info!(%client_id, "Draining bus connection");

        if let Err(e) = self.connection.transport().drain().await {
            warn!(%client_id, error = %e, "Drain flush failed");
            self.connection.abort_drain(previous);
            return Err(DrainError::Flush {
                reason: e.to_string(),
            });
        }

        self.connection.shutdown_token().wait().await;
        info!(%client_id, "Bus connection drained");
        Ok(())
    }

    /// То же, что [`DrainCoordinator::drain`], но ожидание ограничено
    /// `timeout`.
    ///
    /// После таймаута соединение остаётся в `Draining`: повторный `drain`
    /// вернёт `InvalidState`, дождаться закрытия можно через
    /// [`DrainCoordinator::wait_closed`].
    pub async fn drain_timeout(
        &self,
        timeout: Duration,
    ) -> Result<(), DrainError> {
        tokio::time::timeout(timeout, self.drain())
            .await
            .map_err(|_| DrainError::Timeout {
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }

    /// Ждёт события закрытия, не начиная drain.
    ///
    /// Возвращается сразу, если соединение уже закрыто.
    pub async fn wait_closed(&self) {
        self.connection.shutdown_token().wait().await;
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
