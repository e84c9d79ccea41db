mod common;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use busline::{
    ConnectionState, DrainError, InboundMessage, MemoryBus, MessageContext, PublishError,
    StatusCode, TraceContext,
};
use common::{client, eventually};

/// Тест проверяет, что drain не возвращается, пока транспорт не сообщил о
/// закрытии, и возвращается сразу после этого.
#[tokio::test]
async fn test_drain_blocks_until_closed() {
    let bus = MemoryBus::new();
    bus.hold_close(true);
    let c = Arc::new(client(&bus, "drain-hold").await);

    let task = {
        let c = c.clone();
        tokio::spawn(async move { c.drain().await })
    };

    eventually(|| {
        let state = c.state();
        async move { state == ConnectionState::Draining }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());

    assert_eq!(bus.release_closed(), 1);
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("drain must return after close")
        .unwrap()
        .unwrap();
    assert_eq!(c.state(), ConnectionState::Closed);
}

/// Тест проверяет, что drain завершается после задержанного закрытия.
#[tokio::test]
async fn test_drain_waits_for_delayed_close() {
    let bus = MemoryBus::new();
    bus.set_close_delay(Duration::from_millis(80));
    let c = client(&bus, "drain-delay").await;

    let started = tokio::time::Instant::now();
    c.drain().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(80));
    assert_eq!(c.state(), ConnectionState::Closed);
    assert_eq!(bus.connected_clients(), 0);
}

/// Тест проверяет, что обработчик, уже получивший сообщение, доводит
/// работу до конца, несмотря на drain.
#[tokio::test]
async fn test_drain_does_not_interrupt_in_flight_handler() {
    let bus = MemoryBus::new();
    let c = client(&bus, "in-flight").await;
    let started = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));

    {
        let (started, finished) = (started.clone(), finished.clone());
        c.subscribe("reports", move |_ctx: MessageContext, _msg: InboundMessage| {
            let (started, finished) = (started.clone(), finished.clone());
            async move {
                started.store(true, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                finished.store(true, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
        })
        .await
        .unwrap();
    }

    c.publish(&TraceContext::new(), "reports", None, Bytes::new())
        .await
        .unwrap();
    eventually(|| {
        let s = started.clone();
        async move { s.load(Ordering::SeqCst) }
    })
    .await;

    c.drain().await.unwrap();
    eventually(|| {
        let f = finished.clone();
        async move { f.load(Ordering::SeqCst) }
    })
    .await;
    assert_eq!(c.dispatch_stats().completed, 1);
}

/// Тест проверяет, что во время drain новые публикации и подписки
/// отклоняются, а повторный drain возвращает ошибку состояния.
#[tokio::test]
async fn test_work_rejected_while_draining() {
    let bus = MemoryBus::new();
    bus.hold_close(true);
    let c = Arc::new(client(&bus, "draining").await);

    let task = {
        let c = c.clone();
        tokio::spawn(async move { c.drain().await })
    };
    eventually(|| {
        let state = c.state();
        async move { state == ConnectionState::Draining }
    })
    .await;

    let err = c
        .publish(&TraceContext::new(), "late", None, Bytes::new())
        .await
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<PublishError>(),
        Some(&PublishError::ConnectionClosed {
            topic: "late".into()
        })
    );

    let err = c.drain().await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::InvalidOperation);
    assert!(matches!(
        err.downcast_ref::<DrainError>(),
        Some(DrainError::InvalidState { .. })
    ));

    bus.release_closed();
    task.await.unwrap().unwrap();
}

/// Тест проверяет, что drain с ограничением по времени возвращает
/// `Timeout`, если закрытие не наступило.
#[tokio::test]
async fn test_drain_timeout() {
    let bus = MemoryBus::new();
    bus.hold_close(true);
    let c = client(&bus, "drain-timeout").await;

    let err = c
        .drain_timeout(Duration::from_millis(30))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::Timeout);
    assert_eq!(
        err.downcast_ref::<DrainError>(),
        Some(&DrainError::Timeout { waited_ms: 30 })
    );
}

/// Тест проверяет, что при ошибке сброса буфера соединение остаётся
/// рабочим.
#[tokio::test]
async fn test_failed_flush_keeps_connection_usable() {
    let bus = MemoryBus::new();
    bus.fail_drain(true);
    let c = client(&bus, "flush").await;

    let err = c.drain().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DrainError>(),
        Some(DrainError::Flush { .. })
    ));
    assert_eq!(c.state(), ConnectionState::Connected);

    c.publish(&TraceContext::new(), "still.alive", None, Bytes::new())
        .await
        .unwrap();

    bus.fail_drain(false);
    c.drain().await.unwrap();
    assert_eq!(c.state(), ConnectionState::Closed);
}

/// Тест проверяет, что после таймаута drain можно дождаться закрытия
/// через `wait_closed`, хотя повторный drain уже отклоняется.
#[tokio::test]
async fn test_wait_closed_after_timeout() {
    let bus = MemoryBus::new();
    bus.hold_close(true);
    let c = Arc::new(client(&bus, "resume-wait").await);

    let err = c
        .drain_timeout(Duration::from_millis(20))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::Timeout);
    assert_eq!(c.state(), ConnectionState::Draining);
    assert!(matches!(
        c.drain().await.unwrap_err().downcast_ref::<DrainError>(),
        Some(DrainError::InvalidState { .. })
    ));

    let waiter = {
        let c = c.clone();
        tokio::spawn(async move { c.wait_closed().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!waiter.is_finished());

    bus.release_closed();
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("wait_closed must return after close")
        .unwrap();
    assert_eq!(c.state(), ConnectionState::Closed);

    // Уже закрытое соединение не заставляет ждать.
    tokio::time::timeout(Duration::from_millis(100), c.wait_closed())
        .await
        .unwrap();
}
