mod common;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use busline::{
    Headers, InboundMessage, MemoryBus, MessageContext, StatusCode, Subscription,
    SubscriptionError, SubscriptionInfo, TraceContext,
};
use common::{client, eventually};
use tokio::sync::mpsc;

/// Тест проверяет сценарий `orders.created`: подписчик получает payload,
/// идентификатор запроса из 36 символов и время в виде десятичного числа.
#[tokio::test]
async fn test_orders_created_scenario() {
    let bus = MemoryBus::new();
    let producer = client(&bus, "producer").await;
    let consumer = client(&bus, "consumer").await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    consumer
        .subscribe("orders.created", move |ctx: MessageContext, msg: InboundMessage| {
            let tx = tx.clone();
            async move {
                tx.send((ctx, msg)).ok();
                Ok::<(), anyhow::Error>(())
            }
        })
        .await
        .unwrap();

    producer
        .publish(
            &TraceContext::new(),
            "orders.created",
            None,
            Bytes::from_static(br#"{"id":1}"#),
        )
        .await
        .unwrap();

    let (ctx, msg) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();

    let request_id = msg.headers.get("request_id").unwrap();
    let time = msg.headers.get("time").unwrap();
    assert_eq!(request_id.len(), 36);
    assert!(!time.is_empty() && time.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(msg.payload, Bytes::from_static(br#"{"id":1}"#));

    assert_eq!(ctx.request_id(), request_id);
    assert_eq!(ctx.time_millis().to_string(), time);
    assert_eq!(ctx.topic(), "orders.created");
    assert!(ctx.remaining() <= busline::HANDLER_DEADLINE);
}

/// Тест проверяет, что обработчик продолжает цепочку запроса, передав
/// свой трассировочный контекст в следующую публикацию.
#[tokio::test]
async fn test_trace_continues_through_handler() {
    let bus = MemoryBus::new();
    let relay = Arc::new(client(&bus, "relay").await);
    let sink = client(&bus, "sink").await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let relay_clone = relay.clone();
    relay
        .subscribe("step.one", move |ctx: MessageContext, msg: InboundMessage| {
            let relay = relay_clone.clone();
            async move {
                relay
                    .publish(ctx.trace(), "step.two", None, msg.payload)
                    .await?;
                Ok::<(), anyhow::Error>(())
            }
        })
        .await
        .unwrap();

    sink.subscribe("step.two", move |ctx: MessageContext, _msg: InboundMessage| {
        let tx = tx.clone();
        async move {
            tx.send((ctx.request_id().to_string(), ctx.time_millis())).ok();
            Ok::<(), anyhow::Error>(())
        }
    })
    .await
    .unwrap();

    let origin = TraceContext::new()
        .with_request_id("req-chain-1")
        .with_time(1_700_000_000_000);
    sink.publish(&origin, "step.one", None, Bytes::new())
        .await
        .unwrap();

    let (id, time) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(id, "req-chain-1");
    assert_eq!(time, 1_700_000_000_000);
}

/// Тест проверяет, что внутри очереди каждое сообщение обрабатывает ровно
/// один участник, а широковещательный подписчик видит все сообщения.
#[tokio::test]
async fn test_queue_group_single_delivery() {
    let bus = MemoryBus::new();
    let workers = [client(&bus, "worker-a").await, client(&bus, "worker-b").await];
    let audit = client(&bus, "audit").await;
    let handled = Arc::new(AtomicUsize::new(0));
    let audited = Arc::new(AtomicUsize::new(0));

    for worker in &workers {
        let handled = handled.clone();
        worker
            .register_group(vec![Subscription::new(
                "jobs",
                "workers",
                move |_ctx: MessageContext, _msg: InboundMessage| {
                    let handled = handled.clone();
                    async move {
                        handled.fetch_add(1, Ordering::SeqCst);
                        Ok::<(), anyhow::Error>(())
                    }
                },
            )])
            .await
            .unwrap();
    }
    {
        let audited = audited.clone();
        audit
            .subscribe("jobs", move |_ctx: MessageContext, _msg: InboundMessage| {
                let audited = audited.clone();
                async move {
                    audited.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), anyhow::Error>(())
                }
            })
            .await
            .unwrap();
    }

    for i in 0..20u8 {
        audit
            .publish(&TraceContext::new(), "jobs", None, vec![i])
            .await
            .unwrap();
    }

    eventually(|| {
        let (h, a) = (handled.clone(), audited.clone());
        async move { h.load(Ordering::SeqCst) == 20 && a.load(Ordering::SeqCst) == 20 }
    })
    .await;

    // Лишних доставок после этого не появляется.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handled.load(Ordering::SeqCst), 20);
    let per_worker: usize = workers.iter().map(|w| w.dispatch_stats().received).sum();
    assert_eq!(per_worker, 20);
}

/// Тест проверяет, что паника в одном обработчике не мешает ни следующим
/// сообщениям той же подписки, ни другим подпискам.
#[tokio::test]
async fn test_panic_isolation() {
    let bus = MemoryBus::new();
    let c = client(&bus, "isolation").await;
    let healthy = Arc::new(AtomicUsize::new(0));

    c.subscribe("fragile", |_ctx: MessageContext, msg: InboundMessage| async move {
        if &msg.payload[..] == b"boom" {
            panic!("handler exploded");
        }
        Ok::<(), anyhow::Error>(())
    })
    .await
    .unwrap();
    {
        let healthy = healthy.clone();
        c.subscribe("steady", move |_ctx: MessageContext, _msg: InboundMessage| {
            let healthy = healthy.clone();
            async move {
                healthy.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
        })
        .await
        .unwrap();
    }

    let trace = TraceContext::new();
    for payload in [&b"boom"[..], b"ok", b"boom", b"ok"] {
        c.publish(&trace, "fragile", None, Bytes::from(payload))
            .await
            .unwrap();
        c.publish(&trace, "steady", None, Bytes::new()).await.unwrap();
    }

    eventually(|| {
        let done = c.dispatch_stats().finished();
        async move { done == 8 }
    })
    .await;

    let stats = c.dispatch_stats();
    assert_eq!(stats.panicked, 2);
    assert_eq!(stats.completed, 6);
    assert_eq!(healthy.load(Ordering::SeqCst), 4);
}

/// Тест проверяет регистрацию трёх подписок, из которых вторая отклоняется
/// транспортом: первая остаётся активной, третья не регистрируется.
#[tokio::test]
async fn test_register_group_partial_failure() {
    let bus = MemoryBus::new();
    bus.reject_topic("billing.refund");
    let c = client(&bus, "partial").await;
    let handled = Arc::new(AtomicUsize::new(0));

    let make = |topic: &str| {
        let handled = handled.clone();
        Subscription::new(
            topic,
            "billing",
            move |_ctx: MessageContext, _msg: InboundMessage| {
                let handled = handled.clone();
                async move {
                    handled.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), anyhow::Error>(())
                }
            },
        )
    };

    let err = c
        .register_group(vec![
            make("billing.charge"),
            make("billing.refund"),
            make("billing.payout"),
        ])
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::Internal);
    let root = err.downcast_ref::<SubscriptionError>().unwrap();
    assert_eq!(root.topic(), Some("billing.refund"));
    assert_eq!(
        c.subscriptions(),
        vec![SubscriptionInfo {
            topic: "billing.charge".into(),
            group: Some("billing".into()),
        }]
    );

    // Первая подписка работает.
    let trace = TraceContext::new();
    c.publish(&trace, "billing.charge", None, Bytes::new())
        .await
        .unwrap();
    c.publish(&trace, "billing.payout", None, Bytes::new())
        .await
        .unwrap();
    eventually(|| {
        let h = handled.clone();
        async move { h.load(Ordering::SeqCst) == 1 }
    })
    .await;
    assert_eq!(bus.subscriber_count("billing.payout"), 0);
}

/// Тест проверяет, что заголовки вызывающего доходят до подписчика.
#[tokio::test]
async fn test_custom_headers_delivered() {
    let bus = MemoryBus::new();
    let c = client(&bus, "headers").await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    c.subscribe("audit", move |_ctx: MessageContext, msg: InboundMessage| {
        let tx = tx.clone();
        async move {
            tx.send(msg.headers).ok();
            Ok::<(), anyhow::Error>(())
        }
    })
    .await
    .unwrap();

    let mut extra = Headers::new();
    extra.append("tag", "a");
    extra.append("tag", "b");
    c.publish(&TraceContext::new(), "audit", Some(extra), Bytes::new())
        .await
        .unwrap();

    let headers = rx.recv().await.unwrap();
    assert_eq!(headers.get_all("tag"), &["a".to_string(), "b".to_string()]);
    assert!(headers.contains_key("request_id"));
    assert!(headers.contains_key("time"));
}

/// Тест проверяет доставку сообщения с крайним, но числовым временем в
/// заголовке: обработчик вызывается, счётчики сходятся.
#[tokio::test]
async fn test_extreme_time_header_is_delivered() {
    let bus = MemoryBus::new();
    let c = client(&bus, "edge-time").await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    c.subscribe("t", move |ctx: MessageContext, _msg: InboundMessage| {
        let tx = tx.clone();
        async move {
            tx.send((ctx.time_millis(), ctx.elapsed_ms())).ok();
            Ok::<(), anyhow::Error>(())
        }
    })
    .await
    .unwrap();

    let mut headers = Headers::new();
    headers.insert("time", i64::MIN.to_string());
    bus.inject(busline::OutboundMessage::new("t", headers, Bytes::new()));

    let (time, elapsed) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(time, i64::MIN);
    assert_eq!(elapsed, i64::MAX);

    eventually(|| {
        let stats = c.dispatch_stats();
        async move { stats.received == 1 && stats.completed == 1 }
    })
    .await;
}
