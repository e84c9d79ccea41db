#![allow(dead_code)]

use std::{future::Future, time::Duration};

use busline::{BusClient, BusConfig, MemoryBus};

pub fn config(name: &str) -> BusConfig {
    BusConfig {
        address: vec!["memory://local".into()],
        name: name.to_string(),
        app_id: Some("it".into()),
        ..BusConfig::default()
    }
}

pub async fn client(
    bus: &MemoryBus,
    name: &str,
) -> BusClient {
    BusClient::connect(&config(name), &bus.connector())
        .await
        .expect("connect to memory bus")
}

/// Ждёт, пока `cond` не станет истинным, но не дольше двух секунд.
pub async fn eventually<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition was not reached in time");
}
