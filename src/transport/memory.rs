use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::{stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{
    ConnectOptions, Connector, EventSender, MessageStream, Transport, TransportError,
    TransportEvent,
};
use crate::message::{InboundMessage, OutboundMessage};

type TopicKey = Arc<str>;

/// Шина сообщений внутри процесса.
///
/// Поддерживает:
/// - широковещательные подписки по точному имени темы
/// - очереди: каждое сообщение получает один случайный участник группы
/// - статистику публикаций и ошибок отправки
/// - внедрение сбоев для тестов (отказ в подключении, подписке,
///   публикации, drain; задержка события `Closed`)
///
/// Клоны разделяют одно состояние.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    /// Тема → участники
    topics: DashMap<TopicKey, Vec<Member>>,
    /// Подключённые клиенты → их канал событий
    clients: DashMap<u64, EventSender>,
    /// Клиенты, ждущие разрешения на `Closed`
    pending_close: DashMap<u64, EventSender>,
    next_client: AtomicU64,
    faults: Faults,
    /// Общее количество успешных вызовов `publish`
    publish_count: AtomicUsize,
    /// Количество неудачных отправок (получатель уже закрыт)
    send_error_count: AtomicUsize,
}

#[derive(Default)]
struct Faults {
    refuse_connections: AtomicBool,
    fail_publish: AtomicBool,
    fail_drain: AtomicBool,
    hold_close: AtomicBool,
    close_delay_ms: AtomicU64,
    rejected_topics: DashSet<String>,
}

struct Member {
    client: u64,
    group: Option<Arc<str>>,
    tx: mpsc::UnboundedSender<InboundMessage>,
}

/// Подключение к [`MemoryBus`].
#[derive(Clone, Default)]
pub struct MemoryConnector {
    bus: MemoryBus,
}

/// Соединение одного клиента с [`MemoryBus`].
pub struct MemoryTransport {
    bus: MemoryBus,
    client: u64,
    events: EventSender,
    closed: AtomicBool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Коннектор, подключающий клиентов к этой шине.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector { bus: self.clone() }
    }

    /// Публикует сообщение напрямую, минуя клиента.
    pub fn inject(
        &self,
        msg: OutboundMessage,
    ) {
        self.deliver(msg);
    }

    pub fn publish_count(&self) -> usize {
        self.inner.publish_count.load(Ordering::Relaxed)
    }

    pub fn send_error_count(&self) -> usize {
        self.inner.send_error_count.load(Ordering::Relaxed)
    }

    /// Количество активных участников темы.
    pub fn subscriber_count(
        &self,
        topic: &str,
    ) -> usize {
        self.inner.topics.get(topic).map(|m| m.len()).unwrap_or(0)
    }

    pub fn connected_clients(&self) -> usize {
        self.inner.clients.len()
    }

    /// Новые подключения будут отклонены.
    pub fn refuse_connections(
        &self,
        refuse: bool,
    ) {
        self.inner
            .faults
            .refuse_connections
            .store(refuse, Ordering::Relaxed);
    }

    /// Подписка на `topic` будет отклонена.
    pub fn reject_topic(
        &self,
        topic: impl Into<String>,
    ) {
        self.inner.faults.rejected_topics.insert(topic.into());
    }

    pub fn fail_publish(
        &self,
        fail: bool,
    ) {
        self.inner.faults.fail_publish.store(fail, Ordering::Relaxed);
    }

    /// Следующий drain вернёт ошибку сброса буфера.
    pub fn fail_drain(
        &self,
        fail: bool,
    ) {
        self.inner.faults.fail_drain.store(fail, Ordering::Relaxed);
    }

    /// Задержка между drain и событием `Closed`.
    pub fn set_close_delay(
        &self,
        delay: Duration,
    ) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.inner.faults.close_delay_ms.store(millis, Ordering::Relaxed);
    }

    /// Пока включено, `Closed` не отправляется до [`MemoryBus::release_closed`].
    pub fn hold_close(
        &self,
        hold: bool,
    ) {
        self.inner.faults.hold_close.store(hold, Ordering::Relaxed);
    }

    /// Отправляет `Closed` всем клиентам, чей drain был задержан.
    pub fn release_closed(&self) -> usize {
        let ids: Vec<u64> = self.inner.pending_close.iter().map(|e| *e.key()).collect();
        let mut released = 0;
        for id in ids {
            if let Some((_, events)) = self.inner.pending_close.remove(&id) {
                let _ = events.send(TransportEvent::Closed);
                released += 1;
            }
        }
        released
    }

    /// Имитирует обрыв соединения у всех клиентов.
    pub fn disconnect_all(
        &self,
        error: Option<&str>,
    ) {
        self.broadcast_event(TransportEvent::Disconnected {
            error: error.map(str::to_string),
        });
    }

    /// Имитирует восстановление соединения у всех клиентов.
    pub fn reconnect_all(&self) {
        self.broadcast_event(TransportEvent::Reconnected);
    }

    /// Имитирует асинхронную ошибку сервера.
    pub fn emit_error(
        &self,
        subject: Option<&str>,
        reason: &str,
    ) {
        self.broadcast_event(TransportEvent::Error {
            subject: subject.map(str::to_string),
            reason: reason.to_string(),
        });
    }

    fn broadcast_event(
        &self,
        event: TransportEvent,
    ) {
        for entry in self.inner.clients.iter() {
            let _ = entry.value().send(event.clone());
        }
    }

    fn register_client(
        &self,
        events: EventSender,
    ) -> u64 {
        let id = self.inner.next_client.fetch_add(1, Ordering::Relaxed);
        self.inner.clients.insert(id, events);
        id
    }

    fn add_member(
        &self,
        topic: &str,
        member: Member,
    ) {
        self.inner
            .topics
            .entry(Arc::from(topic))
            .or_default()
            .push(member);
    }

    /// Убирает все подписки клиента; их потоки завершатся после
    /// уже доставленных сообщений.
    fn remove_client(
        &self,
        client: u64,
    ) {
        self.inner
            .topics
            .iter_mut()
            .for_each(|mut entry| entry.value_mut().retain(|m| m.client != client));
        self.inner.topics.retain(|_, members| !members.is_empty());
        self.inner.clients.remove(&client);
    }

    /// Доставка в два этапа:
    /// 1. всем участникам без группы
    /// 2. одному случайному участнику каждой группы
    fn deliver(
        &self,
        msg: OutboundMessage,
    ) {
        self.inner.publish_count.fetch_add(1, Ordering::Relaxed);

        let Some(mut entry) = self.inner.topics.get_mut(msg.topic.as_str()) else {
            trace!(topic = %msg.topic, "No subscribers, message dropped");
            return;
        };
        let inbound = msg.into_inbound();
        let members = entry.value_mut();

        let mut groups: HashMap<Arc<str>, Vec<usize>> = HashMap::new();
        let mut targets = Vec::new();
        for (idx, member) in members.iter().enumerate() {
            match &member.group {
                None => targets.push(idx),
                Some(group) => groups.entry(group.clone()).or_default().push(idx),
            }
        }
        targets.extend(
            groups
                .values()
                .map(|idxs| idxs[fastrand::usize(..idxs.len())]),
        );

        let mut dead = Vec::new();
        for idx in targets {
            if members[idx].tx.send(inbound.clone()).is_err() {
                self.inner.send_error_count.fetch_add(1, Ordering::Relaxed);
                dead.push(idx);
            }
        }

        // Получатель закрыт, участник больше не нужен.
        if !dead.is_empty() {
            let mut idx = 0;
            members.retain(|_| {
                let keep = !dead.contains(&idx);
                idx += 1;
                keep
            });
        }
    }
}

impl MemoryConnector {
    pub fn new(bus: MemoryBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &MemoryBus {
        &self.bus
    }
}

impl MemoryTransport {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Реализация транспортных трейтов
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        options: &ConnectOptions,
        events: EventSender,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        if self.bus.inner.faults.refuse_connections.load(Ordering::Relaxed) {
            return Err(TransportError::Connect {
                addresses: options.joined_addresses(),
                reason: "connection refused".to_string(),
            });
        }

        let client = self.bus.register_client(events.clone());
        debug!(client_id = %options.client_id, client, "Memory transport connected");

        Ok(Arc::new(MemoryTransport {
            bus: self.bus.clone(),
            client,
            events,
            closed: AtomicBool::new(false),
        }))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(
        &self,
        msg: OutboundMessage,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        if self.bus.inner.faults.fail_publish.load(Ordering::Relaxed) {
            return Err(TransportError::Other("write buffer is full".to_string()));
        }
        self.bus.deliver(msg);
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: Option<&str>,
    ) -> Result<MessageStream, TransportError> {
        self.ensure_open()?;
        if self.bus.inner.faults.rejected_topics.contains(topic) {
            return Err(TransportError::Other(format!(
                "permissions violation for subscription to \"{topic}\""
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.bus.add_member(
            topic,
            Member {
                client: self.client,
                group: group.map(Arc::from),
                tx,
            },
        );

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });
        Ok(stream.boxed())
    }

    async fn drain(&self) -> Result<(), TransportError> {
        self.ensure_open()?;
        if self.bus.inner.faults.fail_drain.load(Ordering::Relaxed) {
            return Err(TransportError::Other("flush failed".to_string()));
        }

        self.closed.store(true, Ordering::Release);
        self.bus.remove_client(self.client);

        let faults = &self.bus.inner.faults;
        if faults.hold_close.load(Ordering::Relaxed) {
            self.bus
                .inner
                .pending_close
                .insert(self.client, self.events.clone());
            return Ok(());
        }

        let delay = Duration::from_millis(faults.close_delay_ms.load(Ordering::Relaxed));
        let events = self.events.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = events.send(TransportEvent::Closed);
        });
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
