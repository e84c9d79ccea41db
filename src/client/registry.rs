use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use busline_error::SubscriptionError;
use futures::StreamExt;
use parking_lot::RwLock;
use tracing::{debug, info, Instrument};

use super::{
    connection::Connection,
    handler::{MessageHandler, SharedHandler},
    recovery::{HandlerOutcome, RecoveryWrapper},
};
use crate::{message::InboundMessage, trace::MessageContextBuilder, transport::MessageStream};

/// Подписка: тема, необязательная группа и обработчик.
///
/// Пустая группа означает широковещательную доставку всем подписчикам
/// темы; при непустой каждое сообщение получает один участник группы.
#[derive(Clone)]
pub struct Subscription {
    pub topic: String,
    pub group: String,
    pub handler: SharedHandler,
}

/// Описание активной подписки.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub topic: String,
    pub group: Option<String>,
}

/// Счётчики доставки.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Сообщений прочитано из транспорта
    pub received: AtomicUsize,
    /// Обработчик завершился успешно
    pub completed: AtomicUsize,
    /// Обработчик вернул ошибку
    pub failed: AtomicUsize,
    /// Обработчик запаниковал
    pub panicked: AtomicUsize,
}

/// Снимок [`DispatchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchSnapshot {
    pub received: usize,
    pub completed: usize,
    pub failed: usize,
    pub panicked: usize,
}

/// Реестр подписок и диспетчер входящих сообщений.
///
/// На каждую подписку запускается задача-насос, читающая поток
/// транспорта. Каждое сообщение обрабатывается в отдельной задаче; насос
/// обработчик не ждёт.
pub struct SubscriptionRegistry {
    connection: Arc<Connection>,
    active: RwLock<Vec<SubscriptionInfo>>,
    stats: Arc<DispatchStats>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Subscription {
    pub fn new(
        topic: impl Into<String>,
        group: impl Into<String>,
        handler: impl MessageHandler,
    ) -> Self {
        Self {
            topic: topic.into(),
            group: group.into(),
            handler: Arc::new(handler),
        }
    }

    /// Широковещательная подписка без группы.
    pub fn broadcast(
        topic: impl Into<String>,
        handler: impl MessageHandler,
    ) -> Self {
        Self::new(topic, String::new(), handler)
    }

    fn group(&self) -> Option<&str> {
        Some(self.group.as_str()).filter(|g| !g.is_empty())
    }
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            received: self.received.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

impl DispatchSnapshot {
    /// Сколько сообщений уже обработано, с любым итогом.
    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.panicked
    }
}

impl SubscriptionRegistry {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            active: RwLock::new(Vec::new()),
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Широковещательная подписка на `topic`.
    pub async fn subscribe(
        &self,
        topic: &str,
        handler: impl MessageHandler,
    ) -> Result<(), SubscriptionError> {
        self.register(Subscription::broadcast(topic, handler)).await
    }

    /// Регистрирует подписки по порядку.
    ///
    /// Первая ошибка прерывает регистрацию оставшихся и возвращается;
    /// уже зарегистрированные подписки остаются активными.
    pub async fn register_group(
        &self,
        subscriptions: Vec<Subscription>,
    ) -> Result<(), SubscriptionError> {
        for sub in subscriptions {
            info!(topic = %sub.topic, group = %sub.group, "Register channel");
            self.register(sub).await?;
        }
        Ok(())
    }

    /// Регистрирует одну подписку и запускает для неё насос.
    pub async fn register(
        &self,
        sub: Subscription,
    ) -> Result<(), SubscriptionError> {
        if sub.topic.is_empty() {
            return Err(SubscriptionError::InvalidTopic);
        }
        if !self.connection.state().accepts_work() {
            return Err(SubscriptionError::ConnectionClosed { topic: sub.topic });
        }

        let group = sub.group().map(str::to_string);
        let stream = self
            .connection
            .transport()
            .subscribe(&sub.topic, group.as_deref())
            .await
            .map_err(|e| SubscriptionError::Registration {
                topic: sub.topic.clone(),
                group: group.clone(),
                reason: e.to_string(),
            })?;

        self.active.write().push(SubscriptionInfo {
            topic: sub.topic.clone(),
            group: group.clone(),
        });
        debug!(
            client_id = %self.connection.client_id(),
            topic = %sub.topic,
            group = group.as_deref().unwrap_or(""),
            "Subscription active"
        );

        tokio::spawn(pump(
            stream,
            sub.topic,
            group,
            sub.handler,
            self.stats.clone(),
        ));
        Ok(())
    }

    /// Активные подписки в порядке регистрации.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.active.read().clone()
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.stats.snapshot()
    }
}

/// Читает поток подписки и запускает задачу на каждое сообщение.
async fn pump(
    mut stream: MessageStream,
    topic: String,
    group: Option<String>,
    handler: SharedHandler,
    stats: Arc<DispatchStats>,
) {
    while let Some(msg) = stream.next().await {
        stats.received.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(dispatch(msg, group.clone(), handler.clone(), stats.clone()));
    }
    debug!(%topic, "Subscription stream ended");
}

/// Обрабатывает одно сообщение: контекст, span, обработчик под защитой,
/// лог результата. Ошибки обработчика дальше лога не уходят.
async fn dispatch(
    msg: InboundMessage,
    group: Option<String>,
    handler: SharedHandler,
    stats: Arc<DispatchStats>,
) {
    let ctx = MessageContextBuilder::build(msg.topic.clone(), group, &msg.headers);
    let span = ctx.span().clone();

    async move {
        let topic = ctx.topic().to_string();
        let request_id = ctx.request_id().to_string();
        info!(payload_len = msg.payload.len(), "Message received");

        let outcome = RecoveryWrapper::run(&topic, &request_id, handler.handle(ctx, msg)).await;
        let counter = match outcome {
            HandlerOutcome::Completed => {
                debug!("Message handled");
                &stats.completed
            }
            HandlerOutcome::Failed(_) => &stats.failed,
            HandlerOutcome::Panicked { .. } => &stats.panicked,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
    .instrument(span)
    .await
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
