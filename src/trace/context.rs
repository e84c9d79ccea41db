use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::{error::Elapsed, Instant};
use tracing::{info_span, Span};

use super::{elapsed_millis, new_request_id, now_millis, REQUEST_ID_HEADER, TIME_HEADER};
use crate::message::Headers;

/// Сколько времени отводится обработчику на одно сообщение.
pub const HANDLER_DEADLINE: Duration = Duration::from_secs(30);

/// Типизированный контекст распространения трассировки.
///
/// Оба значения необязательны: отсутствующий идентификатор при чтении
/// превращается в новый, отсутствующее время в текущее.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    request_id: Option<String>,
    time_millis: Option<i64>,
}

/// Построитель контекста выполнения для входящих сообщений.
///
/// Умеет записывать трассировочные заголовки в исходящее сообщение и
/// извлекать их из входящего.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageContextBuilder;

/// Контекст выполнения одного входящего сообщения.
///
/// Создаётся на каждое сообщение и передаётся обработчику по значению.
#[derive(Debug, Clone)]
pub struct MessageContext {
    trace: TraceContext,
    topic: Arc<str>,
    group: Option<String>,
    received_at: Instant,
    deadline: Instant,
    elapsed_ms: i64,
    span: Span,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl TraceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Контекст с новым идентификатором и текущим временем.
    pub fn fresh() -> Self {
        Self {
            request_id: Some(new_request_id()),
            time_millis: Some(now_millis()),
        }
    }

    pub fn with_request_id(
        mut self,
        request_id: impl Into<String>,
    ) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_time(
        mut self,
        time_millis: i64,
    ) -> Self {
        self.time_millis = Some(time_millis);
        self
    }

    /// Идентификатор запроса; новый, если в контексте его нет.
    pub fn request_id(&self) -> String {
        self.request_id.clone().unwrap_or_else(new_request_id)
    }

    /// Время отправки (epoch millis); текущее, если в контексте его нет.
    pub fn time_millis(&self) -> i64 {
        self.time_millis.unwrap_or_else(now_millis)
    }

    /// Идентификатор как есть, без подстановки значения по умолчанию.
    pub fn raw_request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Время как есть, без подстановки значения по умолчанию.
    pub fn raw_time_millis(&self) -> Option<i64> {
        self.time_millis
    }

    /// Сколько миллисекунд прошло с момента отправки.
    pub fn elapsed_millis(&self) -> i64 {
        elapsed_millis(self.time_millis())
    }

    /// Фиксирует значения по умолчанию, чтобы повторные чтения совпадали.
    pub fn resolve(self) -> Self {
        let request_id = self.request_id();
        let time_millis = self.time_millis();
        Self {
            request_id: Some(request_id),
            time_millis: Some(time_millis),
        }
    }
}

impl MessageContextBuilder {
    /// Записывает `request_id` и `time` в заголовки, заменяя прежние
    /// значения этих ключей.
    pub fn inject(
        trace: &TraceContext,
        headers: &mut Headers,
    ) {
        headers.insert(REQUEST_ID_HEADER, trace.request_id());
        headers.insert(TIME_HEADER, trace.time_millis().to_string());
    }

    /// Читает первое значение `request_id` и `time`.
    ///
    /// Без идентификатора создаётся новый. Если времени нет или оно не
    /// разбирается как десятичное целое, берётся текущее время.
    pub fn extract(headers: &Headers) -> (String, i64) {
        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .map(str::to_string)
            .unwrap_or_else(new_request_id);
        let time_millis = headers
            .get(TIME_HEADER)
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or_else(now_millis);
        (request_id, time_millis)
    }

    /// Строит контекст выполнения для сообщения, полученного только что.
    pub fn build(
        topic: Arc<str>,
        group: Option<String>,
        headers: &Headers,
    ) -> MessageContext {
        let (request_id, time_millis) = Self::extract(headers);
        let received_at = Instant::now();
        let elapsed_ms = elapsed_millis(time_millis);

        let span = info_span!(
            "message",
            endpoint = &*topic,
            group = group.as_deref().unwrap_or(""),
            request_id = request_id.as_str(),
            time = time_millis,
            elapsed_ms = elapsed_ms,
        );

        MessageContext {
            trace: TraceContext {
                request_id: Some(request_id),
                time_millis: Some(time_millis),
            },
            topic,
            group,
            received_at,
            deadline: received_at + HANDLER_DEADLINE,
            elapsed_ms,
            span,
        }
    }
}

impl MessageContext {
    /// Трассировочный контекст сообщения; оба значения заполнены.
    ///
    /// Передайте его в `publish`, чтобы продолжить ту же цепочку запросов.
    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    pub fn request_id(&self) -> &str {
        self.trace.request_id.as_deref().unwrap_or_default()
    }

    pub fn time_millis(&self) -> i64 {
        self.trace.time_millis.unwrap_or_default()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Имя очереди; `None` для широковещательной подписки.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Задержка доставки на момент получения, мс.
    pub fn elapsed_ms(&self) -> i64 {
        self.elapsed_ms
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Сколько осталось до дедлайна; ноль, если он уже прошёл.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Span с полями `endpoint`, `request_id`, `time`, `elapsed_ms`.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Выполняет `fut`, но не дольше дедлайна сообщения.
    ///
    /// Сам обработчик дедлайн не прерывает; это способ для обработчика
    /// ограничить собственные вызовы.
    pub async fn run_until_deadline<F>(
        &self,
        fut: F,
    ) -> Result<F::Output, Elapsed>
    where
        F: Future,
    {
        tokio::time::timeout_at(self.deadline, fut).await
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
