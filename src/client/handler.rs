use std::{future::Future, sync::Arc};

use async_trait::async_trait;

use crate::{message::InboundMessage, trace::MessageContext};

/// Обработчик входящих сообщений.
///
/// Реализован для любых замыканий вида
/// `Fn(MessageContext, InboundMessage) -> impl Future<Output = anyhow::Result<()>>`.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        ctx: MessageContext,
        msg: InboundMessage,
    ) -> anyhow::Result<()>;
}

/// Обработчик, разделяемый между задачами доставки.
pub type SharedHandler = Arc<dyn MessageHandler>;

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(MessageContext, InboundMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(
        &self,
        ctx: MessageContext,
        msg: InboundMessage,
    ) -> anyhow::Result<()> {
        (self)(ctx, msg).await
    }
}
