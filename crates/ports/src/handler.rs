//! 消息处理器
//!
//! 业务代码唯一的集成点，不接触任何传输层类型

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use courier_errors::AppResult;

use crate::Message;

/// 消息处理器 trait
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> AppResult<()>;
}

#[async_trait]
impl<H: MessageHandler + ?Sized> MessageHandler for Arc<H> {
    async fn handle(&self, message: &Message) -> AppResult<()> {
        (**self).handle(message).await
    }
}

/// 闭包适配的处理器，见 [`handler_fn`]
pub struct HandlerFn<F> {
    f: F,
}

/// 将 `Fn(Message) -> Future` 闭包包装为 [`MessageHandler`]
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = AppResult<()>> + Send,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = AppResult<()>> + Send,
{
    async fn handle(&self, message: &Message) -> AppResult<()> {
        (self.f)(message.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_errors::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_handler_fn() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let handler = handler_fn(move |msg: Message| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if msg.payload.is_empty() {
                    Err(AppError::handler("empty payload"))
                } else {
                    Ok(())
                }
            }
        });

        assert!(handler.handle(&Message::new("t", b"x".to_vec())).await.is_ok());
        assert!(handler.handle(&Message::new("t", Vec::new())).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_arc_dyn_handler() {
        let handler: Arc<dyn MessageHandler> =
            Arc::new(handler_fn(|_msg: Message| async { Ok::<(), AppError>(()) }));
        assert!(handler.handle(&Message::new("t", Vec::new())).await.is_ok());
    }
}
