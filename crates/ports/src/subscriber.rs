//! Subscriber trait 定义

use std::sync::Arc;

use async_trait::async_trait;
use courier_errors::AppResult;
use tokio_util::sync::CancellationToken;

use crate::MessageHandler;

/// 消息订阅者 trait
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// 持续消费 `topic` 并分发给 `handler`
    ///
    /// 阻塞直到 `shutdown` 被取消或适配器关闭，调用方应在独立任务中运行。
    /// 同一订阅内严格按顺序处理。
    async fn subscribe(
        &self,
        shutdown: CancellationToken,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> AppResult<()>;

    /// 释放消费端连接（幂等）
    async fn close(&self) -> AppResult<()>;
}
