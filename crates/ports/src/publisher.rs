//! Publisher trait 定义

use async_trait::async_trait;
use courier_errors::{AppError, AppResult};

use crate::Message;

/// 消息发布者 trait
///
/// 可被多个调用方并发调用，也会在消费任务的重试路径中被调用。
#[async_trait]
pub trait Publisher: Send + Sync {
    /// 发布消息到 `message.topic`
    async fn publish(&self, message: Message) -> AppResult<()>;

    /// 释放发布端连接（幂等）
    async fn close(&self) -> AppResult<()>;
}

/// 校验 topic 名称
pub fn validate_topic(topic: &str) -> AppResult<()> {
    if topic.trim().is_empty() {
        return Err(AppError::validation("Topic must not be empty"));
    }
    Ok(())
}
