//! 日志处理器

use async_trait::async_trait;
use courier_errors::{AppError, AppResult};
use courier_ports::{Message, MessageHandler};
use tracing::info;

/// 记录收到的每条消息
///
/// 空负载视为处理失败，交由重试 / 死信流程。
pub struct LoggingHandler;

impl LoggingHandler {
    /// JSON 负载中的 `type` 字段
    fn event_type(message: &Message) -> Option<String> {
        let value: serde_json::Value = message.parse_json().ok()?;
        value.get("type")?.as_str().map(str::to_string)
    }
}

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(&self, message: &Message) -> AppResult<()> {
        if message.payload.is_empty() {
            return Err(AppError::handler(format!(
                "Message {} has an empty payload",
                message.id
            )));
        }

        let event_type = Self::event_type(message);
        info!(
            topic = %message.topic,
            message_id = %message.id,
            retry_count = message.retry_count(),
            bytes = message.payload.len(),
            event_type = event_type.as_deref().unwrap_or("-"),
            "Message received"
        );
        Ok(())
    }
}
