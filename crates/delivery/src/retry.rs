//! 重试 / 死信装饰器
//!
//! 包装业务处理器：失败时带递增的 `x-retry-count` 重新发布到原 topic，
//! 次数耗尽后连同全部 headers 转发到死信 topic。
//!
//! 重试通过重新发布实现，计数随消息 header 传递，消费者重启后依然有效；
//! 代价是重试消息以新的 offset 追加到 topic 末尾。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_config::MessagingConfig;
use courier_errors::{AppError, AppResult};
use courier_ports::{Message, MessageHandler, Publisher};
use courier_telemetry::metric_names;
use tracing::{debug, error, warn};

/// 重试策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大重试次数
    pub max_retries: u32,
    /// 每次重试前的等待
    pub backoff: Duration,
    /// 死信 topic
    pub dlq_topic: String,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration, dlq_topic: impl Into<String>) -> Self {
        Self {
            max_retries,
            backoff,
            dlq_topic: dlq_topic.into(),
        }
    }

    pub fn from_config(config: &MessagingConfig) -> Self {
        Self::new(config.max_retries, config.retry_backoff(), config.dlq_topic())
    }
}

/// 单条消息的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 处理器成功
    Handled,
    /// 已重新发布，`attempt` 为新消息携带的重试计数
    Retried { attempt: u32 },
    /// 已转入死信 topic
    DeadLettered { attempts: u32 },
}

/// 重试 / 死信处理器
pub struct RetryHandler<H> {
    inner: H,
    policy: RetryPolicy,
    publisher: Arc<dyn Publisher>,
}

impl<H: MessageHandler> RetryHandler<H> {
    pub fn new(inner: H, policy: RetryPolicy, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            inner,
            policy,
            publisher,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 处理一条消息
    ///
    /// 只有死信发布失败会返回错误，处理器的失败都在这里被吸收。
    pub async fn process(&self, message: &Message) -> AppResult<DeliveryOutcome> {
        let attempts = message.retry_count();

        let cause = match self.inner.handle(message).await {
            Ok(()) => {
                if attempts > 0 {
                    debug!(
                        message_id = %message.id,
                        topic = %message.topic,
                        attempts,
                        "Message processed successfully after retry"
                    );
                }
                return Ok(DeliveryOutcome::Handled);
            }
            Err(e) => e,
        };

        if attempts < self.policy.max_retries {
            match self.retry(message, attempts + 1, &cause).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    // 重发失败改走死信
                    error!(
                        message_id = %message.id,
                        topic = %message.topic,
                        error = %e,
                        "Failed to republish message for retry, routing to DLQ"
                    );
                }
            }
        }

        self.dead_letter(message, attempts, &cause).await
    }

    async fn retry(
        &self,
        message: &Message,
        attempt: u32,
        cause: &AppError,
    ) -> AppResult<DeliveryOutcome> {
        warn!(
            message_id = %message.id,
            topic = %message.topic,
            attempt,
            max_retries = self.policy.max_retries,
            error = %cause,
            "Message handler failed, retrying"
        );

        let retry = message.clone().with_retry_count(attempt);

        if !self.policy.backoff.is_zero() {
            tokio::time::sleep(self.policy.backoff).await;
        }

        self.publisher.publish(retry).await?;

        metrics::counter!(metric_names::MESSAGES_RETRIED, "topic" => message.topic.clone())
            .increment(1);

        Ok(DeliveryOutcome::Retried { attempt })
    }

    async fn dead_letter(
        &self,
        message: &Message,
        attempts: u32,
        cause: &AppError,
    ) -> AppResult<DeliveryOutcome> {
        error!(
            message_id = %message.id,
            topic = %message.topic,
            dlq_topic = %self.policy.dlq_topic,
            attempts,
            error = %cause,
            "Max retries exceeded, routing message to DLQ"
        );

        let dlq_message = message
            .clone()
            .with_topic(self.policy.dlq_topic.as_str())
            .with_retry_count(attempts);

        if let Err(e) = self.publisher.publish(dlq_message).await {
            error!(
                message_id = %message.id,
                dlq_topic = %self.policy.dlq_topic,
                error = %e,
                "Failed to publish message to DLQ"
            );
            return Err(AppError::dead_letter(format!(
                "Failed to publish message {} to {}: {}",
                message.id, self.policy.dlq_topic, e
            )));
        }

        metrics::counter!(
            metric_names::MESSAGES_DEAD_LETTERED,
            "topic" => message.topic.clone()
        )
        .increment(1);

        Ok(DeliveryOutcome::DeadLettered { attempts })
    }
}

#[async_trait]
impl<H: MessageHandler> MessageHandler for RetryHandler<H> {
    async fn handle(&self, message: &Message) -> AppResult<()> {
        self.process(message).await.map(|_| ())
    }
}
