//! 进程内适配器
//!
//! 实现 `Publisher` 与 `Subscriber`，与 Kafka 适配器共用 `courier_delivery::consume`。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use courier_config::MessagingConfig;
use courier_delivery::{ActiveSubscription, ConsumeTransport, Delivery, RetryHandler, RetryPolicy, consume};
use courier_errors::{AppError, AppResult};
use courier_ports::{Message, MessageHandler, Publisher, Subscriber, validate_topic};
use courier_telemetry::metric_names;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broker::MemoryBroker;

/// 单个 topic 的出站绑定
#[derive(Clone)]
pub struct TopicWriter {
    topic: String,
    broker: MemoryBroker,
}

impl TopicWriter {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn write(&self, message: Message) -> AppResult<u64> {
        self.broker.append(message)
    }
}

/// 发布端
pub struct MemoryPublisher {
    broker: MemoryBroker,
    writers: RwLock<HashMap<String, TopicWriter>>,
    closed: AtomicBool,
}

impl MemoryPublisher {
    pub fn new(broker: MemoryBroker) -> Self {
        Self {
            broker,
            writers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// 获取或创建 topic 的出站绑定
    fn writer(&self, topic: &str) -> TopicWriter {
        if let Some(writer) = self.writers.read().get(topic) {
            return writer.clone();
        }

        self.writers
            .write()
            .entry(topic.to_string())
            .or_insert_with(|| {
                debug!(topic = %topic, "Topic writer created");
                TopicWriter {
                    topic: topic.to_string(),
                    broker: self.broker.clone(),
                }
            })
            .clone()
    }

    /// 已创建出站绑定的 topic
    pub fn writer_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.writers.read().keys().cloned().collect();
        topics.sort();
        topics
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, message: Message) -> AppResult<()> {
        validate_topic(&message.topic)?;
        if self.closed.load(Ordering::Acquire) {
            return Err(AppError::closed("Memory publisher is closed"));
        }

        let writer = self.writer(&message.topic);
        let message_id = message.id.clone();
        let offset = writer.write(message)?;

        debug!(
            topic = %writer.topic(),
            message_id = %message_id,
            offset,
            "Message published"
        );
        metrics::counter!(metric_names::MESSAGES_PUBLISHED, "topic" => writer.topic().to_string())
            .increment(1);

        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        self.closed.store(true, Ordering::Release);
        self.writers.write().clear();
        Ok(())
    }
}

/// 消费端连接
struct MemoryConsumer {
    broker: MemoryBroker,
    group_id: String,
}

impl MemoryConsumer {
    async fn fetch(&self, topic: &str, offset: u64) -> AppResult<Message> {
        self.broker.fetch(topic, offset).await
    }

    fn commit(&self, topic: &str, offset: u64) -> AppResult<()> {
        self.broker.commit(&self.group_id, topic, offset)
    }
}

/// 单个订阅的读取位置，从消费组已提交的 offset 开始
struct MemoryCursor {
    consumer: Arc<MemoryConsumer>,
    topic: String,
    next: AtomicU64,
}

#[async_trait]
impl ConsumeTransport for MemoryCursor {
    type Position = u64;

    async fn fetch(&self) -> AppResult<Delivery<u64>> {
        let offset = self.next.load(Ordering::Acquire);
        let message = self.consumer.fetch(&self.topic, offset).await?;
        self.next.store(offset + 1, Ordering::Release);
        Ok(Delivery::new(message, offset))
    }

    async fn commit(&self, offset: &u64) -> AppResult<()> {
        self.consumer.commit(&self.topic, *offset)
    }
}

/// 进程内适配器
pub struct MemoryAdapter {
    broker: MemoryBroker,
    group_id: String,
    policy: RetryPolicy,
    publisher: Arc<MemoryPublisher>,
    consumer: Mutex<Option<Arc<MemoryConsumer>>>,
    subscribed: AtomicBool,
    closed: CancellationToken,
}

impl MemoryAdapter {
    pub fn new(broker: MemoryBroker, config: &MessagingConfig) -> Self {
        Self::with_policy(broker, &config.group_id, RetryPolicy::from_config(config))
    }

    pub fn with_policy(broker: MemoryBroker, group_id: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            publisher: Arc::new(MemoryPublisher::new(broker.clone())),
            broker,
            group_id: group_id.into(),
            policy,
            consumer: Mutex::new(None),
            subscribed: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// 已创建出站绑定的 topic
    pub fn writer_topics(&self) -> Vec<String> {
        self.publisher.writer_topics()
    }

    /// 获取或创建消费端连接
    fn consumer(&self) -> Arc<MemoryConsumer> {
        self.consumer
            .lock()
            .get_or_insert_with(|| {
                info!(group_id = %self.group_id, "Memory consumer connected");
                Arc::new(MemoryConsumer {
                    broker: self.broker.clone(),
                    group_id: self.group_id.clone(),
                })
            })
            .clone()
    }

    /// 关闭发布端和消费端（幂等）
    pub async fn close(&self) -> AppResult<()> {
        if self.closed.is_cancelled() {
            return Ok(());
        }
        self.closed.cancel();
        self.publisher.close().await?;
        self.consumer.lock().take();
        info!(group_id = %self.group_id, "Memory adapter closed");
        Ok(())
    }
}

#[async_trait]
impl Publisher for MemoryAdapter {
    async fn publish(&self, message: Message) -> AppResult<()> {
        self.publisher.publish(message).await
    }

    async fn close(&self) -> AppResult<()> {
        MemoryAdapter::close(self).await
    }
}

#[async_trait]
impl Subscriber for MemoryAdapter {
    async fn subscribe(
        &self,
        shutdown: CancellationToken,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> AppResult<()> {
        validate_topic(topic)?;
        if self.closed.is_cancelled() {
            return Err(AppError::closed("Memory adapter is closed"));
        }
        let _active = ActiveSubscription::acquire(&self.subscribed)?;

        let handler = RetryHandler::new(handler, self.policy.clone(), self.publisher.clone());
        let offset = self.broker.committed(&self.group_id, topic);
        let cursor = MemoryCursor {
            consumer: self.consumer(),
            topic: topic.to_string(),
            next: AtomicU64::new(offset),
        };

        info!(
            topic = %topic,
            group_id = %self.group_id,
            offset,
            "Subscribe started"
        );

        let result = consume(&cursor, &handler, topic, &shutdown, &self.closed).await;

        info!(
            topic = %topic,
            group_id = %self.group_id,
            offset = cursor.next.load(Ordering::Acquire),
            "Subscription stopped"
        );
        result
    }

    async fn close(&self) -> AppResult<()> {
        MemoryAdapter::close(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn adapter() -> MemoryAdapter {
        MemoryAdapter::with_policy(
            MemoryBroker::new(),
            "test-group",
            RetryPolicy::new(1, Duration::ZERO, "orders.dlq"),
        )
    }

    #[tokio::test]
    async fn test_publish_rejects_empty_topic() {
        let adapter = adapter();
        let result = Publisher::publish(&adapter, Message::new("", b"x".to_vec())).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(adapter.writer_topics().is_empty());
    }

    #[tokio::test]
    async fn test_publish_creates_writer_per_topic() {
        let adapter = adapter();
        for topic in ["orders", "billing", "orders"] {
            Publisher::publish(&adapter, Message::new(topic, Vec::new()))
                .await
                .unwrap();
        }

        assert_eq!(adapter.writer_topics(), vec!["billing", "orders"]);
        assert_eq!(adapter.broker().messages("orders").len(), 2);
        assert_eq!(adapter.broker().messages("billing").len(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let adapter = adapter();
        adapter.close().await.unwrap();
        adapter.close().await.unwrap();

        let result = Publisher::publish(&adapter, Message::new("orders", Vec::new())).await;
        assert!(matches!(result, Err(AppError::Closed(_))));
        assert!(adapter.writer_topics().is_empty());
    }

    #[tokio::test]
    async fn test_close_without_connections() {
        let adapter = adapter();
        assert!(Subscriber::close(&adapter).await.is_ok());
    }
}
