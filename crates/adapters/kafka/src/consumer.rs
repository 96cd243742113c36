//! Kafka Consumer
//!
//! 拉取 -> 重试/死信装饰器 -> 手动提交 offset，循环本身见 `courier_delivery::consume`

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use async_trait::async_trait;
use courier_delivery::{ActiveSubscription, ConsumeTransport, Delivery, RetryHandler, RetryPolicy, consume};
use courier_errors::{AppError, AppResult};
use courier_ports::{MessageHandler, Publisher, Subscriber, validate_topic};
use parking_lot::Mutex;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message as KafkaMessage;
use rdkafka::{Offset, TopicPartitionList};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::codec::from_kafka;
use crate::config::ConsumerConfig;

/// 已拉取消息的分区位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaPosition {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl KafkaPosition {
    /// 提交 `offset + 1`，即消费组下一条要读的消息
    fn to_commit_list(&self) -> AppResult<TopicPartitionList> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.topic, self.partition, Offset::Offset(self.offset + 1))
            .map_err(|e| AppError::commit(e.to_string()))?;
        Ok(tpl)
    }
}

/// 订阅期间的 consumer 句柄
struct KafkaCursor {
    consumer: Arc<StreamConsumer>,
}

#[async_trait]
impl ConsumeTransport for KafkaCursor {
    type Position = KafkaPosition;

    async fn fetch(&self) -> AppResult<Delivery<KafkaPosition>> {
        let record = self
            .consumer
            .recv()
            .await
            .map_err(|e| AppError::transport(format!("Kafka error: {}", e)))?;

        let position = KafkaPosition {
            topic: record.topic().to_string(),
            partition: record.partition(),
            offset: record.offset(),
        };
        Ok(Delivery::new(from_kafka(&record), position))
    }

    async fn commit(&self, position: &KafkaPosition) -> AppResult<()> {
        self.consumer
            .commit(&position.to_commit_list()?, CommitMode::Async)
            .map_err(|e| AppError::commit(e.to_string()))
    }
}

/// Kafka 订阅端
pub struct KafkaSubscriber {
    config: ConsumerConfig,
    policy: RetryPolicy,
    publisher: Arc<dyn Publisher>,
    consumer: Mutex<Option<Arc<StreamConsumer>>>,
    subscribed: AtomicBool,
    closed: CancellationToken,
}

impl KafkaSubscriber {
    /// `publisher` 用于重试重发和死信投递
    pub fn new(config: ConsumerConfig, policy: RetryPolicy, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            config,
            policy,
            publisher,
            consumer: Mutex::new(None),
            subscribed: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.config.group_id
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 获取或创建底层 consumer
    fn consumer(&self) -> AppResult<Arc<StreamConsumer>> {
        let mut slot = self.consumer.lock();
        if let Some(consumer) = slot.as_ref() {
            return Ok(consumer.clone());
        }

        let mut client_config = ClientConfig::new();
        for (key, value) in self.config.to_client_config_entries() {
            client_config.set(&key, &value);
        }

        let consumer: StreamConsumer = client_config
            .create()
            .map_err(|e| AppError::transport(format!("Failed to create Kafka consumer: {}", e)))?;

        info!(
            group_id = %self.config.group_id,
            brokers = %self.config.base.brokers,
            "Kafka consumer connected"
        );

        let consumer = Arc::new(consumer);
        *slot = Some(consumer.clone());
        Ok(consumer)
    }

    /// 关闭消费端（幂等），进行中的订阅在下一轮循环退出
    pub async fn close(&self) -> AppResult<()> {
        if self.closed.is_cancelled() {
            return Ok(());
        }
        self.closed.cancel();
        self.consumer.lock().take();
        info!(group_id = %self.config.group_id, "Kafka consumer closed");
        Ok(())
    }
}

#[async_trait]
impl Subscriber for KafkaSubscriber {
    async fn subscribe(
        &self,
        shutdown: CancellationToken,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> AppResult<()> {
        validate_topic(topic)?;
        if self.closed.is_cancelled() {
            return Err(AppError::closed("Kafka consumer is closed"));
        }
        let _active = ActiveSubscription::acquire(&self.subscribed)?;

        let consumer = self.consumer()?;
        consumer
            .subscribe(&[topic])
            .map_err(|e| AppError::transport(format!("Failed to subscribe to {}: {}", topic, e)))?;

        let handler = RetryHandler::new(handler, self.policy.clone(), self.publisher.clone());

        info!(
            topic = %topic,
            group_id = %self.config.group_id,
            "Subscribe started"
        );

        let cursor = KafkaCursor {
            consumer: consumer.clone(),
        };
        let result = consume(&cursor, &handler, topic, &shutdown, &self.closed).await;

        consumer.unsubscribe();

        info!(topic = %topic, group_id = %self.config.group_id, "Subscription stopped");
        result
    }

    async fn close(&self) -> AppResult<()> {
        KafkaSubscriber::close(self).await
    }
}
