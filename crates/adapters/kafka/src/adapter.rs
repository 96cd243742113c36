//! Kafka 适配器
//!
//! 同一实例同时提供 `Publisher` 与 `Subscriber`，重试与死信经由自身的发布端

use std::sync::Arc;

use async_trait::async_trait;
use courier_config::MessagingConfig;
use courier_delivery::RetryPolicy;
use courier_errors::AppResult;
use courier_ports::{Message, MessageHandler, Publisher, Subscriber};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{ConsumerConfig, ProducerConfig};
use crate::consumer::KafkaSubscriber;
use crate::producer::KafkaPublisher;

/// Kafka 适配器
pub struct KafkaAdapter {
    publisher: Arc<KafkaPublisher>,
    subscriber: KafkaSubscriber,
}

impl KafkaAdapter {
    /// 从消息投递配置创建，此时不建立任何连接
    pub fn new(config: &MessagingConfig) -> AppResult<Self> {
        let producer = ProducerConfig::from_messaging(config)?;
        let consumer = ConsumerConfig::new(producer.base.clone(), &config.group_id);
        Ok(Self::from_parts(
            producer,
            consumer,
            RetryPolicy::from_config(config),
        ))
    }

    /// 从完整的生产端和消费端配置创建
    pub fn from_parts(producer: ProducerConfig, consumer: ConsumerConfig, policy: RetryPolicy) -> Self {
        let publisher = Arc::new(KafkaPublisher::new(producer));
        let subscriber = KafkaSubscriber::new(consumer, policy, publisher.clone());
        Self {
            publisher,
            subscriber,
        }
    }

    pub fn group_id(&self) -> &str {
        self.subscriber.group_id()
    }

    pub fn policy(&self) -> &RetryPolicy {
        self.subscriber.policy()
    }

    /// 已创建出站绑定的 topic
    pub fn writer_topics(&self) -> Vec<String> {
        self.publisher.writer_topics()
    }

    /// 关闭消费端和发布端（幂等）
    pub async fn close(&self) -> AppResult<()> {
        self.subscriber.close().await?;
        self.publisher.close().await?;
        info!(group_id = %self.group_id(), "Kafka adapter closed");
        Ok(())
    }
}

#[async_trait]
impl Publisher for KafkaAdapter {
    async fn publish(&self, message: Message) -> AppResult<()> {
        self.publisher.publish(message).await
    }

    async fn close(&self) -> AppResult<()> {
        KafkaAdapter::close(self).await
    }
}

#[async_trait]
impl Subscriber for KafkaAdapter {
    async fn subscribe(
        &self,
        shutdown: CancellationToken,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> AppResult<()> {
        self.subscriber.subscribe(shutdown, topic, handler).await
    }

    async fn close(&self) -> AppResult<()> {
        KafkaAdapter::close(self).await
    }
}
