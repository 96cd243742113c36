//! Kafka Producer
//!
//! 按 topic 维护出站绑定，底层连接在首次发布时创建

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use courier_errors::{AppError, AppResult};
use courier_ports::{Message, Publisher, validate_topic};
use courier_telemetry::metric_names;
use parking_lot::{Mutex, RwLock};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, info, warn};

use crate::codec::to_kafka_headers;
use crate::config::ProducerConfig;

/// 单个 topic 的出站绑定
#[derive(Clone)]
pub struct TopicWriter {
    topic: String,
    producer: FutureProducer,
    timeout: Duration,
}

impl TopicWriter {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    async fn write(&self, message: &Message) -> AppResult<()> {
        let record = FutureRecord::to(&self.topic)
            .key(message.id.as_str())
            .payload(message.payload.as_slice())
            .headers(to_kafka_headers(message));

        self.producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(e, _)| {
                AppError::transport(format!("Failed to publish to {}: {}", self.topic, e))
            })?;

        Ok(())
    }
}

/// Kafka 发布端
pub struct KafkaPublisher {
    config: ProducerConfig,
    producer: Mutex<Option<FutureProducer>>,
    writers: RwLock<HashMap<String, TopicWriter>>,
    closed: AtomicBool,
}

impl KafkaPublisher {
    pub fn new(config: ProducerConfig) -> Self {
        Self {
            config,
            producer: Mutex::new(None),
            writers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// 获取或创建底层 producer
    fn producer(&self) -> AppResult<FutureProducer> {
        let mut slot = self.producer.lock();
        if let Some(producer) = slot.as_ref() {
            return Ok(producer.clone());
        }

        let mut client_config = ClientConfig::new();
        for (key, value) in self.config.to_client_config_entries() {
            client_config.set(&key, &value);
        }

        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| AppError::transport(format!("Failed to create Kafka producer: {}", e)))?;

        info!(brokers = %self.config.base.brokers, "Kafka producer connected");
        *slot = Some(producer.clone());
        Ok(producer)
    }

    /// 获取或创建 topic 的出站绑定
    fn writer(&self, topic: &str) -> AppResult<TopicWriter> {
        if let Some(writer) = self.writers.read().get(topic) {
            return Ok(writer.clone());
        }

        let producer = self.producer()?;
        let writer = self
            .writers
            .write()
            .entry(topic.to_string())
            .or_insert_with(|| {
                debug!(topic = %topic, "Topic writer created");
                TopicWriter {
                    topic: topic.to_string(),
                    producer,
                    timeout: self.config.delivery_timeout,
                }
            })
            .clone();

        Ok(writer)
    }

    /// 已创建出站绑定的 topic
    pub fn writer_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.writers.read().keys().cloned().collect();
        topics.sort();
        topics
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, message: Message) -> AppResult<()> {
        validate_topic(&message.topic)?;
        if self.closed.load(Ordering::Acquire) {
            return Err(AppError::closed("Kafka publisher is closed"));
        }

        let writer = self.writer(&message.topic)?;
        writer.write(&message).await?;

        debug!(
            topic = %writer.topic(),
            message_id = %message.id,
            "Message published"
        );
        metrics::counter!(metric_names::MESSAGES_PUBLISHED, "topic" => writer.topic().to_string())
            .increment(1);

        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.writers.write().clear();
        if let Some(producer) = self.producer.lock().take() {
            if let Err(e) = producer.flush(Timeout::After(self.config.delivery_timeout)) {
                warn!(error = %e, "Failed to flush Kafka producer");
            }
        }
        Ok(())
    }
}
