//! Kafka 健康检查

use std::time::{Duration, Instant};

use courier_config::MessagingConfig;
use courier_errors::{AppError, AppResult};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use tracing::{debug, warn};

use crate::config::KafkaConfig;

/// 健康检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckResult {
    pub healthy: bool,
    /// 获取元数据耗时（毫秒）
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
    pub broker_count: usize,
    pub topic_count: usize,
}

impl HealthCheckResult {
    fn unreachable(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency_ms: None,
            error: Some(error.into()),
            broker_count: 0,
            topic_count: 0,
        }
    }
}

/// Kafka 健康检查器
pub struct KafkaHealthChecker {
    client: BaseConsumer,
    timeout: Duration,
}

impl KafkaHealthChecker {
    pub fn new(config: &KafkaConfig) -> AppResult<Self> {
        let mut client_config = ClientConfig::new();
        for (key, value) in config.to_client_config_entries() {
            client_config.set(&key, &value);
        }

        let client: BaseConsumer = client_config
            .create()
            .map_err(|e| AppError::transport(format!("Failed to create health checker: {}", e)))?;

        Ok(Self {
            client,
            timeout: Duration::from_secs(10),
        })
    }

    pub fn from_messaging(config: &MessagingConfig) -> AppResult<Self> {
        Self::new(&KafkaConfig::from_messaging(config)?)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 拉取集群元数据，阻塞直到返回或超时
    pub fn check(&self) -> HealthCheckResult {
        let start = Instant::now();

        match self.client.fetch_metadata(None, self.timeout) {
            Ok(metadata) => {
                let latency = start.elapsed().as_millis() as u64;
                let broker_count = metadata.brokers().len();
                let topic_count = metadata.topics().len();

                debug!(
                    latency_ms = latency,
                    brokers = broker_count,
                    topics = topic_count,
                    "Kafka health check passed"
                );

                HealthCheckResult {
                    healthy: broker_count > 0,
                    latency_ms: Some(latency),
                    error: None,
                    broker_count,
                    topic_count,
                }
            }
            Err(e) => {
                warn!(error = %e, "Kafka health check failed");
                HealthCheckResult::unreachable(e.to_string())
            }
        }
    }

    /// topic 是否存在且无错误
    pub fn topic_exists(&self, topic: &str) -> AppResult<bool> {
        let metadata = self
            .client
            .fetch_metadata(Some(topic), self.timeout)
            .map_err(|e| AppError::transport(format!("Failed to fetch topic metadata: {}", e)))?;

        Ok(metadata
            .topics()
            .iter()
            .any(|t| t.name() == topic && t.error().is_none()))
    }
}

/// 在阻塞线程池中执行健康检查
pub async fn check_kafka_health(config: &MessagingConfig) -> AppResult<HealthCheckResult> {
    let kafka = KafkaConfig::from_messaging(config)?;
    tokio::task::spawn_blocking(move || Ok(KafkaHealthChecker::new(&kafka)?.check()))
        .await
        .map_err(|e| AppError::internal(format!("Health check task failed: {}", e)))?
}
