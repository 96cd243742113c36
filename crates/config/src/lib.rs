//! courier-config - 配置加载库
//!
//! 配置在进程启动时加载一次，之后不可变，由所有适配器实例共享。

use std::time::Duration;

use courier_errors::AppError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::Secret;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::config(err.to_string())
    }
}

/// SASL 凭证
#[derive(Debug, Clone, Deserialize)]
pub struct SaslCredentials {
    #[serde(default = "default_sasl_mechanism")]
    pub mechanism: String,
    pub username: String,
    pub password: Secret<String>,
}

/// SSL 证书路径
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SslFiles {
    #[serde(default)]
    pub ca_location: Option<String>,
    #[serde(default)]
    pub certificate_location: Option<String>,
    #[serde(default)]
    pub key_location: Option<String>,
}

fn default_sasl_mechanism() -> String {
    "PLAIN".to_string()
}

/// 消息投递配置（重试 / DLQ）
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingConfig {
    /// Broker 地址列表，支持数组或逗号分隔字符串
    #[serde(deserialize_with = "string_or_list")]
    pub brokers: Vec<String>,
    /// 消费者组 ID
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// 默认 topic
    pub topic: String,
    /// 死信 topic，未配置时为 `{topic}.dlq`
    #[serde(default)]
    pub dead_letter_topic: Option<String>,
    /// 最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 重试退避（毫秒）
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub client_id: Option<String>,
    /// plaintext / ssl / sasl_plaintext / sasl_ssl
    #[serde(default)]
    pub security_protocol: Option<String>,
    #[serde(default)]
    pub sasl: Option<SaslCredentials>,
    #[serde(default)]
    pub ssl: Option<SslFiles>,
    /// none / gzip / snappy / lz4 / zstd
    #[serde(default)]
    pub compression: Option<String>,
}

fn default_group_id() -> String {
    "courier".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        String(String),
        List(Vec<String>),
    }

    let brokers = match StringOrList::deserialize(deserializer)? {
        StringOrList::String(s) => s.split(',').map(|b| b.trim().to_string()).collect(),
        StringOrList::List(list) => list,
    };

    Ok(brokers.into_iter().filter(|b| !b.is_empty()).collect())
}

impl MessagingConfig {
    pub fn new(brokers: impl Into<String>, topic: impl Into<String>) -> Self {
        let brokers: String = brokers.into();
        Self {
            brokers: brokers
                .split(',')
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect(),
            group_id: default_group_id(),
            topic: topic.into(),
            dead_letter_topic: None,
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            client_id: None,
            security_protocol: None,
            sasl: None,
            ssl: None,
            compression: None,
        }
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    pub fn with_dead_letter_topic(mut self, topic: impl Into<String>) -> Self {
        self.dead_letter_topic = Some(topic.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// 死信 topic
    pub fn dlq_topic(&self) -> String {
        match &self.dead_letter_topic {
            Some(topic) if !topic.trim().is_empty() => topic.clone(),
            _ => format!("{}.dlq", self.topic),
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// rdkafka `bootstrap.servers` 格式
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.brokers.is_empty() {
            return Err(ConfigError::Invalid("messaging.brokers must not be empty".into()));
        }
        if self.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("messaging.topic must not be empty".into()));
        }
        if self.group_id.trim().is_empty() {
            return Err(ConfigError::Invalid("messaging.group_id must not be empty".into()));
        }
        if self.dlq_topic() == self.topic {
            return Err(ConfigError::Invalid(
                "messaging.dead_letter_topic must differ from messaging.topic".into(),
            ));
        }
        Ok(())
    }
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Prometheus 抓取端口
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9464
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_enabled: default_metrics_enabled(),
            metrics_port: default_metrics_port(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    pub app_env: String,
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 优先级：环境变量 `APP_*`（`__` 分隔层级）> `{APP_ENV}.toml` > `default.toml`
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config: Self = Figment::new()
            .merge(Serialized::default("app_env", &env))
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("APP_").split("__"))
            .extract()?;

        config.messaging.validate()?;
        Ok(config)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}
