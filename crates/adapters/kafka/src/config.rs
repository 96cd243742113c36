//! Kafka 配置模块
//!
//! 由 `MessagingConfig` 派生生产端与消费端的 rdkafka 配置项

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use courier_config::MessagingConfig;
use courier_errors::AppError;
use secrecy::{ExposeSecret, Secret};

/// Kafka 安全协议
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SecurityProtocol {
    /// 明文（默认）
    #[default]
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl SecurityProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "plaintext",
            SecurityProtocol::Ssl => "ssl",
            SecurityProtocol::SaslPlaintext => "sasl_plaintext",
            SecurityProtocol::SaslSsl => "sasl_ssl",
        }
    }
}

impl FromStr for SecurityProtocol {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plaintext" => Ok(Self::Plaintext),
            "ssl" => Ok(Self::Ssl),
            "sasl_plaintext" => Ok(Self::SaslPlaintext),
            "sasl_ssl" => Ok(Self::SaslSsl),
            other => Err(AppError::config(format!("Unknown security protocol: {}", other))),
        }
    }
}

/// SASL 认证机制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

impl SaslMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

impl FromStr for SaslMechanism {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(Self::Plain),
            "SCRAM-SHA-256" => Ok(Self::ScramSha256),
            "SCRAM-SHA-512" => Ok(Self::ScramSha512),
            other => Err(AppError::config(format!("Unknown SASL mechanism: {}", other))),
        }
    }
}

/// SASL 配置
#[derive(Debug, Clone)]
pub struct SaslConfig {
    pub mechanism: SaslMechanism,
    pub username: String,
    pub password: Secret<String>,
}

/// SSL 配置
#[derive(Debug, Clone, Default)]
pub struct SslConfig {
    /// CA 证书路径
    pub ca_location: Option<String>,
    /// 客户端证书路径
    pub certificate_location: Option<String>,
    /// 客户端私钥路径
    pub key_location: Option<String>,
}

/// 压缩类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompressionType {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl CompressionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionType::None => "none",
            CompressionType::Gzip => "gzip",
            CompressionType::Snappy => "snappy",
            CompressionType::Lz4 => "lz4",
            CompressionType::Zstd => "zstd",
        }
    }
}

impl FromStr for CompressionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            "snappy" => Ok(Self::Snappy),
            "lz4" => Ok(Self::Lz4),
            "zstd" => Ok(Self::Zstd),
            other => Err(AppError::config(format!("Unknown compression type: {}", other))),
        }
    }
}

/// 自动偏移重置策略
#[derive(Debug, Clone, Copy, Default)]
pub enum AutoOffsetReset {
    #[default]
    Earliest,
    Latest,
}

impl AutoOffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoOffsetReset::Earliest => "earliest",
            AutoOffsetReset::Latest => "latest",
        }
    }
}

/// Kafka 连接配置（生产端与消费端共用）
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// `bootstrap.servers`
    pub brokers: String,
    pub client_id: Option<String>,
    pub security_protocol: SecurityProtocol,
    pub sasl: Option<SaslConfig>,
    pub ssl: Option<SslConfig>,
    /// 额外的 rdkafka 配置项
    pub extra: HashMap<String, String>,
}

impl KafkaConfig {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            client_id: None,
            security_protocol: SecurityProtocol::default(),
            sasl: None,
            ssl: None,
            extra: HashMap::new(),
        }
    }

    /// 从消息投递配置创建
    pub fn from_messaging(config: &MessagingConfig) -> Result<Self, AppError> {
        let mut kafka = Self::new(config.bootstrap_servers());
        kafka.client_id = config.client_id.clone();

        if let Some(sasl) = &config.sasl {
            kafka = kafka.with_sasl(SaslConfig {
                mechanism: sasl.mechanism.parse()?,
                username: sasl.username.clone(),
                password: sasl.password.clone(),
            });
        }
        if let Some(ssl) = &config.ssl {
            kafka = kafka.with_ssl(SslConfig {
                ca_location: ssl.ca_location.clone(),
                certificate_location: ssl.certificate_location.clone(),
                key_location: ssl.key_location.clone(),
            });
        }
        if let Some(protocol) = &config.security_protocol {
            kafka.security_protocol = protocol.parse()?;
        }

        Ok(kafka)
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_sasl(mut self, sasl: SaslConfig) -> Self {
        self.sasl = Some(sasl);
        if self.security_protocol == SecurityProtocol::Plaintext {
            self.security_protocol = SecurityProtocol::SaslPlaintext;
        }
        self
    }

    pub fn with_ssl(mut self, ssl: SslConfig) -> Self {
        self.ssl = Some(ssl);
        self.security_protocol = match self.security_protocol {
            SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl => SecurityProtocol::SaslSsl,
            _ => SecurityProtocol::Ssl,
        };
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// 转换为 rdkafka ClientConfig 的配置项
    pub fn to_client_config_entries(&self) -> Vec<(String, String)> {
        let mut entries = vec![
            ("bootstrap.servers".to_string(), self.brokers.clone()),
            (
                "security.protocol".to_string(),
                self.security_protocol.as_str().to_string(),
            ),
        ];

        if let Some(client_id) = &self.client_id {
            entries.push(("client.id".to_string(), client_id.clone()));
        }

        if let Some(sasl) = &self.sasl {
            entries.push((
                "sasl.mechanism".to_string(),
                sasl.mechanism.as_str().to_string(),
            ));
            entries.push(("sasl.username".to_string(), sasl.username.clone()));
            entries.push((
                "sasl.password".to_string(),
                sasl.password.expose_secret().clone(),
            ));
        }

        if let Some(ssl) = &self.ssl {
            let locations = [
                ("ssl.ca.location", &ssl.ca_location),
                ("ssl.certificate.location", &ssl.certificate_location),
                ("ssl.key.location", &ssl.key_location),
            ];
            for (key, value) in locations {
                if let Some(value) = value {
                    entries.push((key.to_string(), value.clone()));
                }
            }
        }

        for (key, value) in &self.extra {
            entries.push((key.clone(), value.clone()));
        }

        entries
    }
}

/// Producer 配置
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub base: KafkaConfig,
    pub compression: CompressionType,
    /// 确认模式：0=不等待，1=leader确认，-1=所有副本确认
    pub acks: i32,
    /// 延迟发送时间（用于批量）
    pub linger_ms: u64,
    /// 单条消息投递超时
    pub delivery_timeout: Duration,
    pub enable_idempotence: bool,
}

impl ProducerConfig {
    pub fn new(base: KafkaConfig) -> Self {
        Self {
            base,
            compression: CompressionType::default(),
            acks: -1,
            linger_ms: 5,
            delivery_timeout: Duration::from_secs(30),
            enable_idempotence: false,
        }
    }

    /// 从消息投递配置创建，解析 `compression`
    pub fn from_messaging(config: &MessagingConfig) -> Result<Self, AppError> {
        let mut producer = Self::new(KafkaConfig::from_messaging(config)?);
        if let Some(compression) = &config.compression {
            producer.compression = compression.parse()?;
        }
        Ok(producer)
    }

    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub fn with_idempotence(mut self) -> Self {
        self.enable_idempotence = true;
        self.acks = -1; // 幂等性需要 acks=-1
        self
    }

    pub fn to_client_config_entries(&self) -> Vec<(String, String)> {
        let mut entries = self.base.to_client_config_entries();

        entries.push((
            "compression.type".to_string(),
            self.compression.as_str().to_string(),
        ));
        entries.push(("acks".to_string(), self.acks.to_string()));
        entries.push(("linger.ms".to_string(), self.linger_ms.to_string()));
        entries.push((
            "message.timeout.ms".to_string(),
            self.delivery_timeout.as_millis().to_string(),
        ));

        if self.enable_idempotence {
            entries.push(("enable.idempotence".to_string(), "true".to_string()));
        }

        entries
    }
}

/// Consumer 配置
///
/// 偏移量只在处理完成后手动提交，`enable.auto.commit` 固定为 false。
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub base: KafkaConfig,
    pub group_id: String,
    pub auto_offset_reset: AutoOffsetReset,
    pub session_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl ConsumerConfig {
    pub fn new(base: KafkaConfig, group_id: impl Into<String>) -> Self {
        Self {
            base,
            group_id: group_id.into(),
            auto_offset_reset: AutoOffsetReset::default(),
            session_timeout: Duration::from_secs(45),
            heartbeat_interval: Duration::from_secs(3),
        }
    }

    pub fn with_auto_offset_reset(mut self, reset: AutoOffsetReset) -> Self {
        self.auto_offset_reset = reset;
        self
    }

    pub fn to_client_config_entries(&self) -> Vec<(String, String)> {
        let mut entries = self.base.to_client_config_entries();

        entries.push(("group.id".to_string(), self.group_id.clone()));
        entries.push(("enable.auto.commit".to_string(), "false".to_string()));
        entries.push((
            "auto.offset.reset".to_string(),
            self.auto_offset_reset.as_str().to_string(),
        ));
        entries.push((
            "session.timeout.ms".to_string(),
            self.session_timeout.as_millis().to_string(),
        ));
        entries.push((
            "heartbeat.interval.ms".to_string(),
            self.heartbeat_interval.as_millis().to_string(),
        ));

        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_config::{SaslCredentials, SslFiles};

    fn has(entries: &[(String, String)], key: &str, value: &str) -> bool {
        entries.iter().any(|(k, v)| k == key && v == value)
    }

    #[test]
    fn test_kafka_config_from_messaging() {
        let mut messaging = MessagingConfig::new("k1:9092,k2:9092", "orders").with_client_id("courier-1");
        messaging.sasl = Some(SaslCredentials {
            mechanism: "scram-sha-512".to_string(),
            username: "svc".to_string(),
            password: Secret::new("pw".to_string()),
        });

        let config = KafkaConfig::from_messaging(&messaging).unwrap();
        let entries = config.to_client_config_entries();

        assert!(has(&entries, "bootstrap.servers", "k1:9092,k2:9092"));
        assert!(has(&entries, "client.id", "courier-1"));
        assert!(has(&entries, "security.protocol", "sasl_plaintext"));
        assert!(has(&entries, "sasl.mechanism", "SCRAM-SHA-512"));
        assert!(has(&entries, "sasl.password", "pw"));
    }

    #[test]
    fn test_explicit_security_protocol_wins() {
        let mut messaging = MessagingConfig::new("k1:9092", "orders");
        messaging.security_protocol = Some("SSL".to_string());

        let config = KafkaConfig::from_messaging(&messaging).unwrap();
        assert_eq!(config.security_protocol, SecurityProtocol::Ssl);

        messaging.security_protocol = Some("carrier-pigeon".to_string());
        assert!(matches!(
            KafkaConfig::from_messaging(&messaging),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_ssl_upgrades_protocol() {
        let ssl = SslConfig {
            ca_location: Some("/etc/kafka/ca.pem".to_string()),
            ..Default::default()
        };
        let config = KafkaConfig::new("k1:9093").with_ssl(ssl);
        let entries = config.to_client_config_entries();

        assert!(has(&entries, "security.protocol", "ssl"));
        assert!(has(&entries, "ssl.ca.location", "/etc/kafka/ca.pem"));
    }

    #[test]
    fn test_ssl_files_from_messaging() {
        let mut messaging = MessagingConfig::new("k1:9093", "orders");
        messaging.ssl = Some(SslFiles {
            ca_location: Some("/etc/kafka/ca.pem".to_string()),
            certificate_location: Some("/etc/kafka/client.pem".to_string()),
            key_location: None,
        });

        let entries = KafkaConfig::from_messaging(&messaging)
            .unwrap()
            .to_client_config_entries();
        assert!(has(&entries, "security.protocol", "ssl"));
        assert!(has(&entries, "ssl.ca.location", "/etc/kafka/ca.pem"));
        assert!(has(&entries, "ssl.certificate.location", "/etc/kafka/client.pem"));
        assert!(!entries.iter().any(|(k, _)| k == "ssl.key.location"));

        messaging.sasl = Some(SaslCredentials {
            mechanism: "PLAIN".to_string(),
            username: "svc".to_string(),
            password: Secret::new("pw".to_string()),
        });
        let config = KafkaConfig::from_messaging(&messaging).unwrap();
        assert_eq!(config.security_protocol, SecurityProtocol::SaslSsl);

        messaging.security_protocol = Some("sasl_plaintext".to_string());
        let config = KafkaConfig::from_messaging(&messaging).unwrap();
        assert_eq!(config.security_protocol, SecurityProtocol::SaslPlaintext);
    }

    #[test]
    fn test_producer_compression_from_messaging() {
        let mut messaging = MessagingConfig::new("k1:9092", "orders");
        let config = ProducerConfig::from_messaging(&messaging).unwrap();
        assert_eq!(config.compression, CompressionType::None);

        messaging.compression = Some("LZ4".to_string());
        let entries = ProducerConfig::from_messaging(&messaging)
            .unwrap()
            .to_client_config_entries();
        assert!(has(&entries, "compression.type", "lz4"));

        messaging.compression = Some("brotli".to_string());
        assert!(matches!(
            ProducerConfig::from_messaging(&messaging),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_producer_config() {
        let config = ProducerConfig::new(KafkaConfig::new("localhost:9092"))
            .with_compression(CompressionType::Lz4)
            .with_idempotence();

        let entries = config.to_client_config_entries();
        assert!(has(&entries, "compression.type", "lz4"));
        assert!(has(&entries, "enable.idempotence", "true"));
        assert!(has(&entries, "acks", "-1"));
    }

    #[test]
    fn test_consumer_config_disables_auto_commit() {
        let config = ConsumerConfig::new(KafkaConfig::new("localhost:9092"), "audit-writers")
            .with_auto_offset_reset(AutoOffsetReset::Latest);

        let entries = config.to_client_config_entries();
        assert!(has(&entries, "group.id", "audit-writers"));
        assert!(has(&entries, "enable.auto.commit", "false"));
        assert!(has(&entries, "auto.offset.reset", "latest"));
    }
}
