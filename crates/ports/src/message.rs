//! 消息信封
//!
//! 与传输协议无关的数据载体：topic、不透明负载、字符串 headers、标识符

use std::collections::HashMap;

use courier_errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 重试计数 header（十进制整数字符串）
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// 消息
///
/// `headers` 随消息值一起拥有，克隆得到独立的 map，
/// 不同消息的并发重试不会共享同一份 headers。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// 标识符，同时作为分区键
    pub id: String,
    /// 目标 topic
    pub topic: String,
    /// 负载（传输层不解析）
    pub payload: Vec<u8>,
    /// 协议元数据
    pub headers: HashMap<String, String>,
}

impl Message {
    /// 创建新消息，自动分配 UUIDv7 标识
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            topic: topic.into(),
            payload: payload.into(),
            headers: HashMap::new(),
        }
    }

    /// 从可序列化对象创建（JSON 负载）
    pub fn from_json<T: Serialize>(topic: impl Into<String>, data: &T) -> AppResult<Self> {
        let payload = serde_json::to_vec(data)
            .map_err(|e| AppError::validation(format!("Failed to serialize payload: {}", e)))?;
        Ok(Self::new(topic, payload))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// 当前重试次数，缺失或无法解析时为 0
    pub fn retry_count(&self) -> u32 {
        self.header(RETRY_COUNT_HEADER)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn with_retry_count(self, count: u32) -> Self {
        self.with_header(RETRY_COUNT_HEADER, count.to_string())
    }

    /// 以 UTF-8 字符串查看负载
    pub fn payload_str(&self) -> AppResult<&str> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| AppError::validation(format!("Payload is not valid UTF-8: {}", e)))
    }

    /// 解析 JSON 负载
    pub fn parse_json<T: for<'de> Deserialize<'de>>(&self) -> AppResult<T> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| AppError::validation(format!("Failed to parse payload: {}", e)))
    }
}
