//! courier-errors - 统一错误处理
//!
//! 消息投递子系统的错误分类：传输、处理器、死信、提交

use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 与 broker 的连接或发送失败
    #[error("Transport error: {0}")]
    Transport(String),

    /// 业务处理器返回的失败
    #[error("Handler error: {0}")]
    Handler(String),

    /// 死信投递失败，唯一会向消费循环上抛的处理器路径错误
    #[error("Dead-letter error: {0}")]
    DeadLetter(String),

    /// 偏移量提交失败
    #[error("Commit error: {0}")]
    Commit(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// 适配器已关闭
    #[error("Closed: {0}")]
    Closed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    pub fn dead_letter(msg: impl Into<String>) -> Self {
        Self::DeadLetter(msg.into())
    }

    pub fn commit(msg: impl Into<String>) -> Self {
        Self::Commit(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn closed(msg: impl Into<String>) -> Self {
        Self::Closed(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 瞬时故障，重新拉取或重发可能成功
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Commit(_))
    }

    /// 错误分类名（用于日志与指标标签）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Handler(_) => "handler",
            Self::DeadLetter(_) => "dead_letter",
            Self::Commit(_) => "commit",
            Self::Validation(_) => "validation",
            Self::Config(_) => "config",
            Self::Closed(_) => "closed",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::transport("broker down").is_retryable());
        assert!(AppError::commit("offset").is_retryable());
        assert!(!AppError::handler("bad input").is_retryable());
        assert!(!AppError::dead_letter("dlq down").is_retryable());
        assert!(!AppError::closed("adapter").is_retryable());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(AppError::dead_letter("dlq down").kind(), "dead_letter");
        assert_eq!(AppError::commit("offset").kind(), "commit");
        assert_eq!(AppError::transport("broker down").kind(), "transport");
        assert_eq!(AppError::config("bad").to_string(), "Configuration error: bad");
    }
}
