//! adapter-memory - 进程内 broker 适配器
//!
//! 与 Kafka 适配器相同的发布、消费与提交语义，用于测试和本地开发：
//! - 追加式 topic 日志（offset）
//! - 按消费者组记录已提交 offset
//! - 故障注入（发布、拉取、提交）

mod adapter;
mod broker;

pub use adapter::*;
pub use broker::*;
