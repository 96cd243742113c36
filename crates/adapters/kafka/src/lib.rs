//! Kafka 适配器
//!
//! - 按 topic 的出站绑定，首次使用时建立连接
//! - 手动提交 offset 的消费循环，经由重试 / 死信装饰器
//! - SASL、SSL、压缩等客户端配置
//! - 健康检查

mod adapter;
mod codec;
mod config;
mod consumer;
mod health;
mod producer;

pub use adapter::*;
pub use codec::*;
pub use config::*;
pub use consumer::*;
pub use health::*;
pub use producer::*;
