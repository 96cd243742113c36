//! ports - 消息投递抽象层
//!
//! 定义与 broker 无关的消息信封以及发布、订阅、处理器接口

mod handler;
mod message;
mod publisher;
mod subscriber;

pub use handler::*;
pub use message::*;
pub use publisher::*;
pub use subscriber::*;
