//! courier-delivery - 至少一次投递策略
//!
//! 在原始发布/订阅传输之上叠加有界重试与死信路由，并提供各适配器共用的消费循环

mod consume;
mod guard;
mod retry;

pub use consume::*;
pub use guard::*;
pub use retry::*;
