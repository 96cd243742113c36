//! courier-bootstrap - 统一 worker 启动骨架
//!
//! 所有消费服务复用的启动与关闭逻辑

mod runtime;
mod shutdown;
mod starter;
mod worker;

pub use runtime::*;
pub use shutdown::*;
pub use starter::*;
pub use worker::*;
