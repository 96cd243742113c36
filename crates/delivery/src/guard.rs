//! 订阅互斥

use std::sync::atomic::{AtomicBool, Ordering};

use courier_errors::{AppError, AppResult};

/// 订阅期间持有，保证同一适配器同时只运行一个消费循环
///
/// 释放时（包括消费循环提前返回）自动复位。
pub struct ActiveSubscription<'a>(&'a AtomicBool);

impl<'a> ActiveSubscription<'a> {
    pub fn acquire(flag: &'a AtomicBool) -> AppResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AppError::validation("A subscription is already active on this adapter"))?;
        Ok(Self(flag))
    }
}

impl Drop for ActiveSubscription<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
