//! Graceful Shutdown

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shutdown 控制器
///
/// 所有订阅共享同一个取消令牌；触发后各消费循环在下一轮退出。
#[derive(Clone, Default)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// 交给 `Subscriber::subscribe` 的令牌
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// 触发关闭
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("Triggering shutdown");
        }
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待关闭被触发
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// `signal` 完成后触发关闭
    pub fn trigger_on<F>(&self, signal: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let controller = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = signal => controller.shutdown(),
                _ = controller.wait() => {}
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_tokens_follow_controller() {
        let controller = ShutdownController::new();
        let first = controller.token();
        let second = controller.token();
        assert!(!first.is_cancelled());

        controller.shutdown();
        controller.shutdown();

        assert!(controller.is_shutdown());
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());
    }

    #[tokio::test]
    async fn test_trigger_on_signal() {
        let controller = ShutdownController::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = controller.trigger_on(async move {
            let _ = rx.await;
        });

        assert!(!controller.is_shutdown());
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), controller.wait())
            .await
            .unwrap();
        handle.await.unwrap();
    }
}
