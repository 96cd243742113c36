//! 订阅任务

use std::future::Future;
use std::sync::Arc;

use courier_errors::{AppError, AppResult};
use courier_ports::{MessageHandler, Subscriber};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::shutdown::ShutdownController;

/// 在独立任务中运行一个订阅
pub fn spawn_subscriber<S>(
    subscriber: Arc<S>,
    shutdown: CancellationToken,
    topic: impl Into<String>,
    handler: Arc<dyn MessageHandler>,
) -> JoinHandle<AppResult<()>>
where
    S: Subscriber + ?Sized + 'static,
{
    let topic = topic.into();
    tokio::spawn(async move {
        let result = subscriber.subscribe(shutdown, &topic, handler).await;
        if let Err(e) = &result {
            error!(topic = %topic, kind = e.kind(), error = %e, "Subscription failed");
        }
        result
    })
}

/// 运行订阅直到 `signal` 完成，然后关闭适配器
///
/// 订阅本身的错误优先于关闭错误返回。
pub async fn run_subscription<S, F>(
    subscriber: Arc<S>,
    topic: &str,
    handler: Arc<dyn MessageHandler>,
    signal: F,
) -> AppResult<()>
where
    S: Subscriber + ?Sized + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let controller = ShutdownController::new();
    let trigger = controller.trigger_on(signal);

    let task = spawn_subscriber(subscriber.clone(), controller.token(), topic, handler);
    let result = task
        .await
        .map_err(|e| AppError::internal(format!("Subscriber task failed: {}", e)))
        .and_then(|result| result);

    controller.shutdown();
    let _ = trigger.await;

    let closed = subscriber.close().await;
    info!(topic = %topic, "Subscriber shut down");
    result.and(closed)
}
