//! Worker 启动器

use std::sync::Arc;

use courier_adapter_kafka::{KafkaAdapter, check_kafka_health};
use courier_config::AppConfig;
use courier_errors::AppResult;
use courier_ports::MessageHandler;
use tracing::{info, warn};

use crate::runtime::{init_runtime, shutdown_signal};
use crate::worker::run_subscription;

/// 运行 Kafka 消费 worker
///
/// 1. 加载配置
/// 2. 初始化运行时（日志、指标）
/// 3. 检查 broker 连通性（仅告警）
/// 4. 订阅默认 topic，直到收到关闭信号
/// 5. 关闭适配器
///
/// # 示例
///
/// ```ignore
/// use courier_bootstrap::run_worker;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     run_worker("config", |config| Arc::new(MyHandler::new(config))).await?;
///     Ok(())
/// }
/// ```
pub async fn run_worker<F>(config_dir: &str, build_handler: F) -> AppResult<()>
where
    F: FnOnce(&AppConfig) -> Arc<dyn MessageHandler>,
{
    let config = AppConfig::load(config_dir)?;
    init_runtime(&config)?;

    info!(
        topic = %config.messaging.topic,
        group_id = %config.messaging.group_id,
        dlq_topic = %config.messaging.dlq_topic(),
        "Starting {} worker",
        config.app_name
    );

    let health = check_kafka_health(&config.messaging).await?;
    if !health.healthy {
        warn!(error = ?health.error, "Kafka is not reachable yet");
    }

    let adapter = Arc::new(KafkaAdapter::new(&config.messaging)?);
    let handler = build_handler(&config);

    run_subscription(adapter, &config.messaging.topic, handler, shutdown_signal()).await?;

    info!("Worker stopped");
    Ok(())
}
