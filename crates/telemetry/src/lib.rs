//! telemetry - 可观测性库

use courier_errors::{AppError, AppResult};
use metrics::{Unit, describe_counter};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// 指标名称
pub mod metric_names {
    pub const MESSAGES_PUBLISHED: &str = "courier_messages_published_total";
    pub const MESSAGES_RETRIED: &str = "courier_messages_retried_total";
    pub const MESSAGES_DEAD_LETTERED: &str = "courier_messages_dead_lettered_total";
    pub const COMMIT_FAILURES: &str = "courier_commit_failures_total";
}

/// 初始化 tracing
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// 初始化 JSON 格式的 tracing（生产环境）
pub fn init_tracing_json(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// 初始化 Prometheus metrics
pub fn init_metrics() -> AppResult<metrics_exporter_prometheus::PrometheusHandle> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    describe_metrics();
    Ok(handle)
}

/// 启动 Prometheus 抓取端点（需要在 tokio 运行时内调用）
pub fn init_metrics_exporter(port: u16) -> AppResult<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| AppError::internal(format!("Failed to start Prometheus exporter: {}", e)))?;

    describe_metrics();
    Ok(())
}

/// 注册指标描述
pub fn describe_metrics() {
    describe_counter!(
        metric_names::MESSAGES_PUBLISHED,
        Unit::Count,
        "Messages handed to the broker"
    );
    describe_counter!(
        metric_names::MESSAGES_RETRIED,
        Unit::Count,
        "Failed messages republished for another attempt"
    );
    describe_counter!(
        metric_names::MESSAGES_DEAD_LETTERED,
        Unit::Count,
        "Messages routed to the dead-letter topic"
    );
    describe_counter!(
        metric_names::COMMIT_FAILURES,
        Unit::Count,
        "Offset commits that failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_are_rendered() {
        let handle = init_metrics().unwrap();
        metrics::counter!(metric_names::MESSAGES_PUBLISHED, "topic" => "orders").increment(2);

        let rendered = handle.render();
        assert!(rendered.contains("courier_messages_published_total"));
        assert!(rendered.contains("topic=\"orders\""));
    }
}
