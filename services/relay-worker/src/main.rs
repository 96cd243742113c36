//! relay-worker - 消费默认 topic 并记录每条消息

mod handler;

use std::sync::Arc;

use courier_bootstrap::run_worker;
use courier_ports::MessageHandler;

use handler::LoggingHandler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let handler: Arc<dyn MessageHandler> = Arc::new(LoggingHandler);
    run_worker("config", move |_config| handler).await?;
    Ok(())
}
