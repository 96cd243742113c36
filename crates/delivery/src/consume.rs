//! 消费循环
//!
//! 拉取 -> 重试/死信装饰器 -> 提交，各适配器只提供拉取与提交。
//!
//! 死信发布失败时立即停止订阅并返回该错误，对应 offset 不提交，
//! 同一消费组重启后从这条消息重新投递。

use std::fmt::Debug;

use async_trait::async_trait;
use courier_errors::AppResult;
use courier_ports::{Message, MessageHandler};
use courier_telemetry::metric_names;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::retry::RetryHandler;

/// 一条已拉取的消息及其待提交位置
#[derive(Debug, Clone)]
pub struct Delivery<P> {
    pub message: Message,
    pub position: P,
}

impl<P> Delivery<P> {
    pub fn new(message: Message, position: P) -> Self {
        Self { message, position }
    }
}

/// 消费端传输：按顺序拉取并提交位置
#[async_trait]
pub trait ConsumeTransport: Send + Sync {
    /// 分区 / offset 等提交所需的位置
    type Position: Debug + Send + Sync;

    /// 等待下一条消息
    async fn fetch(&self) -> AppResult<Delivery<Self::Position>>;

    /// 提交已处理完的位置
    async fn commit(&self, position: &Self::Position) -> AppResult<()>;
}

/// 运行消费循环，直到 `shutdown` 或 `closed` 被取消
///
/// 拉取失败和提交失败只记录日志，循环继续；死信失败作为返回值上抛。
pub async fn consume<T, H>(
    transport: &T,
    handler: &RetryHandler<H>,
    topic: &str,
    shutdown: &CancellationToken,
    closed: &CancellationToken,
) -> AppResult<()>
where
    T: ConsumeTransport + ?Sized,
    H: MessageHandler,
{
    loop {
        if shutdown.is_cancelled() || closed.is_cancelled() {
            return Ok(());
        }

        let fetched = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(()),
            _ = closed.cancelled() => return Ok(()),
            fetched = transport.fetch() => fetched,
        };

        let Delivery { message, position } = match fetched {
            Ok(delivery) => delivery,
            Err(e) => {
                warn!(
                    topic = %topic,
                    kind = e.kind(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Failed to fetch message"
                );
                continue;
            }
        };

        match handler.process(&message).await {
            Ok(outcome) => {
                debug!(
                    topic = %topic,
                    message_id = %message.id,
                    position = ?position,
                    outcome = ?outcome,
                    "Message processed"
                );
                if let Err(e) = transport.commit(&position).await {
                    error!(
                        topic = %topic,
                        position = ?position,
                        kind = e.kind(),
                        error = %e,
                        "Failed to commit offset"
                    );
                    metrics::counter!(
                        metric_names::COMMIT_FAILURES,
                        "topic" => topic.to_string(),
                        "kind" => e.kind()
                    )
                    .increment(1);
                }
            }
            Err(e) => {
                error!(
                    topic = %topic,
                    message_id = %message.id,
                    position = ?position,
                    kind = e.kind(),
                    error = %e,
                    "Failed to dead-letter message, stopping subscription with offset uncommitted"
                );
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use courier_errors::AppError;
    use courier_ports::{Publisher, handler_fn};
    use mockall::mock;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    mock! {
        pub Broker {}

        #[async_trait]
        impl Publisher for Broker {
            async fn publish(&self, message: Message) -> AppResult<()>;
            async fn close(&self) -> AppResult<()>;
        }
    }

    /// 按脚本返回拉取结果，脚本耗尽后取消 `drained` 并挂起
    struct ScriptedTransport {
        script: Mutex<VecDeque<AppResult<Message>>>,
        fetches: Mutex<u64>,
        commits: Mutex<Vec<u64>>,
        fail_commits: bool,
        drained: CancellationToken,
    }

    impl ScriptedTransport {
        fn new(script: Vec<AppResult<Message>>, drained: &CancellationToken) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fetches: Mutex::new(0),
                commits: Mutex::new(Vec::new()),
                fail_commits: false,
                drained: drained.clone(),
            }
        }

        fn commits(&self) -> Vec<u64> {
            self.commits.lock().unwrap().clone()
        }

        fn remaining(&self) -> usize {
            self.script.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ConsumeTransport for ScriptedTransport {
        type Position = u64;

        async fn fetch(&self) -> AppResult<Delivery<u64>> {
            let next = self.script.lock().unwrap().pop_front();
            let Some(next) = next else {
                self.drained.cancel();
                return std::future::pending().await;
            };

            let mut fetches = self.fetches.lock().unwrap();
            let position = *fetches;
            *fetches += 1;
            next.map(|message| Delivery::new(message, position))
        }

        async fn commit(&self, position: &u64) -> AppResult<()> {
            self.commits.lock().unwrap().push(*position);
            if self.fail_commits {
                return Err(AppError::commit("coordinator moved"));
            }
            Ok(())
        }
    }

    /// 记录处理过的消息 id，id 为 `bad` 的消息处理失败
    fn recording(seen: Arc<Mutex<Vec<String>>>) -> impl MessageHandler {
        handler_fn(move |message: Message| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(message.id.clone());
                if message.id == "bad" {
                    Err(AppError::handler("unparseable order"))
                } else {
                    Ok(())
                }
            }
        })
    }

    fn silent_broker() -> MockBroker {
        let mut broker = MockBroker::new();
        broker.expect_publish().never();
        broker
    }

    fn message(id: &str) -> Message {
        Message::new("orders", b"{}".to_vec()).with_id(id)
    }

    #[tokio::test]
    async fn test_commits_each_handled_message() {
        let shutdown = CancellationToken::new();
        let transport = ScriptedTransport::new(vec![Ok(message("m1")), Ok(message("m2"))], &shutdown);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = RetryHandler::new(
            recording(seen.clone()),
            RetryPolicy::new(0, Duration::ZERO, "orders.dlq"),
            Arc::new(silent_broker()),
        );

        let result = consume(&transport, &handler, "orders", &shutdown, &CancellationToken::new()).await;

        assert!(result.is_ok());
        assert_eq!(transport.commits(), vec![0, 1]);
        assert_eq!(*seen.lock().unwrap(), vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_dead_letter_failure_stops_without_commit() {
        let mut broker = MockBroker::new();
        broker
            .expect_publish()
            .withf(|m| m.topic == "orders.dlq")
            .times(1)
            .returning(|_| Err(AppError::transport("dlq broker down")));

        let shutdown = CancellationToken::new();
        let transport = ScriptedTransport::new(vec![Ok(message("bad")), Ok(message("good"))], &shutdown);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = RetryHandler::new(
            recording(seen.clone()),
            RetryPolicy::new(0, Duration::ZERO, "orders.dlq"),
            Arc::new(broker),
        );

        let result = consume(&transport, &handler, "orders", &shutdown, &CancellationToken::new()).await;

        assert!(matches!(result, Err(AppError::DeadLetter(_))));
        assert!(transport.commits().is_empty());
        assert_eq!(transport.remaining(), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["bad"]);
    }

    #[tokio::test]
    async fn test_fetch_errors_are_skipped() {
        let shutdown = CancellationToken::new();
        let transport = ScriptedTransport::new(
            vec![Err(AppError::transport("partition leader changed")), Ok(message("m1"))],
            &shutdown,
        );
        let handler = RetryHandler::new(
            recording(Arc::new(Mutex::new(Vec::new()))),
            RetryPolicy::new(0, Duration::ZERO, "orders.dlq"),
            Arc::new(silent_broker()),
        );

        let result = consume(&transport, &handler, "orders", &shutdown, &CancellationToken::new()).await;

        assert!(result.is_ok());
        assert_eq!(transport.commits(), vec![1]);
    }

    #[tokio::test]
    async fn test_commit_failure_keeps_consuming() {
        let shutdown = CancellationToken::new();
        let mut transport = ScriptedTransport::new(vec![Ok(message("m1")), Ok(message("m2"))], &shutdown);
        transport.fail_commits = true;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = RetryHandler::new(
            recording(seen.clone()),
            RetryPolicy::new(0, Duration::ZERO, "orders.dlq"),
            Arc::new(silent_broker()),
        );

        let result = consume(&transport, &handler, "orders", &shutdown, &CancellationToken::new()).await;

        assert!(result.is_ok());
        assert_eq!(transport.commits(), vec![0, 1]);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_closed_token_stops_before_fetch() {
        let closed = CancellationToken::new();
        closed.cancel();
        let transport = ScriptedTransport::new(vec![Ok(message("m1"))], &CancellationToken::new());
        let handler = RetryHandler::new(
            recording(Arc::new(Mutex::new(Vec::new()))),
            RetryPolicy::new(0, Duration::ZERO, "orders.dlq"),
            Arc::new(silent_broker()),
        );

        let result = consume(&transport, &handler, "orders", &CancellationToken::new(), &closed).await;

        assert!(result.is_ok());
        assert_eq!(transport.remaining(), 1);
    }
}
