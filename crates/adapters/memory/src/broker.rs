//! 进程内 broker
//!
//! 显式构造、按值注入的共享状态（`Clone` 共享同一份日志），没有全局变量。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use courier_errors::{AppError, AppResult};
use courier_ports::Message;
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Default)]
struct BrokerState {
    /// topic -> 追加式日志，下标即 offset
    topics: HashMap<String, Vec<Message>>,
    /// (group, topic) -> 下一条待消费的 offset
    committed: HashMap<(String, String), u64>,
    failing_publishes: HashSet<String>,
    failing_commits: HashSet<String>,
    /// topic -> 剩余需要失败的拉取次数
    failing_fetches: HashMap<String, u32>,
}

/// 进程内 broker
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加消息，返回 offset
    pub fn append(&self, message: Message) -> AppResult<u64> {
        let offset = {
            let mut state = self.state.lock();
            if state.failing_publishes.contains(&message.topic) {
                return Err(AppError::transport(format!(
                    "Broker rejected publish to {}",
                    message.topic
                )));
            }
            let log = state.topics.entry(message.topic.clone()).or_default();
            log.push(message);
            (log.len() - 1) as u64
        };

        self.notify.notify_waiters();
        Ok(offset)
    }

    /// 拉取 `offset` 处的消息，不存在时等待新消息到达
    pub async fn fetch(&self, topic: &str, offset: u64) -> AppResult<Message> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(remaining) = state.failing_fetches.get_mut(topic) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(AppError::transport(format!(
                            "Fetch from {} failed",
                            topic
                        )));
                    }
                }
                if let Some(message) = state
                    .topics
                    .get(topic)
                    .and_then(|log| log.get(offset as usize))
                {
                    return Ok(message.clone());
                }
            }

            notified.await;
        }
    }

    /// 提交 offset（记录为下一条待消费位置）
    pub fn commit(&self, group_id: &str, topic: &str, offset: u64) -> AppResult<()> {
        let mut state = self.state.lock();
        if state.failing_commits.contains(topic) {
            return Err(AppError::commit(format!(
                "Commit of {}@{} rejected",
                topic, offset
            )));
        }
        let next = state
            .committed
            .entry((group_id.to_string(), topic.to_string()))
            .or_insert(0);
        *next = (*next).max(offset + 1);
        Ok(())
    }

    /// 消费者组在 topic 上的已提交位置
    pub fn committed(&self, group_id: &str, topic: &str) -> u64 {
        self.state
            .lock()
            .committed
            .get(&(group_id.to_string(), topic.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// topic 中的全部消息（按 offset 排序）
    pub fn messages(&self, topic: &str) -> Vec<Message> {
        self.state
            .lock()
            .topics
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail_publishes_to(&self, topic: impl Into<String>) {
        self.state.lock().failing_publishes.insert(topic.into());
    }

    pub fn restore_publishes_to(&self, topic: &str) {
        self.state.lock().failing_publishes.remove(topic);
    }

    pub fn fail_commits_for(&self, topic: impl Into<String>) {
        self.state.lock().failing_commits.insert(topic.into());
    }

    /// 接下来 `count` 次拉取 `topic` 返回传输错误
    pub fn fail_next_fetches(&self, topic: impl Into<String>, count: u32) {
        self.state.lock().failing_fetches.insert(topic.into(), count);
        self.notify.notify_waiters();
    }
}
