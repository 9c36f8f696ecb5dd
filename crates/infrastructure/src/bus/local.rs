//! 进程内总线
//!
//! 基于 `tokio::sync::broadcast` 的单实例实现。多个 Hub 共享同一个
//! `LocalBus`（克隆即可）时行为与外部总线一致，测试里用它模拟多实例。

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use super::{Bus, BusResult, BusSubscription};

const LOCAL_BUS_CAPACITY: usize = 1024;

/// 进程内广播总线
#[derive(Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<(String, Vec<u8>)>,
}

impl LocalBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LOCAL_BUS_CAPACITY);
        Self { sender }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

/// 频道名是否命中模式；仅支持尾部 `*` 通配，与外部总线的
/// 模式订阅用法保持一致。
fn channel_matches(pattern: &str, channel: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => channel.starts_with(prefix),
        None => channel == pattern,
    }
}

#[async_trait]
impl Bus for LocalBus {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> BusResult<()> {
        // 没有订阅者时 send 返回 Err，对总线而言不是错误
        let _ = self.sender.send((channel.to_string(), payload));
        Ok(())
    }

    async fn subscribe_pattern(&self, pattern: &str) -> BusResult<BusSubscription> {
        let mut receiver = self.sender.subscribe();
        let pattern = pattern.to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok((channel, payload)) => {
                        if !channel_matches(&pattern, &channel) {
                            continue;
                        }
                        if tx.send((channel, payload)).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // 尽力而为语义：滞后即丢失
                        tracing::warn!(skipped, "local bus subscriber lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(BusSubscription::new(rx))
    }
}
