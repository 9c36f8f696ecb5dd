//! 消息总线
//!
//! 集群级发布/订阅基底。尽力而为语义：不保证持久化、重放或
//! at-least-once 投递；单一频道内保证发布顺序。

mod error;
mod local;
mod redis;

pub use error::{BusError, BusResult};
pub use local::LocalBus;
pub use redis::RedisBus;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// 订阅流
///
/// 背后是实现方维护的接收通道；实现方负责在后端瞬断时透明重连，
/// 重连窗口内丢失的事件可接受。
pub struct BusSubscription {
    receiver: mpsc::UnboundedReceiver<(String, Vec<u8>)>,
}

impl BusSubscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<(String, Vec<u8>)>) -> Self {
        Self { receiver }
    }

    /// 接收下一条 `(频道, 负载)`；订阅终止时返回 `None`
    pub async fn recv(&mut self) -> Option<(String, Vec<u8>)> {
        self.receiver.recv().await
    }
}

/// 集群消息总线
#[async_trait]
pub trait Bus: Send + Sync {
    /// 发布到指定频道，fire-and-forget
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> BusResult<()>;

    /// 按模式订阅（如 `room:*`），同一频道内按发布顺序投递
    async fn subscribe_pattern(&self, pattern: &str) -> BusResult<BusSubscription>;
}
