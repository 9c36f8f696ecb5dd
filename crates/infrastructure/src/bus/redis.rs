//! Redis 总线
//!
//! 发布端使用多路复用连接；订阅端在后台任务中维护 PSUBSCRIBE 连接，
//! 断开后指数退避自动重连并重新订阅。重连窗口内丢失的事件可接受。

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, warn};

use super::{Bus, BusError, BusResult, BusSubscription};

/// 重连初始退避
const RECONNECT_BASE: Duration = Duration::from_millis(500);
/// 重连最大退避
const RECONNECT_MAX: Duration = Duration::from_secs(30);
/// 订阅流上的轮询超时，用于周期性检查关闭信号
const RECV_POLL: Duration = Duration::from_secs(1);

/// Redis Pub/Sub 总线
pub struct RedisBus {
    client: redis::Client,
    publish_conn: redis::aio::MultiplexedConnection,
    shutdown: Arc<AtomicBool>,
}

impl RedisBus {
    /// 连接 Redis
    ///
    /// # 参数
    /// - `addr`: redis:// 地址
    /// - `auth`: 可选口令，地址中未携带认证信息时注入
    pub async fn connect(addr: &str, auth: Option<&str>) -> BusResult<Self> {
        let url = match auth {
            Some(password) if !addr.contains('@') => {
                addr.replacen("redis://", &format!("redis://:{password}@"), 1)
            }
            _ => addr.to_string(),
        };

        let client = redis::Client::open(url.as_str()).map_err(|e| BusError::Config {
            message: format!("invalid redis url: {e}"),
        })?;

        let publish_conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BusError::connection(e.to_string()))?;

        info!("已连接 Redis 总线: {addr}");

        Ok(Self {
            client,
            publish_conn,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 停止所有订阅任务
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// 单轮订阅：建立连接、订阅模式、泵消息直到出错或关闭
    async fn pump_messages(
        client: &redis::Client,
        pattern: &str,
        sender: &mpsc::UnboundedSender<(String, Vec<u8>)>,
        shutdown: &AtomicBool,
    ) -> BusResult<()> {
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::connection(format!("pubsub connection failed: {e}")))?;

        pubsub
            .psubscribe(pattern)
            .await
            .map_err(|e| BusError::subscribe(format!("psubscribe {pattern} failed: {e}")))?;

        debug!(pattern, "redis pattern subscription established");

        let mut stream = pubsub.on_message();
        loop {
            if shutdown.load(Ordering::Relaxed) || sender.is_closed() {
                return Ok(());
            }

            match timeout(RECV_POLL, stream.next()).await {
                Ok(Some(msg)) => {
                    let channel = msg.get_channel_name().to_string();
                    match msg.get_payload::<Vec<u8>>() {
                        Ok(payload) => {
                            if sender.send((channel, payload)).is_err() {
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            warn!(%channel, error = %e, "failed to read bus payload");
                        }
                    }
                }
                // 流终止意味着连接断开，交给外层重连
                Ok(None) => {
                    return Err(BusError::connection("pubsub stream closed".to_string()))
                }
                // 超时仅用于回到循环头检查关闭信号
                Err(_) => continue,
            }
        }
    }
}

#[async_trait]
impl Bus for RedisBus {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> BusResult<()> {
        let mut conn = self.publish_conn.clone();
        let receivers: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(|e| BusError::publish(e.to_string()))?;
        debug!(channel, receivers, "published to redis channel");
        Ok(())
    }

    async fn subscribe_pattern(&self, pattern: &str) -> BusResult<BusSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let pattern = pattern.to_string();
        let shutdown = Arc::clone(&self.shutdown);

        tokio::spawn(async move {
            let mut backoff = RECONNECT_BASE;
            while !shutdown.load(Ordering::Relaxed) && !tx.is_closed() {
                match Self::pump_messages(&client, &pattern, &tx, &shutdown).await {
                    Ok(()) => break,
                    Err(e) => {
                        error!(%pattern, error = %e, "redis subscription lost, reconnecting");
                        sleep(backoff).await;
                        backoff = (backoff * 2).min(RECONNECT_MAX);
                    }
                }
            }
            info!(%pattern, "redis 订阅任务已停止");
        });

        Ok(BusSubscription::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 集成测试需要本地 Redis 实例
    fn redis_url() -> Option<String> {
        std::env::var("REDIS_INTEGRATION_TEST")
            .ok()
            .map(|_| std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()))
    }

    #[tokio::test]
    async fn publish_and_pattern_subscribe_round_trip() {
        let Some(url) = redis_url() else { return };

        let bus = RedisBus::connect(&url, None).await.expect("connect");
        let mut sub = bus.subscribe_pattern("room:*").await.expect("subscribe");

        // 订阅建立是异步的，留出注册时间
        sleep(Duration::from_millis(200)).await;

        bus.publish("room:901", b"cross-instance".to_vec())
            .await
            .expect("publish");

        let (channel, payload) = timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("delivery within deadline")
            .expect("subscription alive");
        assert_eq!(channel, "room:901");
        assert_eq!(payload, b"cross-instance");

        bus.shutdown();
    }

    #[tokio::test]
    async fn auth_is_injected_into_plain_url() {
        // 只验证 URL 组装逻辑，不建立连接
        let addr = "redis://example.com:6379";
        let with_auth = addr.replacen("redis://", "redis://:secret@", 1);
        assert_eq!(with_auth, "redis://:secret@example.com:6379");
    }
}
