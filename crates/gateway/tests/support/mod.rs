//! 集成测试支撑
//!
//! 在随机端口上拉起完整网关（内存存储 + 进程内总线 + HMAC 校验），
//! 并提供一个薄 WebSocket 客户端封装。

// 各测试二进制只用到这里的一部分
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use config::AppConfig;
use domain::{Room, RoomId, RoomVisibility, UserId};
use gateway::{router, AppState, Hub};
use infrastructure::{
    Bus, HmacTokenValidator, LocalBus, MemoryMessageStore, MemoryObjectStore, MemoryRoomDirectory,
};

pub const SECRET: &str = "test-secret-key-with-at-least-32-characters";

/// 一个跑在随机端口上的网关实例
pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: Arc<Hub>,
    pub bus: Arc<LocalBus>,
    pub directory: Arc<MemoryRoomDirectory>,
    pub store: Arc<MemoryMessageStore>,
    pub validator: Arc<HmacTokenValidator>,
    _shutdown: oneshot::Sender<()>,
}

/// 多实例测试共享的协作者集合
pub struct SharedBackends {
    pub bus: Arc<LocalBus>,
    pub directory: Arc<MemoryRoomDirectory>,
    pub store: Arc<MemoryMessageStore>,
}

impl SharedBackends {
    pub fn new() -> Self {
        Self {
            bus: Arc::new(LocalBus::new()),
            directory: Arc::new(MemoryRoomDirectory::new()),
            store: Arc::new(MemoryMessageStore::new()),
        }
    }
}

pub async fn spawn_server() -> TestServer {
    spawn_server_with(&SharedBackends::new()).await
}

/// 在共享协作者之上拉起一个实例——同一总线上的两个实例
/// 即是两台独立的聊天服务器
pub async fn spawn_server_with(backends: &SharedBackends) -> TestServer {
    let hub = Hub::spawn(backends.bus.clone() as Arc<dyn Bus>, 100);
    let validator = Arc::new(HmacTokenValidator::new(SECRET));

    let state = AppState::new(
        Arc::new(AppConfig::test_config()),
        Arc::clone(&hub),
        backends.bus.clone() as Arc<dyn Bus>,
        validator.clone(),
        backends.directory.clone(),
        backends.store.clone(),
        Arc::new(MemoryObjectStore::new()),
        None,
    );

    let app = router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    // 等服务器可用
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        hub,
        bus: backends.bus.clone(),
        directory: backends.directory.clone(),
        store: backends.store.clone(),
        validator,
        _shutdown: shutdown_tx,
    }
}

impl TestServer {
    pub fn token(&self, user_id: i64, username: &str) -> String {
        self.validator
            .issue(UserId::new(user_id), username, Duration::from_secs(3600))
            .expect("issue token")
    }

    pub fn add_room(&self, room_id: i64) {
        self.directory.insert_room(Room {
            id: RoomId::new(room_id),
            name: format!("room-{room_id}"),
            owner_id: UserId::new(1),
            visibility: RoomVisibility::Public,
            created_at: Utc::now(),
        });
    }

    pub fn add_member(&self, user_id: i64, room_id: i64) {
        self.directory
            .insert_member(UserId::new(user_id), RoomId::new(room_id));
    }

    pub async fn connect(&self) -> WsClient {
        let url = format!("ws://{}/ws", self.addr);
        let (ws, _) = connect_async(url).await.expect("ws connect");
        WsClient { ws }
    }
}

/// 测试用 WebSocket 客户端
pub struct WsClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn send_json(&mut self, value: serde_json::Value) {
        self.ws
            .send(WsMessage::Text(value.to_string().into()))
            .await
            .expect("ws send");
    }

    /// 下一个文本帧（5 秒超时）
    pub async fn recv_json(&mut self) -> serde_json::Value {
        loop {
            let message = timeout(Duration::from_secs(5), self.ws.next())
                .await
                .expect("frame within deadline")
                .expect("socket open")
                .expect("ws read");
            match message {
                WsMessage::Text(text) => {
                    return serde_json::from_str(text.as_str()).expect("frame json")
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
                other => panic!("unexpected ws message {other:?}"),
            }
        }
    }

    /// 跳过无关帧直到出现指定 type
    pub async fn recv_type(&mut self, frame_type: &str) -> serde_json::Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            assert!(
                tokio::time::Instant::now() < deadline,
                "no {frame_type} frame within deadline"
            );
            let frame = self.recv_json().await;
            if frame["type"] == frame_type {
                return frame;
            }
        }
    }

    /// 期望在给定窗口内收不到任何满足谓词的帧
    pub async fn expect_silence(
        &mut self,
        window: Duration,
        mut forbidden: impl FnMut(&serde_json::Value) -> bool,
    ) {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return;
            }
            match timeout(remaining, self.ws.next()).await {
                Err(_) => return,
                Ok(None) => return,
                Ok(Some(Ok(WsMessage::Text(text)))) => {
                    let frame: serde_json::Value =
                        serde_json::from_str(text.as_str()).expect("frame json");
                    assert!(!forbidden(&frame), "forbidden frame received: {frame}");
                }
                Ok(Some(_)) => continue,
            }
        }
    }

    pub async fn authenticate(&mut self, token: &str) {
        self.send_json(serde_json::json!({"type": "auth", "token": token}))
            .await;
        let reply = self.recv_json().await;
        assert_eq!(reply["type"], "success", "auth reply: {reply}");
        assert_eq!(reply["message"], "Authenticated successfully");
    }

    pub async fn join_room(&mut self, room_id: i64) {
        self.send_json(serde_json::json!({"type": "join_room", "room_id": room_id}))
            .await;
        let reply = self.recv_type("room_joined").await;
        assert_eq!(reply["room_id"], room_id);
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }

    /// 等待服务端关闭连接
    pub async fn wait_server_close(&mut self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            assert!(
                tokio::time::Instant::now() < deadline,
                "server did not close the socket"
            );
            match timeout(Duration::from_secs(5), self.ws.next()).await {
                Ok(None) => return,
                Ok(Some(Ok(WsMessage::Close(_)))) => return,
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(_))) => return,
                Err(_) => panic!("server did not close the socket"),
            }
        }
    }
}
