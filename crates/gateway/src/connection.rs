//! WebSocket 连接
//!
//! 每条连接恰好两个长任务：读循环（独占解码端与会话状态）和
//! 写循环（独占编码端，从写队列取帧并定期发协议 ping）。
//! 写队列有界；入队永不阻塞，队列打满视为对端已卡死。

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval_at, timeout, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use domain::{Identity, RoomId, UserId};

use crate::dispatcher::{self, Flow};
use crate::frames::ServerFrame;
use crate::metrics::{CONNECTION_DURATION_SECONDS, DROPPED_MESSAGES_TOTAL, TASKS_COUNT};
use crate::state::AppState;

/// 进程内唯一的连接标识
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// 写队列命令
#[derive(Debug)]
pub(crate) enum WriteCommand {
    /// 应用帧（已编码的 JSON 文本）
    Text(String),
    /// 协议层 pong 回应
    Pong(Vec<u8>),
}

/// 一条存活的客户端连接
///
/// 会话字段（user_id / username / room_id）只由读任务写入；
/// 其他任务通过原子读访问快照。
pub struct Connection {
    id: ConnectionId,
    user_id: AtomicI64,
    username: RwLock<String>,
    room_id: AtomicI64,
    /// 发送端加入房间时记录房间可见性，供指标打标签
    room_private: AtomicBool,
    sender: mpsc::Sender<WriteCommand>,
    closed: AtomicBool,
    shutdown: Notify,
    connected_at: Instant,
    remote_addr: String,
}

impl Connection {
    /// 创建连接与其写队列接收端
    pub fn new(queue_cap: usize, remote_addr: String) -> (Arc<Self>, mpsc::Receiver<WriteCommand>) {
        let (sender, receiver) = mpsc::channel(queue_cap);
        let conn = Arc::new(Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            user_id: AtomicI64::new(0),
            username: RwLock::new(String::new()),
            room_id: AtomicI64::new(0),
            room_private: AtomicBool::new(false),
            sender,
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
            connected_at: Instant::now(),
            remote_addr,
        });
        (conn, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        UserId::new(self.user_id.load(Ordering::Acquire))
    }

    pub fn username(&self) -> String {
        self.username.read().expect("username lock").clone()
    }

    pub fn room_id(&self) -> RoomId {
        RoomId::new(self.room_id.load(Ordering::Acquire))
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id().is_set()
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// 记录认证身份。仅读任务调用
    pub(crate) fn set_identity(&self, identity: &Identity) {
        *self.username.write().expect("username lock") = identity.username.clone();
        self.user_id.store(identity.user_id.value(), Ordering::Release);
    }

    /// 记录当前房间。仅读任务调用
    pub(crate) fn set_room(&self, room_id: RoomId, private: bool) {
        self.room_private.store(private, Ordering::Release);
        self.room_id.store(room_id.value(), Ordering::Release);
    }

    pub(crate) fn room_type_label(&self) -> &'static str {
        if self.room_private.load(Ordering::Acquire) {
            "private"
        } else {
            "public"
        }
    }

    /// 非阻塞入队一个出站帧
    pub fn try_send(&self, frame: &ServerFrame) -> bool {
        self.try_send_raw(frame.encode())
    }

    /// 非阻塞入队已编码负载；队列满返回 false 并计入丢弃
    pub fn try_send_raw(&self, payload: String) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.sender.try_send(WriteCommand::Text(payload)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                counter!(DROPPED_MESSAGES_TOTAL).increment(1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub(crate) fn try_send_pong(&self, data: Vec<u8>) -> bool {
        if self.is_closed() {
            return false;
        }
        self.sender.try_send(WriteCommand::Pong(data)).is_ok()
    }

    /// 关闭连接。幂等：首次调用置位并唤醒两个任务，之后调用为空操作
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.shutdown.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 等待连接被关闭
    pub async fn wait_closed(&self) {
        loop {
            let notified = self.shutdown.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

/// 升级完成后的连接主流程：派生写任务，读循环在当前任务内运行
pub async fn serve_socket(socket: WebSocket, state: AppState, remote_addr: String) {
    let (conn, receiver) = Connection::new(state.config.send_queue_cap, remote_addr);
    let (sink, stream) = socket.split();

    info!(
        connection_id = conn.id(),
        remote_addr = conn.remote_addr(),
        "WebSocket connected"
    );

    let writer = tokio::spawn(write_loop(
        sink,
        receiver,
        Arc::clone(&conn),
        Duration::from_secs(state.config.write_deadline_s),
        Duration::from_secs(state.config.ping_period_s),
    ));

    read_loop(stream, Arc::clone(&conn), state).await;

    if let Err(e) = writer.await {
        warn!(connection_id = conn.id(), error = %e, "writer task aborted");
    }
}

/// 读循环：连接的所有者。退出契约——若仍在房间内，先注销再关闭。
async fn read_loop(mut stream: SplitStream<WebSocket>, conn: Arc<Connection>, state: AppState) {
    gauge!(TASKS_COUNT).increment(1.0);
    let read_deadline = Duration::from_secs(state.config.read_deadline_s);

    loop {
        // 读超时随每次成功读取（含协议 pong）顺延
        let message = tokio::select! {
            biased;
            _ = conn.wait_closed() => break,
            next = timeout(read_deadline, stream.next()) => match next {
                Err(_) => {
                    info!(connection_id = conn.id(), "read deadline expired, closing");
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    warn!(connection_id = conn.id(), error = %e, "websocket read error");
                    break;
                }
                Ok(Some(Ok(message))) => message,
            },
        };

        match message {
            WsMessage::Text(text) => {
                // 帧处理中的 panic 只终止本连接
                let dispatched = std::panic::AssertUnwindSafe(dispatcher::dispatch_text(
                    &conn,
                    &state,
                    text.as_str(),
                ))
                .catch_unwind()
                .await;

                match dispatched {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Terminate) => break,
                    Err(_) => {
                        tracing::error!(
                            connection_id = conn.id(),
                            user_id = %conn.user_id(),
                            "panic while handling frame, closing connection"
                        );
                        break;
                    }
                }
            }
            WsMessage::Ping(data) => {
                conn.try_send_pong(data.to_vec());
            }
            WsMessage::Pong(_) => {
                debug!(connection_id = conn.id(), "pong received");
            }
            WsMessage::Binary(_) => {
                debug!(connection_id = conn.id(), "binary frame ignored");
            }
            WsMessage::Close(_) => break,
        }
    }

    let room_id = conn.room_id();
    if room_id.is_set() {
        state.hub.unregister(Arc::clone(&conn), room_id).await;
    }
    conn.close();

    let duration = conn.connected_at().elapsed();
    histogram!(CONNECTION_DURATION_SECONDS).record(duration.as_secs_f64());
    info!(
        connection_id = conn.id(),
        user_id = %conn.user_id(),
        room_id = %room_id,
        duration_s = duration.as_secs(),
        "WebSocket disconnected"
    );
    gauge!(TASKS_COUNT).decrement(1.0);
}

/// 写循环：独占编码端。任何写错误即终止连接。
async fn write_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut receiver: mpsc::Receiver<WriteCommand>,
    conn: Arc<Connection>,
    write_deadline: Duration,
    ping_period: Duration,
) {
    gauge!(TASKS_COUNT).increment(1.0);

    // 首个 ping 在一个完整周期之后
    let mut ping = interval_at(Instant::now() + ping_period, ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = conn.wait_closed() => {
                // 尽力刷出一个关闭帧
                let _ = timeout(write_deadline, sink.send(WsMessage::Close(None))).await;
                break;
            }
            command = receiver.recv() => match command {
                Some(WriteCommand::Text(payload)) => {
                    match timeout(write_deadline, sink.send(WsMessage::Text(payload.into()))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            warn!(connection_id = conn.id(), error = %e, "websocket write error");
                            break;
                        }
                        Err(_) => {
                            warn!(connection_id = conn.id(), "write deadline expired");
                            break;
                        }
                    }
                }
                Some(WriteCommand::Pong(data)) => {
                    if timeout(write_deadline, sink.send(WsMessage::Pong(data.into())))
                        .await
                        .map(|r| r.is_err())
                        .unwrap_or(true)
                    {
                        break;
                    }
                }
                None => {
                    let _ = timeout(write_deadline, sink.send(WsMessage::Close(None))).await;
                    break;
                }
            },
            _ = ping.tick() => {
                // 防止空闲中间盒掐断连接
                if timeout(write_deadline, sink.send(WsMessage::Ping(Vec::new().into())))
                    .await
                    .map(|r| r.is_err())
                    .unwrap_or(true)
                {
                    break;
                }
            }
        }
    }

    conn.close();
    gauge!(TASKS_COUNT).decrement(1.0);
}
