//! 入站帧路由
//!
//! 每连接的状态机：NEW --auth--> AUTHENTICATED --join_room--> IN_ROOM。
//! 所有对外部协作者的调用都带 5 秒截止时间；超时以 `error` 帧回给
//! 客户端，连接保持存活（认证失败除外，认证是一次性的）。

use metrics::{counter, histogram};
use std::sync::Arc;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, warn};

use domain::{
    Attachment, MessageStore, MessageType, NewMessage, RoomDirectory, RoomEvent, RoomId,
    TokenValidator,
};
use infrastructure::Bus;

use crate::connection::Connection;
use crate::frames::{ClientFrame, ServerFrame};
use crate::metrics::{AUTH_REQUESTS_TOTAL, MESSAGES_SENT_TOTAL, MESSAGE_LATENCY_MS};
use crate::state::AppState;

/// 协作者调用截止时间
const RPC_DEADLINE: Duration = Duration::from_secs(5);

/// 帧处理结果：继续读下一帧，或终止连接
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

/// 处理一个入站文本帧
pub async fn dispatch_text(conn: &Arc<Connection>, state: &AppState, text: &str) -> Flow {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(connection_id = conn.id(), error = %e, "malformed frame");
            conn.try_send(&ServerFrame::error("Invalid message format"));
            return Flow::Continue;
        }
    };

    match frame {
        ClientFrame::Auth { token } => handle_auth(conn, state, &token).await,
        ClientFrame::JoinRoom { room_id } => handle_join_room(conn, state, room_id).await,
        ClientFrame::SendMessage {
            content,
            message_type,
            file_url,
            file_name,
            file_size,
            mime_type,
        } => {
            handle_send_message(
                conn,
                state,
                content,
                message_type.unwrap_or_default(),
                file_url,
                file_name,
                file_size,
                mime_type,
            )
            .await
        }
        ClientFrame::LeaveRoom => handle_leave_room(conn, state).await,
        ClientFrame::Ping => {
            conn.try_send(&ServerFrame::Pong);
            Flow::Continue
        }
    }
}

/// 认证是一次性的：失败即终止连接
async fn handle_auth(conn: &Arc<Connection>, state: &AppState, token: &str) -> Flow {
    if conn.is_authenticated() {
        conn.try_send(&ServerFrame::error("Already authenticated"));
        return Flow::Continue;
    }

    let validated = timeout(RPC_DEADLINE, state.token_validator.validate(token)).await;
    match validated {
        Ok(Ok(identity)) => {
            conn.set_identity(&identity);
            counter!(AUTH_REQUESTS_TOTAL, "type" => "websocket", "status" => "success")
                .increment(1);
            conn.try_send(&ServerFrame::success("Authenticated successfully"));
            debug!(
                connection_id = conn.id(),
                user_id = %identity.user_id,
                username = %identity.username,
                "client authenticated"
            );
            Flow::Continue
        }
        Ok(Err(e)) => {
            counter!(AUTH_REQUESTS_TOTAL, "type" => "websocket", "status" => "failure")
                .increment(1);
            warn!(connection_id = conn.id(), error = %e, "authentication failed");
            conn.try_send(&ServerFrame::error("Authentication failed"));
            Flow::Terminate
        }
        Err(_) => {
            counter!(AUTH_REQUESTS_TOTAL, "type" => "websocket", "status" => "timeout")
                .increment(1);
            warn!(connection_id = conn.id(), "token validation timed out");
            conn.try_send(&ServerFrame::error("Authentication failed"));
            Flow::Terminate
        }
    }
}

async fn handle_join_room(conn: &Arc<Connection>, state: &AppState, room_id: RoomId) -> Flow {
    if !conn.is_authenticated() {
        conn.try_send(&ServerFrame::error("Please authenticate first"));
        return Flow::Continue;
    }

    if !room_id.is_set() {
        conn.try_send(&ServerFrame::error("Invalid room ID"));
        return Flow::Continue;
    }

    let user_id = conn.user_id();
    let room = match timeout(RPC_DEADLINE, state.admission.check(user_id, room_id)).await {
        Ok(Ok(room)) => room,
        Ok(Err(e)) => {
            warn!(%user_id, %room_id, error = %e, "room admission denied");
            conn.try_send(&ServerFrame::error(format!("Failed to join room: {e}")));
            return Flow::Continue;
        }
        Err(_) => {
            warn!(%user_id, %room_id, "room admission timed out");
            conn.try_send(&ServerFrame::error("Failed to join room: timed out"));
            return Flow::Continue;
        }
    };

    let current = conn.room_id();
    if current == room_id {
        // 重复加入同一房间等价于一次加入，不制造新的在线状态事件
        conn.try_send(&ServerFrame::RoomJoined { room_id, room });
        return Flow::Continue;
    }

    // 切房顺序约束：旧房间的注销必须先于新注册被 Hub 观察到，
    // 否则旧房间的事件可能送达一个已经换房的客户端
    if current.is_set() {
        state.hub.unregister(Arc::clone(conn), current).await;
    }
    conn.set_room(room_id, room.is_private());
    state.hub.register(Arc::clone(conn), room_id).await;

    conn.try_send(&ServerFrame::RoomJoined { room_id, room });
    Flow::Continue
}

#[allow(clippy::too_many_arguments)]
async fn handle_send_message(
    conn: &Arc<Connection>,
    state: &AppState,
    content: String,
    message_type: MessageType,
    file_url: Option<String>,
    file_name: Option<String>,
    file_size: Option<i64>,
    mime_type: Option<String>,
) -> Flow {
    let room_id = conn.room_id();
    if !conn.is_authenticated() || !room_id.is_set() {
        conn.try_send(&ServerFrame::error(
            "Please authenticate and join a room first",
        ));
        return Flow::Continue;
    }

    let started = Instant::now();
    let user_id = conn.user_id();
    let username = conn.username();

    // 成员资格在每次发送时重新确认，而不只在加入时
    match timeout(RPC_DEADLINE, state.room_directory.is_member(user_id, room_id)).await {
        Ok(Ok(true)) => {}
        Ok(Ok(false)) => {
            conn.try_send(&ServerFrame::error(
                "Failed to send message: not a member of this room",
            ));
            return Flow::Continue;
        }
        Ok(Err(e)) => {
            warn!(%user_id, %room_id, error = %e, "membership check failed");
            conn.try_send(&ServerFrame::error("Failed to send message"));
            return Flow::Continue;
        }
        Err(_) => {
            warn!(%user_id, %room_id, "membership check timed out");
            conn.try_send(&ServerFrame::error("Failed to send message: timed out"));
            return Flow::Continue;
        }
    }

    let new_message = match message_type {
        MessageType::Text => NewMessage::text(room_id, user_id, username, content),
        MessageType::Image | MessageType::File => NewMessage::attachment(
            room_id,
            user_id,
            username,
            message_type,
            content,
            Attachment {
                file_url: file_url.unwrap_or_default(),
                file_name: file_name.unwrap_or_default(),
                file_size: file_size.unwrap_or_default(),
                mime_type: mime_type.unwrap_or_default(),
            },
        ),
    };

    let new_message = match new_message {
        Ok(message) => message,
        Err(e) => {
            conn.try_send(&ServerFrame::error(format!("Failed to send message: {e}")));
            return Flow::Continue;
        }
    };

    // 先落库，再发布；发布失败时消息不会被投递，由客户端重试
    let message = match timeout(RPC_DEADLINE, state.message_store.append(new_message)).await {
        Ok(Ok(message)) => message,
        Ok(Err(e)) => {
            warn!(%user_id, %room_id, error = %e, "message append failed");
            conn.try_send(&ServerFrame::error(format!("Failed to send message: {e}")));
            return Flow::Continue;
        }
        Err(_) => {
            warn!(%user_id, %room_id, "message append timed out");
            conn.try_send(&ServerFrame::error("Failed to send message: timed out"));
            return Flow::Continue;
        }
    };

    let event = RoomEvent::from(&message);
    let payload = match serde_json::to_vec(&event) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(%room_id, error = %e, "event serialization failed");
            conn.try_send(&ServerFrame::error("Failed to send message"));
            return Flow::Continue;
        }
    };

    // 不做本地直发：消息经总线订阅循环回流，发送者与其他成员
    // 走同一条投递路径，顺序因此一致
    match timeout(RPC_DEADLINE, state.bus.publish(&event.channel(), payload)).await {
        Ok(Ok(())) => {
            counter!(MESSAGES_SENT_TOTAL, "room_type" => conn.room_type_label()).increment(1);
            histogram!(MESSAGE_LATENCY_MS).record(started.elapsed().as_secs_f64() * 1000.0);
            debug!(
                message_id = %message.id,
                %user_id,
                %room_id,
                duration_ms = started.elapsed().as_millis() as u64,
                "message published"
            );
            Flow::Continue
        }
        Ok(Err(e)) => {
            warn!(%user_id, %room_id, error = %e, "bus publish failed");
            conn.try_send(&ServerFrame::error("Failed to send message: delivery failed"));
            Flow::Continue
        }
        Err(_) => {
            warn!(%user_id, %room_id, "bus publish timed out");
            conn.try_send(&ServerFrame::error("Failed to send message: timed out"));
            Flow::Continue
        }
    }
}

async fn handle_leave_room(conn: &Arc<Connection>, state: &AppState) -> Flow {
    let room_id = conn.room_id();
    if !room_id.is_set() {
        conn.try_send(&ServerFrame::error("Not in a room"));
        return Flow::Continue;
    }

    state.hub.unregister(Arc::clone(conn), room_id).await;
    conn.set_room(RoomId::new(0), false);
    conn.try_send(&ServerFrame::success("Left room"));
    Flow::Continue
}
