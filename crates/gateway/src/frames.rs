//! 客户端/服务端线协议帧
//!
//! 所有应用帧均为 JSON 文本帧，以 `type` 字段区分。

use serde::{Deserialize, Serialize};

use domain::{MessageId, MessageType, Room, RoomEvent, RoomId, UserId};

/// 入站帧（客户端 → 服务端）
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// 认证，必须是首个帧，一次性
    Auth { token: String },

    JoinRoom {
        room_id: RoomId,
    },

    SendMessage {
        #[serde(default)]
        content: String,
        /// 缺省为 text
        #[serde(default)]
        message_type: Option<MessageType>,
        #[serde(default)]
        file_url: Option<String>,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        file_size: Option<i64>,
        #[serde(default)]
        mime_type: Option<String>,
    },

    LeaveRoom,

    Ping,
}

/// 出站帧（服务端 → 客户端）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Success {
        message: String,
    },

    Error {
        message: String,
    },

    Pong,

    RoomJoined {
        room_id: RoomId,
        room: Room,
    },

    UserJoined {
        room_id: RoomId,
        user_id: UserId,
        username: String,
    },

    UserLeft {
        room_id: RoomId,
        user_id: UserId,
        username: String,
    },

    NewMessage {
        message_id: MessageId,
        room_id: RoomId,
        user_id: UserId,
        username: String,
        content: String,
        /// Unix 秒
        created_at: i64,
        // 附件字段仅在消息携带附件时出现
        #[serde(skip_serializing_if = "Option::is_none")]
        message_type: Option<MessageType>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_size: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
}

impl ServerFrame {
    pub fn success(message: impl Into<String>) -> Self {
        Self::Success {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// 总线事件到客户端帧的映射，扇出路径对每个事件只做一次
    pub fn from_event(event: &RoomEvent) -> Self {
        match event {
            RoomEvent::Message {
                room_id,
                message_id,
                user_id,
                username,
                content,
                message_type,
                created_at,
                file_url,
                file_name,
                file_size,
                mime_type,
            } => Self::NewMessage {
                message_id: *message_id,
                room_id: *room_id,
                user_id: *user_id,
                username: username.clone(),
                content: content.clone(),
                created_at: *created_at,
                message_type: file_url.is_some().then_some(*message_type),
                file_url: file_url.clone(),
                file_name: file_name.clone(),
                file_size: *file_size,
                mime_type: mime_type.clone(),
            },
            RoomEvent::UserJoined {
                room_id,
                user_id,
                username,
            } => Self::UserJoined {
                room_id: *room_id,
                user_id: *user_id,
                username: username.clone(),
            },
            RoomEvent::UserLeft {
                room_id,
                user_id,
                username,
            } => Self::UserLeft {
                room_id: *room_id,
                user_id: *user_id,
                username: username.clone(),
            },
        }
    }

    pub fn encode(&self) -> String {
        // 所有出站帧均为纯数据结构，序列化不会失败
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to encode server frame");
            r#"{"type":"error","message":"internal error"}"#.to_string()
        })
    }
}
