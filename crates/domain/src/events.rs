//! 房间事件信封
//!
//! [`RoomEvent`] 是实例之间唯一的线上表示：发布端将其序列化为 JSON
//! 写入总线频道 `room:{roomId}`，订阅端反序列化后在本地扇出。
//! 事件一经构造即不可变。

use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, RoomId, UserId};
use crate::message::{Attachment, Message, MessageType};

/// 房间频道前缀
pub const ROOM_CHANNEL_PREFIX: &str = "room:";

/// 订阅全部房间频道的模式
pub const ROOM_CHANNEL_PATTERN: &str = "room:*";

/// 构造房间频道名
pub fn room_channel(room_id: RoomId) -> String {
    format!("{ROOM_CHANNEL_PREFIX}{room_id}")
}

/// 跨实例房间事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoomEvent {
    /// 新消息
    Message {
        room_id: RoomId,
        message_id: MessageId,
        user_id: UserId,
        username: String,
        content: String,
        #[serde(rename = "type")]
        message_type: MessageType,
        /// Unix 秒
        created_at: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_size: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },

    /// 用户加入房间（在线状态，跨实例同步）
    UserJoined {
        room_id: RoomId,
        user_id: UserId,
        username: String,
    },

    /// 用户离开房间
    UserLeft {
        room_id: RoomId,
        user_id: UserId,
        username: String,
    },
}

impl RoomEvent {
    /// 事件所属房间
    pub fn room_id(&self) -> RoomId {
        match self {
            Self::Message { room_id, .. }
            | Self::UserJoined { room_id, .. }
            | Self::UserLeft { room_id, .. } => *room_id,
        }
    }

    /// 事件应发布到的频道
    pub fn channel(&self) -> String {
        room_channel(self.room_id())
    }
}

impl From<&Message> for RoomEvent {
    fn from(message: &Message) -> Self {
        let (file_url, file_name, file_size, mime_type) = match &message.attachment {
            Some(Attachment {
                file_url,
                file_name,
                file_size,
                mime_type,
            }) => (
                Some(file_url.clone()),
                Some(file_name.clone()),
                Some(*file_size),
                Some(mime_type.clone()),
            ),
            None => (None, None, None, None),
        };

        Self::Message {
            room_id: message.room_id,
            message_id: message.id,
            user_id: message.user_id,
            username: message.username.clone(),
            content: message.content.clone(),
            message_type: message.message_type,
            created_at: message.created_at.timestamp(),
            file_url,
            file_name,
            file_size,
            mime_type,
        }
    }
}
