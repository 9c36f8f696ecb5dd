//! 消息实体
//!
//! 消息在构造时完成校验：文本消息内容非空且不超过 [`MAX_CONTENT_LENGTH`]，
//! 附件消息必须携带 `file_url` 与 `file_name`。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::ids::{MessageId, RoomId, UserId};

/// 文本消息内容长度上限（字符数）
pub const MAX_CONTENT_LENGTH: usize = 4000;

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
        }
    }

    pub const fn is_attachment(self) -> bool {
        matches!(self, Self::Image | Self::File)
    }
}

/// 附件元数据
///
/// 上传服务返回的不透明字段，核心不解释其内容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_url: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
}

/// 待写入存储的新消息
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub username: String,
    pub message_type: MessageType,
    pub content: String,
    pub attachment: Option<Attachment>,
}

impl NewMessage {
    /// 构造文本消息
    pub fn text(
        room_id: RoomId,
        user_id: UserId,
        username: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let msg = Self {
            room_id,
            user_id,
            username: username.into(),
            message_type: MessageType::Text,
            content: content.into(),
            attachment: None,
        };
        msg.validate()?;
        Ok(msg)
    }

    /// 构造附件消息（image / file）
    pub fn attachment(
        room_id: RoomId,
        user_id: UserId,
        username: impl Into<String>,
        message_type: MessageType,
        content: impl Into<String>,
        attachment: Attachment,
    ) -> Result<Self, DomainError> {
        let msg = Self {
            room_id,
            user_id,
            username: username.into(),
            message_type,
            content: content.into(),
            attachment: Some(attachment),
        };
        msg.validate()?;
        Ok(msg)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.content.chars().count() > MAX_CONTENT_LENGTH {
            return Err(DomainError::validation("content", "message content too long"));
        }
        match self.message_type {
            MessageType::Text => {
                if self.content.is_empty() {
                    return Err(DomainError::validation(
                        "content",
                        "message content cannot be empty",
                    ));
                }
                if self.attachment.is_some() {
                    return Err(DomainError::validation(
                        "attachment",
                        "text messages cannot carry an attachment",
                    ));
                }
            }
            MessageType::Image | MessageType::File => {
                let attachment = self.attachment.as_ref().ok_or_else(|| {
                    DomainError::validation("file_url", "file_url required for image/file messages")
                })?;
                if attachment.file_url.is_empty() || attachment.file_name.is_empty() {
                    return Err(DomainError::validation(
                        "file_url",
                        "file_url and file_name must be non-empty",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// 已持久化的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub username: String,
    pub content: String,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    pub is_edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// 由存储层在写入成功后组装
    pub fn from_new(new: NewMessage, id: MessageId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            room_id: new.room_id,
            user_id: new.user_id,
            username: new.username,
            content: new.content,
            message_type: new.message_type,
            attachment: new.attachment,
            is_edited: false,
            edited_at: None,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment() -> Attachment {
        Attachment {
            file_url: "https://files.example/2026/08/02/abc.png".into(),
            file_name: "abc.png".into(),
            file_size: 1024,
            mime_type: "image/png".into(),
        }
    }

    #[test]
    fn text_message_requires_content() {
        let err = NewMessage::text(RoomId::new(9), UserId::new(42), "alice", "").unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "content"));
    }

    #[test]
    fn text_message_rejects_oversized_content() {
        let long = "啊".repeat(MAX_CONTENT_LENGTH + 1);
        let err = NewMessage::text(RoomId::new(9), UserId::new(42), "alice", long).unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "content"));

        // 恰好在上限则通过
        let limit = "a".repeat(MAX_CONTENT_LENGTH);
        assert!(NewMessage::text(RoomId::new(9), UserId::new(42), "alice", limit).is_ok());
    }

    #[test]
    fn image_message_requires_file_url() {
        let err = NewMessage::attachment(
            RoomId::new(9),
            UserId::new(42),
            "alice",
            MessageType::Image,
            "",
            Attachment {
                file_url: String::new(),
                ..attachment()
            },
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "file_url"));
    }

    #[test]
    fn attachment_message_allows_empty_content() {
        let msg = NewMessage::attachment(
            RoomId::new(9),
            UserId::new(42),
            "alice",
            MessageType::File,
            "",
            attachment(),
        )
        .unwrap();
        assert_eq!(msg.message_type, MessageType::File);
    }

    #[test]
    fn message_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&MessageType::Image).unwrap(), "\"image\"");
    }
}
