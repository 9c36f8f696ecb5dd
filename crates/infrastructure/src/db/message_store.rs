//! Postgres 消息存储

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use domain::{
    Attachment, Message, MessageId, MessageStore, MessageType, NewMessage, RoomId, StoreError,
    UserId,
};

/// 消息存储的 Postgres 实现
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    room_id: i64,
    user_id: i64,
    username: String,
    content: String,
    message_type: String,
    file_url: Option<String>,
    file_name: Option<String>,
    file_size: Option<i64>,
    mime_type: Option<String>,
    is_edited: bool,
    edited_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    fn into_domain(self) -> Message {
        let attachment = match (self.file_url, self.file_name) {
            (Some(file_url), Some(file_name)) => Some(Attachment {
                file_url,
                file_name,
                file_size: self.file_size.unwrap_or_default(),
                mime_type: self.mime_type.unwrap_or_default(),
            }),
            _ => None,
        };

        Message {
            id: MessageId::new(self.id),
            room_id: RoomId::new(self.room_id),
            user_id: UserId::new(self.user_id),
            username: self.username,
            content: self.content,
            message_type: match self.message_type.as_str() {
                "image" => MessageType::Image,
                "file" => MessageType::File,
                _ => MessageType::Text,
            },
            attachment,
            is_edited: self.is_edited,
            edited_at: self.edited_at,
            created_at: self.created_at,
        }
    }
}

fn map_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        other => StoreError::storage(other.to_string()),
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        message.validate()?;

        let (file_url, file_name, file_size, mime_type) = match &message.attachment {
            Some(a) => (
                Some(a.file_url.as_str()),
                Some(a.file_name.as_str()),
                Some(a.file_size),
                Some(a.mime_type.as_str()),
            ),
            None => (None, None, None, None),
        };

        let row: (i64, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO messages
                 (room_id, user_id, username, content, message_type,
                  file_url, file_name, file_size, mime_type, is_edited, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, NOW())
             RETURNING id, created_at",
        )
        .bind(message.room_id.value())
        .bind(message.user_id.value())
        .bind(&message.username)
        .bind(&message.content)
        .bind(message.message_type.as_str())
        .bind(file_url)
        .bind(file_name)
        .bind(file_size)
        .bind(mime_type)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(Message::from_new(message, MessageId::new(row.0), row.1))
    }

    async fn list_before(
        &self,
        room_id: RoomId,
        before: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, room_id, user_id, username, content, message_type,
                    file_url, file_name, file_size, mime_type, is_edited, edited_at, created_at
             FROM messages
             WHERE room_id = $1 AND ($2::bigint IS NULL OR id < $2)
             ORDER BY id DESC
             LIMIT $3",
        )
        .bind(room_id.value())
        .bind(before.map(MessageId::value))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(rows.into_iter().map(MessageRow::into_domain).collect())
    }

    async fn mark_read(
        &self,
        room_id: RoomId,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO message_reads (room_id, user_id, last_read_id, read_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (room_id, user_id)
             DO UPDATE SET last_read_id = GREATEST(message_reads.last_read_id, $3), read_at = NOW()",
        )
        .bind(room_id.value())
        .bind(user_id.value())
        .bind(message_id.value())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(())
    }
}
