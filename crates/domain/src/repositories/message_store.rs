//! 消息存储接口

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::ids::{MessageId, RoomId, UserId};
use crate::message::{Message, NewMessage};

/// 消息的持久化接口
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 追加一条消息，由存储分配 ID 与时间戳
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// 游标分页读取：返回 `before` 之前（不含）的最多 `limit` 条消息，
    /// 按 ID 降序。`before` 为 `None` 时从最新开始。
    async fn list_before(
        &self,
        room_id: RoomId,
        before: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError>;

    /// 记录用户在房间内的已读位置
    async fn mark_read(
        &self,
        room_id: RoomId,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<(), StoreError>;
}
