//! 房间目录接口

use async_trait::async_trait;

use crate::errors::DirectoryError;
use crate::ids::{RoomId, UserId};
use crate::room::Room;

/// 房间与成员关系的读写接口
///
/// 成员资格是 WebSocket 流量的唯一授权谓词；公开/私有房间的加入
/// 策略在外部管理面实施，此处不做区分。
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// 查询房间，不存在时返回 `None`
    async fn room(&self, room_id: RoomId) -> Result<Option<Room>, DirectoryError>;

    /// 用户是否为房间成员
    async fn is_member(&self, user_id: UserId, room_id: RoomId) -> Result<bool, DirectoryError>;

    /// 添加成员（幂等）
    async fn join(&self, user_id: UserId, room_id: RoomId) -> Result<(), DirectoryError>;

    /// 移除成员（幂等）
    async fn leave(&self, user_id: UserId, room_id: RoomId) -> Result<(), DirectoryError>;
}
