//! 房间准入
//!
//! 连接被注册进房间前的授权检查。成员资格是 WebSocket 流量的
//! 唯一授权谓词：房间必须存在，且用户必须已是成员。

use std::sync::Arc;

use domain::{AccessError, Room, RoomDirectory, RoomId, UserId};

/// 准入检查器
pub struct Admission {
    directory: Arc<dyn RoomDirectory>,
}

impl Admission {
    pub fn new(directory: Arc<dyn RoomDirectory>) -> Self {
        Self { directory }
    }

    /// 校验用户可进入房间，成功时返回房间信息
    pub async fn check(&self, user_id: UserId, room_id: RoomId) -> Result<Room, AccessError> {
        let room = self
            .directory
            .room(room_id)
            .await?
            .ok_or(AccessError::RoomNotFound { room_id })?;

        if !self.directory.is_member(user_id, room_id).await? {
            return Err(AccessError::NotMember { user_id, room_id });
        }

        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{RoomVisibility, UserId};
    use infrastructure::MemoryRoomDirectory;

    fn directory_with_room() -> Arc<MemoryRoomDirectory> {
        let directory = Arc::new(MemoryRoomDirectory::new());
        directory.insert_room(Room {
            id: RoomId::new(9),
            name: "general".into(),
            owner_id: UserId::new(1),
            visibility: RoomVisibility::Public,
            created_at: Utc::now(),
        });
        directory
    }

    #[tokio::test]
    async fn member_is_admitted() {
        let directory = directory_with_room();
        directory.insert_member(UserId::new(42), RoomId::new(9));

        let admission = Admission::new(directory);
        let room = admission
            .check(UserId::new(42), RoomId::new(9))
            .await
            .unwrap();
        assert_eq!(room.name, "general");
    }

    #[tokio::test]
    async fn non_member_is_rejected() {
        let admission = Admission::new(directory_with_room());
        let err = admission
            .check(UserId::new(42), RoomId::new(9))
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::NotMember { .. }));
    }

    #[tokio::test]
    async fn unknown_room_is_rejected() {
        let admission = Admission::new(directory_with_room());
        let err = admission
            .check(UserId::new(42), RoomId::new(404))
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::RoomNotFound { .. }));
    }
}
