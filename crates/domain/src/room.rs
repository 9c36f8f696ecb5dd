//! 房间实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{RoomId, UserId};

/// 房间可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoomVisibility {
    #[default]
    Public,
    Private,
}

/// 聊天房间
///
/// 成员关系由 [`crate::repositories::RoomDirectory`] 维护，
/// 房间本身只承载描述信息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub owner_id: UserId,
    pub visibility: RoomVisibility,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn is_private(&self) -> bool {
        self.visibility == RoomVisibility::Private
    }
}
