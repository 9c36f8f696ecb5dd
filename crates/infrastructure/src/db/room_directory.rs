//! Postgres 房间目录

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use domain::{DirectoryError, Room, RoomDirectory, RoomId, RoomVisibility, UserId};

/// 房间目录的 Postgres 实现
#[derive(Clone)]
pub struct PgRoomDirectory {
    pool: PgPool,
}

impl PgRoomDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: i64,
    name: String,
    owner_id: i64,
    visibility: String,
    created_at: DateTime<Utc>,
}

impl RoomRow {
    fn into_domain(self) -> Room {
        Room {
            id: RoomId::new(self.id),
            name: self.name,
            owner_id: UserId::new(self.owner_id),
            visibility: if self.visibility == "private" {
                RoomVisibility::Private
            } else {
                RoomVisibility::Public
            },
            created_at: self.created_at,
        }
    }
}

fn map_err(e: sqlx::Error) -> DirectoryError {
    DirectoryError::storage(e.to_string())
}

#[async_trait]
impl RoomDirectory for PgRoomDirectory {
    async fn room(&self, room_id: RoomId) -> Result<Option<Room>, DirectoryError> {
        let row: Option<RoomRow> = sqlx::query_as(
            "SELECT id, name, owner_id, visibility, created_at FROM rooms WHERE id = $1",
        )
        .bind(room_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(row.map(RoomRow::into_domain))
    }

    async fn is_member(&self, user_id: UserId, room_id: RoomId) -> Result<bool, DirectoryError> {
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM room_members WHERE room_id = $1 AND user_id = $2)",
        )
        .bind(room_id.value())
        .bind(user_id.value())
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(exists.0)
    }

    async fn join(&self, user_id: UserId, room_id: RoomId) -> Result<(), DirectoryError> {
        sqlx::query(
            "INSERT INTO room_members (room_id, user_id, joined_at) VALUES ($1, $2, NOW())
             ON CONFLICT (room_id, user_id) DO NOTHING",
        )
        .bind(room_id.value())
        .bind(user_id.value())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(())
    }

    async fn leave(&self, user_id: UserId, room_id: RoomId) -> Result<(), DirectoryError> {
        sqlx::query("DELETE FROM room_members WHERE room_id = $1 AND user_id = $2")
            .bind(room_id.value())
            .bind(user_id.value())
            .execute(&self.pool)
            .await
            .map_err(map_err)?;

        Ok(())
    }
}
