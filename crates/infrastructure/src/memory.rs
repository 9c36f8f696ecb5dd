//! 内存版协作者实现
//!
//! 用于单节点部署（未配置 STORE_DSN）与测试环境。
//! 行为与 Postgres 实现一致，数据不落盘。

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use domain::{
    DirectoryError, Message, MessageId, MessageStore, NewMessage, Room, RoomDirectory, RoomId,
    StoreError, StoredObject, UserId,
};

/// 内存房间目录
#[derive(Default)]
pub struct MemoryRoomDirectory {
    rooms: RwLock<HashMap<RoomId, Room>>,
    members: RwLock<HashSet<(RoomId, UserId)>>,
}

impl MemoryRoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置房间（管理面在范围之外，测试与单机模式直接插入）
    pub fn insert_room(&self, room: Room) {
        self.rooms.write().expect("rooms lock").insert(room.id, room);
    }

    pub fn insert_member(&self, user_id: UserId, room_id: RoomId) {
        self.members
            .write()
            .expect("members lock")
            .insert((room_id, user_id));
    }
}

#[async_trait]
impl RoomDirectory for MemoryRoomDirectory {
    async fn room(&self, room_id: RoomId) -> Result<Option<Room>, DirectoryError> {
        Ok(self.rooms.read().expect("rooms lock").get(&room_id).cloned())
    }

    async fn is_member(&self, user_id: UserId, room_id: RoomId) -> Result<bool, DirectoryError> {
        Ok(self
            .members
            .read()
            .expect("members lock")
            .contains(&(room_id, user_id)))
    }

    async fn join(&self, user_id: UserId, room_id: RoomId) -> Result<(), DirectoryError> {
        self.members
            .write()
            .expect("members lock")
            .insert((room_id, user_id));
        Ok(())
    }

    async fn leave(&self, user_id: UserId, room_id: RoomId) -> Result<(), DirectoryError> {
        self.members
            .write()
            .expect("members lock")
            .remove(&(room_id, user_id));
        Ok(())
    }
}

/// 内存消息存储
#[derive(Default)]
pub struct MemoryMessageStore {
    next_id: AtomicI64,
    messages: RwLock<Vec<Message>>,
    read_marks: RwLock<HashMap<(RoomId, UserId), MessageId>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            messages: RwLock::default(),
            read_marks: RwLock::default(),
        }
    }

    /// 房间内消息总数（测试断言用）
    pub fn count(&self, room_id: RoomId) -> usize {
        self.messages
            .read()
            .expect("messages lock")
            .iter()
            .filter(|m| m.room_id == room_id)
            .count()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        message.validate()?;

        let id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let stored = Message::from_new(message, id, Utc::now());
        self.messages
            .write()
            .expect("messages lock")
            .push(stored.clone());
        Ok(stored)
    }

    async fn list_before(
        &self,
        room_id: RoomId,
        before: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.read().expect("messages lock");
        let mut page: Vec<Message> = messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .filter(|m| before.map_or(true, |cursor| m.id < cursor))
            .cloned()
            .collect();
        page.sort_by(|a, b| b.id.cmp(&a.id));
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn mark_read(
        &self,
        room_id: RoomId,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<(), StoreError> {
        let mut marks = self.read_marks.write().expect("read marks lock");
        let entry = marks.entry((room_id, user_id)).or_insert(message_id);
        if message_id > *entry {
            *entry = message_id;
        }
        Ok(())
    }
}

/// 内存对象存储
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().expect("objects lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl domain::ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, StoreError> {
        let key = format!("mem/{}/{file_name}", uuid::Uuid::new_v4());
        let size = bytes.len() as i64;
        self.objects
            .write()
            .expect("objects lock")
            .insert(key.clone(), bytes);

        Ok(StoredObject {
            url: format!("memory://{key}"),
            file_name: file_name.to_string(),
            file_size: size,
            mime_type: mime_type.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::RoomVisibility;

    fn room(id: i64) -> Room {
        Room {
            id: RoomId::new(id),
            name: format!("room-{id}"),
            owner_id: UserId::new(1),
            visibility: RoomVisibility::Public,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn membership_round_trip() {
        let directory = MemoryRoomDirectory::new();
        directory.insert_room(room(9));

        let alice = UserId::new(42);
        assert!(!directory.is_member(alice, RoomId::new(9)).await.unwrap());

        directory.join(alice, RoomId::new(9)).await.unwrap();
        assert!(directory.is_member(alice, RoomId::new(9)).await.unwrap());

        directory.leave(alice, RoomId::new(9)).await.unwrap();
        assert!(!directory.is_member(alice, RoomId::new(9)).await.unwrap());
    }

    #[tokio::test]
    async fn append_assigns_monotonic_ids() {
        let store = MemoryMessageStore::new();
        let first = store
            .append(NewMessage::text(RoomId::new(9), UserId::new(42), "alice", "one").unwrap())
            .await
            .unwrap();
        let second = store
            .append(NewMessage::text(RoomId::new(9), UserId::new(42), "alice", "two").unwrap())
            .await
            .unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn list_before_paginates_descending() {
        let store = MemoryMessageStore::new();
        for i in 1..=5 {
            store
                .append(
                    NewMessage::text(RoomId::new(9), UserId::new(42), "alice", format!("m{i}"))
                        .unwrap(),
                )
                .await
                .unwrap();
        }

        let latest = store.list_before(RoomId::new(9), None, 2).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].content, "m5");
        assert_eq!(latest[1].content, "m4");

        let older = store
            .list_before(RoomId::new(9), Some(latest[1].id), 10)
            .await
            .unwrap();
        assert_eq!(older.len(), 3);
        assert_eq!(older[0].content, "m3");
    }
}
