//! 领域模型
//!
//! 定义聊天系统的核心实体、总线事件信封以及外部协作者接口。
//! 本 crate 不依赖任何具体的传输、存储或运行时实现。

pub mod auth;
pub mod errors;
pub mod events;
pub mod ids;
pub mod message;
pub mod repositories;
pub mod room;

pub use auth::{Identity, TokenValidator};
pub use errors::{AccessError, AuthError, DirectoryError, DomainError, StoreError};
pub use events::{room_channel, RoomEvent, ROOM_CHANNEL_PATTERN, ROOM_CHANNEL_PREFIX};
pub use ids::{MessageId, RoomId, UserId};
pub use message::{Attachment, Message, MessageType, NewMessage, MAX_CONTENT_LENGTH};
pub use repositories::{MessageStore, ObjectStore, RoomDirectory, StoredObject};
pub use room::{Room, RoomVisibility};
