//! 外部协作者接口
//!
//! 核心通过这些 trait 访问成员目录、消息存储与对象存储，
//! 具体实现位于 infrastructure crate。

mod message_store;
mod object_store;
mod room_directory;

pub use message_store::MessageStore;
pub use object_store::{ObjectStore, StoredObject};
pub use room_directory::RoomDirectory;
