//! 基础设施层
//!
//! 领域接口的具体实现：消息总线（Redis / 进程内）、token 校验器、
//! Postgres 与内存版的房间目录及消息存储、对象存储客户端。

pub mod auth;
pub mod bus;
pub mod db;
pub mod memory;
pub mod object_store;

pub use auth::{HmacTokenValidator, RemoteTokenValidator};
pub use bus::{Bus, BusError, BusSubscription, LocalBus, RedisBus};
pub use db::{create_pg_pool, PgMessageStore, PgRoomDirectory};
pub use memory::{MemoryMessageStore, MemoryObjectStore, MemoryRoomDirectory};
pub use object_store::{is_allowed_mime, message_type_for_mime, HttpObjectStore, MAX_UPLOAD_SIZE};
