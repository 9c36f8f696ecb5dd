//! Postgres 存储实现

mod message_store;
mod room_directory;

pub use message_store::PgMessageStore;
pub use room_directory::PgRoomDirectory;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// 创建数据库连接池
pub async fn create_pg_pool(dsn: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(dsn)
        .await
}
