//! 对象存储接口

use async_trait::async_trait;

use crate::errors::StoreError;

/// 已存储对象的元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub url: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
}

/// 上传附件的外部对象存储
///
/// 核心只负责把字节流交出去并拿回可公开访问的 URL，
/// 桶策略与生命周期管理在存储侧。
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, StoreError>;
}
