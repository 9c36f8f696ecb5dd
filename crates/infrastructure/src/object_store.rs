//! 对象存储客户端
//!
//! S3 兼容端点的最小客户端：按日期分层生成对象键，PUT 上传，
//! 返回可公开访问的 URL。桶策略与鉴权由存储侧配置。

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

use domain::{ObjectStore, StoreError, StoredObject};

/// 上传大小上限（10 MiB）
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// 允许上传的 MIME 类型
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/zip",
    "text/plain",
    "application/json",
];

pub fn is_allowed_mime(mime_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime_type)
}

/// 由 MIME 前缀推导消息类型：image/* → image，其余 → file
pub fn message_type_for_mime(mime_type: &str) -> domain::MessageType {
    if mime_type.starts_with("image/") {
        domain::MessageType::Image
    } else {
        domain::MessageType::File
    }
}

/// S3 兼容对象存储客户端
pub struct HttpObjectStore {
    endpoint: String,
    bucket: String,
    public_base: String,
    client: reqwest::Client,
}

impl HttpObjectStore {
    /// # 参数
    /// - `endpoint`: 存储服务地址
    /// - `bucket`: 桶名
    /// - `public_base`: 对外访问的基础 URL（未设置时回退到 endpoint）
    pub fn new(
        endpoint: &str,
        bucket: &str,
        public_base: Option<&str>,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StoreError::storage(format!("http client init failed: {e}")))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            public_base: public_base
                .unwrap_or(endpoint)
                .trim_end_matches('/')
                .to_string(),
            client,
        })
    }

    /// 生成对象键：`YYYY/MM/DD/{uuid}{ext}`
    fn object_key(file_name: &str) -> String {
        let ext = std::path::Path::new(file_name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        format!(
            "{}/{}{ext}",
            Utc::now().format("%Y/%m/%d"),
            uuid::Uuid::new_v4()
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, StoreError> {
        let key = Self::object_key(file_name);
        let size = bytes.len() as i64;
        let target = format!("{}/{}/{key}", self.endpoint, self.bucket);

        let response = self
            .client
            .put(&target)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| StoreError::storage(format!("upload failed: {e}")))?;

        if !response.status().is_success() {
            return Err(StoreError::storage(format!(
                "object store returned {}",
                response.status()
            )));
        }

        tracing::info!(%key, size, mime_type, "文件上传完成");

        Ok(StoredObject {
            url: format!("{}/{}/{key}", self.public_base, self.bucket),
            file_name: file_name.to_string(),
            file_size: size,
            mime_type: mime_type.to_string(),
        })
    }
}
