//! 认证接口
//!
//! 核心只消费 [`TokenValidator`]：把不透明的 bearer token 映射为用户身份。
//! 令牌的签发、口令哈希与用户目录由外部服务负责。

use async_trait::async_trait;

use crate::errors::AuthError;
use crate::ids::UserId;

/// 已认证身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

/// Token 校验器
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// 校验 token，成功时返回其承载的身份
    async fn validate(&self, token: &str) -> Result<Identity, AuthError>;
}
