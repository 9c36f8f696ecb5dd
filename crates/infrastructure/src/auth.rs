//! Token 校验器实现
//!
//! 两种部署形态：本地 HMAC 校验（与签发方共享密钥），
//! 或调用远程用户服务校验。

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use domain::{AuthError, Identity, UserId};

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    /// 过期时间 (Unix timestamp)
    pub exp: i64,
}

/// 本地 HMAC (HS256) 校验器
#[derive(Clone)]
pub struct HmacTokenValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl HmacTokenValidator {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// 签发 token（运维工具与测试使用；生产签发在外部服务）
    pub fn issue(
        &self,
        user_id: UserId,
        username: &str,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let exp = chrono::Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        let claims = Claims {
            user_id: user_id.value(),
            username: username.to_string(),
            exp: exp.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::unavailable(format!("token encoding failed: {e}")))
    }
}

#[async_trait]
impl domain::TokenValidator for HmacTokenValidator {
    async fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken,
            })?;

        let user_id = UserId::new(data.claims.user_id);
        if !user_id.is_set() || data.claims.username.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        Ok(Identity {
            user_id,
            username: data.claims.username,
        })
    }
}

/// 远程校验请求/响应
#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    user_id: i64,
    username: String,
}

/// 远程 token 校验器
///
/// 调用用户服务的 `/validate` 接口。调用方已经在外层施加 5 秒超时，
/// 客户端自身再设一道同样的底线。
pub struct RemoteTokenValidator {
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteTokenValidator {
    pub fn new(addr: &str) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AuthError::unavailable(format!("http client init failed: {e}")))?;

        Ok(Self {
            endpoint: format!("{}/validate", addr.trim_end_matches('/')),
            client,
        })
    }
}

#[async_trait]
impl domain::TokenValidator for RemoteTokenValidator {
    async fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ValidateRequest { token })
            .send()
            .await
            .map_err(|e| AuthError::unavailable(format!("validator unreachable: {e}")))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AuthError::InvalidToken);
        }
        if !response.status().is_success() {
            return Err(AuthError::unavailable(format!(
                "validator returned {}",
                response.status()
            )));
        }

        let body: ValidateResponse = response
            .json()
            .await
            .map_err(|e| AuthError::unavailable(format!("bad validator response: {e}")))?;

        let user_id = UserId::new(body.user_id);
        if !user_id.is_set() {
            return Err(AuthError::InvalidToken);
        }

        Ok(Identity {
            user_id,
            username: body.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::TokenValidator;

    const SECRET: &str = "test-secret-key-with-at-least-32-characters";

    #[tokio::test]
    async fn issued_token_validates_back_to_identity() {
        let validator = HmacTokenValidator::new(SECRET);
        let token = validator
            .issue(UserId::new(42), "alice", Duration::from_secs(3600))
            .unwrap();

        let identity = validator.validate(&token).await.unwrap();
        assert_eq!(identity.user_id, UserId::new(42));
        assert_eq!(identity.username, "alice");
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let validator = HmacTokenValidator::new(SECRET);
        assert!(matches!(
            validator.validate("not-a-jwt").await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            validator.validate("").await,
            Err(AuthError::MissingToken)
        ));
    }

    #[tokio::test]
    async fn token_signed_with_other_secret_is_rejected() {
        let issuer = HmacTokenValidator::new("another-secret-key-also-32-characters!!");
        let token = issuer
            .issue(UserId::new(42), "alice", Duration::from_secs(3600))
            .unwrap();

        let validator = HmacTokenValidator::new(SECRET);
        assert!(matches!(
            validator.validate(&token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn expired_token_maps_to_expired_error() {
        let validator = HmacTokenValidator::new(SECRET);

        // jsonwebtoken 默认 60s leeway，构造一个一小时前过期的 claims
        let exp = (chrono::Utc::now() - chrono::Duration::hours(1)).timestamp();
        let claims = Claims {
            user_id: 42,
            username: "alice".into(),
            exp,
        };
        let stale = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            validator.validate(&stale).await,
            Err(AuthError::Expired)
        ));
    }
}
