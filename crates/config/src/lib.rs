//! 统一配置中心
//!
//! 配置完全由环境变量驱动（生产与 CI 的唯一可信来源），
//! 未设置的键取默认值。加载后立即校验，配置错误时进程以退出码 1 终止。

use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};

/// 全局应用配置
///
/// 字段名与环境变量一一对应（`HTTP_ADDR` → `http_addr`）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP 监听地址
    pub http_addr: String,
    /// 指标抓取路径
    pub metrics_path: String,

    /// 总线地址（redis://…）。为空时使用进程内总线，仅适用于单实例部署
    pub bus_addr: Option<String>,
    /// 总线认证口令
    pub bus_auth: Option<String>,

    /// 远程 token 校验服务地址。与 `token_shared_secret` 二选一
    pub token_validator_addr: Option<String>,
    /// 本地 HMAC 校验密钥
    pub token_shared_secret: Option<String>,

    /// 消息/成员存储 DSN（postgres://…）。为空时使用内存存储
    pub store_dsn: Option<String>,

    /// 对象存储端点
    pub upload_endpoint: Option<String>,
    /// 对象存储桶名
    pub upload_bucket: String,
    /// 附件对外访问的基础 URL
    pub upload_public_base: Option<String>,

    /// 读空闲超时（秒），每次成功读取后顺延
    pub read_deadline_s: u64,
    /// 单帧写超时（秒）
    pub write_deadline_s: u64,
    /// 协议层 ping 周期（秒），必须小于读超时
    pub ping_period_s: u64,
    /// 每连接写队列容量
    pub send_queue_cap: usize,
    /// Hub 注册/注销通道容量
    pub reg_cap: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_addr: ":8000".to_string(),
            metrics_path: "/metrics".to_string(),
            bus_addr: None,
            bus_auth: None,
            token_validator_addr: None,
            token_shared_secret: None,
            store_dsn: None,
            upload_endpoint: None,
            upload_bucket: "chat-uploads".to_string(),
            upload_public_base: None,
            read_deadline_s: 60,
            write_deadline_s: 10,
            ping_period_s: 54,
            send_queue_cap: 256,
            reg_cap: 100,
        }
    }
}

impl AppConfig {
    /// 从环境变量加载配置
    ///
    /// 失败策略：FAIL FAST——配置非法时立即返回错误，服务不得带病启动。
    pub fn load() -> Result<Self, ConfigError> {
        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Env::raw())
            .extract()
            .map_err(|e| ConfigError::Figment(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// 校验配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_addr.is_empty() {
            return Err(ConfigError::Invalid {
                field: "http_addr",
                reason: "listen address cannot be empty".into(),
            });
        }

        if !self.metrics_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "metrics_path",
                reason: "metrics path must start with '/'".into(),
            });
        }

        if self.token_validator_addr.is_none() && self.token_shared_secret.is_none() {
            return Err(ConfigError::Invalid {
                field: "token_shared_secret",
                reason: "either TOKEN_VALIDATOR_ADDR or TOKEN_SHARED_SECRET must be set".into(),
            });
        }

        if let Some(secret) = &self.token_shared_secret {
            if secret.len() < 32 {
                return Err(ConfigError::Invalid {
                    field: "token_shared_secret",
                    reason: "shared secret must be at least 32 bytes".into(),
                });
            }
        }

        if self.send_queue_cap == 0 || self.reg_cap == 0 {
            return Err(ConfigError::Invalid {
                field: "send_queue_cap",
                reason: "queue capacities must be greater than 0".into(),
            });
        }

        if self.write_deadline_s == 0 || self.read_deadline_s == 0 {
            return Err(ConfigError::Invalid {
                field: "read_deadline_s",
                reason: "deadlines must be greater than 0".into(),
            });
        }

        // ping 必须先于读超时触发，否则空闲连接会被误杀
        if self.ping_period_s >= self.read_deadline_s {
            return Err(ConfigError::Invalid {
                field: "ping_period_s",
                reason: "ping period must be shorter than the read deadline".into(),
            });
        }

        Ok(())
    }

    /// 监听地址（`:8000` 形式补全为 `0.0.0.0:8000`）
    pub fn listen_addr(&self) -> String {
        if self.http_addr.starts_with(':') {
            format!("0.0.0.0{}", self.http_addr)
        } else {
            self.http_addr.clone()
        }
    }

    /// 测试专用配置：内存存储 + 进程内总线 + 固定密钥
    pub fn test_config() -> Self {
        Self {
            token_shared_secret: Some(
                "test-secret-key-with-at-least-32-characters".to_string(),
            ),
            ..Self::default()
        }
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("configuration parsing error: {0}")]
    Figment(String),
}
