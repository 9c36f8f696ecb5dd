//! 总线错误类型定义

use thiserror::Error;

/// 总线操作错误
#[derive(Error, Debug)]
pub enum BusError {
    /// 连接错误
    #[error("bus connection error: {message}")]
    Connection { message: String },

    /// 发布错误
    #[error("bus publish error: {message}")]
    Publish { message: String },

    /// 订阅错误
    #[error("bus subscribe error: {message}")]
    Subscribe { message: String },

    /// 配置错误
    #[error("bus configuration error: {message}")]
    Config { message: String },
}

impl BusError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn publish(message: impl Into<String>) -> Self {
        Self::Publish {
            message: message.into(),
        }
    }

    pub fn subscribe(message: impl Into<String>) -> Self {
        Self::Subscribe {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// 总线结果类型
pub type BusResult<T> = Result<T, BusError>;
