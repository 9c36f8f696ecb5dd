//! 领域错误定义

use thiserror::Error;

use crate::ids::{RoomId, UserId};

/// 领域校验错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 字段校验失败
    #[error("验证失败: {field}: {message}")]
    Validation { field: String, message: String },
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// 认证错误（TokenValidator）
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    Expired,

    /// 校验后端不可达或超时
    #[error("token validation unavailable: {message}")]
    Unavailable { message: String },
}

impl AuthError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// 准入错误：连接进入房间前的授权检查结果
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("room {room_id} not found")]
    RoomNotFound { room_id: RoomId },

    #[error("user {user_id} is not a member of room {room_id}")]
    NotMember { user_id: UserId, room_id: RoomId },

    #[error("room directory unavailable: {0}")]
    Directory(#[from] DirectoryError),
}

/// 房间目录错误（RoomDirectory）
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("directory storage error: {message}")]
    Storage { message: String },

    #[error("directory operation timed out")]
    Timeout,
}

impl DirectoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// 消息存储错误（MessageStore）
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("message not found")]
    NotFound,

    #[error("store storage error: {message}")]
    Storage { message: String },

    #[error("store operation timed out")]
    Timeout,

    #[error(transparent)]
    Invalid(#[from] DomainError),
}

impl StoreError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
