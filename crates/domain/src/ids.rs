//! 标识符类型
//!
//! 所有实体 ID 均为 64 位整数。0 作为哨兵值表示「未设置」
//! （未认证的连接 user_id 为 0，未加入房间的连接 room_id 为 0）。

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn value(self) -> i64 {
                self.0
            }

            /// 是否为有效 ID（正数）
            pub const fn is_set(self) -> bool {
                self.0 > 0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// 用户 ID
    UserId
);
id_type!(
    /// 房间 ID
    RoomId
);
id_type!(
    /// 消息 ID
    MessageId
);
