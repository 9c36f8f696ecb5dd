//! 可观测性指标
//!
//! 统一声明指标名称并注册说明文字；调用点通过 `metrics` 门面宏写入，
//! 具体后端（Prometheus recorder）在二进制入口安装。

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// 当前 WebSocket 连接数（已注册进房间的连接）
pub const WEBSOCKET_CONNECTIONS: &str = "websocket_connections";
/// 当前活跃房间数
pub const ACTIVE_ROOMS: &str = "active_rooms";
/// 存活的长任务数（读/写循环、Hub 任务）
pub const TASKS_COUNT: &str = "tasks_count";

/// 已发布消息计数，按房间类型分标签
pub const MESSAGES_SENT_TOTAL: &str = "messages_sent_total";
/// 从总线收到的房间事件计数
pub const MESSAGES_RECEIVED_TOTAL: &str = "messages_received_total";
/// 认证请求计数，标签 type/status
pub const AUTH_REQUESTS_TOTAL: &str = "auth_requests_total";
/// 因写队列打满被丢弃的帧计数
pub const DROPPED_MESSAGES_TOTAL: &str = "dropped_messages_total";
pub const ROOM_JOINS_TOTAL: &str = "room_joins_total";
pub const ROOM_LEAVES_TOTAL: &str = "room_leaves_total";

/// 消息从收到客户端帧到发布完成的耗时
pub const MESSAGE_LATENCY_MS: &str = "message_latency_ms";
/// 单次本地扇出耗时
pub const BROADCAST_DURATION_MS: &str = "broadcast_duration_ms";
/// 连接生命周期时长
pub const CONNECTION_DURATION_SECONDS: &str = "connection_duration_seconds";
/// 注册时刻的房间人数分布
pub const USERS_PER_ROOM: &str = "users_per_room";

/// 注册全部指标的帮助文本，进程启动时调用一次
pub fn describe() {
    describe_gauge!(
        WEBSOCKET_CONNECTIONS,
        "Current number of WebSocket connections registered in a room"
    );
    describe_gauge!(ACTIVE_ROOMS, "Current number of rooms with local members");
    describe_gauge!(TASKS_COUNT, "Live long-running tasks (readers, writers, hub loops)");

    describe_counter!(MESSAGES_SENT_TOTAL, "Total number of messages published");
    describe_counter!(
        MESSAGES_RECEIVED_TOTAL,
        "Total number of room events received from the bus"
    );
    describe_counter!(AUTH_REQUESTS_TOTAL, "Total authentication requests");
    describe_counter!(
        DROPPED_MESSAGES_TOTAL,
        "Total frames dropped because a send queue was full"
    );
    describe_counter!(ROOM_JOINS_TOTAL, "Total room registrations");
    describe_counter!(ROOM_LEAVES_TOTAL, "Total room unregistrations");

    describe_histogram!(
        MESSAGE_LATENCY_MS,
        Unit::Milliseconds,
        "Latency from inbound send_message frame to bus publish"
    );
    describe_histogram!(
        BROADCAST_DURATION_MS,
        Unit::Milliseconds,
        "Duration of one local fan-out"
    );
    describe_histogram!(
        CONNECTION_DURATION_SECONDS,
        Unit::Seconds,
        "Connection lifetime"
    );
    describe_histogram!(USERS_PER_ROOM, "Room population observed at registration");
}
