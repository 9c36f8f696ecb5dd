//! 网关与扇出核心
//!
//! 承载系统的核心路径：WebSocket 连接生命周期（connection）、
//! 入站帧路由（dispatcher）、每实例房间注册表与扇出（hub）、
//! 房间准入（admission），以及最小 HTTP 面（升级、上传、指标抓取）。

pub mod admission;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod frames;
pub mod hub;
pub mod metrics;
pub mod routes;
pub mod state;

pub use admission::Admission;
pub use connection::{serve_socket, Connection, ConnectionId};
pub use frames::{ClientFrame, ServerFrame};
pub use hub::Hub;
pub use routes::router;
pub use state::AppState;
