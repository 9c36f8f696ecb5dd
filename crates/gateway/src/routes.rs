//! HTTP 面
//!
//! 范围内只有三个入口：WebSocket 升级、附件上传、指标抓取。
//! 升级时不做认证——首个入站帧必须是 `auth`。

use axum::{
    extract::{DefaultBodyLimit, Multipart, State, WebSocketUpgrade},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics::counter;
use serde::Serialize;
use tokio::time::{timeout, Duration};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use domain::{ObjectStore, TokenValidator};
use infrastructure::{is_allowed_mime, message_type_for_mime, MAX_UPLOAD_SIZE};

use crate::connection::serve_socket;
use crate::error::ApiError;
use crate::metrics::AUTH_REQUESTS_TOTAL;
use crate::state::AppState;

const AUTH_DEADLINE: Duration = Duration::from_secs(5);

/// 组装路由
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/upload", post(upload_handler))
        .route(&state.config.metrics_path, get(metrics_handler))
        // multipart 读取自身校验 10 MiB 上限，这里给表单开销留余量
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE + 64 * 1024))
        .layer(cors)
        .with_state(state)
}

/// WebSocket 升级入口
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let remote_addr = client_addr(&headers);
    info!(%remote_addr, "WebSocket connection attempt");

    ws.on_upgrade(move |socket| serve_socket(socket, state, remote_addr))
}

/// 透过反向代理识别客户端地址，仅用于日志
fn client_addr(headers: &HeaderMap) -> String {
    for name in ["x-real-ip", "x-forwarded-for"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }
    "unknown".to_string()
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    file_url: String,
    file_name: String,
    file_size: i64,
    mime_type: String,
    /// image 或 file，由 MIME 前缀推导
    message_type: &'static str,
}

/// 附件上传，multipart 字段 `file`，需要有效 bearer token
async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let token = bearer_token(&headers)?;

    let identity = match timeout(AUTH_DEADLINE, state.token_validator.validate(token)).await {
        Ok(Ok(identity)) => {
            counter!(AUTH_REQUESTS_TOTAL, "type" => "upload", "status" => "success").increment(1);
            identity
        }
        Ok(Err(e)) => {
            counter!(AUTH_REQUESTS_TOTAL, "type" => "upload", "status" => "failure").increment(1);
            warn!(error = %e, "upload authentication failed");
            return Err(ApiError::unauthorized("unauthorized"));
        }
        Err(_) => {
            counter!(AUTH_REQUESTS_TOTAL, "type" => "upload", "status" => "timeout").increment(1);
            return Err(ApiError::unauthorized("unauthorized"));
        }
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid form: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::bad_request("no file name provided"))?;
        let mime_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());

        if !is_allowed_mime(&mime_type) {
            return Err(ApiError::bad_request("file type not allowed"));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read file: {e}")))?;
        if bytes.len() > MAX_UPLOAD_SIZE {
            return Err(ApiError::payload_too_large(format!(
                "file too large (max {} MB)",
                MAX_UPLOAD_SIZE / (1024 * 1024)
            )));
        }

        let stored = state
            .object_store
            .put(&file_name, &mime_type, bytes.to_vec())
            .await
            .map_err(|e| {
                warn!(user_id = %identity.user_id, error = %e, "object upload failed");
                ApiError::internal_server_error("failed to upload file")
            })?;

        info!(
            user_id = %identity.user_id,
            file_name = %stored.file_name,
            file_size = stored.file_size,
            "文件上传成功"
        );

        return Ok(Json(UploadResponse {
            message_type: message_type_for_mime(&stored.mime_type).as_str(),
            file_url: stored.url,
            file_name: stored.file_name,
            file_size: stored.file_size,
            mime_type: stored.mime_type,
        }));
    }

    Err(ApiError::bad_request("no file provided"))
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;

    value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("invalid authorization header format"))
}

/// Prometheus 文本输出
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => String::new().into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(header::AUTHORIZATION, "Token abc".parse().unwrap());
        assert!(bearer_token(&headers).is_err());

        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap(), "abc");
    }

    #[test]
    fn client_addr_prefers_real_ip_then_forwarded() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_addr(&headers), "unknown");

        headers.insert("x-forwarded-for", "10.0.0.2, 10.0.0.1".parse().unwrap());
        assert_eq!(client_addr(&headers), "10.0.0.2");

        headers.insert("x-real-ip", "203.0.113.7".parse().unwrap());
        assert_eq!(client_addr(&headers), "203.0.113.7");
    }
}
