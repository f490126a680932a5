use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

use super::client::NodeClient;
use super::error::NodeError;
use super::protocol::{
    ENDPOINT_LEAVE, ENDPOINT_READ, ENDPOINT_STATUS, ENDPOINT_UPDATE, LeaveResponse, ReadResponse,
    StatusResponse, UpdateRequest, UpdateResponse,
};
use crate::storage::types::Key;

/// HTTP router of the client surface, backed by `client`.
pub fn router(client: NodeClient) -> Router {
    Router::new()
        .route(&format!("{}/:key", ENDPOINT_READ), get(handle_read))
        .route(ENDPOINT_UPDATE, post(handle_update))
        .route(ENDPOINT_LEAVE, post(handle_leave))
        .route(ENDPOINT_STATUS, get(handle_status))
        .layer(Extension(client))
}

/// HTTP status an operation error is reported with.
pub fn status_code(error: &NodeError) -> StatusCode {
    match error {
        NodeError::InsufficientMembership { .. } | NodeError::NotReady(_) | NodeError::Stopped => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        NodeError::OperationTimeout => StatusCode::GATEWAY_TIMEOUT,
        NodeError::Storage(_) | NodeError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn handle_read(
    Extension(client): Extension<NodeClient>,
    Path(key_str): Path<String>,
) -> (StatusCode, Json<ReadResponse>) {
    let key: Key = match key_str.parse() {
        Ok(k) => k,
        Err(e) => {
            tracing::error!("Failed to parse key {:?}: {}", key_str, e);
            return (
                StatusCode::BAD_REQUEST,
                Json(ReadResponse {
                    key: 0,
                    found: false,
                    value: None,
                    version: None,
                    error: Some(format!("invalid key: {}", e)),
                }),
            );
        }
    };

    match client.read(key).await {
        Ok(outcome) => {
            let found = outcome.item.is_some();
            let (value, version) = match outcome.item {
                Some(item) => (item.value, Some(item.version)),
                None => (None, None),
            };
            (
                StatusCode::OK,
                Json(ReadResponse {
                    key,
                    found,
                    value,
                    version,
                    error: None,
                }),
            )
        }
        Err(e) => {
            tracing::warn!("Read of key {} failed: {}", key, e);
            (
                status_code(&e),
                Json(ReadResponse {
                    key,
                    found: false,
                    value: None,
                    version: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_update(
    Extension(client): Extension<NodeClient>,
    Json(req): Json<UpdateRequest>,
) -> (StatusCode, Json<UpdateResponse>) {
    match client.update(req.key, req.value).await {
        Ok(item) => (
            StatusCode::OK,
            Json(UpdateResponse {
                success: true,
                key: req.key,
                version: Some(item.version),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!("Update of key {} failed: {}", req.key, e);
            (
                status_code(&e),
                Json(UpdateResponse {
                    success: false,
                    key: req.key,
                    version: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_leave(
    Extension(client): Extension<NodeClient>,
) -> (StatusCode, Json<LeaveResponse>) {
    match client.leave().await {
        Ok(()) => (
            StatusCode::OK,
            Json(LeaveResponse {
                success: true,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!("Leave failed: {}", e);
            (
                status_code(&e),
                Json(LeaveResponse {
                    success: false,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_status(
    Extension(client): Extension<NodeClient>,
) -> (StatusCode, Json<StatusResponse>) {
    match client.status().await {
        Ok(status) => (
            StatusCode::OK,
            Json(StatusResponse {
                status: Some(status),
                error: None,
            }),
        ),
        Err(e) => (
            status_code(&e),
            Json(StatusResponse {
                status: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}
