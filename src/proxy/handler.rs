use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;

use crate::errors::AppError;
use crate::server::AppState;

/// Relay an already-gated request to the upstream and stream back its
/// status, content type and body.
#[tracing::instrument(skip_all)]
pub async fn relay_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();

    let upstream_resp = state.upstream.relay(body, &content_type).await?;

    let status = StatusCode::from_u16(upstream_resp.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let upstream_type = upstream_resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();
    let bytes = upstream_resp.bytes().await.map_err(|e| {
        tracing::warn!("failed to read upstream body: {}", e);
        AppError::Upstream("failed to read upstream response".to_string())
    })?;

    tracing::info!(status = status.as_u16(), bytes = bytes.len(), "upstream relay complete");

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, upstream_type)
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(e.into()))
}
