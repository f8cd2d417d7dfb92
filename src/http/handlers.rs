//! Endpoint handlers.
//!
//! Each handler checks its own method so a wrong verb still produces the
//! JSON envelope (`{"statusCode":405,"data":null}`) and is observed like any
//! other request.

use axum::{
    body::Body,
    extract::State,
    http::{Method, StatusCode},
};
use futures_util::StreamExt;
use serde::Deserialize;

use crate::http::error::ApiError;
use crate::http::response::Envelope;
use crate::http::server::AppState;

/// Largest accepted configuration body, in bytes.
pub const MAX_CONFIGURATION_BODY: usize = 1024;

/// Body of `PUT /configuration`.
#[derive(Debug, Deserialize)]
pub struct ConfigurationDto {
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /message`: the current shared message.
pub async fn read_message(
    State(state): State<AppState>,
    method: Method,
) -> Result<Envelope<String>, ApiError> {
    if method != Method::GET {
        return Err(ApiError::MethodNotAllowed);
    }

    if !state.read_delay.is_zero() {
        tokio::time::sleep(state.read_delay).await;
    }

    let message = state.message.read();
    Ok(Envelope::new(StatusCode::OK, message.as_str().to_owned()))
}

/// Fixed-text endpoints (`/ping`, `/health/live`, `/health/ready`).
pub async fn read_static(method: Method, text: &'static str) -> Result<Envelope<&'static str>, ApiError> {
    if method != Method::GET {
        return Err(ApiError::MethodNotAllowed);
    }
    Ok(Envelope::new(StatusCode::OK, text))
}

/// `PUT /configuration`: replace the shared message.
pub async fn update_message(
    State(state): State<AppState>,
    method: Method,
    body: Body,
) -> Result<Envelope<()>, ApiError> {
    if method != Method::PUT {
        return Err(ApiError::MethodNotAllowed);
    }

    let bytes = read_limited(body, MAX_CONFIGURATION_BODY).await?;
    let payload: ConfigurationDto = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::BadRequest(format!("invalid configuration payload: {e}")))?;

    let message = payload.message.unwrap_or_default();
    if message.is_empty() {
        return Err(ApiError::BadRequest("message is required".to_string()));
    }

    let stored = state.message.replace(&message)?;
    tracing::info!(message = %stored, "Message updated from configuration");

    Ok(Envelope::empty(StatusCode::ACCEPTED))
}

/// Fallback for unknown paths.
pub async fn not_found() -> Envelope<()> {
    Envelope::empty(StatusCode::NOT_FOUND)
}

/// Collect `body`, failing as soon as it grows past `limit` bytes.
async fn read_limited(body: Body, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ApiError::InternalError(format!("failed to read body: {e}")))?;
        if buf.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}
