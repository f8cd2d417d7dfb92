//! Response envelope.
//!
//! Every JSON body is `{"statusCode": <int>, "data": <T>}` and is written
//! with `Content-Type: application/json`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// The `{statusCode, data}` wrapper applied to every JSON response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<T> {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(status: StatusCode, data: T) -> Self {
        Self {
            status_code: status.as_u16(),
            data,
        }
    }
}

impl Envelope<()> {
    /// Envelope carrying `data: null`.
    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, ())
    }
}

/// Text form of the `data` that was sent, attached to the response so the
/// observability pipeline can tag spans and access logs with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePayload(pub String);

impl ResponsePayload {
    fn of<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(serde_json::Value::String(text)) => Self(text),
            Ok(value) => Self(value.to_string()),
            Err(_) => Self(String::new()),
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let payload = ResponsePayload::of(&self.data);
        let mut response = (status, Json(self)).into_response();
        response.extensions_mut().insert(payload);
        response
    }
}
