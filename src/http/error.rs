//! Handler error taxonomy.
//!
//! Every variant is recovered at the handler boundary and rendered as an
//! envelope with `data: null`; nothing propagates past the pipeline.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::http::response::Envelope;
use crate::state::InvalidMessage;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("bad request: {0}")]
    BadRequest(String),

    /// Surfaced as 400, the cap is enforced while reading.
    #[error("payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("internal error: {0}")]
    InternalError(String),
}

/// Description of the failure, attached to error responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDescription(pub String);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) | ApiError::PayloadTooLarge { .. } => StatusCode::BAD_REQUEST,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<InvalidMessage> for ApiError {
    fn from(err: InvalidMessage) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::InternalError(reason) = &self {
            tracing::error!(error = %reason, "Request failed");
        }
        let mut response = Envelope::empty(self.status()).into_response();
        response
            .extensions_mut()
            .insert(ErrorDescription(self.to_string()));
        response
    }
}
