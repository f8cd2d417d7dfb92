//! Per-request context.
//!
//! # Responsibilities
//! - Capture method, path, host, client IP and request id on entry
//! - Hold the committed status code (first commit wins, then frozen)
//! - Track the pipeline stage the request has reached
//!
//! # Design Decisions
//! - Owned by exactly one pipeline instance, never shared or pooled
//! - The metrics path label is the matched route, not the raw URI, so label
//!   cardinality stays bounded

use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath},
    http::{header, Method, Request, StatusCode},
};
use std::net::SocketAddr;

pub use tower_http::request_id::RequestId;

/// Header carrying the request id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Metrics path label used for requests that matched no route.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Pipeline stages, in the only order they may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Started,
    HandlerInvoked,
    ResponseCommitted,
    MetricsRecorded,
    TraceClosed,
    Logged,
    Done,
}

impl Stage {
    fn next(self) -> Option<Stage> {
        match self {
            Stage::Started => Some(Stage::HandlerInvoked),
            Stage::HandlerInvoked => Some(Stage::ResponseCommitted),
            Stage::ResponseCommitted => Some(Stage::MetricsRecorded),
            Stage::MetricsRecorded => Some(Stage::TraceClosed),
            Stage::TraceClosed => Some(Stage::Logged),
            Stage::Logged => Some(Stage::Done),
            Stage::Done => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    /// Matched route template, or [`UNMATCHED_ROUTE`].
    pub route: String,
    pub host: String,
    pub ip: String,
    pub request_id: String,
    status: Option<StatusCode>,
    stage: Stage,
}

impl RequestContext {
    pub fn from_request(request: &Request<Body>) -> Self {
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());

        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| request.uri().authority().map(|a| a.to_string()))
            .unwrap_or_default();

        let ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_default();

        let request_id = request
            .extensions()
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
            .or_else(|| {
                request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
            })
            .unwrap_or("unknown")
            .to_string();

        Self {
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            route,
            host,
            ip,
            request_id,
            status: None,
            stage: Stage::Started,
        }
    }

    /// Commit `status` as the response status. Only the first commit takes
    /// effect; the committed status is returned either way.
    pub fn commit(&mut self, status: StatusCode) -> StatusCode {
        *self.status.get_or_insert(status)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Move to `stage`, which must directly follow the current one.
    pub fn advance(&mut self, stage: Stage) {
        debug_assert_eq!(
            self.stage.next(),
            Some(stage),
            "pipeline stage {:?} cannot follow {:?}",
            stage,
            self.stage
        );
        self.stage = stage;
    }
}
