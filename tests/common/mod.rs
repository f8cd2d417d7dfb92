//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;

use micro_api::config::ServiceConfig;
use micro_api::http::middleware::Pipeline;
use micro_api::observability::access::MemoryRequestLogger;
use micro_api::observability::metrics::{sample_value, MetricsRecorder};
use micro_api::observability::tracing::{MemoryExporter, Tracer};
use micro_api::{HttpServer, SharedConfig};

pub const PREFIX: &str = "itest";

/// A server whose observability sinks are all in memory.
pub struct TestApp {
    pub server: HttpServer,
    pub spans: MemoryExporter,
    pub logs: MemoryRequestLogger,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let spans = MemoryExporter::new();
        let logs = MemoryRequestLogger::new();
        let pipeline = Pipeline::new(
            MetricsRecorder::new(PREFIX).unwrap(),
            Tracer::new(spans.clone(), "micro-api", "test"),
            Arc::new(logs.clone()),
        );
        let message = SharedConfig::new(&config.message.initial).unwrap();
        let server = HttpServer::with_parts(config, message, pipeline);
        Self { server, spans, logs }
    }

    pub fn router(&self) -> Router {
        self.server.router()
    }

    /// Wait for every detached span/log side effect to run.
    pub async fn settle(&self) {
        self.server.pipeline().tasks().wait_idle().await;
    }

    pub fn request_count(&self, status: &str, method: &str, path: &str) -> Option<f64> {
        sample_value(
            &self.server.pipeline().metrics().render(),
            &format!("{PREFIX}_http_request_count"),
            &[("status", status), ("method", method), ("path", path)],
        )
    }

    pub fn latency_count(&self, status: &str, method: &str, path: &str) -> Option<f64> {
        sample_value(
            &self.server.pipeline().metrics().render(),
            &format!("{PREFIX}_http_request_duration_seconds_count"),
            &[("status", status), ("method", method), ("path", path)],
        )
    }
}

pub fn request(method: Method, uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "localhost:9000")
        .body(body.into())
        .unwrap()
}

pub async fn body_bytes(resp: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(resp: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}
