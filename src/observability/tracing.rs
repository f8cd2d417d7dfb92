//! Request tracing spans.
//!
//! # Responsibilities
//! - Continue the caller's trace from a W3C `traceparent` header
//! - Create one server span per request with resource and HTTP attributes
//! - Hand finished spans to an OpenTelemetry `SpanExporter`
//!
//! # Design Decisions
//! - `Tracer` owns its SDK provider (no global provider), so every server
//!   and test exports to its own sink
//! - Spans go through the SDK's simple processor: export happens inside
//!   `Span::end`, on the detached task that closes the span
//! - `Span::end` consumes the span, so nothing can be recorded after it
//! - A span dropped without `end` is exported with an `Error` status

use axum::http::HeaderMap;
use futures_util::future::BoxFuture;
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::trace::{
    Span as _, SpanId, SpanKind, Status, Tracer as _, TracerProvider as _,
};
use opentelemetry::{Key, KeyValue, Value};
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Config, Sampler, TracerProvider};
use opentelemetry_sdk::Resource;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

const INSTRUMENTATION_NAME: &str = "micro-api";

/// Creates request spans stamped with the service's resource attributes.
#[derive(Debug, Clone)]
pub struct Tracer {
    provider: TracerProvider,
    tracer: opentelemetry_sdk::trace::Tracer,
    propagator: TraceContextPropagator,
}

impl Tracer {
    /// Tracer exporting every span to `exporter`.
    pub fn new<E>(exporter: E, service_name: &str, environment: &str) -> Self
    where
        E: SpanExporter + 'static,
    {
        let resource = Resource::new(vec![
            KeyValue::new("service.name", service_name.to_string()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("environment", environment.to_string()),
        ]);
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter)
            .with_config(
                Config::default()
                    .with_sampler(Sampler::AlwaysOn)
                    .with_resource(resource),
            )
            .build();
        Self::with_provider(provider)
    }

    /// A tracer whose spans are never recorded.
    pub fn disabled() -> Self {
        let provider = TracerProvider::builder()
            .with_config(Config::default().with_sampler(Sampler::AlwaysOff))
            .build();
        Self::with_provider(provider)
    }

    fn with_provider(provider: TracerProvider) -> Self {
        let tracer = provider.tracer(INSTRUMENTATION_NAME);
        Self {
            provider,
            tracer,
            propagator: TraceContextPropagator::new(),
        }
    }

    /// Push any spans still held by the provider's processors to the exporter.
    pub fn flush(&self) {
        for result in self.provider.force_flush() {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Span flush failed");
            }
        }
    }

    /// Open a server span, continuing the trace carried by `headers` if any.
    pub fn start(&self, name: impl Into<String>, headers: &HeaderMap) -> Span {
        let parent = self.propagator.extract(&HeaderExtractor(headers));
        let inner = self
            .tracer
            .span_builder(name.into())
            .with_kind(SpanKind::Server)
            .start_with_context(&self.tracer, &parent);
        Span {
            inner,
            status_set: false,
            ended: false,
        }
    }
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// An open span bounding one request.
#[derive(Debug)]
pub struct Span {
    inner: opentelemetry_sdk::trace::Span,
    status_set: bool,
    ended: bool,
}

impl Span {
    pub fn set_attribute(&mut self, key: &'static str, value: impl Into<Value>) {
        self.inner.set_attribute(KeyValue::new(key, value));
    }

    pub fn add_event(&mut self, name: &'static str, attributes: Vec<KeyValue>) {
        self.inner.add_event(name, attributes);
    }

    pub fn set_status(&mut self, status: Status) {
        self.status_set = true;
        self.inner.set_status(status);
    }

    /// Finish the span and hand it to the exporter.
    pub fn end(mut self) {
        self.ended = true;
        self.inner.end();
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        if !self.status_set {
            self.inner.set_status(Status::error("span dropped before end"));
        }
        self.inner.end();
    }
}

/// Emits finished spans as structured log events on `micro_api::trace`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogExporter;

impl SpanExporter for LogExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        for span in &batch {
            let duration_ms = span
                .end_time
                .duration_since(span.start_time)
                .unwrap_or_default()
                .as_secs_f64()
                * 1000.0;
            let (status, description) = match &span.status {
                Status::Unset => ("unset", ""),
                Status::Ok => ("ok", ""),
                Status::Error { description } => ("error", description.as_ref()),
            };
            let parent = (span.parent_span_id != SpanId::INVALID)
                .then(|| span.parent_span_id.to_string())
                .unwrap_or_default();

            tracing::debug!(
                target: "micro_api::trace",
                name = %span.name,
                trace_id = %span.span_context.trace_id(),
                span_id = %span.span_context.span_id(),
                parent_span_id = %parent,
                status,
                description,
                duration_ms,
                attributes = ?span.attributes,
                events = span.events.iter().count(),
                "span finished"
            );
        }
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Annotation recorded on a span.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanEvent {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

/// Flattened copy of an exported span.
#[derive(Debug, Clone)]
pub struct SpanRecord {
    pub name: String,
    /// 32 lowercase hex characters.
    pub trace_id: String,
    /// 16 lowercase hex characters.
    pub span_id: String,
    /// Span id of the remote caller, when the trace was continued.
    pub parent_span_id: Option<String>,
    /// Resource attributes followed by span attributes, values as text.
    pub attributes: Vec<(String, String)>,
    pub events: Vec<SpanEvent>,
    pub status: Status,
    pub start: SystemTime,
    pub end: SystemTime,
}

impl SpanRecord {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl From<&SpanData> for SpanRecord {
    fn from(span: &SpanData) -> Self {
        let text = |key: &Key, value: &Value| (key.as_str().to_string(), value.as_str().into_owned());
        let attributes = span
            .resource
            .iter()
            .map(|(k, v)| text(k, v))
            .chain(span.attributes.iter().map(|kv| text(&kv.key, &kv.value)))
            .collect();
        let events = span
            .events
            .iter()
            .map(|event| SpanEvent {
                name: event.name.to_string(),
                attributes: event
                    .attributes
                    .iter()
                    .map(|kv| text(&kv.key, &kv.value))
                    .collect(),
            })
            .collect();

        Self {
            name: span.name.to_string(),
            trace_id: span.span_context.trace_id().to_string(),
            span_id: span.span_context.span_id().to_string(),
            parent_span_id: (span.parent_span_id != SpanId::INVALID)
                .then(|| span.parent_span_id.to_string()),
            attributes,
            events,
            status: span.status.clone(),
            start: span.start_time,
            end: span.end_time,
        }
    }
}

/// Keeps finished spans in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryExporter {
    spans: Arc<Mutex<Vec<SpanRecord>>>,
}

impl MemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every span exported so far.
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SpanExporter for MemoryExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(batch.iter().map(SpanRecord::from));
        Box::pin(std::future::ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracer() -> (Tracer, MemoryExporter) {
        let exporter = MemoryExporter::new();
        let tracer = Tracer::new(exporter.clone(), "micro-api", "test");
        (tracer, exporter)
    }

    fn traceparent(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("traceparent", value.parse().unwrap());
        headers
    }

    #[test]
    fn test_span_exported_once_on_end() {
        let (tracer, exporter) = tracer();
        let mut span = tracer.start("GET /message", &HeaderMap::new());
        span.set_attribute("http.status_code", 200_i64);
        span.add_event("trace", vec![KeyValue::new("message", "Hello World")]);
        span.set_status(Status::Ok);
        span.end();

        let spans = exporter.spans();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "GET /message");
        assert_eq!(span.status, Status::Ok);
        assert_eq!(span.events[0].name, "trace");
        assert_eq!(span.events[0].attributes[0].1, "Hello World");
        assert_eq!(span.attribute("http.status_code"), Some("200"));
        assert_eq!(span.attribute("service.name"), Some("micro-api"));
        assert_eq!(span.attribute("environment"), Some("test"));
        assert_eq!(span.trace_id.len(), 32);
        assert_eq!(span.span_id.len(), 16);
        assert!(span.parent_span_id.is_none());
        assert!(span.end >= span.start);
    }

    #[test]
    fn test_dropped_span_is_exported_as_error() {
        let (tracer, exporter) = tracer();
        drop(tracer.start("lost", &HeaderMap::new()));

        let spans = exporter.spans();
        assert_eq!(spans.len(), 1);
        assert!(matches!(spans[0].status, Status::Error { .. }));
    }

    #[test]
    fn test_traceparent_is_continued() {
        let (tracer, exporter) = tracer();
        let headers = traceparent("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01");
        tracer.start("GET /ping", &headers).end();

        let span = &exporter.spans()[0];
        assert_eq!(span.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(span.parent_span_id.as_deref(), Some("00f067aa0ba902b7"));
        assert_ne!(span.span_id, "00f067aa0ba902b7");
    }

    #[test]
    fn test_unsampled_caller_still_recorded() {
        let (tracer, exporter) = tracer();
        let headers = traceparent("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00");
        tracer.start("GET /ping", &headers).end();

        assert_eq!(exporter.spans().len(), 1);
    }

    #[test]
    fn test_malformed_traceparent_starts_new_trace() {
        let (tracer, exporter) = tracer();
        for header in [
            "garbage",
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7",
        ] {
            tracer.start("GET /ping", &traceparent(header)).end();
        }

        for span in exporter.spans() {
            assert!(span.parent_span_id.is_none(), "continued {:?}", span.trace_id);
            assert_ne!(span.trace_id, "00000000000000000000000000000000");
        }
    }

    #[test]
    fn test_disabled_tracer_records_nothing() {
        let tracer = Tracer::disabled();
        let mut span = tracer.start("noop", &HeaderMap::new());
        span.set_status(Status::Ok);
        span.end();
    }
}
