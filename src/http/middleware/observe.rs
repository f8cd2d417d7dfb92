//! Observability pipeline.
//!
//! Wraps every API request and, once the handler has produced a response,
//! records metrics, closes the trace span and writes the access record, in
//! that order and exactly once.
//!
//! ```text
//! Started → HandlerInvoked → ResponseCommitted
//!     → MetricsRecorded (inline)
//!     → TraceClosed → Logged → Done (detached, counted by SideEffectTracker)
//! ```
//!
//! If the request future is dropped before a response exists, the
//! `Observation` guard finalizes it with status 500 instead.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use metrics_exporter_prometheus::BuildError;
use opentelemetry::trace::Status;
use opentelemetry::KeyValue;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::config::ObservabilityConfig;
use crate::http::error::ErrorDescription;
use crate::http::request::{RequestContext, Stage};
use crate::http::response::ResponsePayload;
use crate::lifecycle::SideEffectTracker;
use crate::observability::access::{AccessRecord, RequestLogger, TracingRequestLogger};
use crate::observability::metrics::{MetricsRecorder, RequestTimer};
use crate::observability::tracing::{LogExporter, Span, Tracer};

/// Shared collaborators of the pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    metrics: MetricsRecorder,
    tracer: Tracer,
    logger: Arc<dyn RequestLogger>,
    tasks: SideEffectTracker,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("metrics", &self.metrics)
            .field("tracer", &self.tracer)
            .field("pending", &self.tasks.pending())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(metrics: MetricsRecorder, tracer: Tracer, logger: Arc<dyn RequestLogger>) -> Self {
        Self {
            metrics,
            tracer,
            logger,
            tasks: SideEffectTracker::new(),
        }
    }

    /// Production wiring: Prometheus metrics, log span exporter (when
    /// enabled) and `tracing` access logs.
    pub fn from_config(config: &ObservabilityConfig) -> Result<Self, BuildError> {
        let metrics = MetricsRecorder::new(&config.metrics_prefix)?;
        let tracer = if config.tracing_enabled {
            Tracer::new(LogExporter, &config.service_name, &config.environment)
        } else {
            Tracer::disabled()
        };
        Ok(Self::new(metrics, tracer, Arc::new(TracingRequestLogger)))
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Tracker for the detached trace/log work of finished requests.
    pub fn tasks(&self) -> &SideEffectTracker {
        &self.tasks
    }

    /// Start observing `request`.
    pub fn begin(&self, request: &Request<Body>) -> Observation {
        let ctx = RequestContext::from_request(request);
        let timer = self.metrics.record_start();
        let span = self.tracer.start(
            format!("{} {}", ctx.method, ctx.route),
            request.headers(),
        );

        Observation {
            pipeline: self.clone(),
            state: Some(InFlight { ctx, timer, span }),
        }
    }
}

struct InFlight {
    ctx: RequestContext,
    timer: RequestTimer,
    span: Span,
}

/// Outcome of the handler as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: StatusCode,
    /// Text of the `data` that was sent.
    pub payload: String,
    pub error: Option<String>,
}

impl Outcome {
    fn of(response: &Response) -> Self {
        Self {
            status: response.status(),
            payload: response
                .extensions()
                .get::<ResponsePayload>()
                .map(|p| p.0.clone())
                .unwrap_or_default(),
            error: response
                .extensions()
                .get::<ErrorDescription>()
                .map(|e| e.0.clone()),
        }
    }

    fn aborted() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            payload: String::new(),
            error: Some("request aborted before a response was produced".to_string()),
        }
    }
}

/// Guard for one in-flight request. Finalizes exactly once: through
/// [`Observation::complete`], or on drop.
pub struct Observation {
    pipeline: Pipeline,
    state: Option<InFlight>,
}

impl Observation {
    pub fn handler_invoked(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.ctx.advance(Stage::HandlerInvoked);
        }
    }

    /// Finalize with the handler's response and hand it back unchanged.
    pub fn complete(mut self, response: Response) -> Response {
        let outcome = Outcome::of(&response);
        if let Some(state) = self.state.take() {
            self.pipeline.finalize(state, outcome);
        }
        response
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        if let Some(mut state) = self.state.take() {
            if state.ctx.stage() == Stage::Started {
                state.ctx.advance(Stage::HandlerInvoked);
            }
            self.pipeline.finalize(state, Outcome::aborted());
        }
    }
}

impl Pipeline {
    fn finalize(&self, state: InFlight, outcome: Outcome) {
        let InFlight {
            mut ctx,
            timer,
            mut span,
        } = state;

        let status = ctx.commit(outcome.status);
        ctx.advance(Stage::ResponseCommitted);

        let latency_ms = timer.elapsed().as_secs_f64() * 1000.0;
        let method = ctx.method.to_string();
        guarded("metrics", || {
            self.metrics
                .record_end(timer, status.as_u16(), &method, &ctx.route)
        });
        ctx.advance(Stage::MetricsRecorded);

        let logger = self.logger.clone();
        self.tasks.dispatch(move || {
            guarded("trace", || close_span(&mut span, &ctx, status, &outcome));
            guarded("trace", move || span.end());
            ctx.advance(Stage::TraceClosed);

            let record = AccessRecord {
                status: status.as_u16(),
                method,
                path: ctx.path.clone(),
                host: ctx.host.clone(),
                ip: ctx.ip.clone(),
                request_id: ctx.request_id.clone(),
                latency_ms,
                message: outcome.error.clone().unwrap_or(outcome.payload),
            };
            guarded("access log", || logger.log(&record));
            ctx.advance(Stage::Logged);
            ctx.advance(Stage::Done);
        });
    }
}

fn close_span(span: &mut Span, ctx: &RequestContext, status: StatusCode, outcome: &Outcome) {
    span.set_attribute("http.method", ctx.method.to_string());
    span.set_attribute("http.route", ctx.route.clone());
    span.set_attribute("http.target", ctx.path.clone());
    span.set_attribute("http.status_code", i64::from(status.as_u16()));
    span.set_attribute("http.request_id", ctx.request_id.clone());
    span.add_event(
        "trace",
        vec![KeyValue::new("message", outcome.payload.clone())],
    );

    if status.is_server_error() {
        let description = outcome
            .error
            .clone()
            .unwrap_or_else(|| status.to_string());
        span.set_status(Status::error(description));
    } else {
        span.set_status(Status::Ok);
    }
}

/// Run one side effect, swallowing (and logging) a panic so it can never
/// affect the response or the remaining side effects.
fn guarded<F: FnOnce()>(stage: &'static str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!(stage, "Observability side effect panicked");
    }
}

/// Axum middleware driving the pipeline for one request.
pub async fn observe(
    State(pipeline): State<Pipeline>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut observation = pipeline.begin(&request);
    observation.handler_invoked();

    let response = next.run(request).await;
    observation.complete(response)
}
