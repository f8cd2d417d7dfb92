//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request ID, observability pipeline, panics)
//! - Expose Prometheus metrics outside the pipeline
//! - Serve until shutdown, then drain pending log/trace work
//!
//! Handlers run without a time limit; any timeout belongs to whatever sits
//! in front of the listener.

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use std::any::Any;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
};

use crate::config::ServiceConfig;
use crate::http::handlers::{not_found, read_message, read_static, update_message};
use crate::http::middleware::{observe, Pipeline};
use crate::http::response::Envelope;
use crate::observability::metrics::{MetricsRecorder, UPKEEP_INTERVAL};
use crate::state::{InvalidMessage, SharedConfig};

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub message: SharedConfig,
    /// Simulated processing time for `GET /message`.
    pub read_delay: Duration,
}

/// Error type for server construction and serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid initial message: {0}")]
    InitialMessage(#[from] InvalidMessage),
    #[error("failed to build metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP server for the message API.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
    message: SharedConfig,
    pipeline: Pipeline,
}

impl HttpServer {
    /// Create a new HTTP server with production observability wiring.
    pub fn new(config: ServiceConfig) -> Result<Self, ServerError> {
        let message = SharedConfig::new(&config.message.initial)?;
        let pipeline = Pipeline::from_config(&config.observability)?;
        Ok(Self::with_parts(config, message, pipeline))
    }

    /// Create a server around an existing message cell and pipeline.
    pub fn with_parts(config: ServiceConfig, message: SharedConfig, pipeline: Pipeline) -> Self {
        let state = AppState {
            message: message.clone(),
            read_delay: Duration::from_millis(config.message.read_delay_ms),
        };
        let router = build_router(state, pipeline.clone());
        Self {
            router,
            config,
            message,
            pipeline,
        }
    }

    /// Run the server on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let upkeep = self.pipeline.metrics().spawn_upkeep(UPKEEP_INTERVAL);
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await;
        upkeep.abort();
        served?;

        let grace = Duration::from_secs(self.config.listener.shutdown_grace_secs);
        let tasks = self.pipeline.tasks();
        if tasks.drain(grace).await {
            tracing::info!(dropped = tasks.dropped(), "HTTP server stopped");
        } else {
            tracing::warn!(
                pending = tasks.pending(),
                dropped = tasks.dropped(),
                "HTTP server stopped with observability work still pending"
            );
        }
        self.pipeline.tracer().flush();
        self.pipeline.metrics().run_upkeep();
        Ok(())
    }

    /// Router handle, e.g. for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn message(&self) -> &SharedConfig {
        &self.message
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState, pipeline: Pipeline) -> Router {
    let api = Router::new()
        .route("/message", any(read_message))
        .route("/configuration", any(update_message))
        .route("/ping", any(|method: Method| read_static(method, "Pong")))
        .route("/health/live", any(|method: Method| read_static(method, "Alive")))
        .route("/health/ready", any(|method: Method| read_static(method, "Ready")))
        .fallback(not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn_with_state(pipeline.clone(), observe))
                .layer(CatchPanicLayer::custom(panic_response)),
        );

    let exporter = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(pipeline.metrics().clone());

    api.merge(exporter)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn render_metrics(State(metrics): State<MetricsRecorder>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.render(),
    )
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Handler panicked");
    Envelope::empty(StatusCode::INTERNAL_SERVER_ERROR).into_response()
}
