//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! http::middleware::observe produces, per request:
//!     → metrics.rs (counter + latency histogram)
//!     → tracing.rs (one span, exported on end)
//!     → access.rs  (one structured access record)
//!
//! Consumers:
//!     → GET /metrics (Prometheus scrape)
//!     → Span exporter (log, memory, or none)
//!     → Log subscriber configured by logging.rs (JSON or pretty)
//! ```
//!
//! # Design Decisions
//! - Request ID flows into both the span and the access record
//! - Metrics are recorded inline; span export and access logging run on
//!   detached tasks tracked by `lifecycle::SideEffectTracker`
//! - Sinks are traits so tests can observe them deterministically

pub mod access;
pub mod logging;
pub mod metrics;
pub mod tracing;
