//! Per-request access records.
//!
//! Exactly one `AccessRecord` is produced for every request that enters the
//! observability pipeline. The default sink writes it through `tracing` so
//! the configured subscriber decides the wire format.

use std::sync::{Arc, Mutex, PoisonError};

/// One completed request.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRecord {
    pub status: u16,
    pub method: String,
    pub path: String,
    pub host: String,
    pub ip: String,
    pub request_id: String,
    pub latency_ms: f64,
    /// Free text: the payload that was sent for this request.
    pub message: String,
}

/// Destination for access records.
pub trait RequestLogger: Send + Sync + 'static {
    fn log(&self, record: &AccessRecord);
}

/// Writes access records as `tracing` events on `micro_api::access`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRequestLogger;

impl RequestLogger for TracingRequestLogger {
    fn log(&self, record: &AccessRecord) {
        if record.status >= 500 {
            tracing::error!(
                target: "micro_api::access",
                status = record.status,
                method = %record.method,
                path = %record.path,
                host = %record.host,
                ip = %record.ip,
                request_id = %record.request_id,
                latency_ms = record.latency_ms,
                "{}",
                record.message
            );
        } else {
            tracing::info!(
                target: "micro_api::access",
                status = record.status,
                method = %record.method,
                path = %record.path,
                host = %record.host,
                ip = %record.ip,
                request_id = %record.request_id,
                latency_ms = record.latency_ms,
                "{}",
                record.message
            );
        }
    }
}

/// Collects access records in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryRequestLogger {
    records: Arc<Mutex<Vec<AccessRecord>>>,
}

impl MemoryRequestLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AccessRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RequestLogger for MemoryRequestLogger {
    fn log(&self, record: &AccessRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}
