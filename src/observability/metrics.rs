//! Request metrics collection and exposition.
//!
//! # Metrics
//! - `<prefix>_http_request_count` (counter): requests by status, method, path
//! - `<prefix>_http_request_duration_seconds` (histogram): latency distribution
//!
//! # Design Decisions
//! - Each `MetricsRecorder` owns its Prometheus registry instead of installing
//!   a global recorder, so servers and tests never share counters
//! - Recording is lock-free from the caller's perspective (atomic updates)
//! - Histogram buckets are the standard Prometheus web-latency defaults
//! - Histogram samples buffer in the recorder until drained, so the owner
//!   runs [`MetricsRecorder::spawn_upkeep`] whether or not anyone scrapes

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Period of the histogram drain task.
pub const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Prometheus default buckets, in seconds.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Started when a request enters the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Counts requests and records their latency per (status, method, path).
#[derive(Clone)]
pub struct MetricsRecorder {
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
    count_name: String,
    duration_name: String,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("count_name", &self.count_name)
            .field("duration_name", &self.duration_name)
            .finish_non_exhaustive()
    }
}

impl MetricsRecorder {
    /// Build a recorder whose metric names start with `prefix`.
    pub fn new(prefix: &str) -> Result<Self, BuildError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets(&DEFAULT_BUCKETS)?
            .build_recorder();
        let handle = recorder.handle();

        let metrics = Self {
            recorder: Arc::new(recorder),
            handle,
            count_name: format!("{prefix}_http_request_count"),
            duration_name: format!("{prefix}_http_request_duration_seconds"),
        };
        metrics.describe();
        Ok(metrics)
    }

    fn describe(&self) {
        let count_name = self.count_name.clone();
        let duration_name = self.duration_name.clone();
        metrics::with_local_recorder(self.recorder.as_ref(), move || {
            describe_counter!(
                count_name,
                Unit::Count,
                "The total number of requests made to some endpoint"
            );
            describe_histogram!(
                duration_name,
                Unit::Seconds,
                "Latency of some endpoint requests in seconds"
            );
        });
    }

    /// Begin timing a request.
    pub fn record_start(&self) -> RequestTimer {
        RequestTimer::start()
    }

    /// Increment the request counter and observe the elapsed time, both keyed
    /// by the same (status, method, path) triple.
    pub fn record_end(&self, timer: RequestTimer, status: u16, method: &str, path: &str) {
        let seconds = timer.elapsed().as_secs_f64();
        let status = status.to_string();
        let method = method.to_string();
        let path = path.to_string();
        let count_name = self.count_name.clone();
        let duration_name = self.duration_name.clone();

        metrics::with_local_recorder(self.recorder.as_ref(), move || {
            counter!(
                count_name,
                "status" => status.clone(),
                "method" => method.clone(),
                "path" => path.clone()
            )
            .increment(1);
            histogram!(
                duration_name,
                "status" => status,
                "method" => method,
                "path" => path
            )
            .record(seconds);
        });
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Drain buffered histogram samples into their buckets.
    pub fn run_upkeep(&self) {
        self.handle.run_upkeep();
    }

    /// Run [`run_upkeep`](Self::run_upkeep) every `period` until the
    /// returned task is aborted.
    pub fn spawn_upkeep(&self, period: Duration) -> JoinHandle<()> {
        let handle = self.handle.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                handle.run_upkeep();
            }
        })
    }
}

/// Read a sample value from rendered exposition text.
///
/// `name` must match the sample name exactly and every `(label, value)` pair
/// must be present on the line.
pub fn sample_value(rendered: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    rendered
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter(|line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
        })
        .find(|line| {
            labels
                .iter()
                .all(|(k, v)| line.contains(&format!("{k}=\"{v}\"")))
        })
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_end_counts_and_observes() {
        let metrics = MetricsRecorder::new("test").unwrap();
        let timer = metrics.record_start();
        metrics.record_end(timer, 200, "GET", "/message");
        metrics.record_end(metrics.record_start(), 200, "GET", "/message");
        metrics.record_end(metrics.record_start(), 405, "POST", "/message");

        let rendered = metrics.render();
        let ok = [("status", "200"), ("method", "GET"), ("path", "/message")];
        let denied = [("status", "405"), ("method", "POST"), ("path", "/message")];

        assert_eq!(sample_value(&rendered, "test_http_request_count", &ok), Some(2.0));
        assert_eq!(sample_value(&rendered, "test_http_request_count", &denied), Some(1.0));
        assert_eq!(
            sample_value(&rendered, "test_http_request_duration_seconds_count", &ok),
            Some(2.0)
        );
        assert_eq!(
            sample_value(&rendered, "test_http_request_duration_seconds_count", &denied),
            Some(1.0)
        );
    }

    #[test]
    fn test_recorders_are_isolated() {
        let a = MetricsRecorder::new("iso").unwrap();
        let b = MetricsRecorder::new("iso").unwrap();
        a.record_end(a.record_start(), 200, "GET", "/ping");

        let labels = [("status", "200"), ("path", "/ping")];
        assert_eq!(sample_value(&a.render(), "iso_http_request_count", &labels), Some(1.0));
        assert_eq!(sample_value(&b.render(), "iso_http_request_count", &labels), None);
    }

    #[test]
    fn test_histogram_uses_default_buckets() {
        let metrics = MetricsRecorder::new("bkt").unwrap();
        metrics.record_end(metrics.record_start(), 202, "PUT", "/configuration");

        let rendered = metrics.render();
        assert!(rendered.contains("bkt_http_request_duration_seconds_bucket"));
        assert!(rendered.contains("le=\"0.005\""));
        assert!(rendered.contains("le=\"+Inf\""));
    }

    #[test]
    fn test_concurrent_recording() {
        let metrics = MetricsRecorder::new("conc").unwrap();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.record_end(metrics.record_start(), 200, "GET", "/ping");
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let labels = [("status", "200"), ("method", "GET"), ("path", "/ping")];
        assert_eq!(
            sample_value(&metrics.render(), "conc_http_request_count", &labels),
            Some(800.0)
        );
    }

    #[test]
    fn test_upkeep_keeps_histogram_totals() {
        let metrics = MetricsRecorder::new("upk").unwrap();
        let labels = [("status", "200"), ("path", "/message")];
        metrics.record_end(metrics.record_start(), 200, "GET", "/message");
        metrics.run_upkeep();
        metrics.record_end(metrics.record_start(), 200, "GET", "/message");
        metrics.run_upkeep();

        let rendered = metrics.render();
        assert_eq!(
            sample_value(&rendered, "upk_http_request_duration_seconds_count", &labels),
            Some(2.0)
        );
        // A second scrape reports the same totals.
        assert_eq!(
            sample_value(&metrics.render(), "upk_http_request_duration_seconds_count", &labels),
            Some(2.0)
        );
    }

    #[tokio::test]
    async fn test_upkeep_task_drains_until_aborted() {
        let metrics = MetricsRecorder::new("tick").unwrap();
        let task = metrics.spawn_upkeep(Duration::from_millis(10));
        metrics.record_end(metrics.record_start(), 200, "GET", "/ping");
        tokio::time::sleep(Duration::from_millis(50)).await;

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(
            sample_value(
                &metrics.render(),
                "tick_http_request_duration_seconds_count",
                &[("path", "/ping")],
            ),
            Some(1.0)
        );
    }
}
