//! Status and health check handlers.
//!
//! HTTP endpoints for monitoring server health:
//! - `/status` - Detailed server status with runtime metrics
//! - `/health` - Simple health check for systemd/load balancers
//! - `/ready` - Readiness probe
//!
//! # Example Response
//!
//! ```json
//! {
//!   "version": "0.1.0",
//!   "uptime_seconds": 3600,
//!   "webhooks_received": 1024,
//!   "events_applied": 981,
//!   "events_ignored": 40,
//!   "memory": {
//!     "rss_bytes": 52428800,
//!     "virtual_bytes": 268435456
//!   },
//!   "latency": {
//!     "p50_ms": 12.5,
//!     "p95_ms": 45.2,
//!     "p99_ms": 98.7
//!   }
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, instrument};

use super::AppState;

/// Server version from Cargo.toml
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name from Cargo.toml
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");

// ============================================================================
// Response Types
// ============================================================================

/// Health check response for simple liveness probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status (always "healthy" if responding)
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

/// Detailed server status response with runtime metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Server version (from Cargo.toml)
    pub version: String,

    /// Server name
    pub name: String,

    /// Server uptime in seconds
    pub uptime_seconds: u64,

    /// Total number of webhook deliveries received
    pub webhooks_received: u64,

    /// Number of events whose intent was applied to the store
    pub events_applied: u64,

    /// Number of events acknowledged without action
    pub events_ignored: u64,

    /// Number of requests answered with an error
    pub errors_total: u64,

    /// Memory usage metrics
    pub memory: MemoryMetrics,

    /// Webhook processing latency percentiles
    pub latency: LatencyMetrics,

    /// Server status (always "running" if responding)
    pub status: String,

    /// ISO8601 timestamp of when status was generated
    pub timestamp: String,
}

/// Memory usage metrics collected from sysinfo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Resident Set Size - actual physical memory used (bytes)
    pub rss_bytes: u64,

    /// Virtual memory size (bytes)
    pub virtual_bytes: u64,
}

/// Latency percentile metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyMetrics {
    /// 50th percentile (median) latency in milliseconds
    pub p50_ms: f64,

    /// 95th percentile latency in milliseconds
    pub p95_ms: f64,

    /// 99th percentile latency in milliseconds
    pub p99_ms: f64,

    /// Total number of requests recorded
    pub total_requests: u64,

    /// Mean latency in milliseconds
    pub mean_ms: f64,

    /// Maximum latency recorded in milliseconds
    pub max_ms: f64,
}

// ============================================================================
// Latency Histogram
// ============================================================================

/// Thread-safe latency histogram for recording webhook processing times.
///
/// Uses HdrHistogram for efficient percentile calculations with minimal
/// memory. Tracks latencies from 1 microsecond to 60 seconds with 3
/// significant figures of precision.
#[derive(Debug)]
pub struct LatencyHistogram {
    inner: RwLock<Histogram<u64>>,
}

impl LatencyHistogram {
    /// Create a new latency histogram.
    pub fn new() -> Self {
        // Track 1us to 60 seconds with 3 significant figures
        let histogram =
            Histogram::new_with_bounds(1, 60_000_000, 3).expect("Failed to create histogram");
        Self {
            inner: RwLock::new(histogram),
        }
    }

    /// Record a latency value in microseconds.
    ///
    /// Values outside the histogram bounds are silently ignored.
    pub fn record(&self, latency_us: u64) {
        let mut hist = self.inner.write();
        let _ = hist.record(latency_us);
    }

    /// Record a latency duration.
    pub fn record_duration(&self, duration: std::time::Duration) {
        self.record(duration.as_micros() as u64);
    }

    /// Get the total count of recorded values.
    pub fn count(&self) -> u64 {
        self.inner.read().len()
    }

    /// Get complete latency metrics with percentiles in milliseconds.
    pub fn metrics(&self) -> LatencyMetrics {
        let hist = self.inner.read();
        LatencyMetrics {
            p50_ms: hist.value_at_percentile(50.0) as f64 / 1000.0,
            p95_ms: hist.value_at_percentile(95.0) as f64 / 1000.0,
            p99_ms: hist.value_at_percentile(99.0) as f64 / 1000.0,
            total_requests: hist.len(),
            mean_ms: hist.mean() / 1000.0,
            max_ms: hist.max() as f64 / 1000.0,
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Runtime Stats
// ============================================================================

/// Runtime counters and timings shared across handlers.
///
/// All fields are thread-safe: counters are atomics, the histogram is
/// RwLock-wrapped for efficient reads.
#[derive(Debug)]
pub struct RuntimeStats {
    /// Server start time for uptime calculation
    start_time: Instant,

    /// Total webhook deliveries received
    webhooks_received: AtomicU64,

    /// Events whose intent was applied to the store
    events_applied: AtomicU64,

    /// Events acknowledged without action
    events_ignored: AtomicU64,

    /// Requests answered with an error
    errors_total: AtomicU64,

    /// Webhook processing latency
    latency_histogram: LatencyHistogram,
}

impl RuntimeStats {
    /// Create runtime stats starting now.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            webhooks_received: AtomicU64::new(0),
            events_applied: AtomicU64::new(0),
            events_ignored: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            latency_histogram: LatencyHistogram::new(),
        }
    }

    /// Get the server uptime in seconds.
    #[inline]
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Record an inbound webhook delivery.
    #[inline]
    pub fn record_webhook(&self) -> u64 {
        self.webhooks_received.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record an applied event.
    #[inline]
    pub fn record_applied(&self) -> u64 {
        self.events_applied.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record an ignored event.
    #[inline]
    pub fn record_ignored(&self) -> u64 {
        self.events_ignored.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record an error response.
    #[inline]
    pub fn record_error(&self) -> u64 {
        self.errors_total.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a webhook processing latency.
    #[inline]
    pub fn record_latency(&self, duration: std::time::Duration) {
        self.latency_histogram.record_duration(duration);
    }

    /// Get the counters.
    #[inline]
    pub fn webhooks_received(&self) -> u64 {
        self.webhooks_received.load(Ordering::Relaxed)
    }

    /// Events applied so far.
    #[inline]
    pub fn events_applied(&self) -> u64 {
        self.events_applied.load(Ordering::Relaxed)
    }

    /// Events ignored so far.
    #[inline]
    pub fn events_ignored(&self) -> u64 {
        self.events_ignored.load(Ordering::Relaxed)
    }

    /// Errors so far.
    #[inline]
    pub fn errors_total(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }

    /// Get the latency metrics.
    #[inline]
    pub fn latency_metrics(&self) -> LatencyMetrics {
        self.latency_histogram.metrics()
    }
}

impl Default for RuntimeStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// System Metrics Collection
// ============================================================================

/// Collect memory metrics for the current process using sysinfo.
fn collect_memory_metrics() -> MemoryMetrics {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();

    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    match system.process(pid) {
        Some(process) => MemoryMetrics {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        },
        None => {
            debug!("Could not find current process in sysinfo");
            MemoryMetrics::default()
        }
    }
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// Health check endpoint handler.
///
/// # Route
/// `GET /health`
#[instrument(skip_all)]
pub async fn health_handler() -> impl IntoResponse {
    debug!("Health check requested");
    (StatusCode::OK, Json(HealthResponse::default()))
}

/// Detailed status endpoint handler.
///
/// # Route
/// `GET /status`
#[instrument(skip_all)]
pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Status check requested");

    let runtime = &state.runtime;
    let response = StatusResponse {
        version: SERVER_VERSION.to_string(),
        name: SERVER_NAME.to_string(),
        uptime_seconds: runtime.uptime_seconds(),
        webhooks_received: runtime.webhooks_received(),
        events_applied: runtime.events_applied(),
        events_ignored: runtime.events_ignored(),
        errors_total: runtime.errors_total(),
        memory: collect_memory_metrics(),
        latency: runtime.latency_metrics(),
        status: "running".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

/// Readiness check endpoint handler.
///
/// # Route
/// `GET /ready`
#[instrument(skip_all)]
pub async fn readiness_handler() -> impl IntoResponse {
    debug!("Readiness check requested");
    (StatusCode::OK, Json(HealthResponse::default()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_default() {
        let health = HealthResponse::default();
        assert_eq!(health.status, "healthy");
    }

    #[test]
    fn test_runtime_stats_counters() {
        let stats = RuntimeStats::new();

        assert_eq!(stats.record_webhook(), 1);
        assert_eq!(stats.record_webhook(), 2);
        assert_eq!(stats.record_applied(), 1);
        assert_eq!(stats.record_ignored(), 1);
        assert_eq!(stats.record_error(), 1);

        assert_eq!(stats.webhooks_received(), 2);
        assert_eq!(stats.events_applied(), 1);
        assert_eq!(stats.events_ignored(), 1);
        assert_eq!(stats.errors_total(), 1);
        assert!(stats.uptime_seconds() < 1);
    }

    #[test]
    fn test_latency_histogram() {
        let histogram = LatencyHistogram::new();

        histogram.record(1000); // 1ms
        histogram.record(5000); // 5ms
        histogram.record(50000); // 50ms

        assert_eq!(histogram.count(), 3);

        let metrics = histogram.metrics();
        assert!(metrics.p50_ms > 0.0);
        assert!(metrics.p95_ms >= metrics.p50_ms);
        assert!(metrics.p99_ms >= metrics.p95_ms);
        assert_eq!(metrics.total_requests, 3);
    }

    #[test]
    fn test_collect_memory_metrics() {
        let metrics = collect_memory_metrics();
        assert!(metrics.rss_bytes > 0);
    }

    #[test]
    fn test_runtime_stats_thread_safety() {
        use std::thread;

        let stats = Arc::new(RuntimeStats::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    stats.record_webhook();
                    stats.record_applied();
                    stats.record_latency(std::time::Duration::from_micros(1000));
                }
            }));
        }

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(stats.webhooks_received(), 10_000);
        assert_eq!(stats.events_applied(), 10_000);
        assert_eq!(stats.latency_metrics().total_requests, 10_000);
    }
}
