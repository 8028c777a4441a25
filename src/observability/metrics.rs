//! Metrics collection using metrics-rs.

use metrics::{Counter, Histogram, Unit, counter, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Frames that produced an output buffer.
pub const FRAMES_PROCESSED: &str = "stabilize_frames_processed";
/// Frames that failed in the transform.
pub const FRAMES_FAILED: &str = "stabilize_frames_failed";
/// Successful `set_caps` negotiations.
pub const NEGOTIATIONS: &str = "stabilize_negotiations";
/// Refused negotiations.
pub const NEGOTIATION_FAILURES: &str = "stabilize_negotiation_failures";
/// Surfaces allocated by output pools.
pub const POOL_ALLOCATIONS: &str = "stabilize_pool_allocations";
/// Output buffers currently issued.
pub const POOL_BUFFERS_IN_USE: &str = "stabilize_pool_buffers_in_use";
/// Wall time of one transform call.
pub const FRAME_TIME_NS: &str = "stabilize_frame_time_ns";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        FRAMES_PROCESSED,
        Unit::Count,
        "Total number of frames stabilized"
    );
    metrics::describe_counter!(
        FRAMES_FAILED,
        Unit::Count,
        "Total number of frames that failed to transform"
    );
    metrics::describe_counter!(NEGOTIATIONS, Unit::Count, "Caps negotiations accepted");
    metrics::describe_counter!(
        NEGOTIATION_FAILURES,
        Unit::Count,
        "Caps negotiations refused"
    );
    metrics::describe_counter!(
        POOL_ALLOCATIONS,
        Unit::Count,
        "Hardware surfaces allocated by output pools"
    );
    metrics::describe_gauge!(
        POOL_BUFFERS_IN_USE,
        Unit::Count,
        "Output buffers currently issued"
    );
    metrics::describe_histogram!(
        FRAME_TIME_NS,
        Unit::Nanoseconds,
        "Time to transform a single frame"
    );
}

/// Record a negotiation outcome.
#[inline]
pub fn record_negotiation(element: &str, accepted: bool) {
    let name = if accepted {
        NEGOTIATIONS
    } else {
        NEGOTIATION_FAILURES
    };
    counter!(name, "element" => element.to_string()).increment(1);
}

/// Per-element frame metrics with pre-built handles.
#[derive(Clone)]
pub struct FrameMetrics {
    element: String,
    processed: Counter,
    failed: Counter,
    frame_time: Histogram,
}

impl FrameMetrics {
    /// Create a collector labelled with `element`.
    pub fn new(element: &str) -> Self {
        Self {
            element: element.to_string(),
            processed: counter!(FRAMES_PROCESSED, "element" => element.to_string()),
            failed: counter!(FRAMES_FAILED, "element" => element.to_string()),
            frame_time: histogram!(FRAME_TIME_NS, "element" => element.to_string()),
        }
    }

    /// Record a successful frame.
    #[inline]
    pub fn record_processed(&self) {
        self.processed.increment(1);
    }

    /// Record a failed frame.
    #[inline]
    pub fn record_failed(&self) {
        self.failed.increment(1);
    }

    /// Record transform time.
    #[inline]
    pub fn record_time(&self, duration: Duration) {
        self.frame_time.record(duration.as_nanos() as f64);
    }

    /// Start a timer and return a guard that records on drop.
    pub fn start_timer(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            metrics: self,
        }
    }

    /// Element label.
    pub fn element(&self) -> &str {
        &self.element
    }
}

impl std::fmt::Debug for FrameMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameMetrics")
            .field("element", &self.element)
            .finish()
    }
}

/// Guard that records transform time when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    metrics: &'a FrameMetrics,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.metrics.record_time(self.start.elapsed());
    }
}
