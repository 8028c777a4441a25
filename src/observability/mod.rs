//! Observability features: metrics and tracing.
//!
//! - **Metrics**: Counters, gauges, and histograms via `metrics-rs`
//! - **Tracing**: Structured logging and spans via `tracing`
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `stabilize_frames_processed` | Counter | Frames stabilized |
//! | `stabilize_frames_failed` | Counter | Frames that failed to transform |
//! | `stabilize_negotiations` | Counter | Negotiations accepted |
//! | `stabilize_negotiation_failures` | Counter | Negotiations refused |
//! | `stabilize_pool_allocations` | Counter | Hardware surfaces allocated by pools |
//! | `stabilize_pool_buffers_in_use` | Gauge | Output buffers currently issued |
//! | `stabilize_frame_time_ns` | Histogram | Transform time per frame |
//!
//! Nothing is exported unless the application installs a recorder.
//!
//! ## Example
//!
//! ```rust
//! use parallax_stabilize::observability::init_metrics;
//!
//! init_metrics();
//! ```

pub mod metrics;
mod tracing_support;

pub use self::metrics::{FrameMetrics, TimerGuard, init_metrics, record_negotiation};
pub use tracing_support::{TracingConfig, frame_span, negotiation_span};
