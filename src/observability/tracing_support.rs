//! Tracing integration for structured logging and spans.

use tracing::{Level, Span, span};

/// Configuration for tracing behavior.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether to create spans around negotiation steps.
    pub negotiation_spans: bool,
    /// Whether to create spans around each frame.
    pub frame_spans: bool,
    /// Default span level.
    pub level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            negotiation_spans: true,
            frame_spans: false, // one per frame adds up
            level: Level::INFO,
        }
    }
}

impl TracingConfig {
    /// All spans enabled.
    pub fn all() -> Self {
        Self {
            negotiation_spans: true,
            frame_spans: true,
            level: Level::DEBUG,
        }
    }

    /// Disable all spans.
    pub fn none() -> Self {
        Self {
            negotiation_spans: false,
            frame_spans: false,
            level: Level::INFO,
        }
    }

    /// Span for a negotiation step, or a disabled span.
    pub fn negotiation(&self, element: &str, step: &'static str) -> Span {
        if self.negotiation_spans {
            negotiation_span(element, step)
        } else {
            Span::none()
        }
    }

    /// Span for one frame, or a disabled span.
    pub fn frame(&self, element: &str, sequence: u64) -> Span {
        if self.frame_spans {
            frame_span(element, sequence)
        } else {
            Span::none()
        }
    }
}

/// Create a span for a negotiation step.
///
/// # Example
///
/// ```rust
/// use parallax_stabilize::observability::negotiation_span;
///
/// let span = negotiation_span("stabilize0", "set_caps");
/// let _guard = span.enter();
/// ```
#[inline]
pub fn negotiation_span(element: &str, step: &'static str) -> Span {
    span!(Level::DEBUG, "negotiation", element = %element, step = step)
}

/// Create a span for one frame.
#[inline]
pub fn frame_span(element: &str, sequence: u64) -> Span {
    span!(Level::TRACE, "frame", element = %element, sequence = sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert!(config.negotiation_spans);
        assert!(!config.frame_spans);
    }

    #[test]
    fn test_tracing_config_presets() {
        assert!(TracingConfig::all().frame_spans);
        let none = TracingConfig::none();
        assert!(!none.negotiation_spans);
        assert!(none.frame("x", 1).is_disabled());
    }

    #[test]
    fn test_span_creation() {
        let _span = negotiation_span("stabilize0", "fixate");
        let _guard = frame_span("stabilize0", 7).entered();
    }
}
