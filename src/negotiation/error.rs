//! Negotiation error types.

use crate::format::{ColorFamily, PixelLayout};
use thiserror::Error;

/// Error during caps negotiation.
///
/// Every variant refuses the negotiation; none of them is fatal to the
/// process.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// Pixel layout outside the supported table.
    #[error("unsupported pixel format {layout} ({family:?})")]
    UnsupportedFormat {
        /// Requested layout.
        layout: PixelLayout,
        /// Requested color family.
        family: ColorFamily,
    },

    /// A caps string or descriptor could not be interpreted.
    #[error("invalid caps {caps:?}: {reason}")]
    InvalidCaps {
        /// The offending caps, as text.
        caps: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A field that must be fixed is still a range, list or absent.
    #[error("caps field {field} is not fixed in {caps}")]
    NotFixed {
        /// Field name.
        field: &'static str,
        /// The caps, as text.
        caps: String,
    },

    /// No common format between the two sides.
    #[error("no common format between {upstream} and {downstream}:\n  {explanation}")]
    NoCommonFormat {
        /// Upstream caps.
        upstream: String,
        /// Downstream caps.
        downstream: String,
        /// Detailed explanation.
        explanation: String,
    },

    /// The fixation engine could not produce a concrete geometry.
    #[error("cannot fixate {caps}: {reason}")]
    CannotFixate {
        /// The partially constrained output caps.
        caps: String,
        /// Reason for failure.
        reason: String,
    },

    /// Exact aspect-ratio arithmetic overflowed `i32` terms.
    #[error("aspect ratio overflow computing {what}")]
    Overflow {
        /// Which quantity overflowed.
        what: &'static str,
    },
}

impl NegotiationError {
    /// Create a "no common format" error with a suggestion.
    pub fn no_common_format(upstream: &str, downstream: &str) -> Self {
        Self::NoCommonFormat {
            upstream: upstream.to_string(),
            downstream: downstream.to_string(),
            explanation: format!(
                "Upstream produces: {upstream}\nDownstream accepts: {downstream}\n\
                 Suggestion: insert a format converter before the stabilizer"
            ),
        }
    }

    /// Create a fixation failure.
    pub fn cannot_fixate(caps: impl ToString, reason: impl Into<String>) -> Self {
        Self::CannotFixate {
            caps: caps.to_string(),
            reason: reason.into(),
        }
    }
}
