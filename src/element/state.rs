//! Negotiation lifecycle.
//!
//! ```text
//!            set_caps ok           first transform
//! Unconfigured ────────► Negotiated ───────────────► Streaming
//!      ▲   ▲                  │                          │
//!      │   └── set_caps fail ─┘                          │ stop
//!      │                                                 ▼
//!      └──────────── set_caps / PausedToReady ───────  Stopped
//! ```

use std::fmt;

/// Where the element is in its negotiation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    /// No geometry negotiated.
    #[default]
    Unconfigured,
    /// Caps accepted; no frame seen yet.
    Negotiated,
    /// Frames are flowing.
    Streaming,
    /// Resources released by `stop`.
    Stopped,
}

impl NegotiationState {
    /// True when a frame may be transformed.
    pub fn can_transform(self) -> bool {
        matches!(self, Self::Negotiated | Self::Streaming)
    }

    /// State after a `set_caps` attempt from any state.
    pub fn after_set_caps(self, accepted: bool) -> Self {
        if accepted {
            Self::Negotiated
        } else {
            Self::Unconfigured
        }
    }

    /// State after a transform; `None` if transforming is not allowed.
    pub fn after_transform(self) -> Option<Self> {
        self.can_transform().then_some(Self::Streaming)
    }

    /// Name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Negotiated => "negotiated",
            Self::Streaming => "streaming",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Framework state transitions the element reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Null to Ready.
    NullToReady,
    /// Ready to Paused.
    ReadyToPaused,
    /// Paused to Playing.
    PausedToPlaying,
    /// Playing to Paused.
    PlayingToPaused,
    /// Paused to Ready: drops the stabilizer and the negotiated geometry.
    PausedToReady,
    /// Ready to Null.
    ReadyToNull,
}
