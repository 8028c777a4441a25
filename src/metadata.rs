//! Per-frame metadata carried alongside pixel data.
//!
//! The stabilizer does not interpret any of this: the output frame receives
//! a verbatim copy of the input frame's metadata.

use std::time::Duration;

/// Flags describing a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags {
    /// First frame after a discontinuity.
    pub discont: bool,
    /// Frame stands in for missing data.
    pub gap: bool,
    /// Frame is damaged or incomplete.
    pub corrupted: bool,
    /// Frame depends on earlier frames.
    pub delta_unit: bool,
}

/// Value of an extra metadata field.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    /// String value.
    String(String),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

/// Metadata associated with a frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Presentation timestamp.
    pub pts: Option<Duration>,
    /// Decode timestamp.
    pub dts: Option<Duration>,
    /// Frame duration.
    pub duration: Option<Duration>,
    /// Monotonic sequence number within the stream.
    pub sequence: u64,
    /// Frame flags.
    pub flags: FrameFlags,
    /// Extra key-value fields, in insertion order.
    pub extra: Vec<(String, MetadataValue)>,
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metadata with a sequence number.
    pub fn with_sequence(sequence: u64) -> Self {
        Self {
            sequence,
            ..Default::default()
        }
    }

    /// Set the presentation timestamp.
    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Add an extra field.
    pub fn with_extra(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.extra.push((key.into(), value));
        self
    }

    /// Get an extra field by key.
    pub fn get_extra(&self, key: &str) -> Option<&MetadataValue> {
        self.extra.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}
