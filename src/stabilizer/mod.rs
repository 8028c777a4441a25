//! The stabilization algorithm seam.
//!
//! The element never does stabilization math itself. It feeds frames into a
//! [`FrameHistory`] ring and asks a [`Stabilizer`] for the frame to publish.
//! Algorithms are plugged in through a [`StabilizerFactory`]; the element
//! builds one lazily from the first frame it sees.
//!
//! ```text
//! frame n ──► FrameHistory (depth = queue-size + 2) ──► Stabilizer::process
//!                                                          │
//!                                 stabilized_frame ◄───────┘
//! ```
//!
//! [`IdentityStabilizer`] is a delay line: it publishes the oldest frame in
//! the ring, so output lags input by `queue-size + 1` frames once the ring
//! is full.

mod identity;

pub use identity::{IdentityFactory, IdentityStabilizer};

use crate::config::{InterpolationMethod, StabilizeSettings};
use crate::format::PixelLayout;
use crate::metadata::Metadata;
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

// ============================================================================
// Errors
// ============================================================================

/// Errors reported by a stabilizer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StabilizerError {
    /// `process` or `stabilized_frame` called before `init`.
    #[error("stabilizer not initialized")]
    NotInitialized,

    /// The history ring holds no frames.
    #[error("frame history is empty")]
    EmptyHistory,

    /// A frame does not match the geometry the stabilizer was built for.
    #[error("frame is {got_width}x{got_height}, stabilizer expects {width}x{height}")]
    Geometry {
        /// Expected width.
        width: u32,
        /// Expected height.
        height: u32,
        /// Width of the offending frame.
        got_width: u32,
        /// Height of the offending frame.
        got_height: u32,
    },

    /// The algorithm failed.
    #[error("stabilizer failed: {0}")]
    Failed(String),
}

// ============================================================================
// Frames
// ============================================================================

/// A tightly packed host frame handed to the stabilizer.
#[derive(Clone, PartialEq)]
pub struct VideoFrame {
    /// Pixel layout.
    pub format: PixelLayout,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Packed plane data.
    pub data: Vec<u8>,
    /// Metadata of the input frame this was built from.
    pub metadata: Metadata,
}

impl VideoFrame {
    /// Create a frame.
    pub fn new(format: PixelLayout, width: u32, height: u32, data: Vec<u8>, metadata: Metadata) -> Self {
        Self {
            format,
            width,
            height,
            data,
            metadata,
        }
    }

    /// Sequence number of the source frame.
    pub fn sequence(&self) -> u64 {
        self.metadata.sequence
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.data.len())
            .field("sequence", &self.metadata.sequence)
            .finish()
    }
}

/// Ring of the most recent frames, oldest first.
#[derive(Debug)]
pub struct FrameHistory {
    frames: VecDeque<VideoFrame>,
    depth: usize,
}

impl FrameHistory {
    /// Create an empty ring holding at most `depth` frames.
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            frames: VecDeque::with_capacity(depth),
            depth,
        }
    }

    /// Append a frame, evicting and returning the oldest when full.
    pub fn push(&mut self, frame: VideoFrame) -> Option<VideoFrame> {
        let evicted = if self.frames.len() == self.depth {
            self.frames.pop_front()
        } else {
            None
        };
        self.frames.push_back(frame);
        evicted
    }

    /// Oldest frame.
    pub fn oldest(&self) -> Option<&VideoFrame> {
        self.frames.front()
    }

    /// Most recent frame.
    pub fn newest(&self) -> Option<&VideoFrame> {
        self.frames.back()
    }

    /// Frame at `index`, oldest first.
    pub fn get(&self, index: usize) -> Option<&VideoFrame> {
        self.frames.get(index)
    }

    /// Frames, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &VideoFrame> {
        self.frames.iter()
    }

    /// Frames held.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when no frame has been pushed.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Maximum frames held.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True when the next push evicts.
    pub fn is_full(&self) -> bool {
        self.frames.len() == self.depth
    }

    /// Drop every frame.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Parameters a stabilizer is built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizerParams {
    /// Frame width.
    pub width: u32,
    /// Frame height.
    pub height: u32,
    /// Fraction of each edge cropped away; negative disables cropping.
    pub crop_margin: f64,
    /// Look-ahead in frames.
    pub queue_size: u32,
    /// Interpolation for warping.
    pub interpolation: InterpolationMethod,
}

impl StabilizerParams {
    /// Parameters for `width`×`height` frames under `settings`.
    pub fn from_settings(width: u32, height: u32, settings: &StabilizeSettings) -> Self {
        Self {
            width,
            height,
            crop_margin: settings.crop_margin,
            queue_size: settings.queue_size,
            interpolation: settings.interpolation,
        }
    }

    /// Depth of the history ring, `queue_size + 2`.
    pub fn history_depth(&self) -> usize {
        self.queue_size as usize + 2
    }
}

/// A stabilization algorithm.
pub trait Stabilizer: Send + fmt::Debug {
    /// Prepare from the first frame of a stream.
    fn init(&mut self, first: &VideoFrame) -> Result<(), StabilizerError>;

    /// Account for the newest frame in `history`.
    fn process(&mut self, history: &FrameHistory) -> Result<(), StabilizerError>;

    /// The frame to publish for the newest input.
    fn stabilized_frame<'a>(
        &'a self,
        history: &'a FrameHistory,
    ) -> Result<&'a VideoFrame, StabilizerError>;
}

/// Builds stabilizers.
pub trait StabilizerFactory: Send + Sync + fmt::Debug {
    /// Algorithm name, for logs.
    fn name(&self) -> &str;

    /// Build a stabilizer for `params`.
    fn create(&self, params: &StabilizerParams) -> Result<Box<dyn Stabilizer>, StabilizerError>;
}

// ============================================================================
// Session
// ============================================================================

/// A stabilizer together with its history ring.
///
/// The two are created and destroyed together.
#[derive(Debug)]
pub struct StabilizerSession {
    stabilizer: Box<dyn Stabilizer>,
    history: FrameHistory,
    params: StabilizerParams,
    initialized: bool,
}

impl StabilizerSession {
    /// Build a session through `factory`.
    pub fn new(
        factory: &dyn StabilizerFactory,
        params: StabilizerParams,
    ) -> Result<Self, StabilizerError> {
        let stabilizer = factory.create(&params)?;
        info!(
            algorithm = factory.name(),
            width = params.width,
            height = params.height,
            queue_size = params.queue_size,
            crop_margin = params.crop_margin,
            "stabilizer created"
        );
        Ok(Self {
            stabilizer,
            history: FrameHistory::new(params.history_depth()),
            params,
            initialized: false,
        })
    }

    /// Feed one frame and return the frame to publish.
    ///
    /// The first frame initializes the stabilizer. The evicted frame, if
    /// any, is returned so its storage can be reused.
    pub fn push(
        &mut self,
        frame: VideoFrame,
    ) -> Result<(&VideoFrame, Option<VideoFrame>), StabilizerError> {
        if frame.width != self.params.width || frame.height != self.params.height {
            return Err(StabilizerError::Geometry {
                width: self.params.width,
                height: self.params.height,
                got_width: frame.width,
                got_height: frame.height,
            });
        }
        if !self.initialized {
            self.stabilizer.init(&frame)?;
            self.initialized = true;
            debug!(sequence = frame.sequence(), "stabilizer initialized from first frame");
        }
        let evicted = self.history.push(frame);
        self.stabilizer.process(&self.history)?;
        let out = self.stabilizer.stabilized_frame(&self.history)?;
        Ok((out, evicted))
    }

    /// The history ring.
    pub fn history(&self) -> &FrameHistory {
        &self.history
    }

    /// Parameters the session was built with.
    pub fn params(&self) -> &StabilizerParams {
        &self.params
    }

    /// True once the first frame has been seen.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}
