//! # Parallax Stabilize
//!
//! A video stabilization transform with aspect-ratio-preserving caps
//! negotiation and a pool of device surfaces for hardware output.
//!
//! ## Features
//!
//! - **Caps negotiation**: widen, intersect and fixate video caps so the
//!   output keeps the input display aspect ratio
//! - **Hardware surfaces**: generation-tracked buffer pool over a pluggable
//!   [`HardwareDevice`](memory::HardwareDevice), with scoped CPU mappings
//! - **Pluggable stabilizers**: a frame history ring feeding any
//!   [`Stabilizer`](stabilizer::Stabilizer)
//! - **Observability**: `tracing` spans and `metrics` counters per frame
//!
//! ## Quick Start
//!
//! ```rust
//! use parallax_stabilize::prelude::*;
//! use std::sync::Arc;
//!
//! let mut element = Stabilize::new(Arc::new(HostDevice::new()));
//! let input: VideoCaps = "video/x-raw, format=I420, width=64, height=48, pixel-aspect-ratio=1/1"
//!     .parse()?;
//! let downstream: Caps = "video/x-raw, width=32".parse()?;
//!
//! let output = negotiate(&mut element, &input, Some(&downstream))?;
//! let fixed = output.fixed_video()?;
//! assert_eq!((fixed.width, fixed.height), (32, 24));
//!
//! element.start()?;
//! let frame = Buffer::host(vec![0u8; 64 * 48 * 3 / 2], Metadata::with_sequence(0));
//! let out = element.process(frame)?;
//! assert_eq!(out.as_host().map(<[u8]>::len), Some(32 * 24 * 3 / 2));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod buffer;
pub mod config;
pub mod converters;
pub mod element;
pub mod elements;
pub mod error;
pub mod format;
pub mod memory;
pub mod metadata;
pub mod negotiation;
pub mod observability;
pub mod stabilizer;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::Buffer;
    pub use crate::config::{InterpolationMethod, PropertyValue, StabilizeSettings};
    pub use crate::element::{BaseTransform, NegotiationContext, NegotiationState, negotiate};
    pub use crate::elements::{FlowError, Stabilize};
    pub use crate::error::{Error, Result};
    pub use crate::format::{Caps, Fraction, PixelLayout, VideoCaps};
    pub use crate::memory::{HardwareDevice, HardwarePool, HostDevice};
    pub use crate::metadata::Metadata;
    pub use crate::negotiation::{NegotiationError, PadDirection};
    pub use crate::stabilizer::{Stabilizer, StabilizerFactory};
}

pub use error::{Error, Result};
