//! Media format and capabilities types.
//!
//! This module provides the pieces caps negotiation is built from:
//!
//! - [`Fraction`]: exact rational arithmetic for aspect ratios
//! - [`CapsValue<T>`]: a value that can be fixed, range, list, or any
//! - [`VideoCaps`] / [`Caps`]: capability descriptors and ordered sets
//! - [`PixelFormatDescriptor`]: the per-layout plane table
//!
//! ```rust
//! use parallax_stabilize::format::{Caps, VideoCaps, PixelLayout};
//!
//! let caps: Caps = "video/x-raw(memory:NVMM), format=NV12; video/x-raw, format=I420"
//!     .parse()
//!     .unwrap();
//! assert!(caps.first().unwrap().is_hardware());
//! ```

mod caps;
mod fraction;
mod parse;
mod pixel;
mod value;

pub use caps::{
    Caps, FixedVideo, HARDWARE_FEATURE, InterlaceMode, MAX_DIMENSION, MemoryResidency, VideoCaps,
};
pub use fraction::{Fraction, display_aspect_ratio, scale_exact, scale_round};
pub use pixel::{
    ColorFamily, HardwareColorFormat, PixelFormatDescriptor, PixelLayout, PlaneSpec, lookup,
    resolve, supported_formats, supported_layouts,
};
pub use value::{CapsValue, Nearness};
