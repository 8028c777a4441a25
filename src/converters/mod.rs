//! Pixel movers for video frames.
//!
//! Pure Rust helpers the transform uses to move frame data:
//!
//! - [`plane_layout`] / [`unit_size`]: per-plane geometry from the format table
//! - [`upload`] / [`download`]: host ↔ hardware plane copies through a scoped mapping
//! - [`clear_chroma`]: neutral chroma fill for gray-to-YUV output
//! - [`VideoScale`]: resolution scaling (bilinear, nearest neighbor)
//!
//! # Example
//!
//! ```rust
//! use parallax_stabilize::converters::{unit_size, VideoScale};
//! use parallax_stabilize::format::{PixelLayout, lookup};
//!
//! let nv12 = lookup(PixelLayout::Nv12).unwrap();
//! assert_eq!(unit_size(nv12, 1920, 1080), 1920 * 1080 * 3 / 2);
//!
//! let scaler = VideoScale::new(nv12, 1920, 1080, 1280, 720).unwrap();
//! let input = vec![0u8; scaler.input_size()];
//! let mut output = vec![0u8; scaler.output_size()];
//! scaler.scale(&input, &mut output).unwrap();
//! ```

mod planes;
mod scale;

pub use planes::{
    CHROMA_NEUTRAL, PlaneGeometry, clear_chroma, clear_chroma_host, download, frame_size,
    plane_layout, unit_size, upload,
};
pub use scale::{ScaleAlgorithm, VideoScale};
