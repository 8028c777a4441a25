//! Caps negotiation for the stabilizer.
//!
//! The stabilizer sits between two pads and may resize, convert between
//! host and hardware memory, and pick a different pixel layout. Negotiation
//! answers three questions in order:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Negotiation                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  1. transform_caps  what could the other pad carry?             │
//! │  2. fixate_caps     pick one concrete output, keeping DAR       │
//! │  3. accept_caps     does a proposal fit the pad templates?      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use parallax_stabilize::format::{Caps, VideoCaps};
//! use parallax_stabilize::negotiation::{PadDirection, fixate_caps, transform_caps};
//!
//! let input: VideoCaps = "video/x-raw, format=I420, width=1280, height=720, pixel-aspect-ratio=1/1"
//!     .parse()
//!     .unwrap();
//! let filter: Caps = "video/x-raw, width=640".parse().unwrap();
//!
//! let candidates = transform_caps(PadDirection::Sink, &Caps::single(input.clone()), Some(&filter));
//! let fixed = fixate_caps(PadDirection::Sink, &input, &candidates).unwrap();
//! let video = fixed.caps.fixed_video().unwrap();
//! assert_eq!((video.width, video.height), (640, 360));
//! assert!(fixed.dar_preserved);
//! ```

mod error;
mod fixate;
mod resolver;

pub use error::NegotiationError;
pub use fixate::{Fixation, FixationRule, fixate, fixate_caps};
pub use resolver::{PadDirection, accept_caps, open_par_range, pad_template, transform_caps, widen};
