//! Pipeline elements.
//!
//! ## Transforms
//! - [`Stabilize`]: Video stabilization with DAR-preserving rescale and
//!   host or hardware surface output

mod stabilize;

pub use stabilize::{FlowError, NegotiatedGeometry, Stabilize};
