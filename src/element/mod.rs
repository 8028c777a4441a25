//! Element plumbing for the transform.
//!
//! - [`BaseTransform`]: the hooks a pipeline framework calls on a transform
//! - [`NegotiationContext`]: device, output pool and session shared between
//!   negotiation and allocation
//! - [`NegotiationState`]: the negotiation lifecycle
//!
//! # Design
//!
//! Processing is synchronous: [`BaseTransform::process`] turns one input
//! buffer into one output buffer on the calling thread. Only the
//! [`NegotiationContext`] is shared, so an allocation query may be answered
//! from another thread while the data path runs.

mod context;
mod state;
mod traits;

pub use context::{
    AllocationDecision, AllocationQuery, AllocatorProposal, NegotiationContext, PoolProposal,
};
pub use state::{NegotiationState, StateChange};
pub use traits::{BaseTransform, negotiate};
