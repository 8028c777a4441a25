//! The transform element trait.

use super::context::{AllocationDecision, AllocationQuery};
use super::state::StateChange;
use crate::buffer::Buffer;
use crate::format::{Caps, VideoCaps};
use crate::negotiation::{Fixation, NegotiationError, PadDirection};
use tracing::debug;

/// A one-in, one-out transform with caps negotiation.
///
/// The framework drives an implementation through these hooks:
///
/// 1. [`transform_caps`](Self::transform_caps) and
///    [`fixate_caps`](Self::fixate_caps) pick the output caps,
/// 2. [`set_caps`](Self::set_caps) commits them,
/// 3. [`decide_allocation`](Self::decide_allocation) settles output memory,
/// 4. [`process`](Self::process) runs once per frame.
///
/// [`negotiate`] runs steps 1 and 2 the way a pipeline would.
pub trait BaseTransform: Send {
    /// Error returned by fallible hooks.
    type Error: From<NegotiationError>;

    /// Element name, for logging.
    fn name(&self) -> &str;

    /// Caps the pad opposite `direction` could carry given `caps` on it.
    fn transform_caps(&self, direction: PadDirection, caps: &Caps, filter: Option<&Caps>) -> Caps;

    /// Fixate `othercaps` against the fixed `caps` on the `direction` pad.
    fn fixate_caps(
        &self,
        direction: PadDirection,
        caps: &VideoCaps,
        othercaps: &Caps,
    ) -> Result<Fixation, NegotiationError>;

    /// Whether `caps` fit the `direction` pad.
    fn accept_caps(&self, direction: PadDirection, caps: &Caps) -> bool;

    /// Commit fixed input and output caps.
    fn set_caps(&mut self, incaps: &VideoCaps, outcaps: &VideoCaps) -> Result<(), Self::Error>;

    /// Answer downstream's allocation query.
    fn decide_allocation(
        &mut self,
        query: &mut AllocationQuery,
    ) -> Result<AllocationDecision, Self::Error>;

    /// Acquire runtime resources.
    fn start(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Release runtime resources.
    fn stop(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// React to a framework state change.
    fn change_state(&mut self, _transition: StateChange) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Allocate the output buffer for `input`.
    fn prepare_output_buffer(&mut self, input: &Buffer) -> Result<Buffer, Self::Error>;

    /// Render `input` into `output`.
    fn transform(&mut self, input: &Buffer, output: &mut Buffer) -> Result<(), Self::Error>;

    /// Process one frame: prepare an output buffer and render into it.
    fn process(&mut self, input: Buffer) -> Result<Buffer, Self::Error> {
        let mut output = self.prepare_output_buffer(&input)?;
        self.transform(&input, &mut output)?;
        Ok(output)
    }
}

/// Negotiate output caps for `input` against what downstream accepts.
///
/// Runs `transform_caps` with `downstream` as the filter, fixates the
/// result and commits both sides with `set_caps`. Returns the output caps.
pub fn negotiate<T: BaseTransform>(
    element: &mut T,
    input: &VideoCaps,
    downstream: Option<&Caps>,
) -> Result<VideoCaps, T::Error> {
    let incaps = Caps::single(input.clone());
    if !element.accept_caps(PadDirection::Sink, &incaps) {
        return Err(NegotiationError::no_common_format(&input.to_string(), "sink template").into());
    }
    let candidates = element.transform_caps(PadDirection::Sink, &incaps, downstream);
    debug!(element = element.name(), candidates = %candidates, "transformed caps");
    let fixation = element.fixate_caps(PadDirection::Sink, input, &candidates)?;
    element.set_caps(input, &fixation.caps)?;
    Ok(fixation.caps)
}
