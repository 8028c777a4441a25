//! Delay-line stabilizer.

use super::{
    FrameHistory, Stabilizer, StabilizerError, StabilizerFactory, StabilizerParams, VideoFrame,
};

/// Publishes the oldest frame in the history ring unchanged.
#[derive(Debug, Default)]
pub struct IdentityStabilizer {
    frames_seen: u64,
    initialized: bool,
}

impl IdentityStabilizer {
    /// Create an uninitialized stabilizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames passed to `process`.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl Stabilizer for IdentityStabilizer {
    fn init(&mut self, _first: &VideoFrame) -> Result<(), StabilizerError> {
        self.initialized = true;
        self.frames_seen = 0;
        Ok(())
    }

    fn process(&mut self, history: &FrameHistory) -> Result<(), StabilizerError> {
        if !self.initialized {
            return Err(StabilizerError::NotInitialized);
        }
        if history.is_empty() {
            return Err(StabilizerError::EmptyHistory);
        }
        self.frames_seen += 1;
        Ok(())
    }

    fn stabilized_frame<'a>(
        &'a self,
        history: &'a FrameHistory,
    ) -> Result<&'a VideoFrame, StabilizerError> {
        if !self.initialized {
            return Err(StabilizerError::NotInitialized);
        }
        history.oldest().ok_or(StabilizerError::EmptyHistory)
    }
}

/// Factory for [`IdentityStabilizer`].
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityFactory;

impl StabilizerFactory for IdentityFactory {
    fn name(&self) -> &str {
        "identity"
    }

    fn create(&self, _params: &StabilizerParams) -> Result<Box<dyn Stabilizer>, StabilizerError> {
        Ok(Box::new(IdentityStabilizer::new()))
    }
}
