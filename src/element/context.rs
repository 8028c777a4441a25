//! Negotiation context and the allocation query.
//!
//! The context owns what negotiation shares with the allocation path: the
//! hardware device, the current output pool, and the transform session.
//! It is `Arc`-shared so an allocation query answered on another thread
//! sees the same pool `set_caps` installed.

use crate::config::StabilizeSettings;
use crate::converters::unit_size;
use crate::error::{Error, Result};
use crate::format::{VideoCaps, lookup};
use crate::memory::{
    AllocationParams, Allocator, HardwareAllocator, HardwareDevice, HardwarePool, PoolConfig,
    SessionId, SystemAllocator,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

// ============================================================================
// Allocation query
// ============================================================================

/// An allocator offered in an allocation query.
#[derive(Clone, Debug)]
pub struct AllocatorProposal {
    /// The allocator.
    pub allocator: Arc<dyn Allocator>,
    /// Allocation parameters.
    pub params: AllocationParams,
}

/// A pool offered in an allocation query.
#[derive(Clone, Debug)]
pub struct PoolProposal {
    /// The pool, or `None` when only sizes are proposed.
    pub pool: Option<Arc<HardwarePool>>,
    /// Buffer size in bytes.
    pub size: usize,
    /// Minimum buffers.
    pub min: usize,
    /// Maximum buffers; 0 means unbounded.
    pub max: usize,
}

/// Downstream's allocation proposal, answered in place.
#[derive(Clone, Debug)]
pub struct AllocationQuery {
    /// Output caps the buffers are for.
    pub caps: VideoCaps,
    /// Whether downstream wants a pool.
    pub need_pool: bool,
    /// Proposed allocators, preferred first.
    pub allocators: Vec<AllocatorProposal>,
    /// Proposed pools, preferred first.
    pub pools: Vec<PoolProposal>,
    /// Proposed allocation metas, by API name.
    pub metas: Vec<String>,
}

impl AllocationQuery {
    /// Empty query for `caps`.
    pub fn new(caps: VideoCaps, need_pool: bool) -> Self {
        Self {
            caps,
            need_pool,
            allocators: Vec::new(),
            pools: Vec::new(),
            metas: Vec::new(),
        }
    }

    /// Add a proposed allocation meta.
    pub fn with_meta(mut self, api: impl Into<String>) -> Self {
        self.metas.push(api.into());
        self
    }

    /// Add a proposed pool.
    pub fn with_pool(mut self, proposal: PoolProposal) -> Self {
        self.pools.push(proposal);
        self
    }

    /// Add a proposed allocator.
    pub fn with_allocator(mut self, proposal: AllocatorProposal) -> Self {
        self.allocators.push(proposal);
        self
    }
}

/// What the element settled on.
#[derive(Clone, Debug)]
pub struct AllocationDecision {
    /// Allocator for output buffers.
    pub allocator: Arc<dyn Allocator>,
    /// Allocation parameters.
    pub params: AllocationParams,
    /// Output pool, for hardware output.
    pub pool: Option<Arc<HardwarePool>>,
    /// Buffer size in bytes.
    pub unit_size: usize,
    /// Minimum buffers.
    pub min: usize,
    /// Maximum buffers; 0 means unbounded.
    pub max: usize,
}

// ============================================================================
// Context
// ============================================================================

/// State shared between negotiation and allocation.
pub struct NegotiationContext {
    device: Arc<dyn HardwareDevice>,
    pool: Mutex<Option<Arc<HardwarePool>>>,
    session: Mutex<Option<SessionId>>,
}

impl NegotiationContext {
    /// Create a context on `device`.
    pub fn new(device: Arc<dyn HardwareDevice>) -> Self {
        Self {
            device,
            pool: Mutex::new(None),
            session: Mutex::new(None),
        }
    }

    /// The hardware device.
    pub fn device(&self) -> &Arc<dyn HardwareDevice> {
        &self.device
    }

    /// The current output pool.
    pub fn pool(&self) -> Option<Arc<HardwarePool>> {
        self.pool.lock().clone()
    }

    /// Build, configure and activate a pool for `caps`, then install it.
    ///
    /// The previous pool, if any, is released; buffers it issued stay valid
    /// until they are dropped. On error the previous pool stays installed.
    pub fn install_pool(
        &self,
        caps: &VideoCaps,
        settings: &StabilizeSettings,
    ) -> Result<Arc<HardwarePool>> {
        let mut slot = self.pool.lock();
        let pool = Arc::new(self.build_pool(caps, settings)?);
        if let Some(old) = slot.replace(pool.clone()) {
            debug!(old = old.id(), new = pool.id(), "output pool replaced");
        }
        Ok(pool)
    }

    /// Return the installed pool when its caps equal `caps`, otherwise
    /// build and install a new one.
    pub fn pool_for(
        &self,
        caps: &VideoCaps,
        settings: &StabilizeSettings,
    ) -> Result<Arc<HardwarePool>> {
        let mut slot = self.pool.lock();
        if let Some(pool) = slot.as_ref().filter(|p| p.caps().as_ref() == Some(caps)) {
            debug!(pool = pool.id(), "reusing output pool");
            return Ok(pool.clone());
        }
        let pool = Arc::new(self.build_pool(caps, settings)?);
        *slot = Some(pool.clone());
        Ok(pool)
    }

    /// Drop the installed pool.
    pub fn release_pool(&self) -> Option<Arc<HardwarePool>> {
        self.pool.lock().take()
    }

    fn build_pool(&self, caps: &VideoCaps, settings: &StabilizeSettings) -> Result<HardwarePool> {
        let video = caps.fixed_video()?;
        let desc = lookup(video.layout)?;
        let allocator = Arc::new(HardwareAllocator::new(
            self.device.clone(),
            desc,
            video.width,
            video.height,
            settings.enable_blocklinear_output,
        ));
        let count = settings.num_output_buffers as usize;
        let pool = HardwarePool::new();
        pool.set_config(PoolConfig::new(caps.clone(), allocator, count, count))?;
        pool.activate().inspect_err(|e| {
            error!(caps = %caps, error = %e, "output pool activation failed");
        })?;
        info!(pool = pool.id(), caps = %caps, buffers = count, "output pool created");
        Ok(pool)
    }

    /// Answer an allocation query.
    ///
    /// Every proposed meta is dropped. Hardware output gets the element's
    /// pool; host output echoes downstream's proposal or falls back to
    /// system memory. The decision is written back into `query`.
    pub fn decide_allocation(
        &self,
        query: &mut AllocationQuery,
        settings: &StabilizeSettings,
    ) -> Result<AllocationDecision> {
        if !query.metas.is_empty() {
            debug!(metas = ?query.metas, "removing allocation metas");
            query.metas.clear();
        }

        let video = query.caps.fixed_video()?;
        let decision = if video.residency.is_hardware() {
            let pool = self.pool_for(&query.caps, settings)?;
            let config = pool.config().ok_or(Error::PoolInactive)?;
            AllocationDecision {
                allocator: config.allocator.clone(),
                params: AllocationParams::default(),
                pool: Some(pool),
                unit_size: config.unit_size,
                min: config.min_buffers,
                max: config.max_buffers,
            }
        } else {
            let (allocator, params) = query
                .allocators
                .first()
                .map(|p| (p.allocator.clone(), p.params))
                .unwrap_or_else(|| {
                    let system: Arc<dyn Allocator> = Arc::new(SystemAllocator);
                    (system, AllocationParams::default())
                });
            let size = unit_size(lookup(video.layout)?, video.width, video.height);
            let (unit_size, min, max) = query
                .pools
                .first()
                .map(|p| (p.size.max(size), p.min, p.max))
                .unwrap_or((size, 0, 0));
            AllocationDecision {
                allocator,
                params,
                pool: None,
                unit_size,
                min,
                max,
            }
        };

        query.allocators = vec![AllocatorProposal {
            allocator: decision.allocator.clone(),
            params: decision.params,
        }];
        query.pools = vec![PoolProposal {
            pool: decision.pool.clone(),
            size: decision.unit_size,
            min: decision.min,
            max: decision.max,
        }];
        debug!(
            allocator = decision.allocator.name(),
            size = decision.unit_size,
            min = decision.min,
            max = decision.max,
            "allocation decided"
        );
        Ok(decision)
    }

    /// Open the transform session, if not open.
    pub fn open_session(&self) -> Result<SessionId> {
        let mut session = self.session.lock();
        if let Some(id) = *session {
            return Ok(id);
        }
        let id = self.device.open_session().inspect_err(|e| {
            error!(device = self.device.name(), error = %e, "failed to open session");
        })?;
        *session = Some(id);
        Ok(id)
    }

    /// Close the transform session, if open. Failures are logged.
    pub fn close_session(&self) {
        let Some(id) = self.session.lock().take() else {
            return;
        };
        if let Err(e) = self.device.close_session(id) {
            error!(device = self.device.name(), error = %e, "failed to close session");
        }
    }

    /// The open session, if any.
    pub fn session(&self) -> Option<SessionId> {
        *self.session.lock()
    }
}

impl fmt::Debug for NegotiationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiationContext")
            .field("device", &self.device.name())
            .field("pool", &self.pool.lock().as_ref().map(|p| p.id()))
            .field("session", &*self.session.lock())
            .finish()
    }
}
