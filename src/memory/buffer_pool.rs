//! Pool of hardware output buffers.
//!
//! This module provides the pool the stabilizer hands out output surfaces
//! from:
//! - Pre-allocates `min_buffers` surfaces when activated
//! - Grows on demand up to `max_buffers`
//! - Blocks when exhausted (backpressure), with non-blocking and timed
//!   variants
//! - Returns buffers to the idle set when a [`PooledHardwareBuffer`] drops
//!
//! # Reconfiguration
//!
//! [`HardwarePool::set_config`] validates the new configuration before
//! touching anything, so a rejected configuration leaves the old one in
//! place. Every accepted configuration bumps a generation counter; buffers
//! issued under an older generation, or after the pool was deactivated, are
//! destroyed on release instead of being recycled.
//!
//! Each issued buffer holds the pool's shared state, so a pool that has been
//! replaced stays alive until its last buffer comes back.
//!
//! # Example
//!
//! ```rust
//! use parallax_stabilize::format::{Fraction, MemoryResidency, PixelLayout, VideoCaps, lookup};
//! use parallax_stabilize::memory::{HardwareAllocator, HardwarePool, HostDevice, PoolConfig};
//! use std::sync::Arc;
//!
//! let device = Arc::new(HostDevice::new());
//! let format = lookup(PixelLayout::Nv12).unwrap();
//! let allocator = Arc::new(HardwareAllocator::new(device, format, 640, 480, false));
//! let caps = VideoCaps::fixed(PixelLayout::Nv12, 640, 480, Fraction::ONE)
//!     .with_residency(MemoryResidency::Hardware);
//!
//! let pool = HardwarePool::new();
//! pool.set_config(PoolConfig::new(caps, allocator, 2, 4)).unwrap();
//! pool.activate().unwrap();
//!
//! let buffer = pool.acquire().unwrap();
//! assert_eq!(pool.stats().in_use, 1);
//! drop(buffer);
//! assert_eq!(pool.stats().idle, 2);
//! ```

use super::allocator::{HardwareAllocator, HardwareBuffer};
use crate::converters::unit_size;
use crate::error::{Error, Result};
use crate::format::VideoCaps;
use crate::observability::metrics::{POOL_ALLOCATIONS, POOL_BUFFERS_IN_USE};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

// ============================================================================
// Configuration
// ============================================================================

/// Pool configuration.
#[derive(Clone)]
pub struct PoolConfig {
    /// Caps every buffer is allocated for. Must be fixed.
    pub caps: VideoCaps,
    /// Size of one buffer in its packed host form.
    pub unit_size: usize,
    /// Buffers preallocated on activation.
    pub min_buffers: usize,
    /// Upper bound on buffers alive at once.
    pub max_buffers: usize,
    /// Allocator for new buffers.
    pub allocator: Arc<HardwareAllocator>,
}

impl PoolConfig {
    /// Configuration for `caps` with the unit size derived from the
    /// allocator's format and dimensions.
    pub fn new(
        caps: VideoCaps,
        allocator: Arc<HardwareAllocator>,
        min_buffers: usize,
        max_buffers: usize,
    ) -> Self {
        let (width, height) = allocator.dimensions();
        Self {
            unit_size: unit_size(allocator.format(), width, height),
            caps,
            min_buffers,
            max_buffers,
            allocator,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_buffers == 0 {
            return Err(Error::Config("pool max_buffers must be at least 1".into()));
        }
        if self.min_buffers > self.max_buffers {
            return Err(Error::Config(format!(
                "pool min_buffers {} exceeds max_buffers {}",
                self.min_buffers, self.max_buffers
            )));
        }
        let video = self.caps.fixed_video()?;
        if !video.residency.is_hardware() {
            return Err(Error::Config(format!(
                "pool caps must be hardware-resident: {}",
                self.caps
            )));
        }
        if video.layout != self.allocator.format().layout
            || (video.width, video.height) != self.allocator.dimensions()
        {
            return Err(Error::Config(format!(
                "pool caps {} do not match allocator {:?}",
                self.caps, self.allocator
            )));
        }
        if self.unit_size == 0 {
            return Err(Error::Config("pool unit_size must be non-zero".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("caps", &self.caps.to_string())
            .field("unit_size", &self.unit_size)
            .field("min_buffers", &self.min_buffers)
            .field("max_buffers", &self.max_buffers)
            .finish()
    }
}

/// Statistics about pool usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured maximum.
    pub capacity: usize,
    /// Buffers alive and owned by this generation (idle plus in use).
    pub allocated: usize,
    /// Buffers waiting in the idle set.
    pub idle: usize,
    /// Buffers currently issued.
    pub in_use: usize,
    /// Total number of acquisitions.
    pub acquisitions: u64,
    /// Acquisitions that had to wait for a buffer.
    pub waits: u64,
    /// Surfaces allocated over the pool's lifetime.
    pub allocations: u64,
}

// ============================================================================
// HardwarePool
// ============================================================================

struct PoolState {
    config: Option<PoolConfig>,
    generation: u64,
    active: bool,
    idle: Vec<HardwareBuffer>,
    /// Buffers of the current generation that are issued.
    outstanding: usize,
    /// Buffers of the current generation that are alive.
    allocated: usize,
}

struct PoolInner {
    id: u64,
    state: Mutex<PoolState>,
    available: Condvar,
    acquisitions: AtomicU64,
    waits: AtomicU64,
    allocations: AtomicU64,
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// A pool of hardware buffers of one fixed format and size.
pub struct HardwarePool {
    inner: Arc<PoolInner>,
}

enum Take {
    Ready(PooledHardwareBuffer),
    Exhausted { in_use: usize, max: usize },
}

impl HardwarePool {
    /// Create an unconfigured, inactive pool.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PoolInner {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(PoolState {
                    config: None,
                    generation: 0,
                    active: false,
                    idle: Vec::new(),
                    outstanding: 0,
                    allocated: 0,
                }),
                available: Condvar::new(),
                acquisitions: AtomicU64::new(0),
                waits: AtomicU64::new(0),
                allocations: AtomicU64::new(0),
            }),
        }
    }

    /// Pool identifier, for logging.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Install a new configuration.
    ///
    /// Fails without side effects if the configuration is invalid, or if the
    /// pool is active and buffers are still issued.
    pub fn set_config(&self, config: PoolConfig) -> Result<()> {
        config.validate()?;
        let mut state = self.inner.state.lock();
        if state.active && state.outstanding > 0 {
            return Err(Error::Config(format!(
                "cannot reconfigure active pool with {} buffers outstanding",
                state.outstanding
            )));
        }
        debug!(pool = self.inner.id, config = ?config, "pool configured");
        state.generation += 1;
        state.config = Some(config);
        // Buffers issued under the old generation no longer count.
        let stale = std::mem::take(&mut state.idle);
        state.outstanding = 0;
        state.allocated = 0;
        drop(state);
        drop(stale);
        Ok(())
    }

    /// Current configuration, if any.
    pub fn config(&self) -> Option<PoolConfig> {
        self.inner.state.lock().config.clone()
    }

    /// Caps the pool allocates for, if configured.
    pub fn caps(&self) -> Option<VideoCaps> {
        self.inner.state.lock().config.as_ref().map(|c| c.caps.clone())
    }

    /// True after a successful [`activate`](Self::activate).
    pub fn is_active(&self) -> bool {
        self.inner.state.lock().active
    }

    /// Start handing out buffers, preallocating `min_buffers`.
    ///
    /// If any preallocation fails, the buffers allocated so far are released
    /// and the pool stays inactive.
    pub fn activate(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.active {
            return Ok(());
        }
        let config = state.config.clone().ok_or(Error::PoolInactive)?;

        let mut fresh = Vec::with_capacity(config.min_buffers);
        let missing = config.min_buffers.saturating_sub(state.allocated);
        for _ in 0..missing {
            // On error `fresh` drops here, destroying the partial set.
            fresh.push(config.allocator.alloc()?);
            self.inner.allocations.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(POOL_ALLOCATIONS).increment(1);
        }
        state.allocated += fresh.len();
        state.idle.extend(fresh);
        state.active = true;
        info!(
            pool = self.inner.id,
            caps = %config.caps,
            min = config.min_buffers,
            max = config.max_buffers,
            "pool activated"
        );
        Ok(())
    }

    /// Stop handing out buffers and free the idle set.
    ///
    /// Issued buffers are destroyed when they come back.
    pub fn deactivate(&self) {
        let mut state = self.inner.state.lock();
        if !state.active {
            return;
        }
        state.active = false;
        let idle = std::mem::take(&mut state.idle);
        state.allocated -= idle.len();
        drop(state);
        drop(idle);
        self.inner.available.notify_all();
        debug!(pool = self.inner.id, "pool deactivated");
    }

    /// Acquire a buffer, blocking while the pool is at capacity.
    pub fn acquire(&self) -> Result<PooledHardwareBuffer> {
        let mut state = self.inner.state.lock();
        let mut waited = false;
        loop {
            match self.take(&mut state)? {
                Take::Ready(buffer) => return Ok(buffer),
                Take::Exhausted { .. } => {
                    if !waited {
                        self.inner.waits.fetch_add(1, Ordering::Relaxed);
                        waited = true;
                    }
                    self.inner.available.wait(&mut state);
                }
            }
        }
    }

    /// Acquire a buffer without blocking.
    ///
    /// Returns [`Error::PoolExhausted`] when the pool is at capacity.
    pub fn try_acquire(&self) -> Result<PooledHardwareBuffer> {
        let mut state = self.inner.state.lock();
        match self.take(&mut state)? {
            Take::Ready(buffer) => Ok(buffer),
            Take::Exhausted { in_use, max } => Err(Error::PoolExhausted { in_use, max }),
        }
    }

    /// Acquire a buffer, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when the timeout expires first.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<Option<PooledHardwareBuffer>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        let mut waited = false;
        loop {
            match self.take(&mut state)? {
                Take::Ready(buffer) => return Ok(Some(buffer)),
                Take::Exhausted { .. } => {
                    if !waited {
                        self.inner.waits.fetch_add(1, Ordering::Relaxed);
                        waited = true;
                    }
                    if self
                        .inner
                        .available
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        return match self.take(&mut state)? {
                            Take::Ready(buffer) => Ok(Some(buffer)),
                            Take::Exhausted { .. } => Ok(None),
                        };
                    }
                }
            }
        }
    }

    fn take(&self, state: &mut PoolState) -> Result<Take> {
        if !state.active {
            return Err(Error::PoolInactive);
        }
        let config = state.config.as_ref().ok_or(Error::PoolInactive)?;

        let buffer = match state.idle.pop() {
            Some(buffer) => buffer,
            None if state.allocated < config.max_buffers => {
                let buffer = config.allocator.alloc()?;
                state.allocated += 1;
                self.inner.allocations.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(POOL_ALLOCATIONS).increment(1);
                buffer
            }
            None => {
                return Ok(Take::Exhausted {
                    in_use: state.outstanding,
                    max: config.max_buffers,
                });
            }
        };

        state.outstanding += 1;
        self.inner.acquisitions.fetch_add(1, Ordering::Relaxed);
        metrics::gauge!(POOL_BUFFERS_IN_USE).set(state.outstanding as f64);
        Ok(Take::Ready(PooledHardwareBuffer {
            buffer: Some(buffer),
            generation: state.generation,
            pool: Arc::clone(&self.inner),
        }))
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            capacity: state.config.as_ref().map_or(0, |c| c.max_buffers),
            allocated: state.allocated,
            idle: state.idle.len(),
            in_use: state.outstanding,
            acquisitions: self.inner.acquisitions.load(Ordering::Relaxed),
            waits: self.inner.waits.load(Ordering::Relaxed),
            allocations: self.inner.allocations.load(Ordering::Relaxed),
        }
    }
}

impl Default for HardwarePool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HardwarePool {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl fmt::Debug for HardwarePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwarePool")
            .field("id", &self.inner.id)
            .field("stats", &self.stats())
            .finish()
    }
}

// ============================================================================
// PooledHardwareBuffer
// ============================================================================

/// A buffer borrowed from a [`HardwarePool`].
///
/// Dropping it releases the buffer: back to the idle set if the pool is
/// still active under the same configuration, destroyed otherwise. Use
/// [`detach`](Self::detach) to take the buffer out of the pool for good.
pub struct PooledHardwareBuffer {
    buffer: Option<HardwareBuffer>,
    generation: u64,
    pool: Arc<PoolInner>,
}

impl PooledHardwareBuffer {
    /// Identifier of the pool the buffer came from.
    pub fn pool_id(&self) -> u64 {
        self.pool.id
    }

    /// Mutable access to the underlying buffer.
    pub fn buffer_mut(&mut self) -> Option<&mut HardwareBuffer> {
        self.buffer.as_mut()
    }

    /// Remove the buffer from the pool's accounting and return it.
    pub fn detach(mut self) -> Option<HardwareBuffer> {
        let buffer = self.buffer.take()?;
        let mut state = self.pool.state.lock();
        if state.generation == self.generation {
            state.outstanding -= 1;
            state.allocated -= 1;
        }
        drop(state);
        self.pool.available.notify_one();
        Some(buffer)
    }
}

impl Deref for PooledHardwareBuffer {
    type Target = HardwareBuffer;

    fn deref(&self) -> &HardwareBuffer {
        // Only `detach` and `drop` empty the slot, and both consume `self`.
        match &self.buffer {
            Some(buffer) => buffer,
            None => unreachable!("pooled buffer accessed after release"),
        }
    }
}

impl Drop for PooledHardwareBuffer {
    fn drop(&mut self) {
        let Some(buffer) = self.buffer.take() else {
            return;
        };
        let mut state = self.pool.state.lock();
        if state.generation != self.generation {
            drop(state);
            drop(buffer);
            return;
        }
        state.outstanding -= 1;
        metrics::gauge!(POOL_BUFFERS_IN_USE).set(state.outstanding as f64);
        let stale = if state.active {
            state.idle.push(buffer);
            None
        } else {
            state.allocated -= 1;
            Some(buffer)
        };
        drop(state);
        drop(stale);
        self.pool.available.notify_one();
    }
}

impl fmt::Debug for PooledHardwareBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledHardwareBuffer")
            .field("pool", &self.pool.id)
            .field("generation", &self.generation)
            .field("buffer", &self.buffer)
            .finish()
    }
}
