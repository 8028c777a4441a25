//! Hardware memory for output frames.
//!
//! # Architecture
//!
//! - [`HardwareDevice`]: the device that owns surfaces ([`HostDevice`] keeps
//!   them in host memory)
//! - [`HardwareAllocator`]: creates [`HardwareBuffer`]s of one format and size
//! - [`HardwarePool`]: recycles buffers, with backpressure at capacity
//! - [`with_mapped_access`]: scoped CPU access with cache syncs
//!
//! # Example
//!
//! ```rust
//! use parallax_stabilize::format::{PixelLayout, lookup};
//! use parallax_stabilize::memory::{AccessMode, HardwareAllocator, HostDevice, with_mapped_access};
//! use std::sync::Arc;
//!
//! let device = Arc::new(HostDevice::new());
//! let allocator = Arc::new(HardwareAllocator::new(
//!     device.clone(),
//!     lookup(PixelLayout::Gray8).unwrap(),
//!     16,
//!     16,
//!     false,
//! ));
//! let buffer = allocator.alloc().unwrap();
//!
//! with_mapped_access(&buffer, AccessMode::Write, |planes| planes.write(0, |bytes| bytes.fill(0xff)))
//!     .unwrap();
//! assert_eq!(device.stats().device_syncs, 1);
//! ```

mod allocator;
mod buffer_pool;
mod device;
mod mapped;

pub use allocator::{AllocationParams, Allocator, HardwareAllocator, HardwareBuffer, SystemAllocator};
pub use buffer_pool::{HardwarePool, PoolConfig, PoolStats, PooledHardwareBuffer};
pub use device::{
    DeviceStats, FailurePoint, HardwareDevice, HostDevice, SessionId, SurfaceHandle,
    SurfaceLayout, SurfaceParams, SurfacePlane, SurfaceRequest,
};
pub use mapped::{AccessMode, MappedPlanes, with_mapped_access};
