//! Allocators for output buffers.
//!
//! [`HardwareAllocator`] produces [`HardwareBuffer`]s: device surfaces of one
//! fixed format and size. [`SystemAllocator`] hands out zeroed host memory.
//! Both implement [`Allocator`] so an allocation query can carry either, but
//! only the host allocator serves the byte-oriented entry point.

use super::device::{HardwareDevice, SurfaceHandle, SurfaceLayout, SurfaceParams, SurfaceRequest};
use crate::error::{Error, Result};
use crate::format::{PixelFormatDescriptor, PixelLayout};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Alignment and padding requested for an allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationParams {
    /// Alignment mask plus one, in bytes.
    pub align: usize,
    /// Bytes reserved before the payload.
    pub prefix: usize,
    /// Bytes reserved after the payload.
    pub padding: usize,
}

impl Default for AllocationParams {
    fn default() -> Self {
        Self {
            align: 8,
            prefix: 0,
            padding: 0,
        }
    }
}

/// A source of buffer memory.
pub trait Allocator: Send + Sync + fmt::Debug {
    /// Allocator name, as shown in allocation queries.
    fn name(&self) -> &str;

    /// Allocate `size` bytes of host-addressable memory.
    fn alloc_bytes(&self, size: usize, params: &AllocationParams) -> Result<Vec<u8>>;
}

/// Plain host memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn name(&self) -> &str {
        "SystemMemory"
    }

    fn alloc_bytes(&self, size: usize, params: &AllocationParams) -> Result<Vec<u8>> {
        Ok(vec![0u8; params.prefix + size + params.padding])
    }
}

/// Allocates device surfaces of one format and size.
pub struct HardwareAllocator {
    device: Arc<dyn HardwareDevice>,
    format: &'static PixelFormatDescriptor,
    width: u32,
    height: u32,
    layout: SurfaceLayout,
}

impl HardwareAllocator {
    /// Allocator name, as shown in allocation queries.
    pub const NAME: &'static str = "HardwareSurfaceMemory";

    /// Create an allocator for `width`×`height` surfaces of `format`.
    ///
    /// With `block_linear` set, NV12 surfaces use the block-linear layout;
    /// every other format stays pitch-linear.
    pub fn new(
        device: Arc<dyn HardwareDevice>,
        format: &'static PixelFormatDescriptor,
        width: u32,
        height: u32,
        block_linear: bool,
    ) -> Self {
        let layout = if block_linear && format.layout == PixelLayout::Nv12 {
            SurfaceLayout::BlockLinear
        } else {
            SurfaceLayout::Pitch
        };
        Self {
            device,
            format,
            width,
            height,
            layout,
        }
    }

    /// Device the surfaces live on.
    pub fn device(&self) -> &Arc<dyn HardwareDevice> {
        &self.device
    }

    /// Pixel format of every surface.
    pub fn format(&self) -> &'static PixelFormatDescriptor {
        self.format
    }

    /// Surface width and height.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Surface memory layout.
    pub fn layout(&self) -> SurfaceLayout {
        self.layout
    }

    /// Allocate one surface.
    ///
    /// If the surface is created but its parameters cannot be read, the
    /// surface is destroyed before the error is returned.
    pub fn alloc(self: &Arc<Self>) -> Result<HardwareBuffer> {
        let request = SurfaceRequest {
            width: self.width,
            height: self.height,
            format: self.format,
            layout: self.layout,
        };
        let handle = self.device.create_surface(&request).map_err(|e| {
            error!(
                device = self.device.name(),
                format = %self.format.layout,
                width = self.width,
                height = self.height,
                error = %e,
                "surface creation failed"
            );
            Error::AllocationFailed(e.to_string())
        })?;

        let params = match self.device.surface_params(handle) {
            Ok(params) => params,
            Err(e) => {
                error!(%handle, error = %e, "surface parameter query failed, destroying surface");
                if let Err(destroy) = self.device.destroy_surface(handle) {
                    error!(%handle, error = %destroy, "failed to destroy surface");
                }
                return Err(Error::AllocationFailed(e.to_string()));
            }
        };

        debug!(%handle, size = params.total_size, layout = ?params.layout, "allocated surface");
        Ok(HardwareBuffer {
            handle,
            params,
            allocator: Arc::clone(self),
        })
    }

    /// Release a buffer. Failures are logged, never returned.
    pub fn free(&self, buffer: HardwareBuffer) {
        drop(buffer);
    }
}

impl fmt::Debug for HardwareAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareAllocator")
            .field("device", &self.device.name())
            .field("format", &self.format.layout)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .finish()
    }
}

impl Allocator for HardwareAllocator {
    fn name(&self) -> &str {
        Self::NAME
    }

    /// Device surfaces have no byte-addressable form; asking for one is a
    /// programming error.
    fn alloc_bytes(&self, size: usize, _params: &AllocationParams) -> Result<Vec<u8>> {
        panic!(
            "{} cannot serve generic allocations ({size} bytes requested); use HardwareAllocator::alloc",
            Self::NAME
        );
    }
}

/// A device surface owned by the host side.
///
/// Dropping the buffer destroys the surface.
pub struct HardwareBuffer {
    handle: SurfaceHandle,
    params: SurfaceParams,
    allocator: Arc<HardwareAllocator>,
}

impl HardwareBuffer {
    /// Surface handle.
    #[inline]
    pub fn handle(&self) -> SurfaceHandle {
        self.handle
    }

    /// Surface parameters reported at allocation.
    #[inline]
    pub fn params(&self) -> &SurfaceParams {
        &self.params
    }

    /// Device that owns the surface.
    #[inline]
    pub fn device(&self) -> &Arc<dyn HardwareDevice> {
        &self.allocator.device
    }

    /// Allocator the buffer came from.
    #[inline]
    pub fn allocator(&self) -> &Arc<HardwareAllocator> {
        &self.allocator
    }

    /// Pixel format.
    #[inline]
    pub fn format(&self) -> &'static PixelFormatDescriptor {
        self.allocator.format
    }

    /// Surface width and height.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.allocator.dimensions()
    }
}

impl Drop for HardwareBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.allocator.device.destroy_surface(self.handle) {
            error!(handle = %self.handle, error = %e, "failed to destroy surface");
        }
    }
}

impl fmt::Debug for HardwareBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareBuffer")
            .field("handle", &self.handle)
            .field("format", &self.allocator.format.layout)
            .field("size", &self.params.total_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::device::{FailurePoint, HostDevice};
    use crate::format::lookup;

    fn allocator(device: &Arc<HostDevice>, layout: PixelLayout, block_linear: bool) -> Arc<HardwareAllocator> {
        Arc::new(HardwareAllocator::new(
            device.clone(),
            lookup(layout).unwrap(),
            64,
            32,
            block_linear,
        ))
    }

    #[test]
    fn test_alloc_and_drop() {
        let device = Arc::new(HostDevice::new());
        let alloc = allocator(&device, PixelLayout::Nv12, false);
        let buf = alloc.alloc().unwrap();
        assert_eq!(buf.params().planes.len(), 2);
        assert_eq!(buf.dimensions(), (64, 32));
        assert_eq!(device.stats().live, 1);
        alloc.free(buf);
        assert_eq!(device.stats().live, 0);
    }

    #[test]
    fn test_block_linear_only_for_nv12() {
        let device = Arc::new(HostDevice::new());
        assert_eq!(
            allocator(&device, PixelLayout::Nv12, true).layout(),
            SurfaceLayout::BlockLinear
        );
        assert_eq!(
            allocator(&device, PixelLayout::I420, true).layout(),
            SurfaceLayout::Pitch
        );
        assert_eq!(
            allocator(&device, PixelLayout::Nv12, false).layout(),
            SurfaceLayout::Pitch
        );
    }

    #[test]
    fn test_params_failure_destroys_surface() {
        let device = Arc::new(HostDevice::new());
        let alloc = allocator(&device, PixelLayout::I420, false);
        device.inject_failure(FailurePoint::SurfaceParams);
        let err = alloc.alloc().unwrap_err();
        assert!(matches!(err, Error::AllocationFailed(_)));
        let stats = device.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.live, 0);
    }

    #[test]
    fn test_create_failure() {
        let device = Arc::new(HostDevice::new());
        let alloc = allocator(&device, PixelLayout::I420, false);
        device.inject_failure(FailurePoint::CreateSurface);
        assert!(matches!(alloc.alloc(), Err(Error::AllocationFailed(_))));
        assert_eq!(device.stats().created, 0);
    }

    #[test]
    fn test_destroy_failure_is_logged_not_fatal() {
        let device = Arc::new(HostDevice::new());
        let alloc = allocator(&device, PixelLayout::Gray8, false);
        let buf = alloc.alloc().unwrap();
        device.inject_failure(FailurePoint::DestroySurface);
        drop(buf);
        assert_eq!(device.stats().live, 1);
    }

    #[test]
    #[should_panic(expected = "cannot serve generic allocations")]
    fn test_generic_alloc_panics() {
        let device = Arc::new(HostDevice::new());
        let alloc = allocator(&device, PixelLayout::Rgba, false);
        let _ = alloc.alloc_bytes(1024, &AllocationParams::default());
    }

    #[test]
    fn test_system_allocator() {
        let params = AllocationParams {
            align: 16,
            prefix: 4,
            padding: 4,
        };
        let bytes = SystemAllocator.alloc_bytes(100, &params).unwrap();
        assert_eq!(bytes.len(), 108);
        assert_eq!(SystemAllocator.name(), "SystemMemory");
    }
}
