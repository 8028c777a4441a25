//! Scoped CPU access to hardware buffers.
//!
//! [`with_mapped_access`] brackets a closure with the cache syncs a device
//! surface needs: CPU syncs before reading, device syncs after writing. The
//! syncs run once per plane per scope, whether the closure succeeds, fails,
//! or unwinds.
//!
//! There is no real unmap. Plane slices only live inside the callbacks of
//! [`MappedPlanes::read`] and [`MappedPlanes::write`], so nothing can hold
//! on to them after the scope ends, but the device is never told that the
//! mapping is gone.

use super::allocator::HardwareBuffer;
use super::device::SurfacePlane;
use crate::error::{Error, Result};
use tracing::error;

/// How a mapping scope uses the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    /// Read only: sync for CPU before.
    Read,
    /// Write only: sync for device after.
    Write,
    /// Both syncs.
    ReadWrite,
}

impl AccessMode {
    fn reads(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    fn writes(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Plane access inside a [`with_mapped_access`] scope.
pub struct MappedPlanes<'a> {
    buffer: &'a HardwareBuffer,
    mode: AccessMode,
}

impl MappedPlanes<'_> {
    /// Plane layout of the mapped surface.
    pub fn planes(&self) -> &[SurfacePlane] {
        &self.buffer.params().planes
    }

    /// Run `f` over the bytes of plane `index`.
    pub fn read<R>(&self, index: usize, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let mut f = Some(f);
        let mut out = None;
        self.buffer
            .device()
            .with_plane(self.buffer.handle(), index, &mut |bytes| {
                if let Some(f) = f.take() {
                    out = Some(f(bytes));
                }
            })
            .map_err(|e| Error::plane(index, e.to_string()))?;
        out.ok_or_else(|| Error::plane(index, "plane callback not invoked"))
    }

    /// Run `f` over the mutable bytes of plane `index`.
    ///
    /// # Panics
    ///
    /// Panics if the scope was opened with [`AccessMode::Read`].
    pub fn write<R>(&self, index: usize, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        assert!(self.mode.writes(), "write access in a read-only mapping");
        let mut f = Some(f);
        let mut out = None;
        self.buffer
            .device()
            .with_plane_mut(self.buffer.handle(), index, &mut |bytes| {
                if let Some(f) = f.take() {
                    out = Some(f(bytes));
                }
            })
            .map_err(|e| Error::plane(index, e.to_string()))?;
        out.ok_or_else(|| Error::plane(index, "plane callback not invoked"))
    }
}

/// Syncs written planes back to the device exactly once.
struct DeviceSync<'a> {
    buffer: &'a HardwareBuffer,
    armed: bool,
}

impl DeviceSync<'_> {
    fn run(&mut self) -> Result<()> {
        if !self.armed {
            return Ok(());
        }
        self.armed = false;
        let device = self.buffer.device();
        let mut first_err = None;
        for plane in 0..self.buffer.params().planes.len() {
            if let Err(e) = device.sync_for_device(self.buffer.handle(), plane) {
                error!(handle = %self.buffer.handle(), plane, error = %e, "sync for device failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for DeviceSync<'_> {
    fn drop(&mut self) {
        let _ = self.run();
    }
}

/// Map `buffer` for CPU access for the duration of `f`.
///
/// For [`AccessMode::Read`] and [`AccessMode::ReadWrite`] every plane is
/// synced for the CPU first; a failure there aborts before `f` runs. For
/// [`AccessMode::Write`] and [`AccessMode::ReadWrite`] every plane is synced
/// for the device afterwards, also when `f` fails. An error from `f` takes
/// precedence over a sync error.
pub fn with_mapped_access<R>(
    buffer: &HardwareBuffer,
    mode: AccessMode,
    f: impl FnOnce(&MappedPlanes<'_>) -> Result<R>,
) -> Result<R> {
    if mode.reads() {
        let device = buffer.device();
        for plane in 0..buffer.params().planes.len() {
            device.sync_for_cpu(buffer.handle(), plane).map_err(|e| {
                error!(handle = %buffer.handle(), plane, error = %e, "sync for cpu failed");
                e
            })?;
        }
    }

    let mut sync = DeviceSync {
        buffer,
        armed: mode.writes(),
    };
    let result = f(&MappedPlanes { buffer, mode });
    let synced = sync.run();
    let value = result?;
    synced?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{PixelLayout, lookup};
    use crate::memory::{FailurePoint, HardwareAllocator, HostDevice};
    use std::sync::Arc;

    fn setup() -> (Arc<HostDevice>, HardwareBuffer) {
        let device = Arc::new(HostDevice::new());
        let alloc = Arc::new(HardwareAllocator::new(
            device.clone(),
            lookup(PixelLayout::I420).unwrap(),
            32,
            32,
            false,
        ));
        let buf = alloc.alloc().unwrap();
        (device, buf)
    }

    #[test]
    fn test_read_syncs_for_cpu_only() {
        let (device, buf) = setup();
        let first = with_mapped_access(&buf, AccessMode::Read, |m| m.read(0, |b| b[0])).unwrap();
        assert_eq!(first, 0);
        let stats = device.stats();
        assert_eq!(stats.cpu_syncs, 3);
        assert_eq!(stats.device_syncs, 0);
    }

    #[test]
    fn test_write_syncs_for_device_once() {
        let (device, buf) = setup();
        with_mapped_access(&buf, AccessMode::Write, |m| m.write(1, |b| b[0] = 9)).unwrap();
        let stats = device.stats();
        assert_eq!(stats.cpu_syncs, 0);
        assert_eq!(stats.device_syncs, 3);
        let seen = with_mapped_access(&buf, AccessMode::Read, |m| m.read(1, |b| b[0])).unwrap();
        assert_eq!(seen, 9);
    }

    #[test]
    fn test_syncs_once_on_error() {
        let (device, buf) = setup();
        device.inject_failure(FailurePoint::MapPlane(1));
        let err = with_mapped_access(&buf, AccessMode::ReadWrite, |m| {
            m.write(0, |b| b[0] = 1)?;
            m.write(1, |b| b[0] = 1)?;
            m.write(2, |b| b[0] = 1)
        })
        .unwrap_err();
        assert!(matches!(err, Error::PlaneCopy { plane: 1, .. }));
        let stats = device.stats();
        assert_eq!(stats.cpu_syncs, 3);
        assert_eq!(stats.device_syncs, 3);
    }

    #[test]
    fn test_cpu_sync_failure_skips_closure() {
        let (device, buf) = setup();
        device.inject_failure(FailurePoint::SyncForCpu);
        let mut ran = false;
        let result = with_mapped_access(&buf, AccessMode::ReadWrite, |_| {
            ran = true;
            Ok(())
        });
        assert!(result.is_err());
        assert!(!ran);
        assert_eq!(device.stats().device_syncs, 0);
    }

    #[test]
    fn test_device_sync_failure_is_reported() {
        let (device, buf) = setup();
        device.inject_failure(FailurePoint::SyncForDevice);
        let result = with_mapped_access(&buf, AccessMode::Write, |_| Ok(()));
        assert!(matches!(result, Err(Error::Device { .. })));
        assert_eq!(device.stats().device_syncs, 2);
    }

    #[test]
    #[should_panic(expected = "write access in a read-only mapping")]
    fn test_write_in_read_scope_panics() {
        let (_device, buf) = setup();
        let _ = with_mapped_access(&buf, AccessMode::Read, |m| m.write(0, |_| ()));
    }
}
