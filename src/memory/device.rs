//! Hardware surface device abstraction.
//!
//! A [`HardwareDevice`] owns device-resident surfaces addressed by opaque
//! [`SurfaceHandle`]s. The stabilizer never touches device memory directly:
//! it creates surfaces, queries their plane layout, and reads or writes one
//! plane at a time between explicit cache syncs.
//!
//! [`HostDevice`] keeps surfaces in ordinary heap memory. It is the device
//! used in tests and on machines without the accelerator, and it supports
//! one-shot failure injection so error paths can be exercised.

use crate::error::{Error, Result};
use crate::format::{HardwareColorFormat, PixelFormatDescriptor};
use crate::converters::plane_layout;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle to a device surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(NonZeroU64);

impl SurfaceHandle {
    /// Raw handle value, for logging.
    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Opaque handle to a transform session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

/// Memory layout of a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SurfaceLayout {
    /// Linear rows separated by a pitch.
    #[default]
    Pitch,
    /// Tiled layout used by the hardware blocks.
    BlockLinear,
}

/// Parameters for creating a surface.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceRequest {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: &'static PixelFormatDescriptor,
    /// Memory layout.
    pub layout: SurfaceLayout,
}

impl SurfaceRequest {
    /// Hardware color format for this request.
    pub fn color_format(&self) -> HardwareColorFormat {
        self.format.hardware
    }
}

/// Layout of one plane inside a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfacePlane {
    /// Plane width in samples.
    pub width: u32,
    /// Plane height in rows.
    pub height: u32,
    /// Bytes between the start of consecutive rows.
    pub pitch: usize,
    /// Byte offset of the plane in the surface.
    pub offset: usize,
    /// Bytes per sample.
    pub bytes_per_sample: u32,
}

impl SurfacePlane {
    /// Bytes of payload in one row.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_sample as usize
    }

    /// Plane size including pitch padding.
    #[inline]
    pub fn size(&self) -> usize {
        self.pitch * self.height as usize
    }
}

/// Parameters reported for an allocated surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceParams {
    /// Per-plane layout, in memory order.
    pub planes: SmallVec<[SurfacePlane; 3]>,
    /// Total surface size in bytes.
    pub total_size: usize,
    /// Memory layout.
    pub layout: SurfaceLayout,
}

/// A device that owns hardware-resident frame surfaces.
///
/// Plane callbacks run while the device holds the plane; they must not call
/// back into the device.
pub trait HardwareDevice: Send + Sync + fmt::Debug {
    /// Device name, for logging.
    fn name(&self) -> &str;

    /// Create a surface.
    fn create_surface(&self, request: &SurfaceRequest) -> Result<SurfaceHandle>;

    /// Query the plane layout of a surface.
    fn surface_params(&self, handle: SurfaceHandle) -> Result<SurfaceParams>;

    /// Destroy a surface. The handle is invalid afterwards.
    fn destroy_surface(&self, handle: SurfaceHandle) -> Result<()>;

    /// Make device writes to `plane` visible to the CPU.
    fn sync_for_cpu(&self, handle: SurfaceHandle, plane: usize) -> Result<()>;

    /// Make CPU writes to `plane` visible to the device.
    fn sync_for_device(&self, handle: SurfaceHandle, plane: usize) -> Result<()>;

    /// Read access to the bytes of one plane, pitch padding included.
    fn with_plane(
        &self,
        handle: SurfaceHandle,
        plane: usize,
        f: &mut dyn FnMut(&[u8]),
    ) -> Result<()>;

    /// Write access to the bytes of one plane, pitch padding included.
    fn with_plane_mut(
        &self,
        handle: SurfaceHandle,
        plane: usize,
        f: &mut dyn FnMut(&mut [u8]),
    ) -> Result<()>;

    /// Open a transform session.
    fn open_session(&self) -> Result<SessionId>;

    /// Close a transform session.
    fn close_session(&self, session: SessionId) -> Result<()>;
}

/// Device operations that can be made to fail once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePoint {
    /// Next `create_surface`.
    CreateSurface,
    /// Next `surface_params`.
    SurfaceParams,
    /// Next `destroy_surface`.
    DestroySurface,
    /// Next `sync_for_cpu`.
    SyncForCpu,
    /// Next `sync_for_device`.
    SyncForDevice,
    /// Next plane access to the given plane index.
    MapPlane(usize),
    /// Next `open_session`.
    OpenSession,
}

/// Counters reported by [`HostDevice::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Surfaces created.
    pub created: u64,
    /// Surfaces destroyed.
    pub destroyed: u64,
    /// Surfaces currently alive.
    pub live: usize,
    /// `sync_for_cpu` calls.
    pub cpu_syncs: u64,
    /// `sync_for_device` calls.
    pub device_syncs: u64,
    /// Sessions currently open.
    pub sessions_open: usize,
}

struct HostSurface {
    params: SurfaceParams,
    data: Vec<u8>,
}

#[derive(Default)]
struct HostState {
    surfaces: HashMap<u64, HostSurface>,
    sessions: Vec<u64>,
    failures: Vec<FailurePoint>,
}

impl HostState {
    fn take_failure(&mut self, point: FailurePoint) -> bool {
        match self.failures.iter().position(|p| *p == point) {
            Some(i) => {
                self.failures.remove(i);
                true
            }
            None => false,
        }
    }
}

/// In-memory [`HardwareDevice`].
///
/// Rows are padded to `pitch_align` bytes. Block-linear surfaces are stored
/// with the same pitched layout; only the reported layout differs.
pub struct HostDevice {
    name: String,
    pitch_align: usize,
    state: Mutex<HostState>,
    next_id: AtomicU64,
    created: AtomicU64,
    destroyed: AtomicU64,
    cpu_syncs: AtomicU64,
    device_syncs: AtomicU64,
}

impl HostDevice {
    /// Default row pitch alignment in bytes.
    pub const DEFAULT_PITCH_ALIGN: usize = 64;

    /// Create a device with the default pitch alignment.
    pub fn new() -> Self {
        Self::with_pitch_align(Self::DEFAULT_PITCH_ALIGN)
    }

    /// Create a device whose rows are padded to `align` bytes.
    pub fn with_pitch_align(align: usize) -> Self {
        Self {
            name: format!("host-device(align={align})"),
            pitch_align: align.max(1),
            state: Mutex::new(HostState::default()),
            next_id: AtomicU64::new(1),
            created: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
            cpu_syncs: AtomicU64::new(0),
            device_syncs: AtomicU64::new(0),
        }
    }

    /// Make the next call at `point` fail.
    pub fn inject_failure(&self, point: FailurePoint) {
        self.state.lock().failures.push(point);
    }

    /// Current counters.
    pub fn stats(&self) -> DeviceStats {
        let state = self.state.lock();
        DeviceStats {
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            live: state.surfaces.len(),
            cpu_syncs: self.cpu_syncs.load(Ordering::Relaxed),
            device_syncs: self.device_syncs.load(Ordering::Relaxed),
            sessions_open: state.sessions.len(),
        }
    }

    fn layout_for(&self, request: &SurfaceRequest) -> SurfaceParams {
        let mut offset = 0;
        let planes = plane_layout(request.format, request.width, request.height)
            .into_iter()
            .map(|p| {
                let pitch = p.row_bytes.next_multiple_of(self.pitch_align);
                let plane = SurfacePlane {
                    width: p.width,
                    height: p.height,
                    pitch,
                    offset,
                    bytes_per_sample: p.bytes_per_sample,
                };
                offset += plane.size();
                plane
            })
            .collect();
        SurfaceParams {
            planes,
            total_size: offset,
            layout: request.layout,
        }
    }

    fn plane_range(
        state: &mut HostState,
        handle: SurfaceHandle,
        plane: usize,
        op: &'static str,
    ) -> Result<std::ops::Range<usize>> {
        if state.take_failure(FailurePoint::MapPlane(plane)) {
            return Err(Error::device(op, format!("injected failure on plane {plane}")));
        }
        let surface = state
            .surfaces
            .get(&handle.raw())
            .ok_or_else(|| Error::device(op, format!("unknown {handle}")))?;
        let p = surface
            .params
            .planes
            .get(plane)
            .ok_or_else(|| Error::device(op, format!("{handle} has no plane {plane}")))?;
        Ok(p.offset..p.offset + p.size())
    }

    fn sync(&self, handle: SurfaceHandle, plane: usize, point: FailurePoint) -> Result<()> {
        let op = match point {
            FailurePoint::SyncForCpu => "sync_for_cpu",
            _ => "sync_for_device",
        };
        let mut state = self.state.lock();
        if state.take_failure(point) {
            return Err(Error::device(op, "injected failure"));
        }
        let surface = state
            .surfaces
            .get(&handle.raw())
            .ok_or_else(|| Error::device(op, format!("unknown {handle}")))?;
        if plane >= surface.params.planes.len() {
            return Err(Error::device(op, format!("{handle} has no plane {plane}")));
        }
        let counter = match point {
            FailurePoint::SyncForCpu => &self.cpu_syncs,
            _ => &self.device_syncs,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostDevice")
            .field("pitch_align", &self.pitch_align)
            .field("stats", &self.stats())
            .finish()
    }
}

impl HardwareDevice for HostDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_surface(&self, request: &SurfaceRequest) -> Result<SurfaceHandle> {
        if request.width == 0 || request.height == 0 {
            return Err(Error::device("create_surface", "zero-sized surface"));
        }
        let params = self.layout_for(request);
        let mut state = self.state.lock();
        if state.take_failure(FailurePoint::CreateSurface) {
            return Err(Error::device("create_surface", "injected failure"));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = NonZeroU64::new(id)
            .map(SurfaceHandle)
            .ok_or_else(|| Error::device("create_surface", "handle space exhausted"))?;
        let data = vec![0u8; params.total_size];
        state.surfaces.insert(id, HostSurface { params, data });
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    fn surface_params(&self, handle: SurfaceHandle) -> Result<SurfaceParams> {
        let mut state = self.state.lock();
        if state.take_failure(FailurePoint::SurfaceParams) {
            return Err(Error::device("surface_params", "injected failure"));
        }
        state
            .surfaces
            .get(&handle.raw())
            .map(|s| s.params.clone())
            .ok_or_else(|| Error::device("surface_params", format!("unknown {handle}")))
    }

    fn destroy_surface(&self, handle: SurfaceHandle) -> Result<()> {
        let mut state = self.state.lock();
        if state.take_failure(FailurePoint::DestroySurface) {
            return Err(Error::device("destroy_surface", "injected failure"));
        }
        state
            .surfaces
            .remove(&handle.raw())
            .ok_or_else(|| Error::device("destroy_surface", format!("unknown {handle}")))?;
        self.destroyed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn sync_for_cpu(&self, handle: SurfaceHandle, plane: usize) -> Result<()> {
        self.sync(handle, plane, FailurePoint::SyncForCpu)
    }

    fn sync_for_device(&self, handle: SurfaceHandle, plane: usize) -> Result<()> {
        self.sync(handle, plane, FailurePoint::SyncForDevice)
    }

    fn with_plane(
        &self,
        handle: SurfaceHandle,
        plane: usize,
        f: &mut dyn FnMut(&[u8]),
    ) -> Result<()> {
        let mut state = self.state.lock();
        let range = Self::plane_range(&mut state, handle, plane, "map_plane")?;
        if let Some(surface) = state.surfaces.get(&handle.raw()) {
            f(&surface.data[range]);
        }
        Ok(())
    }

    fn with_plane_mut(
        &self,
        handle: SurfaceHandle,
        plane: usize,
        f: &mut dyn FnMut(&mut [u8]),
    ) -> Result<()> {
        let mut state = self.state.lock();
        let range = Self::plane_range(&mut state, handle, plane, "map_plane")?;
        if let Some(surface) = state.surfaces.get_mut(&handle.raw()) {
            f(&mut surface.data[range]);
        }
        Ok(())
    }

    fn open_session(&self) -> Result<SessionId> {
        let mut state = self.state.lock();
        if state.take_failure(FailurePoint::OpenSession) {
            return Err(Error::device("open_session", "injected failure"));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        state.sessions.push(id);
        Ok(SessionId(id))
    }

    fn close_session(&self, session: SessionId) -> Result<()> {
        let mut state = self.state.lock();
        match state.sessions.iter().position(|s| *s == session.0) {
            Some(i) => {
                state.sessions.remove(i);
                Ok(())
            }
            None => Err(Error::device("close_session", "unknown session")),
        }
    }
}
