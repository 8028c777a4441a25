//! Plane geometry and host/hardware plane copies.
//!
//! Host frames are tightly packed: planes follow each other with rows of
//! exactly `row_bytes`. Hardware surfaces pad each row to a device pitch.
//! The copies here walk the descriptor's plane table and move one row at a
//! time between the two layouts.

use crate::error::{Error, Result};
use crate::format::PixelFormatDescriptor;
use crate::memory::{AccessMode, HardwareBuffer, SurfacePlane, with_mapped_access};
use smallvec::SmallVec;
use tracing::trace;

/// Neutral chroma value for 8-bit YUV.
pub const CHROMA_NEUTRAL: u8 = 0x80;

/// Geometry of one plane in a tightly packed host frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneGeometry {
    /// Plane width in samples.
    pub width: u32,
    /// Plane height in rows.
    pub height: u32,
    /// Bytes per sample.
    pub bytes_per_sample: u32,
    /// Bytes in one row.
    pub row_bytes: usize,
    /// Byte offset from the start of the frame.
    pub offset: usize,
}

impl PlaneGeometry {
    /// Plane size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.row_bytes * self.height as usize
    }

    /// Byte range of the plane inside the frame.
    #[inline]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.size()
    }
}

/// Plane layout of a `width`×`height` frame in host memory.
pub fn plane_layout(
    desc: &PixelFormatDescriptor,
    width: u32,
    height: u32,
) -> SmallVec<[PlaneGeometry; 3]> {
    let mut offset = 0;
    desc.planes
        .iter()
        .map(|spec| {
            let w = width.next_multiple_of(spec.x_round) / spec.x_sub;
            let h = height.next_multiple_of(spec.y_round) / spec.y_sub;
            let plane = PlaneGeometry {
                width: w,
                height: h,
                bytes_per_sample: spec.bytes_per_sample,
                row_bytes: w as usize * spec.bytes_per_sample as usize,
                offset,
            };
            offset += plane.size();
            plane
        })
        .collect()
}

/// Bytes needed to hold a `width`×`height` frame in host memory.
pub fn unit_size(desc: &PixelFormatDescriptor, width: u32, height: u32) -> usize {
    plane_layout(desc, width, height)
        .iter()
        .map(PlaneGeometry::size)
        .sum()
}

/// Nominal frame size, `width * height * bpp / 8`.
///
/// Equals [`unit_size`] when the dimensions meet the descriptor's alignment.
pub fn frame_size(desc: &PixelFormatDescriptor, width: u32, height: u32) -> usize {
    width as usize * height as usize * desc.bits_per_pixel as usize / 8
}

fn check_planes(
    layout: &[PlaneGeometry],
    surface: &[SurfacePlane],
) -> Result<()> {
    if surface.len() != layout.len() {
        return Err(Error::plane(
            surface.len().min(layout.len()),
            format!(
                "surface has {} planes, format needs {}",
                surface.len(),
                layout.len()
            ),
        ));
    }
    for (i, (host, dev)) in layout.iter().zip(surface).enumerate() {
        if dev.pitch < host.row_bytes || dev.height < host.height {
            return Err(Error::plane(
                i,
                format!(
                    "surface plane {}x{} pitch {} cannot hold {} rows of {} bytes",
                    dev.width, dev.height, dev.pitch, host.height, host.row_bytes
                ),
            ));
        }
    }
    Ok(())
}

fn check_host_len(layout: &[PlaneGeometry], len: usize) -> Result<()> {
    for (i, plane) in layout.iter().enumerate() {
        if plane.range().end > len {
            return Err(Error::plane(
                i,
                format!("host frame of {len} bytes ends before plane end {}", plane.range().end),
            ));
        }
    }
    Ok(())
}

/// Copy a packed host frame into a hardware surface.
///
/// Every plane is validated before any byte moves, so a geometry mismatch
/// leaves the surface untouched.
pub fn upload(
    desc: &PixelFormatDescriptor,
    width: u32,
    height: u32,
    src: &[u8],
    dst: &mut HardwareBuffer,
) -> Result<()> {
    let layout = plane_layout(desc, width, height);
    check_host_len(&layout, src.len())?;
    check_planes(&layout, &dst.params().planes)?;

    with_mapped_access(dst, AccessMode::Write, |mapped| {
        for (i, (host, dev)) in layout.iter().zip(mapped.planes()).enumerate() {
            let rows = &src[host.range()];
            mapped.write(i, |bytes| {
                for (row, line) in rows.chunks_exact(host.row_bytes).enumerate() {
                    let start = row * dev.pitch;
                    bytes[start..start + host.row_bytes].copy_from_slice(line);
                }
            })?;
            trace!(plane = i, rows = host.height, pitch = dev.pitch, "uploaded plane");
        }
        Ok(())
    })
}

/// Copy a hardware surface into a packed host frame.
pub fn download(
    desc: &PixelFormatDescriptor,
    width: u32,
    height: u32,
    src: &HardwareBuffer,
    dst: &mut [u8],
) -> Result<()> {
    let layout = plane_layout(desc, width, height);
    check_host_len(&layout, dst.len())?;
    check_planes(&layout, &src.params().planes)?;

    with_mapped_access(src, AccessMode::Read, |mapped| {
        for (i, (host, dev)) in layout.iter().zip(mapped.planes()).enumerate() {
            let rows = &mut dst[host.range()];
            mapped.read(i, |bytes| {
                for (row, line) in rows.chunks_exact_mut(host.row_bytes).enumerate() {
                    let start = row * dev.pitch;
                    line.copy_from_slice(&bytes[start..start + host.row_bytes]);
                }
            })?;
            trace!(plane = i, rows = host.height, pitch = dev.pitch, "downloaded plane");
        }
        Ok(())
    })
}

/// Fill every chroma plane of a hardware surface with [`CHROMA_NEUTRAL`].
///
/// Plane 0 is left as is. Each plane is synced for the CPU before and for
/// the device after the fill.
pub fn clear_chroma(buffer: &mut HardwareBuffer) -> Result<()> {
    with_mapped_access(buffer, AccessMode::ReadWrite, |mapped| {
        for (i, dev) in mapped.planes().iter().enumerate().skip(1) {
            let len = dev.pitch * dev.height as usize;
            mapped.write(i, |bytes| bytes[..len].fill(CHROMA_NEUTRAL))?;
        }
        Ok(())
    })
}

/// Fill every chroma plane of a packed host frame with [`CHROMA_NEUTRAL`].
pub fn clear_chroma_host(
    desc: &PixelFormatDescriptor,
    width: u32,
    height: u32,
    frame: &mut [u8],
) -> Result<()> {
    let layout = plane_layout(desc, width, height);
    check_host_len(&layout, frame.len())?;
    for plane in layout.iter().skip(1) {
        frame[plane.range()].fill(CHROMA_NEUTRAL);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{PixelLayout, lookup, supported_formats};
    use crate::memory::{FailurePoint, HardwareAllocator, HostDevice};
    use std::sync::Arc;

    fn buffer(device: &Arc<HostDevice>, layout: PixelLayout, w: u32, h: u32) -> HardwareBuffer {
        let allocator = HardwareAllocator::new(device.clone(), lookup(layout).unwrap(), w, h, false);
        Arc::new(allocator).alloc().unwrap()
    }

    #[test]
    fn test_plane_layout_i420() {
        let planes = plane_layout(lookup(PixelLayout::I420).unwrap(), 64, 48);
        assert_eq!(planes.len(), 3);
        assert_eq!((planes[0].width, planes[0].height, planes[0].offset), (64, 48, 0));
        assert_eq!((planes[1].width, planes[1].height), (32, 24));
        assert_eq!(planes[1].offset, 64 * 48);
        assert_eq!(planes[2].offset, 64 * 48 + 32 * 24);
    }

    #[test]
    fn test_plane_layout_rounding() {
        let i420 = plane_layout(lookup(PixelLayout::I420).unwrap(), 17, 9);
        assert_eq!((i420[0].width, i420[0].height), (20, 10));
        assert_eq!((i420[1].width, i420[1].height), (12, 5));

        let nv12 = plane_layout(lookup(PixelLayout::Nv12).unwrap(), 17, 9);
        assert_eq!(nv12[1].row_bytes, 24);

        let yuy2 = plane_layout(lookup(PixelLayout::Yuy2).unwrap(), 17, 9);
        assert_eq!((yuy2[0].row_bytes, yuy2[0].height), (36, 9));
    }

    #[test]
    fn test_unit_size_matches_frame_size_when_aligned() {
        for desc in supported_formats() {
            let (ax, ay) = desc.alignment();
            for (w, h) in [(1920, 1080), (640, 360), (64, 64)] {
                let (w, h) = (w / ax * ax, h / ay * ay);
                assert_eq!(
                    unit_size(desc, w, h),
                    frame_size(desc, w, h),
                    "{} at {w}x{h}",
                    desc.layout
                );
            }
        }
    }

    #[test]
    fn test_clear_chroma_host_i420() {
        let desc = lookup(PixelLayout::I420).unwrap();
        let mut frame = vec![0x10u8; unit_size(desc, 64, 64)];
        clear_chroma_host(desc, 64, 64, &mut frame).unwrap();
        assert!(frame[..64 * 64].iter().all(|b| *b == 0x10));
        assert_eq!(frame.len() - 64 * 64, 2 * 32 * 32);
        assert!(frame[64 * 64..].iter().all(|b| *b == CHROMA_NEUTRAL));
    }

    #[test]
    fn test_clear_chroma_hardware_i420() {
        let device = Arc::new(HostDevice::new());
        let desc = lookup(PixelLayout::I420).unwrap();
        let mut buf = buffer(&device, PixelLayout::I420, 64, 64);
        let luma = vec![0x33u8; unit_size(desc, 64, 64)];
        upload(desc, 64, 64, &luma, &mut buf).unwrap();

        let before = device.stats();
        clear_chroma(&mut buf).unwrap();
        let after = device.stats();
        assert_eq!(after.cpu_syncs - before.cpu_syncs, 3);
        assert_eq!(after.device_syncs - before.device_syncs, 3);

        let mut out = vec![0u8; unit_size(desc, 64, 64)];
        download(desc, 64, 64, &buf, &mut out).unwrap();
        assert!(out[..64 * 64].iter().all(|b| *b == 0x33));
        let chroma = &out[64 * 64..];
        assert_eq!(chroma.len(), 2 * 32 * 32);
        assert!(chroma.iter().all(|b| *b == CHROMA_NEUTRAL));
    }

    #[test]
    fn test_upload_download_respects_pitch() {
        let device = Arc::new(HostDevice::with_pitch_align(256));
        let desc = lookup(PixelLayout::Nv12).unwrap();
        let (w, h) = (40, 6);
        let src: Vec<u8> = (0..unit_size(desc, w, h)).map(|i| (i % 251) as u8).collect();

        let mut buf = buffer(&device, PixelLayout::Nv12, w, h);
        upload(desc, w, h, &src, &mut buf).unwrap();
        let mut back = vec![0u8; src.len()];
        download(desc, w, h, &buf, &mut back).unwrap();
        assert_eq!(src, back);
    }

    #[test]
    fn test_upload_rejects_short_source() {
        let device = Arc::new(HostDevice::new());
        let desc = lookup(PixelLayout::I420).unwrap();
        let mut buf = buffer(&device, PixelLayout::I420, 64, 64);
        let short = vec![0u8; 64 * 64];
        let err = upload(desc, 64, 64, &short, &mut buf).unwrap_err();
        assert!(matches!(err, Error::PlaneCopy { plane: 1, .. }));
        assert_eq!(device.stats().device_syncs, 0);
    }

    #[test]
    fn test_upload_plane_failure_names_plane() {
        let device = Arc::new(HostDevice::new());
        let desc = lookup(PixelLayout::I420).unwrap();
        let mut buf = buffer(&device, PixelLayout::I420, 32, 32);
        device.inject_failure(FailurePoint::MapPlane(2));
        let src = vec![0u8; unit_size(desc, 32, 32)];
        let err = upload(desc, 32, 32, &src, &mut buf).unwrap_err();
        assert!(matches!(err, Error::PlaneCopy { plane: 2, .. }));
    }
}
