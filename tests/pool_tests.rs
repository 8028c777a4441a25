//! Integration tests for hardware surfaces and the output pool.
//!
//! These tests verify that:
//! - The element reuses its pool for equal caps and replaces it otherwise
//! - Buffers issued by a replaced pool stay usable until dropped
//! - Failed allocations leak no surfaces
//! - Mapped access syncs each plane exactly once, also on error
//! - Chroma clear touches only the chroma planes

use parallax_stabilize::converters::{CHROMA_NEUTRAL, clear_chroma, download, upload};
use parallax_stabilize::element::{AllocationQuery, BaseTransform, NegotiationContext};
use parallax_stabilize::elements::Stabilize;
use parallax_stabilize::error::Error;
use parallax_stabilize::format::{Fraction, MemoryResidency, PixelLayout, VideoCaps, lookup};
use parallax_stabilize::memory::{
    AccessMode, AllocationParams, Allocator, FailurePoint, HardwareAllocator, HardwarePool,
    HostDevice, PoolConfig, with_mapped_access,
};
use parallax_stabilize::stabilizer::IdentityFactory;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn nvmm(layout: PixelLayout, width: u32, height: u32) -> VideoCaps {
    VideoCaps::fixed(layout, width, height, Fraction::ONE).with_residency(MemoryResidency::Hardware)
}

fn host(layout: PixelLayout, width: u32, height: u32) -> VideoCaps {
    VideoCaps::fixed(layout, width, height, Fraction::ONE)
}

fn allocator(device: &Arc<HostDevice>, layout: PixelLayout, w: u32, h: u32) -> Arc<HardwareAllocator> {
    Arc::new(HardwareAllocator::new(
        device.clone(),
        lookup(layout).unwrap(),
        w,
        h,
        false,
    ))
}

#[test]
fn test_allocation_query_reuses_negotiated_pool() {
    let device = Arc::new(HostDevice::new());
    let mut element = Stabilize::new(device.clone());
    element
        .set_caps(&host(PixelLayout::Nv12, 64, 64), &nvmm(PixelLayout::Nv12, 64, 64))
        .unwrap();
    let negotiated = element.context().pool().unwrap();

    let mut query = AllocationQuery::new(nvmm(PixelLayout::Nv12, 64, 64), true);
    let decision = element.decide_allocation(&mut query).unwrap();
    assert!(Arc::ptr_eq(decision.pool.as_ref().unwrap(), &negotiated));
    assert_eq!(device.stats().live, 4);
}

#[test]
fn test_replaced_pool_buffers_survive() {
    let device = Arc::new(HostDevice::new());
    let mut element = Stabilize::new(device.clone());
    let input = host(PixelLayout::Nv12, 32, 32);
    element.set_caps(&input, &nvmm(PixelLayout::Nv12, 32, 32)).unwrap();

    let old_pool = element.context().pool().unwrap();
    let mut held = old_pool.acquire().unwrap();
    let old_id = held.pool_id();
    drop(old_pool);

    element.set_caps(&input, &nvmm(PixelLayout::Nv12, 32, 32)).unwrap();
    let new_pool = element.context().pool().unwrap();
    assert_ne!(new_pool.id(), old_id);

    // The held surface still maps and carries data.
    let desc = lookup(PixelLayout::Nv12).unwrap();
    let frame = vec![0x42u8; 32 * 32 * 3 / 2];
    upload(desc, 32, 32, &frame, held.buffer_mut().unwrap()).unwrap();
    let mut back = vec![0u8; frame.len()];
    download(desc, 32, 32, &held, &mut back).unwrap();
    assert_eq!(back, frame);

    // Dropping it destroys the surface instead of returning it anywhere.
    let live = device.stats().live;
    drop(held);
    assert_eq!(device.stats().live, live - 1);
    assert_eq!(new_pool.stats().in_use, 0);
}

#[test]
fn test_allocation_decided_from_another_thread() {
    let device = Arc::new(HostDevice::new());
    let context = Arc::new(NegotiationContext::new(device.clone()));
    let mut element = Stabilize::with_context("stabilize1", context.clone(), Arc::new(IdentityFactory));
    element
        .set_caps(&host(PixelLayout::Rgba, 16, 16), &nvmm(PixelLayout::Rgba, 16, 16))
        .unwrap();
    let pool_id = context.pool().unwrap().id();
    let settings = element.settings().clone();

    let decided = thread::spawn(move || {
        let mut query = AllocationQuery::new(nvmm(PixelLayout::Rgba, 16, 16), true);
        context
            .decide_allocation(&mut query, &settings)
            .map(|d| d.pool.map(|p| p.id()))
    })
    .join()
    .unwrap()
    .unwrap();
    assert_eq!(decided, Some(pool_id));
}

#[test]
fn test_allocator_failure_after_create_leaks_nothing() {
    let device = Arc::new(HostDevice::new());
    let alloc = allocator(&device, PixelLayout::I420, 64, 64);

    device.inject_failure(FailurePoint::SurfaceParams);
    assert!(matches!(alloc.alloc(), Err(Error::AllocationFailed(_))));
    let stats = device.stats();
    assert_eq!(stats.live, 0);
    assert_eq!(stats.created, stats.destroyed);
}

#[test]
fn test_pool_activation_failure_leaks_nothing() {
    let device = Arc::new(HostDevice::new());
    let pool = HardwarePool::new();
    pool.set_config(PoolConfig::new(
        nvmm(PixelLayout::Nv12, 64, 64),
        allocator(&device, PixelLayout::Nv12, 64, 64),
        3,
        3,
    ))
    .unwrap();

    device.inject_failure(FailurePoint::CreateSurface);
    assert!(pool.activate().is_err());
    assert!(!pool.is_active());
    assert_eq!(device.stats().live, 0);
}

#[test]
fn test_mapped_access_syncs_once_on_error() {
    let device = Arc::new(HostDevice::new());
    let buffer = allocator(&device, PixelLayout::I420, 16, 16).alloc().unwrap();
    let before = device.stats();

    let result: parallax_stabilize::Result<()> =
        with_mapped_access(&buffer, AccessMode::ReadWrite, |mapped| {
            mapped.write(0, |bytes| bytes[0] = 1)?;
            Err(Error::Config("abort".into()))
        });
    assert!(matches!(result, Err(Error::Config(_))));

    let after = device.stats();
    assert_eq!(after.cpu_syncs - before.cpu_syncs, 3);
    assert_eq!(after.device_syncs - before.device_syncs, 3);
}

#[test]
#[should_panic(expected = "cannot serve generic allocations")]
fn test_generic_alloc_panics() {
    let device = Arc::new(HostDevice::new());
    let alloc = allocator(&device, PixelLayout::Nv12, 16, 16);
    let _ = alloc.alloc_bytes(1024, &AllocationParams::default());
}

#[test]
fn test_set_config_failure_keeps_old_config() {
    let device = Arc::new(HostDevice::new());
    let pool = HardwarePool::new();
    let alloc = allocator(&device, PixelLayout::Nv12, 32, 32);
    pool.set_config(PoolConfig::new(nvmm(PixelLayout::Nv12, 32, 32), alloc.clone(), 2, 4))
        .unwrap();

    // min above max
    assert!(matches!(
        pool.set_config(PoolConfig::new(nvmm(PixelLayout::Nv12, 32, 32), alloc.clone(), 8, 4)),
        Err(Error::Config(_))
    ));
    // host caps for a hardware pool
    assert!(pool
        .set_config(PoolConfig::new(host(PixelLayout::Nv12, 32, 32), alloc, 2, 4))
        .is_err());

    let config = pool.config().unwrap();
    assert_eq!((config.min_buffers, config.max_buffers), (2, 4));
    assert!(config.caps.is_hardware());
}

#[test]
fn test_exhausted_pool_blocks_then_times_out() {
    let device = Arc::new(HostDevice::new());
    let pool = HardwarePool::new();
    pool.set_config(PoolConfig::new(
        nvmm(PixelLayout::Gray8, 8, 8),
        allocator(&device, PixelLayout::Gray8, 8, 8),
        1,
        1,
    ))
    .unwrap();
    pool.activate().unwrap();

    let held = pool.acquire().unwrap();
    assert!(matches!(
        pool.try_acquire(),
        Err(Error::PoolExhausted { in_use: 1, max: 1 })
    ));
    assert!(pool.acquire_timeout(Duration::from_millis(10)).unwrap().is_none());
    drop(held);
    assert!(pool.acquire_timeout(Duration::from_millis(10)).unwrap().is_some());
}

#[test]
fn test_chroma_clear_64x64() {
    let device = Arc::new(HostDevice::with_pitch_align(64));
    let desc = lookup(PixelLayout::I420).unwrap();
    let mut buffer = allocator(&device, PixelLayout::I420, 64, 64).alloc().unwrap();

    let mut frame = vec![0x10u8; 64 * 64];
    frame.extend(vec![0x00u8; 2 * 32 * 32]);
    upload(desc, 64, 64, &frame, &mut buffer).unwrap();

    clear_chroma(&mut buffer).unwrap();

    let mut back = vec![0u8; frame.len()];
    download(desc, 64, 64, &buffer, &mut back).unwrap();
    assert!(back[..64 * 64].iter().all(|&b| b == 0x10));
    assert_eq!(back[64 * 64..].len(), 2 * 32 * 32);
    assert!(back[64 * 64..].iter().all(|&b| b == CHROMA_NEUTRAL));
}
