//! Integration tests for caps negotiation.
//!
//! These tests verify that:
//! - Fixation keeps the display aspect ratio for the common cases
//! - Fixation is idempotent
//! - Widening drops descriptors already covered by earlier ones
//! - Caps strings survive a Display/FromStr round trip
//! - `negotiate` drives the element to the expected output caps

use parallax_stabilize::element::{BaseTransform, NegotiationState, negotiate};
use parallax_stabilize::elements::Stabilize;
use parallax_stabilize::format::{
    Caps, CapsValue, ColorFamily, Fraction, PixelLayout, VideoCaps, display_aspect_ratio, resolve,
};
use parallax_stabilize::memory::HostDevice;
use parallax_stabilize::negotiation::{
    FixationRule, NegotiationError, PadDirection, fixate, fixate_caps, transform_caps, widen,
};
use std::sync::Arc;

fn par(n: i32, d: i32) -> Fraction {
    Fraction::new(n, d).unwrap()
}

fn caps(s: &str) -> VideoCaps {
    s.parse().unwrap()
}

/// Src-side candidates for a fixed sink input, no downstream filter.
fn candidates(input: &VideoCaps) -> Caps {
    transform_caps(PadDirection::Sink, &Caps::single(input.clone()), None)
}

#[test]
fn test_1080p_free_output_stays_1080p() {
    let input = caps("video/x-raw, format=I420, width=1920, height=1080, pixel-aspect-ratio=1/1");
    let free = candidates(&input).get(1).cloned().unwrap();
    assert!(!free.is_hardware());

    let fixation = fixate(PadDirection::Sink, &input, &free).unwrap();
    let video = fixation.caps.fixed_video().unwrap();
    assert_eq!((video.width, video.height, video.par), (1920, 1080, par(1, 1)));
    assert!(fixation.dar_preserved);
}

#[test]
fn test_width_640_gives_height_360() {
    let input = caps("video/x-raw, format=I420, width=1280, height=720, pixel-aspect-ratio=1/1");
    let downstream: Caps = "video/x-raw, format=I420, width=640".parse().unwrap();
    let narrowed = transform_caps(PadDirection::Sink, &Caps::single(input.clone()), Some(&downstream));

    let fixation = fixate_caps(PadDirection::Sink, &input, &narrowed).unwrap();
    let video = fixation.caps.fixed_video().unwrap();
    assert_eq!((video.width, video.height), (640, 360));
    assert_eq!(video.par, par(1, 1));
    assert_eq!(fixation.rule, FixationRule::WidthFixed);
}

#[test]
fn test_hardware_entry_is_fixated_first() {
    let input = caps("video/x-raw, format=NV12, width=1280, height=720, pixel-aspect-ratio=1/1");
    let fixation = fixate_caps(PadDirection::Sink, &input, &candidates(&input)).unwrap();
    assert!(fixation.caps.is_hardware());
    assert_eq!(fixation.caps.fixed_video().unwrap().layout, PixelLayout::Nv12);
}

#[test]
fn test_dar_invariant_under_equivalent_par() {
    let a = display_aspect_ratio(720, 576, par(16, 15)).unwrap();
    let b = display_aspect_ratio(720, 576, par(32, 30)).unwrap();
    let c = display_aspect_ratio(720, 576, par(160, 150)).unwrap();
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(a, par(4, 3));
}

#[test]
fn test_anamorphic_input_keeps_dar() {
    let input = caps("video/x-raw, format=I420, width=720, height=576, pixel-aspect-ratio=16/15");
    let out = caps("video/x-raw, format=I420, height=480, pixel-aspect-ratio=1/1");
    let fixation = fixate(PadDirection::Sink, &input, &out).unwrap();
    let video = fixation.caps.fixed_video().unwrap();
    assert_eq!((video.width, video.height), (640, 480));
    assert!(fixation.dar_preserved);
}

#[test]
fn test_fixation_idempotent_through_candidates() {
    for (w, h) in [(1920, 1080), (1280, 720), (640, 480), (333, 211)] {
        let input = VideoCaps::fixed(PixelLayout::Nv12, w, h, par(1, 1));
        let first = fixate_caps(PadDirection::Sink, &input, &candidates(&input)).unwrap();
        let second = fixate(PadDirection::Sink, &input, &first.caps).unwrap();
        assert_eq!(first.caps, second.caps, "{w}x{h}");
        assert_eq!(first.dar_preserved, second.dar_preserved);
    }
}

#[test]
fn test_widen_deduplicates() {
    let set: Caps = "video/x-raw, format=NV12, width=640, height=480, pixel-aspect-ratio=1/1; \
                     video/x-raw, format=I420, width=320, height=240, pixel-aspect-ratio=1/1; \
                     video/x-raw(memory:NVMM), format=NV12, width=640, height=480"
        .parse()
        .unwrap();
    let wide = widen(&set);
    assert_eq!(wide.len(), 2);
    assert!(!wide.first().unwrap().is_hardware());
    assert!(wide.get(1).unwrap().is_hardware());
    assert_eq!(wide.first().unwrap().format, CapsValue::Any);
}

#[test]
fn test_caps_string_round_trip() {
    let text = "video/x-raw(memory:NVMM), format=(string){ NV12, I420 }, \
                width=(int)[ 16, 4096 ], height=(int)720, pixel-aspect-ratio=(fraction)1/1; \
                video/x-raw, format=(string)GRAY8";
    let parsed: Caps = text.parse().unwrap();
    let printed = parsed.to_string();
    let reparsed: Caps = printed.parse().unwrap();
    assert_eq!(parsed, reparsed);
    assert_eq!(reparsed.to_string(), printed);
}

#[test]
fn test_resolve_unlisted_layout() {
    assert!(matches!(
        resolve(ColorFamily::Yuv, PixelLayout::Y444),
        Err(NegotiationError::UnsupportedFormat { .. })
    ));
    assert!(resolve(ColorFamily::Yuv, PixelLayout::Nv12).is_ok());
}

#[test]
fn test_negotiate_end_to_end() {
    let mut element = Stabilize::new(Arc::new(HostDevice::new()));
    let input = caps("video/x-raw, format=NV12, width=1280, height=720, pixel-aspect-ratio=1/1");
    let downstream: Caps = "video/x-raw, height=[ 1, 480 ]".parse().unwrap();

    let output = negotiate(&mut element, &input, Some(&downstream)).unwrap();
    let video = output.fixed_video().unwrap();
    assert!(video.height <= 480);
    assert_eq!(
        display_aspect_ratio(video.width, video.height, video.par),
        display_aspect_ratio(1280, 720, par(1, 1))
    );
    assert_eq!(element.state(), NegotiationState::Negotiated);
    assert!(element.geometry().unwrap().requires_scaling);
}

#[test]
fn test_negotiate_refuses_unsupported_input() {
    let mut element = Stabilize::new(Arc::new(HostDevice::new()));
    let input = caps("video/x-raw, format=P010_10LE, width=64, height=64");
    assert!(negotiate(&mut element, &input, None).is_err());
    assert!(!element.accept_caps(PadDirection::Sink, &Caps::single(input)));
    assert_eq!(element.state(), NegotiationState::Unconfigured);
}
