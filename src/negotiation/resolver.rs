//! Capability resolution: what can the other side accept given this side's caps.
//!
//! The stabilizer can resize and change memory residency, so the caps it can
//! produce for a given input are the input caps with geometry and format
//! opened up. [`transform_caps`] is the query the framework issues in both
//! directions; [`accept_caps`] checks a concrete proposal against the pad
//! templates.

use crate::format::{
    Caps, CapsValue, Fraction, MAX_DIMENSION, MemoryResidency, PixelLayout, VideoCaps,
    supported_layouts,
};
use tracing::debug;

/// Which pad a caps query refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// The input pad.
    Sink,
    /// The output pad.
    Src,
}

impl PadDirection {
    /// The opposite pad.
    pub fn opposite(self) -> Self {
        match self {
            Self::Sink => Self::Src,
            Self::Src => Self::Sink,
        }
    }
}

/// Pad template for `direction`.
///
/// Both pads advertise every supported layout, first as hardware-resident
/// memory and then as host memory.
pub fn pad_template(_direction: PadDirection) -> Caps {
    let formats: CapsValue<PixelLayout> = supported_layouts().into();
    [MemoryResidency::Hardware, MemoryResidency::Host]
        .into_iter()
        .map(|residency| {
            VideoCaps::new(residency)
                .with_format(formats.clone())
                .with_width(1..=MAX_DIMENSION)
                .with_height(1..=MAX_DIMENSION)
        })
        .collect()
}

/// Open range a widened pixel-aspect-ratio takes.
pub fn open_par_range() -> CapsValue<Fraction> {
    CapsValue::Range {
        min: Fraction::MIN_POSITIVE,
        max: Fraction::MAX,
    }
}

fn widen_one(caps: &VideoCaps) -> VideoCaps {
    let mut wide = caps.clone();
    wide.format = CapsValue::Any;
    wide.colorimetry = None;
    wide.chroma_site = None;
    wide.width = CapsValue::Range {
        min: 1,
        max: MAX_DIMENSION,
    };
    wide.height = CapsValue::Range {
        min: 1,
        max: MAX_DIMENSION,
    };
    if !wide.pixel_aspect_ratio.is_any() {
        wide.pixel_aspect_ratio = open_par_range();
    }
    wide
}

/// Remove format and geometry constraints from every descriptor.
///
/// Entries whose widened form is already covered by an earlier entry are
/// dropped, so the result keeps the input's preference order without
/// duplicates.
pub fn widen(caps: &Caps) -> Caps {
    let mut out = Caps::new_empty();
    for desc in caps {
        out.merge(widen_one(desc));
    }
    out
}

/// Caps the pad opposite `direction` can handle, given `caps` on `direction`.
///
/// With a `filter` from the peer the widened caps are intersected with it
/// (filter order first); an empty intersection returns the filter unchanged
/// so the caller always gets something to try. Without a filter, every
/// widened entry is offered as hardware-resident first and host-resident
/// second.
pub fn transform_caps(direction: PadDirection, caps: &Caps, filter: Option<&Caps>) -> Caps {
    let mut widened = widen(caps);

    let result = match filter {
        Some(filter) => {
            if direction == PadDirection::Src && filter.first().is_some_and(|f| !f.is_hardware()) {
                widened = widened
                    .iter()
                    .cloned()
                    .map(|c| c.with_residency(MemoryResidency::Host))
                    .fold(Caps::new_empty(), |mut acc, c| {
                        acc.merge(c);
                        acc
                    });
            }
            let narrowed = filter.intersect(&widened);
            if narrowed.is_empty() {
                filter.clone()
            } else {
                narrowed
            }
        }
        None => {
            let mut out = Caps::new_empty();
            for residency in [MemoryResidency::Hardware, MemoryResidency::Host] {
                for c in &widened {
                    out.merge(c.clone().with_residency(residency));
                }
            }
            out
        }
    };

    debug!(
        ?direction,
        from = %caps,
        filter = %filter.map(ToString::to_string).unwrap_or_default(),
        to = %result,
        "transformed caps"
    );
    result
}

/// True when every entry of `caps` fits the pad template of `direction`.
pub fn accept_caps(direction: PadDirection, caps: &Caps) -> bool {
    !caps.is_empty() && caps.is_subset_of(&pad_template(direction))
}
