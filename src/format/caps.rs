//! Capability descriptors and ordered capability sets.

use super::fraction::Fraction;
use super::pixel::PixelLayout;
use super::value::CapsValue;
use crate::negotiation::NegotiationError;
use smallvec::SmallVec;
use std::fmt;

/// Largest width or height a caps string can express.
pub const MAX_DIMENSION: u32 = i32::MAX as u32;

/// Where a frame's pixels live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryResidency {
    /// Ordinary host memory.
    Host,
    /// Device memory behind an opaque surface handle (`memory:NVMM`).
    Hardware,
}

impl MemoryResidency {
    /// True for device memory.
    #[inline]
    pub fn is_hardware(&self) -> bool {
        matches!(self, Self::Hardware)
    }

    /// Caps feature string, if any.
    pub fn feature(&self) -> Option<&'static str> {
        match self {
            Self::Host => None,
            Self::Hardware => Some(HARDWARE_FEATURE),
        }
    }
}

/// Caps feature naming hardware-resident memory.
pub const HARDWARE_FEATURE: &str = "memory:NVMM";

/// Scan type of the frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InterlaceMode {
    /// Progressive frames.
    Progressive,
    /// Both fields interleaved in one frame.
    Interleaved,
    /// Mix of progressive and interlaced frames.
    Mixed,
}

impl InterlaceMode {
    /// Caps-string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Progressive => "progressive",
            Self::Interleaved => "interleaved",
            Self::Mixed => "mixed",
        }
    }
}

impl std::str::FromStr for InterlaceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "progressive" => Ok(Self::Progressive),
            "interleaved" => Ok(Self::Interleaved),
            "mixed" => Ok(Self::Mixed),
            other => Err(format!("unknown interlace mode {other:?}")),
        }
    }
}

/// One capability descriptor: constraints on a raw video frame.
///
/// `CapsValue::Any` on a field means the field is absent (unconstrained).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoCaps {
    /// Memory residency.
    pub residency: MemoryResidency,
    /// Pixel layout.
    pub format: CapsValue<PixelLayout>,
    /// Width in pixels.
    pub width: CapsValue<u32>,
    /// Height in pixels.
    pub height: CapsValue<u32>,
    /// Pixel aspect ratio.
    pub pixel_aspect_ratio: CapsValue<Fraction>,
    /// Scan type.
    pub interlace_mode: CapsValue<InterlaceMode>,
    /// Colorimetry string, carried opaquely.
    pub colorimetry: Option<String>,
    /// Chroma siting string, carried opaquely.
    pub chroma_site: Option<String>,
}

impl VideoCaps {
    /// Unconstrained descriptor with the given residency.
    pub fn new(residency: MemoryResidency) -> Self {
        Self {
            residency,
            format: CapsValue::Any,
            width: CapsValue::Any,
            height: CapsValue::Any,
            pixel_aspect_ratio: CapsValue::Any,
            interlace_mode: CapsValue::Any,
            colorimetry: None,
            chroma_site: None,
        }
    }

    /// Host-resident, unconstrained.
    pub fn host() -> Self {
        Self::new(MemoryResidency::Host)
    }

    /// Hardware-resident, unconstrained.
    pub fn hardware() -> Self {
        Self::new(MemoryResidency::Hardware)
    }

    /// Fully fixed host descriptor, convenient for tests and sources.
    pub fn fixed(layout: PixelLayout, width: u32, height: u32, par: Fraction) -> Self {
        Self::host()
            .with_format(layout)
            .with_size(width, height)
            .with_par(par)
    }

    /// Set the format constraint.
    pub fn with_format(mut self, format: impl Into<CapsValue<PixelLayout>>) -> Self {
        self.format = format.into();
        self
    }

    /// Set fixed width and height.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = CapsValue::Fixed(width);
        self.height = CapsValue::Fixed(height);
        self
    }

    /// Set the width constraint.
    pub fn with_width(mut self, width: impl Into<CapsValue<u32>>) -> Self {
        self.width = width.into();
        self
    }

    /// Set the height constraint.
    pub fn with_height(mut self, height: impl Into<CapsValue<u32>>) -> Self {
        self.height = height.into();
        self
    }

    /// Set the pixel-aspect-ratio constraint.
    pub fn with_par(mut self, par: impl Into<CapsValue<Fraction>>) -> Self {
        self.pixel_aspect_ratio = par.into();
        self
    }

    /// Same constraints, different residency.
    pub fn with_residency(mut self, residency: MemoryResidency) -> Self {
        self.residency = residency;
        self
    }

    /// True when the frames live in device memory.
    #[inline]
    pub fn is_hardware(&self) -> bool {
        self.residency == MemoryResidency::Hardware
    }

    /// True when format, width, height and PAR are all fixed.
    pub fn is_fixed(&self) -> bool {
        self.format.is_fixed()
            && self.width.is_fixed()
            && self.height.is_fixed()
            && self.pixel_aspect_ratio.is_fixed()
    }

    /// Intersect two descriptors. Residency must match exactly.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if self.residency != other.residency {
            return None;
        }
        Some(Self {
            residency: self.residency,
            format: self.format.intersect(&other.format)?,
            width: self.width.intersect(&other.width)?,
            height: self.height.intersect(&other.height)?,
            pixel_aspect_ratio: self.pixel_aspect_ratio.intersect(&other.pixel_aspect_ratio)?,
            interlace_mode: self.interlace_mode.intersect(&other.interlace_mode)?,
            colorimetry: merge_opaque(&self.colorimetry, &other.colorimetry)?,
            chroma_site: merge_opaque(&self.chroma_site, &other.chroma_site)?,
        })
    }

    /// True when every frame `self` accepts is also accepted by `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.residency == other.residency
            && self.format.is_subset_of(&other.format)
            && self.width.is_subset_of(&other.width)
            && self.height.is_subset_of(&other.height)
            && self.pixel_aspect_ratio.is_subset_of(&other.pixel_aspect_ratio)
            && self.interlace_mode.is_subset_of(&other.interlace_mode)
            && opaque_subset(&self.colorimetry, &other.colorimetry)
            && opaque_subset(&self.chroma_site, &other.chroma_site)
    }

    /// Extract the fixed geometry, failing on any unfixed field.
    pub fn fixed_video(&self) -> Result<FixedVideo, NegotiationError> {
        let not_fixed = |field: &'static str| NegotiationError::NotFixed {
            field,
            caps: self.to_string(),
        };
        Ok(FixedVideo {
            layout: *self.format.as_fixed().ok_or_else(|| not_fixed("format"))?,
            width: *self.width.as_fixed().ok_or_else(|| not_fixed("width"))?,
            height: *self.height.as_fixed().ok_or_else(|| not_fixed("height"))?,
            par: match &self.pixel_aspect_ratio {
                CapsValue::Fixed(par) => *par,
                CapsValue::Any => Fraction::ONE,
                _ => return Err(not_fixed("pixel-aspect-ratio")),
            },
            residency: self.residency,
        })
    }
}

fn merge_opaque(a: &Option<String>, b: &Option<String>) -> Option<Option<String>> {
    match (a, b) {
        (Some(x), Some(y)) if x != y => None,
        (Some(x), _) | (None, Some(x)) => Some(Some(x.clone())),
        (None, None) => Some(None),
    }
}

fn opaque_subset(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (_, None) => true,
        (Some(x), Some(y)) => x == y,
        (None, Some(_)) => false,
    }
}

/// Concrete geometry extracted from fixed caps. A missing PAR reads as 1/1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedVideo {
    /// Pixel layout.
    pub layout: PixelLayout,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel aspect ratio.
    pub par: Fraction,
    /// Memory residency.
    pub residency: MemoryResidency,
}

/// An ordered capability set. The first entry is preferred.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Caps(SmallVec<[VideoCaps; 2]>);

impl Caps {
    /// Empty set (nothing acceptable).
    pub fn new_empty() -> Self {
        Self(SmallVec::new())
    }

    /// Set with one descriptor.
    pub fn single(caps: VideoCaps) -> Self {
        let mut set = Self::new_empty();
        set.0.push(caps);
        set
    }

    /// Append a descriptor, keeping order and duplicates.
    pub fn push(&mut self, caps: VideoCaps) {
        self.0.push(caps);
    }

    /// Append unless an existing entry already covers `caps`.
    pub fn merge(&mut self, caps: VideoCaps) {
        if !self.0.iter().any(|c| caps.is_subset_of(c)) {
            self.0.push(caps);
        }
    }

    /// Number of descriptors.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing is acceptable.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in preference order.
    pub fn iter(&self) -> std::slice::Iter<'_, VideoCaps> {
        self.0.iter()
    }

    /// Mutable iteration.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, VideoCaps> {
        self.0.iter_mut()
    }

    /// Preferred descriptor.
    pub fn first(&self) -> Option<&VideoCaps> {
        self.0.first()
    }

    /// Descriptor by index.
    pub fn get(&self, index: usize) -> Option<&VideoCaps> {
        self.0.get(index)
    }

    /// Intersect, keeping `self`'s order first.
    pub fn intersect(&self, other: &Caps) -> Caps {
        let mut out = Caps::new_empty();
        for a in self.iter() {
            for b in other.iter() {
                if let Some(c) = a.intersect(b) {
                    out.merge(c);
                }
            }
        }
        out
    }

    /// True when every entry is a subset of some entry of `other`.
    pub fn is_subset_of(&self, other: &Caps) -> bool {
        self.iter()
            .all(|a| other.iter().any(|b| a.is_subset_of(b)))
    }

    /// True when any entry is hardware-resident.
    pub fn has_hardware(&self) -> bool {
        self.iter().any(VideoCaps::is_hardware)
    }
}

impl FromIterator<VideoCaps> for Caps {
    fn from_iter<I: IntoIterator<Item = VideoCaps>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Caps {
    type Item = &'a VideoCaps;
    type IntoIter = std::slice::Iter<'a, VideoCaps>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// Display
// ============================================================================

fn write_value<T>(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    ty: &str,
    value: &CapsValue<T>,
    show: impl Fn(&T) -> String,
) -> fmt::Result {
    match value {
        CapsValue::Any => Ok(()),
        CapsValue::Fixed(v) => write!(f, ", {name}=({ty}){}", show(v)),
        CapsValue::Range { min, max } => {
            write!(f, ", {name}=({ty})[ {}, {} ]", show(min), show(max))
        }
        CapsValue::List(values) => {
            let items: Vec<String> = values.iter().map(&show).collect();
            write!(f, ", {name}=({ty}){{ {} }}", items.join(", "))
        }
    }
}

impl fmt::Display for VideoCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("video/x-raw")?;
        if let Some(feature) = self.residency.feature() {
            write!(f, "({feature})")?;
        }
        write_value(f, "format", "string", &self.format, |v| v.to_string())?;
        write_value(f, "width", "int", &self.width, |v| v.to_string())?;
        write_value(f, "height", "int", &self.height, |v| v.to_string())?;
        write_value(
            f,
            "pixel-aspect-ratio",
            "fraction",
            &self.pixel_aspect_ratio,
            |v| v.to_string(),
        )?;
        write_value(f, "interlace-mode", "string", &self.interlace_mode, |v| {
            v.as_str().to_string()
        })?;
        if let Some(c) = &self.colorimetry {
            write!(f, ", colorimetry=(string){c}")?;
        }
        if let Some(c) = &self.chroma_site {
            write!(f, ", chroma-site=(string){c}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("EMPTY");
        }
        for (i, caps) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{caps}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn par(n: i32, d: i32) -> Fraction {
        Fraction::new(n, d).unwrap()
    }

    #[test]
    fn test_intersect_requires_same_residency() {
        let a = VideoCaps::host().with_format(PixelLayout::Nv12);
        let b = VideoCaps::hardware().with_format(PixelLayout::Nv12);
        assert!(a.intersect(&b).is_none());
        assert!(a.intersect(&a).is_some());
    }

    #[test]
    fn test_intersect_narrows_fields() {
        let a = VideoCaps::host()
            .with_format(vec![PixelLayout::Nv12, PixelLayout::I420])
            .with_width(1..=1920);
        let b = VideoCaps::host()
            .with_format(PixelLayout::I420)
            .with_width(1280)
            .with_height(720);
        let c = a.intersect(&b).unwrap();
        assert_eq!(c.format, CapsValue::Fixed(PixelLayout::I420));
        assert_eq!(c.width, CapsValue::Fixed(1280));
        assert_eq!(c.height, CapsValue::Fixed(720));
    }

    #[test]
    fn test_colorimetry_conflict() {
        let mut a = VideoCaps::host();
        a.colorimetry = Some("bt709".into());
        let mut b = VideoCaps::host();
        b.colorimetry = Some("bt601".into());
        assert!(a.intersect(&b).is_none());
        assert!(a.is_subset_of(&VideoCaps::host()));
        assert!(!VideoCaps::host().is_subset_of(&a));
    }

    #[test]
    fn test_fixed_video() {
        let caps = VideoCaps::fixed(PixelLayout::Nv12, 640, 480, par(1, 1));
        let fixed = caps.fixed_video().unwrap();
        assert_eq!((fixed.width, fixed.height), (640, 480));

        let partial = VideoCaps::host().with_format(PixelLayout::Nv12);
        assert!(matches!(
            partial.fixed_video(),
            Err(NegotiationError::NotFixed { field: "width", .. })
        ));

        let free_par = VideoCaps::fixed(PixelLayout::Nv12, 640, 480, par(1, 1))
            .with_par(CapsValue::Any);
        assert_eq!(free_par.fixed_video().unwrap().par, Fraction::ONE);

        let ranged: VideoCaps =
            "video/x-raw, format=NV12, width=640, height=480, pixel-aspect-ratio=[1/2, 2/1]"
                .parse()
                .unwrap();
        assert!(matches!(
            ranged.fixed_video(),
            Err(NegotiationError::NotFixed { field: "pixel-aspect-ratio", .. })
        ));
    }

    #[test]
    fn test_caps_intersect_preserves_first_order() {
        let a: Caps = [
            VideoCaps::hardware().with_format(PixelLayout::Rgba),
            VideoCaps::host().with_format(PixelLayout::Nv12),
        ]
        .into_iter()
        .collect();
        let b: Caps = [
            VideoCaps::host().with_format(vec![PixelLayout::Nv12, PixelLayout::Rgba]),
            VideoCaps::hardware(),
        ]
        .into_iter()
        .collect();
        let c = a.intersect(&b);
        assert_eq!(c.len(), 2);
        assert!(c.first().unwrap().is_hardware());
    }

    #[test]
    fn test_display() {
        let caps = VideoCaps::hardware()
            .with_format(vec![PixelLayout::Nv12, PixelLayout::Rgba])
            .with_width(1..=MAX_DIMENSION)
            .with_height(720)
            .with_par(par(1, 1));
        assert_eq!(
            caps.to_string(),
            "video/x-raw(memory:NVMM), format=(string){ NV12, RGBA }, \
             width=(int)[ 1, 2147483647 ], height=(int)720, pixel-aspect-ratio=(fraction)1/1"
        );
        assert_eq!(Caps::new_empty().to_string(), "EMPTY");
    }
}
