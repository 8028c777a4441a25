//! Pixel layouts and the format descriptor table.
//!
//! Every per-format decision (hardware color format, plane count, rounding)
//! comes from [`PixelFormatDescriptor`] rows in a single static table. Code
//! that moves pixels looks a descriptor up once and iterates its planes
//! instead of switching on the layout.

use crate::negotiation::NegotiationError;
use std::fmt;
use std::str::FromStr;

/// Color family of a pixel layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorFamily {
    /// Luma plus chroma.
    Yuv,
    /// Red, green, blue (plus padding or alpha).
    Rgb,
    /// Single luma channel.
    Gray,
}

/// Pixel layout tags as they appear in caps strings.
///
/// Only some of these are supported by the transform; the rest parse so that
/// negotiation can refuse them cleanly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PixelLayout {
    /// Planar 4:2:0, Y then U then V.
    I420,
    /// Semi-planar 4:2:0, Y then interleaved UV.
    Nv12,
    /// Packed 4:2:2, Y0 U Y1 V.
    Yuy2,
    /// Packed 4:2:2, U Y0 V Y1.
    Uyvy,
    /// Packed 4:2:2, Y0 V Y1 U.
    Yvyu,
    /// 32-bit BGR with a padding byte.
    Bgrx,
    /// 32-bit RGB with alpha.
    Rgba,
    /// 8-bit gray.
    Gray8,
    /// Planar 4:2:2 (not supported).
    Y42b,
    /// Planar 4:4:4 (not supported).
    Y444,
    /// 10-bit semi-planar 4:2:0 (not supported).
    P010,
    /// Packed 24-bit RGB (not supported).
    Rgb,
    /// 32-bit BGR with alpha (not supported).
    Bgra,
}

impl PixelLayout {
    /// Every layout this crate can name, supported or not.
    pub const ALL: [PixelLayout; 13] = [
        Self::I420,
        Self::Nv12,
        Self::Yuy2,
        Self::Uyvy,
        Self::Yvyu,
        Self::Bgrx,
        Self::Rgba,
        Self::Gray8,
        Self::Y42b,
        Self::Y444,
        Self::P010,
        Self::Rgb,
        Self::Bgra,
    ];

    /// Caps-string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::I420 => "I420",
            Self::Nv12 => "NV12",
            Self::Yuy2 => "YUY2",
            Self::Uyvy => "UYVY",
            Self::Yvyu => "YVYU",
            Self::Bgrx => "BGRx",
            Self::Rgba => "RGBA",
            Self::Gray8 => "GRAY8",
            Self::Y42b => "Y42B",
            Self::Y444 => "Y444",
            Self::P010 => "P010_10LE",
            Self::Rgb => "RGB",
            Self::Bgra => "BGRA",
        }
    }

    /// Color family the layout belongs to.
    pub fn family(&self) -> ColorFamily {
        match self {
            Self::Bgrx | Self::Rgba | Self::Rgb | Self::Bgra => ColorFamily::Rgb,
            Self::Gray8 => ColorFamily::Gray,
            _ => ColorFamily::Yuv,
        }
    }
}

impl fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| format!("unknown pixel layout {s:?}"))
    }
}

/// Color formats understood by the hardware surface API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HardwareColorFormat {
    /// Planar 4:2:0.
    Yuv420,
    /// Semi-planar 4:2:0.
    Nv12,
    /// Packed 4:2:2 YUYV.
    Yuyv,
    /// Packed 4:2:2 UYVY.
    Uyvy,
    /// Packed 4:2:2 YVYU.
    Yvyu,
    /// 32-bit XRGB (BGRx in memory order).
    Xrgb32,
    /// 32-bit ABGR (RGBA in memory order).
    Abgr32,
    /// 8-bit gray.
    Gray8,
}

/// Geometry rule for one plane.
///
/// The plane's width is `round_up(width, x_round) / x_sub` samples and its
/// height `round_up(height, y_round) / y_sub` rows; each sample occupies
/// `bytes_per_sample` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneSpec {
    /// Horizontal rounding applied to the full-resolution width.
    pub x_round: u32,
    /// Vertical rounding applied to the full-resolution height.
    pub y_round: u32,
    /// Horizontal subsampling factor.
    pub x_sub: u32,
    /// Vertical subsampling factor.
    pub y_sub: u32,
    /// Bytes per sample in this plane.
    pub bytes_per_sample: u32,
}

impl PlaneSpec {
    const fn new(x_round: u32, y_round: u32, x_sub: u32, y_sub: u32, bytes_per_sample: u32) -> Self {
        Self {
            x_round,
            y_round,
            x_sub,
            y_sub,
            bytes_per_sample,
        }
    }
}

/// Immutable description of a supported pixel layout.
#[derive(Debug, PartialEq, Eq)]
pub struct PixelFormatDescriptor {
    /// Color family.
    pub family: ColorFamily,
    /// Caps layout tag.
    pub layout: PixelLayout,
    /// Matching hardware color format.
    pub hardware: HardwareColorFormat,
    /// Plane rules, in memory order.
    pub planes: &'static [PlaneSpec],
    /// Nominal bits per pixel, for aligned frame sizes.
    pub bits_per_pixel: u32,
}

impl PixelFormatDescriptor {
    /// Number of planes.
    #[inline]
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// True for layouts that carry chroma (anything YUV).
    #[inline]
    pub fn has_chroma(&self) -> bool {
        self.family == ColorFamily::Yuv
    }

    /// Width and height multiples at which the planes carry no padding.
    pub fn alignment(&self) -> (u32, u32) {
        self.planes.iter().fold((1, 1), |(x, y), p| {
            (lcm(x, p.x_round.max(p.x_sub)), lcm(y, p.y_round.max(p.y_sub)))
        })
    }
}

fn lcm(a: u32, b: u32) -> u32 {
    let (mut x, mut y) = (a, b);
    while y != 0 {
        (x, y) = (y, x % y);
    }
    a / x * b
}

const LUMA_420: PlaneSpec = PlaneSpec::new(4, 2, 1, 1, 1);
const CHROMA_420: PlaneSpec = PlaneSpec::new(8, 2, 2, 2, 1);
const CHROMA_420_INTERLEAVED: PlaneSpec = PlaneSpec::new(8, 2, 2, 2, 2);
const PACKED_422: PlaneSpec = PlaneSpec::new(2, 1, 1, 1, 2);
const PACKED_RGB32: PlaneSpec = PlaneSpec::new(1, 1, 1, 1, 4);
const GRAY: PlaneSpec = PlaneSpec::new(1, 1, 1, 1, 1);

static FORMATS: [PixelFormatDescriptor; 8] = [
    PixelFormatDescriptor {
        family: ColorFamily::Yuv,
        layout: PixelLayout::I420,
        hardware: HardwareColorFormat::Yuv420,
        planes: &[LUMA_420, CHROMA_420, CHROMA_420],
        bits_per_pixel: 12,
    },
    PixelFormatDescriptor {
        family: ColorFamily::Yuv,
        layout: PixelLayout::Nv12,
        hardware: HardwareColorFormat::Nv12,
        planes: &[LUMA_420, CHROMA_420_INTERLEAVED],
        bits_per_pixel: 12,
    },
    PixelFormatDescriptor {
        family: ColorFamily::Yuv,
        layout: PixelLayout::Yuy2,
        hardware: HardwareColorFormat::Yuyv,
        planes: &[PACKED_422],
        bits_per_pixel: 16,
    },
    PixelFormatDescriptor {
        family: ColorFamily::Yuv,
        layout: PixelLayout::Uyvy,
        hardware: HardwareColorFormat::Uyvy,
        planes: &[PACKED_422],
        bits_per_pixel: 16,
    },
    PixelFormatDescriptor {
        family: ColorFamily::Yuv,
        layout: PixelLayout::Yvyu,
        hardware: HardwareColorFormat::Yvyu,
        planes: &[PACKED_422],
        bits_per_pixel: 16,
    },
    PixelFormatDescriptor {
        family: ColorFamily::Rgb,
        layout: PixelLayout::Bgrx,
        hardware: HardwareColorFormat::Xrgb32,
        planes: &[PACKED_RGB32],
        bits_per_pixel: 32,
    },
    PixelFormatDescriptor {
        family: ColorFamily::Rgb,
        layout: PixelLayout::Rgba,
        hardware: HardwareColorFormat::Abgr32,
        planes: &[PACKED_RGB32],
        bits_per_pixel: 32,
    },
    PixelFormatDescriptor {
        family: ColorFamily::Gray,
        layout: PixelLayout::Gray8,
        hardware: HardwareColorFormat::Gray8,
        planes: &[GRAY],
        bits_per_pixel: 8,
    },
];

/// All supported descriptors, in table order.
pub fn supported_formats() -> &'static [PixelFormatDescriptor] {
    &FORMATS
}

/// Supported layouts, in table order.
pub fn supported_layouts() -> Vec<PixelLayout> {
    FORMATS.iter().map(|d| d.layout).collect()
}

/// Look up the descriptor for a (family, layout) pair.
///
/// A layout outside the table, or one that does not belong to `family`, is
/// [`NegotiationError::UnsupportedFormat`].
pub fn resolve(
    family: ColorFamily,
    layout: PixelLayout,
) -> Result<&'static PixelFormatDescriptor, NegotiationError> {
    FORMATS
        .iter()
        .find(|d| d.layout == layout && d.family == family)
        .ok_or(NegotiationError::UnsupportedFormat { layout, family })
}

/// Look up a descriptor by layout alone.
pub fn lookup(layout: PixelLayout) -> Result<&'static PixelFormatDescriptor, NegotiationError> {
    resolve(layout.family(), layout)
}
