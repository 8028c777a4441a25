//! Element properties.
//!
//! [`StabilizeSettings`] holds the typed values. The string-keyed
//! [`StabilizeSettings::set_property`] / [`StabilizeSettings::property`]
//! pair accepts the property names a pipeline description uses:
//!
//! | Property | Type | Domain | Default |
//! |---|---|---|---|
//! | `crop-margin` | float | below 0.5, negative disables cropping | 0.07 |
//! | `queue-size` | uint | 1..=6 | 5 |
//! | `silent` | bool | | false |
//! | `interpolation-method` | enum | nearest, bilinear, 5-tap, 10-tap, smart, nicest | smart |
//! | `num-output-buffers` | uint | 2..=32 | 4 |
//! | `enable-blocklinear-output` | bool | | false |
//!
//! ```rust
//! use parallax_stabilize::config::{PropertyValue, StabilizeSettings};
//!
//! let mut settings = StabilizeSettings::default();
//! settings.set_property("queue-size", PropertyValue::Integer(3)).unwrap();
//! assert_eq!(settings.history_depth(), 5);
//!
//! assert!(settings.set_property("queue-size", PropertyValue::Integer(9)).is_err());
//! assert_eq!(settings.queue_size, 3);
//! ```

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Smallest accepted `queue-size`.
pub const MIN_QUEUE_SIZE: u32 = 1;
/// Largest accepted `queue-size`.
pub const MAX_QUEUE_SIZE: u32 = 6;
/// Smallest accepted `num-output-buffers`.
pub const MIN_OUTPUT_BUFFERS: u32 = 2;
/// Largest accepted `num-output-buffers`.
pub const MAX_OUTPUT_BUFFERS: u32 = 32;
/// `crop-margin` must stay below this.
pub const MAX_CROP_MARGIN: f64 = 0.5;

/// Extra frames the history ring holds beyond `queue-size`.
const HISTORY_SLACK: u32 = 2;

/// A property value, as written in a pipeline description.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// A string value (quoted or unquoted).
    String(String),
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Float(f64),
    /// A boolean value.
    Bool(bool),
}

impl PropertyValue {
    /// Get as a string, converting if necessary.
    pub fn as_string(&self) -> String {
        match self {
            PropertyValue::String(s) => s.clone(),
            PropertyValue::Integer(i) => i.to_string(),
            PropertyValue::Float(f) => f.to_string(),
            PropertyValue::Bool(b) => b.to_string(),
        }
    }

    /// Try to get as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            PropertyValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to get as a u64.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|i| u64::try_from(i).ok())
    }

    /// Try to get as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Integer(i) => Some(*i as f64),
            PropertyValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to get as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            PropertyValue::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Interpolation used when the output size differs from the input size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMethod {
    /// Nearest neighbour.
    Nearest,
    /// Bilinear.
    Bilinear,
    /// 5-tap filter.
    FiveTap,
    /// 10-tap filter.
    TenTap,
    /// Let the device choose.
    #[default]
    Smart,
    /// Highest quality the device offers.
    Nicest,
}

impl InterpolationMethod {
    /// All methods, in enum-value order.
    pub const ALL: [InterpolationMethod; 6] = [
        Self::Nearest,
        Self::Bilinear,
        Self::FiveTap,
        Self::TenTap,
        Self::Smart,
        Self::Nicest,
    ];

    /// Property nick.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Bilinear => "bilinear",
            Self::FiveTap => "5-tap",
            Self::TenTap => "10-tap",
            Self::Smart => "smart",
            Self::Nicest => "nicest",
        }
    }

    fn from_property(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Integer(i) => usize::try_from(*i)
                .ok()
                .and_then(|i| Self::ALL.get(i).copied()),
            other => other.as_string().parse().ok(),
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterpolationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown interpolation method '{s}'")))
    }
}

/// Typed element settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilizeSettings {
    /// Fraction of each edge cropped away after stabilization.
    pub crop_margin: f64,
    /// Frames of look-ahead the stabilizer uses.
    pub queue_size: u32,
    /// Suppress per-frame logging.
    pub silent: bool,
    /// Scaling interpolation.
    pub interpolation: InterpolationMethod,
    /// Buffers in the hardware output pool.
    pub num_output_buffers: u32,
    /// Allocate NV12 output surfaces in block-linear layout.
    pub enable_blocklinear_output: bool,
}

impl Default for StabilizeSettings {
    fn default() -> Self {
        Self {
            crop_margin: 0.07,
            queue_size: 5,
            silent: false,
            interpolation: InterpolationMethod::default(),
            num_output_buffers: 4,
            enable_blocklinear_output: false,
        }
    }
}

impl StabilizeSettings {
    /// Names of every property, in declaration order.
    pub const PROPERTIES: [&'static str; 6] = [
        "crop-margin",
        "queue-size",
        "silent",
        "interpolation-method",
        "num-output-buffers",
        "enable-blocklinear-output",
    ];

    /// Depth of the frame-history ring.
    pub fn history_depth(&self) -> usize {
        (self.queue_size + HISTORY_SLACK) as usize
    }

    /// True when the stabilizer should crop.
    pub fn crops(&self) -> bool {
        self.crop_margin >= 0.0
    }

    /// Check every field against its domain.
    pub fn validate(&self) -> Result<()> {
        if !self.crop_margin.is_finite() || self.crop_margin >= MAX_CROP_MARGIN {
            return Err(Error::Config(format!(
                "crop-margin must be below {MAX_CROP_MARGIN}, got {}",
                self.crop_margin
            )));
        }
        if !(MIN_QUEUE_SIZE..=MAX_QUEUE_SIZE).contains(&self.queue_size) {
            return Err(Error::Config(format!(
                "queue-size must be in {MIN_QUEUE_SIZE}..={MAX_QUEUE_SIZE}, got {}",
                self.queue_size
            )));
        }
        if !(MIN_OUTPUT_BUFFERS..=MAX_OUTPUT_BUFFERS).contains(&self.num_output_buffers) {
            return Err(Error::Config(format!(
                "num-output-buffers must be in {MIN_OUTPUT_BUFFERS}..={MAX_OUTPUT_BUFFERS}, got {}",
                self.num_output_buffers
            )));
        }
        Ok(())
    }

    /// Set one property by name.
    ///
    /// An invalid name or value returns [`Error::Config`] and leaves the
    /// settings unchanged.
    pub fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        let mut next = self.clone();
        match name {
            "crop-margin" => next.crop_margin = value.as_f64().ok_or_else(|| invalid(name, &value))?,
            "queue-size" => next.queue_size = as_u32(name, &value)?,
            "silent" => next.silent = value.as_bool().ok_or_else(|| invalid(name, &value))?,
            "interpolation-method" => {
                next.interpolation =
                    InterpolationMethod::from_property(&value).ok_or_else(|| invalid(name, &value))?
            }
            "num-output-buffers" => next.num_output_buffers = as_u32(name, &value)?,
            "enable-blocklinear-output" => {
                next.enable_blocklinear_output =
                    value.as_bool().ok_or_else(|| invalid(name, &value))?
            }
            _ => return Err(Error::Config(format!("unknown property '{name}'"))),
        }
        next.validate().inspect_err(|e| {
            warn!(property = name, value = %value.as_string(), error = %e, "property rejected");
        })?;
        *self = next;
        Ok(())
    }

    /// Read one property by name.
    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        Some(match name {
            "crop-margin" => PropertyValue::Float(self.crop_margin),
            "queue-size" => PropertyValue::Integer(self.queue_size.into()),
            "silent" => PropertyValue::Bool(self.silent),
            "interpolation-method" => PropertyValue::String(self.interpolation.as_str().into()),
            "num-output-buffers" => PropertyValue::Integer(self.num_output_buffers.into()),
            "enable-blocklinear-output" => PropertyValue::Bool(self.enable_blocklinear_output),
            _ => return None,
        })
    }

    /// Build settings from `(name, value)` pairs, applied in order.
    pub fn from_properties<I, K>(properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, PropertyValue)>,
        K: AsRef<str>,
    {
        let mut settings = Self::default();
        for (name, value) in properties {
            settings.set_property(name.as_ref(), value)?;
        }
        Ok(settings)
    }
}

fn invalid(name: &str, value: &PropertyValue) -> Error {
    Error::Config(format!("invalid value '{}' for {name}", value.as_string()))
}

fn as_u32(name: &str, value: &PropertyValue) -> Result<u32> {
    value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| invalid(name, value))
}
