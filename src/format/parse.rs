//! Caps string parser using winnow.
//!
//! Parses GStreamer-like capability descriptions:
//!
//! ```text
//! video/x-raw(memory:NVMM), format=(string){ NV12, RGBA }, width=(int)[ 1, 2147483647 ]
//! video/x-raw, format=I420, width=1280, height=720, pixel-aspect-ratio=1/1
//! ```
//!
//! # Syntax
//!
//! - Descriptors are separated by `;`, fields by `,`
//! - An optional `(feature)` after the media type selects memory residency
//! - Values may carry a `(type)` annotation, which is accepted and ignored
//! - `{ a, b }` is a list, `[ lo, hi ]` an inclusive range
//! - `EMPTY` is the empty set

use super::caps::{Caps, HARDWARE_FEATURE, InterlaceMode, MemoryResidency, VideoCaps};
use super::fraction::Fraction;
use super::pixel::PixelLayout;
use super::value::CapsValue;
use crate::negotiation::NegotiationError;
use std::str::FromStr;
use winnow::Parser;
use winnow::ascii::multispace0;
use winnow::combinator::{alt, delimited, opt, preceded, repeat, separated};
use winnow::error::ContextError;
use winnow::token::{take_till, take_while};

type WResult<T> = std::result::Result<T, ContextError>;

#[derive(Debug, Clone, PartialEq)]
enum RawValue {
    Scalar(String),
    List(Vec<String>),
    Range(String, String),
}

#[derive(Debug)]
struct RawStructure {
    media: String,
    feature: Option<String>,
    fields: Vec<(String, RawValue)>,
}

/// Parse a token: anything up to whitespace or a delimiter.
fn token<'a>(input: &mut &'a str) -> WResult<&'a str> {
    take_while(1.., |c: char| {
        !c.is_whitespace() && !matches!(c, ',' | ';' | '{' | '}' | '[' | ']' | '(' | ')' | '=' | '"')
    })
    .parse_next(input)
}

/// Parse a double-quoted string.
fn quoted<'a>(input: &mut &'a str) -> WResult<&'a str> {
    delimited('"', take_till(0.., '"'), '"').parse_next(input)
}

/// Parse a scalar value, trimming surrounding whitespace.
fn scalar(input: &mut &str) -> WResult<String> {
    delimited(multispace0, alt((quoted, token)), multispace0)
        .map(str::to_string)
        .parse_next(input)
}

/// Parse `{ a, b, c }`.
fn list(input: &mut &str) -> WResult<Vec<String>> {
    delimited('{', separated(1.., scalar, ','), '}').parse_next(input)
}

/// Parse `[ lo, hi ]`.
fn range(input: &mut &str) -> WResult<(String, String)> {
    delimited('[', (scalar, preceded(',', scalar)), ']').parse_next(input)
}

/// Parse one field value.
fn value(input: &mut &str) -> WResult<RawValue> {
    let _ = opt(delimited('(', token, ')')).parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    alt((
        list.map(RawValue::List),
        range.map(|(lo, hi)| RawValue::Range(lo, hi)),
        scalar.map(RawValue::Scalar),
    ))
    .parse_next(input)
}

/// Parse `name=value`.
fn field(input: &mut &str) -> WResult<(String, RawValue)> {
    let _ = multispace0.parse_next(input)?;
    let name = token.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let _ = '='.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let value = value.parse_next(input)?;
    Ok((name.to_string(), value))
}

/// Parse one descriptor.
fn structure(input: &mut &str) -> WResult<RawStructure> {
    let _ = multispace0.parse_next(input)?;
    let media = token.parse_next(input)?;
    let feature = opt(delimited('(', take_till(1.., ')'), ')')).parse_next(input)?;
    let fields: Vec<(String, RawValue)> =
        repeat(0.., preceded((multispace0, ','), field)).parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    Ok(RawStructure {
        media: media.to_string(),
        feature: feature.map(|f: &str| f.trim().to_string()),
        fields,
    })
}

/// Parse a whole capability set.
fn caps_set(input: &mut &str) -> WResult<Vec<RawStructure>> {
    separated(1.., structure, ';').parse_next(input)
}

fn invalid(caps: &str, reason: impl Into<String>) -> NegotiationError {
    NegotiationError::InvalidCaps {
        caps: caps.to_string(),
        reason: reason.into(),
    }
}

fn typed<T>(raw: RawValue) -> Result<CapsValue<T>, String>
where
    T: FromStr + Clone + Ord,
    T::Err: std::fmt::Display,
{
    let one = |s: &str| s.parse::<T>().map_err(|e| format!("{s:?}: {e}"));
    match raw {
        RawValue::Scalar(s) => Ok(CapsValue::Fixed(one(&s)?)),
        RawValue::List(items) => {
            let values = items
                .iter()
                .map(|s| one(s))
                .collect::<Result<Vec<T>, String>>()?;
            Ok(values.into())
        }
        RawValue::Range(lo, hi) => {
            let (min, max) = (one(&lo)?, one(&hi)?);
            if min > max {
                return Err(format!("empty range [{lo}, {hi}]"));
            }
            Ok(CapsValue::Range { min, max })
        }
    }
}

fn build(source: &str, raw: RawStructure) -> Result<VideoCaps, NegotiationError> {
    if raw.media != "video/x-raw" {
        return Err(invalid(source, format!("unsupported media type {}", raw.media)));
    }
    let residency = match raw.feature.as_deref() {
        None | Some("memory:SystemMemory") => MemoryResidency::Host,
        Some(HARDWARE_FEATURE) => MemoryResidency::Hardware,
        Some(other) => return Err(invalid(source, format!("unknown caps feature {other}"))),
    };

    let mut caps = VideoCaps::new(residency);
    for (name, value) in raw.fields {
        let result = match name.as_str() {
            "format" => typed::<PixelLayout>(value).map(|v| caps.format = v),
            "width" => typed::<u32>(value).map(|v| caps.width = v),
            "height" => typed::<u32>(value).map(|v| caps.height = v),
            "pixel-aspect-ratio" => typed::<Fraction>(value).map(|v| caps.pixel_aspect_ratio = v),
            "interlace-mode" => typed::<InterlaceMode>(value).map(|v| caps.interlace_mode = v),
            "colorimetry" | "chroma-site" => match value {
                RawValue::Scalar(s) => {
                    if name == "colorimetry" {
                        caps.colorimetry = Some(s);
                    } else {
                        caps.chroma_site = Some(s);
                    }
                    Ok(())
                }
                _ => Err(format!("{name} must be a single string")),
            },
            other => Err(format!("unknown field {other}")),
        };
        result.map_err(|reason| invalid(source, reason))?;
    }
    Ok(caps)
}

impl FromStr for Caps {
    type Err = NegotiationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == "EMPTY" {
            return Ok(Caps::new_empty());
        }
        let structures = caps_set
            .parse(trimmed)
            .map_err(|e| invalid(s, format!("parse error: {e}")))?;
        structures.into_iter().map(|raw| build(s, raw)).collect()
    }
}

impl FromStr for VideoCaps {
    type Err = NegotiationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps: Caps = s.parse()?;
        match caps.len() {
            1 => caps
                .first()
                .cloned()
                .ok_or_else(|| invalid(s, "expected one descriptor")),
            n => Err(invalid(s, format!("expected one descriptor, found {n}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::MAX_DIMENSION;

    #[test]
    fn test_parse_simple() {
        let caps: VideoCaps = "video/x-raw, format=I420, width=1280, height=720, pixel-aspect-ratio=1/1"
            .parse()
            .unwrap();
        assert_eq!(caps.residency, MemoryResidency::Host);
        assert_eq!(caps.format, CapsValue::Fixed(PixelLayout::I420));
        assert_eq!(caps.width, CapsValue::Fixed(1280));
        assert_eq!(caps.pixel_aspect_ratio, CapsValue::Fixed(Fraction::ONE));
    }

    #[test]
    fn test_parse_feature_list_and_range() {
        let caps: VideoCaps =
            "video/x-raw(memory:NVMM), format=(string){ NV12, RGBA, YUY2 }, width=(int)[ 1, 2147483647 ]"
                .parse()
                .unwrap();
        assert!(caps.is_hardware());
        assert_eq!(
            caps.format,
            CapsValue::List(vec![PixelLayout::Nv12, PixelLayout::Rgba, PixelLayout::Yuy2])
        );
        assert_eq!(
            caps.width,
            CapsValue::Range {
                min: 1,
                max: MAX_DIMENSION
            }
        );
        assert!(caps.height.is_any());
    }

    #[test]
    fn test_parse_multiple_structures() {
        let caps: Caps = "video/x-raw(memory:NVMM), format=NV12; video/x-raw, format=I420"
            .parse()
            .unwrap();
        assert_eq!(caps.len(), 2);
        assert!(caps.get(0).unwrap().is_hardware());
        assert!(!caps.get(1).unwrap().is_hardware());
    }

    #[test]
    fn test_parse_opaque_fields() {
        let caps: VideoCaps =
            "video/x-raw, colorimetry=bt709, chroma-site=mpeg2, interlace-mode=progressive"
                .parse()
                .unwrap();
        assert_eq!(caps.colorimetry.as_deref(), Some("bt709"));
        assert_eq!(caps.chroma_site.as_deref(), Some("mpeg2"));
        assert_eq!(caps.interlace_mode, CapsValue::Fixed(InterlaceMode::Progressive));
    }

    #[test]
    fn test_round_trip() {
        let text = "video/x-raw(memory:NVMM), format=(string){ NV12, RGBA }, \
                    width=(int)[ 1, 2147483647 ], height=(int)720, \
                    pixel-aspect-ratio=(fraction)[ 1/2147483647, 2147483647/1 ]; \
                    video/x-raw, format=(string)I420, width=(int)640";
        let caps: Caps = text.parse().unwrap();
        let again: Caps = caps.to_string().parse().unwrap();
        assert_eq!(caps, again);
    }

    #[test]
    fn test_parse_errors() {
        assert!("audio/x-raw, rate=48000".parse::<Caps>().is_err());
        assert!("video/x-raw, framerate=30/1".parse::<Caps>().is_err());
        assert!("video/x-raw(memory:DMABuf)".parse::<Caps>().is_err());
        assert!("video/x-raw, width=[ 10, 5 ]".parse::<Caps>().is_err());
        assert!("video/x-raw, format=NOPE".parse::<Caps>().is_err());
        assert!("video/x-raw, width=".parse::<Caps>().is_err());
        assert!("".parse::<Caps>().is_err());
    }

    #[test]
    fn test_parse_empty() {
        assert!("EMPTY".parse::<Caps>().unwrap().is_empty());
    }
}
