//! Aspect-ratio preserving fixation.
//!
//! Given a fixed input descriptor and a partially constrained output
//! descriptor, choose concrete output width, height and pixel-aspect-ratio
//! so that the display aspect ratio (DAR) of the input survives whenever the
//! output constraints allow it.
//!
//! ```text
//!   width  height  PAR     strategy
//!   fixed  fixed   *       pick the PAR nearest to DAR * h / w
//!   fixed  free    *       derive height (keeping input PAR if exact)
//!   free   fixed   *       derive width  (keeping input PAR if exact)
//!   free   free    fixed   keep input height, else input width, else nearest both
//!   free   free    free    keep input size and derive PAR, else re-derive w/h
//! ```
//!
//! All arithmetic is exact ([`Fraction`]). When no combination reproduces the
//! input DAR the result is still fully fixed and [`Fixation::dar_preserved`]
//! is false.

use super::error::NegotiationError;
use super::resolver::{PadDirection, open_par_range};
use crate::format::{
    Caps, CapsValue, Fraction, InterlaceMode, Nearness, VideoCaps, display_aspect_ratio,
    scale_exact, scale_round,
};
use tracing::{debug, warn};

/// Which branch of the cascade produced the result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FixationRule {
    /// Width and height were already fixed.
    SizeFixed,
    /// Only the width was fixed.
    WidthFixed,
    /// Only the height was fixed.
    HeightFixed,
    /// Only the pixel-aspect-ratio was fixed.
    ParFixed,
    /// Nothing was fixed.
    Free,
}

/// Outcome of [`fixate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fixation {
    /// The output descriptor with width, height and PAR fixed.
    pub caps: VideoCaps,
    /// True when the output DAR equals the input DAR exactly.
    pub dar_preserved: bool,
    /// Branch that produced the result.
    pub rule: FixationRule,
}

/// Fixate `output` against the fixed `input`.
///
/// `direction` is the pad `input` belongs to. Fixating the src side from the
/// sink side leaves an absent output PAR free; the other way round an absent
/// output PAR means square pixels.
pub fn fixate(
    direction: PadDirection,
    input: &VideoCaps,
    output: &VideoCaps,
) -> Result<Fixation, NegotiationError> {
    let from_w = *input
        .width
        .as_fixed()
        .ok_or_else(|| NegotiationError::cannot_fixate(input, "input width is not fixed"))?;
    let from_h = *input
        .height
        .as_fixed()
        .ok_or_else(|| NegotiationError::cannot_fixate(input, "input height is not fixed"))?;
    let from_par = input
        .pixel_aspect_ratio
        .as_fixed()
        .copied()
        .unwrap_or(Fraction::ONE);

    let mut out = output.clone();
    if out.pixel_aspect_ratio.is_any() {
        out.pixel_aspect_ratio = match direction {
            PadDirection::Sink => open_par_range(),
            PadDirection::Src => CapsValue::Fixed(Fraction::ONE),
        };
    }

    fixate_format(input, &mut out)?;
    if !out.interlace_mode.is_fixed() && !out.interlace_mode.is_any() {
        let preferred = input
            .interlace_mode
            .as_fixed()
            .copied()
            .unwrap_or(InterlaceMode::Progressive);
        if let Some(mode) = out.interlace_mode.fixate_preferring(&preferred) {
            out.interlace_mode = CapsValue::Fixed(mode);
        }
    }

    let dar = display_aspect_ratio(from_w, from_h, from_par).ok_or(NegotiationError::Overflow {
        what: "input display aspect ratio",
    })?;

    let solver = Solver {
        out: &out,
        dar,
        from_w,
        from_h,
        from_par,
    };

    let (rule, geometry) = match (out.width.as_fixed(), out.height.as_fixed()) {
        (Some(&w), Some(&h)) => (FixationRule::SizeFixed, solver.size_fixed(w, h)?),
        (Some(&w), None) => (FixationRule::WidthFixed, solver.width_fixed(w)?),
        (None, Some(&h)) => (FixationRule::HeightFixed, solver.height_fixed(h)?),
        (None, None) => match out.pixel_aspect_ratio.as_fixed() {
            Some(&par) => (FixationRule::ParFixed, solver.par_fixed(par)?),
            None => (FixationRule::Free, solver.free()?),
        },
    };

    let Geometry { width, height, par } = geometry;
    out.width = CapsValue::Fixed(width);
    out.height = CapsValue::Fixed(height);
    out.pixel_aspect_ratio = CapsValue::Fixed(par);

    let dar_preserved = display_aspect_ratio(width, height, par) == Some(dar);
    if dar_preserved {
        debug!(?rule, width, height, %par, %dar, "fixated output geometry");
    } else {
        warn!(
            ?rule,
            width,
            height,
            %par,
            %dar,
            "cannot keep display aspect ratio, proceeding with nearest geometry"
        );
    }

    Ok(Fixation {
        caps: out,
        dar_preserved,
        rule,
    })
}

/// Fixate the preferred entry of `candidates` against `input`.
///
/// The first hardware-resident entry wins; otherwise the first entry.
pub fn fixate_caps(
    direction: PadDirection,
    input: &VideoCaps,
    candidates: &Caps,
) -> Result<Fixation, NegotiationError> {
    let chosen = candidates
        .iter()
        .find(|c| c.is_hardware())
        .or_else(|| candidates.first())
        .ok_or_else(|| NegotiationError::no_common_format(&input.to_string(), "EMPTY"))?;
    fixate(direction, input, chosen)
}

fn fixate_format(input: &VideoCaps, out: &mut VideoCaps) -> Result<(), NegotiationError> {
    if out.format.is_fixed() {
        return Ok(());
    }
    let chosen = match (input.format.as_fixed(), out.format.is_any()) {
        (Some(layout), true) => Some(*layout),
        (Some(layout), false) => out.format.fixate_preferring(layout),
        (None, _) => out.format.fixate(),
    };
    let layout = chosen.ok_or_else(|| NegotiationError::cannot_fixate(&*out, "no output format"))?;
    out.format = CapsValue::Fixed(layout);
    Ok(())
}

#[derive(Clone, Copy, Debug)]
struct Geometry {
    width: u32,
    height: u32,
    par: Fraction,
}

struct Solver<'a> {
    out: &'a VideoCaps,
    dar: Fraction,
    from_w: u32,
    from_h: u32,
    from_par: Fraction,
}

fn nearest<T: Nearness + std::fmt::Debug>(
    value: &CapsValue<T>,
    target: &T,
    field: &str,
) -> Result<T, NegotiationError> {
    value.fixate_nearest(target).ok_or_else(|| {
        NegotiationError::cannot_fixate(format!("{value:?}"), format!("{field} has no candidates"))
    })
}

fn overflow(what: &'static str) -> NegotiationError {
    NegotiationError::Overflow { what }
}

/// `value * num / den` rounded, with a result below one clamped to one.
fn derive_dimension(
    value: u32,
    num: i32,
    den: i32,
    what: &'static str,
) -> Result<u32, NegotiationError> {
    if let Some(scaled) = scale_round(value, num, den) {
        return Ok(scaled);
    }
    let rounds_to_zero = num > 0 && den > 0 && {
        let d = den as u128;
        value as u128 * num as u128 + d / 2 < d
    };
    if rounds_to_zero { Ok(1) } else { Err(overflow(what)) }
}

impl Solver<'_> {
    fn nearest_width(&self, target: u32) -> Result<u32, NegotiationError> {
        nearest(&self.out.width, &target, "width")
    }

    fn nearest_height(&self, target: u32) -> Result<u32, NegotiationError> {
        nearest(&self.out.height, &target, "height")
    }

    fn nearest_par(&self, target: Fraction) -> Result<Fraction, NegotiationError> {
        nearest(&self.out.pixel_aspect_ratio, &target, "pixel-aspect-ratio")
    }

    /// PAR that shows `width`×`height` at the input DAR.
    fn par_for(&self, width: u32, height: u32) -> Option<Fraction> {
        self.dar
            .multiply(Fraction::from_i64(height as i64, width as i64)?)
    }

    /// Storage aspect ratio (w/h) that shows `par` at the input DAR.
    fn ratio_for(&self, par: Fraction) -> Result<Fraction, NegotiationError> {
        self.dar.divide(par).ok_or(overflow("width/height ratio"))
    }

    fn size_fixed(&self, width: u32, height: u32) -> Result<Geometry, NegotiationError> {
        let par = match self.out.pixel_aspect_ratio.as_fixed() {
            Some(&par) => par,
            None => {
                let target = self
                    .par_for(width, height)
                    .ok_or(overflow("pixel aspect ratio"))?;
                self.nearest_par(target)?
            }
        };
        Ok(Geometry { width, height, par })
    }

    fn width_fixed(&self, width: u32) -> Result<Geometry, NegotiationError> {
        if let Some(&par) = self.out.pixel_aspect_ratio.as_fixed() {
            let ratio = self.ratio_for(par)?;
            let target = derive_dimension(width, ratio.denom(), ratio.numer(), "output height")?;
            let height = self.nearest_height(target)?;
            return Ok(Geometry { width, height, par });
        }

        // Keep the input PAR when it gives an exact, acceptable height.
        let par = self.nearest_par(self.from_par)?;
        let ratio = self.ratio_for(par)?;
        if let Some(height) = scale_exact(width, ratio.denom(), ratio.numer())
            .filter(|h| self.out.height.accepts(h))
        {
            return Ok(Geometry { width, height, par });
        }

        // Keep the input height and let PAR absorb the difference.
        let height = self.nearest_height(self.from_h)?;
        if let Some(target) = self.par_for(width, height) {
            let par = self.nearest_par(target)?;
            if par == target {
                return Ok(Geometry { width, height, par });
            }
            let ratio = self.ratio_for(par)?;
            if let Some(h) = scale_round(width, ratio.denom(), ratio.numer()) {
                let height = self.nearest_height(h)?;
                return Ok(Geometry { width, height, par });
            }
        }
        Ok(Geometry { width, height, par })
    }

    fn height_fixed(&self, height: u32) -> Result<Geometry, NegotiationError> {
        if let Some(&par) = self.out.pixel_aspect_ratio.as_fixed() {
            let ratio = self.ratio_for(par)?;
            let target = derive_dimension(height, ratio.numer(), ratio.denom(), "output width")?;
            let width = self.nearest_width(target)?;
            return Ok(Geometry { width, height, par });
        }

        let par = self.nearest_par(self.from_par)?;
        let ratio = self.ratio_for(par)?;
        if let Some(width) = scale_exact(height, ratio.numer(), ratio.denom())
            .filter(|w| self.out.width.accepts(w))
        {
            return Ok(Geometry { width, height, par });
        }

        let width = self.nearest_width(self.from_w)?;
        if let Some(target) = self.par_for(width, height) {
            let par = self.nearest_par(target)?;
            if par == target {
                return Ok(Geometry { width, height, par });
            }
            let ratio = self.ratio_for(par)?;
            if let Some(w) = scale_round(height, ratio.numer(), ratio.denom()) {
                let width = self.nearest_width(w)?;
                return Ok(Geometry { width, height, par });
            }
        }
        Ok(Geometry { width, height, par })
    }

    fn par_fixed(&self, par: Fraction) -> Result<Geometry, NegotiationError> {
        let ratio = self.ratio_for(par)?;

        // Keep the input height, derive the width.
        let height = self.nearest_height(self.from_h)?;
        if let Some(target) = scale_round(height, ratio.numer(), ratio.denom()) {
            let width = self.nearest_width(target)?;
            if width == target {
                return Ok(Geometry { width, height, par });
            }
        }

        // Keep the input width, derive the height.
        let width = self.nearest_width(self.from_w)?;
        if let Some(target) = scale_round(width, ratio.denom(), ratio.numer()) {
            let h = self.nearest_height(target)?;
            if h == target {
                return Ok(Geometry {
                    width,
                    height: h,
                    par,
                });
            }
        }

        // Neither dimension can follow the other; take both independently.
        Ok(Geometry { width, height, par })
    }

    fn free(&self) -> Result<Geometry, NegotiationError> {
        let height = self.nearest_height(self.from_h)?;
        let width = self.nearest_width(self.from_w)?;

        let target = self.par_for(width, height);
        let par = match target {
            Some(t) => self.nearest_par(t)?,
            None => self.nearest_par(self.from_par)?,
        };
        if Some(par) == target {
            return Ok(Geometry { width, height, par });
        }

        let ratio = self.ratio_for(par)?;
        if let Some(t) = scale_round(height, ratio.numer(), ratio.denom()) {
            let w = self.nearest_width(t)?;
            if w == t {
                return Ok(Geometry {
                    width: w,
                    height,
                    par,
                });
            }
        }
        if let Some(t) = scale_round(width, ratio.denom(), ratio.numer()) {
            let h = self.nearest_height(t)?;
            if h == t {
                return Ok(Geometry {
                    width,
                    height: h,
                    par,
                });
            }
        }
        Ok(Geometry { width, height, par })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{MAX_DIMENSION, PixelLayout};
    use crate::negotiation::resolver::{transform_caps, widen};

    fn par(n: i32, d: i32) -> Fraction {
        Fraction::new(n, d).unwrap()
    }

    fn input(w: u32, h: u32, p: Fraction) -> VideoCaps {
        VideoCaps::fixed(PixelLayout::I420, w, h, p)
    }

    fn open_output() -> VideoCaps {
        widen(&Caps::single(input(1, 1, par(1, 1))))
            .first()
            .cloned()
            .unwrap()
    }

    fn geometry(f: &Fixation) -> (u32, u32, Fraction) {
        let v = f.caps.fixed_video().unwrap();
        (v.width, v.height, v.par)
    }

    #[test]
    fn test_free_output_keeps_input_geometry() {
        let f = fixate(PadDirection::Sink, &input(1920, 1080, par(1, 1)), &open_output()).unwrap();
        assert_eq!(geometry(&f), (1920, 1080, par(1, 1)));
        assert_eq!(f.caps.format, CapsValue::Fixed(PixelLayout::I420));
        assert_eq!(f.rule, FixationRule::Free);
        assert!(f.dar_preserved);
    }

    #[test]
    fn test_width_fixed_derives_height() {
        let out = open_output().with_width(640);
        let f = fixate(PadDirection::Sink, &input(1280, 720, par(1, 1)), &out).unwrap();
        assert_eq!(geometry(&f), (640, 360, par(1, 1)));
        assert_eq!(f.rule, FixationRule::WidthFixed);
        assert!(f.dar_preserved);
    }

    #[test]
    fn test_width_fixed_with_fixed_par() {
        let out = open_output().with_width(720).with_par(par(16, 15));
        let f = fixate(PadDirection::Sink, &input(640, 480, par(1, 1)), &out).unwrap();
        assert_eq!(geometry(&f), (720, 576, par(16, 15)));
        assert!(f.dar_preserved);

        let out = open_output().with_width(1000).with_par(par(1, 1));
        let f = fixate(PadDirection::Sink, &input(1920, 1080, par(1, 1)), &out).unwrap();
        // 1000 * 9 / 16 = 562.5, rounded up.
        assert_eq!(geometry(&f), (1000, 563, par(1, 1)));
        assert!(!f.dar_preserved);
    }

    #[test]
    fn test_fixed_par_clamps_vanishing_dimension() {
        let out = open_output().with_width(1).with_par(par(1, 1));
        let f = fixate(PadDirection::Sink, &input(1000, 2, par(1, 1)), &out).unwrap();
        assert_eq!(geometry(&f), (1, 1, par(1, 1)));

        let out = open_output().with_height(1).with_par(par(1, 1));
        let f = fixate(PadDirection::Sink, &input(2, 1000, par(1, 1)), &out).unwrap();
        assert_eq!(geometry(&f), (1, 1, par(1, 1)));
    }

    #[test]
    fn test_size_fixed_derives_par() {
        let out = open_output().with_width(640).with_height(720);
        let f = fixate(PadDirection::Sink, &input(1280, 720, par(1, 1)), &out).unwrap();
        assert_eq!(geometry(&f), (640, 720, par(2, 1)));
        assert_eq!(f.rule, FixationRule::SizeFixed);
        assert!(f.dar_preserved);
    }

    #[test]
    fn test_width_fixed_inexact_height_uses_par() {
        // 1000 * 9/16 = 562.5, not exact: keep height 1080 and solve PAR.
        let out = open_output().with_width(1000);
        let f = fixate(PadDirection::Sink, &input(1920, 1080, par(1, 1)), &out).unwrap();
        assert_eq!(geometry(&f), (1000, 1080, par(48, 25)));
        assert!(f.dar_preserved);
    }

    #[test]
    fn test_height_fixed_derives_width() {
        let out = open_output().with_height(480);
        let f = fixate(PadDirection::Sink, &input(1920, 1080, par(1, 1)), &out).unwrap();
        // 480 * 16 / 9 is not whole: keep the input width and squeeze pixels.
        assert_eq!(geometry(&f), (1920, 480, par(4, 9)));
        assert!(f.dar_preserved);

        let out = open_output().with_height(480).with_width(1..=1280);
        let f = fixate(PadDirection::Sink, &input(720, 576, par(16, 15)), &out).unwrap();
        assert_eq!(geometry(&f), (600, 480, par(16, 15)));
    }

    #[test]
    fn test_height_fixed_exact() {
        let out = open_output().with_height(360);
        let f = fixate(PadDirection::Sink, &input(1280, 720, par(1, 1)), &out).unwrap();
        assert_eq!(geometry(&f), (640, 360, par(1, 1)));
        assert_eq!(f.rule, FixationRule::HeightFixed);
    }

    #[test]
    fn test_src_direction_defaults_par_to_square() {
        let mut out = open_output();
        out.pixel_aspect_ratio = CapsValue::Any;
        let f = fixate(PadDirection::Src, &input(720, 576, par(16, 15)), &out).unwrap();
        // DAR 4/3 with square pixels: keep height 576, width 768.
        assert_eq!(geometry(&f), (768, 576, par(1, 1)));
        assert_eq!(f.rule, FixationRule::ParFixed);
        assert!(f.dar_preserved);
    }

    #[test]
    fn test_par_fixed_falls_back_to_width() {
        let out = open_output()
            .with_height(1..=500)
            .with_par(par(1, 1));
        let f = fixate(PadDirection::Sink, &input(640, 480, par(1, 1)), &out).unwrap();
        assert_eq!(geometry(&f), (640, 480, par(1, 1)));

        let out = open_output()
            .with_height(1..=400)
            .with_width(1..=MAX_DIMENSION)
            .with_par(par(1, 1));
        let f = fixate(PadDirection::Sink, &input(640, 480, par(1, 1)), &out).unwrap();
        // Height clamps to 400, width follows: 533.
        assert_eq!(geometry(&f), (533, 400, par(1, 1)));
    }

    #[test]
    fn test_par_fixed_degraded_is_flagged_not_fatal() {
        let out = open_output()
            .with_width(vec![100, 2000])
            .with_height(vec![100, 2000])
            .with_par(par(1, 1));
        let f = fixate(PadDirection::Sink, &input(1920, 1080, par(1, 1)), &out).unwrap();
        assert_eq!(geometry(&f), (2000, 2000, par(1, 1)));
        assert!(!f.dar_preserved);
        assert_eq!(f.rule, FixationRule::ParFixed);
    }

    #[test]
    fn test_free_with_par_list_rederives_width() {
        let out = open_output()
            .with_width(1..=1280)
            .with_par(vec![par(1, 1), par(2, 1)]);
        let f = fixate(PadDirection::Sink, &input(1920, 1080, par(1, 1)), &out).unwrap();
        // 3/2 is not offered and 1/1 wins the tie; the width cannot follow
        // the height, so the height follows the width.
        assert_eq!(geometry(&f), (1280, 720, par(1, 1)));
        assert!(f.dar_preserved);
    }

    #[test]
    fn test_fixation_is_idempotent() {
        let cases = [
            (input(1920, 1080, par(1, 1)), open_output()),
            (input(1280, 720, par(1, 1)), open_output().with_width(640)),
            (input(720, 576, par(16, 15)), open_output().with_height(480)),
            (
                input(640, 480, par(1, 1)),
                open_output().with_width(vec![100, 2000]).with_par(par(1, 1)),
            ),
        ];
        for (inp, out) in cases {
            let first = fixate(PadDirection::Sink, &inp, &out).unwrap();
            let second = fixate(PadDirection::Sink, &inp, &first.caps).unwrap();
            assert_eq!(first.caps, second.caps);
        }
    }

    #[test]
    fn test_fixate_format_prefers_input() {
        let out = open_output().with_format(vec![PixelLayout::Nv12, PixelLayout::I420]);
        let f = fixate(PadDirection::Sink, &input(64, 64, par(1, 1)), &out).unwrap();
        assert_eq!(f.caps.format, CapsValue::Fixed(PixelLayout::I420));

        let out = open_output().with_format(vec![PixelLayout::Nv12, PixelLayout::Rgba]);
        let f = fixate(PadDirection::Sink, &input(64, 64, par(1, 1)), &out).unwrap();
        assert_eq!(f.caps.format, CapsValue::Fixed(PixelLayout::Nv12));
    }

    #[test]
    fn test_unfixed_input_is_refused() {
        let inp = VideoCaps::host().with_format(PixelLayout::I420);
        assert!(matches!(
            fixate(PadDirection::Sink, &inp, &open_output()),
            Err(NegotiationError::CannotFixate { .. })
        ));
    }

    #[test]
    fn test_fixate_caps_prefers_hardware_entry() {
        let inp = input(1280, 720, par(1, 1));
        let candidates = transform_caps(PadDirection::Sink, &Caps::single(inp.clone()), None);
        let f = fixate_caps(PadDirection::Sink, &inp, &candidates).unwrap();
        assert!(f.caps.is_hardware());
        assert!(fixate_caps(PadDirection::Sink, &inp, &Caps::new_empty()).is_err());
    }
}
