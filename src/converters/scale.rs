//! Video scaling (resolution conversion).
//!
//! Scales packed host frames plane by plane, driven by the descriptor's
//! plane table. Packed 4:2:2 layouts are scaled in whole macropixels so
//! luma and chroma stay paired.

use crate::config::InterpolationMethod;
use crate::error::{Error, Result};
use crate::format::{ColorFamily, PixelFormatDescriptor};

use super::planes::{PlaneGeometry, plane_layout, unit_size};

/// Scaling algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleAlgorithm {
    /// Nearest neighbor - fastest, pixelated results.
    NearestNeighbor,
    /// Bilinear interpolation - good quality/speed balance.
    #[default]
    Bilinear,
}

impl From<InterpolationMethod> for ScaleAlgorithm {
    fn from(method: InterpolationMethod) -> Self {
        match method {
            InterpolationMethod::Nearest => Self::NearestNeighbor,
            // The multi-tap filters are device features; bilinear is the
            // closest host rendition.
            _ => Self::Bilinear,
        }
    }
}

/// Video scaler.
///
/// Scales video frames of one layout between two resolutions.
#[derive(Debug, Clone)]
pub struct VideoScale {
    input_width: u32,
    input_height: u32,
    output_width: u32,
    output_height: u32,
    format: &'static PixelFormatDescriptor,
    algorithm: ScaleAlgorithm,
}

impl VideoScale {
    /// Create a new video scaler.
    pub fn new(
        format: &'static PixelFormatDescriptor,
        input_width: u32,
        input_height: u32,
        output_width: u32,
        output_height: u32,
    ) -> Result<Self> {
        if input_width == 0 || input_height == 0 || output_width == 0 || output_height == 0 {
            return Err(Error::Config("Dimensions must be non-zero".into()));
        }

        Ok(Self {
            input_width,
            input_height,
            output_width,
            output_height,
            format,
            algorithm: ScaleAlgorithm::default(),
        })
    }

    /// Set the scaling algorithm.
    pub fn with_algorithm(mut self, algorithm: ScaleAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Get the algorithm in use.
    pub fn algorithm(&self) -> ScaleAlgorithm {
        self.algorithm
    }

    /// Get the required input buffer size.
    pub fn input_size(&self) -> usize {
        unit_size(self.format, self.input_width, self.input_height)
    }

    /// Get the required output buffer size.
    pub fn output_size(&self) -> usize {
        unit_size(self.format, self.output_width, self.output_height)
    }

    /// Scale a frame.
    ///
    /// Both buffers are checked before any plane is written.
    pub fn scale(&self, input: &[u8], output: &mut [u8]) -> Result<()> {
        let in_planes = plane_layout(self.format, self.input_width, self.input_height);
        let out_planes = plane_layout(self.format, self.output_width, self.output_height);

        for (i, (src, dst)) in in_planes.iter().zip(&out_planes).enumerate() {
            if src.range().end > input.len() {
                return Err(Error::plane(
                    i,
                    format!("Input buffer too small: {} < {}", input.len(), src.range().end),
                ));
            }
            if dst.range().end > output.len() {
                return Err(Error::plane(
                    i,
                    format!("Output buffer too small: {} < {}", output.len(), dst.range().end),
                ));
            }
        }

        for (src, dst) in in_planes.iter().zip(&out_planes) {
            let (in_w, out_w, channels) = self.sample_grid(src, dst);
            self.scale_plane(
                &input[src.range()],
                in_w,
                src.height as usize,
                &mut output[dst.range()],
                out_w,
                dst.height as usize,
                channels,
            );
        }

        Ok(())
    }

    /// Width in scaling units and bytes per unit for one plane.
    fn sample_grid(&self, src: &PlaneGeometry, dst: &PlaneGeometry) -> (usize, usize, usize) {
        let bps = src.bytes_per_sample as usize;
        if self.is_packed_422() {
            // Y0 U Y1 V: 4 bytes per 2 pixels
            (src.width as usize / 2, dst.width as usize / 2, bps * 2)
        } else {
            (src.width as usize, dst.width as usize, bps)
        }
    }

    fn is_packed_422(&self) -> bool {
        self.format.family == ColorFamily::Yuv && self.format.plane_count() == 1
    }

    /// Scale one tightly packed plane with `channels` bytes per unit.
    #[allow(clippy::too_many_arguments)]
    fn scale_plane(
        &self,
        input: &[u8],
        in_w: usize,
        in_h: usize,
        output: &mut [u8],
        out_w: usize,
        out_h: usize,
        channels: usize,
    ) {
        if in_w == 0 || in_h == 0 || out_w == 0 || out_h == 0 {
            return;
        }

        match self.algorithm {
            ScaleAlgorithm::NearestNeighbor => {
                for out_y in 0..out_h {
                    let in_y = (out_y * in_h / out_h).min(in_h - 1);

                    for out_x in 0..out_w {
                        let in_x = (out_x * in_w / out_w).min(in_w - 1);

                        let src_offset = (in_y * in_w + in_x) * channels;
                        let dst_offset = (out_y * out_w + out_x) * channels;

                        output[dst_offset..dst_offset + channels]
                            .copy_from_slice(&input[src_offset..src_offset + channels]);
                    }
                }
            }
            ScaleAlgorithm::Bilinear => {
                let x_ratio = (in_w as f32 - 1.0) / (out_w as f32).max(1.0);
                let y_ratio = (in_h as f32 - 1.0) / (out_h as f32).max(1.0);

                for out_y in 0..out_h {
                    let src_y = out_y as f32 * y_ratio;
                    let y0 = src_y.floor() as usize;
                    let y1 = (y0 + 1).min(in_h - 1);
                    let y_frac = src_y - y0 as f32;

                    for out_x in 0..out_w {
                        let src_x = out_x as f32 * x_ratio;
                        let x0 = src_x.floor() as usize;
                        let x1 = (x0 + 1).min(in_w - 1);
                        let x_frac = src_x - x0 as f32;

                        for c in 0..channels {
                            let p00 = input[(y0 * in_w + x0) * channels + c] as f32;
                            let p10 = input[(y0 * in_w + x1) * channels + c] as f32;
                            let p01 = input[(y1 * in_w + x0) * channels + c] as f32;
                            let p11 = input[(y1 * in_w + x1) * channels + c] as f32;

                            let top = p00 + x_frac * (p10 - p00);
                            let bottom = p01 + x_frac * (p11 - p01);
                            let value = top + y_frac * (bottom - top);

                            output[(out_y * out_w + out_x) * channels + c] = value.round() as u8;
                        }
                    }
                }
            }
        }
    }
}
