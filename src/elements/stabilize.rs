//! The stabilizing video transform.
//!
//! `Stabilize` negotiates an output geometry that keeps the input display
//! aspect ratio, renders every input frame at that geometry, feeds it to a
//! [`Stabilizer`](crate::stabilizer::Stabilizer), and writes the frame the
//! stabilizer publishes into a host buffer or a pooled hardware surface.
//!
//! ```text
//! input ──► download? ──► copy / scale / gray→YUV ──► StabilizerSession
//!                                                            │
//! output ◄── upload or host copy ◄── stabilized frame ◄──────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use parallax_stabilize::buffer::Buffer;
//! use parallax_stabilize::element::{BaseTransform, negotiate};
//! use parallax_stabilize::elements::Stabilize;
//! use parallax_stabilize::format::{Caps, VideoCaps};
//! use parallax_stabilize::memory::HostDevice;
//! use parallax_stabilize::metadata::Metadata;
//! use std::sync::Arc;
//!
//! let mut element = Stabilize::new(Arc::new(HostDevice::new()));
//! let input: VideoCaps = "video/x-raw, format=GRAY8, width=8, height=8, pixel-aspect-ratio=1/1"
//!     .parse()
//!     .unwrap();
//! let downstream: Caps = "video/x-raw, format=GRAY8, width=4".parse().unwrap();
//!
//! let output = negotiate(&mut element, &input, Some(&downstream)).unwrap();
//! assert_eq!(output.fixed_video().unwrap().height, 4);
//!
//! element.start().unwrap();
//! let out = element.process(Buffer::host(vec![9u8; 64], Metadata::with_sequence(0))).unwrap();
//! assert_eq!(out.as_host().unwrap(), &[9u8; 16][..]);
//! ```

use crate::buffer::Buffer;
use crate::config::{PropertyValue, StabilizeSettings};
use crate::converters::{
    VideoScale, clear_chroma_host, download, plane_layout, unit_size, upload,
};
use crate::element::{
    AllocationDecision, AllocationQuery, BaseTransform, NegotiationContext, NegotiationState,
    StateChange,
};
use crate::error::Error;
use crate::format::{
    Caps, ColorFamily, Fraction, MemoryResidency, PixelFormatDescriptor, PixelLayout, VideoCaps,
    display_aspect_ratio, lookup,
};
use crate::memory::HardwareDevice;
use crate::negotiation::{
    Fixation, NegotiationError, PadDirection, accept_caps, fixate_caps, transform_caps,
};
use crate::observability::{FrameMetrics, TracingConfig, record_negotiation};
use crate::stabilizer::{
    IdentityFactory, StabilizerError, StabilizerFactory, StabilizerParams, StabilizerSession,
    VideoFrame,
};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

// ============================================================================
// Errors
// ============================================================================

/// Per-frame and negotiation failures of the element.
#[derive(Error, Debug)]
pub enum FlowError {
    /// A frame arrived before caps were negotiated.
    #[error("not negotiated")]
    NotNegotiated,

    /// A buffer's memory is not what the negotiated caps promised.
    #[error("failed to map {0} buffer")]
    MapFailed(&'static str),

    /// Copying one plane failed; the frame is not published.
    #[error("plane {plane} copy failed: {reason}")]
    PlaneCopy {
        /// Index of the failing plane.
        plane: usize,
        /// What went wrong.
        reason: String,
    },

    /// No render path between the negotiated layouts.
    #[error("cannot convert {from} to {to}")]
    UnsupportedConversion {
        /// Input layout.
        from: PixelLayout,
        /// Output layout.
        to: PixelLayout,
    },

    /// The stabilizer failed.
    #[error(transparent)]
    Stabilizer(#[from] StabilizerError),

    /// Pool, device or negotiation failure.
    #[error(transparent)]
    Error(Error),
}

impl From<Error> for FlowError {
    fn from(e: Error) -> Self {
        match e {
            Error::PlaneCopy { plane, reason } => Self::PlaneCopy { plane, reason },
            other => Self::Error(other),
        }
    }
}

impl From<NegotiationError> for FlowError {
    fn from(e: NegotiationError) -> Self {
        Self::Error(Error::Negotiation(e))
    }
}

// ============================================================================
// Negotiated geometry
// ============================================================================

/// What `set_caps` settled on; read by every frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegotiatedGeometry {
    /// Input width.
    pub from_width: u32,
    /// Input height.
    pub from_height: u32,
    /// Output width.
    pub to_width: u32,
    /// Output height.
    pub to_height: u32,
    /// Input layout.
    pub in_format: &'static PixelFormatDescriptor,
    /// Output layout.
    pub out_format: &'static PixelFormatDescriptor,
    /// Output pixel aspect ratio.
    pub pixel_aspect_ratio: Fraction,
    /// Output size differs from input size.
    pub requires_scaling: bool,
    /// The device path needs an intermediate surface for this input.
    pub requires_intermediate_surface: bool,
    /// Input memory.
    pub in_residency: MemoryResidency,
    /// Output memory.
    pub out_residency: MemoryResidency,
    /// Output DAR equals input DAR.
    pub dar_preserved: bool,
}

impl NegotiatedGeometry {
    /// Derive the geometry for fixed `incaps` and `outcaps`.
    pub fn from_caps(incaps: &VideoCaps, outcaps: &VideoCaps) -> Result<Self, NegotiationError> {
        let input = incaps.fixed_video()?;
        let output = outcaps.fixed_video()?;
        let in_format = lookup(input.layout)?;
        let out_format = lookup(output.layout)?;

        let requires_scaling = (input.width, input.height) != (output.width, output.height);
        let from_dar = display_aspect_ratio(input.width, input.height, input.par);
        let to_dar = display_aspect_ratio(output.width, output.height, output.par);
        let dar_preserved = from_dar.is_some() && from_dar == to_dar;

        Ok(Self {
            from_width: input.width,
            from_height: input.height,
            to_width: output.width,
            to_height: output.height,
            in_format,
            out_format,
            pixel_aspect_ratio: output.par,
            requires_scaling,
            requires_intermediate_surface: needs_intermediate(in_format.layout, requires_scaling),
            in_residency: input.residency,
            out_residency: output.residency,
            dar_preserved,
        })
    }

    /// Bytes of one packed input frame.
    pub fn input_size(&self) -> usize {
        unit_size(self.in_format, self.from_width, self.from_height)
    }

    /// Bytes of one packed output frame.
    pub fn output_size(&self) -> usize {
        unit_size(self.out_format, self.to_width, self.to_height)
    }
}

fn needs_intermediate(layout: PixelLayout, requires_scaling: bool) -> bool {
    match layout {
        PixelLayout::Nv12 | PixelLayout::Bgrx | PixelLayout::Rgba => true,
        PixelLayout::I420 => requires_scaling,
        _ => false,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Conversion {
    Copy,
    Scale,
    GrayToYuv,
}

fn conversion(geometry: &NegotiatedGeometry) -> Result<Conversion, FlowError> {
    let (from, to) = (geometry.in_format, geometry.out_format);
    if from.layout == to.layout {
        return Ok(if geometry.requires_scaling {
            Conversion::Scale
        } else {
            Conversion::Copy
        });
    }
    if from.family == ColorFamily::Gray && to.has_chroma() && to.plane_count() > 1 {
        return Ok(Conversion::GrayToYuv);
    }
    Err(FlowError::UnsupportedConversion {
        from: from.layout,
        to: to.layout,
    })
}

fn check_frame_len(
    desc: &PixelFormatDescriptor,
    width: u32,
    height: u32,
    len: usize,
) -> Result<(), FlowError> {
    match plane_layout(desc, width, height)
        .iter()
        .position(|p| p.range().end > len)
    {
        Some(plane) => Err(FlowError::PlaneCopy {
            plane,
            reason: format!("host frame of {len} bytes is too short for {width}x{height} {}", desc.layout),
        }),
        None => Ok(()),
    }
}

// ============================================================================
// Element
// ============================================================================

/// Video stabilization transform.
pub struct Stabilize {
    name: String,
    settings: StabilizeSettings,
    context: Arc<NegotiationContext>,
    factory: Arc<dyn StabilizerFactory>,
    state: NegotiationState,
    geometry: Option<NegotiatedGeometry>,
    scaler: Option<VideoScale>,
    session: Option<StabilizerSession>,
    spare: Option<Vec<u8>>,
    metrics: FrameMetrics,
    tracing: TracingConfig,
}

impl Stabilize {
    /// Create an element on `device` with the delay-line stabilizer.
    pub fn new(device: Arc<dyn HardwareDevice>) -> Self {
        Self::with_context(
            "stabilize0",
            Arc::new(NegotiationContext::new(device)),
            Arc::new(IdentityFactory),
        )
    }

    /// Create an element sharing `context`, building stabilizers with `factory`.
    pub fn with_context(
        name: impl Into<String>,
        context: Arc<NegotiationContext>,
        factory: Arc<dyn StabilizerFactory>,
    ) -> Self {
        let name = name.into();
        Self {
            metrics: FrameMetrics::new(&name),
            name,
            settings: StabilizeSettings::default(),
            context,
            factory,
            state: NegotiationState::default(),
            geometry: None,
            scaler: None,
            session: None,
            spare: None,
            tracing: TracingConfig::default(),
        }
    }

    /// Replace the settings.
    pub fn with_settings(mut self, settings: StabilizeSettings) -> Result<Self, Error> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }

    /// Set the tracing configuration.
    pub fn with_tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }

    /// Current settings.
    pub fn settings(&self) -> &StabilizeSettings {
        &self.settings
    }

    /// Set a property by name. Takes effect at the next negotiation.
    pub fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<(), Error> {
        self.settings.set_property(name, value)?;
        debug!(element = %self.name, property = name, "property set");
        Ok(())
    }

    /// Read a property by name.
    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        self.settings.property(name)
    }

    /// The shared negotiation context.
    pub fn context(&self) -> &Arc<NegotiationContext> {
        &self.context
    }

    /// Lifecycle state.
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Negotiated geometry, if any.
    pub fn geometry(&self) -> Option<&NegotiatedGeometry> {
        self.geometry.as_ref()
    }

    /// The stabilizer session, once the first frame has been seen.
    pub fn session(&self) -> Option<&StabilizerSession> {
        self.session.as_ref()
    }

    /// Bytes of one frame for fixed `caps`.
    pub fn get_unit_size(&self, caps: &VideoCaps) -> Result<usize, NegotiationError> {
        let video = caps.fixed_video()?;
        Ok(unit_size(lookup(video.layout)?, video.width, video.height))
    }

    /// Size of the buffer on the other pad. It depends only on `othercaps`.
    pub fn transform_size(
        &self,
        direction: PadDirection,
        caps: &VideoCaps,
        size: usize,
        othercaps: &VideoCaps,
    ) -> Result<usize, NegotiationError> {
        if size == 0 {
            return Err(NegotiationError::InvalidCaps {
                caps: caps.to_string(),
                reason: "buffer size must be non-zero".into(),
            });
        }
        let other = self.get_unit_size(othercaps)?;
        debug!(
            element = %self.name,
            ?direction,
            size,
            othersize = other,
            othercaps = %othercaps,
            "transform size"
        );
        Ok(other)
    }

    fn reset_negotiation(&mut self) {
        self.state = NegotiationState::Unconfigured;
        self.geometry = None;
        self.scaler = None;
        self.session = None;
        self.spare = None;
    }

    /// Close the device session, drop the output pool and forget the
    /// negotiated state.
    fn release_resources(&mut self) {
        self.context.close_session();
        if let Some(pool) = self.context.release_pool() {
            debug!(element = %self.name, pool = pool.id(), "output pool released");
        }
        self.reset_negotiation();
    }

    fn configure(
        &mut self,
        incaps: &VideoCaps,
        outcaps: &VideoCaps,
    ) -> Result<NegotiatedGeometry, FlowError> {
        let geometry = NegotiatedGeometry::from_caps(incaps, outcaps)?;

        if !geometry.dar_preserved {
            warn!(element = %self.name, %incaps, %outcaps, "Cannot keep DAR");
        }

        if geometry.requires_scaling {
            let scaler = VideoScale::new(
                geometry.in_format,
                geometry.from_width,
                geometry.from_height,
                geometry.to_width,
                geometry.to_height,
            )?
            .with_algorithm(self.settings.interpolation.into());
            self.scaler = Some(scaler);
        }

        if geometry.out_residency.is_hardware() {
            self.context.install_pool(outcaps, &self.settings)?;
        } else if let Some(pool) = self.context.release_pool() {
            debug!(element = %self.name, pool = pool.id(), "host output, pool released");
        }

        info!(
            element = %self.name,
            from = %format_args!("{}x{}", geometry.from_width, geometry.from_height),
            to = %format_args!("{}x{}", geometry.to_width, geometry.to_height),
            in_format = %geometry.in_format.layout,
            out_format = %geometry.out_format.layout,
            par = %geometry.pixel_aspect_ratio,
            scaling = geometry.requires_scaling,
            "caps configured"
        );
        Ok(geometry)
    }

    /// Render `input` as a packed frame at the output geometry.
    fn render(
        &mut self,
        geometry: &NegotiatedGeometry,
        input: &Buffer,
    ) -> Result<Vec<u8>, FlowError> {
        let conversion = conversion(geometry)?;

        let downloaded;
        let src: &[u8] = match (input.as_host(), input.as_hardware()) {
            (Some(bytes), _) => bytes,
            (None, Some(surface)) => {
                let mut bytes = vec![0u8; geometry.input_size()];
                download(
                    geometry.in_format,
                    geometry.from_width,
                    geometry.from_height,
                    surface,
                    &mut bytes,
                )?;
                downloaded = bytes;
                &downloaded
            }
            (None, None) => return Err(FlowError::MapFailed("input")),
        };
        check_frame_len(geometry.in_format, geometry.from_width, geometry.from_height, src.len())?;

        let mut frame = self.spare.take().unwrap_or_default();
        frame.clear();
        frame.resize(geometry.output_size(), 0);

        match conversion {
            Conversion::Copy => frame.copy_from_slice(&src[..geometry.output_size()]),
            Conversion::Scale => {
                let scaler = self.scaler.as_ref().ok_or(FlowError::NotNegotiated)?;
                scaler.scale(src, &mut frame)?;
            }
            Conversion::GrayToYuv => {
                let scaled;
                let luma: &[u8] = match &self.scaler {
                    Some(scaler) => {
                        let mut bytes = vec![0u8; scaler.output_size()];
                        scaler.scale(src, &mut bytes)?;
                        scaled = bytes;
                        &scaled
                    }
                    None => src,
                };
                let planes = plane_layout(geometry.out_format, geometry.to_width, geometry.to_height);
                let width = geometry.to_width as usize;
                let dst = &mut frame[planes[0].range()];
                for (row, line) in luma
                    .chunks_exact(width)
                    .take(geometry.to_height as usize)
                    .enumerate()
                {
                    let start = row * planes[0].row_bytes;
                    dst[start..start + width].copy_from_slice(line);
                }
                clear_chroma_host(geometry.out_format, geometry.to_width, geometry.to_height, &mut frame)?;
            }
        }
        Ok(frame)
    }

    fn write_output(
        geometry: &NegotiatedGeometry,
        frame: &VideoFrame,
        output: &mut Buffer,
    ) -> Result<(), FlowError> {
        let (w, h) = (geometry.to_width, geometry.to_height);
        if let Some(bytes) = output.as_host_mut() {
            check_frame_len(geometry.out_format, w, h, bytes.len())?;
            bytes[..frame.data.len()].copy_from_slice(&frame.data);
            return Ok(());
        }
        let surface = output.as_hardware_mut().ok_or(FlowError::MapFailed("output"))?;
        upload(geometry.out_format, w, h, &frame.data, surface)?;
        Ok(())
    }

    fn stabilize(
        &mut self,
        geometry: &NegotiatedGeometry,
        input: &Buffer,
        output: &mut Buffer,
    ) -> Result<(), FlowError> {
        let data = self.render(geometry, input)?;
        let frame = VideoFrame::new(
            geometry.out_format.layout,
            geometry.to_width,
            geometry.to_height,
            data,
            input.metadata().clone(),
        );

        if self.session.is_none() {
            let params = StabilizerParams::from_settings(
                geometry.to_width,
                geometry.to_height,
                &self.settings,
            );
            self.session = Some(StabilizerSession::new(self.factory.as_ref(), params)?);
        }
        let session = self.session.as_mut().ok_or(FlowError::NotNegotiated)?;

        let (published, evicted) = session.push(frame)?;
        Self::write_output(geometry, published, output)?;
        if !self.settings.silent {
            debug!(
                element = %self.name,
                input = input.metadata().sequence,
                published = published.sequence(),
                "frame stabilized"
            );
        }
        self.spare = evicted.map(|f| f.data);

        *output.metadata_mut() = input.metadata().clone();
        Ok(())
    }
}

impl BaseTransform for Stabilize {
    type Error = FlowError;

    fn name(&self) -> &str {
        &self.name
    }

    fn transform_caps(&self, direction: PadDirection, caps: &Caps, filter: Option<&Caps>) -> Caps {
        let span = self.tracing.negotiation(&self.name, "transform_caps");
        let _guard = span.enter();
        let result = transform_caps(direction, caps, filter);
        debug!(element = %self.name, ?direction, %caps, %result, "transformed caps");
        result
    }

    fn fixate_caps(
        &self,
        direction: PadDirection,
        caps: &VideoCaps,
        othercaps: &Caps,
    ) -> Result<Fixation, NegotiationError> {
        let span = self.tracing.negotiation(&self.name, "fixate_caps");
        let _guard = span.enter();
        let fixation = fixate_caps(direction, caps, othercaps)?;
        debug!(
            element = %self.name,
            caps = %fixation.caps,
            rule = ?fixation.rule,
            dar_preserved = fixation.dar_preserved,
            "fixated caps"
        );
        Ok(fixation)
    }

    fn accept_caps(&self, direction: PadDirection, caps: &Caps) -> bool {
        let accepted = accept_caps(direction, caps);
        if !accepted {
            debug!(element = %self.name, ?direction, %caps, "caps not accepted");
        }
        accepted
    }

    fn set_caps(&mut self, incaps: &VideoCaps, outcaps: &VideoCaps) -> Result<(), FlowError> {
        let span = self.tracing.negotiation(&self.name, "set_caps");
        let _guard = span.enter();

        self.reset_negotiation();
        match self.configure(incaps, outcaps) {
            Ok(geometry) => {
                self.geometry = Some(geometry);
                self.state = self.state.after_set_caps(true);
                record_negotiation(&self.name, true);
                Ok(())
            }
            Err(e) => {
                self.reset_negotiation();
                record_negotiation(&self.name, false);
                error!(element = %self.name, %incaps, %outcaps, error = %e, "could not configure for input/output format");
                Err(e)
            }
        }
    }

    fn decide_allocation(
        &mut self,
        query: &mut AllocationQuery,
    ) -> Result<AllocationDecision, FlowError> {
        Ok(self.context.decide_allocation(query, &self.settings)?)
    }

    fn start(&mut self) -> Result<(), FlowError> {
        let session = self.context.open_session()?;
        debug!(element = %self.name, ?session, "started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), FlowError> {
        self.release_resources();
        self.state = NegotiationState::Stopped;
        debug!(element = %self.name, "stopped");
        Ok(())
    }

    fn change_state(&mut self, transition: StateChange) -> Result<(), FlowError> {
        if transition == StateChange::PausedToReady {
            self.release_resources();
            debug!(element = %self.name, "resources released");
        }
        Ok(())
    }

    fn prepare_output_buffer(&mut self, input: &Buffer) -> Result<Buffer, FlowError> {
        if !self.state.can_transform() {
            return Err(FlowError::NotNegotiated);
        }
        let geometry = self.geometry.as_ref().ok_or(FlowError::NotNegotiated)?;
        let metadata = input.metadata().clone();
        if geometry.out_residency.is_hardware() {
            let pool = self.context.pool().ok_or(FlowError::NotNegotiated)?;
            Ok(Buffer::pooled(pool.acquire()?, metadata))
        } else {
            Ok(Buffer::host(vec![0u8; geometry.output_size()], metadata))
        }
    }

    fn transform(&mut self, input: &Buffer, output: &mut Buffer) -> Result<(), FlowError> {
        let next = self.state.after_transform().ok_or(FlowError::NotNegotiated)?;
        let geometry = self.geometry.clone().ok_or(FlowError::NotNegotiated)?;

        let span = self.tracing.frame(&self.name, input.metadata().sequence);
        let _guard = span.enter();
        let started = Instant::now();
        let result = self.stabilize(&geometry, input, output);
        self.metrics.record_time(started.elapsed());

        match result {
            Ok(()) => {
                self.state = next;
                self.metrics.record_processed();
                trace!(element = %self.name, sequence = input.metadata().sequence, "transformed");
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failed();
                error!(element = %self.name, sequence = input.metadata().sequence, error = %e, "transform failed");
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Stabilize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stabilize")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("geometry", &self.geometry)
            .field("settings", &self.settings)
            .field("stabilizer", &self.factory.name())
            .finish()
    }
}
