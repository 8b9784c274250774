//! The scan pipeline instance and its frame-source collaborator.
//!
//! A [`Scanner`] is built once from a [`ScanConfig`]: it validates the
//! configuration, prepares the detector's blur kernel and owns the
//! enhancer. Every scan borrows it. A scanner processes one document at
//! a time; overlapping calls are rejected with
//! [`ScanError::ResourceUnavailable`] rather than queued.

use std::sync::atomic::{AtomicBool, Ordering};

use image::{Rgba, RgbaImage};
use tracing::{debug, info, instrument};
use web_time::Instant;

use crate::composite::composite_signature;
use crate::detect::{Detection, Detector};
use crate::diagnostics::{
    ScanDiagnostics, ScanSummary, StageDiagnostics, StageMetrics, count_stroke_pixels,
};
use crate::enhance::Enhancer;
use crate::rectify::{TargetSize, rectify};
use crate::types::{Dimensions, Quadrilateral, ScanConfig, ScanError, ScanOutput, ScanResult};

/// Something that can hand over camera frames.
///
/// The scanner never manages device permissions or lifecycles; it only
/// asks for one frame at a time.
pub trait FrameSource {
    /// Snapshot the current sensor image.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::ResourceUnavailable`] when no frame can be
    /// produced.
    fn acquire_frame(&mut self) -> Result<RgbaImage, ScanError>;

    /// Let go of the device. Later acquisitions may fail.
    fn release_camera(&mut self);
}

/// A frame source over a raster that was captured already (a photo on
/// disk, a test fixture).
#[derive(Debug, Clone)]
pub struct StillFrame {
    frame: Option<RgbaImage>,
}

impl StillFrame {
    #[must_use]
    pub const fn new(frame: RgbaImage) -> Self {
        Self { frame: Some(frame) }
    }

    /// Whether [`release_camera`](FrameSource::release_camera) was called.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.frame.is_none()
    }
}

impl FrameSource for StillFrame {
    fn acquire_frame(&mut self) -> Result<RgbaImage, ScanError> {
        self.frame
            .clone()
            .ok_or_else(|| ScanError::ResourceUnavailable("camera released".to_owned()))
    }

    fn release_camera(&mut self) {
        self.frame = None;
    }
}

/// Clears the busy flag when a scan finishes, including on early return.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One document scanning pipeline.
#[derive(Debug)]
pub struct Scanner {
    config: ScanConfig,
    detector: Detector,
    enhancer: Enhancer,
    busy: AtomicBool,
}

impl Scanner {
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidConfig`] if any detector or enhancer
    /// parameter is out of range.
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        let detector = Detector::new(config.detector.clone())?;
        let enhancer = Enhancer::new(config.enhance.clone())?;
        Ok(Self {
            config,
            detector,
            enhancer,
            busy: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ScanConfig {
        &self.config
    }

    #[must_use]
    pub const fn detector(&self) -> &Detector {
        &self.detector
    }

    #[must_use]
    pub const fn enhancer(&self) -> &Enhancer {
        &self.enhancer
    }

    /// Background fill for out-of-frame rectified pixels.
    #[must_use]
    pub const fn background(&self) -> Rgba<u8> {
        Rgba(self.config.background)
    }

    #[must_use]
    pub const fn ink(&self) -> Rgba<u8> {
        Rgba(self.config.ink)
    }

    fn begin(&self) -> Result<BusyGuard<'_>, ScanError> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| ScanError::ResourceUnavailable("scanner busy".to_owned()))?;
        Ok(BusyGuard(&self.busy))
    }

    /// Detect the document in `frame` and rectify it.
    ///
    /// # Errors
    ///
    /// - [`ScanError::ResourceUnavailable`] if another scan is running.
    /// - [`ScanError::NotDetected`] if no outline qualifies.
    /// - [`ScanError::InvalidGeometry`] if the outline cannot be rectified.
    #[instrument(skip_all, fields(width = frame.width(), height = frame.height()))]
    pub fn scan_frame(&self, frame: RgbaImage) -> Result<ScanResult, ScanError> {
        let _guard = self.begin()?;
        let candidate = self.detector.detect(&frame).into_result()?;
        let rectified = rectify(&frame, &candidate.polygon, TargetSize::Auto, self.background())?;
        info!(
            width = rectified.width(),
            height = rectified.height(),
            score = candidate.combined_score,
            "document rectified"
        );
        Ok(ScanResult::new(candidate.polygon, rectified, frame))
    }

    /// Acquire one frame, release the camera, then scan it.
    ///
    /// The camera is released whether or not a document is found.
    ///
    /// # Errors
    ///
    /// Frame acquisition errors are returned before any processing
    /// starts; otherwise as [`scan_frame`](Self::scan_frame).
    pub fn scan_from_source<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
    ) -> Result<ScanResult, ScanError> {
        let frame = source.acquire_frame();
        source.release_camera();
        self.scan_frame(frame?)
    }

    /// Rectify `frame` with caller-supplied corners, skipping detection.
    ///
    /// Corners are used in the order given.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidGeometry`] for degenerate corners and
    /// [`ScanError::ResourceUnavailable`] if another scan is running.
    pub fn rectify_with(
        &self,
        frame: RgbaImage,
        corners: Quadrilateral,
    ) -> Result<ScanResult, ScanError> {
        let _guard = self.begin()?;
        let rectified = rectify(&frame, &corners, TargetSize::Auto, self.background())?;
        Ok(ScanResult::new(corners, rectified, frame))
    }

    /// Enhance a rectified scan and composite an optional signature.
    ///
    /// Enhancement failures never fail the scan; they come back as
    /// [`ScanOutput::warning`] with the unenhanced raster.
    #[must_use]
    pub fn finish(&self, result: ScanResult, signature: Option<&RgbaImage>) -> ScanOutput {
        let (contour, rectified, _source) = result.into_parts();
        let enhanced = self.enhancer.enhance(rectified, self.config.mode);
        let image = match signature {
            Some(layer) => composite_signature(enhanced.image, layer, self.ink()),
            None => enhanced.image,
        };
        ScanOutput {
            contour,
            image,
            mode: self.config.mode,
            warning: enhanced.warning,
        }
    }

    /// Run a whole scan with diagnostics.
    ///
    /// With `corners` the detection stage is skipped. The signature
    /// layer, when given, is composited over the enhanced raster.
    ///
    /// # Errors
    ///
    /// As [`scan_frame`](Self::scan_frame) and
    /// [`rectify_with`](Self::rectify_with).
    #[instrument(skip_all, fields(mode = %self.config.mode, manual = corners.is_some()))]
    pub fn process(
        &self,
        frame: &RgbaImage,
        corners: Option<Quadrilateral>,
        signature: Option<&RgbaImage>,
    ) -> Result<(ScanOutput, ScanDiagnostics), ScanError> {
        let _guard = self.begin()?;
        let total_start = Instant::now();
        let frame_dims = Dimensions::of(frame);

        let (contour, detection) = if let Some(quad) = corners {
            (quad, None)
        } else {
            let start = Instant::now();
            let (outcome, metrics) = self.detector.detect_with_metrics(frame);
            let stage = StageDiagnostics {
                duration: start.elapsed(),
                metrics: StageMetrics::Detection(metrics),
            };
            match outcome {
                Detection::Found(candidate) => (candidate.polygon, Some(stage)),
                Detection::NotDetected => return Err(ScanError::NotDetected),
            }
        };

        let start = Instant::now();
        let rectified = rectify(frame, &contour, TargetSize::Auto, self.background())?;
        let rectification = StageDiagnostics {
            duration: start.elapsed(),
            metrics: StageMetrics::Rectification {
                width: rectified.width(),
                height: rectified.height(),
            },
        };

        let start = Instant::now();
        let mode = self.config.mode;
        let enhanced = self.enhancer.enhance(rectified, mode);
        let enhancement = StageDiagnostics {
            duration: start.elapsed(),
            metrics: StageMetrics::Enhancement {
                mode,
                fell_back: !enhanced.is_complete(),
            },
        };

        let (image, signature_stage) = match signature {
            Some(layer) => {
                let start = Instant::now();
                let signed = composite_signature(enhanced.image, layer, self.ink());
                let stage = StageDiagnostics {
                    duration: start.elapsed(),
                    metrics: StageMetrics::Signature {
                        stroke_pixels: count_stroke_pixels(layer),
                    },
                };
                (signed, Some(stage))
            }
            None => (enhanced.image, None),
        };

        let summary = ScanSummary {
            frame: frame_dims,
            output: Dimensions::of(&image),
            mode,
            detected: detection.is_some(),
        };
        let diagnostics = ScanDiagnostics {
            detection,
            rectification,
            enhancement,
            signature: signature_stage,
            total_duration: total_start.elapsed(),
            summary,
        };
        debug!(total_ms = diagnostics.total_duration.as_secs_f64() * 1000.0, "scan complete");

        let output = ScanOutput {
            contour,
            image,
            mode,
            warning: enhanced.warning,
        };
        Ok((output, diagnostics))
    }
}
