//! Contour detector: find the document quadrilateral in a frame.
//!
//! grayscale → Gaussian blur → Canny → optional dilation → contour
//! tracing → polygon approximation → 4-vertex filter → corner
//! refinement → area filter → scoring → ranking.
//!
//! "Not detected" is a normal outcome, returned as
//! [`Detection::NotDetected`] rather than an error. A failure while
//! evaluating one candidate only skips that candidate.

use std::borrow::Cow;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::blur;
use crate::contour::{ContourRetrieval, ContourTracer};
use crate::edge;
use crate::geometry::{arc_length, convex_hull_area, order_corners, polygon_area, side_extents};
use crate::grayscale::to_gray;
use crate::simplify::{approximate_polygon, refine_vertices};
use crate::types::{Contour, Dimensions, Quadrilateral, ScanError};

/// Weight of convexity in [`combined_score`].
pub const CONVEXITY_WEIGHT: f64 = 0.7;
/// Weight of the aspect score in [`combined_score`].
pub const ASPECT_WEIGHT: f64 = 0.3;
/// Width/height ratios in this range earn a full aspect score.
pub const ASPECT_RANGE: (f64, f64) = (0.7, 1.4);
/// Aspect score for ratios outside [`ASPECT_RANGE`].
pub const ASPECT_PENALTY: f64 = 0.5;

/// Which candidates survive the area check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AreaFilter {
    /// Traced contour area must lie in `[min_fraction, max_fraction]` of
    /// the frame area.
    Relative { min_fraction: f64, max_fraction: f64 },
    /// Approximated polygon area must exceed `min_area` square pixels of
    /// the capture frame.
    Absolute { min_area: f64 },
}

impl AreaFilter {
    /// Whether a candidate of `area` passes in a frame of `frame_area`.
    ///
    /// `area_scale` converts capture-pixel areas into the processing
    /// raster's pixels (the product of the two downsampling factors).
    #[must_use]
    pub fn accepts(&self, area: f64, frame_area: f64, area_scale: f64) -> bool {
        match *self {
            Self::Relative {
                min_fraction,
                max_fraction,
            } => {
                frame_area > 0.0
                    && (min_fraction..=max_fraction).contains(&(area / frame_area))
            }
            Self::Absolute { min_area } => area > min_area * area_scale,
        }
    }
}

/// How the winning candidate is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RankingStrategy {
    /// Highest [`combined_score`]; detected only above `min_score`.
    Score { min_score: f64 },
    /// Largest polygon area, no score threshold.
    LargestArea,
}

/// Contour detector parameters.
///
/// The default is the interactive auto-detect profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Gaussian kernel side length (odd).
    pub blur_kernel: u32,
    /// Canny low threshold (L1 gradient magnitude).
    pub canny_low: f32,
    /// Canny high threshold.
    pub canny_high: f32,
    /// Dilate edges with a 3×3 square before tracing.
    pub dilate: bool,
    /// Which traced boundaries become candidates.
    pub retrieval: ContourRetrieval,
    /// Polygon approximation tolerance as a fraction of arc length.
    pub approx_fraction: f64,
    pub area_filter: AreaFilter,
    pub ranking: RankingStrategy,
    /// Detect on a copy whose longest axis is at most this many pixels.
    /// `None` detects at capture resolution.
    pub working_resolution: Option<u32>,
}

impl DetectorConfig {
    pub const DEFAULT_BLUR_KERNEL: u32 = 5;
    pub const DEFAULT_APPROX_FRACTION: f64 = 0.02;
    pub const DEFAULT_MIN_FRACTION: f64 = 0.05;
    pub const DEFAULT_MAX_FRACTION: f64 = 0.95;
    pub const DEFAULT_MIN_AREA: f64 = 15_000.0;
    pub const DEFAULT_MIN_SCORE: f64 = 0.3;

    /// Interactive auto-detect: dilation, relative area band, score ranking.
    #[must_use]
    pub const fn interactive() -> Self {
        Self {
            blur_kernel: Self::DEFAULT_BLUR_KERNEL,
            canny_low: 50.0,
            canny_high: 150.0,
            dilate: true,
            retrieval: ContourRetrieval::External,
            approx_fraction: Self::DEFAULT_APPROX_FRACTION,
            area_filter: AreaFilter::Relative {
                min_fraction: Self::DEFAULT_MIN_FRACTION,
                max_fraction: Self::DEFAULT_MAX_FRACTION,
            },
            ranking: RankingStrategy::Score {
                min_score: Self::DEFAULT_MIN_SCORE,
            },
            working_resolution: None,
        }
    }

    /// One-shot scan: stricter Canny, no dilation, absolute minimum area,
    /// largest-area ranking.
    #[must_use]
    pub const fn one_shot() -> Self {
        Self {
            blur_kernel: Self::DEFAULT_BLUR_KERNEL,
            canny_low: 75.0,
            canny_high: 200.0,
            dilate: false,
            retrieval: ContourRetrieval::External,
            approx_fraction: Self::DEFAULT_APPROX_FRACTION,
            area_filter: AreaFilter::Absolute {
                min_area: Self::DEFAULT_MIN_AREA,
            },
            ranking: RankingStrategy::LargestArea,
            working_resolution: None,
        }
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidConfig`] describing the first bad field.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.blur_kernel == 0 || self.blur_kernel % 2 == 0 {
            return Err(ScanError::InvalidConfig(format!(
                "blur_kernel must be odd and positive, got {}",
                self.blur_kernel
            )));
        }
        if !(self.canny_low.is_finite() && self.canny_high.is_finite()) {
            return Err(ScanError::InvalidConfig(
                "canny thresholds must be finite".to_owned(),
            ));
        }
        if !(self.approx_fraction.is_finite() && self.approx_fraction > 0.0) {
            return Err(ScanError::InvalidConfig(format!(
                "approx_fraction must be positive, got {}",
                self.approx_fraction
            )));
        }
        match self.area_filter {
            AreaFilter::Relative {
                min_fraction,
                max_fraction,
            } if !(0.0 <= min_fraction && min_fraction <= max_fraction && max_fraction <= 1.0) => {
                return Err(ScanError::InvalidConfig(format!(
                    "relative area band must satisfy 0 <= min <= max <= 1, got {min_fraction}..{max_fraction}"
                )));
            }
            AreaFilter::Absolute { min_area } if !(min_area.is_finite() && min_area >= 0.0) => {
                return Err(ScanError::InvalidConfig(format!(
                    "min_area must be non-negative, got {min_area}"
                )));
            }
            _ => {}
        }
        if self.working_resolution == Some(0) {
            return Err(ScanError::InvalidConfig(
                "working_resolution must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::interactive()
    }
}

/// A scored 4-vertex polygon from one detection pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContourCandidate {
    /// Ordered corners.
    pub polygon: Quadrilateral,
    /// Polygon area in square pixels.
    pub area: f64,
    /// Traced contour area over its convex hull area, in `[0, 1]`.
    pub convexity: f64,
    pub aspect_score: f64,
    pub combined_score: f64,
}

/// `0.7 * convexity + 0.3 * aspect_score`.
#[must_use]
pub fn combined_score(convexity: f64, aspect_score: f64) -> f64 {
    CONVEXITY_WEIGHT.mul_add(convexity, ASPECT_WEIGHT * aspect_score)
}

/// 1.0 when `width / height` of the ordered quadrilateral falls within
/// [`ASPECT_RANGE`], otherwise [`ASPECT_PENALTY`].
///
/// Width is the longer of the top and bottom sides, height the longer of
/// the left and right sides.
#[must_use]
pub fn aspect_score(quad: &Quadrilateral) -> f64 {
    let (width, height) = side_extents(quad);
    if height <= 0.0 {
        return ASPECT_PENALTY;
    }
    let ratio = width / height;
    if (ASPECT_RANGE.0..=ASPECT_RANGE.1).contains(&ratio) {
        1.0
    } else {
        ASPECT_PENALTY
    }
}

/// `area / hull_area` clamped to `[0, 1]`; zero when the hull is empty.
#[must_use]
pub fn convexity(area: f64, hull_area: f64) -> f64 {
    if hull_area <= 0.0 {
        return 0.0;
    }
    (area / hull_area).clamp(0.0, 1.0)
}

/// Outcome of one detection pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// The winning candidate, corners in capture-frame pixels.
    Found(ContourCandidate),
    NotDetected,
}

impl Detection {
    #[must_use]
    pub const fn detected(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// The ordered corners of the winner, if any.
    #[must_use]
    pub const fn quad(&self) -> Option<&Quadrilateral> {
        match self {
            Self::Found(candidate) => Some(&candidate.polygon),
            Self::NotDetected => None,
        }
    }

    /// Convert into a `Result`, mapping "not detected" to
    /// [`ScanError::NotDetected`] for callers that treat it as terminal.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NotDetected`] for [`Detection::NotDetected`].
    pub fn into_result(self) -> Result<ContourCandidate, ScanError> {
        match self {
            Self::Found(candidate) => Ok(candidate),
            Self::NotDetected => Err(ScanError::NotDetected),
        }
    }
}

/// Counters from one detection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionMetrics {
    /// Dimensions of the raster the operators actually ran on.
    pub working: Option<Dimensions>,
    pub edge_pixels: u64,
    pub contours: usize,
    /// Contours that approximated to exactly four vertices.
    pub quadrilaterals: usize,
    pub area_rejected: usize,
    pub failed_candidates: usize,
    pub winning_score: Option<f64>,
    pub winning_area: Option<f64>,
}

enum Evaluation {
    NotQuadrilateral,
    AreaRejected,
    Candidate(ContourCandidate),
}

/// A configured detector.
///
/// Construction validates the configuration and builds the blur kernel
/// once; [`Detector::detect`] can then be called on any number of frames.
#[derive(Debug, Clone)]
pub struct Detector {
    config: DetectorConfig,
    blur_kernel: Vec<f32>,
}

impl Detector {
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: DetectorConfig) -> Result<Self, ScanError> {
        config.validate()?;
        let blur_kernel = blur::gaussian_kernel(config.blur_kernel)?;
        Ok(Self {
            config,
            blur_kernel,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Find the best document quadrilateral in `frame`.
    #[must_use]
    pub fn detect(&self, frame: &RgbaImage) -> Detection {
        self.detect_with_metrics(frame).0
    }

    /// [`detect`](Self::detect), also returning pass counters.
    #[must_use]
    #[tracing::instrument(skip_all, fields(width = frame.width(), height = frame.height()))]
    pub fn detect_with_metrics(&self, frame: &RgbaImage) -> (Detection, DetectionMetrics) {
        let mut metrics = DetectionMetrics::default();
        if frame.width() == 0 || frame.height() == 0 {
            debug!("empty frame");
            return (Detection::NotDetected, metrics);
        }

        let (working, sx, sy) = match self.config.working_resolution {
            Some(max) => downsample(frame, max),
            None => (Cow::Borrowed(frame), 1.0, 1.0),
        };
        let dims = Dimensions::of(&*working);
        metrics.working = Some(dims);

        let gray = to_gray(&working);
        let blurred = blur::blur_with(&gray, &self.blur_kernel, self.config.blur_kernel);
        let mut edges = edge::canny(&blurred, self.config.canny_low, self.config.canny_high);
        if self.config.dilate {
            edges = edge::dilate(&edges);
        }
        metrics.edge_pixels = edges.pixels().filter(|p| p.0[0] > 0).count() as u64;

        let contours = self.config.retrieval.trace(&edges);
        metrics.contours = contours.len();

        let frame_area = dims.pixel_area();
        let area_scale = sx * sy;
        let mut candidates = Vec::new();
        for (index, contour) in contours.iter().enumerate() {
            match self.evaluate(contour, frame_area, area_scale) {
                Ok(Evaluation::NotQuadrilateral) => {}
                Ok(Evaluation::AreaRejected) => {
                    metrics.quadrilaterals += 1;
                    metrics.area_rejected += 1;
                }
                Ok(Evaluation::Candidate(candidate)) => {
                    metrics.quadrilaterals += 1;
                    candidates.push(candidate);
                }
                Err(err) => {
                    metrics.failed_candidates += 1;
                    warn!(index, error = %err, "skipping contour candidate");
                }
            }
        }

        let winner = match self.config.ranking {
            RankingStrategy::Score { min_score } => {
                best_by(&candidates, |c| c.combined_score).filter(|c| c.combined_score > min_score)
            }
            RankingStrategy::LargestArea => best_by(&candidates, |c| c.area),
        };

        let Some(winner) = winner else {
            debug!(candidates = candidates.len(), "no document outline");
            return (Detection::NotDetected, metrics);
        };

        // Corners and area go back to capture pixels exactly once.
        let found = ContourCandidate {
            polygon: winner.polygon.scaled(1.0 / sx, 1.0 / sy),
            area: winner.area / area_scale,
            ..*winner
        };
        metrics.winning_score = Some(found.combined_score);
        metrics.winning_area = Some(found.area);
        debug!(
            score = found.combined_score,
            area = found.area,
            "document outline detected"
        );
        (Detection::Found(found), metrics)
    }

    fn evaluate(
        &self,
        contour: &Contour,
        frame_area: f64,
        area_scale: f64,
    ) -> Result<Evaluation, ScanError> {
        let points = contour.points();
        let epsilon = self.config.approx_fraction * arc_length(points, true);
        let approx = approximate_polygon(points, epsilon);
        if approx.len() != 4 {
            return Ok(Evaluation::NotQuadrilateral);
        }
        let approx = refine_vertices(points, &approx, epsilon);

        let contour_area = polygon_area(points);
        let area = polygon_area(&approx);
        // The relative band measures the traced outline, the absolute
        // floor the fitted polygon.
        let filtered_area = match self.config.area_filter {
            AreaFilter::Relative { .. } => contour_area,
            AreaFilter::Absolute { .. } => area,
        };
        if !self
            .config
            .area_filter
            .accepts(filtered_area, frame_area, area_scale)
        {
            return Ok(Evaluation::AreaRejected);
        }

        let polygon = order_corners(&approx)?;
        let convexity = convexity(contour_area, convex_hull_area(points));
        let aspect_score = aspect_score(&polygon);
        let combined_score = combined_score(convexity, aspect_score);
        if !combined_score.is_finite() {
            return Err(ScanError::OperatorFailure(format!(
                "non-finite score for polygon of area {area}"
            )));
        }

        Ok(Evaluation::Candidate(ContourCandidate {
            polygon,
            area,
            convexity,
            aspect_score,
            combined_score,
        }))
    }
}

/// First candidate with the strictly greatest key.
fn best_by(
    candidates: &[ContourCandidate],
    key: impl Fn(&ContourCandidate) -> f64,
) -> Option<&ContourCandidate> {
    candidates.iter().fold(None, |best, c| match best {
        Some(b) if key(c) <= key(b) => Some(b),
        _ => Some(c),
    })
}

/// Shrink `frame` so its longest axis is at most `max_dimension`.
///
/// Returns the raster with its per-axis scale factors (processing pixels
/// per capture pixel).
fn downsample(frame: &RgbaImage, max_dimension: u32) -> (Cow<'_, RgbaImage>, f64, f64) {
    let (w, h) = frame.dimensions();
    let long_axis = w.max(h);
    if long_axis <= max_dimension {
        return (Cow::Borrowed(frame), 1.0, 1.0);
    }

    let factor = f64::from(max_dimension) / f64::from(long_axis);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scale = |v: u32| ((f64::from(v) * factor).round() as u32).max(1);
    let (nw, nh) = (scale(w), scale(h));
    let resized = image::imageops::resize(frame, nw, nh, image::imageops::FilterType::Triangle);
    (
        Cow::Owned(resized),
        f64::from(nw) / f64::from(w),
        f64::from(nh) / f64::from(h),
    )
}
