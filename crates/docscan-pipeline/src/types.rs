//! Shared types for the docscan pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::detect::DetectorConfig;
use crate::enhance::{EnhanceConfig, EnhanceWarning};

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage`, the raster type every stage exchanges.
pub use image::RgbaImage;

/// A 2D point in pixel coordinates of one specific raster.
///
/// Points from different rasters (capture resolution, display
/// resolution, downsampled processing resolution) must not be mixed;
/// convert with [`Point::scaled`] at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Scale both axes independently (coordinate-space conversion).
    #[must_use]
    pub fn scaled(self, sx: f64, sy: f64) -> Self {
        Self::new(self.x * sx, self.y * sy)
    }

    /// Whether both coordinates are finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A closed boundary curve traced from a binary edge map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour(Vec<Point>);

impl Contour {
    /// Create a contour from its boundary points, in tracing order.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the contour has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of boundary points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the contour and returns the underlying points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }
}

/// Exactly four points, conventionally ordered
/// `[top-left, top-right, bottom-right, bottom-left]`.
///
/// Construction does not reorder; use
/// [`order_corners`](crate::geometry::order_corners) to obtain the
/// conventional order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral([Point; 4]);

impl Quadrilateral {
    /// Wrap four corners as given.
    #[must_use]
    pub const fn new(corners: [Point; 4]) -> Self {
        Self(corners)
    }

    /// The four corners in stored order.
    #[must_use]
    pub const fn corners(&self) -> &[Point; 4] {
        &self.0
    }

    /// Mutable access for in-place editing.
    pub fn corners_mut(&mut self) -> &mut [Point; 4] {
        &mut self.0
    }

    #[must_use]
    pub const fn top_left(&self) -> Point {
        self.0[0]
    }

    #[must_use]
    pub const fn top_right(&self) -> Point {
        self.0[1]
    }

    #[must_use]
    pub const fn bottom_right(&self) -> Point {
        self.0[2]
    }

    #[must_use]
    pub const fn bottom_left(&self) -> Point {
        self.0[3]
    }

    /// Map every corner into another raster's coordinate space.
    #[must_use]
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self(self.0.map(|p| p.scaled(sx, sy)))
    }

    /// Corners as `[x, y]` pairs, the externally consumable contour form.
    #[must_use]
    pub fn to_pairs(&self) -> [[f64; 2]; 4] {
        self.0.map(|p| [p.x, p.y])
    }
}

impl TryFrom<&[Point]> for Quadrilateral {
    type Error = ScanError;

    fn try_from(points: &[Point]) -> Result<Self, Self::Error> {
        let corners: [Point; 4] = points.try_into().map_err(|_| {
            ScanError::InvalidGeometry(format!("expected 4 corners, got {}", points.len()))
        })?;
        Ok(Self(corners))
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of an existing raster.
    #[must_use]
    pub fn of<P: image::Pixel>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>) -> Self {
        Self::new(image.width(), image.height())
    }

    /// Total pixel area as a float, for area-ratio comparisons.
    #[must_use]
    pub fn pixel_area(self) -> f64 {
        f64::from(self.width) * f64::from(self.height)
    }

    /// Whether either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which filter chain the enhancement stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessingMode {
    /// Grayscale, adaptive threshold, back to RGBA.
    BlackAndWhite,
    /// Contrast stretch and color-preserving denoise.
    ColorEnhanced,
    /// Threshold, median denoise, sharpen.
    #[default]
    Enhanced,
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlackAndWhite => f.write_str("BlackAndWhite"),
            Self::ColorEnhanced => f.write_str("ColorEnhanced"),
            Self::Enhanced => f.write_str("Enhanced"),
        }
    }
}

/// Configuration for a complete scan run.
///
/// `background` fills rectified pixels that fall outside the source
/// frame; `ink` is the color signature strokes are normalized to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Contour detection parameters and ranking strategy.
    pub detector: DetectorConfig,
    /// Enhancement filter parameters.
    pub enhance: EnhanceConfig,
    /// Which enhancement chain to run.
    pub mode: ProcessingMode,
    /// RGBA fill for out-of-frame pixels during rectification.
    pub background: [u8; 4],
    /// RGBA color of composited signature strokes.
    pub ink: [u8; 4],
}

impl ScanConfig {
    pub const DEFAULT_BACKGROUND: [u8; 4] = [255, 255, 255, 255];
    pub const DEFAULT_INK: [u8; 4] = [0, 0, 0, 255];

    /// Configuration for the one-shot camera path (largest-area ranking,
    /// absolute minimum area, no dilation).
    #[must_use]
    pub fn one_shot() -> Self {
        Self {
            detector: DetectorConfig::one_shot(),
            ..Self::default()
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            enhance: EnhanceConfig::default(),
            mode: ProcessingMode::default(),
            background: Self::DEFAULT_BACKGROUND,
            ink: Self::DEFAULT_INK,
        }
    }
}

/// Outcome of one successful detection + rectification pass.
///
/// Immutable after creation; the source frame is kept so a caller can
/// re-run rectification with adjusted corners.
#[derive(Debug, Clone)]
pub struct ScanResult {
    contour: Quadrilateral,
    rectified: RgbaImage,
    source: RgbaImage,
}

impl ScanResult {
    #[must_use]
    pub const fn new(contour: Quadrilateral, rectified: RgbaImage, source: RgbaImage) -> Self {
        Self {
            contour,
            rectified,
            source,
        }
    }

    /// Ordered corners, in source-frame pixel coordinates.
    #[must_use]
    pub const fn contour(&self) -> &Quadrilateral {
        &self.contour
    }

    /// The perspective-corrected document.
    #[must_use]
    pub const fn rectified(&self) -> &RgbaImage {
        &self.rectified
    }

    /// The frame the contour was found in.
    #[must_use]
    pub const fn source(&self) -> &RgbaImage {
        &self.source
    }

    /// Split into `(contour, rectified, source)`.
    #[must_use]
    pub fn into_parts(self) -> (Quadrilateral, RgbaImage, RgbaImage) {
        (self.contour, self.rectified, self.source)
    }
}

/// The externally consumable artifact of one scan: the final raster plus
/// the contour used to produce it.
#[derive(Debug, Clone)]
pub struct ScanOutput {
    /// Ordered corners in source-frame pixels.
    pub contour: Quadrilateral,
    /// Rectified, enhanced and optionally signed document.
    pub image: RgbaImage,
    /// Mode the enhancement stage was asked to run.
    pub mode: ProcessingMode,
    /// Set when enhancement fell back to the unenhanced raster.
    pub warning: Option<EnhanceWarning>,
}

/// Errors that can occur while scanning.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// No qualifying quadrilateral was found. An expected outcome.
    #[error("no document outline detected")]
    NotDetected,

    /// Malformed corner input (wrong count, zero area, singular transform).
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// An image operator failed on a specific candidate or stage.
    #[error("image operator failed: {0}")]
    OperatorFailure(String),

    /// Frame source or pipeline instance not ready.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// The encoded input was empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode an encoded frame.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// A configuration value is out of range.
    #[error("invalid scan configuration: {0}")]
    InvalidConfig(String),
}

impl ScanError {
    /// Text suitable for showing to the person holding the camera.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotDetected => "No document found, try again.".to_owned(),
            Self::ResourceUnavailable(what) => format!("The scanner is not ready: {what}."),
            Self::EmptyInput | Self::ImageDecode(_) => {
                "The captured image could not be read.".to_owned()
            }
            Self::InvalidGeometry(_) => {
                "The document corners are not valid. Adjust them and try again.".to_owned()
            }
            Self::OperatorFailure(_) | Self::InvalidConfig(_) => {
                "The document could not be processed.".to_owned()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn point_scaled() {
        let p = Point::new(10.0, 20.0).scaled(0.5, 2.0);
        assert_eq!(p, Point::new(5.0, 40.0));
    }

    #[test]
    fn quadrilateral_from_slice_requires_four_points() {
        let three = [Point::new(0.0, 0.0); 3];
        let err = Quadrilateral::try_from(&three[..]).unwrap_err();
        assert!(matches!(err, ScanError::InvalidGeometry(_)));

        let four = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        let quad = Quadrilateral::try_from(&four[..]).unwrap();
        assert_eq!(quad.bottom_left(), Point::new(0.0, 1.0));
    }

    #[test]
    fn quadrilateral_pairs() {
        let quad = Quadrilateral::new([
            Point::new(1.0, 2.0),
            Point::new(3.0, 2.0),
            Point::new(3.0, 4.0),
            Point::new(1.0, 4.0),
        ]);
        assert_eq!(
            quad.to_pairs(),
            [[1.0, 2.0], [3.0, 2.0], [3.0, 4.0], [1.0, 4.0]]
        );
    }

    #[test]
    fn dimensions_area_and_display() {
        let d = Dimensions::new(600, 800);
        assert!((d.pixel_area() - 480_000.0).abs() < f64::EPSILON);
        assert_eq!(d.to_string(), "600x800");
        assert!(Dimensions::new(0, 5).is_empty());
    }

    #[test]
    fn default_mode_is_enhanced() {
        assert_eq!(ProcessingMode::default(), ProcessingMode::Enhanced);
    }

    #[test]
    fn scan_config_serde_round_trip() {
        let config = ScanConfig::one_shot();
        let json = serde_json::to_string(&config).unwrap();
        let back: ScanConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn user_messages() {
        assert_eq!(
            ScanError::NotDetected.user_message(),
            "No document found, try again."
        );
        assert!(
            ScanError::ResourceUnavailable("camera not started".into())
                .user_message()
                .contains("camera not started")
        );
    }

    #[test]
    fn error_display() {
        let err = ScanError::InvalidGeometry("expected 4 corners, got 2".into());
        assert_eq!(err.to_string(), "invalid geometry: expected 4 corners, got 2");
    }
}
