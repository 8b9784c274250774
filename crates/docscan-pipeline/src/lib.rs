//! docscan-pipeline: Pure document scanning pipeline (sans-IO).
//!
//! Turns a photographed document into a flat, cleaned-up raster through:
//! grayscale -> blur -> edge detection -> contour tracing -> polygon
//! approximation -> quadrilateral ranking -> perspective rectification
//! -> enhancement -> optional signature compositing.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! rasters and returns structured data. Encoding and file output live in
//! `docscan-export` and the `docscan` binary.

pub mod blur;
pub mod composite;
pub mod contour;
pub mod denoise;
pub mod detect;
pub mod diagnostics;
pub mod edge;
pub mod editor;
pub mod enhance;
pub mod geometry;
pub mod grayscale;
pub mod rectify;
pub mod scanner;
pub mod signature;
pub mod simplify;
pub mod threshold;
pub mod types;
pub mod workflow;

use image::RgbaImage;

pub use contour::{ContourRetrieval, ContourTracer};
pub use detect::{
    AreaFilter, ContourCandidate, Detection, DetectionMetrics, Detector, DetectorConfig,
    RankingStrategy,
};
pub use diagnostics::ScanDiagnostics;
pub use editor::{ArrowKey, CornerEditor, EditorState, ViewportScale};
pub use enhance::{EnhanceConfig, EnhanceWarning, Enhanced, Enhancer};
pub use geometry::{default_corners, order_corners, polygon_area};
pub use rectify::{Homography, TargetSize, rectify};
pub use scanner::{FrameSource, Scanner, StillFrame};
pub use signature::SignatureLayer;
pub use threshold::AdaptiveMethod;
pub use types::{
    Contour, Dimensions, Point, ProcessingMode, Quadrilateral, ScanConfig, ScanError, ScanOutput,
    ScanResult,
};

/// Detect, rectify and enhance one frame.
///
/// Convenience wrapper that builds a [`Scanner`] for a single use. Keep a
/// `Scanner` around instead when scanning repeatedly.
///
/// # Errors
///
/// Returns [`ScanError::InvalidConfig`] for a bad configuration,
/// [`ScanError::NotDetected`] when no document outline qualifies, and
/// [`ScanError::InvalidGeometry`] if the outline cannot be rectified.
pub fn scan(frame: RgbaImage, config: &ScanConfig) -> Result<ScanOutput, ScanError> {
    let scanner = Scanner::new(config.clone())?;
    let result = scanner.scan_frame(frame)?;
    Ok(scanner.finish(result, None))
}
