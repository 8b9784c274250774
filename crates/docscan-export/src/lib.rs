//! docscan-export: Pure serializers for scan artifacts (sans-IO)
//!
//! Encodes the final raster as PNG and describes the scan (ordered
//! contour, output size, processing mode) as a JSON manifest. Every
//! function returns bytes or strings; writing files is the caller's job.

pub mod manifest;
pub mod png;

pub use manifest::ScanManifest;
pub use png::to_png;

/// Errors from export serializers.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The raster has a zero dimension.
    #[error("cannot encode an empty {0} raster")]
    EmptyImage(docscan_pipeline::Dimensions),

    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    PngEncode(#[from] image::ImageError),

    /// Manifest (de)serialization failed.
    #[error("manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
