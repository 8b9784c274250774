//! JSON manifest describing one scan.
//!
//! The manifest pairs the output raster with the contour that produced
//! it, so a later run can re-rectify the same frame or audit where the
//! corners were placed. Contour points are in source-frame pixels,
//! ordered top-left, top-right, bottom-right, bottom-left.

use serde::{Deserialize, Serialize};

use docscan_pipeline::{Dimensions, EnhanceWarning, ProcessingMode, ScanOutput};

use crate::ExportError;

/// Machine-readable description of a scan artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanManifest {
    /// Source image name, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub contour: [[f64; 2]; 4],
    pub dimensions: Dimensions,
    pub mode: ProcessingMode,
    /// Present when enhancement fell back to the rectified raster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<EnhanceWarning>,
    /// Whether a signature was composited.
    pub signed: bool,
}

impl ScanManifest {
    #[must_use]
    pub fn from_output(output: &ScanOutput) -> Self {
        Self {
            source: None,
            contour: output.contour.to_pairs(),
            dimensions: Dimensions::of(&output.image),
            mode: output.mode,
            warning: output.warning.clone(),
            signed: false,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub const fn signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// # Errors
    ///
    /// Returns [`ExportError::Json`] for malformed input.
    pub fn from_json(json: &str) -> Result<Self, ExportError> {
        Ok(serde_json::from_str(json)?)
    }
}
