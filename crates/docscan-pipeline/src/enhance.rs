//! Enhancement pipeline: the filter chain run on a rectified document.
//!
//! | Mode | Chain |
//! |------|-------|
//! | `BlackAndWhite` | grayscale → adaptive threshold (15, 2) → RGBA |
//! | `ColorEnhanced` | contrast stretch ×1.2 → color non-local means |
//! | `Enhanced` | grayscale → adaptive threshold (11, 2) → median 3 → sharpen → RGBA |
//!
//! A failing stage never leaks a partial buffer: [`Enhancer::enhance`]
//! hands back the input raster together with an [`EnhanceWarning`].

use std::fmt;

use image::{GrayImage, Rgba, RgbaImage};
use imageproc::filter::filter_clamped;
use imageproc::kernel::Kernel;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::denoise::{self, NlMeansParams};
use crate::grayscale::{gray_to_rgba, to_gray};
use crate::threshold::{AdaptiveMethod, adaptive_threshold};
use crate::types::{ProcessingMode, ScanError};

/// 3×3 sharpening kernel, row-major.
pub const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

/// Filter parameters for every processing mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhanceConfig {
    /// Adaptive threshold window for `BlackAndWhite`.
    pub bw_block: u32,
    /// Bias subtracted from the local mean for `BlackAndWhite`.
    pub bw_bias: f64,
    /// Adaptive threshold window for `Enhanced`.
    pub enhanced_block: u32,
    /// Bias subtracted from the local mean for `Enhanced`.
    pub enhanced_bias: f64,
    pub adaptive_method: AdaptiveMethod,
    /// Linear contrast factor for `ColorEnhanced`.
    pub contrast_scale: f32,
    pub contrast_offset: f32,
    pub nl_means: NlMeansParams,
    /// Median window for `Enhanced`.
    pub median_kernel: u32,
    pub sharpen_kernel: [f32; 9],
}

impl EnhanceConfig {
    pub const DEFAULT_BW_BLOCK: u32 = 15;
    pub const DEFAULT_ENHANCED_BLOCK: u32 = 11;
    pub const DEFAULT_BIAS: f64 = 2.0;
    pub const DEFAULT_CONTRAST_SCALE: f32 = 1.2;
    pub const DEFAULT_MEDIAN_KERNEL: u32 = 3;

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidConfig`] describing the first bad field.
    pub fn validate(&self) -> Result<(), ScanError> {
        for (name, block) in [
            ("bw_block", self.bw_block),
            ("enhanced_block", self.enhanced_block),
        ] {
            if block < 3 || block % 2 == 0 {
                return Err(ScanError::InvalidConfig(format!(
                    "{name} must be odd and >= 3, got {block}"
                )));
            }
        }
        if self.median_kernel == 0 || self.median_kernel % 2 == 0 {
            return Err(ScanError::InvalidConfig(format!(
                "median_kernel must be odd, got {}",
                self.median_kernel
            )));
        }
        if !(self.contrast_scale.is_finite() && self.contrast_offset.is_finite()) {
            return Err(ScanError::InvalidConfig(
                "contrast parameters must be finite".to_owned(),
            ));
        }
        if !self.sharpen_kernel.iter().all(|k| k.is_finite()) {
            return Err(ScanError::InvalidConfig(
                "sharpen kernel must be finite".to_owned(),
            ));
        }
        self.nl_means.validate()
    }
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            bw_block: Self::DEFAULT_BW_BLOCK,
            bw_bias: Self::DEFAULT_BIAS,
            enhanced_block: Self::DEFAULT_ENHANCED_BLOCK,
            enhanced_bias: Self::DEFAULT_BIAS,
            adaptive_method: AdaptiveMethod::default(),
            contrast_scale: Self::DEFAULT_CONTRAST_SCALE,
            contrast_offset: 0.0,
            nl_means: NlMeansParams::default(),
            median_kernel: Self::DEFAULT_MEDIAN_KERNEL,
            sharpen_kernel: SHARPEN_KERNEL,
        }
    }
}

/// Why enhancement fell back to the unenhanced raster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnhanceWarning {
    /// The input had zero width or height.
    EmptyInput,
    /// A filter stage returned an error.
    StageFailed { stage: String, reason: String },
}

impl fmt::Display for EnhanceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => f.write_str("input raster is empty"),
            Self::StageFailed { stage, reason } => write!(f, "{stage} failed: {reason}"),
        }
    }
}

/// Output of [`Enhancer::enhance`].
#[derive(Debug, Clone)]
pub struct Enhanced {
    /// The enhanced raster, or the untouched input when `warning` is set.
    pub image: RgbaImage,
    pub warning: Option<EnhanceWarning>,
}

impl Enhanced {
    /// Whether the filter chain ran to completion.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.warning.is_none()
    }
}

/// A validated enhancement chain.
#[derive(Debug, Clone)]
pub struct Enhancer {
    config: EnhanceConfig,
}

impl Enhancer {
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: EnhanceConfig) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &EnhanceConfig {
        &self.config
    }

    /// Run the `mode` chain on `image`.
    ///
    /// Never fails: on any stage error the input is returned unchanged
    /// with a warning.
    #[tracing::instrument(skip_all, fields(mode = %mode, width = image.width(), height = image.height()))]
    pub fn enhance(&self, image: RgbaImage, mode: ProcessingMode) -> Enhanced {
        if image.width() == 0 || image.height() == 0 {
            warn!("skipping enhancement of empty raster");
            return Enhanced {
                image,
                warning: Some(EnhanceWarning::EmptyInput),
            };
        }

        match self.run(&image, mode) {
            Ok(enhanced) => {
                debug!("enhancement complete");
                Enhanced {
                    image: enhanced,
                    warning: None,
                }
            }
            Err((stage, err)) => {
                warn!(stage, error = %err, "enhancement failed, keeping rectified image");
                Enhanced {
                    image,
                    warning: Some(EnhanceWarning::StageFailed {
                        stage: stage.to_owned(),
                        reason: err.to_string(),
                    }),
                }
            }
        }
    }

    fn run(
        &self,
        image: &RgbaImage,
        mode: ProcessingMode,
    ) -> Result<RgbaImage, (&'static str, ScanError)> {
        let c = &self.config;
        match mode {
            ProcessingMode::BlackAndWhite => {
                let gray = to_gray(image);
                let binary = adaptive_threshold(&gray, c.bw_block, c.bw_bias, c.adaptive_method)
                    .map_err(|e| ("adaptive threshold", e))?;
                Ok(gray_to_rgba(&binary))
            }
            ProcessingMode::ColorEnhanced => {
                let stretched = contrast_stretch(image, c.contrast_scale, c.contrast_offset);
                denoise::non_local_means_color(&stretched, &c.nl_means)
                    .map_err(|e| ("color denoise", e))
            }
            ProcessingMode::Enhanced => {
                let gray = to_gray(image);
                let binary = adaptive_threshold(
                    &gray,
                    c.enhanced_block,
                    c.enhanced_bias,
                    c.adaptive_method,
                )
                .map_err(|e| ("adaptive threshold", e))?;
                let clean = denoise::median(&binary, c.median_kernel).map_err(|e| ("median", e))?;
                Ok(gray_to_rgba(&sharpen(&clean, &c.sharpen_kernel)))
            }
        }
    }
}

/// `saturate(|v * scale + offset|)` on the color channels; alpha is kept.
#[must_use = "returns the stretched raster"]
pub fn contrast_stretch(image: &RgbaImage, scale: f32, offset: f32) -> RgbaImage {
    let mut out = image.clone();
    for px in out.pixels_mut() {
        let [r, g, b, a] = px.0;
        let [r, g, b] = [r, g, b].map(|v| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let byte = f32::from(v).mul_add(scale, offset).abs().round().min(255.0) as u8;
            byte
        });
        *px = Rgba([r, g, b, a]);
    }
    out
}

/// Convolve with a 3×3 kernel, clamping results to `0..=255`.
#[must_use = "returns the sharpened raster"]
pub fn sharpen(gray: &GrayImage, kernel: &[f32; 9]) -> GrayImage {
    filter_clamped(gray, Kernel::new(kernel, 3, 3))
}
