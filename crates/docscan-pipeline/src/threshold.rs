//! Adaptive (local) binarization.
//!
//! Each pixel is compared against a weighted mean of its `block`×`block`
//! neighborhood minus a bias `c`: brighter than that becomes 255, the
//! rest 0. Because the cutoff follows the local brightness, shadows and
//! uneven lighting across a page do not swallow the text.

use image::{GrayImage, Luma};
use imageproc::filter::box_filter;
use serde::{Deserialize, Serialize};

use crate::blur::gaussian_blur;
use crate::types::ScanError;

/// How the neighborhood mean is weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdaptiveMethod {
    /// Gaussian-weighted mean, sigma derived from the block size.
    #[default]
    Gaussian,
    /// Plain box mean.
    Mean,
}

/// Binarize `gray` against its local mean.
///
/// # Errors
///
/// Returns [`ScanError::InvalidConfig`] unless `block` is odd and at
/// least 3.
pub fn adaptive_threshold(
    gray: &GrayImage,
    block: u32,
    c: f64,
    method: AdaptiveMethod,
) -> Result<GrayImage, ScanError> {
    if block < 3 || block % 2 == 0 {
        return Err(ScanError::InvalidConfig(format!(
            "adaptive threshold block must be odd and >= 3, got {block}"
        )));
    }
    if gray.width() == 0 || gray.height() == 0 {
        return Ok(gray.clone());
    }

    let mean = match method {
        AdaptiveMethod::Gaussian => gaussian_blur(gray, block)?,
        AdaptiveMethod::Mean => box_filter(gray, block / 2, block / 2),
    };

    Ok(GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let src = f64::from(gray.get_pixel(x, y).0[0]);
        let local = f64::from(mean.get_pixel(x, y).0[0]);
        if src > local - c { Luma([255]) } else { Luma([0]) }
    }))
}
