//! Fixed-size Gaussian kernels and blurring.
//!
//! Kernels are specified by their odd side length. When no explicit sigma
//! is given, sigma is derived from the size with the usual rule
//! `0.3 * ((size - 1) / 2 - 1) + 0.8`, so a 5×5 blur uses sigma 1.1 and
//! an 11×11 adaptive-threshold window uses sigma 2.0.
//!
//! Borders are clamped (edge pixels replicated).

use image::GrayImage;
use imageproc::filter::filter_clamped;
use imageproc::kernel::Kernel;

use crate::types::ScanError;

/// Sigma implied by an odd kernel size.
#[must_use]
pub fn sigma_for_size(size: u32) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let half = (size.saturating_sub(1)) as f32 * 0.5;
    0.3f32.mul_add(half - 1.0, 0.8)
}

/// A normalized 2D Gaussian kernel of side `size`, stored row-major.
///
/// # Errors
///
/// Returns [`ScanError::InvalidConfig`] if `size` is even or zero.
pub fn gaussian_kernel(size: u32) -> Result<Vec<f32>, ScanError> {
    if size == 0 || size % 2 == 0 {
        return Err(ScanError::InvalidConfig(format!(
            "kernel size must be odd and positive, got {size}"
        )));
    }

    let sigma = sigma_for_size(size);
    #[allow(clippy::cast_possible_wrap)]
    let half = (size / 2) as i32;
    let taps: Vec<f32> = (-half..=half)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let d = i as f32;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let norm: f32 = taps.iter().sum();
    let taps: Vec<f32> = taps.into_iter().map(|t| t / norm).collect();

    Ok(taps
        .iter()
        .flat_map(|&row| taps.iter().map(move |&col| row * col))
        .collect())
}

/// Convolve a grayscale image with a square kernel produced by
/// [`gaussian_kernel`].
///
/// Returns the image unchanged when the image is empty.
#[must_use = "returns the blurred image"]
pub fn blur_with(image: &GrayImage, kernel: &[f32], size: u32) -> GrayImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    filter_clamped(image, Kernel::new(kernel, size, size))
}

/// Gaussian blur with a `size`×`size` kernel.
///
/// # Errors
///
/// Returns [`ScanError::InvalidConfig`] for even or zero sizes.
pub fn gaussian_blur(image: &GrayImage, size: u32) -> Result<GrayImage, ScanError> {
    let kernel = gaussian_kernel(size)?;
    Ok(blur_with(image, &kernel, size))
}
