//! Frame decoding and channel-layout conversion.
//!
//! Decodes encoded still images (PNG, JPEG, BMP, WebP) into the RGBA
//! raster the rest of the pipeline consumes, and converts between RGBA
//! and single-channel grayscale.

use image::{GrayImage, Luma, Rgba, RgbaImage};

use crate::types::ScanError;

/// Decode raw image bytes into an RGBA raster.
///
/// # Errors
///
/// Returns [`ScanError::EmptyInput`] if `bytes` is empty.
/// Returns [`ScanError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, ScanError> {
    if bytes.is_empty() {
        return Err(ScanError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8())
}

/// Convert an RGBA raster to grayscale, ignoring alpha.
///
/// Uses the `image` crate's luma weights (`0.2126 R + 0.7152 G + 0.0722 B`
/// in linear sRGB terms, applied directly to 8-bit values).
#[must_use = "returns the grayscale raster"]
pub fn to_gray(image: &RgbaImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// Expand a grayscale raster to RGBA with equal color channels and
/// opaque alpha.
#[must_use = "returns the RGBA raster"]
pub fn gray_to_rgba(gray: &GrayImage) -> RgbaImage {
    RgbaImage::from_fn(gray.width(), gray.height(), |x, y| {
        let Luma([v]) = *gray.get_pixel(x, y);
        Rgba([v, v, v, 255])
    })
}
