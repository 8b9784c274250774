//! PNG encoding of the final raster.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use docscan_pipeline::Dimensions;

use crate::ExportError;

/// Encode an RGBA raster as PNG bytes.
///
/// # Errors
///
/// Returns [`ExportError::EmptyImage`] for a zero-size raster and
/// [`ExportError::PngEncode`] if the encoder fails.
pub fn to_png(image: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let dims = Dimensions::of(image);
    if dims.is_empty() {
        return Err(ExportError::EmptyImage(dims));
    }
    let mut png_bytes = Vec::new();
    let encoder = PngEncoder::new(&mut png_bytes);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(png_bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn png_round_trips_pixels() {
        let img = RgbaImage::from_fn(7, 5, |x, y| {
            Rgba([u8::try_from(x * 30).unwrap(), u8::try_from(y * 50).unwrap(), 9, 200])
        });
        let bytes = to_png(&img).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn empty_raster_is_rejected() {
        let err = to_png(&RgbaImage::new(0, 4)).unwrap_err();
        assert!(matches!(err, ExportError::EmptyImage(d) if d == Dimensions::new(0, 4)));
    }
}
