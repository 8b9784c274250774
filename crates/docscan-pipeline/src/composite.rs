//! Overlay compositor: merge a signature layer onto the document.
//!
//! Strokes are drawn in a bright color while signing so they stand out
//! over any content. In the final artifact every stroke pixel is
//! repainted in a single opaque ink color, whatever its drawing color
//! or anti-aliasing coverage was.

use image::{Rgba, RgbaImage};

/// Repaint every pixel with non-zero alpha as opaque `ink` and clear the
/// rest to fully transparent.
#[must_use = "returns the normalized layer"]
pub fn normalize_ink(layer: &RgbaImage, ink: Rgba<u8>) -> RgbaImage {
    let opaque = opaque(ink);
    RgbaImage::from_fn(layer.width(), layer.height(), |x, y| {
        if layer.get_pixel(x, y).0[3] > 0 {
            opaque
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

/// Draw `signature` over `base`.
///
/// Pixels where the signature's alpha is non-zero become opaque `ink`;
/// all other base pixels are left exactly as they were. When the two
/// rasters differ in size only the overlapping top-left region is
/// composited.
#[must_use = "returns the signed document"]
pub fn composite_signature(mut base: RgbaImage, signature: &RgbaImage, ink: Rgba<u8>) -> RgbaImage {
    let ink = opaque(ink);
    let width = base.width().min(signature.width());
    let height = base.height().min(signature.height());
    for y in 0..height {
        for x in 0..width {
            if signature.get_pixel(x, y).0[3] > 0 {
                base.put_pixel(x, y, ink);
            }
        }
    }
    base
}

const fn opaque(ink: Rgba<u8>) -> Rgba<u8> {
    let [r, g, b, _] = ink.0;
    Rgba([r, g, b, 255])
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    #[allow(clippy::cast_possible_truncation)]
    fn base() -> RgbaImage {
        RgbaImage::from_fn(8, 6, |x, y| Rgba([(x * 20) as u8, (y * 30) as u8, 200, 255]))
    }

    #[test]
    fn transparent_layer_leaves_base_untouched() {
        let layer = RgbaImage::new(8, 6);
        assert_eq!(composite_signature(base(), &layer, BLACK), base());
    }

    #[test]
    fn faint_stroke_pixels_become_opaque_ink() {
        let mut layer = RgbaImage::new(8, 6);
        layer.put_pixel(2, 3, Rgba([30, 90, 250, 1]));
        layer.put_pixel(5, 1, Rgba([30, 90, 250, 255]));
        let out = composite_signature(base(), &layer, BLACK);
        assert_eq!(*out.get_pixel(2, 3), BLACK);
        assert_eq!(*out.get_pixel(5, 1), BLACK);
        assert_eq!(out.get_pixel(0, 0), base().get_pixel(0, 0));
    }

    #[test]
    fn ink_alpha_is_forced_opaque() {
        let mut layer = RgbaImage::new(8, 6);
        layer.put_pixel(1, 1, Rgba([0, 0, 255, 255]));
        let out = composite_signature(base(), &layer, Rgba([10, 20, 30, 0]));
        assert_eq!(*out.get_pixel(1, 1), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn oversized_layer_is_clipped() {
        let mut layer = RgbaImage::new(20, 20);
        layer.put_pixel(15, 15, BLACK);
        layer.put_pixel(7, 5, BLACK);
        let out = composite_signature(base(), &layer, BLACK);
        assert_eq!(out.dimensions(), (8, 6));
        assert_eq!(*out.get_pixel(7, 5), BLACK);
    }

    #[test]
    fn normalize_repaints_strokes() {
        let mut layer = RgbaImage::new(3, 1);
        layer.put_pixel(0, 0, Rgba([0, 120, 255, 64]));
        let out = normalize_ink(&layer, BLACK);
        assert_eq!(*out.get_pixel(0, 0), BLACK);
        assert_eq!(*out.get_pixel(1, 0), Rgba([0, 0, 0, 0]));
    }
}
