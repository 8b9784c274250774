//! Perspective normalizer: homography solve and bilinear resampling.
//!
//! The homography is solved directly in the destination → source
//! direction, so every output pixel is produced by inverse mapping
//! without inverting a matrix. Samples that fall partly or fully outside
//! the source take the missing neighbors from a constant background.

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::side_extents;
use crate::types::{Dimensions, Point, Quadrilateral, ScanError};

/// Pivots smaller than this make the system singular.
const SINGULAR_EPSILON: f64 = 1e-10;

/// Output size of a rectification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetSize {
    /// `round(max width) × round(max height)` of the quadrilateral.
    #[default]
    Auto,
    Explicit(Dimensions),
}

/// A 3×3 projective transform, row-major, normalized so `m[8] == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    m: [f64; 9],
}

impl Homography {
    /// Solve for the transform taking each `from[i]` to `to[i]`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidGeometry`] when the points are
    /// non-finite or the correspondence is degenerate (three collinear
    /// points, repeated points).
    pub fn from_point_pairs(from: &[Point; 4], to: &[Point; 4]) -> Result<Self, ScanError> {
        if !from.iter().chain(to).all(|p| p.is_finite()) {
            return Err(ScanError::InvalidGeometry(
                "homography points must be finite".to_owned(),
            ));
        }

        // Rows of the augmented system [A | b] for h0..h7.
        let mut a = [[0.0_f64; 9]; 8];
        for (i, (s, d)) in from.iter().zip(to).enumerate() {
            a[2 * i] = [s.x, s.y, 1.0, 0.0, 0.0, 0.0, -s.x * d.x, -s.y * d.x, d.x];
            a[2 * i + 1] = [0.0, 0.0, 0.0, s.x, s.y, 1.0, -s.x * d.y, -s.y * d.y, d.y];
        }

        let h = solve_8x8(&mut a)?;
        Ok(Self {
            m: [h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0],
        })
    }

    /// The row-major coefficients.
    #[must_use]
    pub const fn matrix(&self) -> &[f64; 9] {
        &self.m
    }

    /// Map a point. `None` when it lands on the line at infinity.
    #[must_use]
    pub fn apply(&self, p: Point) -> Option<Point> {
        let m = &self.m;
        let w = m[6].mul_add(p.x, m[7].mul_add(p.y, m[8]));
        if w.abs() < SINGULAR_EPSILON {
            return None;
        }
        let x = m[0].mul_add(p.x, m[1].mul_add(p.y, m[2])) / w;
        let y = m[3].mul_add(p.x, m[4].mul_add(p.y, m[5])) / w;
        Some(Point::new(x, y))
    }
}

/// Gaussian elimination with partial pivoting on an augmented 8×9 system.
fn solve_8x8(a: &mut [[f64; 9]; 8]) -> Result<[f64; 8], ScanError> {
    for col in 0..8 {
        let pivot = (col..8)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < SINGULAR_EPSILON {
            return Err(ScanError::InvalidGeometry(
                "degenerate corners: perspective transform is singular".to_owned(),
            ));
        }
        a.swap(col, pivot);

        for row in (col + 1)..8 {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..9 {
                a[row][k] -= factor * a[col][k];
            }
        }
    }

    let mut x = [0.0_f64; 8];
    for row in (0..8).rev() {
        let tail: f64 = ((row + 1)..8).map(|k| a[row][k] * x[k]).sum();
        x[row] = (a[row][8] - tail) / a[row][row];
    }
    Ok(x)
}

/// Size the rectified document would have with [`TargetSize::Auto`].
///
/// # Errors
///
/// Returns [`ScanError::InvalidGeometry`] if either side rounds to zero.
pub fn output_dimensions(quad: &Quadrilateral) -> Result<Dimensions, ScanError> {
    let (width, height) = side_extents(quad);
    if !(width.is_finite() && height.is_finite()) {
        return Err(ScanError::InvalidGeometry(
            "corner coordinates must be finite".to_owned(),
        ));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let dims = Dimensions::new(width.round() as u32, height.round() as u32);
    if dims.is_empty() {
        return Err(ScanError::InvalidGeometry(format!(
            "document outline has zero extent ({width:.1}x{height:.1})"
        )));
    }
    Ok(dims)
}

/// Warp the region of `source` outlined by `quad` onto an axis-aligned
/// rectangle.
///
/// `quad` must already be ordered `[TL, TR, BR, BL]`. The corners map to
/// `(0,0)`, `(W-1,0)`, `(W-1,H-1)` and `(0,H-1)` of the output. An axis
/// one pixel long samples the midline between the two opposite sides.
///
/// # Errors
///
/// Returns [`ScanError::EmptyInput`] for an empty source and
/// [`ScanError::InvalidGeometry`] for zero-size targets or degenerate
/// corners.
#[tracing::instrument(skip_all, fields(target = ?target))]
pub fn rectify(
    source: &RgbaImage,
    quad: &Quadrilateral,
    target: TargetSize,
    background: Rgba<u8>,
) -> Result<RgbaImage, ScanError> {
    if source.width() == 0 || source.height() == 0 {
        return Err(ScanError::EmptyInput);
    }

    let dims = match target {
        TargetSize::Auto => output_dimensions(quad)?,
        TargetSize::Explicit(dims) if dims.is_empty() => {
            return Err(ScanError::InvalidGeometry(format!(
                "target dimensions must be non-zero, got {dims}"
            )));
        }
        TargetSize::Explicit(dims) => dims,
    };

    // Solved against the unit square so one-pixel targets stay regular.
    let unit = [
        Point::new(0.0, 0.0),
        Point::new(1.0, 0.0),
        Point::new(1.0, 1.0),
        Point::new(0.0, 1.0),
    ];
    let to_source = Homography::from_point_pairs(&unit, quad.corners())?;
    debug!(%dims, "rectifying");

    let out = RgbaImage::from_fn(dims.width, dims.height, |x, y| {
        let at = Point::new(unit_coordinate(x, dims.width), unit_coordinate(y, dims.height));
        to_source
            .apply(at)
            .map_or(background, |p| sample_bilinear(source, p, background))
    });
    Ok(out)
}

/// Position of pixel `i` along an axis of `len` pixels, with the first
/// pixel at 0 and the last at 1. A single pixel sits at 0.5.
fn unit_coordinate(i: u32, len: u32) -> f64 {
    if len > 1 {
        f64::from(i) / f64::from(len - 1)
    } else {
        0.5
    }
}

/// Bilinear sample at a fractional position. Neighbors outside the
/// raster contribute `background`.
#[must_use]
pub fn sample_bilinear(image: &RgbaImage, p: Point, background: Rgba<u8>) -> Rgba<u8> {
    if !p.is_finite() {
        return background;
    }
    let x0 = p.x.floor();
    let y0 = p.y.floor();
    let fx = p.x - x0;
    let fy = p.y - y0;

    // Far outside: skip the float → int conversion entirely.
    if x0 < -1.0 || y0 < -1.0 || x0 > f64::from(image.width()) || y0 > f64::from(image.height()) {
        return background;
    }
    #[allow(clippy::cast_possible_truncation)]
    let (ix, iy) = (x0 as i64, y0 as i64);

    let fetch = |x: i64, y: i64| -> [f64; 4] {
        let px = match (u32::try_from(x), u32::try_from(y)) {
            (Ok(x), Ok(y)) if x < image.width() && y < image.height() => *image.get_pixel(x, y),
            _ => background,
        };
        px.0.map(f64::from)
    };

    let tl = fetch(ix, iy);
    let tr = fetch(ix + 1, iy);
    let bl = fetch(ix, iy + 1);
    let br = fetch(ix + 1, iy + 1);

    let mut out = [0_u8; 4];
    for c in 0..4 {
        let top = (tr[c] - tl[c]).mul_add(fx, tl[c]);
        let bottom = (br[c] - bl[c]).mul_add(fx, bl[c]);
        let v = (bottom - top).mul_add(fy, top);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let byte = v.round().clamp(0.0, 255.0) as u8;
        out[c] = byte;
    }
    Rgba(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([
                u8::try_from(x * 255 / w).unwrap(),
                u8::try_from(y * 255 / h).unwrap(),
                90,
                255,
            ])
        })
    }

    fn own_corners(img: &RgbaImage) -> Quadrilateral {
        let r = f64::from(img.width() - 1);
        let b = f64::from(img.height() - 1);
        Quadrilateral::new([p(0.0, 0.0), p(r, 0.0), p(r, b), p(0.0, b)])
    }

    #[test]
    fn identity_homography() {
        let square = [p(0.0, 0.0), p(10.0, 0.0), p(10.0, 10.0), p(0.0, 10.0)];
        let h = Homography::from_point_pairs(&square, &square).unwrap();
        let expected = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        for (a, b) in h.matrix().iter().zip(expected) {
            assert!((a - b).abs() < 1e-9, "{:?}", h.matrix());
        }
    }

    #[test]
    fn homography_maps_corners_exactly() {
        let from = [p(0.0, 0.0), p(599.0, 0.0), p(599.0, 799.0), p(0.0, 799.0)];
        let to = [p(32.0, 40.0), p(610.0, 12.0), p(640.0, 820.0), p(8.0, 790.0)];
        let h = Homography::from_point_pairs(&from, &to).unwrap();
        for (f, t) in from.iter().zip(&to) {
            let mapped = h.apply(*f).unwrap();
            assert!(mapped.distance(*t) < 1e-6, "{f:?} -> {mapped:?}, want {t:?}");
        }
    }

    #[test]
    fn collinear_corners_are_singular() {
        let from = [p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 1.0)];
        let line = [p(0.0, 0.0), p(1.0, 1.0), p(2.0, 2.0), p(3.0, 3.0)];
        assert!(matches!(
            Homography::from_point_pairs(&from, &line),
            Err(ScanError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn auto_dimensions_use_longer_sides() {
        let quad = Quadrilateral::new([p(10.0, 10.0), p(110.0, 12.0), p(108.0, 160.0), p(12.0, 158.0)]);
        let dims = output_dimensions(&quad).unwrap();
        assert_eq!(dims, Dimensions::new(100, 148));
    }

    #[test]
    fn zero_extent_is_invalid() {
        let flat = Quadrilateral::new([p(5.0, 5.0), p(5.0, 5.0), p(5.0, 5.0), p(5.0, 5.0)]);
        assert!(matches!(
            output_dimensions(&flat),
            Err(ScanError::InvalidGeometry(_))
        ));
        let img = gradient(10, 10);
        let err = rectify(&img, &flat, TargetSize::Auto, WHITE).unwrap_err();
        assert!(matches!(err, ScanError::InvalidGeometry(_)));
        let err = rectify(
            &img,
            &own_corners(&img),
            TargetSize::Explicit(Dimensions::new(0, 4)),
            WHITE,
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::InvalidGeometry(_)));
    }

    #[test]
    fn identity_rectification_reproduces_source() {
        let img = gradient(37, 23);
        let out = rectify(
            &img,
            &own_corners(&img),
            TargetSize::Explicit(Dimensions::of(&img)),
            WHITE,
        )
        .unwrap();
        assert_eq!(out.dimensions(), img.dimensions());
        for (a, b) in out.pixels().zip(img.pixels()) {
            for c in 0..4 {
                let diff = i16::from(a.0[c]) - i16::from(b.0[c]);
                assert!(diff.abs() <= 1, "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn auto_identity_drops_one_pixel() {
        // Corners at pixel centers span W-1 pixels.
        let img = gradient(40, 30);
        let out = rectify(&img, &own_corners(&img), TargetSize::Auto, WHITE).unwrap();
        assert_eq!(out.dimensions(), (39, 29));
    }

    #[test]
    fn out_of_frame_filled_with_background() {
        let img = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        // Outline extends well beyond the right edge.
        let quad = Quadrilateral::new([p(0.0, 0.0), p(59.0, 0.0), p(59.0, 19.0), p(0.0, 19.0)]);
        let out = rectify(&img, &quad, TargetSize::Explicit(Dimensions::new(60, 20)), WHITE).unwrap();
        assert_eq!(*out.get_pixel(5, 10), Rgba([0, 0, 0, 255]));
        assert_eq!(*out.get_pixel(50, 10), WHITE);
    }

    #[test]
    fn single_pixel_axes_sample_midline() {
        // Left half black, right half white.
        let img = RgbaImage::from_fn(20, 10, |x, _| {
            if x < 10 { Rgba([0, 0, 0, 255]) } else { WHITE }
        });
        let quad = own_corners(&img);

        let column = rectify(&img, &quad, TargetSize::Explicit(Dimensions::new(1, 10)), WHITE).unwrap();
        assert_eq!(column.dimensions(), (1, 10));
        // x = 9.5 sits between the last black and first white column.
        let mid = column.get_pixel(0, 5).0[0];
        assert!((120..=135).contains(&mid), "mid = {mid}");

        let row = rectify(&img, &quad, TargetSize::Explicit(Dimensions::new(20, 1)), WHITE).unwrap();
        assert_eq!(row.dimensions(), (20, 1));
        assert_eq!(*row.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(*row.get_pixel(19, 0), WHITE);

        let dot = rectify(&img, &quad, TargetSize::Explicit(Dimensions::new(1, 1)), WHITE).unwrap();
        assert_eq!(dot.dimensions(), (1, 1));
    }

    #[test]
    fn auto_size_of_one_pixel_succeeds() {
        let img = RgbaImage::from_pixel(10, 10, Rgba([40, 40, 40, 255]));
        let sliver = Quadrilateral::new([p(2.0, 2.0), p(3.0, 2.0), p(3.0, 8.0), p(2.0, 8.0)]);
        let out = rectify(&img, &sliver, TargetSize::Auto, WHITE).unwrap();
        assert_eq!(out.dimensions(), (1, 6));
        assert!(out.pixels().all(|px| *px == Rgba([40, 40, 40, 255])));
    }

    #[test]
    fn empty_source_rejected() {
        let quad = Quadrilateral::new([p(0.0, 0.0), p(5.0, 0.0), p(5.0, 5.0), p(0.0, 5.0)]);
        assert!(matches!(
            rectify(&RgbaImage::new(0, 0), &quad, TargetSize::Auto, WHITE),
            Err(ScanError::EmptyInput)
        ));
    }

    #[test]
    fn bilinear_midpoint() {
        let img = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 { Rgba([0, 0, 0, 255]) } else { Rgba([200, 100, 50, 255]) }
        });
        let mid = sample_bilinear(&img, p(0.5, 0.0), WHITE);
        assert_eq!(mid, Rgba([100, 50, 25, 255]));
        assert_eq!(sample_bilinear(&img, p(-5.0, 0.0), WHITE), WHITE);
        assert_eq!(sample_bilinear(&img, p(f64::NAN, 0.0), WHITE), WHITE);
    }

    #[test]
    fn rotated_quad_rectifies_upright() {
        // Black square rotated inside a white frame; rectifying its
        // outline yields an all-black document.
        let quad = Quadrilateral::new([p(50.0, 20.0), p(80.0, 50.0), p(50.0, 80.0), p(20.0, 50.0)]);
        let img = RgbaImage::from_fn(100, 100, |x, y| {
            let (dx, dy) = ((f64::from(x) - 50.0).abs(), (f64::from(y) - 50.0).abs());
            if dx + dy <= 33.0 { Rgba([0, 0, 0, 255]) } else { WHITE }
        });
        let out = rectify(&img, &quad, TargetSize::Auto, WHITE).unwrap();
        assert_eq!(out.dimensions(), (42, 42));
        let dark = out.pixels().filter(|px| px.0[0] < 10).count();
        assert!(dark * 10 >= out.pixels().count() * 9, "{dark} dark pixels");
    }
}
