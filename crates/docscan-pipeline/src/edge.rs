//! Canny edge detection and edge-map dilation.
//!
//! [`canny`] expects an already blurred grayscale raster; it does not blur
//! internally, so the caller controls smoothing through the detector's
//! kernel size. The result is a binary map where 255 marks an edge pixel
//! and 0 marks background.
//!
//! Gradients come from 3×3 Sobel kernels and use the L1 magnitude
//! `|gx| + |gy|`, so thresholds in the 50–200 range behave the way users
//! of other document scanners expect.

use std::collections::VecDeque;

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::distance_transform::Norm;
use imageproc::filter::filter_clamped;
use imageproc::kernel;

/// Minimum allowed Canny threshold.
///
/// A zero low threshold lets every pixel with any gradient through and
/// floods the contour stage with noise.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

const EDGE: Luma<u8> = Luma([255]);

/// Detect edges using the Canny algorithm.
///
/// Returns a binary image: 255 for edge pixels, 0 elsewhere.
///
/// Pixels with gradient magnitude above `high_threshold` seed edges;
/// pixels above `low_threshold` join an edge only when 8-connected to a
/// seed. Both thresholds are clamped to at least [`MIN_THRESHOLD`] and
/// `low_threshold` is clamped to at most `high_threshold`.
///
/// Images narrower or shorter than 3 pixels produce an empty edge map.
#[must_use = "returns the binary edge map"]
pub fn canny(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let (w, h) = image.dimensions();
    if w < 3 || h < 3 {
        return GrayImage::new(w, h);
    }

    let high = high_threshold.max(MIN_THRESHOLD);
    let low = low_threshold.max(MIN_THRESHOLD).min(high);

    let gx: Image<Luma<i16>> = filter_clamped(image, kernel::SOBEL_HORIZONTAL_3X3);
    let gy: Image<Luma<i16>> = filter_clamped(image, kernel::SOBEL_VERTICAL_3X3);
    let magnitude: Vec<f32> = gx
        .pixels()
        .zip(gy.pixels())
        .map(|(x, y)| f32::from(x.0[0].unsigned_abs()) + f32::from(y.0[0].unsigned_abs()))
        .collect();

    let thinned = non_maximum_suppression(&magnitude, &gx, &gy, w, h);
    hysteresis(&thinned, w, h, low, high)
}

/// Gradient direction quantized to the four neighbor axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Horizontal,
    Diagonal,
    Vertical,
    AntiDiagonal,
}

impl Direction {
    /// Quantize a gradient vector. `tan(22.5°) ≈ 0.4142`.
    fn from_gradient(gx: f32, gy: f32) -> Self {
        const TAN_22_5: f32 = 0.414_213_56;
        let ax = gx.abs();
        let ay = gy.abs();
        if ay <= ax * TAN_22_5 {
            Self::Horizontal
        } else if ax <= ay * TAN_22_5 {
            Self::Vertical
        } else if (gx > 0.0) == (gy > 0.0) {
            Self::Diagonal
        } else {
            Self::AntiDiagonal
        }
    }

    /// Offsets of the two neighbors compared during suppression.
    const fn neighbors(self) -> ((i64, i64), (i64, i64)) {
        match self {
            Self::Horizontal => ((-1, 0), (1, 0)),
            Self::Vertical => ((0, -1), (0, 1)),
            Self::Diagonal => ((-1, -1), (1, 1)),
            Self::AntiDiagonal => ((1, -1), (-1, 1)),
        }
    }
}

/// Keep only pixels that are local maxima across the gradient.
///
/// Ties on a plateau keep the first pixel in scan order: a pixel must be
/// strictly greater than its preceding neighbor and at least equal to
/// its following one.
fn non_maximum_suppression(
    magnitude: &[f32],
    gx: &Image<Luma<i16>>,
    gy: &Image<Luma<i16>>,
    w: u32,
    h: u32,
) -> Vec<f32> {
    let width = w as usize;
    let mut out = vec![0.0_f32; magnitude.len()];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let idx = y as usize * width + x as usize;
            let m = magnitude[idx];
            if m == 0.0 {
                continue;
            }
            let dir = Direction::from_gradient(
                f32::from(gx.get_pixel(x, y).0[0]),
                f32::from(gy.get_pixel(x, y).0[0]),
            );
            let ((ax, ay), (bx, by)) = dir.neighbors();
            let at = |dx: i64, dy: i64| {
                #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let n = ((i64::from(y) + dy) as usize) * width + (i64::from(x) + dx) as usize;
                magnitude[n]
            };
            let (before, after) = if ay < by || (ay == by && ax < bx) {
                (at(ax, ay), at(bx, by))
            } else {
                (at(bx, by), at(ax, ay))
            };
            if m > before && m >= after {
                out[idx] = m;
            }
        }
    }
    out
}

/// Breadth-first hysteresis over all 8 neighbors, bounds-checked at the
/// raster border.
fn hysteresis(thinned: &[f32], w: u32, h: u32, low: f32, high: f32) -> GrayImage {
    let mut out = GrayImage::new(w, h);
    let mut queue = VecDeque::new();

    for y in 0..h {
        for x in 0..w {
            let idx = y as usize * w as usize + x as usize;
            if thinned[idx] <= high || out.get_pixel(x, y).0[0] != 0 {
                continue;
            }
            out.put_pixel(x, y, EDGE);
            queue.push_back((x, y));

            while let Some((cx, cy)) = queue.pop_front() {
                for dy in -1_i64..=1 {
                    for dx in -1_i64..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = i64::from(cx) + dx;
                        let ny = i64::from(cy) + dy;
                        if nx < 0 || ny < 0 || nx >= i64::from(w) || ny >= i64::from(h) {
                            continue;
                        }
                        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                        let (nx, ny) = (nx as u32, ny as u32);
                        let n_idx = ny as usize * w as usize + nx as usize;
                        if thinned[n_idx] > low && out.get_pixel(nx, ny).0[0] == 0 {
                            out.put_pixel(nx, ny, EDGE);
                            queue.push_back((nx, ny));
                        }
                    }
                }
            }
        }
    }
    out
}

/// Dilate a binary edge map with a 3×3 square structuring element, one
/// iteration. Closes one-pixel gaps in document outlines.
#[must_use = "returns the dilated edge map"]
pub fn dilate(edges: &GrayImage) -> GrayImage {
    imageproc::morphology::dilate(edges, Norm::LInf, 1)
}
