//! Denoising filters: median for binarized scans, non-local means for
//! color documents.

use image::{GrayImage, Rgba, RgbaImage};
use imageproc::filter::median_filter;
use serde::{Deserialize, Serialize};

use crate::types::ScanError;

/// Median filter with a square `kernel`×`kernel` window.
///
/// # Errors
///
/// Returns [`ScanError::InvalidConfig`] if `kernel` is even or zero.
pub fn median(gray: &GrayImage, kernel: u32) -> Result<GrayImage, ScanError> {
    if kernel == 0 || kernel % 2 == 0 {
        return Err(ScanError::InvalidConfig(format!(
            "median kernel must be odd and positive, got {kernel}"
        )));
    }
    if gray.width() == 0 || gray.height() == 0 {
        return Ok(gray.clone());
    }
    let radius = kernel / 2;
    Ok(median_filter(gray, radius, radius))
}

/// Parameters for [`non_local_means_color`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NlMeansParams {
    /// Filter strength for the luminance plane.
    pub luminance_strength: f32,
    /// Filter strength for the two chroma planes.
    pub color_strength: f32,
    /// Side of the compared patches (odd).
    pub template_window: u32,
    /// Side of the search area around each pixel (odd).
    pub search_window: u32,
}

impl NlMeansParams {
    pub const DEFAULT_STRENGTH: f32 = 10.0;
    pub const DEFAULT_TEMPLATE_WINDOW: u32 = 7;
    pub const DEFAULT_SEARCH_WINDOW: u32 = 21;

    /// # Errors
    ///
    /// Returns [`ScanError::InvalidConfig`] for even or zero windows and
    /// non-positive strengths.
    pub fn validate(&self) -> Result<(), ScanError> {
        for (name, size) in [
            ("template_window", self.template_window),
            ("search_window", self.search_window),
        ] {
            if size == 0 || size % 2 == 0 {
                return Err(ScanError::InvalidConfig(format!(
                    "{name} must be odd and positive, got {size}"
                )));
            }
        }
        if !(self.luminance_strength > 0.0 && self.color_strength > 0.0) {
            return Err(ScanError::InvalidConfig(
                "non-local means strengths must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for NlMeansParams {
    fn default() -> Self {
        Self {
            luminance_strength: Self::DEFAULT_STRENGTH,
            color_strength: Self::DEFAULT_STRENGTH,
            template_window: Self::DEFAULT_TEMPLATE_WINDOW,
            search_window: Self::DEFAULT_SEARCH_WINDOW,
        }
    }
}

/// Color-preserving non-local means.
///
/// The image is split into luminance and chroma (`YCbCr`). Luminance is
/// averaged over similar luminance patches with `luminance_strength`;
/// both chroma planes are averaged together over similar chroma patches
/// with `color_strength`. Alpha passes through untouched.
///
/// # Errors
///
/// Returns [`ScanError::InvalidConfig`] for even window sizes or
/// non-positive strengths.
pub fn non_local_means_color(
    image: &RgbaImage,
    params: &NlMeansParams,
) -> Result<RgbaImage, ScanError> {
    params.validate()?;
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Ok(image.clone());
    }

    let n = w as usize * h as usize;
    let mut y_plane = Vec::with_capacity(n);
    let mut cb_plane = Vec::with_capacity(n);
    let mut cr_plane = Vec::with_capacity(n);
    for px in image.pixels() {
        let [y, cb, cr] = to_ycbcr(*px);
        y_plane.push(y);
        cb_plane.push(cb);
        cr_plane.push(cr);
    }

    let grid = Grid {
        width: w as usize,
        height: h as usize,
        template_radius: params.template_window as usize / 2,
        search_radius: params.search_window as usize / 2,
    };
    let luma = grid.filter(&[y_plane], params.luminance_strength);
    let chroma = grid.filter(&[cb_plane, cr_plane], params.color_strength);

    let mut out = image.clone();
    for (i, px) in out.pixels_mut().enumerate() {
        let [r, g, b] = from_ycbcr(luma[0][i], chroma[0][i], chroma[1][i]);
        *px = Rgba([r, g, b, px.0[3]]);
    }
    Ok(out)
}

/// BT.601 full-range conversion.
fn to_ycbcr(px: Rgba<u8>) -> [f32; 3] {
    let [r, g, b, _] = px.0.map(f32::from);
    let y = 0.114f32.mul_add(b, 0.299f32.mul_add(r, 0.587 * g));
    let cb = 0.5f32.mul_add(b, (-0.168_736f32).mul_add(r, -0.331_264 * g)) + 128.0;
    let cr = (-0.081_312f32).mul_add(b, 0.5f32.mul_add(r, -0.418_688 * g)) + 128.0;
    [y, cb, cr]
}

fn from_ycbcr(y: f32, cb: f32, cr: f32) -> [u8; 3] {
    let cb = cb - 128.0;
    let cr = cr - 128.0;
    let r = 1.402f32.mul_add(cr, y);
    let g = (-0.714_136f32).mul_add(cr, (-0.344_136f32).mul_add(cb, y));
    let b = 1.772f32.mul_add(cb, y);
    [r, g, b].map(|v| {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let byte = v.round().clamp(0.0, 255.0) as u8;
        byte
    })
}

/// Plane geometry and window radii shared by every plane group.
struct Grid {
    width: usize,
    height: usize,
    template_radius: usize,
    search_radius: usize,
}

impl Grid {
    /// Filter a group of planes that share patch weights.
    ///
    /// For every search offset the per-pixel squared difference against
    /// the shifted image is summed over the template window with an
    /// integral image, turned into a weight, and accumulated.
    fn filter(&self, planes: &[Vec<f32>], strength: f32) -> Vec<Vec<f32>> {
        let n = self.width * self.height;
        let h2 = strength * strength;
        #[allow(clippy::cast_precision_loss)]
        let channels = planes.len() as f32;

        let mut acc = vec![vec![0.0_f32; n]; planes.len()];
        let mut weight_sum = vec![0.0_f32; n];
        let mut diff = vec![0.0_f32; n];
        let mut shifted = vec![0_usize; n];
        let mut integral = vec![0.0_f64; (self.width + 1) * (self.height + 1)];

        let r = self.search_radius.cast_signed();
        for dy in -r..=r {
            for dx in -r..=r {
                for y in 0..self.height {
                    let sy = shift(y, dy, self.height);
                    for x in 0..self.width {
                        let sx = shift(x, dx, self.width);
                        let i = y * self.width + x;
                        let j = sy * self.width + sx;
                        shifted[i] = j;
                        diff[i] = planes
                            .iter()
                            .map(|p| {
                                let d = p[i] - p[j];
                                d * d
                            })
                            .sum();
                    }
                }
                self.integrate(&diff, &mut integral);

                for (i, &j) in shifted.iter().enumerate() {
                    let dist = self.window_mean(&integral, i) / channels;
                    let weight = (-dist / h2).exp();
                    weight_sum[i] += weight;
                    for (a, p) in acc.iter_mut().zip(planes) {
                        a[i] += weight * p[j];
                    }
                }
            }
        }

        acc.into_iter()
            .map(|plane| {
                plane
                    .into_iter()
                    .zip(&weight_sum)
                    .map(|(v, &ws)| v / ws)
                    .collect()
            })
            .collect()
    }

    /// Summed-area table with a zero first row and column.
    fn integrate(&self, values: &[f32], integral: &mut [f64]) {
        let stride = self.width + 1;
        for y in 0..self.height {
            let mut row = 0.0_f64;
            for x in 0..self.width {
                row += f64::from(values[y * self.width + x]);
                integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row;
            }
        }
    }

    /// Mean of `values` over the template window centered on pixel `i`,
    /// clipped to the image.
    fn window_mean(&self, integral: &[f64], i: usize) -> f32 {
        let stride = self.width + 1;
        let (x, y) = (i % self.width, i / self.width);
        let x0 = x.saturating_sub(self.template_radius);
        let y0 = y.saturating_sub(self.template_radius);
        let x1 = (x + self.template_radius + 1).min(self.width);
        let y1 = (y + self.template_radius + 1).min(self.height);
        let sum = integral[y1 * stride + x1] - integral[y0 * stride + x1]
            - integral[y1 * stride + x0]
            + integral[y0 * stride + x0];
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let mean = (sum / ((x1 - x0) * (y1 - y0)) as f64) as f32;
        mean
    }
}

/// `v + delta`, replicated at the border.
fn shift(v: usize, delta: isize, len: usize) -> usize {
    v.saturating_add_signed(delta).min(len - 1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Luma;

    fn small_params() -> NlMeansParams {
        NlMeansParams {
            template_window: 3,
            search_window: 7,
            ..NlMeansParams::default()
        }
    }

    #[test]
    fn median_removes_salt_and_pepper() {
        let mut img = GrayImage::from_pixel(9, 9, Luma([255]));
        img.put_pixel(4, 4, Luma([0]));
        img.put_pixel(2, 6, Luma([0]));
        let out = median(&img, 3).unwrap();
        assert!(out.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn median_keeps_solid_regions() {
        let img = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 0 } else { 255 }]));
        let out = median(&img, 3).unwrap();
        assert_eq!(out.get_pixel(2, 5).0[0], 0);
        assert_eq!(out.get_pixel(7, 5).0[0], 255);
    }

    #[test]
    fn median_rejects_even_kernel() {
        assert!(median(&GrayImage::new(3, 3), 4).is_err());
    }

    #[test]
    fn ycbcr_round_trip() {
        for px in [
            Rgba([0, 0, 0, 255]),
            Rgba([255, 255, 255, 255]),
            Rgba([200, 30, 90, 255]),
            Rgba([12, 240, 128, 255]),
        ] {
            let [y, cb, cr] = to_ycbcr(px);
            let back = from_ycbcr(y, cb, cr);
            for c in 0..3 {
                let diff = i16::from(back[c]) - i16::from(px.0[c]);
                assert!(diff.abs() <= 1, "{px:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn constant_image_unchanged() {
        let img = RgbaImage::from_pixel(12, 10, Rgba([180, 120, 60, 200]));
        let out = non_local_means_color(&img, &small_params()).unwrap();
        for (a, b) in out.pixels().zip(img.pixels()) {
            for c in 0..3 {
                assert!((i16::from(a.0[c]) - i16::from(b.0[c])).abs() <= 1);
            }
            assert_eq!(a.0[3], 200, "alpha must pass through");
        }
    }

    #[test]
    fn noise_is_reduced() {
        // Deterministic +/-6 checker noise on mid gray.
        let img = RgbaImage::from_fn(20, 20, |x, y| {
            let v = if (x + y) % 2 == 0 { 134 } else { 122 };
            Rgba([v, v, v, 255])
        });
        let out = non_local_means_color(&img, &small_params()).unwrap();
        let spread = |im: &RgbaImage| {
            let (lo, hi) = im
                .pixels()
                .fold((255, 0), |(lo, hi), p| (p.0[0].min(lo), p.0[0].max(hi)));
            hi - lo
        };
        assert!(spread(&out) < spread(&img), "spread {} -> {}", spread(&img), spread(&out));
    }

    #[test]
    fn strong_edge_preserved() {
        let img = RgbaImage::from_fn(20, 20, |x, _| {
            if x < 10 { Rgba([20, 20, 20, 255]) } else { Rgba([235, 235, 235, 255]) }
        });
        let out = non_local_means_color(&img, &small_params()).unwrap();
        assert!(out.get_pixel(8, 10).0[0] < 40);
        assert!(out.get_pixel(11, 10).0[0] > 215);
    }

    #[test]
    fn even_window_rejected() {
        let params = NlMeansParams {
            search_window: 20,
            ..NlMeansParams::default()
        };
        let img = RgbaImage::new(4, 4);
        assert!(matches!(
            non_local_means_color(&img, &params),
            Err(ScanError::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_image_passes_through() {
        let img = RgbaImage::new(0, 0);
        assert_eq!(
            non_local_means_color(&img, &NlMeansParams::default())
                .unwrap()
                .dimensions(),
            (0, 0)
        );
    }
}
