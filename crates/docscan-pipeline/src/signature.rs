//! Signature layer: a transparent raster that collects pen strokes.
//!
//! Strokes are rasterized incrementally with `tiny-skia` as the pointer
//! moves: anti-aliased, round caps and joins, in a bright drawing ink.
//! [`SignatureLayer::freeze`] copies the current state out as straight
//! (non-premultiplied) RGBA for the compositor.

use image::{Rgba, RgbaImage};
use tiny_skia::{Color, FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};

use crate::types::{Dimensions, Point, ScanError};

/// Ink used while drawing, chosen to stand out over any document.
pub const DRAWING_INK: [u8; 4] = [0, 90, 255, 255];

/// Pen width in layer pixels.
pub const STROKE_WIDTH: f32 = 3.0;

/// A mutable signature canvas.
pub struct SignatureLayer {
    pixmap: Pixmap,
    last: Option<Point>,
    paint: Paint<'static>,
    stroke: Stroke,
}

impl std::fmt::Debug for SignatureLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureLayer")
            .field("width", &self.pixmap.width())
            .field("height", &self.pixmap.height())
            .field("drawing", &self.last.is_some())
            .finish_non_exhaustive()
    }
}

impl SignatureLayer {
    /// A fully transparent layer.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidGeometry`] if either dimension is zero.
    pub fn new(dimensions: Dimensions) -> Result<Self, ScanError> {
        let pixmap = Pixmap::new(dimensions.width, dimensions.height).ok_or_else(|| {
            ScanError::InvalidGeometry(format!(
                "signature layer needs non-zero dimensions, got {dimensions}"
            ))
        })?;

        let [r, g, b, a] = DRAWING_INK;
        let mut paint = Paint::default();
        paint.set_color_rgba8(r, g, b, a);
        paint.anti_alias = true;

        let stroke = Stroke {
            width: STROKE_WIDTH,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };

        Ok(Self {
            pixmap,
            last: None,
            paint,
            stroke,
        })
    }

    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.pixmap.width(), self.pixmap.height())
    }

    /// Whether a stroke is in progress.
    #[must_use]
    pub const fn is_drawing(&self) -> bool {
        self.last.is_some()
    }

    /// Put the pen down at `at`, leaving a dot.
    pub fn begin_stroke(&mut self, at: Point) {
        let (x, y) = to_f32(at);
        let dot = PathBuilder::from_circle(x, y, STROKE_WIDTH / 2.0);
        if let Some(dot) = dot {
            self.pixmap
                .fill_path(&dot, &self.paint, FillRule::Winding, Transform::identity(), None);
        }
        self.last = Some(at);
    }

    /// Draw a segment from the previous pen position to `to`.
    ///
    /// Ignored when no stroke is in progress.
    pub fn extend_stroke(&mut self, to: Point) {
        let Some(from) = self.last else {
            return;
        };

        let mut pb = PathBuilder::new();
        let (a, b) = (to_f32(from), to_f32(to));
        pb.move_to(a.0, a.1);
        pb.line_to(b.0, b.1);
        // Zero-length segments produce no path; the dot from
        // `begin_stroke` already covers them.
        if let Some(path) = pb.finish() {
            self.pixmap
                .stroke_path(&path, &self.paint, &self.stroke, Transform::identity(), None);
        }
        self.last = Some(to);
    }

    /// Lift the pen.
    pub fn end_stroke(&mut self) {
        self.last = None;
    }

    /// Erase everything.
    pub fn clear(&mut self) {
        self.pixmap.fill(Color::TRANSPARENT);
        self.last = None;
    }

    /// Whether nothing has been drawn.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.pixmap.pixels().iter().all(|p| p.alpha() == 0)
    }

    /// Copy the layer out as straight-alpha RGBA.
    #[must_use = "returns a copy of the layer"]
    pub fn freeze(&self) -> RgbaImage {
        let (width, height) = (self.pixmap.width(), self.pixmap.height());
        let mut img = RgbaImage::new(width, height);
        for (pixel, src) in img.pixels_mut().zip(self.pixmap.pixels()) {
            let c = src.demultiply();
            *pixel = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
        }
        img
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_f32(p: Point) -> (f32, f32) {
    (p.x as f32, p.y as f32)
}
