//! The interactive scan as a typestate session.
//!
//! ```text
//! Captured --edit--> Editing --rectify--> Rectified --enhance--> Processed --sign--> Signed
//!                       ^                     |
//!                       +------reedit---------+
//! ```
//!
//! Each step consumes the previous state, so a session cannot skip a
//! stage or run one twice on stale data.

use image::{Rgba, RgbaImage};
use tracing::{debug, info};

use crate::composite::composite_signature;
use crate::detect::{Detection, Detector};
use crate::editor::CornerEditor;
use crate::enhance::{EnhanceWarning, Enhancer};
use crate::geometry::default_corners;
use crate::rectify::{TargetSize, rectify};
use crate::scanner::FrameSource;
use crate::signature::SignatureLayer;
use crate::types::{Dimensions, ProcessingMode, Quadrilateral, ScanError, ScanOutput, ScanResult};

/// A frame has been captured.
#[derive(Debug, Clone)]
pub struct Captured {
    frame: RgbaImage,
}

impl Captured {
    /// # Errors
    ///
    /// Returns [`ScanError::EmptyInput`] for a zero-size frame.
    pub fn new(frame: RgbaImage) -> Result<Self, ScanError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(ScanError::EmptyInput);
        }
        Ok(Self { frame })
    }

    /// Take one frame from `source` and release the camera.
    ///
    /// # Errors
    ///
    /// Propagates acquisition errors, and [`ScanError::EmptyInput`] for a
    /// zero-size frame.
    pub fn from_source<S: FrameSource + ?Sized>(source: &mut S) -> Result<Self, ScanError> {
        let frame = source.acquire_frame();
        source.release_camera();
        Self::new(frame?)
    }

    #[must_use]
    pub const fn frame(&self) -> &RgbaImage {
        &self.frame
    }

    /// Auto-detect the outline and start editing it. Falls back to
    /// [`default_corners`] when nothing is detected.
    #[must_use]
    pub fn edit(self, detector: &Detector) -> Editing {
        let canvas = Dimensions::of(&self.frame);
        let (quad, detected) = match detector.detect(&self.frame) {
            Detection::Found(candidate) => (candidate.polygon, true),
            Detection::NotDetected => {
                debug!(%canvas, "no outline, using default corners");
                (default_corners(canvas), false)
            }
        };
        Editing {
            frame: self.frame,
            editor: CornerEditor::new(quad, canvas),
            detected,
        }
    }

    /// Start editing from explicit corners.
    #[must_use]
    pub fn edit_with(self, corners: Quadrilateral) -> Editing {
        let canvas = Dimensions::of(&self.frame);
        Editing {
            frame: self.frame,
            editor: CornerEditor::new(corners, canvas),
            detected: false,
        }
    }
}

/// Corners are being adjusted.
#[derive(Debug, Clone)]
pub struct Editing {
    frame: RgbaImage,
    editor: CornerEditor,
    detected: bool,
}

impl Editing {
    #[must_use]
    pub const fn frame(&self) -> &RgbaImage {
        &self.frame
    }

    #[must_use]
    pub const fn editor(&self) -> &CornerEditor {
        &self.editor
    }

    pub const fn editor_mut(&mut self) -> &mut CornerEditor {
        &mut self.editor
    }

    /// Whether the starting corners came from auto-detection.
    #[must_use]
    pub const fn detected(&self) -> bool {
        self.detected
    }

    /// Flatten the document using the edited corners, in editor order.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidGeometry`] for degenerate corners. The
    /// editing state is lost; call [`Captured::edit_with`] to retry.
    pub fn rectify(self, background: Rgba<u8>) -> Result<Rectified, ScanError> {
        let quad = self.editor.into_quad();
        let rectified = rectify(&self.frame, &quad, TargetSize::Auto, background)?;
        info!(
            width = rectified.width(),
            height = rectified.height(),
            "document rectified"
        );
        Ok(Rectified {
            result: ScanResult::new(quad, rectified, self.frame),
        })
    }
}

/// The document has been flattened.
#[derive(Debug, Clone)]
pub struct Rectified {
    result: ScanResult,
}

impl Rectified {
    #[must_use]
    pub const fn result(&self) -> &ScanResult {
        &self.result
    }

    #[must_use]
    pub fn into_result(self) -> ScanResult {
        self.result
    }

    /// Go back to corner editing on the original frame.
    #[must_use]
    pub fn reedit(self) -> Editing {
        let (contour, _, frame) = self.result.into_parts();
        Captured { frame }.edit_with(contour)
    }

    /// Run the enhancement chain for `mode`.
    #[must_use]
    pub fn enhance(self, enhancer: &Enhancer, mode: ProcessingMode) -> Processed {
        let (contour, rectified, _) = self.result.into_parts();
        let enhanced = enhancer.enhance(rectified, mode);
        Processed {
            contour,
            image: enhanced.image,
            mode,
            warning: enhanced.warning,
        }
    }
}

/// The document has been enhanced and can be signed.
#[derive(Debug, Clone)]
pub struct Processed {
    contour: Quadrilateral,
    image: RgbaImage,
    mode: ProcessingMode,
    warning: Option<EnhanceWarning>,
}

impl Processed {
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub const fn warning(&self) -> Option<&EnhanceWarning> {
        self.warning.as_ref()
    }

    /// An empty signature layer the size of the processed raster.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidGeometry`] if the raster is empty.
    pub fn signature_layer(&self) -> Result<SignatureLayer, ScanError> {
        SignatureLayer::new(Dimensions::of(&self.image))
    }

    /// Composite `layer` in `ink`.
    #[must_use]
    pub fn sign(self, layer: &SignatureLayer, ink: Rgba<u8>) -> Signed {
        let image = composite_signature(self.image, &layer.freeze(), ink);
        Signed {
            output: ScanOutput {
                contour: self.contour,
                image,
                mode: self.mode,
                warning: self.warning,
            },
        }
    }

    /// Finish without a signature.
    #[must_use]
    pub fn into_output(self) -> ScanOutput {
        ScanOutput {
            contour: self.contour,
            image: self.image,
            mode: self.mode,
            warning: self.warning,
        }
    }
}

/// The final, signed artifact.
#[derive(Debug, Clone)]
pub struct Signed {
    output: ScanOutput,
}

impl Signed {
    #[must_use]
    pub const fn output(&self) -> &ScanOutput {
        &self.output
    }

    #[must_use]
    pub fn into_output(self) -> ScanOutput {
        self.output
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::detect::DetectorConfig;
    use crate::editor::ArrowKey;
    use crate::enhance::EnhanceConfig;
    use crate::scanner::StillFrame;
    use crate::types::{Point, ScanConfig};

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn frame() -> RgbaImage {
        RgbaImage::from_fn(200, 160, |x, y| {
            if (30..170).contains(&x) && (20..140).contains(&y) {
                WHITE
            } else {
                BLACK
            }
        })
    }

    fn detector() -> Detector {
        Detector::new(DetectorConfig::interactive()).unwrap()
    }

    #[test]
    fn empty_capture_rejected() {
        assert!(matches!(
            Captured::new(RgbaImage::new(0, 5)),
            Err(ScanError::EmptyInput)
        ));
    }

    #[test]
    fn edit_uses_detected_corners() {
        let editing = Captured::new(frame()).unwrap().edit(&detector());
        assert!(editing.detected());
        let tl = editing.editor().quad().top_left();
        assert!(tl.distance(Point::new(30.0, 20.0)) < 4.0, "{tl:?}");
    }

    #[test]
    fn edit_falls_back_to_default_corners() {
        let blank = RgbaImage::from_pixel(200, 100, BLACK);
        let editing = Captured::new(blank).unwrap().edit(&detector());
        assert!(!editing.detected());
        assert_eq!(editing.editor().quad().top_left(), Point::new(20.0, 10.0));
        assert_eq!(editing.editor().quad().bottom_right(), Point::new(180.0, 90.0));
    }

    #[test]
    fn full_session_signs_document() {
        let mut source = StillFrame::new(frame());
        let mut editing = Captured::from_source(&mut source)
            .unwrap()
            .edit(&detector());
        assert!(source.is_released());

        editing.editor_mut().select(0);
        editing.editor_mut().key(ArrowKey::Right);

        let rectified = editing.rectify(WHITE).unwrap();
        let dims = rectified.result().rectified().dimensions();
        let enhancer = Enhancer::new(EnhanceConfig::default()).unwrap();
        let processed = rectified.enhance(&enhancer, ProcessingMode::BlackAndWhite);
        assert!(processed.warning().is_none());
        assert_eq!(processed.image().dimensions(), dims);

        let mut layer = processed.signature_layer().unwrap();
        layer.begin_stroke(Point::new(5.0, 5.0));
        layer.extend_stroke(Point::new(40.0, 40.0));
        layer.end_stroke();

        let ink = Rgba(ScanConfig::DEFAULT_INK);
        let signed = processed.sign(&layer, ink);
        let out = signed.output();
        assert_eq!(*out.image.get_pixel(20, 20), ink);
        assert_eq!(out.mode, ProcessingMode::BlackAndWhite);
    }

    #[test]
    fn reedit_keeps_corners_and_frame() {
        let corners = Quadrilateral::new([
            Point::new(30.0, 20.0),
            Point::new(169.0, 20.0),
            Point::new(169.0, 139.0),
            Point::new(30.0, 139.0),
        ]);
        let rectified = Captured::new(frame())
            .unwrap()
            .edit_with(corners)
            .rectify(WHITE)
            .unwrap();
        let editing = rectified.reedit();
        assert_eq!(*editing.editor().quad(), corners);
        assert_eq!(editing.frame().dimensions(), (200, 160));
    }

    #[test]
    fn degenerate_corners_fail_rectification() {
        let collapsed = Quadrilateral::new([Point::new(50.0, 50.0); 4]);
        let result = Captured::new(frame()).unwrap().edit_with(collapsed).rectify(WHITE);
        assert!(matches!(result, Err(ScanError::InvalidGeometry(_))));
    }

    #[test]
    fn unsigned_output_keeps_enhanced_raster() {
        let enhancer = Enhancer::new(EnhanceConfig::default()).unwrap();
        let processed = Captured::new(frame())
            .unwrap()
            .edit(&detector())
            .rectify(WHITE)
            .unwrap()
            .enhance(&enhancer, ProcessingMode::Enhanced);
        let expected = processed.image().clone();
        let output = processed.into_output();
        assert_eq!(output.image, expected);
    }
}
