//! Contour tracing: extract closed boundaries from a binary edge map.
//!
//! The [`ContourTracer`] trait abstracts the tracing algorithm and
//! [`ContourRetrieval`] selects which boundaries are reported. Both
//! modes use Suzuki-Abe border following from
//! `imageproc::contours::find_contours`.

use image::GrayImage;
use imageproc::contours::BorderType;
use serde::{Deserialize, Serialize};

use crate::types::{Contour, Point};

/// Which traced boundaries to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContourRetrieval {
    /// Only outermost boundaries (no parent). Fastest, and ignores text
    /// and table lines printed inside the document.
    #[default]
    External,
    /// Every boundary, outer and hole, without hierarchy.
    List,
}

/// Trait for contour tracing strategies.
///
/// Input: a binary edge map (non-zero pixels are foreground).
/// Output: one [`Contour`] per traced boundary.
pub trait ContourTracer {
    /// Trace contours in the given binary edge map.
    fn trace(&self, edges: &GrayImage) -> Vec<Contour>;
}

impl ContourTracer for ContourRetrieval {
    fn trace(&self, edges: &GrayImage) -> Vec<Contour> {
        let contours: Vec<imageproc::contours::Contour<u32>> =
            imageproc::contours::find_contours(edges);

        contours
            .into_iter()
            .filter(|c| match self {
                Self::External => c.border_type == BorderType::Outer && c.parent.is_none(),
                Self::List => true,
            })
            .filter(|c| !c.points.is_empty())
            .map(|c| {
                Contour::new(
                    c.points
                        .into_iter()
                        .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
                        .collect(),
                )
            })
            .collect()
    }
}
