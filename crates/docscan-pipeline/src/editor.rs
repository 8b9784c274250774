//! Interactive corner editing as an explicit state machine.
//!
//! The editor owns a [`Quadrilateral`] in the raster's native pixel
//! space. Pointer and keyboard events arrive already converted to raster
//! coordinates (see [`ViewportScale`]); hit-testing and clamping are
//! plain functions so they can be exercised without any UI.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, Point, Quadrilateral, ScanError};

/// Pointer-down must land strictly closer than this to grab a corner.
pub const HIT_RADIUS: f64 = 15.0;

/// Corners stay at least this far inside the canvas edges.
pub const EDGE_MARGIN: f64 = 10.0;

/// Arrow-key nudge distance.
pub const NUDGE_STEP: f64 = 5.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditorState {
    #[default]
    Idle,
    /// Index into the quadrilateral's corners.
    Dragging(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowKey {
    Up,
    Down,
    Left,
    Right,
}

impl ArrowKey {
    /// Offset of one nudge in raster pixels (y grows downward).
    #[must_use]
    pub const fn delta(self) -> (f64, f64) {
        match self {
            Self::Up => (0.0, -NUDGE_STEP),
            Self::Down => (0.0, NUDGE_STEP),
            Self::Left => (-NUDGE_STEP, 0.0),
            Self::Right => (NUDGE_STEP, 0.0),
        }
    }
}

/// Index of the corner closest to `at` among those strictly within
/// `radius`, or `None`.
///
/// Ties keep the earlier corner.
#[must_use]
pub fn hit_test(quad: &Quadrilateral, at: Point, radius: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, corner) in quad.corners().iter().enumerate() {
        let d = corner.distance(at);
        let limit = best.map_or(radius, |(_, closest)| closest);
        if d < limit {
            best = Some((index, d));
        }
    }
    best.map(|(index, _)| index)
}

/// Keep `p` inside `[EDGE_MARGIN, dimension - EDGE_MARGIN]` on both axes.
///
/// On canvases narrower than twice the margin the lower bound wins.
#[must_use]
pub fn clamp_to_canvas(p: Point, canvas: Dimensions) -> Point {
    let clamp = |v: f64, extent: u32| v.min(f64::from(extent) - EDGE_MARGIN).max(EDGE_MARGIN);
    Point::new(clamp(p.x, canvas.width), clamp(p.y, canvas.height))
}

/// Display-to-raster scale factors.
///
/// Computed once from the raster size and the size it is displayed at,
/// then applied to each incoming pointer position. Nothing is ever
/// multiplied twice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportScale {
    sx: f64,
    sy: f64,
}

impl ViewportScale {
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidGeometry`] if the displayed size is not
    /// finite and positive.
    pub fn new(raster: Dimensions, displayed_width: f64, displayed_height: f64) -> Result<Self, ScanError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(displayed_width) || !valid(displayed_height) {
            return Err(ScanError::InvalidGeometry(format!(
                "displayed size must be positive, got {displayed_width}x{displayed_height}"
            )));
        }
        Ok(Self {
            sx: f64::from(raster.width) / displayed_width,
            sy: f64::from(raster.height) / displayed_height,
        })
    }

    #[must_use]
    pub const fn identity() -> Self {
        Self { sx: 1.0, sy: 1.0 }
    }

    #[must_use]
    pub const fn factors(self) -> (f64, f64) {
        (self.sx, self.sy)
    }

    /// Map a position relative to the displayed canvas's top-left corner
    /// into raster pixels.
    #[must_use]
    pub fn to_raster(self, display: Point) -> Point {
        display.scaled(self.sx, self.sy)
    }
}

impl Default for ViewportScale {
    fn default() -> Self {
        Self::identity()
    }
}

/// Drag and nudge editing of four document corners.
#[derive(Debug, Clone, PartialEq)]
pub struct CornerEditor {
    quad: Quadrilateral,
    canvas: Dimensions,
    state: EditorState,
    active: Option<usize>,
    last_pointer: Point,
}

impl CornerEditor {
    /// Start editing `quad` on a canvas of `canvas` pixels.
    ///
    /// Initial corners are taken as given; clamping applies to edits.
    #[must_use]
    pub const fn new(quad: Quadrilateral, canvas: Dimensions) -> Self {
        Self {
            quad,
            canvas,
            state: EditorState::Idle,
            active: None,
            last_pointer: Point::new(0.0, 0.0),
        }
    }

    #[must_use]
    pub const fn quad(&self) -> &Quadrilateral {
        &self.quad
    }

    #[must_use]
    pub const fn canvas(&self) -> Dimensions {
        self.canvas
    }

    #[must_use]
    pub const fn state(&self) -> EditorState {
        self.state
    }

    /// The corner keyboard input applies to.
    #[must_use]
    pub const fn active(&self) -> Option<usize> {
        self.active
    }

    #[must_use]
    pub fn into_quad(self) -> Quadrilateral {
        self.quad
    }

    /// Make `index` the only active corner. Out-of-range indices clear
    /// the selection.
    pub const fn select(&mut self, index: usize) {
        self.active = if index < 4 { Some(index) } else { None };
    }

    /// Grab the nearest corner within [`HIT_RADIUS`] of `at`.
    ///
    /// A miss leaves state and selection alone.
    pub fn pointer_down(&mut self, at: Point) -> Option<usize> {
        let index = hit_test(&self.quad, at, HIT_RADIUS)?;
        self.state = EditorState::Dragging(index);
        self.active = Some(index);
        self.last_pointer = at;
        tracing::trace!(index, x = at.x, y = at.y, "corner grabbed");
        Some(index)
    }

    /// Move the dragged corner by the pointer delta since the previous
    /// event. Returns whether a corner moved.
    pub fn pointer_move(&mut self, at: Point) -> bool {
        let EditorState::Dragging(index) = self.state else {
            return false;
        };
        let dx = at.x - self.last_pointer.x;
        let dy = at.y - self.last_pointer.y;
        self.last_pointer = at;
        self.offset_corner(index, dx, dy);
        true
    }

    pub const fn pointer_up(&mut self) {
        self.state = EditorState::Idle;
    }

    pub const fn pointer_leave(&mut self) {
        self.pointer_up();
    }

    /// Nudge the active corner one step. Returns whether a corner moved.
    pub fn key(&mut self, key: ArrowKey) -> bool {
        let Some(index) = self.active else {
            return false;
        };
        let (dx, dy) = key.delta();
        self.offset_corner(index, dx, dy);
        true
    }

    fn offset_corner(&mut self, index: usize, dx: f64, dy: f64) {
        let canvas = self.canvas;
        if let Some(corner) = self.quad.corners_mut().get_mut(index) {
            *corner = clamp_to_canvas(Point::new(corner.x + dx, corner.y + dy), canvas);
        }
    }
}
