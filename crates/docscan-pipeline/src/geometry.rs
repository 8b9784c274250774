//! Geometry kernel: distances, polygon areas and corner ordering.
//!
//! Every function here is pure and total over finite input. Degenerate
//! polygons produce an area of zero instead of an error; only
//! [`order_corners`] can fail, and only on a wrong point count.

use geo::{Area, ConvexHull, MultiPoint};

use crate::types::{Dimensions, Point, Quadrilateral, ScanError};

/// Fraction of each side used to inset the default editor corners.
pub const DEFAULT_CORNER_INSET: f64 = 0.1;

/// Euclidean distance between two points.
#[must_use]
pub fn distance(a: Point, b: Point) -> f64 {
    a.distance(b)
}

/// Absolute area of a simple polygon via the shoelace formula.
///
/// Fewer than three points yield `0.0`. Self-intersecting polygons
/// return the absolute value of the signed sum, which under-counts
/// overlapping lobes but never fails.
#[must_use]
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let mut twice_area = 0.0;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        twice_area += a.x.mul_add(b.y, -(b.x * a.y));
    }
    (twice_area / 2.0).abs()
}

/// Length of a polyline, including the closing segment when `closed`.
#[must_use]
pub fn arc_length(points: &[Point], closed: bool) -> f64 {
    let open: f64 = points.windows(2).map(|w| w[0].distance(w[1])).sum();
    match (closed, points.first(), points.last()) {
        (true, Some(&first), Some(&last)) if points.len() > 1 => open + last.distance(first),
        _ => open,
    }
}

/// Area of the convex hull of a point set.
#[must_use]
pub fn convex_hull_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let cloud: MultiPoint<f64> = points
        .iter()
        .map(|p| geo::Point::new(p.x, p.y))
        .collect();
    cloud.convex_hull().unsigned_area()
}

/// Order four points as `[top-left, top-right, bottom-right, bottom-left]`.
///
/// The point with the smallest `x + y` is top-left, the largest `x + y`
/// bottom-right, the largest `x - y` top-right and the smallest `x - y`
/// bottom-left. Ties go to the earliest input point.
///
/// When those rules pick the same input point for two roles (strongly
/// rotated or degenerate shapes) the points are instead walked clockwise
/// around their centroid starting from the top-left pick, so the result
/// is always a permutation of the input.
///
/// # Errors
///
/// Returns [`ScanError::InvalidGeometry`] unless exactly four finite
/// points are supplied.
pub fn order_corners(points: &[Point]) -> Result<Quadrilateral, ScanError> {
    let quad = Quadrilateral::try_from(points)?;
    let pts = *quad.corners();
    if !pts.iter().all(|p| p.is_finite()) {
        return Err(ScanError::InvalidGeometry(
            "corner coordinates must be finite".to_owned(),
        ));
    }

    let sum = |p: Point| p.x + p.y;
    let diff = |p: Point| p.x - p.y;

    let tl = extreme_index(&pts, sum, false);
    let tr = extreme_index(&pts, diff, true);
    let br = extreme_index(&pts, sum, true);
    let bl = extreme_index(&pts, diff, false);

    let picks = [tl, tr, br, bl];
    let is_permutation = (0..4).all(|i| picks.contains(&i));
    if is_permutation {
        return Ok(Quadrilateral::new(picks.map(|i| pts[i])));
    }

    Ok(Quadrilateral::new(clockwise_from(&pts, tl)))
}

/// Index of the first point whose key is strictly smallest (or largest).
fn extreme_index(points: &[Point; 4], key: impl Fn(Point) -> f64, largest: bool) -> usize {
    let mut best = 0;
    for (i, &p) in points.iter().enumerate().skip(1) {
        let k = key(p);
        let b = key(points[best]);
        if (largest && k > b) || (!largest && k < b) {
            best = i;
        }
    }
    best
}

/// Sort points by angle around their centroid (clockwise on screen, since
/// +y points down) and rotate so `start` comes first.
fn clockwise_from(points: &[Point; 4], start: usize) -> [Point; 4] {
    let cx = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let angle = |p: Point| (p.y - cy).atan2(p.x - cx);

    let mut order = [0_usize, 1, 2, 3];
    order.sort_by(|&a, &b| angle(points[a]).total_cmp(&angle(points[b])));
    let offset = order.iter().position(|&i| i == start).unwrap_or(0);
    order.rotate_left(offset);
    order.map(|i| points[i])
}

/// Corners inset by [`DEFAULT_CORNER_INSET`] of each side, used when
/// auto-detection finds nothing.
#[must_use]
pub fn default_corners(dimensions: Dimensions) -> Quadrilateral {
    let w = f64::from(dimensions.width);
    let h = f64::from(dimensions.height);
    let mx = w * DEFAULT_CORNER_INSET;
    let my = h * DEFAULT_CORNER_INSET;
    Quadrilateral::new([
        Point::new(mx, my),
        Point::new(w - mx, my),
        Point::new(w - mx, h - my),
        Point::new(mx, h - my),
    ])
}

/// Width and height of the document a quadrilateral outlines: the longer
/// of each pair of opposite sides.
#[must_use]
pub fn side_extents(quad: &Quadrilateral) -> (f64, f64) {
    let width = quad
        .top_left()
        .distance(quad.top_right())
        .max(quad.bottom_left().distance(quad.bottom_right()));
    let height = quad
        .top_right()
        .distance(quad.bottom_right())
        .max(quad.top_left().distance(quad.bottom_left()));
    (width, height)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn rect() -> [Point; 4] {
        [p(10.0, 20.0), p(110.0, 20.0), p(110.0, 220.0), p(10.0, 220.0)]
    }

    #[test]
    fn unit_square_area() {
        let square = [p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 1.0)];
        assert!((polygon_area(&square) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn area_is_orientation_independent() {
        let mut square = vec![p(0.0, 0.0), p(4.0, 0.0), p(4.0, 3.0), p(0.0, 3.0)];
        let ccw = polygon_area(&square);
        square.reverse();
        assert!((ccw - polygon_area(&square)).abs() < 1e-12);
        assert!((ccw - 12.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_area_is_zero() {
        assert!(polygon_area(&[]).abs() < f64::EPSILON);
        assert!(polygon_area(&[p(0.0, 0.0), p(5.0, 5.0)]).abs() < f64::EPSILON);
        // Collinear points have no area.
        assert!(polygon_area(&[p(0.0, 0.0), p(1.0, 1.0), p(2.0, 2.0)]).abs() < 1e-12);
    }

    #[test]
    fn self_intersecting_area_does_not_fail() {
        // Bow-tie: the two lobes cancel.
        let bowtie = [p(0.0, 0.0), p(2.0, 2.0), p(2.0, 0.0), p(0.0, 2.0)];
        assert!(polygon_area(&bowtie) >= 0.0);
    }

    #[test]
    fn arc_length_open_and_closed() {
        let square = [p(0.0, 0.0), p(2.0, 0.0), p(2.0, 2.0), p(0.0, 2.0)];
        assert!((arc_length(&square, false) - 6.0).abs() < 1e-12);
        assert!((arc_length(&square, true) - 8.0).abs() < 1e-12);
        assert!(arc_length(&[p(1.0, 1.0)], true).abs() < f64::EPSILON);
    }

    #[test]
    fn hull_area_of_concave_shape() {
        // An L-shape of area 3. Its hull cuts the missing corner along
        // (2, 1)-(1, 2), leaving a pentagon of area 3.5.
        let l_shape = [
            p(0.0, 0.0),
            p(2.0, 0.0),
            p(2.0, 1.0),
            p(1.0, 1.0),
            p(1.0, 2.0),
            p(0.0, 2.0),
        ];
        assert!((polygon_area(&l_shape) - 3.0).abs() < 1e-12);
        assert!((convex_hull_area(&l_shape) - 3.5).abs() < 1e-9);

        // A notch in the top edge of a 2x2 square leaves the hull whole.
        let notched = [
            p(0.0, 0.0),
            p(0.5, 0.0),
            p(0.5, 0.5),
            p(1.5, 0.5),
            p(1.5, 0.0),
            p(2.0, 0.0),
            p(2.0, 2.0),
            p(0.0, 2.0),
        ];
        assert!((polygon_area(&notched) - 3.5).abs() < 1e-12);
        assert!((convex_hull_area(&notched) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn order_recovers_rectangle_from_every_permutation() {
        let expected = Quadrilateral::new(rect());
        let r = rect();
        let perms = [
            [0, 1, 2, 3],
            [3, 2, 1, 0],
            [2, 0, 3, 1],
            [1, 3, 0, 2],
            [1, 0, 3, 2],
            [3, 1, 2, 0],
        ];
        for perm in perms {
            let input = perm.map(|i| r[i]);
            let ordered = order_corners(&input).unwrap();
            assert_eq!(ordered, expected, "permutation {perm:?}");
        }
    }

    #[test]
    fn order_is_idempotent() {
        let skewed = [p(30.0, 12.0), p(410.0, 40.0), p(380.0, 590.0), p(12.0, 540.0)];
        let once = order_corners(&skewed).unwrap();
        let twice = order_corners(once.corners()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn order_only_permutes() {
        let input = [p(300.0, 310.0), p(20.0, 25.0), p(15.0, 290.0), p(280.0, 5.0)];
        let ordered = order_corners(&input).unwrap();
        for corner in ordered.corners() {
            assert!(input.contains(corner), "{corner:?} was not an input point");
        }
    }

    #[test]
    fn diamond_falls_back_to_clockwise_walk() {
        // Rotated 45 degrees: (50,0) is both min x+y and max x-y.
        let diamond = [p(50.0, 0.0), p(100.0, 50.0), p(50.0, 100.0), p(0.0, 50.0)];
        let ordered = order_corners(&diamond).unwrap();
        assert_eq!(ordered.corners(), &diamond);
        // Still idempotent on the fallback path.
        assert_eq!(order_corners(ordered.corners()).unwrap(), ordered);
    }

    #[test]
    fn order_rejects_wrong_count() {
        let err = order_corners(&[p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0)]).unwrap_err();
        assert!(matches!(err, ScanError::InvalidGeometry(_)));
    }

    #[test]
    fn order_rejects_nan() {
        let input = [p(f64::NAN, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 1.0)];
        assert!(matches!(
            order_corners(&input),
            Err(ScanError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn default_corners_inset_ten_percent() {
        let quad = default_corners(Dimensions::new(200, 100));
        assert_eq!(quad.top_left(), p(20.0, 10.0));
        assert_eq!(quad.bottom_right(), p(180.0, 90.0));
    }

    #[test]
    fn side_extents_use_longer_sides() {
        let trapezoid = Quadrilateral::new([p(0.0, 0.0), p(100.0, 0.0), p(80.0, 50.0), p(20.0, 50.0)]);
        let (w, h) = side_extents(&trapezoid);
        assert!((w - 100.0).abs() < 1e-12);
        assert!((h - (20.0_f64.hypot(50.0))).abs() < 1e-12);
    }
}
