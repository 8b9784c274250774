//! Closed-polygon approximation with Ramer-Douglas-Peucker.
//!
//! A traced contour has one point per boundary pixel. Detection only
//! cares whether that boundary is essentially four straight sides, so
//! [`approximate_polygon`] reduces it to the vertices that deviate from
//! a straight run by more than `epsilon` pixels.

use crate::types::Point;

/// Approximate a closed contour by a polygon with fewer vertices.
///
/// The ring is split at `points[0]` and the point farthest from it, each
/// half is simplified with RDP, and finally any vertex lying within
/// `epsilon` of the line through its two ring neighbors is dropped while
/// more than three vertices remain. The last step removes a spurious
/// vertex when the split point sits in the middle of a side.
///
/// Fewer than three input points are returned unchanged.
#[must_use = "returns the approximated polygon"]
pub fn approximate_polygon(points: &[Point], epsilon: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let origin = points[0];
    let (far, far_dist) = points
        .iter()
        .enumerate()
        .map(|(i, &p)| (i, p.distance_squared(origin)))
        .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });
    if far_dist == 0.0 {
        return vec![origin];
    }

    let first = &points[..=far];
    let mut second: Vec<Point> = points[far..].to_vec();
    second.push(origin);

    let mut polygon = rdp(first, epsilon);
    let tail = rdp(&second, epsilon);
    // `tail` starts at the far point and ends at the origin, both of
    // which are already in `polygon`.
    polygon.extend_from_slice(&tail[1..tail.len() - 1]);

    drop_flat_vertices(&mut polygon, epsilon);
    polygon
}

/// Open-polyline RDP; endpoints are always kept.
fn rdp(points: &[Point], epsilon: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut kept = vec![false; points.len()];
    kept[0] = true;
    kept[points.len() - 1] = true;

    // Explicit stack instead of recursion: traced contours of large
    // frames run to thousands of points.
    let mut stack = vec![(0, points.len() - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let mut max_dist = 0.0;
        let mut max_idx = start;
        for i in (start + 1)..end {
            let d = perpendicular_distance(points[i], points[start], points[end]);
            if d > max_dist {
                max_dist = d;
                max_idx = i;
            }
        }
        if max_dist > epsilon {
            kept[max_idx] = true;
            stack.push((start, max_idx));
            stack.push((max_idx, end));
        }
    }

    points
        .iter()
        .zip(&kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect()
}

fn drop_flat_vertices(polygon: &mut Vec<Point>, epsilon: f64) {
    while polygon.len() > 3 {
        let n = polygon.len();
        let flat = (0..n).find(|&i| {
            let prev = polygon[(i + n - 1) % n];
            let next = polygon[(i + 1) % n];
            perpendicular_distance(polygon[i], prev, next) <= epsilon
        });
        match flat {
            Some(i) => {
                polygon.remove(i);
            }
            None => break,
        }
    }
}

/// Points closer than this to a fitted side are used to refit it.
const SIDE_INLIER_TOLERANCE: f64 = 1.5;

/// A line through `origin` with unit `direction`.
#[derive(Debug, Clone, Copy)]
struct Line {
    origin: Point,
    direction: (f64, f64),
}

impl Line {
    fn distance(&self, p: Point) -> f64 {
        let (dx, dy) = self.direction;
        dx.mul_add(p.y - self.origin.y, -(dy * (p.x - self.origin.x)))
            .abs()
    }
}

/// Move each vertex of `polygon` onto the intersection of the lines
/// fitted to the contour runs on either side of it.
///
/// Traced corners are rarely sharp: edge thinning clips them into short
/// chamfers, and RDP then keeps a vertex somewhere along the chamfer.
/// Each side between two consecutive vertices is fitted by total least
/// squares over the middle of its run (an eighth is trimmed from each
/// end), then refitted on the points within 1.5 px of the first fit.
///
/// A vertex stays where it is when either adjacent side has too few
/// points, the two lines are parallel, or the intersection lies farther
/// than `max_shift` from the original vertex. `polygon` must consist of
/// points taken from `contour` in contour order, as
/// [`approximate_polygon`] returns them; otherwise it is returned
/// unchanged.
#[must_use = "returns the refined polygon"]
pub fn refine_vertices(contour: &[Point], polygon: &[Point], max_shift: f64) -> Vec<Point> {
    let Some(indices) = polygon
        .iter()
        .map(|v| contour.iter().position(|q| q == v))
        .collect::<Option<Vec<_>>>()
    else {
        return polygon.to_vec();
    };
    if polygon.len() < 3 || !indices.windows(2).all(|w| w[0] < w[1]) {
        return polygon.to_vec();
    }

    let n = indices.len();
    let sides: Vec<Option<Line>> = (0..n)
        .map(|k| {
            let (start, end) = (indices[k], indices[(k + 1) % n]);
            let run: Vec<Point> = if end > start {
                contour[start..=end].to_vec()
            } else {
                contour[start..]
                    .iter()
                    .chain(&contour[..=end])
                    .copied()
                    .collect()
            };
            fit_side(&run)
        })
        .collect();

    polygon
        .iter()
        .enumerate()
        .map(|(k, &vertex)| {
            let before = sides[(k + n - 1) % n];
            let after = sides[k];
            before
                .zip(after)
                .and_then(|(a, b)| intersect(&a, &b))
                .filter(|p| p.is_finite() && p.distance(vertex) <= max_shift)
                .unwrap_or(vertex)
        })
        .collect()
}

fn fit_side(run: &[Point]) -> Option<Line> {
    let trim = (run.len() / 8).max(1);
    if run.len() < 2 * trim + 3 {
        return None;
    }
    let core = &run[trim..run.len() - trim];
    let mut line = fit_line(core)?;
    for _ in 0..2 {
        let inliers: Vec<Point> = core
            .iter()
            .copied()
            .filter(|&p| line.distance(p) <= SIDE_INLIER_TOLERANCE)
            .collect();
        if inliers.len() < 3 || inliers.len() == core.len() {
            break;
        }
        match fit_line(&inliers) {
            Some(refit) => line = refit,
            None => break,
        }
    }
    Some(line)
}

/// Total least squares: the principal axis through the centroid.
fn fit_line(points: &[Point]) -> Option<Line> {
    if points.len() < 2 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / count;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / count;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for p in points {
        let (dx, dy) = (p.x - cx, p.y - cy);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx + syy == 0.0 {
        return None;
    }
    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    Some(Line {
        origin: Point::new(cx, cy),
        direction: (theta.cos(), theta.sin()),
    })
}

fn intersect(a: &Line, b: &Line) -> Option<Point> {
    let (adx, ady) = a.direction;
    let (bdx, bdy) = b.direction;
    let denom = adx.mul_add(bdy, -(ady * bdx));
    if denom.abs() < 1e-6 {
        return None;
    }
    let (ox, oy) = (b.origin.x - a.origin.x, b.origin.y - a.origin.y);
    let t = ox.mul_add(bdy, -(oy * bdx)) / denom;
    Some(Point::new(adx.mul_add(t, a.origin.x), ady.mul_add(t, a.origin.y)))
}

/// Perpendicular distance from point `p` to the line through `a` and `b`.
///
/// When `a` and `b` coincide, returns the distance from `p` to `a`.
#[must_use]
pub fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        return p.distance(a);
    }

    let cross = dx.mul_add(a.y - p.y, -(dy * (a.x - p.x)));
    cross.abs() / length_sq.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::arc_length;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    /// Every integer point on the border of an axis-aligned rectangle,
    /// walked clockwise from `(x0, y0)`.
    fn traced_rect(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<Point> {
        let mut pts = Vec::new();
        for x in x0..x1 {
            pts.push(p(f64::from(x), f64::from(y0)));
        }
        for y in y0..y1 {
            pts.push(p(f64::from(x1), f64::from(y)));
        }
        for x in ((x0 + 1)..=x1).rev() {
            pts.push(p(f64::from(x), f64::from(y1)));
        }
        for y in ((y0 + 1)..=y1).rev() {
            pts.push(p(f64::from(x0), f64::from(y)));
        }
        pts
    }

    #[test]
    fn short_input_unchanged() {
        assert!(approximate_polygon(&[], 1.0).is_empty());
        let two = [p(0.0, 0.0), p(3.0, 4.0)];
        assert_eq!(approximate_polygon(&two, 1.0), two.to_vec());
    }

    #[test]
    fn traced_rectangle_reduces_to_corners() {
        let pts = traced_rect(10, 20, 110, 220);
        let eps = 0.02 * arc_length(&pts, true);
        let poly = approximate_polygon(&pts, eps);
        assert_eq!(poly.len(), 4, "got {poly:?}");
        for corner in [p(10.0, 20.0), p(110.0, 20.0), p(110.0, 220.0), p(10.0, 220.0)] {
            assert!(poly.contains(&corner), "missing {corner:?} in {poly:?}");
        }
    }

    #[test]
    fn split_point_mid_side_is_removed() {
        // Start the ring halfway along the top edge.
        let mut pts = traced_rect(0, 0, 100, 60);
        pts.rotate_left(50);
        let poly = approximate_polygon(&pts, 2.0);
        assert_eq!(poly.len(), 4, "got {poly:?}");
        assert!(!poly.contains(&p(50.0, 0.0)));
    }

    #[test]
    fn triangle_keeps_three_vertices() {
        let tri = [p(0.0, 0.0), p(5.0, 0.1), p(10.0, 0.0), p(5.0, 8.0)];
        let poly = approximate_polygon(&tri, 0.5);
        assert_eq!(poly.len(), 3);
    }

    #[test]
    fn pentagon_survives_small_epsilon() {
        let pentagon = [
            p(50.0, 0.0),
            p(100.0, 38.0),
            p(81.0, 100.0),
            p(19.0, 100.0),
            p(0.0, 38.0),
        ];
        assert_eq!(approximate_polygon(&pentagon, 1.0).len(), 5);
    }

    #[test]
    fn coincident_points_collapse() {
        let same = [p(3.0, 3.0); 5];
        assert_eq!(approximate_polygon(&same, 1.0), vec![p(3.0, 3.0)]);
    }

    /// [`traced_rect`] with every point within 4 px (L1) of a corner cut
    /// away, like the clipped corners of a thinned edge map.
    fn chamfered_rect(x1: i32, y1: i32) -> Vec<Point> {
        let corners = [(0, 0), (x1, 0), (x1, y1), (0, y1)];
        traced_rect(0, 0, x1, y1)
            .into_iter()
            .filter(|q| {
                corners.iter().all(|&(cx, cy)| {
                    (q.x - f64::from(cx)).abs() + (q.y - f64::from(cy)).abs() >= 4.0
                })
            })
            .collect()
    }

    #[test]
    fn refine_recovers_clipped_corners() {
        let pts = chamfered_rect(100, 60);
        let poly = approximate_polygon(&pts, 0.02 * arc_length(&pts, true));
        assert_eq!(poly.len(), 4, "got {poly:?}");
        assert!(!poly.contains(&p(0.0, 0.0)));

        let refined = refine_vertices(&pts, &poly, 10.0);
        for corner in [p(0.0, 0.0), p(100.0, 0.0), p(100.0, 60.0), p(0.0, 60.0)] {
            assert!(
                refined.iter().any(|v| v.distance(corner) < 1e-6),
                "missing {corner:?} in {refined:?}"
            );
        }
    }

    #[test]
    fn refine_respects_max_shift() {
        let pts = chamfered_rect(100, 60);
        let poly = approximate_polygon(&pts, 0.02 * arc_length(&pts, true));
        assert_eq!(refine_vertices(&pts, &poly, 0.5), poly);
    }

    #[test]
    fn refine_ignores_foreign_vertices() {
        let pts = traced_rect(0, 0, 100, 60);
        let foreign = vec![p(1.5, 0.5), p(99.5, 0.5), p(99.5, 59.5), p(0.5, 59.5)];
        assert_eq!(refine_vertices(&pts, &foreign, 10.0), foreign);
    }

    #[test]
    fn refine_keeps_sharp_corners() {
        let pts = traced_rect(10, 20, 110, 220);
        let poly = approximate_polygon(&pts, 0.02 * arc_length(&pts, true));
        let refined = refine_vertices(&pts, &poly, 10.0);
        for (a, b) in refined.iter().zip(&poly) {
            assert!(a.distance(*b) < 1e-6, "{a:?} moved from {b:?}");
        }
    }

    #[test]
    fn perpendicular_distance_basics() {
        let d = perpendicular_distance(p(5.0, 3.0), p(0.0, 0.0), p(10.0, 0.0));
        assert!((d - 3.0).abs() < 1e-12);
        let d = perpendicular_distance(p(3.0, 4.0), p(0.0, 0.0), p(0.0, 0.0));
        assert!((d - 5.0).abs() < 1e-12);
    }
}
