//! Planar polygon helpers.

use nalgebra::{Point2, Vector2};

/// 2D cross product `a × b`.
#[inline]
pub fn cross(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Signed area of a closed polygon (positive when counter-clockwise).
pub fn signed_area(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }
    0.5 * sum
}

/// Area centroid of a closed polygon; the vertex average when the area
/// vanishes.
pub fn centroid(points: &[Point2<f64>]) -> Point2<f64> {
    let n = points.len();
    if n == 0 {
        return Point2::origin();
    }
    let area = signed_area(points);
    if area.abs() < 1e-14 {
        let sum = points.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords);
        return Point2::from(sum / n as f64);
    }
    let mut cx = 0.0;
    let mut cy = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        let w = a.x * b.y - b.x * a.y;
        cx += (a.x + b.x) * w;
        cy += (a.y + b.y) * w;
    }
    Point2::new(cx / (6.0 * area), cy / (6.0 * area))
}

/// Even-odd point-in-polygon test. Points on an edge may go either way.
pub fn point_in_polygon(points: &[Point2<f64>], p: &Point2<f64>) -> bool {
    let n = points.len();
    let mut inside = false;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let (a, b) = (points[i], points[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Closest point on the segment `a`-`b`, with its parameter in `[0, 1]`.
pub fn closest_point_on_segment(
    a: &Point2<f64>,
    b: &Point2<f64>,
    p: &Point2<f64>,
) -> (Point2<f64>, f64) {
    let d = b - a;
    let len2 = d.norm_squared();
    if len2 < 1e-300 {
        return (*a, 0.0);
    }
    let t = ((p - a).dot(&d) / len2).clamp(0.0, 1.0);
    (a + d * t, t)
}

/// Result of projecting a point onto a polyline.
#[derive(Debug, Clone, Copy)]
pub struct PolylineProjection {
    /// Index of the segment holding the closest point.
    pub segment: usize,
    /// Parameter along that segment.
    pub t: f64,
    /// The closest point.
    pub point: Point2<f64>,
    /// Distance from the query point.
    pub distance: f64,
}

/// Closest point on a polyline; `closed` adds the segment from the last
/// point back to the first.
pub fn closest_point_on_polyline(
    points: &[Point2<f64>],
    closed: bool,
    p: &Point2<f64>,
) -> Option<PolylineProjection> {
    let n = points.len();
    if n == 0 {
        return None;
    }
    if n == 1 {
        return Some(PolylineProjection {
            segment: 0,
            t: 0.0,
            point: points[0],
            distance: (points[0] - p).norm(),
        });
    }
    let segments = if closed { n } else { n - 1 };
    let mut best: Option<PolylineProjection> = None;
    for i in 0..segments {
        let (q, t) = closest_point_on_segment(&points[i], &points[(i + 1) % n], p);
        let distance = (q - p).norm();
        if best.map_or(true, |b| distance < b.distance) {
            best = Some(PolylineProjection {
                segment: i,
                t,
                point: q,
                distance,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Point2<f64>> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 2.0),
            Point2::new(0.0, 2.0),
        ]
    }

    #[test]
    fn test_area_and_centroid() {
        let sq = square();
        assert!((signed_area(&sq) - 4.0).abs() < 1e-12);
        let mut rev = sq.clone();
        rev.reverse();
        assert!((signed_area(&rev) + 4.0).abs() < 1e-12);
        let c = centroid(&sq);
        assert!((c - Point2::new(1.0, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_point_in_polygon() {
        let sq = square();
        assert!(point_in_polygon(&sq, &Point2::new(1.0, 1.0)));
        assert!(!point_in_polygon(&sq, &Point2::new(3.0, 1.0)));
        assert!(!point_in_polygon(&sq, &Point2::new(1.0, -0.5)));
    }

    #[test]
    fn test_closest_point() {
        let sq = square();
        let hit = closest_point_on_polyline(&sq, true, &Point2::new(-1.0, 1.0)).unwrap();
        assert_eq!(hit.segment, 3);
        assert!((hit.point - Point2::new(0.0, 1.0)).norm() < 1e-12);
        assert!((hit.distance - 1.0).abs() < 1e-12);

        let open = closest_point_on_polyline(&sq, false, &Point2::new(-1.0, 1.0)).unwrap();
        assert_eq!(open.segment, 0);
    }
}
