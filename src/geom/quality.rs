//! Quadrilateral shape metrics.
//!
//! All metrics take the four corners in cyclic (counter-clockwise) order.
//! Larger values always mean a worse shape.

use std::f64::consts::PI;

use nalgebra::Point2;

use super::polygon::cross;

/// Ratio reported for a quad with a collapsed side or corner.
pub const BIG_RATIO: f64 = 1e10;

const TINY: f64 = 1e-14;

/// Interior angles and angle ratio of a quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadAngles {
    /// Interior angle at each corner, in `(0, 2π)`.
    pub angles: [f64; 4],
    /// Largest angle over smallest angle; [`BIG_RATIO`] when degenerate.
    pub ratio: f64,
    /// Signed area (positive when counter-clockwise).
    pub area: f64,
}

impl QuadAngles {
    /// Largest interior angle.
    pub fn max_angle(&self) -> f64 {
        self.angles.iter().copied().fold(f64::MIN, f64::max)
    }

    /// Smallest interior angle.
    pub fn min_angle(&self) -> f64 {
        self.angles.iter().copied().fold(f64::MAX, f64::min)
    }
}

/// Interior angles, angle ratio and signed area of a quad.
pub fn quad_angles(p: &[Point2<f64>; 4]) -> QuadAngles {
    let area = 0.5 * cross(&(p[2] - p[0]), &(p[3] - p[1]));
    let mut angles = [0.0; 4];
    let mut degenerate = false;
    for i in 0..4 {
        let a = p[(i + 1) % 4] - p[i];
        let b = p[(i + 3) % 4] - p[i];
        if a.norm_squared() < TINY || b.norm_squared() < TINY {
            degenerate = true;
            continue;
        }
        let mut theta = cross(&a, &b).atan2(a.dot(&b));
        if theta <= 0.0 {
            theta += 2.0 * PI;
        }
        angles[i] = theta;
    }

    let qa = QuadAngles {
        angles,
        ratio: 0.0,
        area,
    };
    let min = qa.min_angle();
    let ratio = if degenerate || min < TINY {
        BIG_RATIO
    } else {
        (qa.max_angle() / min).min(BIG_RATIO)
    };
    QuadAngles { ratio, ..qa }
}

/// Largest minus smallest interior angle, in radians.
pub fn angle_tilt(p: &[Point2<f64>; 4]) -> f64 {
    let qa = quad_angles(p);
    qa.max_angle() - qa.min_angle()
}

/// Combined shape quality of a quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionNumber {
    /// Largest over smallest interior angle.
    pub angle_ratio: f64,
    /// Longest over shortest side.
    pub side_ratio: f64,
    /// `angle_ratio × side_ratio`.
    pub condition: f64,
    /// Side lengths; side `i` runs from corner `i` to corner `i + 1`.
    pub sides: [f64; 4],
}

/// Condition number of a quad; grows with both angle and side distortion.
pub fn condition_number(p: &[Point2<f64>; 4]) -> ConditionNumber {
    let angle_ratio = quad_angles(p).ratio;
    let sides = [
        (p[1] - p[0]).norm(),
        (p[2] - p[1]).norm(),
        (p[3] - p[2]).norm(),
        (p[0] - p[3]).norm(),
    ];
    let longest = sides.iter().copied().fold(0.0, f64::max);
    let shortest = sides.iter().copied().fold(f64::MAX, f64::min);
    let side_ratio = if shortest < TINY {
        BIG_RATIO
    } else {
        longest / shortest
    };
    ConditionNumber {
        angle_ratio,
        side_ratio,
        condition: (angle_ratio * side_ratio).min(BIG_RATIO),
        sides,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(c: [(f64, f64); 4]) -> [Point2<f64>; 4] {
        c.map(|(x, y)| Point2::new(x, y))
    }

    #[test]
    fn test_square() {
        let q = pts([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        let qa = quad_angles(&q);
        for a in qa.angles {
            assert!((a - PI / 2.0).abs() < 1e-12);
        }
        assert!((qa.ratio - 1.0).abs() < 1e-12);
        assert!((qa.area - 1.0).abs() < 1e-12);
        assert!(angle_tilt(&q).abs() < 1e-12);

        let cn = condition_number(&q);
        assert!((cn.condition - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_reflex_corner() {
        // arrowhead: corner 2 is reflex
        let q = pts([(0.0, 0.0), (2.0, 0.0), (0.5, 0.5), (0.0, 2.0)]);
        let qa = quad_angles(&q);
        assert!(qa.angles[2] > PI);
        let sum: f64 = qa.angles.iter().sum();
        assert!((sum - 2.0 * PI).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_side() {
        let q = pts([(0.0, 0.0), (0.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        assert_eq!(quad_angles(&q).ratio, BIG_RATIO);
        assert_eq!(condition_number(&q).side_ratio, BIG_RATIO);
    }

    #[test]
    fn test_condition_grows_with_stretch() {
        let square = pts([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        let long = pts([(0.0, 0.0), (3.0, 0.0), (3.0, 1.0), (0.0, 1.0)]);
        let skew = pts([(0.0, 0.0), (3.0, 0.0), (4.0, 1.0), (1.0, 1.0)]);
        let a = condition_number(&square).condition;
        let b = condition_number(&long).condition;
        let c = condition_number(&skew).condition;
        assert!(a < b);
        assert!(b < c);
    }
}
