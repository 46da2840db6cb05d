//! Elliptic arc parameterisation.
//!
//! Nodes along an elliptic boundary arc are placed at equal chord lengths.
//! Each step solves for the parameter angle at which the chord from the
//! previous node reaches a target length: the remaining span is scanned in
//! 20 subdivisions for a sign change, then bisected. If the bisected root
//! does not meet the residual tolerance the tolerance is refined tenfold and
//! bisection continues, for at most three passes.
//!
//! When no root exists, [`elliptic_arc_points`] falls back to equal
//! parameter spacing.

use nalgebra::{Point2, Vector2};
use thiserror::Error;
use tracing::debug;

/// Initial subdivisions scanned for a sign change.
pub const SUBDIVISIONS: usize = 20;

/// Tolerance refinement passes.
pub const PASSES: usize = 3;

/// Failure to solve for an arc parameter.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ArcError {
    /// The chord never reaches the target inside the span.
    #[error("no sign change over the arc span")]
    NoSignChange,
    /// Bisection did not reach the tolerance in the allowed passes.
    #[error("arc root did not converge")]
    NotConverged,
}

/// An ellipse in the plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    /// Centre.
    pub center: Point2<f64>,
    /// Semi-axis along the rotated x direction.
    pub a: f64,
    /// Semi-axis along the rotated y direction.
    pub b: f64,
    /// Rotation of the major axis, in radians.
    pub rotation: f64,
}

impl Ellipse {
    /// A circle.
    pub fn circle(center: Point2<f64>, radius: f64) -> Self {
        Self {
            center,
            a: radius,
            b: radius,
            rotation: 0.0,
        }
    }

    /// Point at parameter angle `theta`.
    pub fn point(&self, theta: f64) -> Point2<f64> {
        let (s, c) = self.rotation.sin_cos();
        let local = Vector2::new(self.a * theta.cos(), self.b * theta.sin());
        self.center + Vector2::new(c * local.x - s * local.y, s * local.x + c * local.y)
    }

    /// Chord length between two parameter angles.
    pub fn chord(&self, t0: f64, t1: f64) -> f64 {
        (self.point(t1) - self.point(t0)).norm()
    }

    /// Polyline approximation of the arc length between two parameters.
    pub fn arc_length(&self, t0: f64, t1: f64) -> f64 {
        let steps = 256;
        let mut prev = self.point(t0);
        let mut len = 0.0;
        for i in 1..=steps {
            let p = self.point(t0 + (t1 - t0) * i as f64 / steps as f64);
            len += (p - prev).norm();
            prev = p;
        }
        len
    }
}

/// Parameter `t` in `(t0, t_end]` at which the chord from `t0` equals `chord`.
pub fn solve_chord_theta(ellipse: &Ellipse, t0: f64, t_end: f64, chord: f64) -> Result<f64, ArcError> {
    let f = |t: f64| ellipse.chord(t0, t) - chord;
    let step = (t_end - t0) / SUBDIVISIONS as f64;

    let mut lo = t0;
    let mut f_lo = f(lo);
    let mut bracket = None;
    for i in 1..=SUBDIVISIONS {
        let hi = t0 + step * i as f64;
        let f_hi = f(hi);
        if f_lo <= 0.0 && f_hi >= 0.0 {
            bracket = Some((lo, hi));
            break;
        }
        lo = hi;
        f_lo = f_hi;
    }
    let (mut lo, mut hi) = bracket.ok_or(ArcError::NoSignChange)?;

    let residual = chord.abs().max(1e-12) * 1e-8;
    let mut tol = step.abs() * 1e-6;
    for _ in 0..PASSES {
        while (hi - lo).abs() > tol {
            let mid = 0.5 * (lo + hi);
            if f(mid) < 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let mid = 0.5 * (lo + hi);
        if f(mid).abs() <= residual {
            return Ok(mid);
        }
        tol /= 10.0;
    }
    Err(ArcError::NotConverged)
}

fn march(ellipse: &Ellipse, t0: f64, t1: f64, chord: f64, steps: usize) -> Result<Vec<f64>, ArcError> {
    let mut out = Vec::with_capacity(steps + 1);
    out.push(t0);
    let mut t = t0;
    for _ in 0..steps {
        t = solve_chord_theta(ellipse, t, t1, chord)?;
        out.push(t);
    }
    Ok(out)
}

/// Parameter values splitting the arc into `intervals` equal chords.
pub fn equal_chord_thetas(ellipse: &Ellipse, t0: f64, t1: f64, intervals: usize) -> Result<Vec<f64>, ArcError> {
    if intervals <= 1 {
        return Ok(vec![t0, t1]);
    }
    let n = intervals as f64;
    // the equal chord lies between these by the triangle inequality
    let mut lo = ellipse.chord(t0, t1) / n;
    let mut hi = ellipse.arc_length(t0, t1) / n;
    let remaining = |c: f64| -> f64 {
        match march(ellipse, t0, t1, c, intervals - 1) {
            Ok(ts) => ellipse.chord(ts[intervals - 1], t1) - c,
            Err(_) => -1.0,
        }
    };
    for _ in 0..60 {
        let mid = 0.5 * (lo + hi);
        if remaining(mid) > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let mut ts = march(ellipse, t0, t1, lo, intervals - 1)?;
    ts.push(t1);
    Ok(ts)
}

/// Points along an elliptic arc, endpoints included.
///
/// Spacing is equal-chord when solvable, equal-parameter otherwise.
pub fn elliptic_arc_points(ellipse: &Ellipse, t0: f64, t1: f64, intervals: usize) -> Vec<Point2<f64>> {
    let intervals = intervals.max(1);
    let thetas = match equal_chord_thetas(ellipse, t0, t1, intervals) {
        Ok(ts) => ts,
        Err(err) => {
            debug!("arc spacing fell back to linear parameters: {}", err);
            (0..=intervals)
                .map(|i| t0 + (t1 - t0) * i as f64 / intervals as f64)
                .collect()
        }
    };
    thetas.into_iter().map(|t| ellipse.point(t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_circle_chord_root() {
        let c = Ellipse::circle(Point2::origin(), 1.0);
        // chord of a 60 degree arc on the unit circle is 1
        let t = solve_chord_theta(&c, 0.0, PI, 1.0).unwrap();
        assert!((t - PI / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_sign_change() {
        let c = Ellipse::circle(Point2::origin(), 1.0);
        assert_eq!(solve_chord_theta(&c, 0.0, PI / 2.0, 5.0), Err(ArcError::NoSignChange));
    }

    #[test]
    fn test_equal_chords_on_ellipse() {
        let e = Ellipse {
            center: Point2::new(1.0, 2.0),
            a: 3.0,
            b: 1.0,
            rotation: 0.3,
        };
        let pts = elliptic_arc_points(&e, 0.0, PI, 6);
        assert_eq!(pts.len(), 7);
        assert!((pts[0] - e.point(0.0)).norm() < 1e-12);
        assert!((pts[6] - e.point(PI)).norm() < 1e-12);
        let chords: Vec<f64> = pts.windows(2).map(|w| (w[1] - w[0]).norm()).collect();
        let mean = chords.iter().sum::<f64>() / chords.len() as f64;
        for c in chords {
            assert!((c - mean).abs() < 1e-4 * mean);
        }
    }
}
