//! Primitive shape classification and interval division.
//!
//! The first non-blank letter of a scheme string picks the primitive shape.
//! Corners are chosen on the checked perimeter, the interval count of every
//! logical side is measured, and the division system for the shape is
//! solved:
//!
//! - rectangle: opposite sides must match
//! - triangle, pentagon: every side `i` is split at a division point, and a
//!   spoke of `l_i` intervals joins it to a centre node, so that
//!   `M_i = l_{i-1} + l_{i+1}`
//! - semicircle: the arc is split at its middle and solved as a triangle
//! - transition: one side of a four-sided region is split to form the most
//!   balanced solvable pentagon
//!
//! A scheme that names no shape, and the configured default scheme, may fall
//! back to another shape when the first does not fit; see [`classify_scheme`].

use std::f64::consts::PI;

use nalgebra::Point2;
use tracing::debug;

use super::perimeter::Perimeter;
use super::CheckedRegion;
use crate::error::{MeshError, Result};
use crate::geom::polygon::{centroid, cross, point_in_polygon};
use crate::mesh::NodeOrigin;

/// Primitive region shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Four sides, opposite sides equal (`M`, the default).
    Rectangle,
    /// Three sides around a centre (`T`).
    Triangle,
    /// Five sides around a centre (`U`).
    Pentagon,
    /// Four sides meshed as a pentagon (`B`).
    Transition,
    /// A diameter and an arc (`C`).
    Semicircle,
}

impl Shape {
    /// Shape for a scheme letter, case-insensitive.
    pub fn from_letter(c: char) -> Option<Shape> {
        match c.to_ascii_uppercase() {
            'M' => Some(Shape::Rectangle),
            'T' => Some(Shape::Triangle),
            'U' => Some(Shape::Pentagon),
            'B' => Some(Shape::Transition),
            'C' => Some(Shape::Semicircle),
            _ => None,
        }
    }

    /// Scheme letter.
    pub fn letter(self) -> char {
        match self {
            Shape::Rectangle => 'M',
            Shape::Triangle => 'T',
            Shape::Pentagon => 'U',
            Shape::Transition => 'B',
            Shape::Semicircle => 'C',
        }
    }

    /// Corners picked on the perimeter.
    pub fn corner_count(self) -> usize {
        match self {
            Shape::Rectangle | Shape::Transition => 4,
            Shape::Triangle => 3,
            Shape::Pentagon => 5,
            Shape::Semicircle => 2,
        }
    }

    /// Smallest perimeter this shape accepts.
    pub fn min_perimeter(self) -> usize {
        match self {
            Shape::Rectangle => 4,
            Shape::Triangle => 6,
            Shape::Pentagon => 10,
            Shape::Transition | Shape::Semicircle => 8,
        }
    }
}

/// Split a scheme string into its shape and the remaining commands.
///
/// ```
/// use quadpave::region::{parse_scheme, Shape};
///
/// assert_eq!(parse_scheme("t 5S"), (Shape::Triangle, " 5S"));
/// assert_eq!(parse_scheme("SR"), (Shape::Rectangle, "SR"));
/// ```
pub fn parse_scheme(scheme: &str) -> (Shape, &str) {
    let (shape, rest) = split_scheme(scheme);
    (shape.unwrap_or(Shape::Rectangle), rest)
}

/// Split a scheme string into the shape it names, if any, and the commands.
pub fn split_scheme(scheme: &str) -> (Option<Shape>, &str) {
    let trimmed = scheme.trim_start();
    let mut chars = trimmed.chars();
    match chars.next().and_then(Shape::from_letter) {
        Some(shape) => (Some(shape), chars.as_str()),
        None => (None, trimmed),
    }
}

/// Shapes tried, in order, when the shape is free to change.
pub const FALLBACK_SHAPES: [Shape; 4] = [Shape::Rectangle, Shape::Transition, Shape::Triangle, Shape::Pentagon];

/// Solved division of a region into primitive patches.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// The requested shape.
    pub shape: Shape,
    /// Perimeter indices of the logical corners, in loop order.
    pub corners: Vec<usize>,
    /// Interval count of logical side `i`, from corner `i` to corner `i + 1`.
    pub sides: Vec<usize>,
    /// Spoke interval counts; empty for a rectangle.
    pub spokes: Vec<usize>,
    /// Perimeter index of each side's division point; empty for a rectangle.
    pub divisions: Vec<usize>,
    /// Centre node position; `None` for a rectangle.
    pub center: Option<Point2<f64>>,
}

impl Classification {
    /// Intervals from corner `i` to the division point of side `i`.
    pub fn split_before(&self, i: usize) -> usize {
        let n = self.spokes.len();
        self.spokes[(i + n - 1) % n]
    }

    /// Intervals from the division point of side `i` to corner `i + 1`.
    pub fn split_after(&self, i: usize) -> usize {
        let n = self.spokes.len();
        self.spokes[(i + 1) % n]
    }
}

fn side_lengths(corners: &[usize], len: usize) -> Vec<usize> {
    let n = corners.len();
    (0..n)
        .map(|i| (corners[(i + 1) % n] + len - corners[i]) % len)
        .map(|m| if m == 0 { len } else { m })
        .collect()
}

/// Turning angle at each perimeter point (positive for a left turn).
fn turning_angles(perimeter: &Perimeter) -> Vec<f64> {
    let pts = perimeter.positions();
    let n = pts.len();
    (0..n)
        .map(|i| {
            let a = pts[i] - pts[(i + n - 1) % n];
            let b = pts[(i + 1) % n] - pts[i];
            cross(&a, &b).atan2(a.dot(&b))
        })
        .collect()
}

/// Pick `count` corners: the geometric points when their number matches,
/// otherwise the sharpest turns.
pub fn pick_corners(perimeter: &Perimeter, count: usize) -> Result<Vec<usize>> {
    let n = perimeter.len();
    if count > n {
        return Err(MeshError::classification(format!(
            "{} corners requested on a {}-point perimeter",
            count, n
        )));
    }
    let points: Vec<usize> = perimeter
        .points
        .iter()
        .enumerate()
        .filter(|(_, p)| matches!(p.origin, NodeOrigin::Point(_)))
        .map(|(i, _)| i)
        .collect();
    if points.len() == count {
        return Ok(points);
    }

    let turns = turning_angles(perimeter);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| turns[b].total_cmp(&turns[a]).then(a.cmp(&b)));
    let mut corners: Vec<usize> = order.into_iter().take(count).collect();
    corners.sort_unstable();
    Ok(corners)
}

/// Solve `M_i = l_{i-1} + l_{i+1}` for positive spoke counts, `n` odd.
pub fn solve_center_split(sides: &[usize]) -> Result<Vec<usize>> {
    let n = sides.len();
    if n % 2 == 0 || n < 3 {
        return Err(MeshError::classification(format!(
            "centre split needs an odd number of sides, got {}",
            n
        )));
    }
    let m: Vec<i64> = sides.iter().map(|&v| v as i64).collect();
    let walk = |l0: i64| -> Vec<i64> {
        let mut l = vec![0i64; n];
        let mut j = 0;
        let mut v = l0;
        for _ in 0..n {
            let next = (j + 2) % n;
            v = m[(j + 1) % n] - v;
            l[next] = v;
            j = next;
        }
        l
    };
    // after an odd number of steps the walk returns c - l0
    let c = walk(0)[0];
    if c % 2 != 0 {
        return Err(MeshError::classification("side divisions have no integer solution"));
    }
    let l = walk(c / 2);
    if l.iter().any(|&v| v < 1) {
        return Err(MeshError::classification(format!(
            "sides {:?} cannot be split around a centre",
            sides
        )));
    }
    Ok(l.into_iter().map(|v| v as usize).collect())
}

fn center_split(
    shape: Shape,
    perimeter: &Perimeter,
    corners: Vec<usize>,
) -> Result<Classification> {
    let len = perimeter.len();
    let sides = side_lengths(&corners, len);
    let spokes = solve_center_split(&sides)?;
    let n = corners.len();
    let divisions: Vec<usize> = (0..n)
        .map(|i| (corners[i] + spokes[(i + n - 1) % n]) % len)
        .collect();
    let center = estimate_center(perimeter, &corners, &divisions, &spokes);
    Ok(Classification {
        shape,
        corners,
        sides,
        spokes,
        divisions,
        center: Some(center),
    })
}

/// Average of points placed from each division point toward the opposite
/// corner, at a distance proportional to the spoke count.
fn estimate_center(
    perimeter: &Perimeter,
    corners: &[usize],
    divisions: &[usize],
    spokes: &[usize],
) -> Point2<f64> {
    let n = corners.len();
    let pts = perimeter.positions();
    let fit = (PI / n as f64).cos();
    let f_n = fit / (1.0 + fit);
    let mean = spokes.iter().sum::<usize>() as f64 / n as f64;
    let mut sum = nalgebra::Vector2::zeros();
    for i in 0..n {
        let d = pts[divisions[i]];
        let opposite = pts[corners[(i + (n + 1) / 2) % n]];
        let frac = (f_n * spokes[i] as f64 / mean).clamp(0.1, 0.9);
        sum += (d + (opposite - d) * frac).coords;
    }
    let center = Point2::from(sum / n as f64);
    if point_in_polygon(&pts, &center) {
        center
    } else {
        debug!("centre estimate outside region, using centroid");
        centroid(&pts)
    }
}

fn bulge(perimeter: &Perimeter, from: usize, intervals: usize) -> f64 {
    let n = perimeter.len();
    let mut path = 0.0;
    for k in 0..intervals {
        let a = perimeter.points[(from + k) % n].position;
        let b = perimeter.points[(from + k + 1) % n].position;
        path += (b - a).norm();
    }
    let chord = (perimeter.points[(from + intervals) % n].position - perimeter.points[from].position).norm();
    if chord < f64::MIN_POSITIVE {
        f64::MAX
    } else {
        path / chord
    }
}

/// Classify a checked region as `shape` and solve its divisions.
pub fn classify(region: &CheckedRegion, shape: Shape) -> Result<Classification> {
    let perimeter = &region.perimeter;
    let len = perimeter.len();
    if len < shape.min_perimeter() {
        return Err(MeshError::classification(format!(
            "region {}: {:?} needs at least {} perimeter nodes, got {}",
            region.id,
            shape,
            shape.min_perimeter(),
            len
        )));
    }
    if len % 2 != 0 {
        return Err(MeshError::classification(format!(
            "region {}: odd number of perimeter intervals ({})",
            region.id, len
        )));
    }

    let corners = pick_corners(perimeter, shape.corner_count())?;
    match shape {
        Shape::Rectangle => {
            let sides = side_lengths(&corners, len);
            if sides[0] != sides[2] || sides[1] != sides[3] {
                return Err(MeshError::classification(format!(
                    "region {}: rectangle sides {:?} do not match",
                    region.id, sides
                )));
            }
            Ok(Classification {
                shape,
                corners,
                sides,
                spokes: Vec::new(),
                divisions: Vec::new(),
                center: None,
            })
        }
        Shape::Triangle | Shape::Pentagon => center_split(shape, perimeter, corners),
        Shape::Semicircle => {
            let sides = side_lengths(&corners, len);
            let arc = if bulge(perimeter, corners[0], sides[0]) >= bulge(perimeter, corners[1], sides[1]) {
                0
            } else {
                1
            };
            if sides[arc] % 2 != 0 {
                return Err(MeshError::classification(format!(
                    "region {}: semicircle arc has odd interval count {}",
                    region.id, sides[arc]
                )));
            }
            let middle = (corners[arc] + sides[arc] / 2) % len;
            let mut tri = vec![corners[0], corners[1], middle];
            tri.sort_unstable();
            let mut c = center_split(Shape::Triangle, perimeter, tri)?;
            c.shape = Shape::Semicircle;
            Ok(c)
        }
        Shape::Transition => {
            let sides = side_lengths(&corners, len);
            let mut best: Option<(usize, Classification)> = None;
            for s in 0..4 {
                for p in 1..sides[s] {
                    let mut five = corners.clone();
                    five.push((corners[s] + p) % len);
                    five.sort_unstable();
                    let Ok(c) = center_split(Shape::Transition, perimeter, five) else {
                        continue;
                    };
                    let spread = c.spokes.iter().max().copied().unwrap_or(0)
                        - c.spokes.iter().min().copied().unwrap_or(0);
                    if best.as_ref().map_or(true, |(b, _)| spread < *b) {
                        best = Some((spread, c));
                    }
                }
            }
            best.map(|(_, c)| c).ok_or_else(|| {
                MeshError::classification(format!(
                    "region {}: no side split of {:?} forms a solvable pentagon",
                    region.id, sides
                ))
            })
        }
    }
}

/// Classify as `preferred`, or as the first of [`FALLBACK_SHAPES`] that
/// fits. The error of `preferred` is returned when none does.
pub fn classify_any(region: &CheckedRegion, preferred: Shape) -> Result<Classification> {
    let first = match classify(region, preferred) {
        Ok(class) => return Ok(class),
        Err(e) => e,
    };
    for shape in FALLBACK_SHAPES.into_iter().filter(|&s| s != preferred) {
        if let Ok(class) = classify(region, shape) {
            debug!("region {}: {:?} does not fit ({}), using {:?}", region.id, preferred, first, shape);
            return Ok(class);
        }
    }
    Err(first)
}

/// Classify a region for a scheme string, returning the classification and
/// the scheme's commands.
///
/// A shape letter is binding unless `automatic` is set. A scheme without a
/// letter, or any scheme with `automatic`, starts from the named shape (a
/// rectangle when none is named) and falls back through
/// [`FALLBACK_SHAPES`].
pub fn classify_scheme<'a>(
    region: &CheckedRegion,
    scheme: &'a str,
    automatic: bool,
) -> Result<(Classification, &'a str)> {
    let (named, rest) = split_scheme(scheme);
    let class = match named {
        Some(shape) if !automatic => classify(region, shape)?,
        other => classify_any(region, other.unwrap_or(Shape::Rectangle))?,
    };
    Ok((class, rest))
}
