//! Ordered boundary loops.
//!
//! A [`Perimeter`] is a closed loop of points with one segment per edge.
//! Segment `i` runs from point `i` to point `i + 1` (wrapping). Segments
//! either lie on a geometric line ([`SegmentKind::Boundary`]) or are one of
//! the zero-area cuts that join a hole loop to its host loop
//! ([`SegmentKind::Bridge`]).

use std::collections::HashMap;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::{MeshError, Result};
use crate::geom::arc::{elliptic_arc_points, Ellipse};
use crate::geom::polygon::signed_area;
use crate::mesh::NodeOrigin;

/// A point of a perimeter loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerimeterPoint {
    /// Position in the plane.
    pub position: Point2<f64>,
    /// Geometric provenance.
    pub origin: NodeOrigin,
}

/// What a perimeter segment lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SegmentKind {
    /// On a geometric boundary line.
    #[default]
    Boundary,
    /// A cut joining a hole loop into its host loop.
    Bridge,
}

/// One edge of a perimeter loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Geometric line id; `None` for bridges.
    pub line: Option<u32>,
    /// Boundary or bridge.
    #[serde(default)]
    pub kind: SegmentKind,
}

impl Segment {
    /// A segment on geometric line `line`.
    pub fn boundary(line: u32) -> Self {
        Self {
            line: Some(line),
            kind: SegmentKind::Boundary,
        }
    }

    /// A bridge segment.
    pub fn bridge() -> Self {
        Self {
            line: None,
            kind: SegmentKind::Bridge,
        }
    }
}

/// A closed loop of perimeter points.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Perimeter {
    /// Points in loop order.
    pub points: Vec<PerimeterPoint>,
    /// `segments[i]` joins `points[i]` to `points[i + 1]`.
    pub segments: Vec<Segment>,
}

impl Perimeter {
    /// Start a perimeter at geometric point `point_id`.
    pub fn builder(point_id: u32, position: Point2<f64>) -> PerimeterBuilder {
        PerimeterBuilder::start(point_id, position)
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the loop has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point positions in loop order.
    pub fn positions(&self) -> Vec<Point2<f64>> {
        self.points.iter().map(|p| p.position).collect()
    }

    /// Signed area of the loop (positive when counter-clockwise).
    pub fn signed_area(&self) -> f64 {
        signed_area(&self.positions())
    }

    /// Reverse the traversal direction, keeping each segment on its edge.
    pub fn reverse(&mut self) {
        let n = self.points.len();
        if n == 0 {
            return;
        }
        self.points.reverse();
        let old = self.segments.clone();
        for i in 0..n {
            self.segments[i] = old[(2 * n - 2 - i) % n];
        }
    }

    /// Mean length of the boundary (non-bridge) segments.
    pub fn mean_segment_length(&self) -> f64 {
        let n = self.points.len();
        let (sum, count) = (0..n)
            .filter(|&i| self.segments[i].kind == SegmentKind::Boundary)
            .fold((0.0, 0usize), |(s, c), i| {
                let d = self.points[(i + 1) % n].position - self.points[i].position;
                (s + d.norm(), c + 1)
            });
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// Polylines of each geometric line, in loop order.
    pub fn line_polylines(&self) -> HashMap<u32, Vec<Point2<f64>>> {
        let n = self.points.len();
        let mut out: HashMap<u32, Vec<Point2<f64>>> = HashMap::new();
        if n == 0 {
            return out;
        }
        // start at a segment whose predecessor lies on another line so runs stay contiguous
        let first = (0..n)
            .find(|&i| self.segments[i].line != self.segments[(i + n - 1) % n].line)
            .unwrap_or(0);
        for step in 0..n {
            let i = (first + step) % n;
            let Some(line) = self.segments[i].line else {
                continue;
            };
            let a = self.points[i].position;
            let b = self.points[(i + 1) % n].position;
            let poly = out.entry(line).or_default();
            if poly.last() != Some(&a) {
                poly.push(a);
            }
            poly.push(b);
        }
        out
    }

    /// Join a hole loop into this loop with two bridge segments.
    ///
    /// The hole must run opposite to this loop. The bridge connects the
    /// closest pair of points; both bridge ends appear twice in the result.
    pub fn bridge_hole(&self, hole: &Perimeter) -> Result<Perimeter> {
        if self.points.is_empty() || hole.points.is_empty() {
            return Err(MeshError::topology("cannot bridge an empty loop"));
        }
        if self.signed_area() * hole.signed_area() >= 0.0 {
            return Err(MeshError::topology("hole loop must run opposite to its host"));
        }
        let mut best = (0, 0, f64::MAX);
        for (i, p) in self.points.iter().enumerate() {
            for (j, q) in hole.points.iter().enumerate() {
                let d = (p.position - q.position).norm_squared();
                if d < best.2 {
                    best = (i, j, d);
                }
            }
        }
        let (i, j, _) = best;
        let n = self.points.len();
        let m = hole.points.len();

        let mut points = Vec::with_capacity(n + m + 2);
        let mut segments = Vec::with_capacity(n + m + 2);
        for k in 0..=i {
            points.push(self.points[k]);
            segments.push(self.segments[k]);
        }
        // the last pushed segment is replaced by the bridge into the hole
        segments[i] = Segment::bridge();
        for step in 0..=m {
            let k = (j + step) % m;
            points.push(hole.points[k]);
            segments.push(if step < m {
                hole.segments[k]
            } else {
                Segment::bridge()
            });
        }
        points.push(self.points[i]);
        segments.push(self.segments[i]);
        for k in i + 1..n {
            points.push(self.points[k]);
            segments.push(self.segments[k]);
        }
        Ok(Perimeter { points, segments })
    }
}

/// Incremental construction of a [`Perimeter`] from lines and arcs.
///
/// # Example
/// ```
/// use quadpave::region::Perimeter;
/// use nalgebra::Point2;
///
/// let perimeter = Perimeter::builder(1, Point2::new(0.0, 0.0))
///     .line(1, 2, Point2::new(3.0, 0.0), 3)
///     .line(2, 3, Point2::new(3.0, 3.0), 3)
///     .line(3, 4, Point2::new(0.0, 3.0), 3)
///     .close(4, 3);
/// assert_eq!(perimeter.len(), 12);
/// ```
#[derive(Debug, Clone)]
pub struct PerimeterBuilder {
    first: PerimeterPoint,
    points: Vec<PerimeterPoint>,
    segments: Vec<Segment>,
}

impl PerimeterBuilder {
    /// Begin at geometric point `point_id`.
    pub fn start(point_id: u32, position: Point2<f64>) -> Self {
        let first = PerimeterPoint {
            position,
            origin: NodeOrigin::Point(point_id),
        };
        Self {
            first,
            points: vec![first],
            segments: Vec::new(),
        }
    }

    fn last(&self) -> Point2<f64> {
        self.points.last().map_or(self.first.position, |p| p.position)
    }

    fn push_run(&mut self, line_id: u32, interior: impl IntoIterator<Item = Point2<f64>>) {
        for position in interior {
            self.segments.push(Segment::boundary(line_id));
            self.points.push(PerimeterPoint {
                position,
                origin: NodeOrigin::Line(line_id),
            });
        }
        self.segments.push(Segment::boundary(line_id));
    }

    /// Straight line `line_id` to geometric point `end_id`, with `intervals`
    /// equal intervals.
    pub fn line(mut self, line_id: u32, end_id: u32, end: Point2<f64>, intervals: usize) -> Self {
        let start = self.last();
        let n = intervals.max(1);
        self.push_run(
            line_id,
            (1..n).map(|i| start + (end - start) * (i as f64 / n as f64)),
        );
        self.points.push(PerimeterPoint {
            position: end,
            origin: NodeOrigin::Point(end_id),
        });
        self
    }

    /// Elliptic arc `line_id` from parameter `t0` to `t1`, ending at
    /// geometric point `end_id`. The current point should be at `t0`.
    pub fn arc(
        mut self,
        line_id: u32,
        ellipse: &Ellipse,
        t0: f64,
        t1: f64,
        end_id: u32,
        intervals: usize,
    ) -> Self {
        let n = intervals.max(1);
        let pts = elliptic_arc_points(ellipse, t0, t1, n);
        let interior: Vec<Point2<f64>> = pts[1..n].to_vec();
        self.push_run(line_id, interior);
        self.points.push(PerimeterPoint {
            position: ellipse.point(t1),
            origin: NodeOrigin::Point(end_id),
        });
        self
    }

    /// Straight line `line_id` back to the first point, closing the loop.
    pub fn close(mut self, line_id: u32, intervals: usize) -> Perimeter {
        let start = self.last();
        let end = self.first.position;
        let n = intervals.max(1);
        self.push_run(
            line_id,
            (1..n).map(|i| start + (end - start) * (i as f64 / n as f64)),
        );
        Perimeter {
            points: self.points,
            segments: self.segments,
        }
    }

    /// Close with an elliptic arc back to the first point.
    pub fn close_arc(mut self, line_id: u32, ellipse: &Ellipse, t0: f64, t1: f64, intervals: usize) -> Perimeter {
        let n = intervals.max(1);
        let pts = elliptic_arc_points(ellipse, t0, t1, n);
        let interior: Vec<Point2<f64>> = pts[1..n].to_vec();
        self.push_run(line_id, interior);
        Perimeter {
            points: self.points,
            segments: self.segments,
        }
    }
}
