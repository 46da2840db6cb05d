//! Mesh smoothing algorithms.
//!
//! All smoothers are Gauss-Seidel sweeps over interior nodes: each node is
//! moved toward a kind-specific target as soon as it is computed, scaled by
//! the relaxation factor `ro`. Boundary nodes never move. A sweep whose
//! largest squared displacement is below `(tolerance · ro)²` ends the run;
//! otherwise the run stops at the iteration cap with a warning.
//!
//! # Kinds
//!
//! - [`SmoothingKind::Equipotential`]: Winslow stencil on regular nodes
//! - [`SmoothingKind::AreaPull`]: Laplacian blended with an area-weighted pull
//! - [`SmoothingKind::CentroidInversePush`]: Laplacian blended with a push
//!   away from small elements
//! - [`SmoothingKind::CentroidAreaPull`]: area-weighted element centroids
//! - [`SmoothingKind::Laplacian`]: neighbour average
//! - [`SmoothingKind::LengthWeighted`]: neighbours weighted by line length
//! - [`SmoothingKind::Isoparametric`]: Laplacian blended with parallelogram
//!   completion
//!
//! [`row_smooth`] is the exception to the boundary rule: it places a given
//! row of nodes, straightens lines leaving simple boundary nodes along the
//! corner bisector, and refuses any move that would invert an element.
//!
//! # Example
//!
//! ```
//! use quadpave::algo::smooth::{smooth, SmoothOptions, SmoothingKind};
//! use quadpave::mesh::{build_from_quads, Capacity, NodeOrigin, QuadMesh};
//! use nalgebra::Point2;
//!
//! let mut nodes = Vec::new();
//! for j in 0..3 {
//!     for i in 0..3 {
//!         nodes.push((Point2::new(i as f64, j as f64), NodeOrigin::Interior));
//!     }
//! }
//! nodes[4].0 = Point2::new(1.4, 0.7);
//! let faces = vec![[0, 1, 4, 3], [1, 2, 5, 4], [3, 4, 7, 6], [4, 5, 8, 7]];
//! let mut mesh: QuadMesh = build_from_quads(&nodes, &faces, |_, _| None, Capacity::default()).unwrap();
//!
//! let report = smooth(&mut mesh, &SmoothOptions::default().with_kind(SmoothingKind::Laplacian));
//! assert!(report.converged);
//! ```

use std::f64::consts::PI;

use nalgebra::{Point2, Rotation2, Vector2};
use tracing::{debug, warn};

use crate::geom::quality::quad_angles;
use crate::mesh::{MeshIndex, NodeId, NodeStatus, QuadMesh};

/// Smoother selected by the digit commands `1`–`7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmoothingKind {
    /// `1`: equipotential (Winslow) smoothing.
    Equipotential,
    /// `2`: area pull blended with Laplacian.
    AreaPull,
    /// `3`: centroid inverse push.
    CentroidInversePush,
    /// `4`: centroid area pull.
    CentroidAreaPull,
    /// `5`: plain Laplacian.
    Laplacian,
    /// `6`: length-weighted Laplacian.
    LengthWeighted,
    /// `7`: isoparametric.
    Isoparametric,
}

impl SmoothingKind {
    /// Kind for a scheme digit.
    pub fn from_digit(d: u32) -> Option<Self> {
        match d {
            1 => Some(Self::Equipotential),
            2 => Some(Self::AreaPull),
            3 => Some(Self::CentroidInversePush),
            4 => Some(Self::CentroidAreaPull),
            5 => Some(Self::Laplacian),
            6 => Some(Self::LengthWeighted),
            7 => Some(Self::Isoparametric),
            _ => None,
        }
    }

    /// Scheme digit for this kind.
    pub fn digit(self) -> u32 {
        match self {
            Self::Equipotential => 1,
            Self::AreaPull => 2,
            Self::CentroidInversePush => 3,
            Self::CentroidAreaPull => 4,
            Self::Laplacian => 5,
            Self::LengthWeighted => 6,
            Self::Isoparametric => 7,
        }
    }
}

impl Default for SmoothingKind {
    fn default() -> Self {
        Self::Equipotential
    }
}

/// Options for mesh smoothing algorithms.
#[derive(Debug, Clone)]
pub struct SmoothOptions {
    /// Which smoother to run.
    pub kind: SmoothingKind,

    /// Maximum number of sweeps.
    pub iterations: usize,

    /// Convergence distance, before scaling by `relaxation`.
    pub tolerance: f64,

    /// Relaxation factor applied to every displacement.
    pub relaxation: f64,

    /// Blend weight of the area term (kinds 2 and 3).
    pub area_pull: f64,

    /// Blend weight of the isoparametric term (kind 7).
    pub iso_weight: f64,
}

impl Default for SmoothOptions {
    fn default() -> Self {
        Self {
            kind: SmoothingKind::default(),
            iterations: 50,
            tolerance: 1e-3,
            relaxation: 1.0,
            area_pull: 0.5,
            iso_weight: 0.5,
        }
    }
}

impl SmoothOptions {
    /// Set the smoother kind.
    pub fn with_kind(mut self, kind: SmoothingKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the sweep cap.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the convergence distance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the relaxation factor.
    pub fn with_relaxation(mut self, relaxation: f64) -> Self {
        self.relaxation = relaxation;
        self
    }

    /// Set the area blend weight, clamped to `[0, 1]`.
    pub fn with_area_pull(mut self, alpha: f64) -> Self {
        self.area_pull = alpha.clamp(0.0, 1.0);
        self
    }

    /// Set the isoparametric blend weight. Negative weights become zero.
    pub fn with_iso_weight(mut self, weight: f64) -> Self {
        self.iso_weight = weight.max(0.0);
        self
    }

    fn converge_limit(&self) -> f64 {
        let eps = self.tolerance * self.relaxation;
        eps * eps
    }
}

/// Outcome of a smoothing run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothReport {
    /// Sweeps performed.
    pub iterations: usize,
    /// Whether the convergence test passed.
    pub converged: bool,
    /// Largest displacement in the final sweep.
    pub max_displacement: f64,
}

/// Smooth every interior node with the selected kind.
pub fn smooth<I: MeshIndex>(mesh: &mut QuadMesh<I>, options: &SmoothOptions) -> SmoothReport {
    let interior: Vec<NodeId<I>> = mesh
        .node_ids()
        .filter(|&n| mesh.node(n).status == NodeStatus::Interior)
        .collect();

    let limit = options.converge_limit();
    let mut report = SmoothReport {
        iterations: 0,
        converged: interior.is_empty(),
        max_displacement: 0.0,
    };
    if interior.is_empty() {
        return report;
    }

    for sweep in 1..=options.iterations {
        let mut max_d2: f64 = 0.0;
        for &n in &interior {
            let x = mesh.position(n);
            let target = smoothing_target(mesh, n, options);
            let d = (target - x) * options.relaxation;
            mesh.set_position(n, x + d);
            max_d2 = max_d2.max(d.norm_squared());
        }
        report.iterations = sweep;
        report.max_displacement = max_d2.sqrt();
        if max_d2 < limit {
            report.converged = true;
            break;
        }
    }

    if report.converged {
        debug!(
            "{:?} smoothing converged after {} sweeps",
            options.kind, report.iterations
        );
    } else {
        warn!(
            "{:?} smoothing not converging after {} sweeps (last move {:.3e})",
            options.kind, report.iterations, report.max_displacement
        );
    }
    report
}

fn smoothing_target<I: MeshIndex>(mesh: &QuadMesh<I>, n: NodeId<I>, options: &SmoothOptions) -> Point2<f64> {
    let lap = laplacian_target(mesh, n);
    let target = match options.kind {
        SmoothingKind::Laplacian => lap,
        SmoothingKind::LengthWeighted => length_weighted_target(mesh, n),
        SmoothingKind::Equipotential => winslow_target(mesh, n).unwrap_or(lap),
        SmoothingKind::CentroidAreaPull => area_centroid(mesh, n).unwrap_or(lap),
        SmoothingKind::AreaPull => area_centroid(mesh, n)
            .map_or(lap, |c| lap + (c - lap) * options.area_pull),
        SmoothingKind::CentroidInversePush => inverse_push(mesh, n)
            .map_or(lap, |p| lap + (p - lap) * options.area_pull),
        SmoothingKind::Isoparametric => isoparametric_target(mesh, n)
            .map_or(lap, |p| lap + (p - lap) * options.iso_weight),
    };
    if target.x.is_finite() && target.y.is_finite() {
        target
    } else {
        mesh.position(n)
    }
}

/// Average of the neighbouring nodes.
pub fn laplacian_target<I: MeshIndex>(mesh: &QuadMesh<I>, n: NodeId<I>) -> Point2<f64> {
    let neighbors = mesh.node_neighbors(n);
    if neighbors.is_empty() {
        return mesh.position(n);
    }
    let sum = neighbors
        .iter()
        .fold(Vector2::zeros(), |acc, &m| acc + mesh.position(m).coords);
    Point2::from(sum / neighbors.len() as f64)
}

fn length_weighted_target<I: MeshIndex>(mesh: &QuadMesh<I>, n: NodeId<I>) -> Point2<f64> {
    let x = mesh.position(n);
    let mut num = Vector2::zeros();
    let mut den = 0.0;
    for m in mesh.node_neighbors(n) {
        let d = mesh.position(m) - x;
        let len = d.norm();
        num += d * len;
        den += len;
    }
    if den <= 0.0 {
        x
    } else {
        x + num / den
    }
}

/// Corners of element `k` relative to node `n`: next, opposite, previous.
fn corner_ring<I: MeshIndex>(
    mesh: &QuadMesh<I>,
    k: crate::mesh::ElementId<I>,
    n: NodeId<I>,
) -> Option<(NodeId<I>, NodeId<I>, NodeId<I>)> {
    let corners = mesh.element_nodes(k);
    let s = corners.iter().position(|&c| c == n)?;
    Some((corners[(s + 1) % 4], corners[(s + 2) % 4], corners[(s + 3) % 4]))
}

fn area_centroid<I: MeshIndex>(mesh: &QuadMesh<I>, n: NodeId<I>) -> Option<Point2<f64>> {
    let mut sum = Vector2::zeros();
    let mut total = 0.0;
    for k in mesh.node_elements(n) {
        let a = mesh.element_area(k).abs();
        sum += mesh.element_centroid(k).coords * a;
        total += a;
    }
    (total > 0.0).then(|| Point2::from(sum / total))
}

fn inverse_push<I: MeshIndex>(mesh: &QuadMesh<I>, n: NodeId<I>) -> Option<Point2<f64>> {
    let x = mesh.position(n);
    let elements = mesh.node_elements(n);
    if elements.is_empty() {
        return None;
    }
    let areas: Vec<f64> = elements.iter().map(|&k| mesh.element_area(k).abs()).collect();
    let mean = areas.iter().sum::<f64>() / areas.len() as f64;
    if mean <= 0.0 {
        return None;
    }
    let shift = elements
        .iter()
        .zip(&areas)
        .fold(Vector2::zeros(), |acc, (&k, &a)| {
            acc + (mesh.element_centroid(k) - x) * ((a - mean) / mean)
        });
    Some(x + shift / elements.len() as f64)
}

fn isoparametric_target<I: MeshIndex>(mesh: &QuadMesh<I>, n: NodeId<I>) -> Option<Point2<f64>> {
    let elements = mesh.node_elements(n);
    if elements.is_empty() {
        return None;
    }
    let mut sum = Vector2::zeros();
    for &k in &elements {
        let (a, c, b) = corner_ring(mesh, k, n)?;
        sum += mesh.position(a).coords + mesh.position(b).coords - mesh.position(c).coords;
    }
    Some(Point2::from(sum / elements.len() as f64))
}

/// Winslow equipotential target for a node with four elements in a ring.
fn winslow_target<I: MeshIndex>(mesh: &QuadMesh<I>, n: NodeId<I>) -> Option<Point2<f64>> {
    if mesh.node_lines(n).len() != 4 {
        return None;
    }
    let elements = mesh.node_elements(n);
    if elements.len() != 4 {
        return None;
    }
    // walk the ring: the previous corner of one element is the next corner of the following one
    let mut ring = Vec::with_capacity(4);
    let mut current = elements[0];
    for _ in 0..4 {
        let (a, c, b) = corner_ring(mesh, current, n)?;
        ring.push((a, c));
        if ring.len() == 4 {
            break;
        }
        current = *elements
            .iter()
            .find(|&&k| k != current && corner_ring(mesh, k, n).map(|r| r.0) == Some(b))?;
    }
    let p = |id: NodeId<I>| mesh.position(id).coords;
    let (e, ne) = (p(ring[0].0), p(ring[0].1));
    let (nn, nw) = (p(ring[1].0), p(ring[1].1));
    let (w, sw) = (p(ring[2].0), p(ring[2].1));
    let (s, se) = (p(ring[3].0), p(ring[3].1));

    let x_xi = (e - w) * 0.5;
    let x_eta = (nn - s) * 0.5;
    let alpha = x_eta.norm_squared();
    let beta = x_xi.dot(&x_eta);
    let gamma = x_xi.norm_squared();
    let denom = 2.0 * (alpha + gamma);
    if denom <= f64::MIN_POSITIVE {
        return None;
    }
    let v = ((e + w) * alpha + (nn + s) * gamma - (ne - nw - se + sw) * (0.5 * beta)) / denom;
    Some(Point2::from(v))
}

/// Interior angle of a boundary node and the direction it starts from.
///
/// The angle is the sum of the incident element angles; it is swept
/// counter-clockwise from the boundary line leaving the node with the mesh
/// on its left.
pub fn boundary_corner<I: MeshIndex>(mesh: &QuadMesh<I>, b: NodeId<I>) -> Option<(Vector2<f64>, f64)> {
    let mut start = None;
    let mut total = 0.0;
    for k in mesh.node_elements(b) {
        let corners = mesh.element_nodes(k);
        let s = corners.iter().position(|&c| c == b)?;
        total += quad_angles(&mesh.element_positions(k)).angles[s];
        let line = mesh.element(k).lines()[s];
        if mesh.is_boundary_line(line) {
            start = Some(mesh.position(corners[(s + 1) % 4]) - mesh.position(b));
        }
    }
    let dir = start?.try_normalize(f64::MIN_POSITIVE)?;
    Some((dir, total))
}

fn bisector_target<I: MeshIndex>(mesh: &QuadMesh<I>, n: NodeId<I>, lap: Point2<f64>) -> Option<Point2<f64>> {
    let anchor = mesh.node_neighbors(n).into_iter().find(|&m| {
        mesh.node(m).status == NodeStatus::Boundary && mesh.node_lines(m).len() == 3
    })?;
    let (dir, angle) = boundary_corner(mesh, anchor)?;
    if !(angle > 0.0 && angle < 2.0 * PI) {
        return None;
    }
    let bisector = Rotation2::new(0.5 * angle) * dir;
    let b = mesh.position(anchor);
    let reach = (lap - b).norm();
    Some(b + bisector * reach)
}

/// Smooth a row of nodes with inversion rejection.
///
/// Each node moves toward its Laplacian target; a node joined to a boundary
/// node with a single interior line is instead placed on that corner's
/// bisector. A move that leaves any incident element with non-positive
/// signed area is discarded for that sweep.
pub fn row_smooth<I: MeshIndex>(mesh: &mut QuadMesh<I>, row: &[NodeId<I>], options: &SmoothOptions) -> SmoothReport {
    let limit = options.converge_limit();
    let mut report = SmoothReport {
        iterations: 0,
        converged: row.is_empty(),
        max_displacement: 0.0,
    };
    if row.is_empty() {
        return report;
    }

    let mut rejected = 0usize;
    for sweep in 1..=options.iterations {
        let mut max_d2: f64 = 0.0;
        for &n in row {
            if mesh.node(n).status != NodeStatus::Interior {
                continue;
            }
            let x = mesh.position(n);
            let lap = laplacian_target(mesh, n);
            let target = bisector_target(mesh, n, lap).unwrap_or(lap);
            let d = (target - x) * options.relaxation;
            if !d.x.is_finite() || !d.y.is_finite() {
                continue;
            }
            mesh.set_position(n, x + d);
            let inverted = mesh
                .node_elements(n)
                .into_iter()
                .any(|k| mesh.element_area(k) <= 0.0);
            if inverted {
                mesh.set_position(n, x);
                rejected += 1;
                continue;
            }
            max_d2 = max_d2.max(d.norm_squared());
        }
        report.iterations = sweep;
        report.max_displacement = max_d2.sqrt();
        if max_d2 < limit {
            report.converged = true;
            break;
        }
    }
    if rejected > 0 {
        debug!("row smoothing rejected {} inverting moves", rejected);
    }
    if !report.converged {
        warn!("row smoothing not converging after {} sweeps", report.iterations);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{build_from_quads, Capacity, NodeOrigin};

    /// (n+1) x (n+1) grid of unit quads.
    fn create_grid_mesh(n: usize) -> QuadMesh {
        let mut nodes = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                nodes.push((Point2::new(i as f64, j as f64), NodeOrigin::Interior));
            }
        }
        let at = |i: usize, j: usize| j * (n + 1) + i;
        let mut faces = Vec::new();
        for j in 0..n {
            for i in 0..n {
                faces.push([at(i, j), at(i + 1, j), at(i + 1, j + 1), at(i, j + 1)]);
            }
        }
        build_from_quads(&nodes, &faces, |_, _| None, Capacity::estimate(4 * n + 4)).unwrap()
    }

    fn perturb(mesh: &mut QuadMesh) {
        let ids: Vec<_> = mesh.node_ids().collect();
        for (i, n) in ids.into_iter().enumerate() {
            if mesh.node(n).status == NodeStatus::Interior {
                let p = mesh.position(n);
                let dx = 0.2 * ((i * 7 % 5) as f64 / 5.0 - 0.4);
                let dy = 0.2 * ((i * 3 % 5) as f64 / 5.0 - 0.4);
                mesh.set_position(n, Point2::new(p.x + dx, p.y + dy));
            }
        }
    }

    fn max_error(mesh: &QuadMesh, n: usize) -> f64 {
        mesh.node_ids()
            .map(|id| {
                let i = id.index() % (n + 1);
                let j = id.index() / (n + 1);
                (mesh.position(id) - Point2::new(i as f64, j as f64)).norm()
            })
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_every_kind_restores_regular_grid() {
        for d in 1..=7 {
            let kind = SmoothingKind::from_digit(d).unwrap();
            let mut mesh = create_grid_mesh(4);
            perturb(&mut mesh);
            let options = SmoothOptions::default()
                .with_kind(kind)
                .with_iterations(2000)
                .with_tolerance(1e-9);
            let report = smooth(&mut mesh, &options);
            assert!(report.converged, "kind {} did not converge", d);
            assert!(max_error(&mesh, 4) < 1e-3, "kind {} left error {}", d, max_error(&mesh, 4));
        }
    }

    #[test]
    fn test_boundary_nodes_fixed() {
        let mut mesh = create_grid_mesh(3);
        perturb(&mut mesh);
        let before: Vec<_> = mesh
            .node_ids()
            .filter(|&n| mesh.node(n).status == NodeStatus::Boundary)
            .map(|n| (n, mesh.position(n)))
            .collect();
        smooth(&mut mesh, &SmoothOptions::default().with_kind(SmoothingKind::Laplacian));
        for (n, p) in before {
            assert_eq!(mesh.position(n), p);
        }
    }

    #[test]
    fn test_converged_run_is_stable() {
        let mut mesh = create_grid_mesh(4);
        perturb(&mut mesh);
        let options = SmoothOptions::default()
            .with_kind(SmoothingKind::Laplacian)
            .with_iterations(1000)
            .with_tolerance(1e-4);
        assert!(smooth(&mut mesh, &options).converged);
        let again = smooth(&mut mesh, &options.clone().with_iterations(1));
        assert!(again.max_displacement < options.tolerance);
    }

    #[test]
    fn test_not_converging_is_reported() {
        let mut mesh = create_grid_mesh(4);
        perturb(&mut mesh);
        let options = SmoothOptions::default()
            .with_kind(SmoothingKind::Laplacian)
            .with_iterations(1)
            .with_tolerance(1e-12);
        let report = smooth(&mut mesh, &options);
        assert!(!report.converged);
        assert_eq!(report.iterations, 1);
    }

    #[test]
    fn test_row_smooth_rejects_inversion() {
        let mut mesh = create_grid_mesh(2);
        let center = NodeId::new(4);
        // over-relaxation would throw the centre node past its neighbours
        mesh.set_position(center, Point2::new(1.9, 1.9));
        let options = SmoothOptions::default()
            .with_relaxation(4.0)
            .with_iterations(1);
        row_smooth(&mut mesh, &[center], &options);
        for k in mesh.element_ids() {
            assert!(mesh.element_area(k) > 0.0);
        }
        assert_eq!(mesh.position(center), Point2::new(1.9, 1.9));
    }

    #[test]
    fn test_boundary_corner_angle() {
        let mesh = create_grid_mesh(2);
        // bottom edge midpoint: two elements, straight boundary
        let (_, angle) = boundary_corner(&mesh, NodeId::new(1)).unwrap();
        assert!((angle - PI).abs() < 1e-9);
        let (dir, angle) = boundary_corner(&mesh, NodeId::new(0)).unwrap();
        assert!((angle - PI / 2.0).abs() < 1e-9);
        assert!((dir - Vector2::new(1.0, 0.0)).norm() < 1e-12);
    }
}
