//! Hole processing.
//!
//! A hole is cut out of an existing mesh: elements whose centroid lies inside
//! the hole loop are deleted, along with the lines and nodes they leave
//! unused. The ring of nodes left around the cavity is then laid onto the
//! hole loop. Every hole corner receives a ring node, picked so the ring keeps
//! its order while staying as close to the corners as it can, and the nodes
//! between two corners are spread along that stretch of the hole. They land
//! on the hole's own interval points when the counts agree. A cavity with
//! fewer nodes than the hole has corners is widened by one layer of
//! elements at a time. The region perimeter then absorbs the hole loop
//! through a pair of bridge segments so boundary flags can find the hole's
//! lines.

use std::collections::{BTreeSet, HashSet};

use nalgebra::Point2;
use tracing::{debug, info};

use super::smooth::laplacian_target;
use crate::error::{MeshError, Result};
use crate::geom::polygon::{closest_point_on_polyline, point_in_polygon};
use crate::mesh::{BoundaryLoop, ElementId, MeshIndex, NodeId, NodeOrigin, QuadMesh};
use crate::region::{Hole, Perimeter};

/// Upper bound on elements removed while repairing pinched nodes.
const MAX_PINCH_REPAIRS: usize = 64;

/// Element layers a cut may add to find a node for every hole corner.
const MAX_RING_GROWTH: usize = 3;

/// Laplacian sweeps allowed for undoing inversions left by the ring move.
const MAX_UNTANGLE_SWEEPS: usize = 50;

/// Summary of one processed hole.
#[derive(Debug, Clone)]
pub struct HoleCut {
    /// Elements deleted, including pinch repairs and widening.
    pub removed_elements: usize,
    /// Nodes on the new inner boundary.
    pub boundary_nodes: usize,
    /// Sweeps spent relaxing elements the ring move inverted.
    pub untangle_sweeps: usize,
    /// The host perimeter with the hole bridged in.
    pub perimeter: Perimeter,
}

/// Cut `hole` out of `mesh`.
///
/// `host` is the current region perimeter, counter-clockwise. Fails with
/// [`MeshError::NotImplemented`] for holes that are not 1-D loops, and with
/// a topology error when the hole reaches the existing boundary, covers no
/// element, or leaves an element inverted.
pub fn cut_hole<I: MeshIndex>(mesh: &mut QuadMesh<I>, hole: &Hole, host: &Perimeter) -> Result<HoleCut> {
    if hole.dimension != 1 {
        return Err(MeshError::NotImplemented("hole stitching in two or three dimensions"));
    }
    let mut outline = hole.perimeter.clone();
    if outline.signed_area() > 0.0 {
        outline.reverse();
    }
    let polygon = outline.positions();
    let original_boundary: HashSet<NodeId<I>> = mesh
        .node_ids()
        .filter(|&n| mesh.is_boundary_node(n))
        .collect();

    let doomed: Vec<ElementId<I>> = mesh
        .element_ids()
        .filter(|&k| point_in_polygon(&polygon, &mesh.element_centroid(k)))
        .collect();
    if doomed.is_empty() {
        return Err(MeshError::topology(format!("hole {} covers no element", hole.id)));
    }
    let mut removed = carve(mesh, doomed, &polygon, &original_boundary, hole.id)?;

    let corners = hole_corners(&outline);
    let mut ring = cavity_ring(mesh, &original_boundary, hole.id)?;
    let mut growth = 0;
    while ring.nodes.len() < corners.len() {
        if growth == MAX_RING_GROWTH {
            return Err(MeshError::topology(format!(
                "hole {} has {} corners but its cut leaves {} boundary nodes",
                hole.id,
                corners.len(),
                ring.nodes.len()
            )));
        }
        growth += 1;
        let on_ring: HashSet<NodeId<I>> = ring.nodes.iter().copied().collect();
        let layer: Vec<ElementId<I>> = mesh
            .element_ids()
            .filter(|&k| mesh.element_nodes(k).iter().any(|n| on_ring.contains(n)))
            .collect();
        debug!(
            "hole {}: {} ring nodes for {} corners, widening by {} elements",
            hole.id,
            ring.nodes.len(),
            corners.len(),
            layer.len()
        );
        removed += carve(mesh, layer, &polygon, &original_boundary, hole.id)?;
        ring = cavity_ring(mesh, &original_boundary, hole.id)?;
    }

    lay_ring(mesh, &ring, &outline, &corners);
    let sweeps = untangle(mesh, &ring.nodes, hole.id)?;
    debug_assert!(mesh.validate().is_ok(), "{:?}", mesh.validate());

    let perimeter = host.bridge_hole(&outline)?;
    info!(
        "hole {}: removed {} elements, {} new boundary nodes",
        hole.id,
        removed,
        ring.nodes.len()
    );
    Ok(HoleCut {
        removed_elements: removed,
        boundary_nodes: ring.nodes.len(),
        untangle_sweeps: sweeps,
        perimeter,
    })
}

/// Remove `doomed`, then keep removing elements at any node where the
/// cavity meets itself. Returns the number of elements removed.
fn carve<I: MeshIndex>(
    mesh: &mut QuadMesh<I>,
    mut doomed: Vec<ElementId<I>>,
    polygon: &[Point2<f64>],
    original_boundary: &HashSet<NodeId<I>>,
    hole: u32,
) -> Result<usize> {
    let touches_boundary = |mesh: &QuadMesh<I>, k: ElementId<I>| {
        mesh.element_nodes(k).iter().any(|n| original_boundary.contains(n))
    };
    if doomed.iter().any(|&k| touches_boundary(&*mesh, k)) {
        return Err(MeshError::topology(format!("hole {} reaches the region boundary", hole)));
    }

    let mut removed = 0;
    let mut repairs = 0;
    loop {
        for &k in &doomed {
            remove_element(mesh, k)?;
            removed += 1;
        }
        // a node where the cut meets itself has more than two boundary lines
        let Some(pinch) = mesh.node_ids().find(|&n| {
            mesh.node_lines(n)
                .iter()
                .filter(|&&l| mesh.is_boundary_line(l))
                .count()
                > 2
        }) else {
            break;
        };
        let inside = |mesh: &QuadMesh<I>, k: ElementId<I>| {
            closest_point_on_polyline(polygon, true, &mesh.element_centroid(k)).map_or(f64::MAX, |p| p.distance)
        };
        let view: &QuadMesh<I> = mesh;
        let next = view
            .node_elements(pinch)
            .into_iter()
            .min_by(|&a, &b| inside(view, a).total_cmp(&inside(view, b)))
            .ok_or_else(|| MeshError::topology(format!("pinched {:?} has no element", pinch)))?;
        repairs += 1;
        if repairs > MAX_PINCH_REPAIRS || touches_boundary(&*mesh, next) {
            return Err(MeshError::topology(format!(
                "cannot repair pinched node {:?} in hole {}",
                pinch, hole
            )));
        }
        debug!("hole {}: removing {:?} to repair pinch at {:?}", hole, next, pinch);
        doomed = vec![next];
    }
    Ok(removed)
}

/// The one boundary loop made entirely of nodes the cut exposed.
fn cavity_ring<I: MeshIndex>(
    mesh: &QuadMesh<I>,
    original_boundary: &HashSet<NodeId<I>>,
    hole: u32,
) -> Result<BoundaryLoop<I>> {
    let mut cavities: Vec<BoundaryLoop<I>> = mesh
        .boundary_loops()?
        .into_iter()
        .filter(|lp| lp.nodes.iter().all(|n| !original_boundary.contains(n)))
        .collect();
    if cavities.len() != 1 {
        return Err(MeshError::topology(format!(
            "hole {} cut leaves {} cavity loops",
            hole,
            cavities.len()
        )));
    }
    Ok(cavities.remove(0))
}

/// Loop indices of a hole's corners: its geometric points and any point
/// where the geometric line changes.
fn hole_corners(outline: &Perimeter) -> Vec<usize> {
    let n = outline.len();
    let corners: Vec<usize> = (0..n)
        .filter(|&i| {
            matches!(outline.points[i].origin, NodeOrigin::Point(_))
                || outline.segments[i].line != outline.segments[(i + n - 1) % n].line
        })
        .collect();
    if corners.is_empty() {
        vec![0]
    } else {
        corners
    }
}

/// Match corners to ring positions in ring order, minimising the summed
/// squared distance.
///
/// Returns the ring offset given to corner 0 and, relative to it, the ring
/// position of every corner (the first is always 0). `ring` must have at
/// least as many points as `corners`.
fn assign_corners(ring: &[Point2<f64>], corners: &[Point2<f64>]) -> (usize, Vec<usize>) {
    let m = ring.len();
    let q = corners.len();
    let mut best: Option<(f64, usize, Vec<usize>)> = None;
    for start in 0..m {
        let cost = |j: usize, i: usize| (ring[(start + i) % m] - corners[j]).norm_squared();
        let mut row = vec![f64::INFINITY; m];
        row[0] = cost(0, 0);
        let mut back: Vec<Vec<usize>> = Vec::with_capacity(q.saturating_sub(1));
        for j in 1..q {
            let mut next = vec![f64::INFINITY; m];
            let mut from = vec![0usize; m];
            let mut prefix = (f64::INFINITY, 0usize);
            for i in 1..m {
                if row[i - 1] < prefix.0 {
                    prefix = (row[i - 1], i - 1);
                }
                if prefix.0.is_finite() {
                    next[i] = prefix.0 + cost(j, i);
                    from[i] = prefix.1;
                }
            }
            row = next;
            back.push(from);
        }
        let Some((last, total)) = row
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, c)| c.is_finite())
            .min_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };
        if best.as_ref().map_or(true, |b| total < b.0 - 1e-12) {
            let mut picks = vec![last];
            let mut i = last;
            for from in back.iter().rev() {
                i = from[i];
                picks.push(i);
            }
            picks.reverse();
            best = Some((total, start, picks));
        }
    }
    best.map_or((0, vec![0]), |(_, start, picks)| (start, picks))
}

/// Point at arc length `s` around a closed loop with cumulative lengths
/// `arc` (one longer than `points`).
fn point_at(points: &[Point2<f64>], arc: &[f64], s: f64) -> Point2<f64> {
    let h = points.len();
    let total = arc[h];
    let s = if total > 0.0 { s.rem_euclid(total) } else { 0.0 };
    let i = (0..h).find(|&i| arc[i + 1] >= s).unwrap_or(h - 1);
    let seg = arc[i + 1] - arc[i];
    let t = if seg > 0.0 { (s - arc[i]) / seg } else { 0.0 };
    points[i] + (points[(i + 1) % h] - points[i]) * t
}

/// Move the cavity ring onto the hole loop and tag it with the hole's ids.
///
/// Both ends of every ring line end up on one corner-to-corner stretch of
/// the hole, and the line takes that stretch's geometric line.
fn lay_ring<I: MeshIndex>(mesh: &mut QuadMesh<I>, ring: &BoundaryLoop<I>, outline: &Perimeter, corners: &[usize]) {
    let points = outline.positions();
    let h = points.len();
    let m = ring.nodes.len();
    let mut arc = Vec::with_capacity(h + 1);
    arc.push(0.0);
    for i in 0..h {
        arc.push(arc[i] + (points[(i + 1) % h] - points[i]).norm());
    }
    let total = arc[h];

    let ring_pos: Vec<Point2<f64>> = ring.nodes.iter().map(|&n| mesh.position(n)).collect();
    let corner_pos: Vec<Point2<f64>> = corners.iter().map(|&c| points[c]).collect();
    let (start, picks) = assign_corners(&ring_pos, &corner_pos);
    let mut walked = Vec::with_capacity(m + 1);
    walked.push(0.0);
    for i in 0..m {
        walked.push(walked[i] + (ring_pos[(start + i + 1) % m] - ring_pos[(start + i) % m]).norm());
    }

    let q = corners.len();
    for j in 0..q {
        let (ca, cb) = (corners[j], corners[(j + 1) % q]);
        let (ia, ib) = (picks[j], if j + 1 < q { picks[j + 1] } else { m });
        let from = arc[ca];
        let mut to = arc[cb];
        if to <= from {
            to += total;
        }
        let intervals = match (cb + h - ca) % h {
            0 => h,
            k => k,
        };
        let line = outline.segments[ca].line;
        let count = ib - ia;
        let span = walked[ib] - walked[ia];
        for k in 0..count {
            let n = ring.nodes[(start + ia + k) % m];
            let (position, origin) = if count == intervals {
                let p = outline.points[(ca + k) % h];
                (p.position, p.origin)
            } else if k == 0 {
                (points[ca], outline.points[ca].origin)
            } else {
                let f = if span > 0.0 {
                    (walked[ia + k] - walked[ia]) / span
                } else {
                    k as f64 / count as f64
                };
                (
                    point_at(&points, &arc, from + (to - from) * f),
                    line.map_or(NodeOrigin::Interior, NodeOrigin::Line),
                )
            };
            mesh.set_position(n, position);
            mesh.set_node_origin(n, origin);
            mesh.set_line_origin(ring.lines[(start + ia + k) % m], line);
        }
    }
}

/// Relax the free corners of inverted elements around `moved` until every
/// element there has positive area. Returns the sweeps used.
fn untangle<I: MeshIndex>(mesh: &mut QuadMesh<I>, moved: &[NodeId<I>], hole: u32) -> Result<usize> {
    let mut watch: BTreeSet<ElementId<I>> = moved.iter().flat_map(|&n| mesh.node_elements(n)).collect();
    for sweep in 0..MAX_UNTANGLE_SWEEPS {
        let inverted: Vec<ElementId<I>> = watch
            .iter()
            .copied()
            .filter(|&k| mesh.element_area(k) <= 0.0)
            .collect();
        if inverted.is_empty() {
            if sweep > 0 {
                debug!("hole {}: inversions relaxed in {} sweeps", hole, sweep);
            }
            return Ok(sweep);
        }
        let free: BTreeSet<NodeId<I>> = inverted
            .iter()
            .flat_map(|&k| mesh.element_nodes(k))
            .filter(|&n| !mesh.is_boundary_node(n))
            .collect();
        if free.is_empty() {
            break;
        }
        for n in free {
            let p = laplacian_target(mesh, n);
            mesh.set_position(n, p);
            watch.extend(mesh.node_elements(n));
        }
    }
    let left = watch.iter().filter(|&&k| mesh.element_area(k) <= 0.0).count();
    Err(MeshError::topology(format!(
        "hole {}: {} elements stay inverted next to the cut",
        hole, left
    )))
}

/// Delete an element together with any lines and nodes it leaves unused.
pub(crate) fn remove_element<I: MeshIndex>(mesh: &mut QuadMesh<I>, k: ElementId<I>) -> Result<()> {
    let lines = mesh.element(k).lines();
    let corners = mesh.element_nodes(k);
    mesh.delete_element(k)?;
    for l in lines {
        if mesh.line(l).element_count() == 0 {
            mesh.delete_line(l)?;
        }
    }
    for n in corners {
        if mesh.is_node_alive(n) && mesh.node_lines(n).is_empty() {
            mesh.delete_node(n)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{build_from_quads, Capacity};
    use nalgebra::Point2;

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
        build_from_quads(&nodes, &faces, |_, _| Some(1), Capacity::estimate(4 * n + 4)).unwrap()
    }

    fn host(n: f64) -> Perimeter {
        Perimeter::builder(1, Point2::new(0.0, 0.0))
            .line(1, 2, Point2::new(n, 0.0), 4)
            .line(2, 3, Point2::new(n, n), 4)
            .line(3, 4, Point2::new(0.0, n), 4)
            .close(4, 4)
    }

    /// Clockwise square hole.
    fn square_hole(lo: f64, hi: f64) -> Hole {
        let mut perimeter = Perimeter::builder(11, Point2::new(lo, lo))
            .line(11, 12, Point2::new(hi, lo), 1)
            .line(12, 13, Point2::new(hi, hi), 1)
            .line(13, 14, Point2::new(lo, hi), 1)
            .close(14, 1);
        perimeter.reverse();
        Hole {
            id: 1,
            dimension: 1,
            perimeter,
        }
    }

    #[test]
    fn test_cut_square_hole() {
        let mut mesh = create_grid_mesh(4);
        let cut = cut_hole(&mut mesh, &square_hole(1.2, 2.8), &host(4.0)).unwrap();
        assert_eq!(cut.removed_elements, 4);
        assert_eq!(cut.boundary_nodes, 8);
        assert_eq!(mesh.num_elements(), 12);
        // the centre node was orphaned and freed
        assert_eq!(mesh.num_nodes(), 24);
        assert!(mesh.is_valid());

        let loops = mesh.boundary_loops().unwrap();
        assert_eq!(loops.len(), 2);
        let inner = loops.iter().find(|l| l.signed_area < 0.0).unwrap();
        assert_eq!(inner.nodes.len(), 8);
        for &n in &inner.nodes {
            let p = mesh.position(n);
            let on_side = (p.x - 1.2).abs() < 1e-12
                || (p.x - 2.8).abs() < 1e-12
                || (p.y - 1.2).abs() < 1e-12
                || (p.y - 2.8).abs() < 1e-12;
            assert!(on_side, "{:?}", p);
        }
        for &l in &inner.lines {
            let id = mesh.line(l).origin.unwrap();
            assert!((11..=14).contains(&id));
        }
        for k in mesh.element_ids() {
            assert!(mesh.element_area(k) > 0.0);
        }
        // 16 host points, 4 hole points, two bridge ends repeated
        assert_eq!(cut.perimeter.len(), 22);
    }

    /// Clockwise polygonal hole with one interval per side and point ids
    /// from 11.
    fn polygon_hole(corners: &[Point2<f64>]) -> Hole {
        let mut builder = Perimeter::builder(11, corners[0]);
        for (i, &c) in corners.iter().enumerate().skip(1) {
            builder = builder.line(10 + i as u32, 11 + i as u32, c, 1);
        }
        let mut perimeter = builder.close(10 + corners.len() as u32, 1);
        if perimeter.signed_area() > 0.0 {
            perimeter.reverse();
        }
        Hole {
            id: 2,
            dimension: 1,
            perimeter,
        }
    }

    fn assert_laid_on(mesh: &QuadMesh, hole: &Hole) {
        let loops = mesh.boundary_loops().unwrap();
        assert_eq!(loops.len(), 2);
        let inner = loops.iter().find(|l| l.signed_area < 0.0).unwrap();
        let outline = hole.perimeter.positions();
        for &n in &inner.nodes {
            let off = closest_point_on_polyline(&outline, true, &mesh.position(n)).unwrap().distance;
            assert!(off < 1e-9, "{:?} is {} off the hole", mesh.position(n), off);
        }
        for &l in &inner.lines {
            assert!(mesh.line(l).origin.is_some());
        }
        // every hole corner is a mesh node
        for p in &hole.perimeter.points {
            let NodeOrigin::Point(id) = p.origin else {
                continue;
            };
            let n = inner
                .nodes
                .iter()
                .find(|&&n| mesh.node(n).origin == NodeOrigin::Point(id))
                .unwrap();
            assert_eq!(mesh.position(*n), p.position);
        }
        for k in mesh.element_ids() {
            assert!(mesh.element_area(k) > 0.0, "{:?} inverted", k);
        }
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_cut_triangle_hole() {
        let mut mesh = create_grid_mesh(6);
        let hole = polygon_hole(&[Point2::new(1.4, 1.3), Point2::new(4.6, 1.7), Point2::new(3.1, 4.4)]);
        let cut = cut_hole(&mut mesh, &hole, &host(6.0)).unwrap();
        assert_eq!(cut.removed_elements, 4);
        assert_eq!(cut.boundary_nodes, 10);
        assert_eq!(cut.untangle_sweeps, 0);
        assert_eq!(mesh.num_elements(), 32);
        assert_laid_on(&mesh, &hole);
    }

    #[test]
    fn test_small_hole_widens_cut() {
        // six corners but the centroid test removes a single element
        let corners: Vec<Point2<f64>> = (0..6)
            .map(|i| {
                let a = i as f64 * std::f64::consts::PI / 3.0 + 0.2;
                Point2::new(2.5 + 0.45 * a.cos(), 2.5 + 0.45 * a.sin())
            })
            .collect();
        let mut mesh = create_grid_mesh(6);
        let hole = polygon_hole(&corners);
        let cut = cut_hole(&mut mesh, &hole, &host(6.0)).unwrap();
        assert_eq!(cut.removed_elements, 9);
        assert_eq!(cut.boundary_nodes, 12);
        assert_laid_on(&mesh, &hole);
    }

    #[test]
    fn test_hole_corner_count() {
        let hole = polygon_hole(&[Point2::new(1.0, 1.0), Point2::new(2.0, 1.0), Point2::new(1.5, 2.0)]);
        assert_eq!(hole_corners(&hole.perimeter).len(), 3);
        let square = square_hole(1.2, 2.8);
        assert_eq!(hole_corners(&square.perimeter), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_assign_corners_keeps_ring_order() {
        let ring: Vec<Point2<f64>> = [(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (2.0, 1.0), (1.0, 1.0), (0.0, 1.0)]
            .iter()
            .map(|&(x, y)| Point2::new(x, y))
            .collect();
        let corners = [Point2::new(2.1, -0.1), Point2::new(0.1, 1.1)];
        let (start, picks) = assign_corners(&ring, &corners);
        assert_eq!(start, 2);
        assert_eq!(picks, vec![0, 3]);
    }

    #[test]
    fn test_untangle_relaxes_interior_node() {
        let mut mesh = create_grid_mesh(2);
        let centre = NodeId::new(4);
        mesh.set_position(centre, Point2::new(2.6, 2.6));
        assert!(mesh.element_ids().any(|k| mesh.element_area(k) <= 0.0));
        let sweeps = untangle(&mut mesh, &[NodeId::new(5)], 1).unwrap();
        assert_eq!(sweeps, 1);
        assert_eq!(mesh.position(centre), Point2::new(1.0, 1.0));
        for k in mesh.element_ids() {
            assert!(mesh.element_area(k) > 0.0);
        }
    }

    #[test]
    fn test_untangle_reports_stuck_inversion() {
        // a bow tie has no free corner to move
        let nodes: Vec<_> = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]
            .iter()
            .map(|&(x, y)| (Point2::new(x, y), NodeOrigin::Interior))
            .collect();
        let mut mesh: QuadMesh = build_from_quads(&nodes, &[[0, 1, 2, 3]], |_, _| None, Capacity::estimate(4)).unwrap();
        let err = untangle(&mut mesh, &[NodeId::new(0)], 1).unwrap_err();
        assert!(matches!(err, MeshError::Topology(_)));
    }

    #[test]
    fn test_hole_dimension_not_implemented() {
        let mut mesh = create_grid_mesh(4);
        let mut hole = square_hole(1.2, 2.8);
        hole.dimension = 2;
        let err = cut_hole(&mut mesh, &hole, &host(4.0)).unwrap_err();
        assert!(matches!(err, MeshError::NotImplemented(_)));
        assert_eq!(mesh.num_elements(), 16);
    }

    #[test]
    fn test_hole_reaching_boundary() {
        let mut mesh = create_grid_mesh(4);
        let err = cut_hole(&mut mesh, &square_hole(0.2, 1.8), &host(4.0)).unwrap_err();
        assert!(matches!(err, MeshError::Topology(_)));
        assert_eq!(mesh.num_elements(), 16);
    }

    #[test]
    fn test_remove_element_frees_orphans() {
        let mut mesh = create_grid_mesh(1);
        remove_element(&mut mesh, ElementId::new(0)).unwrap();
        assert_eq!(mesh.num_elements(), 0);
        assert_eq!(mesh.num_lines(), 0);
        assert_eq!(mesh.num_nodes(), 0);
    }
}
