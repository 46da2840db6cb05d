//! Row insertion: necklaces and tucks.
//!
//! A necklace adds one closed ring of quads just inside the outer boundary
//! loop. Every boundary node gets an inner twin, every interior line of the
//! boundary node moves to the twin, and each boundary line gains a new quad
//! between itself and the twin line. The new row is then placed by
//! [`row_smooth`](super::smooth::row_smooth).
//!
//! A tuck splits an element at a wide boundary corner along the corner
//! bisector, so that the corner is shared by one more element.

use std::collections::HashMap;

use nalgebra::{Point2, Rotation2, Vector2};
use tracing::debug;

use super::smooth::{boundary_corner, row_smooth, SmoothOptions};
use crate::error::{MeshError, Result};
use crate::geom::quality::quad_angles;
use crate::mesh::{ElementId, LineId, MeshIndex, NodeId, NodeOrigin, NodeStatus, QuadMesh};

/// Insert a ring of elements inside the outer boundary loop.
///
/// Returns the new row nodes in loop order.
pub fn add_necklace<I: MeshIndex>(mesh: &mut QuadMesh<I>, options: &SmoothOptions) -> Result<Vec<NodeId<I>>> {
    let outer = mesh
        .boundary_loops()?
        .into_iter()
        .filter(|l| l.signed_area > 0.0)
        .max_by(|a, b| a.signed_area.total_cmp(&b.signed_area))
        .ok_or_else(|| MeshError::topology("mesh has no outer boundary loop"))?;
    let ring = outer.nodes.len();
    mesh.ensure_room(ring, 2 * ring, ring)?;

    // boundary line i runs from ring node i to ring node i + 1 with element k_i on its left
    let owners: Vec<ElementId<I>> = outer
        .lines
        .iter()
        .map(|&l| {
            mesh.line_elements(l)
                .next()
                .ok_or_else(|| MeshError::topology(format!("{:?} has no element", l)))
        })
        .collect::<Result<_>>()?;

    let mut twins: HashMap<NodeId<I>, NodeId<I>> = HashMap::with_capacity(ring);
    let mut row = Vec::with_capacity(ring);
    for &n in &outer.nodes {
        let x = mesh.position(n);
        let elements = mesh.node_elements(n);
        let avg = elements
            .iter()
            .fold(Vector2::zeros(), |acc, &k| acc + mesh.element_centroid(k).coords)
            / elements.len().max(1) as f64;
        let m = mesh.add_node(x + (Point2::from(avg) - x) * 0.5, NodeOrigin::Interior)?;
        twins.insert(n, m);
        row.push(m);
    }

    let mut moved: Vec<LineId<I>> = outer
        .nodes
        .iter()
        .flat_map(|&n| mesh.node_lines(n).to_vec())
        .filter(|&l| !mesh.is_boundary_line(l))
        .collect();
    moved.sort_unstable();
    moved.dedup();
    for l in moved {
        let [a, b] = mesh.line(l).nodes;
        let a2 = twins.get(&a).copied().unwrap_or(a);
        let b2 = twins.get(&b).copied().unwrap_or(b);
        mesh.retarget_line(l, a2, b2)?;
    }

    let mut inner = Vec::with_capacity(ring);
    for i in 0..ring {
        let f = mesh.add_line(row[i], row[(i + 1) % ring], None)?;
        mesh.replace_element_line(owners[i], outer.lines[i], f)?;
        inner.push(f);
    }
    let spokes = outer
        .nodes
        .iter()
        .zip(&row)
        .map(|(&n, &m)| mesh.add_line(n, m, None))
        .collect::<Result<Vec<_>>>()?;
    for i in 0..ring {
        let j = (i + 1) % ring;
        mesh.add_element([outer.lines[i], spokes[j], inner[i], spokes[i]])?;
    }
    debug_assert!(mesh.validate().is_ok(), "{:?}", mesh.validate());

    row_smooth(mesh, &row, options);
    debug!("necklace added {} elements", ring);
    Ok(row)
}

/// Element count wanted at a boundary corner with the given interior angle.
pub fn desired_elements(angle: f64) -> usize {
    let deg = angle.to_degrees();
    if deg < 135.0 {
        1
    } else if deg < 225.0 {
        2
    } else if deg < 315.0 {
        3
    } else {
        4
    }
}

/// Add elements at a boundary node until its corner angle is shared by the
/// desired number of elements.
///
/// Each tuck splits the widest incident element along its corner bisector,
/// provided that corner is at least twice `small_angle` (radians). A request
/// that cannot be met is downgraded, not reported. Returns the number of
/// elements added.
pub fn add_tucks<I: MeshIndex>(mesh: &mut QuadMesh<I>, node: NodeId<I>, small_angle: f64) -> Result<usize> {
    if mesh.node(node).status != NodeStatus::Boundary {
        return Err(MeshError::topology(format!("{:?} is not a boundary node", node)));
    }
    let Some((_, turned)) = boundary_corner(mesh, node) else {
        return Ok(0);
    };
    let want = desired_elements(turned);
    let have = mesh.node_elements(node).len();
    let mut added = 0;
    for _ in have..want {
        let widest = mesh
            .node_elements(node)
            .into_iter()
            .filter_map(|k| {
                let s = mesh.corner_slot(k, node)?;
                Some((k, quad_angles(&mesh.element_positions(k)).angles[s]))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some((k, angle)) = widest else {
            break;
        };
        if angle < 2.0 * small_angle {
            debug!(
                "tuck at {:?} downgraded: corner {:.1} deg below {:.1}",
                node,
                angle.to_degrees(),
                2.0 * small_angle.to_degrees()
            );
            break;
        }
        split_corner(mesh, k, node, angle)?;
        added += 1;
    }
    Ok(added)
}

/// Split element `k` along the bisector of its corner at `n`.
fn split_corner<I: MeshIndex>(mesh: &mut QuadMesh<I>, k: ElementId<I>, n: NodeId<I>, angle: f64) -> Result<()> {
    mesh.ensure_room(1, 2, 1)?;
    let corners = mesh.element_nodes(k);
    let lines = mesh.element(k).lines();
    let s = mesh
        .corner_slot(k, n)
        .ok_or_else(|| MeshError::topology(format!("{:?} not a corner of {:?}", n, k)))?;
    let a = corners[(s + 1) % 4];
    let c = corners[(s + 2) % 4];
    let line_cb = lines[(s + 2) % 4];
    let line_bn = lines[(s + 3) % 4];

    let p = mesh.position(n);
    let dir = (mesh.position(a) - p)
        .try_normalize(f64::MIN_POSITIVE)
        .ok_or_else(|| MeshError::topology(format!("{:?} has a collapsed side", k)))?;
    let bisector = Rotation2::new(0.5 * angle) * dir;
    let reach = 0.5 * (mesh.position(c) - p).norm();
    let x = mesh.add_node(p + bisector * reach, NodeOrigin::Interior)?;

    let nx = mesh.add_line(n, x, None)?;
    let xc = mesh.add_line(x, c, None)?;
    mesh.replace_element_line(k, line_cb, xc)?;
    mesh.replace_element_line(k, line_bn, nx)?;
    mesh.add_element([nx, xc, line_cb, line_bn])?;
    debug_assert!(mesh.validate().is_ok(), "{:?}", mesh.validate());
    Ok(())
}

/// Boundary node with the largest corner angle per incident element.
pub fn tuck_candidate<I: MeshIndex>(mesh: &QuadMesh<I>) -> Option<NodeId<I>> {
    mesh.node_ids()
        .filter(|&n| mesh.node(n).status == NodeStatus::Boundary)
        .filter_map(|n| {
            let (_, angle) = boundary_corner(mesh, n)?;
            let count = mesh.node_elements(n).len().max(1);
            Some((n, angle / count as f64))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(n, _)| n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{build_from_quads, Capacity};
    use std::f64::consts::PI;

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
        build_from_quads(&nodes, &faces, |_, _| Some(1), Capacity::estimate(8 * n + 8)).unwrap()
    }

    #[test]
    fn test_necklace_adds_ring() {
        let mut mesh = create_grid_mesh(2);
        let before = mesh.num_elements();
        let row = add_necklace(&mut mesh, &SmoothOptions::default()).unwrap();
        assert_eq!(row.len(), 8);
        assert_eq!(mesh.num_elements(), before + 8);
        assert!(mesh.is_valid());
        for k in mesh.element_ids() {
            assert!(mesh.element_area(k) > 0.0);
        }
        // the boundary loop is unchanged
        let loops = mesh.boundary_loops().unwrap();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].nodes.len(), 8);
        for n in loops[0].nodes.iter() {
            assert_eq!(mesh.node_lines(*n).len(), 3);
        }
        for &m in &row {
            assert_eq!(mesh.node(m).status, NodeStatus::Interior);
        }
    }

    #[test]
    fn test_necklace_no_room() {
        let mut mesh: QuadMesh = {
            let g = create_grid_mesh(1);
            let (nodes, faces) = crate::mesh::to_node_element(&g);
            let nodes: Vec<_> = nodes.into_iter().map(|p| (p, NodeOrigin::Interior)).collect();
            build_from_quads(&nodes, &faces, |_, _| None, Capacity::new(6, 8, 4)).unwrap()
        };
        let err = add_necklace(&mut mesh, &SmoothOptions::default()).unwrap_err();
        assert!(err.is_no_room());
        // nothing was touched
        assert_eq!(mesh.num_elements(), 1);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_desired_elements() {
        assert_eq!(desired_elements(PI / 2.0), 1);
        assert_eq!(desired_elements(PI), 2);
        assert_eq!(desired_elements(1.5 * PI), 3);
        assert_eq!(desired_elements(1.9 * PI), 4);
    }

    /// L-shaped mesh of three unit quads; node (1,1) is a reflex corner.
    fn l_shape() -> (QuadMesh, NodeId) {
        let pts = [
            (0.0, 0.0),
            (1.0, 0.0),
            (2.0, 0.0),
            (0.0, 1.0),
            (1.0, 1.0),
            (2.0, 1.0),
            (0.0, 2.0),
            (1.0, 2.0),
        ];
        let nodes: Vec<_> = pts
            .iter()
            .map(|&(x, y)| (Point2::new(x, y), NodeOrigin::Interior))
            .collect();
        let faces = vec![[0, 1, 4, 3], [1, 2, 5, 4], [3, 4, 7, 6]];
        let mesh = build_from_quads(&nodes, &faces, |_, _| None, Capacity::new(16, 32, 8)).unwrap();
        (mesh, NodeId::new(4))
    }

    #[test]
    fn test_tuck_at_reflex_corner() {
        let (mut mesh, corner) = l_shape();
        // 270 degrees wants three elements, it already has three
        assert_eq!(add_tucks(&mut mesh, corner, 45f64.to_radians()).unwrap(), 0);

        let (mut mesh, _) = l_shape();
        let straight = NodeId::new(1);
        // 180 degrees over two elements: satisfied
        assert_eq!(add_tucks(&mut mesh, straight, 45f64.to_radians()).unwrap(), 0);
    }

    #[test]
    fn test_tuck_splits_wide_corner() {
        // one wide element at a straight boundary node
        let nodes = vec![
            (Point2::new(0.0, 0.0), NodeOrigin::Interior),
            (Point2::new(2.0, 0.0), NodeOrigin::Interior),
            (Point2::new(4.0, 0.0), NodeOrigin::Interior),
            (Point2::new(2.0, 2.0), NodeOrigin::Interior),
        ];
        // node 1 is a 180 degree corner of a single element
        let mut mesh: QuadMesh =
            build_from_quads(&nodes, &[[0, 1, 2, 3]], |_, _| None, Capacity::new(8, 8, 4)).unwrap();
        let n = NodeId::new(1);
        assert_eq!(tuck_candidate(&mesh), Some(n));
        let added = add_tucks(&mut mesh, n, 45f64.to_radians()).unwrap();
        assert_eq!(added, 1);
        assert_eq!(mesh.num_elements(), 2);
        assert_eq!(mesh.node_elements(n).len(), 2);
        assert!(mesh.is_valid());

        // a small-angle limit above half the corner blocks the split
        let mut mesh: QuadMesh =
            build_from_quads(&nodes, &[[0, 1, 2, 3]], |_, _| None, Capacity::new(8, 8, 4)).unwrap();
        assert_eq!(add_tucks(&mut mesh, n, 100f64.to_radians()).unwrap(), 0);
    }
}
