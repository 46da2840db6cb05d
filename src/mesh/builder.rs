//! Mesh construction utilities.
//!
//! This module builds a [`QuadMesh`] from a node list and quad faces, the
//! form produced by primitive (mapped) meshing, and converts a mesh back to
//! a compact node/element listing.

use std::collections::HashMap;

use nalgebra::Point2;

use super::index::{LineId, MeshIndex, NodeId};
use super::topology::{Capacity, NodeOrigin, QuadMesh};
use crate::error::{MeshError, Result};

/// Build a quad mesh from nodes and counter-clockwise quad faces.
///
/// # Arguments
/// * `nodes` - Node positions with their provenance; node `i` gets id `i`
/// * `faces` - Quad faces, each as `[n0, n1, n2, n3]` indices (counter-clockwise)
/// * `line_origin` - Geometric line id for the edge between two node indices,
///   consulted once per distinct edge
/// * `capacity` - Storage limits for the new mesh
///
/// # Returns
/// A quad mesh, or [`MeshError::NoRoom`] if `capacity` is too small, or a
/// topology error if the faces are inconsistent.
///
/// # Example
/// ```
/// use quadpave::mesh::{build_from_quads, Capacity, NodeOrigin, QuadMesh};
/// use nalgebra::Point2;
///
/// let nodes = vec![
///     (Point2::new(0.0, 0.0), NodeOrigin::Point(1)),
///     (Point2::new(1.0, 0.0), NodeOrigin::Point(2)),
///     (Point2::new(1.0, 1.0), NodeOrigin::Point(3)),
///     (Point2::new(0.0, 1.0), NodeOrigin::Point(4)),
/// ];
/// let faces = vec![[0, 1, 2, 3]];
///
/// let mesh: QuadMesh = build_from_quads(&nodes, &faces, |_, _| None, Capacity::default()).unwrap();
/// assert_eq!(mesh.num_nodes(), 4);
/// assert_eq!(mesh.num_elements(), 1);
/// ```
pub fn build_from_quads<I, F>(
    nodes: &[(Point2<f64>, NodeOrigin)],
    faces: &[[usize; 4]],
    mut line_origin: F,
    capacity: Capacity,
) -> Result<QuadMesh<I>>
where
    I: MeshIndex,
    F: FnMut(usize, usize) -> Option<u32>,
{
    if faces.is_empty() {
        return Err(MeshError::topology("no faces to build"));
    }

    for (fi, face) in faces.iter().enumerate() {
        for &ni in face {
            if ni >= nodes.len() {
                return Err(MeshError::topology(format!(
                    "face {} refers to missing node {}",
                    fi, ni
                )));
            }
        }
        for i in 0..4 {
            if face[..i].contains(&face[i]) {
                return Err(MeshError::topology(format!("face {} is degenerate", fi)));
            }
        }
    }

    let mut mesh = QuadMesh::new(capacity);
    let ids = nodes
        .iter()
        .map(|&(p, origin)| mesh.add_node(p, origin))
        .collect::<Result<Vec<NodeId<I>>>>()?;

    // Undirected edge (min, max) to line id
    let mut edge_map: HashMap<(usize, usize), LineId<I>> = HashMap::new();

    for face in faces {
        let mut lines = [LineId::invalid(); 4];
        for i in 0..4 {
            let (a, b) = (face[i], face[(i + 1) % 4]);
            let key = (a.min(b), a.max(b));
            lines[i] = match edge_map.get(&key) {
                Some(&l) => l,
                None => {
                    let l = mesh.add_line(ids[a], ids[b], line_origin(a, b))?;
                    edge_map.insert(key, l);
                    l
                }
            };
        }
        mesh.add_element(lines)?;
    }

    // Lines that ended up interior carry no geometric origin.
    let interior: Vec<LineId<I>> = mesh
        .line_ids()
        .filter(|&l| !mesh.is_boundary_line(l))
        .collect();
    for l in interior {
        mesh.set_line_origin(l, None);
    }

    Ok(mesh)
}

/// Compact listing of a quad mesh: live node positions and element corner
/// indices into that list.
pub fn to_node_element<I: MeshIndex>(mesh: &QuadMesh<I>) -> (Vec<Point2<f64>>, Vec<[usize; 4]>) {
    let mut remap = vec![usize::MAX; mesh.node_slots()];
    let mut positions = Vec::with_capacity(mesh.num_nodes());
    for n in mesh.node_ids() {
        remap[n.index()] = positions.len();
        positions.push(mesh.position(n));
    }

    let elements = mesh
        .element_ids()
        .map(|k| mesh.element_nodes(k).map(|n| remap[n.index()]))
        .collect();

    (positions, elements)
}
