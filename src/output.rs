//! Output topology.
//!
//! [`MeshOutput`] is the writer-facing form of one meshed region: compact
//! 1-based node numbering, element connectivity padded with zeros, and the
//! boundary flags in discovery order. [`MergedMesh`] stitches the outputs of
//! several regions into one mesh, sharing the nodes that sit on common
//! geometric points and lines.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::algo::boundary::BoundaryFlags;
use crate::mesh::{MeshIndex, NodeOrigin, QuadMesh};

/// A flag on a node, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeFlagEntry {
    /// Flag id.
    pub flag: u32,
    /// Node number.
    pub node: usize,
    /// Arc-length weight, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// A flag on an element side, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SideFlagEntry {
    /// Flag id.
    pub flag: u32,
    /// Element number.
    pub element: usize,
    /// Side number, 1 to 4; side `i` runs from corner `i` to corner `i + 1`.
    pub side: usize,
    /// End positions along the flagged line and side length, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<[f64; 3]>,
}

/// One meshed region in writer form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshOutput {
    /// Region id.
    pub region: u32,
    /// Scheme to store against the region.
    pub scheme: String,
    /// Node coordinates; node `i + 1` is entry `i`.
    pub nodes: Vec<[f64; 2]>,
    /// Node provenance, parallel to `nodes`.
    pub origins: Vec<NodeOrigin>,
    /// Element corners as 1-based node numbers, 0 for an absent corner.
    pub elements: Vec<[usize; 4]>,
    /// Node flags in discovery order.
    #[serde(default)]
    pub node_flags: Vec<NodeFlagEntry>,
    /// Side flags in discovery order.
    #[serde(default)]
    pub side_flags: Vec<SideFlagEntry>,
}

impl MeshOutput {
    /// Number a meshed region for output.
    pub fn from_mesh<I: MeshIndex>(region: u32, scheme: &str, mesh: &QuadMesh<I>, flags: &BoundaryFlags<I>) -> Self {
        let mut node_no = vec![0usize; mesh.node_slots()];
        let mut nodes = Vec::with_capacity(mesh.num_nodes());
        let mut origins = Vec::with_capacity(mesh.num_nodes());
        for n in mesh.node_ids() {
            let p = mesh.position(n);
            nodes.push([p.x, p.y]);
            origins.push(mesh.node(n).origin);
            node_no[n.index()] = nodes.len();
        }
        let mut element_no = vec![0usize; mesh.element_slots()];
        let mut elements = Vec::with_capacity(mesh.num_elements());
        for k in mesh.element_ids() {
            let corners = mesh
                .element_nodes(k)
                .map(|n| if n.is_valid() { node_no[n.index()] } else { 0 });
            elements.push(corners);
            element_no[k.index()] = elements.len();
        }
        let node_flags = flags
            .nodes
            .iter()
            .map(|f| NodeFlagEntry {
                flag: f.flag,
                node: node_no[f.node.index()],
                weight: f.weight,
            })
            .collect();
        let side_flags = flags
            .sides
            .iter()
            .map(|f| SideFlagEntry {
                flag: f.flag,
                element: element_no[f.element.index()],
                side: f.side + 1,
                weights: f.weights,
            })
            .collect();
        Self {
            region,
            scheme: scheme.to_string(),
            nodes,
            origins,
            elements,
            node_flags,
            side_flags,
        }
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of elements.
    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }
}

/// Several regions stitched into one mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedMesh {
    /// Node coordinates, 1-based by position.
    pub nodes: Vec<[f64; 2]>,
    /// Element corners, 1-based.
    pub elements: Vec<[usize; 4]>,
    /// Region of each element.
    pub element_regions: Vec<u32>,
    /// Node flags, renumbered.
    pub node_flags: Vec<NodeFlagEntry>,
    /// Side flags, renumbered.
    pub side_flags: Vec<SideFlagEntry>,
    /// Geometric points consumed by the merged regions.
    pub used_points: BTreeSet<u32>,
    /// Geometric lines consumed by the merged regions.
    pub used_lines: BTreeSet<u32>,
}

impl MergedMesh {
    /// Merge region outputs in order.
    ///
    /// Nodes generated on the same geometric point, or on the same geometric
    /// line at the same position, become one node. Interior nodes are never
    /// shared.
    pub fn merge<'a>(outputs: impl IntoIterator<Item = &'a MeshOutput>) -> Self {
        let mut merged = MergedMesh::default();
        let mut shared: HashMap<NodeOrigin, Vec<usize>> = HashMap::new();
        for out in outputs {
            let scale = out
                .nodes
                .iter()
                .fold(0.0f64, |m, p| m.max(p[0].abs()).max(p[1].abs()))
                .max(1.0);
            let tolerance = 1e-9 * scale;
            let mut renumber = Vec::with_capacity(out.nodes.len());
            for (p, origin) in out.nodes.iter().zip(&out.origins) {
                let existing = match origin {
                    NodeOrigin::Interior => None,
                    _ => shared.get(origin).and_then(|candidates| {
                        candidates.iter().copied().find(|&g| {
                            let q = merged.nodes[g - 1];
                            (q[0] - p[0]).abs() <= tolerance && (q[1] - p[1]).abs() <= tolerance
                        })
                    }),
                };
                let global = existing.unwrap_or_else(|| {
                    merged.nodes.push(*p);
                    let g = merged.nodes.len();
                    if *origin != NodeOrigin::Interior {
                        shared.entry(*origin).or_default().push(g);
                    }
                    g
                });
                match origin {
                    NodeOrigin::Point(id) => {
                        merged.used_points.insert(*id);
                    }
                    NodeOrigin::Line(id) => {
                        merged.used_lines.insert(*id);
                    }
                    NodeOrigin::Interior => {}
                }
                renumber.push(global);
            }
            let node = |n: usize| if n == 0 { 0 } else { renumber[n - 1] };
            let first_element = merged.elements.len();
            for e in &out.elements {
                merged.elements.push(e.map(node));
                merged.element_regions.push(out.region);
            }
            merged.node_flags.extend(out.node_flags.iter().map(|f| NodeFlagEntry {
                node: node(f.node),
                ..*f
            }));
            merged.side_flags.extend(out.side_flags.iter().map(|f| SideFlagEntry {
                element: f.element + first_element,
                ..*f
            }));
        }
        merged
    }
}
