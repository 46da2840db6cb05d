//! Boundary flag extraction.
//!
//! After meshing, every boundary line of the mesh is matched to the
//! geometric line it came from, and the user's flag definitions are resolved
//! onto mesh nodes and element sides. Flags are reported in discovery order:
//! boundary loops are walked outer loop first, and each node or side lists
//! its flags in definition order, so several flags on one entity stay
//! stacked in a stable order.

use std::collections::HashMap;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MeshError, Result};
use crate::geom::polygon::closest_point_on_polyline;
use crate::mesh::{ElementId, LineId, MeshIndex, NodeId, NodeOrigin, QuadMesh};
use crate::region::Perimeter;

/// What a flag is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagKind {
    /// Boundary nodes.
    #[default]
    Node,
    /// Boundary element sides.
    Side,
}

/// A user boundary flag and the geometry it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDef {
    /// Flag id reported in the output.
    pub flag: u32,
    /// Whether the flag lands on nodes or sides.
    #[serde(default)]
    pub kind: FlagKind,
    /// Geometric lines carrying the flag.
    #[serde(default)]
    pub lines: Vec<u32>,
    /// Geometric points carrying the flag (node flags only).
    #[serde(default)]
    pub points: Vec<u32>,
    /// Report arc-length weights along the flagged line.
    #[serde(default)]
    pub weighted: bool,
}

impl FlagDef {
    /// A node flag on the given lines.
    pub fn nodes(flag: u32, lines: impl Into<Vec<u32>>) -> Self {
        Self {
            flag,
            kind: FlagKind::Node,
            lines: lines.into(),
            points: Vec::new(),
            weighted: false,
        }
    }

    /// A side flag on the given lines.
    pub fn sides(flag: u32, lines: impl Into<Vec<u32>>) -> Self {
        Self {
            kind: FlagKind::Side,
            ..Self::nodes(flag, lines)
        }
    }

    /// Also flag nodes generated at these geometric points.
    pub fn with_points(mut self, points: impl Into<Vec<u32>>) -> Self {
        self.points = points.into();
        self
    }

    /// Report weights.
    pub fn weighted(mut self) -> Self {
        self.weighted = true;
        self
    }
}

/// A flag on one boundary node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeFlag<I: MeshIndex = u32> {
    /// The flag id.
    pub flag: u32,
    /// The node.
    pub node: NodeId<I>,
    /// Normalised arc-length position along the flagged line.
    pub weight: Option<f64>,
}

/// A flag on one boundary element side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SideFlag<I: MeshIndex = u32> {
    /// The flag id.
    pub flag: u32,
    /// The element owning the side.
    pub element: ElementId<I>,
    /// Side index; side `i` runs from corner `i` to corner `i + 1`.
    pub side: usize,
    /// Positions of the side's two ends along the flagged line, and the
    /// side length.
    pub weights: Option<[f64; 3]>,
}

/// All flags of one meshed region, in discovery order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryFlags<I: MeshIndex = u32> {
    /// Node flags.
    pub nodes: Vec<NodeFlag<I>>,
    /// Side flags.
    pub sides: Vec<SideFlag<I>>,
}

impl<I: MeshIndex> Default for BoundaryFlags<I> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            sides: Vec::new(),
        }
    }
}

/// Normalised arc-length position of `p` along an open polyline.
fn arc_position(poly: &[Point2<f64>], p: &Point2<f64>) -> f64 {
    let Some(proj) = closest_point_on_polyline(poly, false, p) else {
        return 0.0;
    };
    let lengths: Vec<f64> = poly.windows(2).map(|w| (w[1] - w[0]).norm()).collect();
    let total: f64 = lengths.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let before: f64 = lengths[..proj.segment].iter().sum();
    let along = lengths.get(proj.segment).map_or(0.0, |l| l * proj.t);
    ((before + along) / total).clamp(0.0, 1.0)
}

/// Resolve flag definitions onto the boundary of a meshed region.
///
/// `perimeter` is the region perimeter the mesh was built from, with any
/// processed holes bridged in. Every boundary line must carry a geometric
/// line id and both its ends must lie on that line's polyline; anything else
/// is a topology error.
pub fn boundary_flags<I: MeshIndex>(
    mesh: &QuadMesh<I>,
    perimeter: &Perimeter,
    defs: &[FlagDef],
) -> Result<BoundaryFlags<I>> {
    let polylines = perimeter.line_polylines();
    let tolerance = 1e-6 * perimeter.mean_segment_length().max(f64::MIN_POSITIVE);

    let mut loops = mesh.boundary_loops()?;
    loops.sort_by(|a, b| b.signed_area.total_cmp(&a.signed_area));

    let mut line_of: HashMap<LineId<I>, u32> = HashMap::new();
    for l in loops.iter().flat_map(|lp| lp.lines.iter().copied()) {
        let id = mesh
            .line(l)
            .origin
            .ok_or_else(|| MeshError::topology(format!("boundary {:?} has no geometric line", l)))?;
        let poly = polylines
            .get(&id)
            .ok_or_else(|| MeshError::topology(format!("boundary {:?} names unknown line {}", l, id)))?;
        for n in mesh.line(l).nodes {
            let off = closest_point_on_polyline(poly, false, &mesh.position(n)).map_or(f64::MAX, |p| p.distance);
            if off > tolerance {
                return Err(MeshError::topology(format!(
                    "boundary {:?} leaves line {} by {:.3e}",
                    l, id, off
                )));
            }
        }
        line_of.insert(l, id);
    }

    let mut out = BoundaryFlags::default();
    for lp in &loops {
        let count = lp.nodes.len();
        for i in 0..count {
            let n = lp.nodes[i];
            // the two boundary lines meeting at n
            let adjacent = [line_of[&lp.lines[(i + count - 1) % count]], line_of[&lp.lines[i]]];
            for def in defs.iter().filter(|d| d.kind == FlagKind::Node) {
                let on_line = adjacent.iter().find(|id| def.lines.contains(id));
                let at_point = matches!(mesh.node(n).origin, NodeOrigin::Point(p) if def.points.contains(&p));
                if on_line.is_none() && !at_point {
                    continue;
                }
                let weight = match on_line {
                    Some(id) if def.weighted => Some(arc_position(&polylines[id], &mesh.position(n))),
                    _ => None,
                };
                out.nodes.push(NodeFlag {
                    flag: def.flag,
                    node: n,
                    weight,
                });
            }
        }
        for &l in &lp.lines {
            let id = line_of[&l];
            for def in defs.iter().filter(|d| d.kind == FlagKind::Side && d.lines.contains(&id)) {
                let Some(k) = mesh.line_elements(l).next() else {
                    continue;
                };
                let side = mesh
                    .line_slot(k, l)
                    .ok_or_else(|| MeshError::topology(format!("{:?} not in {:?}", l, k)))?;
                let weights = def.weighted.then(|| {
                    let poly = &polylines[&id];
                    let corners = mesh.element_nodes(k);
                    let a = mesh.position(corners[side]);
                    let b = mesh.position(corners[(side + 1) % 4]);
                    [arc_position(poly, &a), arc_position(poly, &b), (b - a).norm()]
                });
                out.sides.push(SideFlag {
                    flag: def.flag,
                    element: k,
                    side,
                    weights,
                });
            }
        }
    }
    debug!(
        "{} node flags, {} side flags on {} boundary loops",
        out.nodes.len(),
        out.sides.len(),
        loops.len()
    );
    Ok(out)
}
