//! Local restructuring: diagonal swaps and element collapse.
//!
//! Two quads sharing a line form a hexagon, which can be split into two
//! quads along any of its three long diagonals. [`restry`] scores the
//! current split against the two alternatives and applies a strictly better
//! one in place: the shared line is retargeted, the two element slots are
//! reused and no node or line id changes.
//!
//! [`squash`] removes the element with the worst angle tilt by collapsing
//! one of its diagonals.

use std::f64::consts::PI;

use nalgebra::Point2;
use tracing::{debug, trace};

use crate::error::{MeshError, Result};
use crate::geom::quality::{angle_tilt, condition_number, quad_angles};
use crate::mesh::{ElementId, LineId, MeshIndex, NodeId, QuadMesh};

/// A second interior line within this fraction of the longest is also a
/// swap candidate.
pub const EDGE_SLACK: f64 = 0.85;

/// Scale applied to the current worst angle ratio when judging a swap.
pub const QRAT_SCALE: f64 = 0.95;

/// Slack added to the scaled angle ratio.
pub const QRAT_SLACK: f64 = 0.05;

/// Largest corner angle a swap may create.
pub const PITOL: f64 = PI * 1.0833333;

/// Sweeps [`resta`] makes before giving up on reaching a fixed point.
const MAX_SWEEPS: usize = 64;

/// Scores of one way of splitting a hexagon into two quads.
#[derive(Debug, Clone, Copy)]
struct Split {
    max_ratio: f64,
    avg_ratio: f64,
    area_ratio: f64,
    condition: f64,
    max_angle: f64,
}

impl Split {
    fn of(quads: [[Point2<f64>; 4]; 2]) -> Option<Split> {
        let qa = quads.map(|q| quad_angles(&q));
        if qa.iter().any(|q| q.area <= 0.0) {
            return None;
        }
        let cond = quads.map(|q| condition_number(&q).condition);
        let big = qa[0].area.max(qa[1].area);
        let small = qa[0].area.min(qa[1].area);
        Some(Split {
            max_ratio: qa[0].ratio.max(qa[1].ratio),
            avg_ratio: 0.5 * (qa[0].ratio + qa[1].ratio),
            area_ratio: big / small,
            condition: cond[0] + cond[1],
            max_angle: qa[0].max_angle().max(qa[1].max_angle()),
        })
    }

    fn improves_on(&self, current: &Split) -> bool {
        self.max_ratio <= QRAT_SCALE * current.max_ratio + QRAT_SLACK
            && self.max_angle <= PITOL
            && self.avg_ratio <= current.avg_ratio
            && self.area_ratio * self.avg_ratio < current.area_ratio * current.avg_ratio
    }

    fn tie_break(&self) -> f64 {
        self.area_ratio * self.condition * self.condition
    }
}

/// The hexagon around an interior line, counter-clockwise, with the
/// line running from `nodes[3]` to `nodes[0]` inside element `first`.
#[derive(Debug, Clone, Copy)]
struct Hexagon<I: MeshIndex> {
    first: ElementId<I>,
    second: ElementId<I>,
    shared: LineId<I>,
    nodes: [NodeId<I>; 6],
    sides: [LineId<I>; 6],
}

impl<I: MeshIndex> Hexagon<I> {
    fn around(mesh: &QuadMesh<I>, k: ElementId<I>, l: LineId<I>) -> Option<Self> {
        let k2 = mesh.other_element(l, k)?;
        let s = mesh.line_slot(k, l)?;
        let s2 = mesh.line_slot(k2, l)?;
        let c = mesh.element_nodes(k);
        let c2 = mesh.element_nodes(k2);
        let lk = mesh.element(k).lines();
        let lk2 = mesh.element(k2).lines();
        // k runs a -> b along l, k2 runs b -> a
        let nodes = [
            c[(s + 1) % 4],
            c[(s + 2) % 4],
            c[(s + 3) % 4],
            c[s],
            c2[(s2 + 2) % 4],
            c2[(s2 + 3) % 4],
        ];
        let sides = [
            lk[(s + 1) % 4],
            lk[(s + 2) % 4],
            lk[(s + 3) % 4],
            lk2[(s2 + 1) % 4],
            lk2[(s2 + 2) % 4],
            lk2[(s2 + 3) % 4],
        ];
        for i in 0..6 {
            if nodes[i + 1..].contains(&nodes[i]) {
                return None;
            }
        }
        Some(Self {
            first: k,
            second: k2,
            shared: l,
            nodes,
            sides,
        })
    }

    /// Quads of the split along the diagonal from node `i` to node `i + 3`.
    fn quads(&self, mesh: &QuadMesh<I>, i: usize) -> [[Point2<f64>; 4]; 2] {
        let p = |j: usize| mesh.position(self.nodes[(i + j) % 6]);
        [[p(0), p(1), p(2), p(3)], [p(3), p(4), p(5), p(0)]]
    }

    fn apply(&self, mesh: &mut QuadMesh<I>, i: usize) -> Result<()> {
        let side = |j: usize| self.sides[(i + j) % 6];
        let a = self.nodes[i % 6];
        let b = self.nodes[(i + 3) % 6];
        mesh.delete_element(self.first)?;
        mesh.delete_element(self.second)?;
        mesh.retarget_line(self.shared, a, b)?;
        // free slots are reused last-in first-out, so the ids come back
        let k2 = mesh.add_element([side(3), side(4), side(5), self.shared])?;
        let k = mesh.add_element([side(0), side(1), side(2), self.shared])?;
        debug_assert_eq!((k, k2), (self.first, self.second));
        debug_assert!(mesh.validate().is_ok(), "{:?}", mesh.validate());
        Ok(())
    }
}

/// Interior line of `k` to try swapping.
///
/// The longest interior line wins unless a second one is within
/// [`EDGE_SLACK`] of it and has a smaller sum of adjacent corner angles.
fn swap_candidate<I: MeshIndex>(mesh: &QuadMesh<I>, k: ElementId<I>) -> Option<LineId<I>> {
    let lines = mesh.element(k).lines();
    let angles = quad_angles(&mesh.element_positions(k)).angles;
    let mut interior: Vec<(usize, f64)> = (0..4)
        .filter(|&i| mesh.line(lines[i]).element_count() == 2 && mesh.line(lines[i]).origin.is_none())
        .map(|i| (i, mesh.line_length(lines[i])))
        .collect();
    interior.sort_by(|a, b| b.1.total_cmp(&a.1));
    let (first, longest) = *interior.first()?;
    let corner_sum = |i: usize| angles[i] + angles[(i + 1) % 4];
    let pick = match interior.get(1) {
        Some(&(second, len)) if len >= EDGE_SLACK * longest && corner_sum(second) < corner_sum(first) => second,
        _ => first,
    };
    Some(lines[pick])
}

/// Try to improve element `k` by swapping one of its interior lines.
///
/// Returns whether a swap was applied.
pub fn restry<I: MeshIndex>(mesh: &mut QuadMesh<I>, k: ElementId<I>) -> Result<bool> {
    if !mesh.is_element_alive(k) {
        return Err(MeshError::topology(format!("{:?} is not alive", k)));
    }
    let Some(line) = swap_candidate(mesh, k) else {
        return Ok(false);
    };
    let Some(hex) = Hexagon::around(mesh, k, line) else {
        return Ok(false);
    };
    let Some(current) = Split::of(hex.quads(mesh, 3)) else {
        return Ok(false);
    };

    let mut best: Option<(usize, Split)> = None;
    for i in [1, 2] {
        if mesh.find_line(hex.nodes[i], hex.nodes[i + 3]).is_some() {
            continue;
        }
        let Some(split) = Split::of(hex.quads(mesh, i)) else {
            continue;
        };
        if !split.improves_on(&current) {
            continue;
        }
        if best.map_or(true, |(_, b)| split.tie_break() < b.tie_break()) {
            best = Some((i, split));
        }
    }
    let Some((i, split)) = best else {
        return Ok(false);
    };
    trace!(
        "swap {:?}: max ratio {:.3} -> {:.3}",
        line,
        current.max_ratio,
        split.max_ratio
    );
    hex.apply(mesh, i)?;
    Ok(true)
}

/// Restructure the mesh by repeated diagonal swaps.
///
/// With `limit == 1` only the element with the worst angle ratio is tried.
/// Otherwise every element is tried, sweep after sweep, until a sweep makes
/// no swap or `limit` swaps have been made. Returns the number of swaps.
pub fn resta<I: MeshIndex>(mesh: &mut QuadMesh<I>, limit: usize) -> Result<usize> {
    if limit == 0 {
        return Ok(0);
    }
    if limit == 1 {
        let worst = mesh
            .element_ids()
            .map(|k| (k, quad_angles(&mesh.element_positions(k)).ratio))
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)));
        return match worst {
            Some((k, _)) => Ok(usize::from(restry(mesh, k)?)),
            None => Ok(0),
        };
    }

    let mut count = 0;
    for sweep in 0..MAX_SWEEPS {
        let before = count;
        let ids: Vec<_> = mesh.element_ids().collect();
        for k in ids {
            if mesh.is_element_alive(k) && restry(mesh, k)? {
                count += 1;
                if count >= limit {
                    return Ok(count);
                }
            }
        }
        if count == before {
            debug!("restructure settled after {} sweeps, {} swaps", sweep + 1, count);
            return Ok(count);
        }
    }
    debug!("restructure stopped after {} sweeps, {} swaps", MAX_SWEEPS, count);
    Ok(count)
}

/// A diagonal of `k` that can be collapsed, as (survivor, removed) corner slots.
fn collapsible<I: MeshIndex>(mesh: &QuadMesh<I>, k: ElementId<I>) -> Option<(usize, usize)> {
    let c = mesh.element_nodes(k);
    let lines = mesh.element(k).lines();
    let mut options: Vec<(usize, usize, f64)> = Vec::with_capacity(4);
    for i in 0..2 {
        let j = i + 2;
        let (keep, gone) = match (mesh.is_boundary_node(c[i]), mesh.is_boundary_node(c[j])) {
            (true, true) => continue,
            (false, true) => (j, i),
            _ => (i, j),
        };
        let (p, q) = (c[keep], c[gone]);
        if mesh.find_line(p, q).is_some() {
            continue;
        }
        let mut common: Vec<NodeId<I>> = mesh
            .node_neighbors(p)
            .into_iter()
            .filter(|n| mesh.node_neighbors(q).contains(n))
            .collect();
        common.sort_unstable();
        let mut expected = vec![c[(keep + 1) % 4], c[(keep + 3) % 4]];
        expected.sort_unstable();
        if common != expected {
            continue;
        }
        // lines at the removed corner fold onto the lines at the survivor
        let fold = [
            (lines[gone], lines[(keep + 3) % 4]),
            (lines[(gone + 3) % 4], lines[keep]),
        ];
        let clash = fold.iter().any(|&(from, onto)| {
            let a = mesh.other_element(from, k);
            a.is_some() && a == mesh.other_element(onto, k)
        });
        if clash {
            continue;
        }
        options.push((keep, gone, (mesh.position(p) - mesh.position(q)).norm()));
    }
    options
        .into_iter()
        .min_by(|a, b| a.2.total_cmp(&b.2))
        .map(|(keep, gone, _)| (keep, gone))
}

/// Remove the element with the worst angle tilt if the tilt exceeds
/// `small_angle` (radians).
///
/// The element's shorter admissible diagonal is collapsed: its two lines at
/// the removed corner fold onto the survivor's lines and the removed node is
/// freed. A boundary node always survives and keeps its position; two
/// boundary nodes are never merged. Returns whether an element was removed.
pub fn squash<I: MeshIndex>(mesh: &mut QuadMesh<I>, small_angle: f64) -> Result<bool> {
    let mut ranked: Vec<(ElementId<I>, f64)> = mesh
        .element_ids()
        .map(|k| (k, angle_tilt(&mesh.element_positions(k))))
        .filter(|&(_, tilt)| tilt > small_angle)
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    let Some((k, keep, gone)) = ranked
        .iter()
        .find_map(|&(k, _)| collapsible(mesh, k).map(|(keep, gone)| (k, keep, gone)))
    else {
        return Ok(false);
    };

    let c = mesh.element_nodes(k);
    let lines = mesh.element(k).lines();
    let (p, q) = (c[keep], c[gone]);
    let folds = [
        (lines[gone], lines[(keep + 3) % 4]),
        (lines[(gone + 3) % 4], lines[keep]),
    ];
    let p_boundary = mesh.is_boundary_node(p);
    let merged = if p_boundary {
        mesh.position(p)
    } else {
        nalgebra::center(&mesh.position(p), &mesh.position(q))
    };

    mesh.delete_element(k)?;
    for (from, onto) in folds {
        let neighbour = mesh.line_elements(from).next();
        if let Some(e) = neighbour {
            mesh.replace_element_line(e, from, onto)?;
        }
        mesh.delete_line(from)?;
    }
    for l in mesh.node_lines(q).to_vec() {
        let other = mesh.other_node(l, q);
        let [a, _] = mesh.line(l).nodes;
        if a == q {
            mesh.retarget_line(l, p, other)?;
        } else {
            mesh.retarget_line(l, other, p)?;
        }
    }
    mesh.delete_node(q)?;
    mesh.set_position(p, merged);
    debug_assert!(mesh.validate().is_ok(), "{:?}", mesh.validate());
    debug!("squashed {:?}, merged {:?} into {:?}", k, q, p);
    Ok(true)
}
