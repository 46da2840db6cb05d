//! Node / line / element topology store for quadrilateral meshes.
//!
//! This module provides the winged-edge style representation used by every
//! meshing operation in the crate. It keeps four adjacency relations mutually
//! consistent:
//!
//! - element → 4 lines, in counter-clockwise cyclic order
//! - line → up to 2 elements (an absent slot marks a boundary side)
//! - line → 2 endpoint nodes
//! - node → incident lines
//!
//! # Structure
//!
//! Entities live in index arenas addressed by [`NodeId`], [`LineId`] and
//! [`ElementId`]. Deleting an entity pushes its slot onto a per-kind LIFO free
//! list, and the next allocation of that kind pops it again before any new
//! storage is touched. Storage beyond the configured [`Capacity`] is refused
//! with [`MeshError::NoRoom`]; the caller is expected to grow the capacity and
//! re-mesh the region from scratch.
//!
//! # Orientation
//!
//! The corner nodes of an element are derived from its lines: corner `i` is
//! the node shared by lines `i-1` and `i`, so line `i` runs from corner `i` to
//! corner `i+1`. The cyclic order is purely topological; geometry is only
//! consulted by quality metrics and smoothers.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use super::index::{ElementId, LineId, MeshIndex, NodeId};
use crate::error::{MeshError, Resource, Result};

/// Where a node came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeOrigin {
    /// Generated on a geometric point (corner).
    Point(u32),
    /// Generated on the interior of a geometric line.
    Line(u32),
    /// Generated inside the region.
    Interior,
}

impl NodeOrigin {
    /// Geometric line id, if the node was generated on a line.
    pub fn line(self) -> Option<u32> {
        match self {
            NodeOrigin::Line(id) => Some(id),
            _ => None,
        }
    }

    /// Geometric point id, if the node was generated on a point.
    pub fn point(self) -> Option<u32> {
        match self {
            NodeOrigin::Point(id) => Some(id),
            _ => None,
        }
    }
}

/// Status of a node slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    /// At least one incident line has a single element.
    Boundary,
    /// Every incident line has two elements; the node may be moved.
    Interior,
    /// Slot is on the free list.
    Deleted,
}

/// A node in the mesh.
#[derive(Debug, Clone)]
pub struct Node<I: MeshIndex = u32> {
    /// Position in the plane.
    pub position: Point2<f64>,
    /// Geometric provenance.
    pub origin: NodeOrigin,
    /// Current status, maintained by every topology edit.
    pub status: NodeStatus,
    pub(crate) lines: Vec<LineId<I>>,
}

/// A line (edge) in the mesh.
#[derive(Debug, Clone)]
pub struct Line<I: MeshIndex = u32> {
    /// Endpoint nodes.
    pub nodes: [NodeId<I>; 2],
    /// Geometric line this edge lies on, for perimeter edges.
    pub origin: Option<u32>,
    pub(crate) elements: [ElementId<I>; 2],
    pub(crate) alive: bool,
}

impl<I: MeshIndex> Line<I> {
    /// Number of incident elements.
    #[inline]
    pub fn element_count(&self) -> usize {
        self.elements.iter().filter(|k| k.is_valid()).count()
    }
}

/// A quadrilateral element.
#[derive(Debug, Clone)]
pub struct Element<I: MeshIndex = u32> {
    pub(crate) lines: [LineId<I>; 4],
    pub(crate) alive: bool,
}

impl<I: MeshIndex> Element<I> {
    /// Bounding lines in counter-clockwise cyclic order.
    pub fn lines(&self) -> [LineId<I>; 4] {
        self.lines
    }
}

/// Storage limits for one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    /// Maximum node slots.
    pub nodes: usize,
    /// Maximum line slots.
    pub lines: usize,
    /// Maximum element slots.
    pub elements: usize,
}

impl Capacity {
    /// Create a capacity with explicit limits.
    pub fn new(nodes: usize, lines: usize, elements: usize) -> Self {
        Self {
            nodes,
            lines,
            elements,
        }
    }

    /// Initial estimate for a region with `perimeter` boundary nodes.
    pub fn estimate(perimeter: usize) -> Self {
        let nodes = perimeter * perimeter / 4 + 2 * perimeter + 16;
        Self {
            nodes,
            lines: 2 * nodes + perimeter,
            elements: nodes + perimeter,
        }
    }

    /// Every limit multiplied by `factor`, rounded up, and at least one larger.
    pub fn grown(self, factor: f64) -> Self {
        let grow = |v: usize| ((v as f64 * factor).ceil() as usize).max(v + 1);
        Self {
            nodes: grow(self.nodes),
            lines: grow(self.lines),
            elements: grow(self.elements),
        }
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Self::estimate(64)
    }
}

/// A closed loop of boundary lines, oriented with the mesh on its left.
#[derive(Debug, Clone)]
pub struct BoundaryLoop<I: MeshIndex = u32> {
    /// Nodes in traversal order; `nodes[i]` starts `lines[i]`.
    pub nodes: Vec<NodeId<I>>,
    /// Lines in traversal order.
    pub lines: Vec<LineId<I>>,
    /// Signed area; positive for an outer loop, negative for a hole.
    pub signed_area: f64,
}

/// Quadrilateral mesh topology with free-list slot reuse.
#[derive(Debug, Clone)]
pub struct QuadMesh<I: MeshIndex = u32> {
    pub(crate) nodes: Vec<Node<I>>,
    pub(crate) lines: Vec<Line<I>>,
    pub(crate) elements: Vec<Element<I>>,
    free_nodes: Vec<NodeId<I>>,
    free_lines: Vec<LineId<I>>,
    free_elements: Vec<ElementId<I>>,
    capacity: Capacity,
}

impl<I: MeshIndex> Default for QuadMesh<I> {
    fn default() -> Self {
        Self::new(Capacity::default())
    }
}

impl<I: MeshIndex> QuadMesh<I> {
    /// Create an empty mesh with the given storage limits.
    pub fn new(capacity: Capacity) -> Self {
        Self {
            nodes: Vec::new(),
            lines: Vec::new(),
            elements: Vec::new(),
            free_nodes: Vec::new(),
            free_lines: Vec::new(),
            free_elements: Vec::new(),
            capacity,
        }
    }

    /// Storage limits.
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    // ==================== Counts ====================

    /// Number of live nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len() - self.free_nodes.len()
    }

    /// Number of live lines.
    pub fn num_lines(&self) -> usize {
        self.lines.len() - self.free_lines.len()
    }

    /// Number of live elements.
    pub fn num_elements(&self) -> usize {
        self.elements.len() - self.free_elements.len()
    }

    /// Node slots ever allocated, including free ones.
    pub fn node_slots(&self) -> usize {
        self.nodes.len()
    }

    /// Line slots ever allocated, including free ones.
    pub fn line_slots(&self) -> usize {
        self.lines.len()
    }

    /// Element slots ever allocated, including free ones.
    pub fn element_slots(&self) -> usize {
        self.elements.len()
    }

    /// Fail with [`MeshError::NoRoom`] unless the given numbers of new
    /// entities fit, counting free slots first.
    pub fn ensure_room(&self, nodes: usize, lines: usize, elements: usize) -> Result<()> {
        let fits = |free: usize, used: usize, cap: usize, want: usize| {
            free + cap.saturating_sub(used) >= want
        };
        if !fits(self.free_nodes.len(), self.nodes.len(), self.capacity.nodes, nodes) {
            return Err(MeshError::NoRoom {
                resource: Resource::Nodes,
                capacity: self.capacity.nodes,
            });
        }
        if !fits(self.free_lines.len(), self.lines.len(), self.capacity.lines, lines) {
            return Err(MeshError::NoRoom {
                resource: Resource::Lines,
                capacity: self.capacity.lines,
            });
        }
        if !fits(
            self.free_elements.len(),
            self.elements.len(),
            self.capacity.elements,
            elements,
        ) {
            return Err(MeshError::NoRoom {
                resource: Resource::Elements,
                capacity: self.capacity.elements,
            });
        }
        Ok(())
    }

    // ==================== Access ====================

    /// Borrow a node.
    #[inline]
    pub fn node(&self, n: NodeId<I>) -> &Node<I> {
        &self.nodes[n.index()]
    }

    /// Borrow a line.
    #[inline]
    pub fn line(&self, l: LineId<I>) -> &Line<I> {
        &self.lines[l.index()]
    }

    /// Borrow an element.
    #[inline]
    pub fn element(&self, k: ElementId<I>) -> &Element<I> {
        &self.elements[k.index()]
    }

    /// Node position.
    #[inline]
    pub fn position(&self, n: NodeId<I>) -> Point2<f64> {
        self.nodes[n.index()].position
    }

    /// Move a node without touching topology.
    #[inline]
    pub fn set_position(&mut self, n: NodeId<I>, p: Point2<f64>) {
        self.nodes[n.index()].position = p;
    }

    /// Change a node's provenance.
    pub fn set_node_origin(&mut self, n: NodeId<I>, origin: NodeOrigin) {
        self.nodes[n.index()].origin = origin;
    }

    /// Tag a line with a geometric line id.
    pub fn set_line_origin(&mut self, l: LineId<I>, origin: Option<u32>) {
        self.lines[l.index()].origin = origin;
    }

    /// Whether a node slot is in use.
    pub fn is_node_alive(&self, n: NodeId<I>) -> bool {
        n.is_valid()
            && n.index() < self.nodes.len()
            && self.nodes[n.index()].status != NodeStatus::Deleted
    }

    /// Whether a line slot is in use.
    pub fn is_line_alive(&self, l: LineId<I>) -> bool {
        l.is_valid() && l.index() < self.lines.len() && self.lines[l.index()].alive
    }

    /// Whether an element slot is in use.
    pub fn is_element_alive(&self, k: ElementId<I>) -> bool {
        k.is_valid() && k.index() < self.elements.len() && self.elements[k.index()].alive
    }

    /// Iterate live node ids in slot order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId<I>> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.status != NodeStatus::Deleted)
            .map(|(i, _)| NodeId::new(i))
    }

    /// Iterate live line ids in slot order.
    pub fn line_ids(&self) -> impl Iterator<Item = LineId<I>> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.alive)
            .map(|(i, _)| LineId::new(i))
    }

    /// Iterate live element ids in slot order.
    pub fn element_ids(&self) -> impl Iterator<Item = ElementId<I>> + '_ {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, k)| k.alive)
            .map(|(i, _)| ElementId::new(i))
    }

    // ==================== Adjacency queries ====================

    /// Elements incident to a line (one for a boundary line, two otherwise).
    pub fn line_elements(&self, l: LineId<I>) -> impl Iterator<Item = ElementId<I>> + '_ {
        self.lines[l.index()]
            .elements
            .iter()
            .copied()
            .filter(|k| k.is_valid())
    }

    /// The element across line `l` from element `k`.
    pub fn other_element(&self, l: LineId<I>, k: ElementId<I>) -> Option<ElementId<I>> {
        self.line_elements(l).find(|&e| e != k)
    }

    /// Lines incident to a node.
    pub fn node_lines(&self, n: NodeId<I>) -> &[LineId<I>] {
        &self.nodes[n.index()].lines
    }

    /// The endpoint of `l` that is not `n`.
    pub fn other_node(&self, l: LineId<I>, n: NodeId<I>) -> NodeId<I> {
        let [a, b] = self.lines[l.index()].nodes;
        if a == n {
            b
        } else {
            a
        }
    }

    /// Nodes joined to `n` by a line, in incident-line order.
    pub fn node_neighbors(&self, n: NodeId<I>) -> Vec<NodeId<I>> {
        self.node_lines(n)
            .iter()
            .map(|&l| self.other_node(l, n))
            .collect()
    }

    /// Elements touching a node, each listed once in discovery order.
    pub fn node_elements(&self, n: NodeId<I>) -> Vec<ElementId<I>> {
        let mut out: Vec<ElementId<I>> = Vec::with_capacity(4);
        for &l in self.node_lines(n) {
            for k in self.line_elements(l) {
                if !out.contains(&k) {
                    out.push(k);
                }
            }
        }
        out
    }

    /// The line joining two nodes, if any.
    pub fn find_line(&self, a: NodeId<I>, b: NodeId<I>) -> Option<LineId<I>> {
        self.node_lines(a)
            .iter()
            .copied()
            .find(|&l| self.other_node(l, a) == b)
    }

    /// Whether a line has exactly one element.
    pub fn is_boundary_line(&self, l: LineId<I>) -> bool {
        self.lines[l.index()].element_count() == 1
    }

    /// Whether any incident line of the node is a boundary line.
    pub fn is_boundary_node(&self, n: NodeId<I>) -> bool {
        self.node_lines(n).iter().any(|&l| self.is_boundary_line(l))
    }

    /// Node shared by two lines, if any.
    pub fn shared_node(&self, a: LineId<I>, b: LineId<I>) -> Option<NodeId<I>> {
        let [a0, a1] = self.lines[a.index()].nodes;
        let [b0, b1] = self.lines[b.index()].nodes;
        if a0 == b0 || a0 == b1 {
            Some(a0)
        } else if a1 == b0 || a1 == b1 {
            Some(a1)
        } else {
            None
        }
    }

    /// Corner nodes of an element; line `i` runs from corner `i` to `i + 1`.
    pub fn element_nodes(&self, k: ElementId<I>) -> [NodeId<I>; 4] {
        let lines = self.elements[k.index()].lines;
        let mut out = [NodeId::invalid(); 4];
        for i in 0..4 {
            let prev = lines[(i + 3) % 4];
            let l = lines[i];
            out[i] = self.corner_node(prev, l).unwrap_or(NodeId::invalid());
        }
        out
    }

    /// Node shared by `prev` and `l`, preferring the start of `l` when the
    /// two lines share both endpoints.
    fn corner_node(&self, prev: LineId<I>, l: LineId<I>) -> Option<NodeId<I>> {
        let [p0, p1] = self.lines[prev.index()].nodes;
        let [l0, l1] = self.lines[l.index()].nodes;
        if l0 == p0 || l0 == p1 {
            Some(l0)
        } else if l1 == p0 || l1 == p1 {
            Some(l1)
        } else {
            None
        }
    }

    /// Corner positions of an element in cyclic order.
    pub fn element_positions(&self, k: ElementId<I>) -> [Point2<f64>; 4] {
        self.element_nodes(k).map(|n| self.position(n))
    }

    /// Index of line `l` within element `k`.
    pub fn line_slot(&self, k: ElementId<I>, l: LineId<I>) -> Option<usize> {
        self.elements[k.index()].lines.iter().position(|&x| x == l)
    }

    /// Index of node `n` among the corners of element `k`.
    pub fn corner_slot(&self, k: ElementId<I>, n: NodeId<I>) -> Option<usize> {
        self.element_nodes(k).iter().position(|&x| x == n)
    }

    /// Signed area of an element (positive when counter-clockwise).
    pub fn element_area(&self, k: ElementId<I>) -> f64 {
        crate::geom::polygon::signed_area(&self.element_positions(k))
    }

    /// Average of the corner positions.
    pub fn element_centroid(&self, k: ElementId<I>) -> Point2<f64> {
        let p = self.element_positions(k);
        Point2::new(
            (p[0].x + p[1].x + p[2].x + p[3].x) / 4.0,
            (p[0].y + p[1].y + p[2].y + p[3].y) / 4.0,
        )
    }

    /// Length of a line.
    pub fn line_length(&self, l: LineId<I>) -> f64 {
        let [a, b] = self.lines[l.index()].nodes;
        (self.position(b) - self.position(a)).norm()
    }

    // ==================== Mutation ====================

    /// Add an isolated node.
    pub fn add_node(&mut self, position: Point2<f64>, origin: NodeOrigin) -> Result<NodeId<I>> {
        let node = Node {
            position,
            origin,
            status: NodeStatus::Interior,
            lines: Vec::with_capacity(4),
        };
        if let Some(n) = self.free_nodes.pop() {
            self.nodes[n.index()] = node;
            return Ok(n);
        }
        if self.nodes.len() >= self.capacity.nodes {
            return Err(MeshError::NoRoom {
                resource: Resource::Nodes,
                capacity: self.capacity.nodes,
            });
        }
        self.nodes.push(node);
        Ok(NodeId::new(self.nodes.len() - 1))
    }

    /// Delete a node that has no incident lines.
    pub fn delete_node(&mut self, n: NodeId<I>) -> Result<()> {
        if !self.is_node_alive(n) {
            return Err(MeshError::topology(format!("{:?} is not alive", n)));
        }
        if !self.nodes[n.index()].lines.is_empty() {
            return Err(MeshError::topology(format!(
                "{:?} still has {} lines",
                n,
                self.nodes[n.index()].lines.len()
            )));
        }
        self.nodes[n.index()].status = NodeStatus::Deleted;
        self.free_nodes.push(n);
        Ok(())
    }

    /// Add a line between two distinct live nodes.
    pub fn add_line(&mut self, a: NodeId<I>, b: NodeId<I>, origin: Option<u32>) -> Result<LineId<I>> {
        if a == b || !self.is_node_alive(a) || !self.is_node_alive(b) {
            return Err(MeshError::topology(format!(
                "cannot join {:?} and {:?}",
                a, b
            )));
        }
        let line = Line {
            nodes: [a, b],
            origin,
            elements: [ElementId::invalid(); 2],
            alive: true,
        };
        let l = if let Some(l) = self.free_lines.pop() {
            self.lines[l.index()] = line;
            l
        } else {
            if self.lines.len() >= self.capacity.lines {
                return Err(MeshError::NoRoom {
                    resource: Resource::Lines,
                    capacity: self.capacity.lines,
                });
            }
            self.lines.push(line);
            LineId::new(self.lines.len() - 1)
        };
        self.nodes[a.index()].lines.push(l);
        self.nodes[b.index()].lines.push(l);
        Ok(l)
    }

    /// Delete a line that no element references.
    pub fn delete_line(&mut self, l: LineId<I>) -> Result<()> {
        if !self.is_line_alive(l) {
            return Err(MeshError::topology(format!("{:?} is not alive", l)));
        }
        if self.lines[l.index()].element_count() > 0 {
            return Err(MeshError::topology(format!("{:?} still has elements", l)));
        }
        let [a, b] = self.lines[l.index()].nodes;
        self.unlink_node_line(a, l);
        self.unlink_node_line(b, l);
        self.lines[l.index()].alive = false;
        self.free_lines.push(l);
        self.refresh_status(a);
        self.refresh_status(b);
        Ok(())
    }

    /// Rewrite a line's endpoints in place; element links are untouched.
    pub fn retarget_line(&mut self, l: LineId<I>, a: NodeId<I>, b: NodeId<I>) -> Result<()> {
        if a == b || !self.is_node_alive(a) || !self.is_node_alive(b) {
            return Err(MeshError::topology(format!(
                "cannot retarget {:?} to {:?}-{:?}",
                l, a, b
            )));
        }
        let [oa, ob] = self.lines[l.index()].nodes;
        self.unlink_node_line(oa, l);
        self.unlink_node_line(ob, l);
        self.lines[l.index()].nodes = [a, b];
        self.nodes[a.index()].lines.push(l);
        self.nodes[b.index()].lines.push(l);
        for n in [oa, ob, a, b] {
            self.refresh_status(n);
        }
        Ok(())
    }

    /// Add an element bounded by four lines in counter-clockwise order.
    pub fn add_element(&mut self, lines: [LineId<I>; 4]) -> Result<ElementId<I>> {
        self.check_element_lines(&lines, None)?;
        let element = Element { lines, alive: true };
        let k = if let Some(k) = self.free_elements.pop() {
            self.elements[k.index()] = element;
            k
        } else {
            if self.elements.len() >= self.capacity.elements {
                return Err(MeshError::NoRoom {
                    resource: Resource::Elements,
                    capacity: self.capacity.elements,
                });
            }
            self.elements.push(element);
            ElementId::new(self.elements.len() - 1)
        };
        for l in lines {
            self.attach(l, k);
        }
        self.refresh_lines(&lines);
        Ok(k)
    }

    /// Delete an element; its lines stay alive.
    pub fn delete_element(&mut self, k: ElementId<I>) -> Result<()> {
        if !self.is_element_alive(k) {
            return Err(MeshError::topology(format!("{:?} is not alive", k)));
        }
        let lines = self.elements[k.index()].lines;
        for l in lines {
            self.detach(l, k);
        }
        self.elements[k.index()].alive = false;
        self.free_elements.push(k);
        self.refresh_lines(&lines);
        Ok(())
    }

    /// Swap one bounding line of an element for another.
    pub fn replace_element_line(
        &mut self,
        k: ElementId<I>,
        old: LineId<I>,
        new: LineId<I>,
    ) -> Result<()> {
        let slot = self
            .line_slot(k, old)
            .ok_or_else(|| MeshError::topology(format!("{:?} not in {:?}", old, k)))?;
        if old == new {
            return Ok(());
        }
        if !self.is_line_alive(new) || self.lines[new.index()].element_count() >= 2 {
            return Err(MeshError::topology(format!(
                "{:?} cannot take another element",
                new
            )));
        }
        self.detach(old, k);
        self.elements[k.index()].lines[slot] = new;
        self.attach(new, k);
        self.refresh_lines(&[old, new]);
        Ok(())
    }

    /// Replace all four bounding lines of an element.
    pub fn rewrite_element(&mut self, k: ElementId<I>, lines: [LineId<I>; 4]) -> Result<()> {
        if !self.is_element_alive(k) {
            return Err(MeshError::topology(format!("{:?} is not alive", k)));
        }
        self.check_element_lines(&lines, Some(k))?;
        let old = self.elements[k.index()].lines;
        for l in old {
            self.detach(l, k);
        }
        self.elements[k.index()].lines = lines;
        for l in lines {
            self.attach(l, k);
        }
        self.refresh_lines(&old);
        self.refresh_lines(&lines);
        Ok(())
    }

    /// Recompute a node's boundary/interior status from its lines.
    pub fn refresh_status(&mut self, n: NodeId<I>) {
        if !self.is_node_alive(n) {
            return;
        }
        let boundary = self.is_boundary_node(n);
        self.nodes[n.index()].status = if boundary {
            NodeStatus::Boundary
        } else {
            NodeStatus::Interior
        };
    }

    fn check_element_lines(&self, lines: &[LineId<I>; 4], current: Option<ElementId<I>>) -> Result<()> {
        for (i, &l) in lines.iter().enumerate() {
            if !self.is_line_alive(l) {
                return Err(MeshError::topology(format!("{:?} is not alive", l)));
            }
            if lines[..i].contains(&l) {
                return Err(MeshError::topology(format!("{:?} repeated in element", l)));
            }
            let line = &self.lines[l.index()];
            let taken = line
                .elements
                .iter()
                .filter(|&&e| e.is_valid() && Some(e) != current)
                .count();
            if taken >= 2 {
                return Err(MeshError::topology(format!("{:?} already has two elements", l)));
            }
            if self.shared_node(lines[(i + 3) % 4], l).is_none() {
                return Err(MeshError::topology(format!(
                    "{:?} does not meet {:?}",
                    l,
                    lines[(i + 3) % 4]
                )));
            }
        }
        Ok(())
    }

    fn attach(&mut self, l: LineId<I>, k: ElementId<I>) {
        let slots = &mut self.lines[l.index()].elements;
        if let Some(slot) = slots.iter_mut().find(|e| !e.is_valid()) {
            *slot = k;
        }
    }

    fn detach(&mut self, l: LineId<I>, k: ElementId<I>) {
        let slots = &mut self.lines[l.index()].elements;
        for slot in slots.iter_mut() {
            if *slot == k {
                *slot = ElementId::invalid();
            }
        }
        // keep the occupied slot first
        if !slots[0].is_valid() {
            slots.swap(0, 1);
        }
    }

    fn unlink_node_line(&mut self, n: NodeId<I>, l: LineId<I>) {
        self.nodes[n.index()].lines.retain(|&x| x != l);
    }

    fn refresh_lines(&mut self, lines: &[LineId<I>]) {
        for &l in lines {
            if self.is_line_alive(l) {
                let [a, b] = self.lines[l.index()].nodes;
                self.refresh_status(a);
                self.refresh_status(b);
            }
        }
    }

    // ==================== Whole-mesh queries ====================

    /// Closed boundary loops, each oriented with the mesh on its left.
    ///
    /// Returns a topology error if a boundary node is shared by two loops
    /// (a pinch) or a loop does not close.
    pub fn boundary_loops(&self) -> Result<Vec<BoundaryLoop<I>>> {
        let mut outgoing: Vec<Option<(LineId<I>, NodeId<I>)>> = vec![None; self.nodes.len()];
        let mut starts = Vec::new();
        for l in self.line_ids() {
            if !self.is_boundary_line(l) {
                continue;
            }
            let Some(k) = self.line_elements(l).next() else {
                continue;
            };
            let slot = self
                .line_slot(k, l)
                .ok_or_else(|| MeshError::topology(format!("{:?} not in {:?}", l, k)))?;
            let corners = self.element_nodes(k);
            let (from, to) = (corners[slot], corners[(slot + 1) % 4]);
            if outgoing[from.index()].is_some() {
                return Err(MeshError::topology(format!(
                    "boundary is pinched at {:?}",
                    from
                )));
            }
            outgoing[from.index()] = Some((l, to));
            starts.push(from);
        }

        let mut visited = vec![false; self.nodes.len()];
        let mut loops = Vec::new();
        for start in starts {
            if visited[start.index()] {
                continue;
            }
            let mut nodes = Vec::new();
            let mut lines = Vec::new();
            let mut n = start;
            loop {
                visited[n.index()] = true;
                let (l, next) = outgoing[n.index()].ok_or_else(|| {
                    MeshError::topology(format!("boundary loop is open at {:?}", n))
                })?;
                nodes.push(n);
                lines.push(l);
                n = next;
                if n == start {
                    break;
                }
                if visited[n.index()] {
                    return Err(MeshError::topology(format!(
                        "boundary loop revisits {:?}",
                        n
                    )));
                }
            }
            let points: Vec<Point2<f64>> = nodes.iter().map(|&n| self.position(n)).collect();
            loops.push(BoundaryLoop {
                signed_area: crate::geom::polygon::signed_area(&points),
                nodes,
                lines,
            });
        }
        Ok(loops)
    }

    /// Check every adjacency relation for consistency.
    pub fn validate(&self) -> Result<()> {
        for (i, node) in self.nodes.iter().enumerate() {
            let n = NodeId::<I>::new(i);
            if node.status == NodeStatus::Deleted {
                if !self.free_nodes.contains(&n) {
                    return Err(MeshError::topology(format!("{:?} deleted but not free", n)));
                }
                continue;
            }
            if node.lines.is_empty() {
                return Err(MeshError::topology(format!("{:?} is orphaned", n)));
            }
            for &l in &node.lines {
                if !self.is_line_alive(l) || !self.lines[l.index()].nodes.contains(&n) {
                    return Err(MeshError::topology(format!(
                        "{:?} lists {:?} which does not end at it",
                        n, l
                    )));
                }
            }
            let expected = if self.is_boundary_node(n) {
                NodeStatus::Boundary
            } else {
                NodeStatus::Interior
            };
            if node.status != expected {
                return Err(MeshError::topology(format!(
                    "{:?} has stale status {:?}",
                    n, node.status
                )));
            }
        }

        for l in self.line_ids() {
            let line = &self.lines[l.index()];
            let [a, b] = line.nodes;
            if a == b || !self.is_node_alive(a) || !self.is_node_alive(b) {
                return Err(MeshError::topology(format!("{:?} has bad endpoints", l)));
            }
            if !self.node_lines(a).contains(&l) || !self.node_lines(b).contains(&l) {
                return Err(MeshError::topology(format!("{:?} missing from node lists", l)));
            }
            let count = line.element_count();
            if count == 0 {
                return Err(MeshError::topology(format!("{:?} has no elements", l)));
            }
            if count == 2 && line.elements[0] == line.elements[1] {
                return Err(MeshError::topology(format!("{:?} lists one element twice", l)));
            }
            for k in self.line_elements(l) {
                if !self.is_element_alive(k) || !self.elements[k.index()].lines.contains(&l) {
                    return Err(MeshError::topology(format!(
                        "{:?} lists {:?} which does not contain it",
                        l, k
                    )));
                }
            }
        }

        for k in self.element_ids() {
            let lines = self.elements[k.index()].lines;
            for (i, &l) in lines.iter().enumerate() {
                if !self.is_line_alive(l) || !self.line_elements(l).any(|e| e == k) {
                    return Err(MeshError::topology(format!(
                        "{:?} lists {:?} which does not point back",
                        k, l
                    )));
                }
                if lines[..i].contains(&l) {
                    return Err(MeshError::topology(format!("{:?} repeats {:?}", k, l)));
                }
            }
            let corners = self.element_nodes(k);
            for i in 0..4 {
                if !corners[i].is_valid() || corners[..i].contains(&corners[i]) {
                    return Err(MeshError::topology(format!("{:?} has degenerate corners", k)));
                }
                let [a, b] = self.lines[lines[i].index()].nodes;
                let (c0, c1) = (corners[i], corners[(i + 1) % 4]);
                if !((a == c0 && b == c1) || (a == c1 && b == c0)) {
                    return Err(MeshError::topology(format!("{:?} lines are not cyclic", k)));
                }
            }
        }
        Ok(())
    }

    /// Whether [`validate`](Self::validate) passes.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> (QuadMesh, [NodeId; 4], [LineId; 4], ElementId) {
        let mut mesh = QuadMesh::new(Capacity::new(16, 16, 16));
        let pts = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        let n = pts.map(|(x, y)| mesh.add_node(Point2::new(x, y), NodeOrigin::Interior).unwrap());
        let l = [
            mesh.add_line(n[0], n[1], Some(1)).unwrap(),
            mesh.add_line(n[1], n[2], Some(1)).unwrap(),
            mesh.add_line(n[2], n[3], Some(1)).unwrap(),
            mesh.add_line(n[3], n[0], Some(1)).unwrap(),
        ];
        let k = mesh.add_element(l).unwrap();
        (mesh, n, l, k)
    }

    #[test]
    fn test_single_element() {
        let (mesh, n, _, k) = unit_square();
        assert_eq!(mesh.num_nodes(), 4);
        assert_eq!(mesh.num_lines(), 4);
        assert_eq!(mesh.num_elements(), 1);
        assert_eq!(mesh.element_nodes(k), n);
        assert!((mesh.element_area(k) - 1.0).abs() < 1e-12);
        assert!(mesh.is_valid());
        assert!(n.iter().all(|&v| mesh.node(v).status == NodeStatus::Boundary));
    }

    #[test]
    fn test_element_nodes_with_reversed_lines() {
        let mut mesh: QuadMesh = QuadMesh::new(Capacity::new(8, 8, 8));
        let pts = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        let n = pts.map(|(x, y)| mesh.add_node(Point2::new(x, y), NodeOrigin::Interior).unwrap());
        let l = [
            mesh.add_line(n[1], n[0], None).unwrap(),
            mesh.add_line(n[2], n[1], None).unwrap(),
            mesh.add_line(n[3], n[2], None).unwrap(),
            mesh.add_line(n[0], n[3], None).unwrap(),
        ];
        let k = mesh.add_element(l).unwrap();
        assert_eq!(mesh.element_nodes(k), n);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_free_list_is_lifo() {
        let (mut mesh, _, l, k) = unit_square();
        let slots = mesh.node_slots();
        mesh.delete_element(k).unwrap();
        for line in l {
            mesh.delete_line(line).unwrap();
        }
        let a = NodeId::new(1);
        let b = NodeId::new(3);
        mesh.delete_node(a).unwrap();
        mesh.delete_node(b).unwrap();
        assert_eq!(mesh.num_nodes(), 2);

        let first = mesh.add_node(Point2::origin(), NodeOrigin::Interior).unwrap();
        let second = mesh.add_node(Point2::origin(), NodeOrigin::Interior).unwrap();
        assert_eq!(first, b);
        assert_eq!(second, a);
        assert_eq!(mesh.node_slots(), slots);

        let third = mesh.add_node(Point2::origin(), NodeOrigin::Interior).unwrap();
        assert_eq!(third.index(), slots);
    }

    #[test]
    fn test_no_room() {
        let mut mesh: QuadMesh = QuadMesh::new(Capacity::new(2, 1, 1));
        let a = mesh.add_node(Point2::origin(), NodeOrigin::Interior).unwrap();
        let b = mesh.add_node(Point2::new(1.0, 0.0), NodeOrigin::Interior).unwrap();
        assert!(mesh
            .add_node(Point2::new(2.0, 0.0), NodeOrigin::Interior)
            .unwrap_err()
            .is_no_room());
        mesh.add_line(a, b, None).unwrap();
        let err = mesh.add_line(b, a, None).unwrap_err();
        assert!(matches!(
            err,
            MeshError::NoRoom {
                resource: Resource::Lines,
                capacity: 1
            }
        ));
    }

    #[test]
    fn test_delete_guards() {
        let (mut mesh, n, l, _) = unit_square();
        assert!(mesh.delete_line(l[0]).is_err());
        assert!(mesh.delete_node(n[0]).is_err());
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_third_element_on_line_rejected() {
        let (mut mesh, _, l, _) = unit_square();
        // a second element on the same four lines would give each line two elements
        mesh.add_element([l[0], l[1], l[2], l[3]]).unwrap();
        assert!(mesh.add_element([l[0], l[1], l[2], l[3]]).is_err());
    }

    #[test]
    fn test_boundary_loop_orientation() {
        let (mesh, n, _, _) = unit_square();
        let loops = mesh.boundary_loops().unwrap();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].nodes.len(), 4);
        assert!(loops[0].signed_area > 0.0);
        let start = loops[0].nodes.iter().position(|&v| v == n[0]).unwrap();
        assert_eq!(loops[0].nodes[(start + 1) % 4], n[1]);
    }

    #[test]
    fn test_retarget_and_rewrite() {
        let (mut mesh, n, l, k) = unit_square();
        let x = mesh.add_node(Point2::new(0.5, -0.5), NodeOrigin::Interior).unwrap();
        // replace the bottom line by a path through x, then drop the old line
        let a = mesh.add_line(n[0], x, None).unwrap();
        let b = mesh.add_line(x, n[1], None).unwrap();
        mesh.retarget_line(l[0], n[0], x).unwrap();
        assert_eq!(mesh.find_line(n[0], x).map(|v| v == l[0] || v == a), Some(true));
        mesh.retarget_line(l[0], n[0], n[1]).unwrap();
        assert_eq!(mesh.find_line(n[0], n[1]), Some(l[0]));
        mesh.delete_line(a).unwrap();
        mesh.delete_line(b).unwrap();
        mesh.delete_node(x).unwrap();
        mesh.rewrite_element(k, [l[1], l[2], l[3], l[0]]).unwrap();
        assert_eq!(mesh.element_nodes(k), [n[1], n[2], n[3], n[0]]);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_capacity_growth() {
        let cap = Capacity::new(10, 20, 4);
        let grown = cap.grown(1.5);
        assert_eq!(grown, Capacity::new(15, 30, 6));
        let tiny = Capacity::new(1, 1, 1).grown(1.5);
        assert_eq!(tiny, Capacity::new(2, 2, 2));
    }
}
