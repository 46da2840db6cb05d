//! Core mesh data structures.
//!
//! This module provides the node/line/element topology store used by every
//! meshing operation.
//!
//! # Overview
//!
//! The primary type is [`QuadMesh`], which represents an all-quadrilateral
//! mesh as four mutually consistent adjacency relations (element → lines,
//! line → elements, line → nodes, node → lines) over index arenas with
//! free-list slot reuse.
//!
//! # Ids
//!
//! Nodes, lines and elements are named by slot ids ([`NodeId`], [`LineId`],
//! [`ElementId`]) over a [`MeshIndex`] storage integer, `u32` by default.
//!
//! # Construction
//!
//! ```
//! use quadpave::mesh::{build_from_quads, Capacity, NodeOrigin, QuadMesh};
//! use nalgebra::Point2;
//!
//! let nodes = vec![
//!     (Point2::new(0.0, 0.0), NodeOrigin::Interior),
//!     (Point2::new(1.0, 0.0), NodeOrigin::Interior),
//!     (Point2::new(1.0, 1.0), NodeOrigin::Interior),
//!     (Point2::new(0.0, 1.0), NodeOrigin::Interior),
//! ];
//!
//! let mesh: QuadMesh = build_from_quads(&nodes, &[[0, 1, 2, 3]], |_, _| None, Capacity::default()).unwrap();
//! assert!(mesh.is_valid());
//! ```

mod builder;
mod index;
mod topology;

pub use builder::{build_from_quads, to_node_element};
pub use index::{ElementId, LineId, MeshIndex, NodeId};
pub use topology::{
    BoundaryLoop, Capacity, Element, Line, Node, NodeOrigin, NodeStatus, QuadMesh,
};
