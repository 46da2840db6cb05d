//! # quadpave
//!
//! An all-quadrilateral mesh generator for planar regions.
//!
//! A region is described by its boundary: an outer perimeter of points on
//! geometric lines, optional hole loops, boundary flag definitions and a
//! scheme string. quadpave fills the region with a mapped primitive mesh
//! (rectangle, triangle, pentagon, transition or semicircle) and then runs
//! the scheme's commands against it: smoothing, diagonal swaps, element
//! collapse, necklace rows, corner tucks and hole cuts.
//!
//! ## Features
//!
//! - **Topology store**: nodes, lines and quads with typed indices, LIFO slot
//!   reuse and explicit capacity limits
//! - **Primitive meshing**: five mapped shapes with solved interval divisions
//! - **Scheme language**: one-letter commands with repeat groups and
//!   parameter steps
//! - **Capacity recovery**: regions that run out of room are re-meshed from
//!   scratch with grown limits
//! - **Batches**: regions meshed in parallel and merged on shared boundaries
//!
//! ## Quick Start
//!
//! ```
//! use quadpave::prelude::*;
//! use nalgebra::Point2;
//!
//! // A 3 x 2 rectangle with 3 and 2 intervals on its sides
//! let perimeter = Perimeter::builder(1, Point2::new(0.0, 0.0))
//!     .line(1, 2, Point2::new(3.0, 0.0), 3)
//!     .line(2, 3, Point2::new(3.0, 2.0), 2)
//!     .line(3, 4, Point2::new(0.0, 2.0), 3)
//!     .close(4, 2);
//! let region = Region::new(1, perimeter)
//!     .with_scheme("M(RS)")
//!     .with_flag(FlagDef::sides(10, vec![1]));
//!
//! let outcome = mesh_region(&region, &MeshingConfig::default()).unwrap();
//! let meshed = outcome.meshed().unwrap();
//! assert_eq!(meshed.output.num_elements(), 6);
//! assert_eq!(meshed.output.side_flags.len(), 3);
//! ```
//!
//! ## Working on a Mesh Directly
//!
//! The algorithms can be used without the driver:
//!
//! ```
//! use quadpave::prelude::*;
//! use quadpave::algo::{restructure, smooth};
//! use nalgebra::Point2;
//!
//! let mut nodes = Vec::new();
//! for j in 0..3 {
//!     for i in 0..3 {
//!         nodes.push((Point2::new(i as f64, j as f64), NodeOrigin::Interior));
//!     }
//! }
//! nodes[4].0 = Point2::new(1.4, 1.3);
//! let faces = [[0, 1, 4, 3], [1, 2, 5, 4], [3, 4, 7, 6], [4, 5, 8, 7]];
//! let mut mesh: QuadMesh = build_from_quads(&nodes, &faces, |_, _| None, Capacity::default()).unwrap();
//!
//! let options = smooth::SmoothOptions::default().with_kind(smooth::SmoothingKind::Laplacian);
//! let report = smooth::smooth(&mut mesh, &options);
//! assert!(report.converged);
//! assert!((mesh.position(NodeId::new(4)) - Point2::new(1.0, 1.0)).norm() < 1e-9);
//! assert!(restructure::resta(&mut mesh, usize::MAX).is_ok());
//! assert!(mesh.is_valid());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod config;
pub mod driver;
pub mod error;
pub mod geom;
pub mod io;
pub mod mesh;
pub mod output;
pub mod region;
pub mod scheme;
pub mod session;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use quadpave::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::boundary::{FlagDef, FlagKind};
    pub use crate::algo::progress::{Progress, StepDecision, StepHook};
    pub use crate::config::MeshingConfig;
    pub use crate::driver::{mesh_region, mesh_regions, BatchReport, RegionOutcome};
    pub use crate::error::{MeshError, Result};
    pub use crate::mesh::{
        build_from_quads, to_node_element, Capacity, ElementId, LineId, MeshIndex, NodeId, NodeOrigin, QuadMesh,
    };
    pub use crate::output::{MergedMesh, MeshOutput};
    pub use crate::region::{Hole, Perimeter, Region, Shape};
    pub use crate::scheme::SchemeOutcome;
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use nalgebra::Point2;

    #[test]
    fn test_rectangle_region() {
        let perimeter = Perimeter::builder(1, Point2::new(0.0, 0.0))
            .line(1, 2, Point2::new(4.0, 0.0), 4)
            .line(2, 3, Point2::new(4.0, 2.0), 2)
            .line(3, 4, Point2::new(0.0, 2.0), 4)
            .close(4, 2);
        let region = Region::new(1, perimeter).with_flag(FlagDef::nodes(3, vec![2]));

        let outcome = mesh_region(&region, &MeshingConfig::default()).unwrap();
        let out = &outcome.meshed().unwrap().output;

        assert_eq!(out.num_elements(), 8);
        assert_eq!(out.num_nodes(), 15);
        // line 2 has three nodes, corners included
        assert_eq!(out.node_flags.len(), 3);
        for f in &out.node_flags {
            assert!((out.nodes[f.node - 1][0] - 4.0).abs() < 1e-12);
        }
    }
}
