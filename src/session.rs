//! Per-region meshing state.

use tracing::debug;

use crate::algo::boundary::FlagDef;
use crate::config::MeshingConfig;
use crate::error::Result;
use crate::mesh::{Capacity, MeshIndex, QuadMesh};
use crate::region::{classify, mesh_primitive, CheckedRegion, Classification, Hole, Perimeter, Shape};
use crate::scheme::SchemeParams;

/// Everything the scheme commands of one region read and change.
#[derive(Debug, Clone)]
pub struct RegionMeshingSession<I: MeshIndex = u32> {
    /// Region id.
    pub region_id: u32,
    /// Primitive shape the region was meshed as.
    pub shape: Shape,
    /// The mesh being worked on.
    pub mesh: QuadMesh<I>,
    /// Region perimeter, with processed holes bridged in.
    pub perimeter: Perimeter,
    /// Holes in processing order.
    pub holes: Vec<Hole>,
    /// Index of the next hole for the `Z` command.
    pub next_hole: usize,
    /// Adjustable parameters.
    pub params: SchemeParams,
    /// Boundary flag definitions.
    pub flags: Vec<FlagDef>,
}

impl<I: MeshIndex> RegionMeshingSession<I> {
    /// Classify and mesh a checked region as `shape` within `capacity`.
    pub fn start(region: &CheckedRegion, shape: Shape, config: &MeshingConfig, capacity: Capacity) -> Result<Self> {
        let class = classify(region, shape)?;
        Self::from_classification(region, &class, config, capacity)
    }

    /// Mesh a region already classified.
    pub fn from_classification(
        region: &CheckedRegion,
        class: &Classification,
        config: &MeshingConfig,
        capacity: Capacity,
    ) -> Result<Self> {
        let shape = class.shape;
        let mesh = mesh_primitive(region, class, capacity)?;
        let params = SchemeParams::for_region(config, region.perimeter.len(), region.perimeter.mean_segment_length());
        debug!(
            "region {}: session started as {:?}, {} elements",
            region.id,
            shape,
            mesh.num_elements()
        );
        Ok(Self {
            region_id: region.id,
            shape,
            mesh,
            perimeter: region.perimeter.clone(),
            holes: region.holes.clone(),
            next_hole: 0,
            params,
            flags: region.flags.clone(),
        })
    }

    /// The next unprocessed hole, advancing the cursor.
    pub fn take_hole(&mut self) -> Option<Hole> {
        let hole = self.holes.get(self.next_hole).cloned();
        if hole.is_some() {
            self.next_hole += 1;
        }
        hole
    }
}
