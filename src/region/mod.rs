//! Region description, checking and primitive meshing.
//!
//! A [`Region`] is the input to meshing: an outer [`Perimeter`], optional
//! holes, a scheme string and boundary flag definitions. [`check_region`]
//! validates the loops and normalises their winding; [`classify`] picks the
//! primitive shape and solves its interval divisions; [`primitive`] fills
//! the region with mapped quads.

pub mod classify;
pub mod perimeter;
pub mod primitive;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::algo::boundary::FlagDef;
use crate::error::{MeshError, Result};
use crate::geom::polygon::point_in_polygon;
use crate::mesh::NodeOrigin;

pub use classify::{classify, classify_any, classify_scheme, parse_scheme, split_scheme, Classification, Shape};
pub use perimeter::{Perimeter, PerimeterBuilder, PerimeterPoint, Segment, SegmentKind};
pub use primitive::mesh_primitive;

fn default_dimension() -> u8 {
    1
}

/// A hole inside a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hole {
    /// Hole id, reported in diagnostics.
    pub id: u32,
    /// Dimensionality of the hole description; only 1 (a perimeter loop) is
    /// supported.
    #[serde(default = "default_dimension")]
    pub dimension: u8,
    /// The hole boundary.
    pub perimeter: Perimeter,
}

/// A region to be meshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Region id.
    pub id: u32,
    /// Outer boundary.
    pub perimeter: Perimeter,
    /// Holes, processed in order by the `Z` command.
    #[serde(default)]
    pub holes: Vec<Hole>,
    /// Shape letter followed by commands; empty selects the default scheme.
    #[serde(default)]
    pub scheme: String,
    /// Boundary flag definitions.
    #[serde(default)]
    pub flags: Vec<FlagDef>,
}

impl Region {
    /// A region with no holes, flags or scheme.
    pub fn new(id: u32, perimeter: Perimeter) -> Self {
        Self {
            id,
            perimeter,
            holes: Vec::new(),
            scheme: String::new(),
            flags: Vec::new(),
        }
    }

    /// Set the scheme string.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Add a hole.
    pub fn with_hole(mut self, hole: Hole) -> Self {
        self.holes.push(hole);
        self
    }

    /// Add a boundary flag definition.
    pub fn with_flag(mut self, flag: FlagDef) -> Self {
        self.flags.push(flag);
        self
    }
}

/// A region whose loops passed [`check_region`].
#[derive(Debug, Clone)]
pub struct CheckedRegion {
    /// Region id.
    pub id: u32,
    /// Outer loop, counter-clockwise.
    pub perimeter: Perimeter,
    /// Holes; 1-D loops are clockwise.
    pub holes: Vec<Hole>,
    /// Flag definitions, carried through.
    pub flags: Vec<FlagDef>,
}

fn invalid(region: u32, reason: impl Into<String>) -> MeshError {
    MeshError::InvalidRegion {
        region,
        reason: reason.into(),
    }
}

fn check_loop(region: u32, what: &str, perimeter: &Perimeter) -> Result<()> {
    let n = perimeter.len();
    if n < 4 {
        return Err(invalid(region, format!("{} has {} points, need at least 4", what, n)));
    }
    if perimeter.segments.len() != n {
        return Err(invalid(
            region,
            format!("{} has {} points but {} segments", what, n, perimeter.segments.len()),
        ));
    }
    let scale = perimeter.mean_segment_length().max(f64::MIN_POSITIVE);
    for i in 0..n {
        let a = perimeter.points[i].position;
        let b = perimeter.points[(i + 1) % n].position;
        if (b - a).norm() < 1e-9 * scale {
            return Err(invalid(region, format!("{} points {} and {} coincide", what, i, (i + 1) % n)));
        }
    }
    for i in 0..n {
        if let NodeOrigin::Line(line) = perimeter.points[i].origin {
            let before = perimeter.segments[(i + n - 1) % n];
            let after = perimeter.segments[i];
            if before.line != Some(line) || after.line != Some(line) {
                return Err(invalid(
                    region,
                    format!("{} point {} on line {} is not between two of its segments; dangling line", what, i, line),
                ));
            }
        }
    }
    if perimeter.signed_area().abs() < 1e-12 * scale * scale {
        return Err(invalid(region, format!("{} encloses no area", what)));
    }
    Ok(())
}

/// Validate a region's loops and normalise their winding.
///
/// The outer loop is made counter-clockwise; every 1-D hole is made
/// clockwise and must lie inside the outer loop. Holes of other dimensions
/// are passed through untouched and rejected when processed.
pub fn check_region(region: &Region) -> Result<CheckedRegion> {
    let id = region.id;
    check_loop(id, "perimeter", &region.perimeter)?;
    let mut perimeter = region.perimeter.clone();
    if perimeter.signed_area() < 0.0 {
        debug!("region {}: reversing clockwise perimeter", id);
        perimeter.reverse();
    }

    let outer = perimeter.positions();
    let mut holes = Vec::with_capacity(region.holes.len());
    for hole in &region.holes {
        let mut hole = hole.clone();
        if hole.dimension == 1 {
            check_loop(id, &format!("hole {}", hole.id), &hole.perimeter)?;
            if let Some(p) = hole
                .perimeter
                .points
                .iter()
                .find(|p| !point_in_polygon(&outer, &p.position))
            {
                return Err(invalid(
                    id,
                    format!("hole {} point {:?} lies outside the region", hole.id, p.position),
                ));
            }
            if hole.perimeter.signed_area() > 0.0 {
                hole.perimeter.reverse();
            }
        }
        holes.push(hole);
    }

    Ok(CheckedRegion {
        id,
        perimeter,
        holes,
        flags: region.flags.clone(),
    })
}
