//! Region and batch meshing.
//!
//! [`mesh_region`] runs one region from its boundary description to a
//! [`MeshOutput`]: check, classify, primitive mesh, scheme, boundary flags.
//! When the mesh runs out of room the capacity is grown and the region is
//! meshed again from scratch; nothing is carried over from the failed
//! attempt. [`mesh_regions`] does this for a batch, optionally on the rayon
//! pool, and merges the results in input order.
//!
//! # Example
//!
//! ```
//! use quadpave::config::MeshingConfig;
//! use quadpave::driver::{mesh_region, RegionOutcome};
//! use quadpave::region::{Perimeter, Region};
//! use nalgebra::Point2;
//!
//! let perimeter = Perimeter::builder(1, Point2::new(0.0, 0.0))
//!     .line(1, 2, Point2::new(3.0, 0.0), 3)
//!     .line(2, 3, Point2::new(3.0, 3.0), 3)
//!     .line(3, 4, Point2::new(0.0, 3.0), 3)
//!     .close(4, 3);
//! let region = Region::new(1, perimeter).with_scheme("MS");
//!
//! let outcome = mesh_region(&region, &MeshingConfig::default()).unwrap();
//! if let RegionOutcome::Meshed(meshed) = outcome {
//!     assert_eq!(meshed.output.num_elements(), 9);
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::algo::boundary::boundary_flags;
use crate::algo::progress::{Progress, StepHook};
use crate::config::MeshingConfig;
use crate::error::{MeshError, Result};
use crate::mesh::Capacity;
use crate::output::{MergedMesh, MeshOutput};
use crate::region::{check_region, classify_scheme, CheckedRegion, Region, Shape};
use crate::scheme::{parse_commands, run_scheme, SchemeOutcome, SchemeReport};
use crate::session::RegionMeshingSession;

/// A region that was meshed and kept.
#[derive(Debug, Clone)]
pub struct MeshedRegion {
    /// The mesh in output numbering.
    pub output: MeshOutput,
    /// What the scheme did.
    pub report: SchemeReport,
    /// Capacity of the successful attempt.
    pub capacity: Capacity,
    /// Capacity increases needed.
    pub growths: usize,
    /// Whether an `O` sent the region back to the default scheme.
    pub started_over: bool,
}

/// What became of one region.
#[derive(Debug, Clone)]
pub enum RegionOutcome {
    /// Meshed; the mesh is part of the batch.
    Meshed(MeshedRegion),
    /// Not meshed. `region` is the region id negated, the way skipped
    /// regions are listed.
    Skipped {
        /// Negated region id.
        region: i64,
        /// Why the region was skipped.
        reason: String,
    },
}

impl RegionOutcome {
    fn skipped(region: u32, reason: impl Into<String>) -> Self {
        RegionOutcome::Skipped {
            region: -i64::from(region),
            reason: reason.into(),
        }
    }

    /// The meshed region, if any.
    pub fn meshed(&self) -> Option<&MeshedRegion> {
        match self {
            RegionOutcome::Meshed(m) => Some(m),
            RegionOutcome::Skipped { .. } => None,
        }
    }
}

/// Result of meshing a batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// One outcome per input region, in input order.
    pub outcomes: Vec<RegionOutcome>,
    /// The kept regions merged into one mesh.
    pub merged: MergedMesh,
}

impl BatchReport {
    /// Number of regions meshed.
    pub fn meshed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.meshed().is_some()).count()
    }

    /// Negated ids of the skipped regions.
    pub fn skipped(&self) -> Vec<i64> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                RegionOutcome::Skipped { region, .. } => Some(*region),
                RegionOutcome::Meshed(_) => None,
            })
            .collect()
    }
}

/// Scheme text for a region; blank selects the default.
fn effective_scheme<'a>(region: &'a Region, config: &'a MeshingConfig) -> &'a str {
    if uses_default(region) {
        &config.default_scheme
    } else {
        &region.scheme
    }
}

fn uses_default(region: &Region) -> bool {
    region.scheme.trim().is_empty()
}

/// Starting capacity for a checked region.
fn initial_capacity(region: &CheckedRegion, config: &MeshingConfig) -> Capacity {
    config.initial_capacity.unwrap_or_else(|| {
        let boundary = region.perimeter.len() + region.holes.iter().map(|h| h.perimeter.len()).sum::<usize>();
        Capacity::estimate(boundary)
    })
}

/// One attempt at a region with a fixed capacity.
///
/// With `automatic` the shape may differ from the one the scheme names; the
/// saved scheme then starts with the letter of the shape used.
fn attempt(
    region: &CheckedRegion,
    scheme: &str,
    automatic: bool,
    config: &MeshingConfig,
    capacity: Capacity,
    hook: &StepHook,
) -> Result<(SchemeReport, Option<MeshOutput>)> {
    let (class, rest) = classify_scheme(region, scheme, automatic)?;
    let commands = parse_commands(rest);
    let mut session: RegionMeshingSession =
        RegionMeshingSession::from_classification(region, &class, config, capacity)?;
    let report = run_scheme(&mut session, &commands, hook, config.max_loop_passes)?;
    if report.outcome != SchemeOutcome::Exit {
        return Ok((report, None));
    }
    session.mesh.validate()?;
    let flags = boundary_flags(&session.mesh, &session.perimeter, &session.flags)?;
    let saved = if scheme.trim_start().len() == rest.len() && class.shape == Shape::Rectangle {
        scheme.to_string()
    } else {
        format!("{}{}", class.shape.letter(), rest)
    };
    let output = MeshOutput::from_mesh(region.id, &saved, &session.mesh, &flags);
    Ok((report, Some(output)))
}

/// Mesh one region in batch mode.
pub fn mesh_region(region: &Region, config: &MeshingConfig) -> Result<RegionOutcome> {
    mesh_region_with_hook(region, config, &StepHook::batch())
}

/// Mesh one region, consulting `hook` before every scheme command.
///
/// Errors are returned for regions that cannot be meshed at all: a bad
/// boundary, a shape the perimeter does not fit, a broken topology, or a
/// capacity that is still too small after
/// [`max_growth_attempts`](MeshingConfig::max_growth_attempts) increases.
/// A `Q` in the scheme gives [`RegionOutcome::Skipped`]. An `O` restarts the
/// region once with the default scheme.
///
/// The shape letter of a region's own scheme is binding. The default scheme,
/// and a scheme that names no shape, use the first shape that fits the
/// perimeter (see [`classify_scheme`]).
pub fn mesh_region_with_hook(region: &Region, config: &MeshingConfig, hook: &StepHook) -> Result<RegionOutcome> {
    config.validate()?;
    let checked = check_region(region)?;
    let mut scheme = effective_scheme(region, config).to_string();
    let mut automatic = uses_default(region);
    let mut capacity = initial_capacity(&checked, config);
    let mut growths = 0;
    let mut started_over = false;

    loop {
        match attempt(&checked, &scheme, automatic, config, capacity, hook) {
            Ok((report, Some(output))) => {
                info!(
                    "region {}: {} nodes, {} elements",
                    region.id,
                    output.num_nodes(),
                    output.num_elements()
                );
                return Ok(RegionOutcome::Meshed(MeshedRegion {
                    output,
                    report,
                    capacity,
                    growths,
                    started_over,
                }));
            }
            Ok((report, None)) => match report.outcome {
                SchemeOutcome::Over if !started_over => {
                    info!("region {}: starting over with scheme {:?}", region.id, config.default_scheme);
                    scheme = config.default_scheme.clone();
                    automatic = true;
                    started_over = true;
                }
                SchemeOutcome::Over => {
                    return Ok(RegionOutcome::skipped(region.id, "default scheme also asked to start over"));
                }
                _ => return Ok(RegionOutcome::skipped(region.id, "quit by scheme")),
            },
            Err(e) if e.is_no_room() => {
                if growths >= config.max_growth_attempts {
                    return Err(MeshError::CapacityExhausted {
                        region: region.id,
                        attempts: growths,
                    });
                }
                growths += 1;
                capacity = capacity.grown(config.growth_factor);
                warn!("region {}: {}; retrying with {:?}", region.id, e, capacity);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Mesh a batch of regions and merge the kept ones.
///
/// A failing region is reported as skipped and the rest continue. With
/// [`parallel`](MeshingConfig::parallel) set the regions are meshed on the
/// rayon pool; the outcomes and the merge are in input order either way.
pub fn mesh_regions(regions: &[Region], config: &MeshingConfig, progress: &Progress) -> BatchReport {
    let total = regions.len();
    let done = AtomicUsize::new(0);
    let one = |region: &Region| {
        let outcome = match mesh_region(region, config) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("region {} skipped: {}", region.id, e);
                RegionOutcome::skipped(region.id, e.to_string())
            }
        };
        let current = done.fetch_add(1, Ordering::Relaxed);
        progress.report(current, total, &format!("region {}", region.id));
        outcome
    };
    let outcomes: Vec<RegionOutcome> = if config.parallel {
        regions.par_iter().map(one).collect()
    } else {
        regions.iter().map(one).collect()
    };
    let merged = MergedMesh::merge(outcomes.iter().filter_map(|o| o.meshed().map(|m| &m.output)));
    let report = BatchReport { outcomes, merged };
    debug!(
        "batch: {} of {} regions meshed, {} merged nodes",
        report.meshed_count(),
        total,
        report.merged.nodes.len()
    );
    report
}
