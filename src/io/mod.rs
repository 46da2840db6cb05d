//! Region and mesh file I/O.
//!
//! Regions are read from, and meshes written to, JSON.
//!
//! # Region files
//!
//! A region file holds the regions of a batch and, optionally, the meshing
//! configuration to use for them:
//!
//! ```json
//! {
//!   "config": { "default_scheme": "MS", "parallel": true },
//!   "regions": [
//!     {
//!       "id": 1,
//!       "scheme": "M(RS)",
//!       "perimeter": {
//!         "points": [{ "position": [0.0, 0.0], "origin": { "Point": 1 } }],
//!         "segments": [{ "line": 1 }]
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use quadpave::io::{load_regions, save_output, MeshFile};
//! use quadpave::driver::mesh_regions;
//! use quadpave::algo::progress::Progress;
//!
//! let file = load_regions("regions.json").unwrap();
//! let config = file.config.clone().unwrap_or_default();
//! let batch = mesh_regions(&file.regions, &config, &Progress::none());
//! save_output("mesh.json", &MeshFile::from_batch(&batch)).unwrap();
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::MeshingConfig;
use crate::driver::{BatchReport, RegionOutcome};
use crate::error::{MeshError, Result};
use crate::output::{MergedMesh, MeshOutput};
use crate::region::Region;

/// Contents of a region file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionFile {
    /// Meshing settings; defaults apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<MeshingConfig>,
    /// Regions in meshing order.
    pub regions: Vec<Region>,
}

/// A region the batch did not mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRegion {
    /// Region id, negated.
    pub region: i64,
    /// Why it was skipped.
    pub reason: String,
}

/// Contents of a mesh file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshFile {
    /// Every meshed region in its own numbering.
    pub regions: Vec<MeshOutput>,
    /// The regions merged into one mesh.
    pub merged: MergedMesh,
    /// Regions left unmeshed.
    #[serde(default)]
    pub skipped: Vec<SkippedRegion>,
}

impl MeshFile {
    /// Collect the results of a batch.
    pub fn from_batch(batch: &BatchReport) -> Self {
        let mut regions = Vec::new();
        let mut skipped = Vec::new();
        for outcome in &batch.outcomes {
            match outcome {
                RegionOutcome::Meshed(m) => regions.push(m.output.clone()),
                RegionOutcome::Skipped { region, reason } => skipped.push(SkippedRegion {
                    region: *region,
                    reason: reason.clone(),
                }),
            }
        }
        Self {
            regions,
            merged: batch.merged.clone(),
            skipped,
        }
    }
}

/// Parse a region file from a reader.
pub fn read_regions<R: Read>(reader: R) -> Result<RegionFile> {
    Ok(serde_json::from_reader(reader)?)
}

/// Load a region file.
pub fn load_regions<P: AsRef<Path>>(path: P) -> Result<RegionFile> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let regions = read_regions(BufReader::new(file)).map_err(|e| MeshError::LoadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if let Some(config) = &regions.config {
        config.validate().map_err(|e| MeshError::LoadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    }
    Ok(regions)
}

/// Write any output value as pretty JSON.
pub fn write_output<W: Write, T: Serialize>(mut writer: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Save a mesh, a merged mesh or a whole [`MeshFile`] as JSON.
pub fn save_output<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    write_output(BufWriter::new(file), value).map_err(|e| MeshError::SaveError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::progress::Progress;
    use crate::driver::mesh_regions;

    const REGIONS: &str = r#"{
        "config": { "default_scheme": "MS" },
        "regions": [{
            "id": 4,
            "flags": [{ "flag": 2, "kind": "side", "lines": [1] }],
            "perimeter": {
                "points": [
                    { "position": [0.0, 0.0], "origin": { "Point": 1 } },
                    { "position": [1.0, 0.0], "origin": { "Line": 1 } },
                    { "position": [2.0, 0.0], "origin": { "Point": 2 } },
                    { "position": [2.0, 1.0], "origin": { "Point": 3 } },
                    { "position": [1.0, 1.0], "origin": { "Line": 3 } },
                    { "position": [0.0, 1.0], "origin": { "Point": 4 } }
                ],
                "segments": [
                    { "line": 1 }, { "line": 1 }, { "line": 2 },
                    { "line": 3 }, { "line": 3 }, { "line": 4 }
                ]
            }
        }]
    }"#;

    #[test]
    fn test_read_regions() {
        let file = read_regions(REGIONS.as_bytes()).unwrap();
        let config = file.config.unwrap();
        assert_eq!(config.default_scheme, "MS");
        assert_eq!(config.growth_factor, 1.5);
        assert_eq!(file.regions.len(), 1);
        assert_eq!(file.regions[0].perimeter.len(), 6);
        assert!(file.regions[0].scheme.is_empty());
    }

    #[test]
    fn test_malformed_region_file() {
        assert!(matches!(read_regions(&b"{ \"regions\": 3 }"[..]), Err(MeshError::Json(_))));
    }

    #[test]
    fn test_batch_to_json() {
        let file = read_regions(REGIONS.as_bytes()).unwrap();
        let config = file.config.clone().unwrap_or_default();
        let batch = mesh_regions(&file.regions, &config, &Progress::none());
        let mesh = MeshFile::from_batch(&batch);
        assert_eq!(mesh.regions.len(), 1);
        assert_eq!(mesh.regions[0].num_elements(), 2);
        assert_eq!(mesh.regions[0].scheme, "MS");
        assert_eq!(mesh.regions[0].side_flags.len(), 2);

        let mut buf = Vec::new();
        write_output(&mut buf, &mesh).unwrap();
        let back: MeshFile = serde_json::from_slice(&buf).unwrap();
        assert_eq!(back.merged.elements, mesh.merged.elements);
        assert!(back.skipped.is_empty());
    }
}
