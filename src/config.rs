//! Meshing configuration.
//!
//! [`MeshingConfig`] collects every tunable of a meshing run in one value
//! that is passed by reference to the driver. It can be built in code with
//! the `with_*` methods or read from the `config` section of a region file.
//!
//! # Example
//!
//! ```
//! use quadpave::config::MeshingConfig;
//!
//! let config = MeshingConfig::default()
//!     .with_default_scheme("MRS")
//!     .with_parallel(true);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{MeshError, Result};
use crate::mesh::Capacity;

/// Settings for meshing a batch of regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshingConfig {
    /// Scheme used when a region has none, and after an `O` command.
    pub default_scheme: String,

    /// Starting storage limits; estimated from the perimeter when absent.
    pub initial_capacity: Option<Capacity>,

    /// Factor applied to every limit when a region runs out of room.
    pub growth_factor: f64,

    /// Capacity increases tried before a region is given up.
    pub max_growth_attempts: usize,

    /// Passes a `( ... )` group may make.
    pub max_loop_passes: usize,

    /// Convergence tolerance as a fraction of the mean boundary segment.
    pub tolerance: f64,

    /// Initial relaxation factor.
    pub relaxation: f64,

    /// Initial area-pull weight.
    pub area_pull: f64,

    /// Initial isoparametric weight.
    pub iso_weight: f64,

    /// Initial squash angle threshold, in degrees.
    pub small_angle: f64,

    /// Smoothing sweeps per perimeter node.
    pub iteration_factor: f64,

    /// Mesh regions on the rayon thread pool.
    pub parallel: bool,
}

impl Default for MeshingConfig {
    fn default() -> Self {
        Self {
            default_scheme: "M".to_string(),
            initial_capacity: None,
            growth_factor: 1.5,
            max_growth_attempts: 8,
            max_loop_passes: 25,
            tolerance: 0.03,
            relaxation: 1.0,
            area_pull: 0.5,
            iso_weight: 0.5,
            small_angle: 45.0,
            iteration_factor: 2.5,
            parallel: false,
        }
    }
}

impl MeshingConfig {
    /// Set the default scheme.
    pub fn with_default_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.default_scheme = scheme.into();
        self
    }

    /// Set the starting capacity.
    pub fn with_initial_capacity(mut self, capacity: Capacity) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    /// Set the growth factor.
    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Set the number of capacity increases allowed per region.
    pub fn with_max_growth_attempts(mut self, attempts: usize) -> Self {
        self.max_growth_attempts = attempts;
        self
    }

    /// Set the loop pass cap.
    pub fn with_max_loop_passes(mut self, passes: usize) -> Self {
        self.max_loop_passes = passes;
        self
    }

    /// Set the relative convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the initial squash angle threshold in degrees.
    pub fn with_small_angle(mut self, degrees: f64) -> Self {
        self.small_angle = degrees;
        self
    }

    /// Mesh regions in parallel.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Reject settings no run could use.
    pub fn validate(&self) -> Result<()> {
        if !(self.growth_factor > 1.0) {
            return Err(MeshError::invalid_param(
                "growth_factor",
                self.growth_factor,
                "must be greater than 1",
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(MeshError::invalid_param("tolerance", self.tolerance, "must be positive"));
        }
        if !(self.relaxation > 0.0) {
            return Err(MeshError::invalid_param("relaxation", self.relaxation, "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.area_pull) {
            return Err(MeshError::invalid_param("area_pull", self.area_pull, "must be in [0, 1]"));
        }
        if !(10.0..=80.0).contains(&self.small_angle) {
            return Err(MeshError::invalid_param(
                "small_angle",
                self.small_angle,
                "must be in [10, 80] degrees",
            ));
        }
        if !(self.iteration_factor > 0.0) {
            return Err(MeshError::invalid_param(
                "iteration_factor",
                self.iteration_factor,
                "must be positive",
            ));
        }
        if self.max_loop_passes == 0 {
            return Err(MeshError::invalid_param("max_loop_passes", 0, "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(MeshingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_growth() {
        let err = MeshingConfig::default().with_growth_factor(1.0).validate().unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { name: "growth_factor", .. }));
    }

    #[test]
    fn test_partial_json() {
        let config: MeshingConfig = serde_json::from_str(r#"{"parallel": true, "small_angle": 30}"#).unwrap();
        assert!(config.parallel);
        assert_eq!(config.small_angle, 30.0);
        assert_eq!(config.growth_factor, 1.5);
    }
}
