//! Adjustable parameters of a scheme run.

use crate::algo::smooth::{SmoothOptions, SmoothingKind};
use crate::config::MeshingConfig;

use super::command::Direction;

/// Step of the area-pull weight.
pub const AREA_PULL_STEP: f64 = 0.1;
/// Step of the relaxation factor.
pub const RELAXATION_STEP: f64 = 0.25;
/// Smallest relaxation factor.
pub const RELAXATION_FLOOR: f64 = 0.25;
/// Factor applied to the iteration cap.
pub const ITERATION_FACTOR: f64 = 1.5;
/// Factor applied to the convergence tolerance.
pub const TOLERANCE_FACTOR: f64 = 1.2599921;
/// Step of the squash angle, in degrees.
pub const SMALL_ANGLE_STEP: f64 = 2.5;
/// Range of the squash angle, in degrees.
pub const SMALL_ANGLE_RANGE: (f64, f64) = (10.0, 80.0);
/// Step of the isoparametric weight.
pub const ISO_WEIGHT_STEP: f64 = 0.1;
/// Smallest isoparametric weight.
pub const ISO_WEIGHT_FLOOR: f64 = 0.1;

/// Parameters the scheme commands read and adjust.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeParams {
    /// Selected smoother.
    pub kind: SmoothingKind,
    /// Area-pull weight, in `[0, 1]`.
    pub area_pull: f64,
    /// Relaxation factor.
    pub relaxation: f64,
    /// Smoothing sweep cap.
    pub iterations: usize,
    /// Convergence distance.
    pub tolerance: f64,
    /// Squash angle threshold, in degrees.
    pub small_angle: f64,
    /// Isoparametric weight.
    pub iso_weight: f64,
}

impl SchemeParams {
    /// Starting parameters for a region with `perimeter_nodes` boundary
    /// nodes and mean boundary segment length `segment`.
    pub fn for_region(config: &MeshingConfig, perimeter_nodes: usize, segment: f64) -> Self {
        Self {
            kind: SmoothingKind::default(),
            area_pull: config.area_pull.clamp(0.0, 1.0),
            relaxation: config.relaxation.max(RELAXATION_FLOOR),
            iterations: ((config.iteration_factor * perimeter_nodes as f64).ceil() as usize).max(1),
            tolerance: config.tolerance * segment,
            small_angle: config.small_angle.clamp(SMALL_ANGLE_RANGE.0, SMALL_ANGLE_RANGE.1),
            iso_weight: config.iso_weight.max(ISO_WEIGHT_FLOOR),
        }
    }

    /// `A`
    pub fn adjust_area_pull(&mut self, d: Direction) {
        self.area_pull = match d {
            Direction::Up => self.area_pull + AREA_PULL_STEP,
            Direction::Down => self.area_pull - AREA_PULL_STEP,
        }
        .clamp(0.0, 1.0);
    }

    /// `F`
    pub fn adjust_relaxation(&mut self, d: Direction) {
        self.relaxation = match d {
            Direction::Up => self.relaxation + RELAXATION_STEP,
            Direction::Down => (self.relaxation - RELAXATION_STEP).max(RELAXATION_FLOOR),
        };
    }

    /// `I`
    pub fn adjust_iterations(&mut self, d: Direction) {
        let n = self.iterations as f64;
        self.iterations = match d {
            Direction::Up => (n * ITERATION_FACTOR).ceil() as usize,
            Direction::Down => ((n / ITERATION_FACTOR).floor() as usize).max(1),
        };
    }

    /// `J`
    pub fn adjust_tolerance(&mut self, d: Direction) {
        self.tolerance = match d {
            Direction::Up => self.tolerance * TOLERANCE_FACTOR,
            Direction::Down => self.tolerance / TOLERANCE_FACTOR,
        };
    }

    /// `V`
    pub fn adjust_small_angle(&mut self, d: Direction) {
        self.small_angle = match d {
            Direction::Up => self.small_angle + SMALL_ANGLE_STEP,
            Direction::Down => self.small_angle - SMALL_ANGLE_STEP,
        }
        .clamp(SMALL_ANGLE_RANGE.0, SMALL_ANGLE_RANGE.1);
    }

    /// `Y`. Only the floor is enforced; a weight above one overshoots the
    /// isoparametric position.
    pub fn adjust_iso_weight(&mut self, d: Direction) {
        self.iso_weight = match d {
            Direction::Up => self.iso_weight + ISO_WEIGHT_STEP,
            Direction::Down => self.iso_weight - ISO_WEIGHT_STEP,
        }
        .max(ISO_WEIGHT_FLOOR);
    }

    /// Squash angle threshold in radians.
    pub fn small_angle_radians(&self) -> f64 {
        self.small_angle.to_radians()
    }

    /// Smoother options for the current settings.
    pub fn smooth_options(&self) -> SmoothOptions {
        SmoothOptions::default()
            .with_kind(self.kind)
            .with_iterations(self.iterations)
            .with_tolerance(self.tolerance)
            .with_relaxation(self.relaxation)
            .with_area_pull(self.area_pull)
            .with_iso_weight(self.iso_weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SchemeParams {
        SchemeParams::for_region(&MeshingConfig::default(), 12, 1.0)
    }

    #[test]
    fn test_defaults_from_config() {
        let p = params();
        assert_eq!(p.iterations, 30);
        assert!((p.tolerance - 0.03).abs() < 1e-15);
        assert_eq!(p.small_angle, 45.0);
        assert_eq!(p.kind, SmoothingKind::Equipotential);
    }

    #[test]
    fn test_relaxation_floor() {
        let mut p = params();
        for _ in 0..10 {
            p.adjust_relaxation(Direction::Down);
        }
        assert_eq!(p.relaxation, RELAXATION_FLOOR);
        p.adjust_relaxation(Direction::Up);
        assert_eq!(p.relaxation, 0.5);
    }

    #[test]
    fn test_small_angle_clamped() {
        let mut p = params();
        for _ in 0..20 {
            p.adjust_small_angle(Direction::Up);
        }
        assert_eq!(p.small_angle, 80.0);
        p.adjust_small_angle(Direction::Down);
        assert_eq!(p.small_angle, 77.5);
    }

    #[test]
    fn test_iterations_and_tolerance_steps() {
        let mut p = params();
        p.adjust_iterations(Direction::Up);
        assert_eq!(p.iterations, 45);
        p.adjust_iterations(Direction::Down);
        assert_eq!(p.iterations, 30);
        p.adjust_tolerance(Direction::Up);
        p.adjust_tolerance(Direction::Down);
        assert!((p.tolerance - 0.03).abs() < 1e-15);
    }

    #[test]
    fn test_weights_clamped() {
        let mut p = params();
        for _ in 0..8 {
            p.adjust_area_pull(Direction::Up);
            p.adjust_iso_weight(Direction::Down);
        }
        assert_eq!(p.area_pull, 1.0);
        assert_eq!(p.iso_weight, ISO_WEIGHT_FLOOR);
    }

    #[test]
    fn test_iso_weight_has_no_ceiling() {
        let mut p = params();
        for _ in 0..8 {
            p.adjust_iso_weight(Direction::Up);
        }
        assert!((p.iso_weight - 1.3).abs() < 1e-12);
        assert!((p.smooth_options().iso_weight - 1.3).abs() < 1e-12);

        let config = MeshingConfig {
            iso_weight: 0.0,
            ..MeshingConfig::default()
        };
        let p = SchemeParams::for_region(&config, 12, 1.0);
        assert_eq!(p.iso_weight, ISO_WEIGHT_FLOOR);
    }
}
