//! Geometric predicates and quality metrics.
//!
//! - [`quality`]: interior angles, angle ratio, condition number of a quad
//! - [`polygon`]: area, centroid, containment and projection
//! - [`arc`]: equal-chord parameterisation of elliptic arcs

pub mod arc;
pub mod polygon;
pub mod quality;

pub use arc::{elliptic_arc_points, ArcError, Ellipse};
pub use polygon::{centroid, closest_point_on_polyline, point_in_polygon, signed_area};
pub use quality::{angle_tilt, condition_number, quad_angles, ConditionNumber, QuadAngles, BIG_RATIO};
