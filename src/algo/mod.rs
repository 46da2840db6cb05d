//! Mesh processing algorithms.
//!
//! These operate on a meshed region in place and are driven by the scheme
//! interpreter:
//!
//! - **Smoothing**: seven node-placement smoothers and the row smoother
//! - **Restructuring**: diagonal swaps and worst-element collapse
//! - **Rows**: necklace rings and corner tucks
//! - **Holes**: cutting hole loops out of a meshed region
//! - **Boundary flags**: resolving user flags onto boundary nodes and sides

pub mod boundary;
pub mod hole;
pub mod progress;
pub mod restructure;
pub mod row;
pub mod smooth;

pub use progress::{Progress, Step, StepDecision, StepHook};
