//! The scheme language.
//!
//! A region's scheme string starts with an optional shape letter (see
//! [`parse_scheme`](crate::region::parse_scheme)) followed by one-letter
//! commands:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `A` | area-pull weight ±0.1, within `[0, 1]` |
//! | `D` | squash the element with the worst angle tilt |
//! | `E` | exit, keeping the mesh |
//! | `F` | relaxation ±0.25, at least 0.25 |
//! | `I` | smoothing sweep cap ×/÷ 1.5 |
//! | `J` | convergence tolerance ×/÷ 1.2599921 |
//! | `N` | add a necklace |
//! | `O` | start over with the default scheme |
//! | `Q` | quit the region |
//! | `R` | restructure sweep |
//! | `S` | smooth with the selected kind |
//! | `T` | add tucks at the widest boundary corner |
//! | `V` | squash angle ±2.5°, within `[10°, 80°]` |
//! | `W` | restructure the worst element |
//! | `Y` | isoparametric weight ±0.1, at least 0.1 |
//! | `Z` | cut the next hole |
//! | `1`–`7` | select the smoother |
//!
//! `+` and `-` set the direction of the next parameter command, and
//! `( ... )` repeats its commands while they keep changing the mesh.
//!
//! # Example
//!
//! ```
//! use quadpave::scheme::{parse_commands, Command};
//!
//! let commands = parse_commands("(RS)-F");
//! assert_eq!(commands.len(), 2);
//! assert!(matches!(commands[0], Command::Group(_)));
//! ```

pub mod command;
pub mod interpreter;
pub mod params;

pub use command::{parse_commands, Command, Direction};
pub use interpreter::{run_scheme, CommandCounts, Diagnostic, SchemeOutcome, SchemeReport};
pub use params::SchemeParams;
