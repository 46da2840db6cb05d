//! Scheme execution.
//!
//! Commands run left to right against a [`RegionMeshingSession`]. A group
//! repeats while one of its commands changed the mesh (a restructure made a
//! swap, a squash removed an element, a tuck or hole was added), up to the
//! configured number of passes. Problems that do not invalidate the mesh are
//! collected as [`Diagnostic`]s; errors that do are returned.

use std::fmt;

use tracing::{debug, info, warn};

use super::command::Command;
use crate::algo::hole::cut_hole;
use crate::algo::progress::{Step, StepDecision, StepHook};
use crate::algo::restructure::{resta, squash};
use crate::algo::row::{add_necklace, add_tucks, tuck_candidate};
use crate::algo::smooth::{smooth, SmoothingKind};
use crate::error::{MeshError, Result};
use crate::mesh::MeshIndex;
use crate::session::RegionMeshingSession;

/// How a scheme run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeOutcome {
    /// Completed or stopped by `E`; keep the mesh and the scheme.
    Exit,
    /// `O`: discard the mesh and start again with the default scheme.
    Over,
    /// `Q`: abandon the region.
    Quit,
}

/// A non-fatal problem met while running a scheme.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// An unknown command character was skipped.
    IllegalCommand(char),
    /// A smoother reached its sweep cap.
    NotConverging {
        /// The smoother.
        kind: SmoothingKind,
        /// Sweeps made.
        iterations: usize,
    },
    /// A hole of unsupported dimension was skipped.
    HoleNotImplemented {
        /// The hole id.
        hole: u32,
    },
    /// `Z` was run with no holes left.
    HolesExhausted,
    /// The scheme ended with this hole still uncut, so it was cut then.
    HoleCutAtExit {
        /// The hole id.
        hole: u32,
    },
    /// A group was still changing the mesh after its last allowed pass.
    LoopLimit {
        /// Passes made.
        passes: usize,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::IllegalCommand(c) => write!(f, "illegal scheme command '{}'", c),
            Diagnostic::NotConverging { kind, iterations } => {
                write!(f, "smoother {:?} not converging after {} sweeps", kind, iterations)
            }
            Diagnostic::HoleNotImplemented { hole } => {
                write!(f, "hole {} skipped: only 1-D hole loops are implemented", hole)
            }
            Diagnostic::HolesExhausted => f.write_str("no holes left to process"),
            Diagnostic::HoleCutAtExit { hole } => {
                write!(f, "hole {} was not cut by the scheme; cut at exit", hole)
            }
            Diagnostic::LoopLimit { passes } => write!(f, "loop stopped after {} passes", passes),
        }
    }
}

/// How often each kind of mesh change happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandCounts {
    /// Commands executed, not counting groups.
    pub commands: usize,
    /// Smoothing runs.
    pub smooths: usize,
    /// Diagonal swaps.
    pub swaps: usize,
    /// Elements squashed.
    pub deletions: usize,
    /// Necklaces added.
    pub necklaces: usize,
    /// Elements added by tucks.
    pub tucks: usize,
    /// Holes cut.
    pub holes: usize,
}

/// Result of a scheme run.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeReport {
    /// How the run ended.
    pub outcome: SchemeOutcome,
    /// What the run did.
    pub counts: CommandCounts,
    /// Non-fatal problems, in the order met.
    pub diagnostics: Vec<Diagnostic>,
}

enum Flow {
    Continue { active: bool },
    Stop(SchemeOutcome),
}

struct Interpreter<'a, I: MeshIndex> {
    session: &'a mut RegionMeshingSession<I>,
    hook: &'a StepHook,
    max_passes: usize,
    counts: CommandCounts,
    diagnostics: Vec<Diagnostic>,
}

impl<I: MeshIndex> Interpreter<'_, I> {
    fn diagnose(&mut self, d: Diagnostic) {
        warn!("region {}: {}", self.session.region_id, d);
        self.diagnostics.push(d);
    }

    /// Cut the next hole; returns whether one was cut.
    fn cut_next_hole(&mut self) -> Result<bool> {
        let s = &mut *self.session;
        let Some(hole) = s.take_hole() else {
            self.diagnose(Diagnostic::HolesExhausted);
            return Ok(false);
        };
        match cut_hole(&mut s.mesh, &hole, &s.perimeter) {
            Ok(cut) => {
                s.perimeter = cut.perimeter;
                self.counts.holes += 1;
                Ok(true)
            }
            Err(MeshError::NotImplemented(_)) => {
                self.diagnose(Diagnostic::HoleNotImplemented { hole: hole.id });
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn run_list(&mut self, commands: &[Command]) -> Result<Flow> {
        let mut active = false;
        for command in commands {
            match self.run(command)? {
                Flow::Continue { active: a } => active |= a,
                stop => return Ok(stop),
            }
        }
        Ok(Flow::Continue { active })
    }

    fn run_group(&mut self, inner: &[Command]) -> Result<Flow> {
        let repeatable = inner.iter().any(Command::can_be_active);
        let mut any = false;
        let mut passes = 0;
        loop {
            passes += 1;
            let active = match self.run_list(inner)? {
                Flow::Continue { active } => active,
                stop => return Ok(stop),
            };
            any |= active;
            if !active || !repeatable {
                break;
            }
            if passes >= self.max_passes {
                self.diagnose(Diagnostic::LoopLimit { passes });
                break;
            }
        }
        debug!("region {}: group finished after {} passes", self.session.region_id, passes);
        Ok(Flow::Continue { active: any })
    }

    fn run(&mut self, command: &Command) -> Result<Flow> {
        if let Command::Group(inner) = command {
            return self.run_group(inner);
        }
        let step = Step {
            index: self.counts.commands,
            region: self.session.region_id,
            command,
        };
        match self.hook.decide(&step) {
            StepDecision::Continue => {}
            StepDecision::Quit => return Ok(Flow::Stop(SchemeOutcome::Quit)),
            StepDecision::Over => return Ok(Flow::Stop(SchemeOutcome::Over)),
        }
        self.counts.commands += 1;

        let s = &mut *self.session;
        let mut active = false;
        match command {
            Command::AreaPull(d) => s.params.adjust_area_pull(*d),
            Command::Relaxation(d) => s.params.adjust_relaxation(*d),
            Command::Iterations(d) => s.params.adjust_iterations(*d),
            Command::Tolerance(d) => s.params.adjust_tolerance(*d),
            Command::SmallAngle(d) => s.params.adjust_small_angle(*d),
            Command::IsoWeight(d) => s.params.adjust_iso_weight(*d),
            Command::Select(kind) => s.params.kind = *kind,
            Command::Exit => return Ok(Flow::Stop(SchemeOutcome::Exit)),
            Command::Original => return Ok(Flow::Stop(SchemeOutcome::Over)),
            Command::Quit => return Ok(Flow::Stop(SchemeOutcome::Quit)),
            Command::Smooth => {
                let report = smooth(&mut s.mesh, &s.params.smooth_options());
                self.counts.smooths += 1;
                if !report.converged {
                    let kind = s.params.kind;
                    self.diagnose(Diagnostic::NotConverging {
                        kind,
                        iterations: report.iterations,
                    });
                }
            }
            Command::Restructure => {
                let swaps = resta(&mut s.mesh, usize::MAX)?;
                self.counts.swaps += swaps;
                active = swaps > 0;
            }
            Command::RestructureWorst => {
                let swaps = resta(&mut s.mesh, 1)?;
                self.counts.swaps += swaps;
                active = swaps > 0;
            }
            Command::Delete => {
                active = squash(&mut s.mesh, s.params.small_angle_radians())?;
                self.counts.deletions += usize::from(active);
            }
            Command::Necklace => {
                add_necklace(&mut s.mesh, &s.params.smooth_options())?;
                self.counts.necklaces += 1;
            }
            Command::Tuck => {
                if let Some(node) = tuck_candidate(&s.mesh) {
                    let added = add_tucks(&mut s.mesh, node, s.params.small_angle_radians())?;
                    self.counts.tucks += added;
                    active = added > 0;
                }
            }
            Command::Hole => active = self.cut_next_hole()?,
            Command::Illegal(c) => self.diagnose(Diagnostic::IllegalCommand(*c)),
            Command::Group(_) => {}
        }
        Ok(Flow::Continue { active })
    }
}

/// Run `commands` against a session.
///
/// `hook` is consulted before every command and may stop the run. A run
/// that ends with [`SchemeOutcome::Exit`] cuts every hole the scheme left
/// uncut, each noted as [`Diagnostic::HoleCutAtExit`], so the kept mesh never
/// covers a hole. Capacity exhaustion and topology errors are returned; the
/// session's mesh is then in an unspecified state and the region must be
/// restarted.
pub fn run_scheme<I: MeshIndex>(
    session: &mut RegionMeshingSession<I>,
    commands: &[Command],
    hook: &StepHook,
    max_loop_passes: usize,
) -> Result<SchemeReport> {
    let mut interp = Interpreter {
        session,
        hook,
        max_passes: max_loop_passes.max(1),
        counts: CommandCounts::default(),
        diagnostics: Vec::new(),
    };
    let outcome = match interp.run_list(commands)? {
        Flow::Continue { .. } => SchemeOutcome::Exit,
        Flow::Stop(outcome) => outcome,
    };
    if outcome == SchemeOutcome::Exit {
        while let Some(hole) = interp.session.holes.get(interp.session.next_hole).map(|h| h.id) {
            interp.diagnose(Diagnostic::HoleCutAtExit { hole });
            interp.cut_next_hole()?;
        }
    }
    info!(
        "region {}: scheme ended with {:?} after {} commands",
        interp.session.region_id, outcome, interp.counts.commands
    );
    Ok(SchemeReport {
        outcome,
        counts: interp.counts,
        diagnostics: interp.diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshingConfig;
    use crate::mesh::Capacity;
    use crate::region::{check_region, Hole, Perimeter, Region, Shape};
    use crate::scheme::parse_commands;
    use nalgebra::Point2;

    fn square(size: f64, intervals: usize) -> Region {
        let p = Perimeter::builder(1, Point2::new(0.0, 0.0))
            .line(1, 2, Point2::new(size, 0.0), intervals)
            .line(2, 3, Point2::new(size, size), intervals)
            .line(3, 4, Point2::new(0.0, size), intervals)
            .close(4, intervals);
        Region::new(1, p)
    }

    fn session(size: f64, intervals: usize) -> RegionMeshingSession {
        start(&square(size, intervals), intervals)
    }

    fn holed_session(size: f64, intervals: usize) -> RegionMeshingSession {
        let hole = Perimeter::builder(11, Point2::new(1.2, 1.2))
            .line(11, 12, Point2::new(2.8, 1.2), 1)
            .line(12, 13, Point2::new(2.8, 2.8), 1)
            .line(13, 14, Point2::new(1.2, 2.8), 1)
            .close(14, 1);
        let region = square(size, intervals).with_hole(Hole {
            id: 5,
            dimension: 1,
            perimeter: hole,
        });
        start(&region, intervals)
    }

    fn start(region: &Region, intervals: usize) -> RegionMeshingSession {
        let checked = check_region(region).unwrap();
        RegionMeshingSession::start(
            &checked,
            Shape::Rectangle,
            &MeshingConfig::default(),
            Capacity::estimate(8 * intervals),
        )
        .unwrap()
    }

    fn run(s: &mut RegionMeshingSession, text: &str) -> SchemeReport {
        run_scheme(s, &parse_commands(text), &StepHook::batch(), 25).unwrap()
    }

    #[test]
    fn test_parameters_and_exit() {
        let mut s = session(4.0, 4);
        let report = run(&mut s, "-F-F+A6 E S");
        assert_eq!(report.outcome, SchemeOutcome::Exit);
        assert_eq!(s.params.relaxation, 0.5);
        assert!((s.params.area_pull - 0.6).abs() < 1e-12);
        assert_eq!(s.params.kind, SmoothingKind::LengthWeighted);
        // nothing after E ran
        assert_eq!(report.counts.smooths, 0);
        assert_eq!(report.counts.commands, 5);
    }

    #[test]
    fn test_outcomes() {
        let mut s = session(4.0, 4);
        assert_eq!(run(&mut s, "SQ").outcome, SchemeOutcome::Quit);
        assert_eq!(run(&mut s, "O").outcome, SchemeOutcome::Over);
        assert_eq!(run(&mut s, "S").outcome, SchemeOutcome::Exit);
    }

    #[test]
    fn test_illegal_commands_are_skipped() {
        let mut s = session(4.0, 4);
        let report = run(&mut s, "X5S");
        assert_eq!(report.outcome, SchemeOutcome::Exit);
        assert_eq!(report.diagnostics, vec![Diagnostic::IllegalCommand('X')]);
        assert_eq!(report.counts.smooths, 1);
    }

    #[test]
    fn test_holes_then_exhausted() {
        let mut s = holed_session(4.0, 4);
        let report = run(&mut s, "ZZ");
        assert_eq!(report.counts.holes, 1);
        assert_eq!(report.diagnostics, vec![Diagnostic::HolesExhausted]);
        assert_eq!(s.mesh.num_elements(), 12);
        assert_eq!(s.mesh.boundary_loops().unwrap().len(), 2);
    }

    #[test]
    fn test_uncut_hole_is_cut_at_exit() {
        let mut s = holed_session(4.0, 4);
        let report = run(&mut s, "S");
        assert_eq!(report.outcome, SchemeOutcome::Exit);
        assert_eq!(report.diagnostics, vec![Diagnostic::HoleCutAtExit { hole: 5 }]);
        assert_eq!(report.counts.holes, 1);
        assert_eq!(s.mesh.num_elements(), 12);
        assert_eq!(s.mesh.boundary_loops().unwrap().len(), 2);

        // a run that quits leaves the hole alone
        let mut s = holed_session(4.0, 4);
        let report = run(&mut s, "SQ");
        assert_eq!(report.counts.holes, 0);
        assert_eq!(s.mesh.num_elements(), 16);
    }

    #[test]
    fn test_group_stops_when_idle() {
        let mut s = session(4.0, 4);
        // a regular grid has nothing to restructure: one pass
        let report = run(&mut s, "(RW)");
        assert_eq!(report.counts.swaps, 0);
        assert_eq!(report.counts.commands, 2);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_hook_can_quit() {
        let mut s = session(4.0, 4);
        let hook = StepHook::new(|step| {
            if step.index >= 2 {
                StepDecision::Quit
            } else {
                StepDecision::Continue
            }
        });
        let report = run_scheme(&mut s, &parse_commands("SSSS"), &hook, 25).unwrap();
        assert_eq!(report.outcome, SchemeOutcome::Quit);
        assert_eq!(report.counts.smooths, 2);
    }

    #[test]
    fn test_necklace_command() {
        let mut s = session(4.0, 4);
        let report = run(&mut s, "N");
        assert_eq!(report.counts.necklaces, 1);
        assert_eq!(s.mesh.num_elements(), 16 + 16);
        assert!(s.mesh.is_valid());
    }
}
