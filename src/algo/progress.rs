//! Progress reporting and step control for long-running meshing.
//!
//! [`Progress`] receives `(current, total, message)` updates, for example one
//! per region of a batch. [`StepHook`] is consulted by the scheme interpreter
//! between commands and may stop the run, the headless counterpart of an
//! interactive step mode.
//!
//! # Example
//!
//! ```
//! use quadpave::algo::progress::{Progress, StepDecision, StepHook};
//!
//! let progress = Progress::new(|current, total, message| {
//!     eprintln!("[{}/{}] {}", current, total, message);
//! });
//! progress.report(0, 2, "region 1");
//!
//! // stop after the third command
//! let hook = StepHook::new(|step| {
//!     if step.index >= 3 { StepDecision::Quit } else { StepDecision::Continue }
//! });
//! ```

use crate::scheme::Command;

/// A progress callback that receives updates during long-running operations.
///
/// The callback receives:
/// - `current`: Current step (0-based)
/// - `total`: Total number of steps
/// - `message`: Description of the current operation
pub struct Progress {
    callback: Box<dyn Fn(usize, usize, &str) + Send + Sync>,
}

impl Progress {
    /// Create a new progress reporter with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Report progress.
    #[inline]
    pub fn report(&self, current: usize, total: usize, message: &str) {
        (self.callback)(current, total, message);
    }

    /// Create a no-op progress reporter that discards all updates.
    pub fn none() -> Self {
        Self::new(|_, _, _| {})
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

/// What to do after a scheme step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    /// Run the next command.
    Continue,
    /// Abandon the region.
    Quit,
    /// Restore the original mesh and start over with the default scheme.
    Over,
}

/// A command the interpreter is about to run.
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    /// Zero-based count of commands run so far in this region.
    pub index: usize,
    /// The region being meshed.
    pub region: u32,
    /// The next command.
    pub command: &'a Command,
}

/// Callback consulted before every scheme command.
pub struct StepHook {
    callback: Box<dyn Fn(&Step<'_>) -> StepDecision + Send + Sync>,
}

impl StepHook {
    /// Create a hook from a closure.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Step<'_>) -> StepDecision + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Ask the hook about the next step.
    #[inline]
    pub fn decide(&self, step: &Step<'_>) -> StepDecision {
        (self.callback)(step)
    }

    /// A hook that always continues (batch mode).
    pub fn batch() -> Self {
        Self::new(|_| StepDecision::Continue)
    }
}

impl Default for StepHook {
    fn default() -> Self {
        Self::batch()
    }
}

impl std::fmt::Debug for StepHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepHook").finish_non_exhaustive()
    }
}
