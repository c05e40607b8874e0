//! Stable exit codes for `autosave` CLI commands.

use crate::cycle::CycleOutcome;

/// Command succeeded; for `run`/`tick`, changes were pushed.
pub const OK: i32 = 0;
/// Command failed (bad settings, unreadable store, failed cycle).
pub const FAILED: i32 = 1;
/// The cycle was skipped: disabled, nothing to commit, or already running.
pub const SKIPPED: i32 = 2;

pub fn for_outcome(outcome: &CycleOutcome) -> i32 {
    match (outcome.ok, outcome.skipped) {
        (_, true) => SKIPPED,
        (true, false) => OK,
        (false, false) => FAILED,
    }
}
