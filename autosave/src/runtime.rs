//! Process-wide transient state shared by every trigger.
//!
//! Nothing here is persisted. A fresh [`RuntimeState`] starts idle with no
//! timer armed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::scheduler::Scheduler;

#[derive(Debug, Default)]
pub struct RuntimeState {
    running: AtomicBool,
    scheduler: Mutex<Option<Scheduler>>,
}

/// Held for the duration of one cycle; clears the in-progress flag on drop.
#[derive(Debug)]
pub struct CycleGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

impl RuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the single cycle slot. `None` if a cycle is already running.
    pub fn try_begin(&self) -> Option<CycleGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard {
                running: &self.running,
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn scheduler_armed(&self) -> bool {
        self.scheduler_slot().is_some()
    }

    pub(crate) fn scheduler_slot(&self) -> MutexGuard<'_, Option<Scheduler>> {
        self.scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runtime view reported next to the persisted configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSnapshot {
    /// True while the scheduler timer is armed.
    pub enabled: bool,
    pub running: bool,
    pub every_minutes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn second_claim_is_rejected_until_release() {
        let state = RuntimeState::new();
        let guard = state.try_begin().expect("first claim");
        assert!(state.is_running());
        assert!(state.try_begin().is_none());
        drop(guard);
        assert!(!state.is_running());
        assert!(state.try_begin().is_some());
    }

    #[test]
    fn guard_is_released_by_a_panicking_cycle() {
        let state = RuntimeState::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = state.try_begin().expect("claim");
            panic!("cycle blew up");
        }));
        assert!(result.is_err());
        assert!(!state.is_running());
    }

    #[test]
    fn exactly_one_concurrent_claim_wins() {
        let state = Arc::new(RuntimeState::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let claimed = state.try_begin();
                    let won = claimed.is_some();
                    // Hold the claim until every thread has tried.
                    barrier.wait();
                    won
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snapshot = RuntimeSnapshot {
            enabled: true,
            running: false,
            every_minutes: 30,
        };
        assert_eq!(
            serde_json::to_value(snapshot).expect("json"),
            serde_json::json!({"enabled": true, "running": false, "everyMinutes": 30})
        );
    }
}
