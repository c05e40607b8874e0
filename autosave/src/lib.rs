//! Git autosave orchestrator.
//!
//! Periodically or on demand, detects uncommitted changes in one working
//! tree, asks a two-member agent roster how to describe them, commits under
//! the active member's identity, pushes, and records the outcome of the most
//! recent run.
//!
//! - **[`core`]**: Pure, deterministic logic (normalization, commit subjects,
//!   porcelain parsing, JSON extraction). No I/O.
//! - **[`io`]**: Side-effecting adapters (store, settings, git, agent CLI,
//!   subprocesses), kept behind traits where tests substitute fakes.
//!
//! Orchestration modules ([`consult`], [`cycle`], [`scheduler`],
//! [`orchestrator`]) combine the two into the autosave service.

pub mod consult;
pub mod core;
pub mod cycle;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod runtime;
pub mod scheduler;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
