//! Deterministic, pure logic for the autosave orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! values (JSON documents, porcelain text, agent output) and return
//! deterministic results suitable for tests.

pub mod changes;
pub mod commit_message;
pub mod config;
pub mod json_region;
pub mod legacy;
pub mod roster;
pub mod text;
