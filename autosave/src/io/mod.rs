//! I/O adapters used by autosave cycles.

pub mod agent;
pub mod git;
pub mod process;
pub mod prompt;
pub mod settings;
pub mod store;
