//! Crate-level tests.
//!
//! - Integration tests (on-disk home directory, prune and compact end to end)
//! - Fuzz tests (config file parsing, prune-set selection)

pub mod integration;
pub mod fuzz;
