//! Offline pruner for a stopped node's history.
//!
//! Deletes old versions of the application store's module partitions and old
//! blocks and consensus state below a retention window, then compacts the
//! databases on disk.

pub mod cli;
pub mod ledger;
pub mod policy;
pub mod pruning;
pub mod state;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod tests;
