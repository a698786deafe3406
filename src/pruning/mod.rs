//! Application-state pruning and the run orchestrator.
//! - prune_set: pure selection of versions to delete
//! - pool: bounded per-partition pruning
//! - compaction: full-range compaction of the node databases
//! - orchestrator: `prune` and `compact` runs

pub mod prune_set;
pub mod outcome;
pub mod pool;
pub mod compaction;
pub mod orchestrator;

pub use prune_set::prune_set;
pub use outcome::FirstError;
pub use pool::{PartitionReport, PoolConfig, PoolReport, StorePruningPool};
pub use compaction::{compact_all, CompactionReport};
pub use orchestrator::{Databases, Orchestrator, RunConfig, RunReport};
