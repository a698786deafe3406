pub mod versioned;
pub mod multistore;

pub use versioned::{StoreMounter, VersionedStore};
pub use multistore::{MultiStore, PartitionStore, RootRecord};
