//! Retention policy: named profiles and the partition list they apply to.

pub mod profile;
pub mod partitions;

pub use profile::{
    resolve_profile, RetentionOverrides, RetentionProfile, CUSTOM_PROFILE, DEFAULT_PROFILE,
    MIN_RETAIN_BLOCKS_FLOOR,
};
pub use partitions::{resolve_partitions, PartitionKey, CORE_PARTITIONS};
