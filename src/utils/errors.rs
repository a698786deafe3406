use thiserror::Error;

/// Unified error type for a pruning or compaction run.
///
/// Collaborators (storage engines, versioned store, history stores) return
/// `anyhow::Result`; their failures are folded into one of these variants at
/// the orchestrator seams, keeping the cause as text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrunerError {
    #[error("invalid pruning profile {0:?}")]
    InvalidProfile(String),

    #[error("pruning profile {profile:?} requires --{field} to be set explicitly")]
    MissingOverride { profile: String, field: &'static str },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot access store {store}: {cause}")]
    StoreAccess { store: String, cause: String },

    #[error("min-retain-blocks {min_retain_blocks} is lower than the minimum {floor}")]
    RetentionTooLow { min_retain_blocks: u64, floor: u64 },

    #[error("pruning partition {partition} failed: {cause}")]
    PruneFailed { partition: String, cause: String },

    #[error("history pruning failed while pruning {stage}: {cause}")]
    HistoryPrune { stage: &'static str, cause: String },

    #[error("compacting {store} failed: {cause}")]
    Compaction { store: String, cause: String },

    #[error("run cancelled")]
    Cancelled,
}

impl PrunerError {
    /// True for errors raised before any database was touched.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            PrunerError::InvalidProfile(_) | PrunerError::MissingOverride { .. } | PrunerError::Config(_)
        )
    }

    pub fn store_access(store: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        PrunerError::StoreAccess { store: store.into(), cause: format!("{cause:#}") }
    }
}

/// Raised inside collaborators when the run's cancellation token fires
/// between two batches. Mapped to `PrunerError::Cancelled`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("interrupted by cancellation")]
pub struct Interrupted;

/// Map a collaborator error, turning `Interrupted` into `Cancelled`.
pub fn classify(err: anyhow::Error, other: impl FnOnce(String) -> PrunerError) -> PrunerError {
    if err.downcast_ref::<Interrupted>().is_some() {
        PrunerError::Cancelled
    } else {
        other(format!("{err:#}"))
    }
}

/// Convenience alias
pub type Result<T> = std::result::Result<T, PrunerError>;
