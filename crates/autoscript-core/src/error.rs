use autoscript_types::ValidationError;

/// Synchronous, programming-level preconditions the runner enforces before any
/// attempt is made. Domain-level outcomes (timeouts, validation failures,
/// recovery results) are carried as plain result codes on `ExecutorOutcome`
/// instead — see `contracts.rs` — because they are facts an external
/// collaborator reported, not failures of this crate's own invariants.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("runner is already active")]
    AlreadyActive,

    #[error("script is missing a profileId")]
    MissingProfileId,

    #[error("script failed static validation: {0:?}")]
    ValidationFailed(Vec<ValidationError>),

    #[error("configuration error: {0}")]
    Config(#[source] anyhow::Error),

    #[error("snapshot restore failed: {0}")]
    SnapshotRestore(String),
}
