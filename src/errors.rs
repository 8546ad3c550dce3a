use thiserror::Error;

/// Errors that can arise while loading, saving or resolving quest progress.
#[derive(Debug, Error)]
pub enum QuestsError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around JSON errors (quest definitions, JSON snapshots).
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around IO errors (directory creation, file locking, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when a quest, task or player is not known.
    #[error("not found: {0}")]
    NotFound(String),

    /// Returned when deserializing a snapshot with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Internal error (task join errors, unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure raised by a task type hook. Always isolated to the hook that raised it.
#[derive(Debug, Error)]
pub enum TaskTypeError {
    /// The hook needed data from a collaborator that could not provide it.
    #[error("{task_type}: value unavailable: {detail}")]
    Unavailable { task_type: String, detail: String },

    /// The task's config did not hold a value the hook relies on.
    #[error("{task_type}: bad config for task {task_id}: {detail}")]
    BadConfig {
        task_type: String,
        task_id: String,
        detail: String,
    },
}
