/// Failure of the durable store. Callers abort the enclosing cycle on this;
/// it is never swallowed on a write path.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: i64, reason: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Initialization error: {0}")]
    Init(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
