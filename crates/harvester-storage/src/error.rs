use std::time::Duration;

/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use harvester_storage::error::StorageError;
///
/// let err = StorageError::NotFound { id: "hits".to_string() };
/// assert!(err.to_string().contains("hits"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No metric is stored under the requested name.
    #[error("Storage: metric not found (id={id})")]
    NotFound { id: String },

    /// An underlying SeaORM / driver error. A failing batch has been rolled back.
    #[error("Storage: database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// The metric was rejected: a non-finite gauge or an overflowing
    /// counter. Nothing was written.
    #[error(transparent)]
    Metric(#[from] harvester_common::error::MetricError),

    /// A database operation exceeded the configured deadline.
    #[error("Storage: {op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// Snapshot serialization or deserialization failure.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot file I/O failure.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic storage error for cases not covered by other variants.
    #[error("Storage: {0}")]
    Other(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub fn is_rejected_metric(&self) -> bool {
        matches!(self, StorageError::Metric(_))
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
