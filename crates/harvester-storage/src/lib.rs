//! Server-side metric repository.
//!
//! Two interchangeable [`StorageEngine`] backends are provided: the
//! lock-guarded [`memory::MemStorage`] and the SeaORM-backed
//! [`engine::SqlStorageEngine`] (SQLite or PostgreSQL). The in-memory backend
//! is made durable by the [`snapshot::SnapshotFile`] sidecar.

pub mod engine;
pub mod error;
pub mod memory;
pub mod snapshot;


use async_trait::async_trait;
use error::{Result, StorageError};
use harvester_common::Metric;
use std::sync::Arc;
use std::time::Duration;

pub use engine::SqlStorageEngine;
pub use memory::MemStorage;
pub use snapshot::SnapshotFile;

/// Persistence backend for metrics.
///
/// Implementations must be safe to share across threads (`Send + Sync`)
/// because every inbound request handler and the snapshot worker use the
/// same instance concurrently.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Inserts or merges one metric and returns the value now stored.
    async fn put_metric(&self, metric: Metric) -> Result<Metric>;

    /// Applies every metric in order as one atomic unit. On failure nothing
    /// from the batch is visible.
    async fn put_batch(&self, metrics: &[Metric]) -> Result<()>;

    /// Looks up a metric by name; a missing name is [`StorageError::NotFound`].
    async fn get_metric(&self, id: &str) -> Result<Metric>;

    /// Returns every stored metric sorted by name ascending.
    async fn get_all_metrics(&self) -> Result<Vec<Metric>>;

    /// Releases backend resources. Call once, at shutdown.
    async fn close(&self) -> Result<()>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Whether [`StorageEngine::ping`] reaches a real database.
    fn supports_ping(&self) -> bool {
        false
    }

    async fn ping(&self) -> Result<()> {
        Err(StorageError::Other("the database is not in use".to_string()))
    }

    /// Durable backends keep their data across restarts on their own and are
    /// never restored from a snapshot.
    fn is_durable(&self) -> bool {
        false
    }
}

/// Opens the backend selected by configuration: the SQL engine when a DSN is
/// given, the in-memory map otherwise.
pub async fn open(dsn: Option<&str>, timeout: Duration) -> Result<Arc<dyn StorageEngine>> {
    match dsn {
        Some(dsn) => Ok(Arc::new(SqlStorageEngine::connect(dsn, timeout).await?)),
        None => Ok(Arc::new(MemStorage::new())),
    }
}
