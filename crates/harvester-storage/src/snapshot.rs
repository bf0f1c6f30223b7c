use crate::error::Result;
use crate::StorageEngine;
use harvester_common::Metric;
use std::path::{Path, PathBuf};

/// Whole-repository snapshot stored as a pretty-printed JSON array of
/// metrics. Every write replaces the file; there is no append format.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the file (and its directory) holding an empty array when it
    /// does not exist yet.
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, "[]")?;
        tracing::info!(path = %self.path.display(), "Created empty snapshot file");
        Ok(())
    }

    /// Reads the snapshot. A blank file is an empty snapshot.
    pub fn load(&self) -> Result<Vec<Metric>> {
        let raw = std::fs::read(&self.path)?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Replaces the snapshot with `metrics`, writing a sibling temp file
    /// first so readers never observe a partial array.
    pub fn store(&self, metrics: &[Metric]) -> Result<()> {
        let json = serde_json::to_vec_pretty(metrics)?;
        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Serializes the full contents of `engine`. Returns the metric count.
    pub async fn save_from(&self, engine: &dyn StorageEngine) -> Result<usize> {
        let metrics = engine.get_all_metrics().await?;
        self.store(&metrics)?;
        tracing::debug!(count = metrics.len(), path = %self.path.display(), "Snapshot written");
        Ok(metrics.len())
    }

    /// Loads the snapshot into `engine` as one batch. Returns the metric count.
    pub async fn restore_into(&self, engine: &dyn StorageEngine) -> Result<usize> {
        let metrics = self.load()?;
        engine.put_batch(&metrics).await?;
        tracing::info!(count = metrics.len(), path = %self.path.display(), "Restored metrics from snapshot");
        Ok(metrics.len())
    }
}
