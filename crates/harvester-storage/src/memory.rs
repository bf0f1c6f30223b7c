use crate::error::{Result, StorageError};
use crate::StorageEngine;
use async_trait::async_trait;
use harvester_common::metric::merge;
use harvester_common::Metric;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory repository: one map behind one reader/writer lock.
#[derive(Debug, Default)]
pub struct MemStorage {
    metrics: RwLock<HashMap<String, Metric>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Metric>> {
        self.metrics.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Metric>> {
        self.metrics.write().unwrap_or_else(|p| p.into_inner())
    }

    fn apply(map: &mut HashMap<String, Metric>, incoming: Metric) -> Result<Metric> {
        let merged = merge(map.get(&incoming.id).cloned(), incoming)?;
        map.insert(merged.id.clone(), merged.clone());
        Ok(merged)
    }
}

#[async_trait]
impl StorageEngine for MemStorage {
    async fn put_metric(&self, metric: Metric) -> Result<Metric> {
        Self::apply(&mut self.write(), metric)
    }

    // Merges into a staging map first so a rejected metric leaves the
    // store untouched.
    async fn put_batch(&self, metrics: &[Metric]) -> Result<()> {
        let mut map = self.write();
        let mut staged: HashMap<String, Metric> = HashMap::new();
        for metric in metrics {
            if !staged.contains_key(&metric.id) {
                if let Some(stored) = map.get(&metric.id) {
                    staged.insert(metric.id.clone(), stored.clone());
                }
            }
            Self::apply(&mut staged, metric.clone())?;
        }
        map.extend(staged);
        Ok(())
    }

    async fn get_metric(&self, id: &str) -> Result<Metric> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })
    }

    async fn get_all_metrics(&self) -> Result<Vec<Metric>> {
        let mut all: Vec<Metric> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
