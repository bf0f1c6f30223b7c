use crate::catalogue::Catalogue;
use harvester_common::{Metric, MetricKind, MetricValue};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Agent-side current values, keyed by name.
///
/// Seeded with a zero value for every catalogue entry; the key set never
/// changes afterwards. The poll worker writes through [`MetricTable::apply`]
/// and the report worker reads through [`MetricTable::snapshot`]; the lock
/// keeps a report from observing a half-applied poll.
#[derive(Debug)]
pub struct MetricTable {
    metrics: RwLock<BTreeMap<String, Metric>>,
}

fn zero(kind: MetricKind) -> MetricValue {
    match kind {
        MetricKind::Gauge => MetricValue::Gauge(0.0),
        MetricKind::Counter => MetricValue::Counter(0),
    }
}

impl MetricTable {
    pub fn from_catalogue(catalogue: &Catalogue) -> Self {
        let metrics = catalogue
            .entries()
            .iter()
            .map(|e| (e.name.to_string(), Metric::new(e.name, zero(e.kind))))
            .collect();
        Self {
            metrics: RwLock::new(metrics),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Metric>> {
        self.metrics.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Metric>> {
        self.metrics.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Applies one poll's updates under a single write lock. Names outside
    /// the catalogue, updates of the wrong kind, non-finite gauges and
    /// overflowing counters are ignored. Returns the number applied.
    pub fn apply(&self, updates: Vec<Metric>) -> usize {
        let mut metrics = self.write();
        let mut applied = 0;
        for update in updates {
            match metrics.get_mut(&update.id) {
                Some(current) if current.kind() == update.kind() => {
                    match update.validate().and_then(|()| current.update(update.value)) {
                        Ok(()) => applied += 1,
                        Err(e) => {
                            tracing::warn!(metric = %update.id, error = %e, "Ignoring invalid update")
                        }
                    }
                }
                Some(_) => tracing::warn!(metric = %update.id, "Ignoring update of the wrong kind"),
                None => tracing::debug!(metric = %update.id, "Ignoring metric outside the catalogue"),
            }
        }
        applied
    }

    /// Copies out every metric, sorted by name.
    pub fn snapshot(&self) -> Vec<Metric> {
        self.read().values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Metric> {
        self.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
