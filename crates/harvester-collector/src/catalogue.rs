use crate::cpu::CpuCollector;
use crate::load::LoadCollector;
use crate::memory::MemoryCollector;
use crate::process::ProcessCollector;
use crate::Collector;
use harvester_common::{Metric, MetricKind};
use std::collections::BTreeMap;

/// Counter incremented by one on every poll cycle.
pub const POLL_COUNT: &str = "PollCount";

/// Uniform random gauge in `[0, 1)`, refreshed every poll.
pub const RANDOM_VALUE: &str = "RandomValue";

/// One polled metric: its name and kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogueEntry {
    pub name: &'static str,
    pub kind: MetricKind,
}

/// The immutable set of metrics the agent polls, together with the
/// collectors that produce them. Built once at start-up.
pub struct Catalogue {
    collectors: Vec<Box<dyn Collector>>,
    entries: Vec<CatalogueEntry>,
}

impl Catalogue {
    pub fn new(collectors: Vec<Box<dyn Collector>>) -> Self {
        let mut entries = BTreeMap::new();
        for collector in &collectors {
            for &name in collector.metric_names() {
                entries.insert(name, MetricKind::Gauge);
            }
        }
        entries.insert(RANDOM_VALUE, MetricKind::Gauge);
        entries.insert(POLL_COUNT, MetricKind::Counter);

        Self {
            collectors,
            entries: entries
                .into_iter()
                .map(|(name, kind)| CatalogueEntry { name, kind })
                .collect(),
        }
    }

    /// Host, load and process collectors. A process collector that cannot
    /// resolve the current pid is left out.
    pub fn standard() -> Self {
        let mut collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(CpuCollector::new()),
            Box::new(MemoryCollector::new()),
            Box::new(LoadCollector::new()),
        ];
        match ProcessCollector::new() {
            Ok(process) => collectors.push(Box::new(process)),
            Err(e) => tracing::warn!(error = %e, "Process metrics disabled"),
        }
        Self::new(collectors)
    }

    /// Entries sorted by name.
    pub fn entries(&self) -> &[CatalogueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs every collector once and returns the resulting updates,
    /// including the random gauge and a `PollCount` increment of one. A
    /// failing collector is logged and skipped for this cycle.
    pub fn poll(&mut self) -> Vec<Metric> {
        let mut updates = Vec::with_capacity(self.entries.len());
        for collector in &mut self.collectors {
            match collector.collect() {
                Ok(metrics) => updates.extend(metrics),
                Err(e) => {
                    tracing::warn!(collector = collector.name(), error = %e, "Collection failed")
                }
            }
        }
        updates.push(Metric::gauge(RANDOM_VALUE, rand::random::<f64>()));
        updates.push(Metric::counter(POLL_COUNT, 1));
        updates
    }
}
