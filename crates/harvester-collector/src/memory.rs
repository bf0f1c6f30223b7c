use crate::Collector;
use anyhow::Result;
use harvester_common::Metric;
use sysinfo::System;

pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn metric_names(&self) -> &'static [&'static str] {
        &[
            "TotalMemory",
            "FreeMemory",
            "AvailableMemory",
            "UsedMemory",
            "TotalSwap",
            "UsedSwap",
        ]
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        self.system.refresh_memory();
        let s = &self.system;
        Ok(vec![
            Metric::gauge("TotalMemory", s.total_memory() as f64),
            Metric::gauge("FreeMemory", s.free_memory() as f64),
            Metric::gauge("AvailableMemory", s.available_memory() as f64),
            Metric::gauge("UsedMemory", s.used_memory() as f64),
            Metric::gauge("TotalSwap", s.total_swap() as f64),
            Metric::gauge("UsedSwap", s.used_swap() as f64),
        ])
    }
}
