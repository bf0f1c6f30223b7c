use crate::Collector;
use anyhow::Result;
use harvester_common::Metric;
use sysinfo::System;

pub const CPU_UTILIZATION: &str = "CPUutilization1";

pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        // Usage is a delta between two refreshes; prime the first sample.
        system.refresh_cpu_usage();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn metric_names(&self) -> &'static [&'static str] {
        &[CPU_UTILIZATION]
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        self.system.refresh_cpu_usage();
        Ok(vec![Metric::gauge(
            CPU_UTILIZATION,
            self.system.global_cpu_usage() as f64,
        )])
    }
}
