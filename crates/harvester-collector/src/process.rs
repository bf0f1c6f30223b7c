use crate::Collector;
use anyhow::{anyhow, Result};
use harvester_common::Metric;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Statistics of the agent's own process: the runtime-level view of
/// allocation and scheduling.
pub struct ProcessCollector {
    system: System,
    pid: Pid,
}

impl ProcessCollector {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| anyhow!("current pid: {e}"))?;
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        Ok(Self { system, pid })
    }
}

impl Collector for ProcessCollector {
    fn name(&self) -> &str {
        "process"
    }

    fn metric_names(&self) -> &'static [&'static str] {
        &[
            "ProcessResidentMemory",
            "ProcessVirtualMemory",
            "ProcessCPU",
            "ProcessRunTime",
            "ProcessDiskRead",
            "ProcessDiskWritten",
        ]
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        let process = self
            .system
            .process(self.pid)
            .ok_or_else(|| anyhow!("process {} not found", self.pid))?;
        let disk = process.disk_usage();
        Ok(vec![
            Metric::gauge("ProcessResidentMemory", process.memory() as f64),
            Metric::gauge("ProcessVirtualMemory", process.virtual_memory() as f64),
            Metric::gauge("ProcessCPU", process.cpu_usage() as f64),
            Metric::gauge("ProcessRunTime", process.run_time() as f64),
            Metric::gauge("ProcessDiskRead", disk.total_read_bytes as f64),
            Metric::gauge("ProcessDiskWritten", disk.total_written_bytes as f64),
        ])
    }
}
