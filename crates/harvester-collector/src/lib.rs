//! Metric collection for the harvester agent.
//!
//! Each [`Collector`] samples one category of host or process statistics
//! and returns them as gauges. The [`catalogue::Catalogue`] fixes the full
//! set of metric names at start-up and the [`table::MetricTable`] holds
//! their current values between report cycles.

pub mod catalogue;
pub mod cpu;
pub mod load;
pub mod memory;
pub mod process;
pub mod table;

use anyhow::Result;
use harvester_common::Metric;

pub use catalogue::Catalogue;
pub use table::MetricTable;

/// A source of gauges that runs on the agent host.
///
/// Collectors are owned by the poll worker and called once per poll
/// interval.
pub trait Collector: Send + Sync {
    /// Collector name (e.g. `"cpu"`), used for logging.
    fn name(&self) -> &str;

    /// Every gauge name this collector can report. Fixed for its lifetime.
    fn metric_names(&self) -> &'static [&'static str];

    /// Samples current values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn collect(&mut self) -> Result<Vec<Metric>>;
}
