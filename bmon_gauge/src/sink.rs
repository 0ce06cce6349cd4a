//! Telemetry sink trait.
//!
//! Sinks own all formatting and presentation. The loop hands them
//! snapshots and cycle events; nothing flows back into estimation.

use bmon_common::types::{CycleCompleted, Sample, Snapshot};

pub mod jsonl;
pub mod log;

pub use jsonl::JsonlSink;
pub use log::LogSink;

/// Consumer side of the gauge loop.
///
/// `publish()` is throttled by the configured publish interval;
/// `cycle_completed()` is always delivered immediately. Sink failures
/// must be absorbed locally; a sink never aborts the sampling loop.
pub trait TelemetrySink: Send {
    /// Returns the sink's unique identifier (e.g., "log", "jsonl").
    fn name(&self) -> &'static str;

    /// Render one published tick for a battery.
    fn publish(&mut self, battery: &str, sample: &Sample, snapshot: &Snapshot);

    /// Render a cycle odometer advance for a battery.
    fn cycle_completed(&mut self, battery: &str, event: &CycleCompleted);
}
