//! Structured-log telemetry sink.
//!
//! Emits one tracing event per published tick, mirroring the serial line
//! a status display would render: voltage, current, SoC, charge totals
//! and the cycle odometer. Over-discharge is raised to WARN.

use tracing::{info, warn};

use bmon_common::types::{CycleCompleted, Sample, Snapshot};

use super::TelemetrySink;

/// Telemetry sink writing to the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    /// Create a log sink.
    pub fn new() -> Self {
        Self
    }
}

impl TelemetrySink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn publish(&mut self, battery: &str, sample: &Sample, snapshot: &Snapshot) {
        info!(
            battery,
            voltage_v = format_args!("{:.2}", sample.voltage_v),
            current_ma = format_args!("{:.0}", sample.current_ma),
            soc_percent = format_args!("{:.1}", snapshot.soc_percent_clamped),
            net_discharged_mah = format_args!("{:.1}", snapshot.net_discharged_mah),
            lifetime_discharged_mah = format_args!("{:.1}", snapshot.lifetime_discharged_mah),
            lifetime_recharged_mah = format_args!("{:.1}", snapshot.lifetime_recharged_mah),
            cycles = snapshot.full_cycle_count,
            "sample"
        );

        if snapshot.condition().has_critical() {
            warn!(
                battery,
                soc_percent_raw = format_args!("{:.1}", snapshot.soc_percent_raw),
                net_discharged_mah = format_args!("{:.1}", snapshot.net_discharged_mah),
                "over-discharge: deficit exceeds nominal capacity"
            );
        }
    }

    fn cycle_completed(&mut self, battery: &str, event: &CycleCompleted) {
        info!(
            battery,
            cycles = event.full_cycle_count,
            lifetime_discharged_mah = format_args!("{:.1}", event.lifetime_discharged_mah),
            "full cycle completed"
        );
    }
}
