//! Sample source trait and source construction.
//!
//! A sample source is the pluggable producer side of the gauge: it hands
//! the loop one `(current, voltage)` measurement per tick. Sources are
//! selected by name from configuration, so simulation and future hardware
//! backends stay swappable without touching the estimator.

use std::time::Duration;

use bmon_common::config::{BatteryConfig, ConfigError};
use bmon_common::types::Sample;

pub mod scripted;
pub mod simulated;

pub use scripted::ScriptedSource;
pub use simulated::SimulatedSource;

/// Interface for pluggable sample producers.
///
/// # Lifecycle
/// `next_sample()` is called exactly once per loop tick with the measured
/// elapsed time since the previous tick. Implementations must not block:
/// the call happens inside the sampling loop's time budget.
pub trait SampleSource: Send {
    /// Returns the source's unique identifier (e.g., "simulated").
    fn name(&self) -> &'static str;

    /// Produce the measurement for this tick.
    ///
    /// `dt` is the elapsed time since the previous tick, for sources that
    /// model internal state continuously. Scripted sources may ignore it.
    fn next_sample(&mut self, dt: Duration) -> Sample;
}

/// Build the sample source configured for a battery.
///
/// Source kinds map to implementations by name; unknown kinds are a
/// configuration error (normally caught by config validation already).
pub fn build_source(battery: &BatteryConfig) -> Result<Box<dyn SampleSource>, ConfigError> {
    match battery.source.kind.as_str() {
        "simulated" => Ok(Box::new(SimulatedSource::new(
            battery.capacity_mah,
            battery.source.knob,
        ))),
        "scripted" => Ok(Box::new(ScriptedSource::new(battery.source.phases.clone()))),
        other => Err(ConfigError::ValidationError(format!(
            "unknown source kind '{other}'"
        ))),
    }
}
