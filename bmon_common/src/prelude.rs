//! Prelude module for common re-exports.
//!
//! Consumers can do `use bmon_common::prelude::*;` and get the most
//! important types without listing individual paths.

use std::time::Duration;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{BatteryConfig, ConfigError, MonitorConfig, SourceConfig, load_config};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{MAX_BATTERIES, SAMPLE_INTERVAL_MS_DEFAULT};

// ─── Telemetry ──────────────────────────────────────────────────────
pub use crate::flags::ConditionFlags;
pub use crate::types::{ChargeDirection, CycleCompleted, Sample, Snapshot};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{EstimatorError, SampleError};

/// Default sampling interval as Duration.
pub const SAMPLE_INTERVAL_DEFAULT: Duration = Duration::from_millis(SAMPLE_INTERVAL_MS_DEFAULT);
