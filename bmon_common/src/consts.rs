//! System-wide defaults and parameter bounds.
//!
//! Numeric configuration parameters are validated against the const
//! `MIN`/`MAX` bounds defined here.

use static_assertions::const_assert;

/// Default sampling interval [ms] (one sample per second).
pub const SAMPLE_INTERVAL_MS_DEFAULT: u64 = 1000;

/// Minimum accepted sampling interval [ms].
pub const SAMPLE_INTERVAL_MS_MIN: u64 = 10;

/// Maximum accepted sampling interval [ms] (one sample per minute).
pub const SAMPLE_INTERVAL_MS_MAX: u64 = 60_000;

/// Maximum number of batteries a single gauge instance tracks.
///
/// Per-battery runtime slots are pre-allocated against this bound.
pub const MAX_BATTERIES: usize = 8;

/// Default telemetry publish interval [ticks] (publish every sample).
pub const PUBLISH_EVERY_DEFAULT: u64 = 1;

/// Upper bound on the telemetry publish interval [ticks].
pub const PUBLISH_EVERY_MAX: u64 = 3600;

const_assert!(MAX_BATTERIES > 0);
const_assert!(MAX_BATTERIES <= 64);
const_assert!(SAMPLE_INTERVAL_MS_MIN <= SAMPLE_INTERVAL_MS_DEFAULT);
const_assert!(SAMPLE_INTERVAL_MS_DEFAULT <= SAMPLE_INTERVAL_MS_MAX);
const_assert!(PUBLISH_EVERY_DEFAULT <= PUBLISH_EVERY_MAX);
