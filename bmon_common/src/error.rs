//! Error types surfaced by the charge estimator core.
//!
//! Two failure classes exist. `EstimatorError` is fatal at construction
//! time: an estimator with an invalid capacity cannot be created.
//! `SampleError` is recovered locally per tick: the offending sample is
//! rejected, the accumulators are left untouched, and the caller decides
//! whether to retry, skip or halt.

use thiserror::Error;

/// Fatal construction-time errors.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EstimatorError {
    /// Nominal capacity must be finite and strictly positive.
    #[error("invalid battery capacity: {capacity_mah} mAh (must be finite and > 0)")]
    InvalidCapacity {
        /// Rejected capacity value [mAh].
        capacity_mah: f64,
    },
}

/// Per-tick sample rejection.
///
/// A rejected tick performs no state update; the estimator is bit-for-bit
/// identical before and after the call.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SampleError {
    /// Current reading is NaN or infinite.
    #[error("non-finite current sample: {current_ma} mA")]
    NonFiniteCurrent {
        /// Rejected current value [mA].
        current_ma: f64,
    },

    /// Elapsed time since the previous tick is zero, negative or non-finite.
    #[error("non-positive elapsed time: {elapsed_hours} h")]
    NonPositiveElapsed {
        /// Rejected elapsed time [h].
        elapsed_hours: f64,
    },
}
