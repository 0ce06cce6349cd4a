//! Telemetry types exchanged between the gauge loop and its sinks.
//!
//! A [`Sample`] enters the estimator once per tick; a [`Snapshot`] leaves
//! it. Snapshots are plain copyable data; sinks own all formatting.

use serde::{Deserialize, Serialize};

use crate::flags::ConditionFlags;

// ─── Sample ─────────────────────────────────────────────────────────

/// One raw measurement produced by a sample source.
///
/// Sign convention for `current_ma`: negative = discharging (load drawing
/// current from the battery), positive = charging, zero = idle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Battery current [mA], signed.
    pub current_ma: f64,
    /// Bus voltage [V].
    pub voltage_v: f64,
}

/// Direction of charge flow for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChargeDirection {
    /// No current flow.
    Idle = 0,
    /// Charge flowing into the battery.
    Charging = 1,
    /// Charge drawn from the battery.
    Discharging = 2,
}

impl ChargeDirection {
    /// Classify a signed current reading [mA].
    #[inline]
    pub fn from_current_ma(current_ma: f64) -> Self {
        if current_ma < 0.0 {
            Self::Discharging
        } else if current_ma > 0.0 {
            Self::Charging
        } else {
            Self::Idle
        }
    }

    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::Charging),
            2 => Some(Self::Discharging),
            _ => None,
        }
    }
}

impl Default for ChargeDirection {
    fn default() -> Self {
        Self::Idle
    }
}

// ─── Snapshot ───────────────────────────────────────────────────────

/// Read-only view of the estimator state after one tick.
///
/// `soc_percent_raw` is unclamped and goes negative on over-discharge;
/// `soc_percent_clamped` is the presentation value limited to `[0, 100]`.
/// The underlying accumulators are never clamped from above.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unclamped state of charge [%]. Negative signals over-discharge.
    pub soc_percent_raw: f64,
    /// State of charge clamped to `[0, 100]` [%], for presentation.
    pub soc_percent_clamped: f64,
    /// Charge removed since the battery was last considered full [mAh].
    pub net_discharged_mah: f64,
    /// Total charge ever discharged [mAh]. Never decreases, never resets.
    pub lifetime_discharged_mah: f64,
    /// Total charge ever recharged [mAh]. Never decreases, never resets.
    pub lifetime_recharged_mah: f64,
    /// Completed full-capacity-equivalent discharge cycles. Never decreases.
    pub full_cycle_count: u64,
    /// Raw bits of [`ConditionFlags`] for this tick.
    pub condition_bits: u8,
}

impl Snapshot {
    /// Decode the condition flags carried in this snapshot.
    #[inline]
    pub const fn condition(&self) -> ConditionFlags {
        ConditionFlags::from_bits_truncate(self.condition_bits)
    }
}

// ─── Cycle Event ────────────────────────────────────────────────────

/// Emitted when the equivalent-full-cycle odometer advances.
///
/// The count is cumulative wear accounting, not a current-state gauge:
/// it advances when the lifetime discharge total crosses another whole
/// multiple of the nominal capacity, and it never goes back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleCompleted {
    /// New cycle count after the advance.
    pub full_cycle_count: u64,
    /// Lifetime discharge total at the moment of the advance [mAh].
    pub lifetime_discharged_mah: f64,
}
