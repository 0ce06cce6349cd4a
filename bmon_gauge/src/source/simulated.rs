//! Knob-driven software battery for development without hardware.
//!
//! The knob position stands in for a potentiometer selecting the load:
//! the lower half of its travel maps to discharge currents (heavy load at
//! 0, light load just under the midpoint), the upper half to charge
//! currents (slow charge at the midpoint, fast charge at 1). Bus voltage
//! is synthesized from the source's own deficit model, falling linearly
//! from full to empty and flooring at the empty voltage past that.
//!
//! The deficit model here is internal to the source. The estimator is
//! never consulted; estimation stays strictly downstream of sampling.

use std::time::Duration;

use bmon_common::types::Sample;

use super::SampleSource;

/// Heaviest simulated load [mA] (knob fully at 0).
const DISCHARGE_HEAVY_MA: f64 = -20_000.0;
/// Lightest simulated load [mA] (knob just under the midpoint).
const DISCHARGE_LIGHT_MA: f64 = -500.0;
/// Slowest simulated charger [mA] (knob at the midpoint).
const CHARGE_SLOW_MA: f64 = 1000.0;
/// Fastest simulated charger [mA] (knob fully at 1).
const CHARGE_FAST_MA: f64 = 5000.0;

/// Bus voltage of a full simulated battery [V].
const VOLTAGE_FULL_V: f64 = 12.6;
/// Bus voltage of an empty simulated battery [V].
const VOLTAGE_EMPTY_V: f64 = 11.0;

/// Software-emulated battery with a load/charge selector knob.
pub struct SimulatedSource {
    /// Selector position in `[0, 1]`.
    knob: f64,
    /// Simulated nominal capacity [mAh].
    capacity_mah: f64,
    /// Simulated charge deficit [mAh], clipped at 0.
    deficit_mah: f64,
}

impl SimulatedSource {
    /// Create a full simulated battery.
    ///
    /// `knob` is clamped to `[0, 1]`.
    pub fn new(capacity_mah: f64, knob: f64) -> Self {
        Self {
            knob: knob.clamp(0.0, 1.0),
            capacity_mah,
            deficit_mah: 0.0,
        }
    }

    /// Move the load/charge selector. Clamped to `[0, 1]`.
    pub fn set_knob(&mut self, knob: f64) {
        self.knob = knob.clamp(0.0, 1.0);
    }

    /// Map a knob position to a signed current [mA].
    ///
    /// Lower half: discharge, `[-20000, -500]`. Upper half: charge,
    /// `[+1000, +5000]`.
    pub fn current_for_knob(knob: f64) -> f64 {
        let knob = knob.clamp(0.0, 1.0);
        if knob < 0.5 {
            let t = knob / 0.5;
            DISCHARGE_HEAVY_MA + t * (DISCHARGE_LIGHT_MA - DISCHARGE_HEAVY_MA)
        } else {
            let t = (knob - 0.5) / 0.5;
            CHARGE_SLOW_MA + t * (CHARGE_FAST_MA - CHARGE_SLOW_MA)
        }
    }

    /// Synthesized bus voltage [V] for the current deficit.
    fn bus_voltage_v(&self) -> f64 {
        let discharge_ratio = self.deficit_mah / self.capacity_mah;
        if discharge_ratio >= 1.0 {
            return VOLTAGE_EMPTY_V;
        }
        VOLTAGE_FULL_V - (VOLTAGE_FULL_V - VOLTAGE_EMPTY_V) * discharge_ratio
    }
}

impl SampleSource for SimulatedSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn next_sample(&mut self, dt: Duration) -> Sample {
        let current_ma = Self::current_for_knob(self.knob);
        // Voltage reflects the deficit before this tick's transfer, the way
        // a bus reading precedes the charge it reports.
        let voltage_v = self.bus_voltage_v();

        let transferred_mah = (current_ma * dt.as_secs_f64() / 3600.0).abs();
        if current_ma < 0.0 {
            self.deficit_mah += transferred_mah;
        } else if current_ma > 0.0 {
            self.deficit_mah = (self.deficit_mah - transferred_mah).max(0.0);
        }

        Sample {
            current_ma,
            voltage_v,
        }
    }
}
