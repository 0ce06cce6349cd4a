//! Coulomb-counting charge estimator with an equivalent-full-cycle odometer.
//!
//! Pure computation over in-memory state: one call per sampling tick, no
//! I/O, no clock reads. Elapsed time is passed in explicitly, which keeps
//! the estimator deterministic and testable without mocking time.
//!
//! Charge accounting follows the sign of the current: discharge grows both
//! the net deficit and the lifetime discharge total, recharge shrinks the
//! deficit (clipped at 0; a full battery discards excess charge current)
//! and grows the lifetime recharge total. The deficit is deliberately NOT
//! clipped from above: discharging past nominal empty drives the raw SoC
//! negative, which is the over-discharge signal. Only the presentation
//! value is clamped.

use bmon_common::error::{EstimatorError, SampleError};
use bmon_common::flags::ConditionFlags;
use bmon_common::types::{ChargeDirection, CycleCompleted, Snapshot};

/// Result of one accepted tick.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    /// State snapshot after the update.
    pub snapshot: Snapshot,
    /// Present when the cycle odometer advanced on this tick.
    pub cycle_completed: Option<CycleCompleted>,
}

/// Per-battery charge estimator state.
///
/// Created once at startup, mutated exactly once per sampling tick.
/// All accumulators start at zero; `full_cycle_count` and the lifetime
/// totals are monotone non-decreasing for the life of the instance.
#[derive(Debug, Clone)]
pub struct ChargeEstimator {
    /// Nominal full-charge capacity [mAh], fixed at construction.
    capacity_mah: f64,
    /// Charge removed since last considered full [mAh]. Clipped at 0 from
    /// below, never clipped from above.
    net_discharged_mah: f64,
    /// Total charge ever discharged [mAh].
    lifetime_discharged_mah: f64,
    /// Total charge ever recharged [mAh].
    lifetime_recharged_mah: f64,
    /// Completed full-capacity-equivalent discharge cycles.
    full_cycle_count: u64,
}

impl ChargeEstimator {
    /// Create an estimator for a battery of the given nominal capacity.
    ///
    /// # Errors
    /// Returns [`EstimatorError::InvalidCapacity`] for a non-finite or
    /// non-positive capacity. Fatal at startup, not recoverable per tick.
    pub fn new(capacity_mah: f64) -> Result<Self, EstimatorError> {
        if !capacity_mah.is_finite() || capacity_mah <= 0.0 {
            return Err(EstimatorError::InvalidCapacity { capacity_mah });
        }
        Ok(Self {
            capacity_mah,
            net_discharged_mah: 0.0,
            lifetime_discharged_mah: 0.0,
            lifetime_recharged_mah: 0.0,
            full_cycle_count: 0,
        })
    }

    /// Nominal capacity [mAh].
    #[inline]
    pub fn capacity_mah(&self) -> f64 {
        self.capacity_mah
    }

    /// Process one sample.
    ///
    /// # Arguments
    /// - `current_ma`: Signed current [mA]; negative = discharging,
    ///   positive = charging, zero = idle.
    /// - `elapsed_hours`: Strictly positive time since the previous tick [h].
    ///
    /// # Errors
    /// Returns [`SampleError`] for a non-finite current or a non-positive
    /// elapsed time. A rejected tick leaves the state bit-for-bit unchanged.
    pub fn tick(&mut self, current_ma: f64, elapsed_hours: f64) -> Result<Tick, SampleError> {
        if !current_ma.is_finite() {
            return Err(SampleError::NonFiniteCurrent { current_ma });
        }
        if !elapsed_hours.is_finite() || elapsed_hours <= 0.0 {
            return Err(SampleError::NonPositiveElapsed { elapsed_hours });
        }

        let charge_transferred_mah = current_ma * elapsed_hours;
        let direction = ChargeDirection::from_current_ma(current_ma);

        match direction {
            ChargeDirection::Discharging => {
                let amount = charge_transferred_mah.abs();
                self.net_discharged_mah += amount;
                self.lifetime_discharged_mah += amount;
            }
            ChargeDirection::Charging => {
                let amount = charge_transferred_mah.abs();
                self.net_discharged_mah -= amount;
                self.lifetime_recharged_mah += amount;
                if self.net_discharged_mah < 0.0 {
                    // Full battery: excess charge current is discarded from
                    // the tracked deficit.
                    self.net_discharged_mah = 0.0;
                }
            }
            ChargeDirection::Idle => {}
        }

        // Equivalent full cycles from the LIFETIME discharge total, not the
        // net deficit: many partial swings still add up to whole cycles.
        // The count is an odometer: it advances and never rewinds.
        let completed = (self.lifetime_discharged_mah / self.capacity_mah).floor() as u64;
        let cycle_completed = if completed > self.full_cycle_count {
            self.full_cycle_count = completed;
            Some(CycleCompleted {
                full_cycle_count: completed,
                lifetime_discharged_mah: self.lifetime_discharged_mah,
            })
        } else {
            None
        };

        Ok(Tick {
            snapshot: self.snapshot_for(direction),
            cycle_completed,
        })
    }

    /// Current state snapshot without performing an update.
    ///
    /// Direction flags are absent; accumulator-derived condition flags
    /// (FULL / EMPTY / OVER_DISCHARGE) are populated.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_for(ChargeDirection::Idle)
    }

    fn snapshot_for(&self, direction: ChargeDirection) -> Snapshot {
        let soc_percent_raw = 100.0 * (1.0 - self.net_discharged_mah / self.capacity_mah);
        Snapshot {
            soc_percent_raw,
            soc_percent_clamped: soc_percent_raw.clamp(0.0, 100.0),
            net_discharged_mah: self.net_discharged_mah,
            lifetime_discharged_mah: self.lifetime_discharged_mah,
            lifetime_recharged_mah: self.lifetime_recharged_mah,
            full_cycle_count: self.full_cycle_count,
            condition_bits: self.condition(direction).bits(),
        }
    }

    fn condition(&self, direction: ChargeDirection) -> ConditionFlags {
        let mut flags = match direction {
            ChargeDirection::Discharging => ConditionFlags::DISCHARGING,
            ChargeDirection::Charging => ConditionFlags::CHARGING,
            ChargeDirection::Idle => ConditionFlags::empty(),
        };
        if self.net_discharged_mah == 0.0 {
            flags |= ConditionFlags::FULL;
        }
        if self.net_discharged_mah >= self.capacity_mah {
            flags |= ConditionFlags::EMPTY;
        }
        if self.net_discharged_mah > self.capacity_mah {
            flags |= ConditionFlags::OVER_DISCHARGE;
        }
        flags
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// One second expressed in hours.
    const SEC: f64 = 1.0 / 3600.0;

    fn estimator(capacity_mah: f64) -> ChargeEstimator {
        ChargeEstimator::new(capacity_mah).unwrap()
    }

    /// Field-by-field bit pattern, for exact no-change assertions.
    fn bits(s: &Snapshot) -> [u64; 6] {
        [
            s.soc_percent_raw.to_bits(),
            s.soc_percent_clamped.to_bits(),
            s.net_discharged_mah.to_bits(),
            s.lifetime_discharged_mah.to_bits(),
            s.lifetime_recharged_mah.to_bits(),
            s.full_cycle_count,
        ]
    }

    #[test]
    fn rejects_invalid_capacity() {
        for capacity in [0.0, -1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let result = ChargeEstimator::new(capacity);
            assert!(
                matches!(result, Err(EstimatorError::InvalidCapacity { .. })),
                "capacity {capacity} should be rejected"
            );
        }
    }

    #[test]
    fn discharge_accumulates_both_totals() {
        let mut est = estimator(1000.0);
        // 3600 mA for one second = 1 mAh.
        let tick = est.tick(-3600.0, SEC).unwrap();
        assert!((tick.snapshot.net_discharged_mah - 1.0).abs() < 1e-12);
        assert!((tick.snapshot.lifetime_discharged_mah - 1.0).abs() < 1e-12);
        assert_eq!(tick.snapshot.lifetime_recharged_mah, 0.0);
        assert!((tick.snapshot.soc_percent_raw - 99.9).abs() < 1e-9);
    }

    #[test]
    fn charge_reduces_deficit_and_clips_at_zero() {
        let mut est = estimator(1000.0);
        est.tick(-3600.0, SEC).unwrap(); // deficit = 1 mAh

        // Recharge 0.5 mAh.
        let tick = est.tick(1800.0, SEC).unwrap();
        assert!((tick.snapshot.net_discharged_mah - 0.5).abs() < 1e-12);
        assert!((tick.snapshot.lifetime_recharged_mah - 0.5).abs() < 1e-12);

        // Recharge far past full: deficit clips at 0, lifetime keeps counting.
        let tick = est.tick(36_000.0, SEC).unwrap();
        assert_eq!(tick.snapshot.net_discharged_mah, 0.0);
        assert!((tick.snapshot.lifetime_recharged_mah - 10.5).abs() < 1e-12);
        assert!(tick.snapshot.condition().contains(ConditionFlags::FULL));
    }

    #[test]
    fn net_deficit_never_negative() {
        let mut est = estimator(100.0);
        // Alternating heavy charge / light discharge.
        for i in 0..500 {
            let current = if i % 2 == 0 { 50_000.0 } else { -200.0 };
            let snap = est.tick(current, SEC).unwrap().snapshot;
            assert!(snap.net_discharged_mah >= 0.0);
        }
    }

    #[test]
    fn lifetime_totals_monotone() {
        let mut est = estimator(100.0);
        let mut prev_discharged = 0.0;
        let mut prev_recharged = 0.0;
        let currents = [-900.0, 1500.0, 0.0, -20_000.0, 5000.0, -1.0, 0.0, 800.0];
        for (i, &current) in currents.iter().cycle().take(400).enumerate() {
            let snap = est.tick(current, (1 + i % 3) as f64 * SEC).unwrap().snapshot;
            assert!(snap.lifetime_discharged_mah >= prev_discharged);
            assert!(snap.lifetime_recharged_mah >= prev_recharged);
            prev_discharged = snap.lifetime_discharged_mah;
            prev_recharged = snap.lifetime_recharged_mah;
        }
    }

    #[test]
    fn idle_tick_changes_nothing() {
        let mut est = estimator(250.0);
        est.tick(-900.0, SEC).unwrap();
        let before = est.snapshot();

        // Zero current leaves every field unchanged regardless of elapsed time.
        for elapsed in [SEC, 1.0, 1000.0] {
            let tick = est.tick(0.0, elapsed).unwrap();
            assert_eq!(bits(&est.snapshot()), bits(&before));
            assert!(tick.cycle_completed.is_none());
        }
    }

    #[test]
    fn round_trip_restores_net_deficit() {
        let mut est = estimator(500.0);
        est.tick(-3600.0, SEC).unwrap(); // baseline deficit = 1 mAh
        let baseline = est.snapshot();

        // Discharge 100 mAh then recharge exactly 100 mAh (X <= C, no clip).
        est.tick(-100.0, 1.0).unwrap();
        let tick = est.tick(100.0, 1.0).unwrap();

        assert!(
            (tick.snapshot.net_discharged_mah - baseline.net_discharged_mah).abs() < 1e-9
        );
        assert!(
            (tick.snapshot.lifetime_discharged_mah
                - (baseline.lifetime_discharged_mah + 100.0))
                .abs()
                < 1e-9
        );
        assert!(
            (tick.snapshot.lifetime_recharged_mah
                - (baseline.lifetime_recharged_mah + 100.0))
                .abs()
                < 1e-9
        );
    }

    #[test]
    fn cycle_counts_from_lifetime_not_net() {
        // Partial 50 mAh swings on a 100 mAh battery: net never passes 50,
        // but the second discharge closes one equivalent full cycle.
        let mut est = estimator(100.0);

        let tick = est.tick(-50.0, 1.0).unwrap();
        assert!(tick.cycle_completed.is_none());

        est.tick(50.0, 1.0).unwrap(); // back to full

        let tick = est.tick(-50.0, 1.0).unwrap();
        let event = tick.cycle_completed.expect("second swing closes a cycle");
        assert_eq!(event.full_cycle_count, 1);
        assert!((event.lifetime_discharged_mah - 100.0).abs() < 1e-12);
        assert_eq!(tick.snapshot.full_cycle_count, 1);
        // Net deficit is only half a capacity.
        assert!((tick.snapshot.net_discharged_mah - 50.0).abs() < 1e-12);
    }

    #[test]
    fn cycle_count_survives_full_recharge() {
        let mut est = estimator(100.0);
        est.tick(-100.0, 1.0).unwrap(); // one full cycle
        est.tick(100.0, 1.0).unwrap(); // fully recharged
        let snap = est.snapshot();
        assert_eq!(snap.full_cycle_count, 1);
        assert_eq!(snap.net_discharged_mah, 0.0);

        // Further idle and charge ticks never decrease the odometer.
        est.tick(0.0, 1.0).unwrap();
        est.tick(500.0, 1.0).unwrap();
        assert_eq!(est.snapshot().full_cycle_count, 1);
    }

    #[test]
    fn over_discharge_goes_negative_raw_clamped_for_display() {
        let mut est = estimator(100.0);
        est.tick(-150.0, 1.0).unwrap(); // 150 mAh out of a 100 mAh battery
        let snap = est.snapshot();

        // Accumulator is not clipped from above; raw SoC signals over-discharge.
        assert!((snap.net_discharged_mah - 150.0).abs() < 1e-12);
        assert!((snap.soc_percent_raw - -50.0).abs() < 1e-9);
        assert_eq!(snap.soc_percent_clamped, 0.0);
        assert!(snap.condition().contains(ConditionFlags::EMPTY));
        assert!(snap.condition().contains(ConditionFlags::OVER_DISCHARGE));
        assert!(snap.condition().has_critical());

        // Recharging out of over-discharge works against the full deficit.
        est.tick(100.0, 1.0).unwrap();
        let snap = est.snapshot();
        assert!((snap.net_discharged_mah - 50.0).abs() < 1e-12);
        assert!((snap.soc_percent_raw - 50.0).abs() < 1e-9);
    }

    #[test]
    fn soc_full_scale() {
        let mut est = estimator(100.0);
        assert_eq!(est.snapshot().soc_percent_raw, 100.0);
        assert!(est.snapshot().condition().contains(ConditionFlags::FULL));

        est.tick(-100.0, 1.0).unwrap();
        let snap = est.snapshot();
        assert!((snap.soc_percent_raw - 0.0).abs() < 1e-9);
        assert!(snap.condition().contains(ConditionFlags::EMPTY));
        assert!(!snap.condition().has_critical());
    }

    #[test]
    fn demo_battery_scenario() {
        // 250 mAh battery, 900 mA load, 1 s ticks: 0.25 mAh per tick,
        // exactly one full cycle after 1000 ticks.
        let mut est = estimator(250.0);

        let tick = est.tick(-900.0, SEC).unwrap();
        assert!((tick.snapshot.net_discharged_mah - 0.25).abs() < 1e-12);
        assert!((tick.snapshot.soc_percent_clamped - 99.9).abs() < 1e-9);
        assert!(tick.cycle_completed.is_none());

        let mut event_tick = None;
        for i in 2..=1000 {
            let tick = est.tick(-900.0, SEC).unwrap();
            if tick.cycle_completed.is_some() {
                assert!(event_tick.is_none(), "cycle event fired twice");
                event_tick = Some(i);
            }
        }

        assert_eq!(event_tick, Some(1000));
        let snap = est.snapshot();
        assert!((snap.net_discharged_mah - 250.0).abs() < 1e-9);
        assert!((snap.lifetime_discharged_mah - 250.0).abs() < 1e-9);
        assert_eq!(snap.full_cycle_count, 1);
    }

    #[test]
    fn nan_current_rejected_without_state_change() {
        let mut est = estimator(250.0);
        est.tick(-900.0, SEC).unwrap();
        let before = est.snapshot();

        let result = est.tick(f64::NAN, SEC);
        assert!(matches!(result, Err(SampleError::NonFiniteCurrent { .. })));
        assert_eq!(bits(&est.snapshot()), bits(&before));

        let result = est.tick(f64::INFINITY, SEC);
        assert!(matches!(result, Err(SampleError::NonFiniteCurrent { .. })));
        assert_eq!(bits(&est.snapshot()), bits(&before));
    }

    #[test]
    fn non_positive_elapsed_rejected_without_state_change() {
        let mut est = estimator(250.0);
        est.tick(-900.0, SEC).unwrap();
        let before = est.snapshot();

        for elapsed in [0.0, -SEC, f64::NAN, f64::INFINITY] {
            let result = est.tick(-500.0, elapsed);
            assert!(
                matches!(result, Err(SampleError::NonPositiveElapsed { .. })),
                "elapsed {elapsed} should be rejected"
            );
            assert_eq!(bits(&est.snapshot()), bits(&before));
        }
    }

    #[test]
    fn independent_instances_share_nothing() {
        let mut a = estimator(100.0);
        let mut b = estimator(100.0);
        a.tick(-100.0, 1.0).unwrap();
        assert_eq!(a.snapshot().full_cycle_count, 1);
        assert_eq!(b.snapshot().full_cycle_count, 0);
        assert_eq!(b.snapshot().net_discharged_mah, 0.0);
    }
}
