//! Deterministic phase-sequence sample source.
//!
//! Plays a fixed list of `(current, voltage, ticks)` phases, then settles
//! into idle (zero current) at the last phase's voltage. Ignores the
//! measured elapsed time, since the script is defined in ticks. Used by
//! tests, benches and repeatable demo profiles.

use std::time::Duration;

use bmon_common::config::PhaseConfig;
use bmon_common::types::Sample;

use super::SampleSource;

/// Bus voltage reported when an empty script idles [V].
const IDLE_VOLTAGE_V: f64 = 12.0;

/// Fixed-sequence sample source.
pub struct ScriptedSource {
    phases: Vec<PhaseConfig>,
    index: usize,
    remaining_in_phase: u64,
}

impl ScriptedSource {
    /// Create a source that plays `phases` in order.
    pub fn new(phases: Vec<PhaseConfig>) -> Self {
        let remaining_in_phase = phases.first().map(|p| p.ticks).unwrap_or(0);
        Self {
            phases,
            index: 0,
            remaining_in_phase,
        }
    }

    /// True once every phase has been played.
    pub fn exhausted(&self) -> bool {
        self.index >= self.phases.len()
    }

    fn idle_sample(&self) -> Sample {
        Sample {
            current_ma: 0.0,
            voltage_v: self
                .phases
                .last()
                .map(|p| p.voltage_v)
                .unwrap_or(IDLE_VOLTAGE_V),
        }
    }
}

impl SampleSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn next_sample(&mut self, _dt: Duration) -> Sample {
        // Zero-length phases (possible when constructed directly) are skipped.
        while self.index < self.phases.len() && self.remaining_in_phase == 0 {
            self.index += 1;
            self.remaining_in_phase = self.phases.get(self.index).map(|p| p.ticks).unwrap_or(0);
        }
        if self.exhausted() {
            return self.idle_sample();
        }

        let phase = self.phases[self.index];
        let sample = Sample {
            current_ma: phase.current_ma,
            voltage_v: phase.voltage_v,
        };

        self.remaining_in_phase -= 1;
        if self.remaining_in_phase == 0 {
            self.index += 1;
            self.remaining_in_phase = self.phases.get(self.index).map(|p| p.ticks).unwrap_or(0);
        }

        sample
    }
}
