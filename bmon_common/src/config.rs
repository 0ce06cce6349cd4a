//! TOML configuration structures, loading and validation.
//!
//! The monitor loads a single TOML file at startup. Optional fields use
//! `#[serde(default)]` for forward-compatible deserialization; numeric
//! parameters are validated against the bounds in [`crate::consts`].
//! Configuration is immutable once the sampling loop starts.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{
    MAX_BATTERIES, PUBLISH_EVERY_DEFAULT, PUBLISH_EVERY_MAX, SAMPLE_INTERVAL_MS_DEFAULT,
    SAMPLE_INTERVAL_MS_MAX, SAMPLE_INTERVAL_MS_MIN,
};

// ─── Error Type ─────────────────────────────────────────────────────

/// Configuration loading/validation error.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: String,
    },

    /// File read or TOML parse failure.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failure.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

// ─── Monitor Config ─────────────────────────────────────────────────

/// Top-level gauge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Sampling interval [ms] (default: 1000 = one sample per second).
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Telemetry publish interval [ticks] (default: 1 = every sample).
    ///
    /// Cycle-completed events are always forwarded immediately regardless
    /// of this throttle.
    #[serde(default = "default_publish_every")]
    pub publish_every: u64,

    /// Tracked batteries, one estimator instance each.
    #[serde(default, rename = "battery")]
    pub batteries: Vec<BatteryConfig>,
}

fn default_sample_interval_ms() -> u64 {
    SAMPLE_INTERVAL_MS_DEFAULT
}
fn default_publish_every() -> u64 {
    PUBLISH_EVERY_DEFAULT
}

impl MonitorConfig {
    /// Validate parameter bounds and battery entries.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval_ms < SAMPLE_INTERVAL_MS_MIN
            || self.sample_interval_ms > SAMPLE_INTERVAL_MS_MAX
        {
            return Err(ConfigError::ValidationError(format!(
                "sample_interval_ms {} out of range [{}, {}]",
                self.sample_interval_ms, SAMPLE_INTERVAL_MS_MIN, SAMPLE_INTERVAL_MS_MAX
            )));
        }
        if self.publish_every == 0 || self.publish_every > PUBLISH_EVERY_MAX {
            return Err(ConfigError::ValidationError(format!(
                "publish_every {} out of range [1, {}]",
                self.publish_every, PUBLISH_EVERY_MAX
            )));
        }
        if self.batteries.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one [[battery]] entry is required".to_string(),
            ));
        }
        if self.batteries.len() > MAX_BATTERIES {
            return Err(ConfigError::ValidationError(format!(
                "{} batteries configured, limit is {}",
                self.batteries.len(),
                MAX_BATTERIES
            )));
        }

        let mut seen = HashSet::new();
        for battery in &self.batteries {
            battery.validate()?;
            if !seen.insert(battery.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate battery name '{}'",
                    battery.name
                )));
            }
        }
        Ok(())
    }
}

// ─── Battery Config ─────────────────────────────────────────────────

/// Per-battery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryConfig {
    /// Human-readable battery identifier (e.g., "main", "aux").
    pub name: String,

    /// Nominal full-charge capacity [mAh]. Must be finite and > 0.
    pub capacity_mah: f64,

    /// Sample source backing this battery.
    #[serde(default)]
    pub source: SourceConfig,
}

impl BatteryConfig {
    /// Validate this battery entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "battery name cannot be empty".to_string(),
            ));
        }
        if !self.capacity_mah.is_finite() || self.capacity_mah <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "battery '{}': capacity_mah {} must be finite and > 0",
                self.name, self.capacity_mah
            )));
        }
        self.source
            .validate()
            .map_err(|e| match e {
                ConfigError::ValidationError(msg) => {
                    ConfigError::ValidationError(format!("battery '{}': {msg}", self.name))
                }
                other => other,
            })
    }
}

// ─── Source Config ──────────────────────────────────────────────────

/// Sample source selection and parameters.
///
/// `kind` selects the backing implementation by name, the way pluggable
/// drivers are selected elsewhere: `"simulated"` (knob-driven software
/// battery) or `"scripted"` (fixed phase sequence).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source implementation name.
    #[serde(default = "default_source_kind")]
    pub kind: String,

    /// Knob position in `[0, 1]` for the simulated source.
    ///
    /// Lower half selects discharge currents, upper half charge currents.
    #[serde(default = "default_knob")]
    pub knob: f64,

    /// Phase sequence for the scripted source.
    #[serde(default)]
    pub phases: Vec<PhaseConfig>,
}

fn default_source_kind() -> String {
    "simulated".to_string()
}
fn default_knob() -> f64 {
    0.25
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            knob: default_knob(),
            phases: Vec::new(),
        }
    }
}

impl SourceConfig {
    /// Validate source parameters for the selected kind.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.kind.as_str() {
            "simulated" => {
                if !self.knob.is_finite() || !(0.0..=1.0).contains(&self.knob) {
                    return Err(ConfigError::ValidationError(format!(
                        "source knob {} out of range [0, 1]",
                        self.knob
                    )));
                }
            }
            "scripted" => {
                if self.phases.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "scripted source requires at least one phase".to_string(),
                    ));
                }
                for (i, phase) in self.phases.iter().enumerate() {
                    phase.validate().map_err(|e| match e {
                        ConfigError::ValidationError(msg) => {
                            ConfigError::ValidationError(format!("phase {i}: {msg}"))
                        }
                        other => other,
                    })?;
                }
            }
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown source kind '{other}'"
                )));
            }
        }
        Ok(())
    }
}

/// One phase of a scripted source: a constant sample held for N ticks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Current reported during this phase [mA], signed.
    pub current_ma: f64,
    /// Bus voltage reported during this phase [V].
    #[serde(default = "default_phase_voltage")]
    pub voltage_v: f64,
    /// Number of ticks this phase lasts.
    pub ticks: u64,
}

fn default_phase_voltage() -> f64 {
    12.0
}

impl PhaseConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.current_ma.is_finite() {
            return Err(ConfigError::ValidationError(format!(
                "current_ma {} must be finite",
                self.current_ma
            )));
        }
        if !self.voltage_v.is_finite() {
            return Err(ConfigError::ValidationError(format!(
                "voltage_v {} must be finite",
                self.voltage_v
            )));
        }
        if self.ticks == 0 {
            return Err(ConfigError::ValidationError(
                "ticks must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Loading Functions ──────────────────────────────────────────────

/// Load and validate the gauge configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            ConfigError::ParseError(format!("failed to read {}: {e}", path.display()))
        }
    })?;
    load_config_from_str(&content)
}

/// Load config from a TOML string (for testing).
pub fn load_config_from_str(toml_str: &str) -> Result<MonitorConfig, ConfigError> {
    let config: MonitorConfig =
        toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [[battery]]
        name = "main"
        capacity_mah = 250.0
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = load_config_from_str(MINIMAL).unwrap();
        assert_eq!(config.sample_interval_ms, SAMPLE_INTERVAL_MS_DEFAULT);
        assert_eq!(config.publish_every, PUBLISH_EVERY_DEFAULT);
        assert_eq!(config.batteries.len(), 1);
        assert_eq!(config.batteries[0].name, "main");
        assert_eq!(config.batteries[0].capacity_mah, 250.0);
        assert_eq!(config.batteries[0].source.kind, "simulated");
        assert_eq!(config.batteries[0].source.knob, 0.25);
    }

    #[test]
    fn no_batteries_rejected() {
        let result = load_config_from_str("sample_interval_ms = 1000");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn non_positive_capacity_rejected() {
        for capacity in ["0.0", "-250.0"] {
            let toml_str = format!(
                r#"
                [[battery]]
                name = "main"
                capacity_mah = {capacity}
                "#
            );
            let result = load_config_from_str(&toml_str);
            assert!(
                matches!(result, Err(ConfigError::ValidationError(_))),
                "capacity {capacity} should be rejected"
            );
        }
    }

    #[test]
    fn non_finite_capacity_rejected() {
        // TOML can express inf/nan float literals.
        for capacity in ["inf", "nan"] {
            let toml_str = format!(
                r#"
                [[battery]]
                name = "main"
                capacity_mah = {capacity}
                "#
            );
            let result = load_config_from_str(&toml_str);
            assert!(
                matches!(result, Err(ConfigError::ValidationError(_))),
                "capacity {capacity} should be rejected"
            );
        }
    }

    #[test]
    fn duplicate_battery_names_rejected() {
        let toml_str = r#"
            [[battery]]
            name = "main"
            capacity_mah = 250.0

            [[battery]]
            name = "main"
            capacity_mah = 500.0
        "#;
        let result = load_config_from_str(toml_str);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn interval_bounds_enforced() {
        let too_fast = format!(
            "sample_interval_ms = {}\n{MINIMAL}",
            SAMPLE_INTERVAL_MS_MIN - 1
        );
        assert!(load_config_from_str(&too_fast).is_err());

        let too_slow = format!(
            "sample_interval_ms = {}\n{MINIMAL}",
            SAMPLE_INTERVAL_MS_MAX + 1
        );
        assert!(load_config_from_str(&too_slow).is_err());
    }

    #[test]
    fn publish_every_zero_rejected() {
        let toml_str = format!("publish_every = 0\n{MINIMAL}");
        assert!(load_config_from_str(&toml_str).is_err());
    }

    #[test]
    fn knob_out_of_range_rejected() {
        let toml_str = r#"
            [[battery]]
            name = "main"
            capacity_mah = 250.0

            [battery.source]
            kind = "simulated"
            knob = 1.5
        "#;
        let result = load_config_from_str(toml_str);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn unknown_source_kind_rejected() {
        let toml_str = r#"
            [[battery]]
            name = "main"
            capacity_mah = 250.0

            [battery.source]
            kind = "ina219"
        "#;
        let result = load_config_from_str(toml_str);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn scripted_source_parses_phases() {
        let toml_str = r#"
            [[battery]]
            name = "main"
            capacity_mah = 250.0

            [battery.source]
            kind = "scripted"

            [[battery.source.phases]]
            current_ma = -900.0
            voltage_v = 12.1
            ticks = 10

            [[battery.source.phases]]
            current_ma = 1500.0
            ticks = 5
        "#;
        let config = load_config_from_str(toml_str).unwrap();
        let source = &config.batteries[0].source;
        assert_eq!(source.phases.len(), 2);
        assert_eq!(source.phases[0].current_ma, -900.0);
        assert_eq!(source.phases[0].ticks, 10);
        // Omitted voltage falls back to the default.
        assert_eq!(source.phases[1].voltage_v, 12.0);
    }

    #[test]
    fn scripted_source_without_phases_rejected() {
        let toml_str = r#"
            [[battery]]
            name = "main"
            capacity_mah = 250.0

            [battery.source]
            kind = "scripted"
        "#;
        let result = load_config_from_str(toml_str);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn scripted_phase_zero_ticks_rejected() {
        let toml_str = r#"
            [[battery]]
            name = "main"
            capacity_mah = 250.0

            [battery.source]
            kind = "scripted"

            [[battery.source.phases]]
            current_ma = -900.0
            ticks = 0
        "#;
        let result = load_config_from_str(toml_str);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
