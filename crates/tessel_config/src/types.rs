//! Configuration types deserialized from `tessel.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use tessel_common::Period;

/// Default bound on how often one binding may be evaluated in a single settle.
pub const DEFAULT_SETTLE_ITERATION_CAP: u32 = 64;

/// Default bound on delta cycles within one time point.
pub const DEFAULT_MAX_DELTAS: u32 = 10_000;

/// The top-level simulation configuration parsed from `tessel.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimConfig {
    /// Scheduling limits and run bounds.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Waveform output settings.
    #[serde(default)]
    pub trace: TraceConfig,
}

/// Scheduling limits and run bounds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// How often a single combinational binding may be evaluated in one
    /// settle before the run fails with a combinational loop.
    #[serde(default = "default_settle_iteration_cap")]
    pub settle_iteration_cap: u32,
    /// How many delta cycles one time point may take before the run fails.
    #[serde(default = "default_max_deltas")]
    pub max_deltas: u32,
    /// Resumption order of processes woken at the same instant.
    #[serde(default)]
    pub tie_break: TieBreak,
    /// Stop once simulated time would pass this point, e.g. `"100us"`.
    #[serde(default, deserialize_with = "deserialize_optional_period")]
    pub time_limit: Option<Period>,
    /// Stop after this many time points.
    #[serde(default)]
    pub step_limit: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            settle_iteration_cap: DEFAULT_SETTLE_ITERATION_CAP,
            max_deltas: DEFAULT_MAX_DELTAS,
            tie_break: TieBreak::default(),
            time_limit: None,
            step_limit: None,
        }
    }
}

fn default_settle_iteration_cap() -> u32 {
    DEFAULT_SETTLE_ITERATION_CAP
}

fn default_max_deltas() -> u32 {
    DEFAULT_MAX_DELTAS
}

/// Order in which processes woken at the same instant are resumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Processes registered first run first (default).
    #[default]
    Creation,
    /// Processes registered last run first.
    ReverseCreation,
}

/// Waveform output settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TraceConfig {
    /// Where to write a VCD file. No file is written when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Time unit declared in the VCD header; timestamps are multiples of it.
    #[serde(
        default = "default_timescale",
        deserialize_with = "deserialize_period"
    )]
    pub timescale: Period,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            path: None,
            timescale: default_timescale(),
        }
    }
}

fn default_timescale() -> Period {
    Period::from_ps(1)
}

/// Deserializes a period written either as a string with a unit (`"10ns"`,
/// `"100MHz"`) or as a bare integer number of femtoseconds.
fn deserialize_period<'de, D>(deserializer: D) -> Result<Period, D::Error>
where
    D: Deserializer<'de>,
{
    struct PeriodVisitor;

    impl Visitor<'_> for PeriodVisitor {
        type Value = Period;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a period such as \"10ns\" or \"100MHz\", or femtoseconds")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            v.parse().map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Period::from_fs(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            u64::try_from(v)
                .map(Period::from_fs)
                .map_err(|_| E::custom(format!("negative period: {v}")))
        }
    }

    deserializer.deserialize_any(PeriodVisitor)
}

fn deserialize_optional_period<'de, D>(deserializer: D) -> Result<Option<Period>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_period(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    #[test]
    fn tie_break_all_variants() {
        for (input, expected) in [
            ("creation", TieBreak::Creation),
            ("reverse-creation", TieBreak::ReverseCreation),
        ] {
            let toml = format!(
                r#"
[simulation]
tie_break = "{input}"
"#
            );
            let config = load_config_from_str(&toml).unwrap();
            assert_eq!(config.simulation.tie_break, expected);
        }
    }

    #[test]
    fn period_fields_accept_units_and_frequencies() {
        let toml = r#"
[simulation]
time_limit = "100MHz"

[trace]
timescale = "1ns"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.simulation.time_limit, Some(Period::from_ns(10)));
        assert_eq!(config.trace.timescale, Period::from_ns(1));
    }

    #[test]
    fn period_fields_accept_femtoseconds() {
        let toml = r#"
[simulation]
time_limit = 2500
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.simulation.time_limit, Some(Period::from_fs(2500)));
    }

    #[test]
    fn malformed_period_is_a_parse_error() {
        let toml = r#"
[trace]
timescale = "soon"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(err.to_string().contains("invalid period"), "{err}");
    }

    #[test]
    fn unknown_tie_break_rejected() {
        let toml = r#"
[simulation]
tie_break = "random"
"#;
        assert!(load_config_from_str(toml).is_err());
    }
}
