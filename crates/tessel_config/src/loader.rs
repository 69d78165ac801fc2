//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::SimConfig;
use log::debug;
use std::path::Path;
use tessel_common::Period;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE_NAME: &str = "tessel.toml";

/// Loads and validates `tessel.toml` from a project directory.
pub fn load_config(project_dir: &Path) -> Result<SimConfig, ConfigError> {
    load_config_file(&project_dir.join(CONFIG_FILE_NAME))
}

/// Loads and validates a configuration file at an explicit path.
pub fn load_config_file(path: &Path) -> Result<SimConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = load_config_from_str(&content)?;
    debug!("loaded simulation config from {}", path.display());
    Ok(config)
}

/// Parses and validates a configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<SimConfig, ConfigError> {
    let config: SimConfig = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks that limits are usable.
fn validate_config(config: &SimConfig) -> Result<(), ConfigError> {
    let invalid = |key, reason| Err(ConfigError::Invalid { key, reason });
    if config.simulation.settle_iteration_cap == 0 {
        return invalid("simulation.settle_iteration_cap", "must be at least 1");
    }
    if config.simulation.max_deltas == 0 {
        return invalid("simulation.max_deltas", "must be at least 1");
    }
    if config.trace.timescale.is_zero() {
        return invalid("trace.timescale", "must be non-zero");
    }
    if !is_vcd_timescale(config.trace.timescale) {
        return invalid("trace.timescale", "must be 1, 10 or 100 of fs, ps, ns, us, ms or s");
    }
    Ok(())
}

/// Whether `period` can be written as a VCD `$timescale`: 1, 10 or 100 of a
/// unit from `fs` up to `s`.
fn is_vcd_timescale(period: Period) -> bool {
    const SECOND_FS: u64 = 1_000_000_000_000_000;
    let mut fs = period.as_fs();
    if fs > 100 * SECOND_FS {
        return false;
    }
    while fs >= 1000 && fs % 1000 == 0 {
        fs /= 1000;
    }
    matches!(fs, 1 | 10 | 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TieBreak, DEFAULT_MAX_DELTAS, DEFAULT_SETTLE_ITERATION_CAP};

    #[test]
    fn empty_config_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, SimConfig::default());
        assert_eq!(
            config.simulation.settle_iteration_cap,
            DEFAULT_SETTLE_ITERATION_CAP
        );
        assert_eq!(config.simulation.max_deltas, DEFAULT_MAX_DELTAS);
        assert_eq!(config.simulation.tie_break, TieBreak::Creation);
        assert_eq!(config.trace.timescale, Period::from_ps(1));
        assert!(config.trace.path.is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[simulation]
settle_iteration_cap = 16
max_deltas = 500
tie_break = "reverse-creation"
time_limit = "100us"
step_limit = 1000

[trace]
path = "out.vcd"
timescale = "1ns"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.simulation.settle_iteration_cap, 16);
        assert_eq!(config.simulation.max_deltas, 500);
        assert_eq!(config.simulation.tie_break, TieBreak::ReverseCreation);
        assert_eq!(config.simulation.time_limit, Some(Period::from_us(100)));
        assert_eq!(config.simulation.step_limit, Some(1000));
        assert_eq!(
            config.trace.path.as_deref(),
            Some(Path::new("out.vcd"))
        );
        assert_eq!(config.trace.timescale, Period::from_ns(1));
    }

    #[test]
    fn zero_settle_cap_rejected() {
        let toml = r#"
[simulation]
settle_iteration_cap = 0
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn zero_max_deltas_rejected() {
        let toml = r#"
[simulation]
max_deltas = 0
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn zero_timescale_rejected() {
        let toml = r#"
[trace]
timescale = "0ns"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn timescale_must_be_a_decade_of_a_unit() {
        let with = |ts: &str| load_config_from_str(&format!("[trace]\ntimescale = \"{ts}\"\n"));
        let err = with("3ns").unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { key: "trace.timescale", .. }),
            "{err}"
        );
        assert!(with("250ps").is_err());
        assert_eq!(with("10ns").unwrap().trace.timescale, Period::from_ns(10));
        assert_eq!(with("100ps").unwrap().trace.timescale, Period::from_ps(100));
        assert!(with("1s").is_ok());
    }

    #[test]
    fn invalid_toml_errors() {
        let toml = "this is not valid toml {{{}}}";
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_project_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[simulation]\nmax_deltas = 42\n",
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.simulation.max_deltas, 42);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
