//! Errors raised while loading `tessel.toml`.

use std::path::PathBuf;

/// Why a configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// The file that was opened.
        path: PathBuf,
        /// The underlying I/O failure.
        source: std::io::Error,
    },

    /// The content is not valid TOML or does not match the schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A setting parsed but is out of range.
    #[error("`{key}` {reason}")]
    Invalid {
        /// Dotted path of the setting, e.g. `simulation.max_deltas`.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_names_the_key() {
        let err = ConfigError::Invalid {
            key: "simulation.max_deltas",
            reason: "must be at least 1",
        };
        assert_eq!(err.to_string(), "`simulation.max_deltas` must be at least 1");
    }

    #[test]
    fn read_names_the_file() {
        let err = ConfigError::Read {
            path: PathBuf::from("sim/tessel.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(err.to_string(), "cannot read sim/tessel.toml: no such file");
    }
}
