//! TOML configuration shared by the library and the CLI.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "HEAPQL_CONFIG";
/// Environment variable holding a tracing filter directive.
pub const LOG_ENV: &str = "HEAPQL_LOG";
/// Default `convertEpoch` pattern, `dd.MM.yyyy HH:mm:ss`.
pub const DEFAULT_EPOCH_PATTERN: &str = "[day].[month].[year] [hour]:[minute]:[second]";
/// Default diagnostic returned by `convertEpoch` for non-numeric input.
pub const DEFAULT_WRONG_TYPE: &str = "Wrong type";

/// Output formatting used by the function library.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FormatSection {
    /// `time` format description applied by `convertEpoch`.
    pub epoch_pattern: String,
    /// Offset from UTC, in minutes, used when rendering epochs.
    pub utc_offset_minutes: i32,
    /// Text returned when `convertEpoch` cannot parse its input.
    pub wrong_type: String,
}

impl Default for FormatSection {
    fn default() -> Self {
        Self {
            epoch_pattern: DEFAULT_EPOCH_PATTERN.to_string(),
            utc_offset_minutes: 0,
            wrong_type: DEFAULT_WRONG_TYPE.to_string(),
        }
    }
}

/// Logging defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogSection {
    /// `tracing-subscriber` filter used when `HEAPQL_LOG` is unset.
    pub filter: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

/// Complete configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HeapQlConfig {
    /// Function library formatting.
    #[serde(default)]
    pub format: FormatSection,
    /// Logging defaults.
    #[serde(default)]
    pub log: LogSection,
}

/// Failures while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config path.
        path: PathBuf,
        /// I/O failure.
        source: std::io::Error,
    },
    /// File is not valid TOML for this schema.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Config path.
        path: PathBuf,
        /// TOML failure.
        source: toml::de::Error,
    },
    /// `epoch_pattern` is not a valid format description.
    #[error("invalid epoch pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
        /// Parser failure.
        source: time::error::InvalidFormatDescription,
    },
    /// `utc_offset_minutes` is out of range.
    #[error("utc offset of {minutes} minutes is out of range")]
    InvalidOffset {
        /// Offending offset.
        minutes: i32,
    },
}

impl HeapQlConfig {
    /// Loads `explicit`, or the default path when `None`.
    ///
    /// A missing file yields the defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        match explicit.or_else(default_config_path) {
            Some(path) if path.exists() => read_file(&path),
            _ => Ok(Self::default()),
        }
    }
}

fn read_file(path: &Path) -> Result<HeapQlConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// `<config dir>/heapql/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("heapql").join("config.toml"))
}
