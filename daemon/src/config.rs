use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirsync::SyncOptions;

pub const DEFAULT_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("interval must be at least one second")]
    ZeroInterval,
    #[error("unknown log level '{0}' (expected one of trace, debug, info, warn, error)")]
    LogLevel(String),
}

/// Settings read from an optional TOML file. Every field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub recursive: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,
    pub size_threshold: Option<u64>,
    pub log_level: Option<String>,
    pub pid_file: Option<PathBuf>,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Values given on the command line; `None` defers to the file or default
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub recursive: bool,
    pub interval_secs: Option<u64>,
    pub size_threshold: Option<u64>,
    pub log_level: Option<String>,
    pub pid_file: Option<PathBuf>,
    pub foreground: bool,
}

/// Immutable daemon configuration, built once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub recursive: bool,
    pub interval: Duration,
    pub size_threshold: u64,
    pub log_level: String,
    pub pid_file: Option<PathBuf>,
    pub foreground: bool,
}

impl DaemonConfig {
    /// Merge command-line overrides over file settings over defaults
    pub fn resolve(
        source: PathBuf,
        destination: PathBuf,
        file: FileConfig,
        overrides: Overrides,
    ) -> Result<Self, ConfigError> {
        let interval = overrides
            .interval_secs
            .map(Duration::from_secs)
            .or(file.interval)
            .unwrap_or(Duration::from_secs(DEFAULT_INTERVAL_SECS));

        let config = Self {
            source,
            destination,
            recursive: overrides.recursive || file.recursive,
            interval,
            size_threshold: overrides.size_threshold.or(file.size_threshold).unwrap_or(0),
            log_level: overrides
                .log_level
                .or(file.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
                .to_lowercase(),
            pid_file: overrides.pid_file.or(file.pid_file),
            foreground: overrides.foreground,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval < Duration::from_secs(1) {
            return Err(ConfigError::ZeroInterval);
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::LogLevel(self.log_level.clone()));
        }
        Ok(())
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            recursive: self.recursive,
            size_threshold: self.size_threshold,
        }
    }
}
