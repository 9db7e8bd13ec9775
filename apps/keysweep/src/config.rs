//! # Configuration
//!
//! Optional `keysweep.toml`, merged with command-line flags.
//!
//! ```toml
//! [database]
//! path = "install.redb"
//! backend = "redb"        # or "snapshot"
//!
//! [logging]
//! format = "text"         # or "json"
//! filter = "keysweep=debug"
//! ```
//!
//! Precedence: flags, then environment (`KEYSWEEP_LOG_FORMAT`), then the
//! file, then defaults.

use clap::ValueEnum;
use keysweep_core::KeysweepError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "keysweep.toml";

/// Database path used when neither flag nor config names one.
pub const DEFAULT_DATABASE: &str = "keysweep.redb";

/// Log filter used when neither `RUST_LOG` nor config sets one.
pub const DEFAULT_LOG_FILTER: &str = "keysweep=info,keysweep_core=info";

/// Log filter for `--verbose`.
pub const VERBOSE_LOG_FILTER: &str = "keysweep=debug,keysweep_core=debug";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// ENUMS
// =============================================================================

/// Where the installer database lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// JSON snapshot file, loaded into memory.
    Snapshot,
    /// redb database file.
    #[default]
    Redb,
}

impl Backend {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Redb => "redb",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parse `text`/`json`, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

// =============================================================================
// FILE LAYOUT
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    pub backend: Option<Backend>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub format: Option<LogFormat>,
    pub filter: Option<String>,
}

/// Contents of a config file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self, KeysweepError> {
        toml::from_str(text)
            .map_err(|e| KeysweepError::DeserializationError(format!("Invalid config: {}", e)))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `keysweep.toml` in the
    /// working directory is used if present, and defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, KeysweepError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let metadata = std::fs::metadata(&path).map_err(|e| {
            KeysweepError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(KeysweepError::IoError(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(&path).map_err(|e| {
            KeysweepError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }
}

// =============================================================================
// RESOLVED SETTINGS
// =============================================================================

/// A database path paired with the backend that reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTarget {
    pub path: PathBuf,
    pub backend: Backend,
}

/// Settings after merging flags, environment, file and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database: DatabaseTarget,
    pub log_format: LogFormat,
    pub log_filter: String,
}

/// The subset of command-line flags that feed into settings.
#[derive(Debug, Clone, Default)]
pub struct FlagOverrides {
    pub database: Option<PathBuf>,
    pub backend: Option<Backend>,
    pub verbose: bool,
}

impl Settings {
    /// Merge sources. `env_log_format` is the raw `KEYSWEEP_LOG_FORMAT` value.
    #[must_use]
    pub fn resolve(flags: &FlagOverrides, config: &Config, env_log_format: Option<&str>) -> Self {
        let path = flags
            .database
            .clone()
            .or_else(|| config.database.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));
        let backend = flags
            .backend
            .or(config.database.backend)
            .unwrap_or_default();

        let log_format = env_log_format
            .and_then(LogFormat::parse)
            .or(config.logging.format)
            .unwrap_or_default();

        let log_filter = if flags.verbose {
            VERBOSE_LOG_FILTER.to_string()
        } else {
            config
                .logging
                .filter
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
        };

        Self {
            database: DatabaseTarget { path, backend },
            log_format,
            log_filter,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_default() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn full_config_parses() {
        let config = Config::from_toml(
            r#"
            [database]
            path = "setup.json"
            backend = "snapshot"

            [logging]
            format = "json"
            filter = "keysweep=trace"
            "#,
        )
        .unwrap();
        assert_eq!(config.database.path, Some(PathBuf::from("setup.json")));
        assert_eq!(config.database.backend, Some(Backend::Snapshot));
        assert_eq!(config.logging.format, Some(LogFormat::Json));
        assert_eq!(config.logging.filter.as_deref(), Some("keysweep=trace"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("[database]\nbogus = 1\n").is_err());
        assert!(Config::from_toml("[database]\nbackend = \"sqlite\"\n").is_err());
    }

    #[test]
    fn flags_override_file() {
        let config = Config::from_toml("[database]\npath = \"a.redb\"\nbackend = \"redb\"\n").unwrap();
        let flags = FlagOverrides {
            database: Some(PathBuf::from("b.json")),
            backend: Some(Backend::Snapshot),
            verbose: true,
        };
        let settings = Settings::resolve(&flags, &config, None);
        assert_eq!(settings.database.path, PathBuf::from("b.json"));
        assert_eq!(settings.database.backend, Backend::Snapshot);
        assert_eq!(settings.log_filter, VERBOSE_LOG_FILTER);
    }

    #[test]
    fn defaults_apply_without_sources() {
        let settings = Settings::resolve(&FlagOverrides::default(), &Config::default(), None);
        assert_eq!(settings.database.path, PathBuf::from(DEFAULT_DATABASE));
        assert_eq!(settings.database.backend, Backend::Redb);
        assert_eq!(settings.log_format, LogFormat::Text);
        assert_eq!(settings.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn env_log_format_beats_file() {
        let config = Config::from_toml("[logging]\nformat = \"text\"\n").unwrap();
        let flags = FlagOverrides::default();
        assert_eq!(
            Settings::resolve(&flags, &config, Some("JSON")).log_format,
            LogFormat::Json
        );
        assert_eq!(
            Settings::resolve(&flags, &config, Some("garbage")).log_format,
            LogFormat::Text
        );
    }

    #[test]
    fn explicit_missing_config_fails() {
        let temp = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&temp.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn explicit_config_loads() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("keysweep.toml");
        std::fs::write(&path, "[logging]\nfilter = \"warn\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.logging.filter.as_deref(), Some("warn"));
    }
}
