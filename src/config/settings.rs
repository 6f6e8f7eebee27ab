//! TOML-based configuration for crosstab.
//!
//! Supports a config file (crosstab.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [engines]
//! descriptor_dir = "${HOME}/.crosstab/engines"
//!
//! [internal_db]
//! path = ":memory:"
//!
//! [csv]
//! delimiter = ";"
//!
//! [query]
//! timeout_ms = 30000  # 0 disables
//! strategy = "per_row"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::crosstab::Strategy;
use crate::db::sqlite::DbPath;

/// Folder under the home directory holding crosstab's own files.
const HOME_SUBDIR: &str = ".crosstab";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// External engine descriptors.
    pub engines: EngineSettings,

    /// Internal database used for CSV sources.
    pub internal_db: InternalDbSettings,

    /// CSV ingestion.
    pub csv: CsvSettings,

    /// Query execution.
    pub query: QuerySettings,
}

/// External engine descriptor configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Folder holding `<engine>.toml` descriptor files (supports ${ENV_VAR}).
    pub descriptor_dir: Option<String>,
}

/// Internal database configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InternalDbSettings {
    /// File path, or ":memory:" (supports ${ENV_VAR}).
    pub path: Option<String>,
}

/// CSV ingestion settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsvSettings {
    /// Single-byte field delimiter.
    pub delimiter: String,
}

impl Default for CsvSettings {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
        }
    }
}

/// Query execution settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Per-query timeout in milliseconds; 0 disables.
    pub timeout_ms: u64,

    /// How cross-tab cells are queried.
    pub strategy: Strategy,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. `./crosstab.toml`
    /// 2. Environment variable `CROSSTAB_CONFIG`
    /// 3. `~/.config/crosstab/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        let local_config = PathBuf::from("crosstab.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Ok(path) = env::var("CROSSTAB_CONFIG") {
            return Self::from_file(&path);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("crosstab").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Folder searched for external engine descriptors.
    ///
    /// Defaults to `~/.crosstab/engines`.
    pub fn descriptor_dir(&self) -> Result<PathBuf, SettingsError> {
        match &self.engines.descriptor_dir {
            Some(dir) => Ok(PathBuf::from(expand_env_vars(dir)?)),
            None => Ok(home_subdir().join("engines")),
        }
    }

    /// Location of the internal database.
    ///
    /// Defaults to `~/.crosstab/internal.db`.
    pub fn internal_db_path(&self) -> Result<DbPath, SettingsError> {
        match &self.internal_db.path {
            Some(path) => Ok(DbPath::parse(&expand_env_vars(path)?)),
            None => Ok(DbPath::File(home_subdir().join("internal.db"))),
        }
    }

    /// The CSV delimiter as a byte.
    pub fn csv_delimiter(&self) -> Result<u8, SettingsError> {
        match self.csv.delimiter.as_bytes() {
            [b] => Ok(*b),
            _ => Err(SettingsError::InvalidConfig(format!(
                "csv.delimiter must be a single byte, got '{}'",
                self.csv.delimiter
            ))),
        }
    }

    /// The per-query timeout, if enabled.
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query.timeout_ms > 0).then(|| Duration::from_millis(self.query.timeout_ms))
    }
}

fn home_subdir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(HOME_SUBDIR)
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            // $VAR ends at the first non-alphanumeric/underscore
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                result.push('$');
                continue;
            }
        }
        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
