//! Configuration module for crosstab.
//!
//! Handles the TOML settings file and environment variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, CsvSettings, EngineSettings, InternalDbSettings, QuerySettings, Settings,
    SettingsError,
};
