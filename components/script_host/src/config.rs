//! Engine configuration

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Idle instances kept by default
pub const DEFAULT_MAX_IDLE_INSTANCES: usize = 32;

/// Errors reading an [`EngineConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for this structure
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings of a [`ScriptEngine`](crate::ScriptEngine)
///
/// Every field has a default, so a TOML file only needs the keys it
/// changes:
///
/// ```
/// use script_host::EngineConfig;
///
/// let config = EngineConfig::from_toml_str("global_script = \"x = 1\"").unwrap();
/// assert_eq!(config.global_script.as_deref(), Some("x = 1"));
/// assert!(!config.check_thread_access);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reject second-thread entry into pooled instances
    pub check_thread_access: bool,
    /// Report error locations as `chunk:line`
    pub classic_error_locations: bool,
    /// Source run before every ad-hoc execution
    pub global_script: Option<String>,
    /// Enable the per-instance performance counters
    pub performance_counters: bool,
    /// Idle instances kept for reuse; extra returned instances are dropped
    pub max_idle_instances: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_thread_access: false,
            classic_error_locations: false,
            global_script: None,
            performance_counters: false,
            max_idle_instances: DEFAULT_MAX_IDLE_INSTANCES,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
