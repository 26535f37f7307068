//! Error types for the CLI

use std::path::PathBuf;

use core_types::ScriptError;
use script_host::ConfigError;
use thiserror::Error;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// Compilation or execution failed
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// A file could not be read or written
    #[error("{path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// The `--config` file is unusable
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Statistics could not be rendered
    #[error("cannot render statistics: {0}")]
    Json(#[from] serde_json::Error),

    /// Line editor failure
    #[error("REPL error: {0}")]
    Repl(String),

    /// Flags that do not work together
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CliError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
