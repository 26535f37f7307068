//! Lantern Lua command-line library
//!
//! Argument parsing, the [`Runtime`] that runs files, inline code and dumps,
//! and the interactive REPL behind the `lantern-lua` binary.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod repl;
pub mod runtime;

pub use cli::Cli;
pub use error::{CliError, CliResult};
pub use repl::{run_repl, ReplOutcome, ReplSession};
pub use runtime::Runtime;
