//! Command-line arguments

use std::path::PathBuf;

use clap::Parser;

/// Lantern Lua command-line runner
#[derive(Debug, Parser)]
#[command(name = "lantern-lua", version, about = "Run Lantern Lua scripts")]
pub struct Cli {
    /// Script or precompiled dump to run
    pub file: Option<PathBuf>,

    /// Arguments passed to the script as `...`
    #[arg(last = true)]
    pub args: Vec<String>,

    /// Evaluate inline code
    #[arg(short, long, value_name = "CODE")]
    pub eval: Option<String>,

    /// Start the interactive REPL
    #[arg(short, long)]
    pub repl: bool,

    /// Engine configuration file (TOML)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Compile FILE and write its binary dump to OUT instead of running it
    #[arg(long, value_name = "OUT")]
    pub dump: Option<PathBuf>,

    /// Write the dump as base64 text that `load` accepts
    #[arg(long, requires = "dump")]
    pub base64: bool,

    /// Print engine statistics as JSON when done
    #[arg(long)]
    pub stats: bool,

    /// Report error locations as `chunk:line`
    #[arg(long)]
    pub classic_errors: bool,

    /// Collect performance counters
    #[arg(long)]
    pub perf: bool,
}
