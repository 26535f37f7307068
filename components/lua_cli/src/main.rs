//! Lantern Lua CLI
//!
//! Entry point for `lantern-lua`. Parses arguments and delegates to the
//! [`Runtime`](lua_cli::Runtime).

use std::process::ExitCode;

use clap::Parser as ClapParser;
use lua_cli::{run_repl, Cli, CliError, CliResult, Runtime};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("lantern-lua: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let runtime = Runtime::from_cli(&cli)?;

    if let Some(out) = &cli.dump {
        let source = cli
            .file
            .as_ref()
            .ok_or_else(|| CliError::Usage("--dump needs a script file".to_string()))?;
        let written = runtime.dump_file(source, out, cli.base64)?;
        log::info!("dumped {} to {} ({} bytes)", source.display(), out.display(), written);
    } else if let Some(file) = &cli.file {
        let results = runtime.run_file(file, &cli.args)?;
        if results.iter().any(|v| !v.is_nil()) {
            let line: Vec<String> = results.iter().map(ToString::to_string).collect();
            println!("{}", line.join("\t"));
        }
    } else if let Some(code) = &cli.eval {
        let result = runtime.eval(code)?;
        if !result.is_nil() {
            println!("{}", result);
        }
    } else if cli.repl {
        run_repl(&runtime)?;
    } else if !cli.stats {
        println!("{}", interpreter::VERSION);
        println!();
        println!("Usage:");
        println!("  lantern-lua <FILE> [-- ARGS...]   Run a script or dump");
        println!("  lantern-lua --eval <CODE>         Evaluate inline code");
        println!("  lantern-lua <FILE> --dump <OUT>   Precompile a script");
        println!("  lantern-lua --repl                Start interactive REPL");
        println!();
        println!("Run 'lantern-lua --help' for more options.");
    }

    if cli.stats {
        println!("{}", runtime.statistics_json()?);
        let log = runtime.performance_log();
        if !log.is_empty() {
            print!("{}", log);
        }
    }
    Ok(())
}
