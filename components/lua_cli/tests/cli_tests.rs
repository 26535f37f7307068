//! CLI argument parsing tests

use std::path::PathBuf;

use clap::Parser as ClapParser;
use lua_cli::Cli;

#[test]
fn cli_parse_no_args() {
    let cli = Cli::try_parse_from(["lantern-lua"]).unwrap();

    assert_eq!(cli.file, None);
    assert_eq!(cli.eval, None);
    assert!(!cli.repl);
    assert!(!cli.stats);
    assert!(!cli.classic_errors);
    assert!(cli.args.is_empty());
}

#[test]
fn cli_parse_file_with_script_args() {
    let cli = Cli::try_parse_from(["lantern-lua", "job.lua", "--", "alpha", "beta"]).unwrap();

    assert_eq!(cli.file, Some(PathBuf::from("job.lua")));
    assert_eq!(cli.args, vec!["alpha".to_string(), "beta".to_string()]);
}

#[test]
fn cli_parse_eval_short() {
    let cli = Cli::try_parse_from(["lantern-lua", "-e", "print(1)"]).unwrap();
    assert_eq!(cli.eval.as_deref(), Some("print(1)"));
}

#[test]
fn cli_parse_repl_short() {
    let cli = Cli::try_parse_from(["lantern-lua", "-r"]).unwrap();
    assert!(cli.repl);
}

#[test]
fn cli_parse_dump() {
    let cli =
        Cli::try_parse_from(["lantern-lua", "job.lua", "--dump", "job.luac", "--base64"]).unwrap();

    assert_eq!(cli.dump, Some(PathBuf::from("job.luac")));
    assert!(cli.base64);
}

#[test]
fn cli_base64_requires_dump() {
    assert!(Cli::try_parse_from(["lantern-lua", "job.lua", "--base64"]).is_err());
}

#[test]
fn cli_parse_config_and_flags() {
    let cli = Cli::try_parse_from([
        "lantern-lua",
        "--config",
        "engine.toml",
        "--stats",
        "--perf",
        "--classic-errors",
    ])
    .unwrap();

    assert_eq!(cli.config, Some(PathBuf::from("engine.toml")));
    assert!(cli.stats);
    assert!(cli.perf);
    assert!(cli.classic_errors);
}

#[test]
fn cli_unknown_flag_is_rejected() {
    assert!(Cli::try_parse_from(["lantern-lua", "--no-such-flag"]).is_err());
}
