//! End-to-end tests through the CLI runtime

use std::io::Write as _;

use lua_cli::{ReplOutcome, ReplSession, Runtime};
use script_host::EngineConfig;

#[test]
fn test_e2e_eval() {
    let runtime = Runtime::new(EngineConfig::default());
    let result = runtime.eval("return (10 + 20) * 2 - 18").unwrap();
    assert_eq!(result.as_number(), Some(42.0));
}

#[test]
fn test_e2e_file_then_dump_then_run() {
    let runtime = Runtime::new(EngineConfig::default());
    let mut source = tempfile::Builder::new().suffix(".lua").tempfile().unwrap();
    writeln!(source, "local function fib(n) if n < 2 then return n end return fib(n - 1) + fib(n - 2) end").unwrap();
    writeln!(source, "local n = ...").unwrap();
    writeln!(source, "return fib(n and tonumber(n) or 10)").unwrap();

    let results = runtime.run_file(source.path(), &["15".to_string()]).unwrap();
    assert_eq!(results[0].as_number(), Some(610.0));

    let dump = tempfile::NamedTempFile::new().unwrap();
    runtime.dump_file(source.path(), dump.path(), false).unwrap();
    let results = runtime.run_file(dump.path(), &[]).unwrap();
    assert_eq!(results[0].as_number(), Some(55.0));
}

#[test]
fn test_e2e_repl_session() {
    let runtime = Runtime::new(EngineConfig::default());
    let mut session = ReplSession::new(&runtime);

    assert_eq!(session.feed("local co = coroutine.wrap(function()"), ReplOutcome::Incomplete);
    assert_eq!(session.feed("  coroutine.yield(1) coroutine.yield(2)"), ReplOutcome::Incomplete);
    assert_eq!(session.feed("end) first = co() second = co()"), ReplOutcome::Empty);
    assert_eq!(session.feed("first + second"), ReplOutcome::Value("3".to_string()));

    let stats = runtime.engine().statistics();
    assert_eq!(stats.scripts_run, 2);
    assert_eq!(stats.error_count, 0);
}
