//! Contract tests for interpreter API
//!
//! These tests pin down the public surface other crates build on.

use std::sync::Arc;
use std::time::Duration;

use core_types::{ScriptError, SourceRef, Value};
use interpreter::{
    ActionType, Debugger, DebuggerAction, ExecutionControlToken, ExecutionPort, InlinePort,
    PerformanceCounter, PerformanceStatistics, Script, ScriptOptions, ScriptTask,
    DEFAULT_CALL_STACK_LIMIT,
};

fn assert_send_sync<T: Send + Sync>() {}

/// Scripts can be shared across threads behind an `Arc`
#[test]
fn test_script_is_send_sync() {
    assert_send_sync::<Script>();
    assert_send_sync::<ExecutionControlToken>();
    assert_send_sync::<PerformanceStatistics>();
}

/// Default options check thread access and use the new-style locations
#[test]
fn test_default_options_contract() {
    let options = ScriptOptions::default();
    assert!(options.check_thread_access);
    assert!(!options.use_classic_error_locations);
    assert_eq!(options.call_stack_limit, DEFAULT_CALL_STACK_LIMIT);
}

/// `update_options` is observed by later calls
#[test]
fn test_update_options_contract() {
    let script = Script::new();
    script.update_options(|o| o.use_classic_error_locations = true);
    assert!(script.options().use_classic_error_locations);
    let f = script.load_string("error('x')", None, Some("c")).unwrap();
    assert_eq!(script.call(&f, vec![]).unwrap_err().to_string(), "c:1: x");
}

/// Every script gets a distinct id
#[test]
fn test_script_ids_are_unique() {
    assert_ne!(Script::new().id(), Script::new().id());
}

/// `call_multi` never returns a tuple value
#[test]
fn test_call_multi_contract() {
    let script = Script::new();
    let f = script.load_string("return", None, None).unwrap();
    assert!(script.call_multi(&f, vec![]).unwrap().is_empty());
}

/// A cancelled token stops a call before it does any work
#[test]
fn test_pre_cancelled_token_contract() {
    let script = Script::new();
    let f = script
        .load_string("local function g() return 1 end return g()", None, None)
        .unwrap();
    let token = ExecutionControlToken::new();
    token.cancel();
    let err = script.call_with_token(&token, &f, vec![]).unwrap_err();
    assert!(matches!(err, ScriptError::Cancelled));
    assert!(!err.is_catchable());
}

/// Inline ports finish before `call_async` returns
#[test]
fn test_inline_port_contract() {
    let script = Arc::new(Script::new());
    let task = script.do_string_async(&InlinePort, ExecutionControlToken::new(), "return 5");
    let result = task.wait_timeout(Duration::from_millis(0)).unwrap();
    assert_eq!(result.unwrap().as_number(), Some(5.0));
}

/// Custom ports receive every job
#[test]
fn test_custom_port_contract() {
    struct CountingPort(parking_lot::Mutex<usize>);

    impl ExecutionPort for CountingPort {
        fn spawn(&self, job: interpreter::Job) {
            *self.0.lock() += 1;
            job();
        }
    }

    let port = CountingPort(parking_lot::Mutex::new(0));
    let task: ScriptTask<u8> = ScriptTask::spawn(&port, ExecutionControlToken::new(), |_| Ok(3));
    assert_eq!(task.wait().unwrap(), 3);
    assert_eq!(*port.0.lock(), 1);
}

/// Counters are disabled by default and report nothing
#[test]
fn test_performance_disabled_by_default() {
    let script = Script::new();
    script.do_string("return 1").unwrap();
    assert!(script
        .performance_stats()
        .result(PerformanceCounter::Execution)
        .is_none());
    assert!(script.performance_stats().performance_log().is_empty());
}

/// Debuggers only have to decide on actions
#[test]
fn test_minimal_debugger_contract() {
    struct Runner;

    impl Debugger for Runner {
        fn get_action(&self, _ip: usize, _sref: Option<SourceRef>) -> DebuggerAction {
            DebuggerAction::new(ActionType::Run)
        }
    }

    let script = Script::new();
    script.attach_debugger(Arc::new(Runner));
    assert_eq!(script.do_string("return 2 + 2").unwrap().as_number(), Some(4.0));
}

/// Globals set by the host are visible to scripts and vice versa
#[test]
fn test_globals_contract() {
    let script = Script::new();
    script.globals().set_str("host_value", Value::from(7));
    script.do_string("script_value = host_value * 2").unwrap();
    assert_eq!(script.globals().get_str("script_value").as_number(), Some(14.0));
    assert_eq!(
        script.call_global("tostring", vec![Value::from(true)]).unwrap().as_str(),
        Some("true")
    );
}
