//! Integration tests: execution control, debugging, dumps and interop

use std::io::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use core_types::{DumpError, ScriptError, SourceRef, Value};
use interpreter::interop::{DescriptorBuilder, GlobalVariables, TypeRegistry, UserDataType};
use interpreter::{
    ActionType, Debugger, DebuggerAction, ExecutionControlToken, PerformanceCounter, Script,
    ScriptOptions, ThreadPort, WatchItem, WatchType, BASE64_DUMP_HEADER,
};
use parking_lot::Mutex;

fn wait_until_busy(script: &Script) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while script.is_idle() {
        assert!(Instant::now() < deadline, "script never started");
        std::thread::sleep(Duration::from_millis(5));
    }
}

// ============================================================================
// Cancellation and thread affinity
// ============================================================================

#[test]
fn test_cancel_at_loop_back_edge() {
    let script = Arc::new(Script::new());
    let f = script.load_string("while true do end", None, None).unwrap();
    let task = script.call_async(
        &ThreadPort::named("spin"),
        ExecutionControlToken::new(),
        f,
        vec![],
    );
    wait_until_busy(&script);
    task.cancel();
    assert!(matches!(task.wait(), Err(ScriptError::Cancelled)));
    assert!(script.is_idle());
}

#[test]
fn test_cancel_wakes_sleep() {
    let script = Arc::new(Script::new());
    let started = Instant::now();
    let task = script.do_string_async(
        &ThreadPort::named("sleeper"),
        ExecutionControlToken::new(),
        "sleep(60000) return 1",
    );
    wait_until_busy(&script);
    task.cancel();
    assert!(matches!(task.wait(), Err(ScriptError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[test]
fn test_pcall_does_not_swallow_cancellation() {
    let script = Arc::new(Script::new());
    let task = script.do_string_async(
        &ThreadPort::named("guarded"),
        ExecutionControlToken::new(),
        "while true do pcall(function() end) end",
    );
    wait_until_busy(&script);
    task.cancel();
    assert!(matches!(task.wait(), Err(ScriptError::Cancelled)));
}

#[test]
fn test_second_thread_is_rejected() {
    let script = Arc::new(Script::new());
    let task = script.do_string_async(
        &ThreadPort::named("owner-thread"),
        ExecutionControlToken::new(),
        "while true do end",
    );
    wait_until_busy(&script);

    match script.do_string("return 1") {
        Err(ScriptError::ThreadAccessViolation { owner, .. }) => {
            assert_eq!(owner, "owner-thread");
        }
        other => panic!("expected a thread access violation, got {:?}", other),
    }

    task.cancel();
    assert!(task.wait().is_err());
    assert_eq!(script.do_string("return 1").unwrap().as_number(), Some(1.0));
}

#[test]
fn test_recursive_metamethod_fails_on_default_thread() {
    let worker = std::thread::spawn(|| {
        Script::new()
            .do_string(
                "local t = setmetatable({}, {__index = function(t, k) return t[k] end}) \
                 return t.x",
            )
            .map(|_| ())
            .map_err(|err| err.to_string())
    });
    let message = worker.join().expect("worker thread died").unwrap_err();
    assert!(message.contains("stack overflow"), "{}", message);
}

#[test]
fn test_nested_resumes_share_the_nesting_limit() {
    let worker = std::thread::spawn(|| {
        Script::new()
            .do_string(
                "local function nest() \
                   local ok, err = pcall(function() \
                     local co = coroutine.create(nest) \
                     local _, inner = coroutine.resume(co) \
                     error(inner, 0) \
                   end) \
                   error(err, 0) \
                 end \
                 return nest()",
            )
            .map(|_| ())
            .map_err(|err| err.to_string())
    });
    let message = worker.join().expect("worker thread died").unwrap_err();
    assert!(message.contains("stack overflow"), "{}", message);
}

#[test]
fn test_worker_stack_fits_a_raised_nesting_limit() {
    let mut options = ScriptOptions::default();
    options.max_nested_calls = 200;
    let script = Arc::new(Script::with_options(options));
    let task = script.do_string_async(
        &ThreadPort::named("deep"),
        ExecutionControlToken::new(),
        "local t = setmetatable({}, {__index = function(t, k) return t[k] end}) return t.x",
    );
    match task.wait() {
        Err(err) => assert!(err.to_string().contains("stack overflow"), "{}", err),
        Ok(value) => panic!("expected a stack overflow, got {:?}", value),
    }
}

#[test]
fn test_unchecked_thread_waits_its_turn() {
    let mut options = ScriptOptions::default();
    options.check_thread_access = false;
    let script = Arc::new(Script::with_options(options));
    let task = script.do_string_async(
        &ThreadPort::named("first"),
        ExecutionControlToken::new(),
        "sleep(50) return 1",
    );
    wait_until_busy(&script);
    assert_eq!(script.do_string("return 2").unwrap().as_number(), Some(2.0));
    assert_eq!(task.wait().unwrap().as_number(), Some(1.0));
}

// ============================================================================
// Dumps and loading
// ============================================================================

#[test]
fn test_dump_round_trip_into_another_script() {
    let source = Script::new();
    let f = source
        .load_string("local n = ... local s = 0 for i = 1, n do s = s + i end return s", None, Some("sum"))
        .unwrap();
    let bytes = source.dump(&f, Vec::new()).unwrap();

    let target = Script::new();
    let loaded = target.load_stream(bytes.as_slice(), None, Some("sum")).unwrap();
    let result = target.call(&loaded, vec![Value::from(10)]).unwrap();
    assert_eq!(result.as_number(), Some(55.0));
}

#[test]
fn test_dump_base64_through_load_string() {
    let script = Script::new();
    let f = script.load_string("return 'dumped'", None, None).unwrap();
    let text = script.dump_base64(&f).unwrap();
    assert!(text.starts_with(BASE64_DUMP_HEADER));

    let loaded = script.load_string(&text, None, None).unwrap();
    assert_eq!(script.call(&loaded, vec![]).unwrap().as_str(), Some("dumped"));
}

#[test]
fn test_dump_rejects_captured_upvalues() {
    let script = Script::new();
    let inner = script
        .do_string("local x = 1 return function() return x end")
        .unwrap();
    let err = script.dump(&inner, Vec::new()).unwrap_err();
    assert!(matches!(err, ScriptError::Dump(DumpError::UnsupportedUpvalues)));
}

#[test]
fn test_load_and_do_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "return 2 + 3").unwrap();
    let script = Script::new();
    assert_eq!(script.do_file(file.path()).unwrap().as_number(), Some(5.0));
    let name = file.path().display().to_string();
    assert_eq!(script.source_code(0).unwrap().name, name);
}

#[test]
fn test_load_function_body_uses_varargs() {
    let script = Script::new();
    let f = script.load_function("local a, b = ... return a * b", None, Some("mul")).unwrap();
    assert_eq!(
        script.call(&f, vec![Value::from(6), Value::from(7)]).unwrap().as_number(),
        Some(42.0)
    );
}

#[test]
fn test_function_of_other_script_is_rejected() {
    let a = Script::new();
    let b = Script::new();
    let f = a.load_string("return 1", None, None).unwrap();
    let message = b.call(&f, vec![]).unwrap_err().to_string();
    assert!(message.contains("different script"), "{}", message);
}

#[test]
fn test_performance_counters() {
    let script = Script::new();
    script.performance_stats().set_enabled(true);
    script.do_string("return 1").unwrap();
    let compiled = script
        .performance_stats()
        .result(PerformanceCounter::Compilation)
        .unwrap();
    let executed = script
        .performance_stats()
        .result(PerformanceCounter::Execution)
        .unwrap();
    assert_eq!(compiled.instances, 1);
    assert_eq!(executed.instances, 1);
    assert!(script.performance_stats().performance_log().contains("Execution"));
}

// ============================================================================
// Debugger
// ============================================================================

#[derive(Default)]
struct RecordingDebugger {
    step: bool,
    paused_lines: Mutex<Vec<usize>>,
    last_watches: Mutex<Vec<WatchItem>>,
    last_call_stack: Mutex<Vec<WatchItem>>,
    ended: Mutex<usize>,
}

impl Debugger for RecordingDebugger {
    fn get_action(&self, _ip: usize, source_ref: Option<SourceRef>) -> DebuggerAction {
        if let Some(sref) = source_ref {
            self.paused_lines.lock().push(sref.from_line);
        }
        if self.step {
            DebuggerAction::new(ActionType::StepIn)
        } else {
            DebuggerAction::new(ActionType::Run)
        }
    }

    fn signal_execution_ended(&self) {
        *self.ended.lock() += 1;
    }

    fn update(&self, watch_type: WatchType, items: &[WatchItem]) {
        match watch_type {
            WatchType::Watches => *self.last_watches.lock() = items.to_vec(),
            WatchType::CallStack => *self.last_call_stack.lock() = items.to_vec(),
            _ => {}
        }
    }

    fn get_watch_items(&self) -> Vec<String> {
        vec!["a".to_string()]
    }
}

const DEBUGGED: &str = "local a = 1\nlocal b = 2\nreturn a + b";

#[test]
fn test_step_in_visits_each_line() {
    let script = Script::new();
    let debugger = Arc::new(RecordingDebugger {
        step: true,
        ..RecordingDebugger::default()
    });
    let f = script.load_string(DEBUGGED, None, Some("dbg")).unwrap();
    script.attach_debugger(debugger.clone());

    assert_eq!(script.call(&f, vec![]).unwrap().as_number(), Some(3.0));
    let lines = debugger.paused_lines.lock().clone();
    assert!(lines.contains(&1), "{:?}", lines);
    assert!(lines.contains(&2), "{:?}", lines);
    assert!(lines.contains(&3), "{:?}", lines);
    assert_eq!(*debugger.ended.lock(), 1);
}

#[test]
fn test_breakpoint_pauses_and_publishes_watches() {
    let script = Script::new();
    let debugger = Arc::new(RecordingDebugger::default());
    let f = script.load_string(DEBUGGED, None, Some("dbg")).unwrap();
    script.attach_debugger(debugger.clone());

    let placed = script.toggle_breakpoint(0, 3, 1, Some(true)).unwrap();
    assert!(placed.iter().all(|r| r.from_line == 3));
    assert!(!script.breakpoints().is_empty());

    script.call(&f, vec![]).unwrap();
    assert_eq!(debugger.paused_lines.lock().last(), Some(&3));

    let watches = debugger.last_watches.lock().clone();
    assert_eq!(watches.len(), 1);
    assert_eq!(watches[0].value.as_ref().and_then(Value::as_number), Some(1.0));
    assert!(!debugger.last_call_stack.lock().is_empty());
}

#[test]
fn test_detached_debugger_is_not_consulted() {
    let script = Script::new();
    let debugger = Arc::new(RecordingDebugger::default());
    script.attach_debugger(debugger.clone());
    script.detach_debugger();
    script.do_string(DEBUGGED).unwrap();
    assert!(debugger.paused_lines.lock().is_empty());
}

// ============================================================================
// Interop
// ============================================================================

struct Account {
    owner: String,
    balance: Mutex<f64>,
}

impl UserDataType for Account {
    fn type_name() -> &'static str {
        "Account"
    }

    fn describe(builder: &mut DescriptorBuilder<Self>) {
        builder
            .property("owner", |a| Value::from(a.owner.as_str()))
            .property_rw(
                "balance",
                |a| Value::Number(*a.balance.lock()),
                |a, v| {
                    *a.balance.lock() = v.as_number().unwrap_or(0.0);
                    Ok(())
                },
            )
            .method("deposit", |_ctx, a, args| {
                let amount = args.check_number(0, "deposit")?;
                let mut balance = a.balance.lock();
                *balance += amount;
                Ok(Value::Number(*balance))
            })
            .display(|a| format!("Account({})", a.owner));
    }
}

fn bank() -> (Script, Arc<Account>) {
    let registry = TypeRegistry::new();
    registry.register::<Account>();
    let account = Arc::new(Account {
        owner: "ada".to_string(),
        balance: Mutex::new(10.0),
    });
    let script = Script::new();
    let value = registry.create(account.clone()).unwrap();
    script.globals().set_str("account", value);
    (script, account)
}

#[test]
fn test_userdata_methods_with_dot_and_colon() {
    let (script, account) = bank();
    let result = script
        .do_string("account:deposit(5) return account.deposit(2.5)")
        .unwrap();
    assert_eq!(result.as_number(), Some(17.5));
    assert_eq!(*account.balance.lock(), 17.5);
}

#[test]
fn test_userdata_properties() {
    let (script, account) = bank();
    let owner = script.do_string("account.balance = 99 return account.owner").unwrap();
    assert_eq!(owner.as_str(), Some("ada"));
    assert_eq!(*account.balance.lock(), 99.0);

    let message = script.do_string("account.owner = 'bob'").unwrap_err().to_string();
    assert!(message.contains("read-only"), "{}", message);
    let message = script.do_string("return account.missing").unwrap_err().to_string();
    assert!(message.contains("cannot access field missing of userdata<Account>"), "{}", message);
}

#[test]
fn test_global_variables_shared_across_scripts() {
    let registry = TypeRegistry::new();
    registry.register::<GlobalVariables>();
    let store = Arc::new(GlobalVariables::new());

    let first = Script::new();
    let second = Script::new();
    for script in [&first, &second] {
        let value = registry.create(store.clone()).unwrap();
        script.globals().set_str("global", value);
    }

    first.do_string("global.hp = 40").unwrap();
    let hp = second.do_string("return global.hp + 2").unwrap();
    assert_eq!(hp.as_number(), Some(42.0));
    assert_eq!(store.get("hp").as_number(), Some(40.0));
    assert!(second.do_string("return global.unset").unwrap().is_nil());
}
