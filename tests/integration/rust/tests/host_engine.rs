//! Host engine integration tests: pooled instances over the interop bridge

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use core_types::{ScriptError, Value};
use interpreter::interop::{DescriptorBuilder, UserDataType};
use interpreter::Script;
use parking_lot::Mutex;
use script_host::{EngineConfig, ScriptEngine};

/// Host-side message log scripts append to
struct Journal {
    entries: Mutex<Vec<String>>,
    writes: AtomicUsize,
}

impl Journal {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Vec::new()),
            writes: AtomicUsize::new(0),
        })
    }
}

impl UserDataType for Journal {
    fn type_name() -> &'static str {
        "Journal"
    }

    fn describe(builder: &mut DescriptorBuilder<Self>) {
        builder
            .property("count", |j| Value::from(j.entries.lock().len() as i64))
            .method("write", |_ctx, j, args| {
                let text = args.get(0).to_string();
                j.entries.lock().push(text);
                j.writes.fetch_add(1, Ordering::SeqCst);
                Ok(Value::void())
            })
            .display(|j| format!("Journal({})", j.entries.lock().len()));
    }
}

#[test]
fn test_trigger_style_function_cache() {
    let engine = ScriptEngine::new();
    let journal = Journal::new();
    engine.register_object(journal.clone(), "journal").unwrap();
    engine
        .load_function(
            "on_line",
            "local line, hp = ...\nif hp < 20 then journal:write('low: ' .. line) end",
        )
        .unwrap();

    for (line, hp) in [("hp 10/100", 10), ("you swing", 80), ("hp 5/100", 5)] {
        engine
            .execute_function("on_line", vec![Value::from(line), Value::from(hp)])
            .unwrap();
    }

    assert_eq!(
        journal.entries.lock().as_slice(),
        ["low: hp 10/100", "low: hp 5/100"]
    );
    let stats = engine.statistics();
    assert_eq!(stats.scripts_run, 3);
    assert_eq!(stats.scripts_run_from_cache, 2);
    assert_eq!(stats.instances_created, 1);
}

#[test]
fn test_global_variables_bridge_host_and_scripts() {
    let engine = ScriptEngine::new();
    engine.global_variables().set("target", Value::from("orc"));

    engine.execute("global.seen = global.target .. '!'").unwrap();
    assert_eq!(engine.global_variables().get("seen").as_str(), Some("orc!"));
}

#[test]
fn test_concurrent_executions_share_host_object() {
    let engine = ScriptEngine::new();
    let journal = Journal::new();
    engine.register_object(journal.clone(), "journal").unwrap();
    engine.load_function("note", "journal:write(...)").unwrap();

    crossbeam::scope(|scope| {
        for worker in 0..4 {
            let engine = engine.clone();
            scope.spawn(move |_| {
                for i in 0..25 {
                    engine
                        .execute_function("note", vec![Value::from(format!("{}-{}", worker, i).as_str())])
                        .unwrap();
                }
            });
        }
    })
    .unwrap();

    assert_eq!(journal.writes.load(Ordering::SeqCst), 100);
    assert_eq!(engine.statistics().active_scripts, 0);
}

#[test]
fn test_dumped_function_runs_in_engine() {
    let compiler = Script::new();
    let function = compiler
        .load_string("return 'precompiled ' .. tostring(global.n)", None, None)
        .unwrap();
    let text = compiler.dump_base64(&function).unwrap();

    let engine = ScriptEngine::new();
    engine.global_variables().set("n", Value::from(3));
    let result = engine.execute(&text).unwrap();
    assert_eq!(result.as_str(), Some("precompiled 3"));
}

#[test]
fn test_cancellation_reaches_handler() {
    let engine = ScriptEngine::new();
    let cancelled = Arc::new(AtomicUsize::new(0));
    let seen = cancelled.clone();
    engine.set_exception_handler(move |err| {
        if matches!(err, ScriptError::Cancelled) {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    });

    let task = engine.execute_async("while true do end");
    std::thread::sleep(Duration::from_millis(20));
    task.cancel();
    let result = task.wait_timeout(Duration::from_secs(5)).expect("task did not stop");
    assert!(matches!(result, Err(ScriptError::Cancelled)));
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);

    assert_eq!(engine.execute("return 1").unwrap().as_number(), Some(1.0));
}

#[test]
fn test_classic_locations_from_config() {
    let config = EngineConfig::from_toml_str("classic_error_locations = true").unwrap();
    let engine = ScriptEngine::with_config(config);
    engine.load_function("boom", "local t = nil\nreturn t.x").unwrap();

    let err = engine.execute_function("boom", Vec::new()).unwrap_err();
    assert!(err.to_string().starts_with("boom:3:"), "{}", err);
}
