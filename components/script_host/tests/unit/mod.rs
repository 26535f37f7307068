//! Unit tests for the pooled script engine

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use core_types::{ScriptError, Value};
use interpreter::interop::{DescriptorBuilder, UserDataType};
use parking_lot::Mutex;
use script_host::{EngineConfig, ScriptEngine};

// ============================================================================
// Fixtures
// ============================================================================

struct Sensor {
    name: String,
    readings: Mutex<Vec<f64>>,
}

impl UserDataType for Sensor {
    fn type_name() -> &'static str {
        "Sensor"
    }

    fn describe(builder: &mut DescriptorBuilder<Self>) {
        builder
            .property("name", |s| Value::from(s.name.as_str()))
            .method("record", |_ctx, s, args| {
                let value = args.check_number(0, "record")?;
                let mut readings = s.readings.lock();
                readings.push(value);
                Ok(Value::from(readings.len() as i64))
            })
            .method("explode", |_ctx, _s, _args| -> Result<Value, ScriptError> {
                panic!("sensor hardware fault")
            });
    }
}

fn sensor(name: &str) -> Arc<Sensor> {
    Arc::new(Sensor {
        name: name.to_string(),
        readings: Mutex::new(Vec::new()),
    })
}

// ============================================================================
// Ad-hoc execution
// ============================================================================

#[test]
fn test_execute_returns_value() {
    let engine = ScriptEngine::new();
    let value = engine.execute("local t = {} for i = 1, 4 do t[i] = i end return #t").unwrap();
    assert_eq!(value.as_number(), Some(4.0));
}

#[test]
fn test_globals_do_not_leak_between_fresh_instances() {
    let engine = ScriptEngine::new();
    engine.execute("leaked = 1").unwrap();
    engine.reset();
    assert!(engine.execute("return leaked").unwrap().is_nil());
}

#[test]
fn test_global_script_runs_first() {
    let engine = ScriptEngine::new();
    engine.set_global_script(Some("prefix = 'log: '".to_string()));
    let value = engine.execute("return prefix .. 'ready'").unwrap();
    assert_eq!(value.as_str(), Some("log: ready"));
}

#[test]
fn test_global_script_error_does_not_block() {
    let engine = ScriptEngine::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    engine.set_exception_handler(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    engine.set_global_script(Some("error('broken setup')".to_string()));

    let value = engine.execute("return 5").unwrap();
    assert_eq!(value.as_number(), Some(5.0));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(engine.statistics().error_count, 1);
}

#[test]
fn test_errors_reach_handler_and_counters() {
    let engine = ScriptEngine::new();
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    engine.set_exception_handler(move |err| sink.lock().push(err.to_string()));

    let err = engine.execute("error('bad input')").unwrap_err();
    assert!(matches!(err, ScriptError::Runtime(_)));
    assert!(engine.execute("return +").is_err());

    let messages = messages.lock();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].contains("bad input"), "{}", messages[0]);
    assert_eq!(engine.statistics().error_count, 2);
}

#[test]
fn test_validate() {
    let engine = ScriptEngine::new();
    assert!(engine.validate("return 1").is_ok());
    assert!(engine.validate("").is_ok());
    assert!(matches!(engine.validate("if then"), Err(ScriptError::Syntax(_))));
    assert_eq!(engine.statistics().scripts_run, 0);
}

#[test]
fn test_print_sink() {
    let engine = ScriptEngine::new();
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    engine.set_print_sink(Arc::new(move |line: &str| sink.lock().push(line.to_string())));
    engine.execute("print('a', 1)").unwrap();
    assert_eq!(lines.lock().as_slice(), ["a\t1"]);
}

// ============================================================================
// Function cache
// ============================================================================

#[test]
fn test_cached_function_counts_from_cache_on_reuse() {
    let engine = ScriptEngine::new();
    engine.load_function("square", "local n = ... return n * n").unwrap();

    let first = engine.execute_function("square", vec![Value::from(3)]).unwrap();
    assert_eq!(first.as_number(), Some(9.0));
    let stats = engine.statistics();
    assert_eq!(stats.scripts_run, 1);
    assert_eq!(stats.scripts_run_from_cache, 0);

    engine.execute_function("square", vec![Value::from(4)]).unwrap();
    let stats = engine.statistics();
    assert_eq!(stats.scripts_run, 2);
    assert_eq!(stats.scripts_run_from_cache, 1);
    assert_eq!(stats.functions_compiled, 1);
}

#[test]
fn test_first_call_after_warm_load_is_not_from_cache() {
    let engine = ScriptEngine::new();
    engine.execute("return 1").unwrap();
    assert_eq!(engine.idle_instances(), 1);

    // compiled straight into the idle instance
    engine.load_function("f", "return 42").unwrap();
    let value = engine.execute_function("f", Vec::new()).unwrap();
    assert_eq!(value.as_number(), Some(42.0));
    assert_eq!(engine.statistics().scripts_run_from_cache, 0);

    engine.execute_function("f", Vec::new()).unwrap();
    assert_eq!(engine.statistics().scripts_run_from_cache, 1);

    engine.load_function("f", "return 43").unwrap();
    engine.execute_function("f", Vec::new()).unwrap();
    assert_eq!(engine.statistics().scripts_run_from_cache, 1);
    engine.execute_function("f", Vec::new()).unwrap();
    assert_eq!(engine.statistics().scripts_run_from_cache, 2);
}

#[test]
fn test_identical_load_is_noop() {
    let engine = ScriptEngine::new();
    engine.load_function("f", "return 1").unwrap();
    engine.execute_function("f", Vec::new()).unwrap();
    let compiled = engine.statistics().functions_compiled;

    engine.load_function("f", "return 1").unwrap();
    assert_eq!(engine.statistics().functions_compiled, compiled);
}

#[test]
fn test_changed_body_is_observed() {
    let engine = ScriptEngine::new();
    engine.load_function("version", "return 1").unwrap();
    assert_eq!(engine.execute_function("version", Vec::new()).unwrap().as_number(), Some(1.0));

    engine.load_function("version", "return 2").unwrap();
    assert_eq!(engine.execute_function("version", Vec::new()).unwrap().as_number(), Some(2.0));
}

#[test]
fn test_syntax_error_in_load_leaves_cache_untouched() {
    let engine = ScriptEngine::new();
    engine.load_function("f", "return 'old'").unwrap();
    engine.execute_function("f", Vec::new()).unwrap();

    let err = engine.load_function("f", "return (").unwrap_err();
    assert!(matches!(err, ScriptError::Syntax(_)));

    let value = engine.execute_function("f", Vec::new()).unwrap();
    assert_eq!(value.as_str(), Some("old"));
}

#[test]
fn test_unknown_function() {
    let engine = ScriptEngine::new();
    let err = engine.execute_function("missing", Vec::new()).unwrap_err();
    assert!(matches!(err, ScriptError::FunctionNotFound(ref name) if name == "missing"));
    assert_eq!(engine.statistics().error_count, 1);
}

#[test]
fn test_global_function_without_cache_entry() {
    let engine = ScriptEngine::new();
    let value = engine.execute_function("tostring", vec![Value::from(12)]).unwrap();
    assert_eq!(value.as_str(), Some("12"));
}

#[test]
fn test_cached_functions_see_varargs() {
    let engine = ScriptEngine::new();
    engine.load_function("count", "return select('#', ...)").unwrap();
    let value = engine
        .execute_function("count", vec![Value::from(1), Value::Nil, Value::from("x")])
        .unwrap();
    assert_eq!(value.as_number(), Some(3.0));
    assert_eq!(engine.function_names(), vec!["count".to_string()]);
}

// ============================================================================
// Pool management
// ============================================================================

#[test]
fn test_register_object_clears_pool() {
    let engine = ScriptEngine::new();
    engine.execute("return 1").unwrap();
    assert_eq!(engine.idle_instances(), 1);

    engine.register_object(sensor("probe"), "probe").unwrap();
    assert_eq!(engine.idle_instances(), 0);

    let value = engine.execute("probe:record(1.5) return probe.name").unwrap();
    assert_eq!(value.as_str(), Some("probe"));
    assert_eq!(engine.statistics().instances_created, 2);
}

#[test]
fn test_duplicate_prefix_keeps_first_object() {
    let engine = ScriptEngine::new();
    let first = sensor("first");
    engine.register_object(first.clone(), "dev").unwrap();
    engine.register_object(sensor("second"), "dev").unwrap();

    let value = engine.execute("dev:record(2) return dev.name").unwrap();
    assert_eq!(value.as_str(), Some("first"));
    assert_eq!(first.readings.lock().as_slice(), [2.0]);
}

#[test]
fn test_binding_is_visible_right_after_registration() {
    let engine = ScriptEngine::new();
    let stop = AtomicUsize::new(0);

    crossbeam::scope(|scope| {
        for _ in 0..4 {
            let engine = engine.clone();
            let stop = &stop;
            scope.spawn(move |_| {
                for _ in 0..10_000 {
                    if stop.load(Ordering::Relaxed) != 0 {
                        break;
                    }
                    engine.execute("return 1").unwrap();
                }
            });
        }

        for i in 0..50 {
            let prefix = format!("dev{}", i);
            engine.register_object(sensor(&prefix), &prefix).unwrap();
            let name = engine.execute(&format!("return {}.name", prefix)).unwrap();
            assert_eq!(name.as_str(), Some(prefix.as_str()));
        }
        stop.store(1, Ordering::Relaxed);
    })
    .unwrap();
}

#[test]
fn test_panicking_host_function_discards_instance() {
    let engine = ScriptEngine::new();
    engine.register_object(sensor("faulty"), "dev").unwrap();

    let err = engine.execute("dev.explode()").unwrap_err();
    assert!(err.to_string().contains("sensor hardware fault"), "{}", err);

    let stats = engine.statistics();
    assert_eq!(stats.instances_discarded, 1);
    assert_eq!(stats.active_scripts, 0);
    assert_eq!(engine.idle_instances(), 0);

    assert_eq!(engine.execute("return 7").unwrap().as_number(), Some(7.0));
    assert_eq!(engine.statistics().instances_created, 2);
}

#[test]
fn test_pool_stays_bounded_under_concurrency() {
    let config = EngineConfig {
        max_idle_instances: 2,
        ..EngineConfig::default()
    };
    let engine = ScriptEngine::with_config(config);
    engine.load_function("add", "local a, b = ... return a + b").unwrap();

    crossbeam::scope(|scope| {
        for worker in 0..6 {
            let engine = engine.clone();
            scope.spawn(move |_| {
                for i in 0..20 {
                    let value = engine
                        .execute_function("add", vec![Value::from(worker), Value::from(i)])
                        .unwrap();
                    assert_eq!(value.as_integer(), Some(worker + i));
                }
            });
        }
    })
    .unwrap();

    let stats = engine.statistics();
    assert_eq!(stats.scripts_run, 120);
    assert_eq!(stats.active_scripts, 0);
    assert!(stats.instances_created <= 6, "{:?}", stats);
    assert!(engine.idle_instances() <= 2);
}

#[test]
fn test_global_variables_survive_pooling() {
    let engine = ScriptEngine::new();
    engine.execute("global.visits = (global.visits or 0) + 1").unwrap();
    engine.execute("global.visits = global.visits + 1").unwrap();
    assert_eq!(engine.global_variables().get("visits").as_number(), Some(2.0));

    engine.reset();
    assert!(engine.execute("return global.visits").unwrap().is_nil());
}

// ============================================================================
// Asynchronous execution
// ============================================================================

#[test]
fn test_execute_async() {
    let engine = ScriptEngine::new();
    let task = engine.execute_async("return 6 * 7");
    assert_eq!(task.wait().unwrap().as_number(), Some(42.0));
}

#[test]
fn test_execute_function_async() {
    let engine = ScriptEngine::new();
    engine.load_function("greet", "return 'hi ' .. ...").unwrap();
    let task = engine.execute_function_async("greet", vec![Value::from("ada")]);
    assert_eq!(task.wait().unwrap().as_str(), Some("hi ada"));
}

#[test]
fn test_cancel_async_execution() {
    let engine = ScriptEngine::new();
    let task = engine.execute_async("while true do end");
    std::thread::sleep(Duration::from_millis(20));
    task.cancel();
    let result = task
        .wait_timeout(Duration::from_secs(5))
        .expect("cancelled task should finish");
    assert!(matches!(result, Err(ScriptError::Cancelled)));
    assert_eq!(engine.statistics().error_count, 1);
}

#[test]
fn test_blank_async_is_ready() {
    let engine = ScriptEngine::new();
    let task = engine.execute_async("");
    assert!(task.try_result().is_some());
}
