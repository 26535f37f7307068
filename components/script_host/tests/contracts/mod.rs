//! Contract tests for the script_host public API

use std::io::Write as _;
use std::sync::Arc;

use core_types::ScriptError;
use interpreter::{InlinePort, Job, ExecutionPort};
use script_host::{
    hash_source, ConfigError, EngineConfig, ScriptEngine, Statistics, DEFAULT_MAX_IDLE_INSTANCES,
};

// ============================================================================
// Type contracts
// ============================================================================

#[test]
fn test_engine_is_send_sync_clone() {
    fn assert_send_sync<T: Send + Sync + Clone>() {}
    assert_send_sync::<ScriptEngine>();
}

#[test]
fn test_clones_share_state() {
    let engine = ScriptEngine::new();
    let clone = engine.clone();
    clone.load_function("f", "return 1").unwrap();
    assert!(engine.is_function_loaded("f"));
    engine.execute("return 1").unwrap();
    assert_eq!(clone.statistics().scripts_run, 1);
}

// ============================================================================
// Configuration contracts
// ============================================================================

#[test]
fn test_default_config() {
    let engine = ScriptEngine::default();
    let config = engine.config();
    assert!(!config.check_thread_access);
    assert!(!config.classic_error_locations);
    assert!(!config.performance_counters);
    assert_eq!(config.global_script, None);
    assert_eq!(config.max_idle_instances, DEFAULT_MAX_IDLE_INSTANCES);
}

#[test]
fn test_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "classic_error_locations = true").unwrap();
    writeln!(file, "global_script = \"base = 10\"").unwrap();

    let config = EngineConfig::from_file(file.path()).unwrap();
    let engine = ScriptEngine::with_config(config);
    assert_eq!(engine.execute("return base + 1").unwrap().as_number(), Some(11.0));

    let err = engine.execute("local t = nil\nreturn t.x").unwrap_err();
    assert!(err.to_string().starts_with("chunk_"), "{}", err);
    assert!(err.to_string().contains(":2:"), "{}", err);
}

#[test]
fn test_invalid_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "check_thread_access = 3").unwrap();
    assert!(matches!(
        EngineConfig::from_file(file.path()),
        Err(ConfigError::Parse(_))
    ));
}

// ============================================================================
// Statistics contracts
// ============================================================================

#[test]
fn test_fresh_engine_statistics_are_zero() {
    assert_eq!(ScriptEngine::new().statistics(), Statistics::default());
}

#[test]
fn test_statistics_json_snapshot() {
    let engine = ScriptEngine::new();
    engine.execute("return 1").unwrap();
    let _ = engine.execute("error('x')");

    let json = engine.statistics().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["scripts_run"], 2);
    assert_eq!(value["error_count"], 1);
    assert_eq!(value["instances_created"], 1);
    assert_eq!(value["active_scripts"], 0);
}

#[test]
fn test_reset_statistics() {
    let engine = ScriptEngine::new();
    engine.execute("return 1").unwrap();
    engine.reset_statistics();
    assert_eq!(engine.statistics().scripts_run, 0);
}

#[test]
fn test_adapter_statistics_follow_config() {
    let engine = ScriptEngine::new();
    assert!(!engine.adapter_statistics().is_enabled());

    let config = EngineConfig {
        performance_counters: true,
        ..EngineConfig::default()
    };
    let engine = ScriptEngine::with_config(config);
    assert!(engine.adapter_statistics().is_enabled());
}

// ============================================================================
// Function cache contracts
// ============================================================================

#[test]
fn test_hash_source_contract() {
    let hash = hash_source("return 1");
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_eq!(hash, hash_source("return 1"));
    assert_ne!(hash, hash_source("return 2"));
}

#[test]
fn test_function_not_found_is_not_catchable() {
    let err = ScriptEngine::new()
        .execute_function("nothing", Vec::new())
        .unwrap_err();
    assert!(!err.is_catchable());
    assert_eq!(err.to_string(), "function 'nothing' was not found");
}

#[test]
fn test_invalid_function_name_is_syntax_error() {
    let engine = ScriptEngine::new();
    let err = engine.load_function("not a name", "return 1").unwrap_err();
    assert!(matches!(err, ScriptError::Syntax(_)));
    assert!(!engine.is_function_loaded("not a name"));
}

// ============================================================================
// Execution port contracts
// ============================================================================

struct RecordingPort {
    jobs: parking_lot::Mutex<usize>,
}

impl ExecutionPort for RecordingPort {
    fn spawn(&self, job: Job) {
        *self.jobs.lock() += 1;
        InlinePort.spawn(job);
    }
}

#[test]
fn test_async_uses_configured_port() {
    let port = Arc::new(RecordingPort {
        jobs: parking_lot::Mutex::new(0),
    });
    let engine = ScriptEngine::with_port(EngineConfig::default(), port.clone());

    let task = engine.execute_async("return 'inline'");
    assert_eq!(task.wait().unwrap().as_str(), Some("inline"));
    assert_eq!(*port.jobs.lock(), 1);
}
