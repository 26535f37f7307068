//! Script execution host for Lantern
//!
//! The host keeps a pool of initialized scripts so that short executions do
//! not pay for building a fresh global environment every time:
//!
//! - [`ScriptEngine`] leases pooled instances, runs ad-hoc source or cached
//!   functions, and reports failures to an optional handler
//! - [`FunctionCache`] keeps named function bodies keyed by their SHA-256,
//!   so an unchanged body is never recompiled
//! - [`ExecutionCounters`] tracks runs, cache hits, errors and instance churn
//! - [`EngineConfig`] reads the engine settings from TOML
//!
//! # Example
//!
//! ```
//! use script_host::ScriptEngine;
//!
//! let engine = ScriptEngine::new();
//! engine.set_global_script(Some("greeting = 'hello'".to_string()));
//!
//! let value = engine.execute("return greeting .. ' world'").unwrap();
//! assert_eq!(value.as_str(), Some("hello world"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod counters;
pub mod engine;
pub mod function_cache;
pub mod pool;

pub use config::{ConfigError, EngineConfig, DEFAULT_MAX_IDLE_INSTANCES};
pub use counters::{ActiveGuard, ExecutionCounters, Statistics};
pub use engine::{ExceptionHandler, ScriptEngine};
pub use function_cache::{hash_source, wrap_function_source, FunctionCache, FunctionCacheEntry};
pub use pool::ObjectPool;
