//! Pooled script execution
//!
//! A [`ScriptEngine`] keeps a free list of initialized [`Script`] instances.
//! Every execution leases one instance, runs, and hands it back; an instance
//! left mid-execution by a panic is dropped instead of being reused. Named
//! functions loaded through [`ScriptEngine::load_function`] are compiled
//! into every instance, and recompiled only when their source changes.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use core_types::{ScriptError, Value};
use indexmap::IndexMap;
use interpreter::interop::{GlobalVariables, TypeRegistry, UserDataType, GLOBAL_VARIABLES_NAME};
use interpreter::{
    ExecutionControlToken, ExecutionPort, PerformanceStatistics, PrintSink, Script, ScriptOptions,
    ScriptTask, ThreadPort,
};
use log::{debug, warn};
use parking_lot::RwLock;

use crate::config::EngineConfig;
use crate::counters::{ExecutionCounters, Statistics};
use crate::function_cache::{FunctionCache, FunctionCacheEntry};
use crate::pool::ObjectPool;

/// Receives every error raised by an execution
pub type ExceptionHandler = Arc<dyn Fn(&ScriptError) + Send + Sync>;

/// A pooled script and the cached functions compiled into it
struct ScriptInstance {
    script: Arc<Script>,
    /// Cached function name to the hash it was compiled from
    functions: HashMap<String, String>,
    /// Pool generation the instance was initialized for
    generation: u64,
}

struct EngineInner {
    config: EngineConfig,
    types: TypeRegistry,
    adapters: PerformanceStatistics,
    shared_objects: RwLock<IndexMap<String, Value>>,
    global_variables: RwLock<Arc<GlobalVariables>>,
    functions: FunctionCache,
    pool: ObjectPool<ScriptInstance>,
    generation: AtomicU64,
    counters: ExecutionCounters,
    global_script: RwLock<Option<String>>,
    exception_handler: RwLock<Option<ExceptionHandler>>,
    print: RwLock<Option<PrintSink>>,
    port: Arc<dyn ExecutionPort>,
}

/// Executes source and cached functions on pooled script instances
///
/// Cloning is cheap; clones share the pool, the cache and the counters.
///
/// # Examples
///
/// ```
/// use core_types::Value;
/// use script_host::ScriptEngine;
///
/// let engine = ScriptEngine::new();
/// engine.load_function("double", "local n = ... return n * 2").unwrap();
///
/// let result = engine.execute_function("double", vec![Value::from(21)]).unwrap();
/// assert_eq!(result.as_number(), Some(42.0));
/// assert_eq!(engine.statistics().scripts_run, 1);
/// ```
#[derive(Clone)]
pub struct ScriptEngine {
    inner: Arc<EngineInner>,
}

impl ScriptEngine {
    /// Engine with the default configuration
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Engine whose asynchronous executions run on fresh worker threads
    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_port(config, Arc::new(ThreadPort::named("lantern-script")))
    }

    /// Engine whose asynchronous executions run on `port`
    pub fn with_port(config: EngineConfig, port: Arc<dyn ExecutionPort>) -> Self {
        let adapters = PerformanceStatistics::new();
        adapters.set_enabled(config.performance_counters);
        let types = TypeRegistry::new();
        types.register_timed::<GlobalVariables>(&adapters);

        Self {
            inner: Arc::new(EngineInner {
                pool: ObjectPool::new(config.max_idle_instances),
                global_script: RwLock::new(config.global_script.clone()),
                config,
                types,
                adapters,
                shared_objects: RwLock::new(IndexMap::new()),
                global_variables: RwLock::new(Arc::new(GlobalVariables::new())),
                functions: FunctionCache::new(),
                generation: AtomicU64::new(0),
                counters: ExecutionCounters::new(),
                exception_handler: RwLock::new(None),
                print: RwLock::new(None),
                port,
            }),
        }
    }

    /// Configuration the engine was built with
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Expose `object` to every instance under the global name `prefix`
    ///
    /// The pool is cleared even when `prefix` is already bound, in which
    /// case the existing binding is kept.
    pub fn register_object<T: UserDataType>(
        &self,
        object: Arc<T>,
        prefix: &str,
    ) -> Result<(), ScriptError> {
        let inner = &self.inner;
        let bound = {
            let mut shared = inner.shared_objects.write();
            if shared.contains_key(prefix) {
                debug!("'{}' is already bound; keeping the existing object", prefix);
                Ok(())
            } else {
                inner.types.register_timed::<T>(&inner.adapters);
                inner.types.create(object).map(|value| {
                    shared.insert(prefix.to_string(), value);
                    debug!("bound host object '{}' as {}", T::type_name(), prefix);
                })
            }
        };
        // instances built from here on see the binding
        inner.invalidate_pool();
        bound
    }

    /// Forget every registered type and host binding
    pub fn clear_types(&self) {
        let inner = &self.inner;
        inner.shared_objects.write().clear();
        inner.types.clear();
        inner.types.register::<GlobalVariables>();
        inner.invalidate_pool();
    }

    /// Drop every pooled instance and start over with an empty
    /// [`GlobalVariables`] store
    pub fn reset(&self) {
        *self.inner.global_variables.write() = Arc::new(GlobalVariables::new());
        self.inner.invalidate_pool();
    }

    /// The store scripts see as `global`
    pub fn global_variables(&self) -> Arc<GlobalVariables> {
        self.inner.global_variables.read().clone()
    }

    /// Source run before every ad-hoc execution
    pub fn set_global_script(&self, code: Option<String>) {
        *self.inner.global_script.write() = code;
    }

    /// Install the handler receiving every execution error
    pub fn set_exception_handler<F>(&self, handler: F)
    where
        F: Fn(&ScriptError) + Send + Sync + 'static,
    {
        *self.inner.exception_handler.write() = Some(Arc::new(handler));
    }

    /// Remove the exception handler
    pub fn clear_exception_handler(&self) {
        *self.inner.exception_handler.write() = None;
    }

    /// Where `print` output of new instances goes
    pub fn set_print_sink(&self, sink: PrintSink) {
        *self.inner.print.write() = Some(sink);
        self.inner.invalidate_pool();
    }

    // ========================================================================
    // Function cache
    // ========================================================================

    /// Cache a function body under `name` and compile it into every idle
    /// instance
    ///
    /// Loading a body identical to the cached one does nothing. A syntax
    /// error is returned before anything changes.
    pub fn load_function(&self, name: &str, code: &str) -> Result<(), ScriptError> {
        let inner = &self.inner;
        let entry = FunctionCacheEntry::new(name, code);
        if inner.functions.hash_of(name).as_deref() == Some(entry.hash.as_str()) {
            debug!("function '{}' is unchanged", name);
            return Ok(());
        }

        let wrapped = entry.wrapped_source();
        let mut idle = inner.pool.idle();
        let chunks = if idle.is_empty() {
            Script::new().load_string(&wrapped, None, Some(name))?;
            Vec::new()
        } else {
            idle.iter()
                .map(|instance| instance.script.load_string(&wrapped, None, Some(name)))
                .collect::<Result<Vec<_>, _>>()?
        };

        for (instance, chunk) in idle.iter_mut().zip(chunks) {
            instance.script.globals().set_str(name, Value::Nil);
            match instance.script.call(&chunk, Vec::new()) {
                Ok(_) => {
                    instance.functions.insert(name.to_string(), entry.hash.clone());
                    inner.counters.record_compiled();
                }
                Err(err) => {
                    warn!("failed to define '{}' in instance {}: {}", name, instance.script.id(), err);
                    instance.functions.remove(name);
                }
            }
        }
        let updated = idle.len();
        drop(idle);

        inner.functions.insert(entry);
        debug!("function '{}' loaded into {} idle instances", name, updated);
        Ok(())
    }

    /// True once `name` was loaded
    pub fn is_function_loaded(&self, name: &str) -> bool {
        self.inner.functions.get(name).is_some()
    }

    /// Names of the cached functions, in load order
    pub fn function_names(&self) -> Vec<String> {
        self.inner
            .functions
            .entries()
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    /// Run a cached function
    pub fn execute_function(&self, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        self.execute_function_with_token(&ExecutionControlToken::new(), name, args)
    }

    /// Run a cached function under a control token
    ///
    /// # Errors
    ///
    /// [`ScriptError::FunctionNotFound`] when `name` was never loaded and
    /// is not a global function of the instance.
    pub fn execute_function_with_token(
        &self,
        token: &ExecutionControlToken,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        let inner = &self.inner;
        let _active = inner.counters.begin();
        let entry = inner.functions.get(name);

        let result = inner.with_instance(|instance, created| {
            let stale = entry
                .as_ref()
                .is_some_and(|e| instance.functions.get(name) != Some(&e.hash));
            if let Some(entry) = entry.as_ref().filter(|_| stale) {
                inner.compile_into(instance, entry)?;
            }

            let function = instance.script.globals().get_str(name);
            if !function.is_callable() {
                return Err(ScriptError::FunctionNotFound(name.to_string()));
            }
            if let Some(entry) = &entry {
                let ran_before = inner.functions.mark_executed(name, &entry.hash);
                if ran_before && !created && !stale {
                    inner.counters.record_from_cache();
                }
            }
            instance.script.call_with_token(token, &function, args)
        });
        inner.finish(result)
    }

    /// Run a cached function on the engine's execution port
    pub fn execute_function_async(&self, name: &str, args: Vec<Value>) -> ScriptTask {
        let engine = self.clone();
        let name = name.to_string();
        ScriptTask::spawn(
            self.inner.port.as_ref(),
            ExecutionControlToken::new(),
            move |token| engine.execute_function_with_token(token, &name, args),
        )
    }

    // ========================================================================
    // Ad-hoc source
    // ========================================================================

    /// Run source text; blank source returns `nil` without touching the pool
    pub fn execute(&self, code: &str) -> Result<Value, ScriptError> {
        self.execute_with_token(&ExecutionControlToken::new(), code)
    }

    /// Run source text under a control token
    ///
    /// The global script, when set, runs first on the same instance; its
    /// errors are reported and counted but do not stop `code`.
    pub fn execute_with_token(
        &self,
        token: &ExecutionControlToken,
        code: &str,
    ) -> Result<Value, ScriptError> {
        if code.trim().is_empty() {
            return Ok(Value::Nil);
        }
        let inner = &self.inner;
        let _active = inner.counters.begin();
        let global_script = inner.global_script.read().clone();

        let result = inner.with_instance(|instance, _| {
            let script = &instance.script;
            if let Some(global) = global_script.as_deref().filter(|s| !s.trim().is_empty()) {
                let outcome = script
                    .load_string(global, None, Some("global script"))
                    .and_then(|f| script.call_with_token(token, &f, Vec::new()));
                match outcome {
                    Err(ScriptError::Cancelled) => return Err(ScriptError::Cancelled),
                    Err(err) => {
                        warn!("error in the global script: {}", err);
                        inner.report(&err);
                    }
                    Ok(_) => {}
                }
            }

            let function = script.load_string(code, None, None)?;
            script.call_with_token(token, &function, Vec::new())
        });
        inner.finish(result)
    }

    /// Run source text on the engine's execution port
    pub fn execute_async(&self, code: &str) -> ScriptTask {
        if code.trim().is_empty() {
            return ScriptTask::ready(Ok(Value::Nil));
        }
        let engine = self.clone();
        let code = code.to_string();
        ScriptTask::spawn(
            self.inner.port.as_ref(),
            ExecutionControlToken::new(),
            move |token| engine.execute_with_token(token, &code),
        )
    }

    /// Check that `code` compiles, without running it
    pub fn validate(&self, code: &str) -> Result<(), ScriptError> {
        if code.trim().is_empty() {
            return Ok(());
        }
        Script::new().load_string(code, None, Some("validate"))?;
        Ok(())
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Snapshot of the execution counters
    pub fn statistics(&self) -> Statistics {
        self.inner.counters.snapshot()
    }

    /// Zero the execution counters
    pub fn reset_statistics(&self) {
        self.inner.counters.reset();
    }

    /// Time spent building interop descriptors
    pub fn adapter_statistics(&self) -> &PerformanceStatistics {
        &self.inner.adapters
    }

    /// Number of idle pooled instances
    pub fn idle_instances(&self) -> usize {
        self.inner.pool.len()
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("idle_instances", &self.inner.pool.len())
            .field("functions", &self.inner.functions.len())
            .field("statistics", &self.inner.counters.snapshot())
            .finish()
    }
}

impl EngineInner {
    /// Lease an instance for `f`; it is returned to the pool afterwards,
    /// or dropped when `f` panicked or left it mid-execution
    fn with_instance<R, F>(&self, f: F) -> Result<R, ScriptError>
    where
        F: FnOnce(&mut ScriptInstance, bool) -> Result<R, ScriptError>,
    {
        let (mut instance, created) = self.acquire()?;
        match panic::catch_unwind(AssertUnwindSafe(|| f(&mut instance, created))) {
            Ok(result) => {
                self.release(instance);
                result
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                self.discard(instance, &message);
                Err(ScriptError::runtime(format!(
                    "host function panicked: {}",
                    message
                )))
            }
        }
    }

    fn acquire(&self) -> Result<(ScriptInstance, bool), ScriptError> {
        let generation = self.generation.load(Ordering::Acquire);
        while let Some(instance) = self.pool.take() {
            if instance.generation == generation {
                return Ok((instance, false));
            }
        }
        Ok((self.create_instance(generation)?, true))
    }

    fn release(&self, instance: ScriptInstance) {
        if !instance.script.is_idle() {
            self.discard(instance, "left mid-execution");
            return;
        }
        if instance.generation != self.generation.load(Ordering::Acquire) {
            debug!("dropping instance {} of an older pool", instance.script.id());
            return;
        }
        if let Err(instance) = self.pool.put(instance) {
            debug!("pool is full; dropping instance {}", instance.script.id());
        }
    }

    fn discard(&self, instance: ScriptInstance, reason: &str) {
        self.counters.record_instance_discarded();
        warn!("discarding script instance {}: {}", instance.script.id(), reason);
    }

    fn create_instance(&self, generation: u64) -> Result<ScriptInstance, ScriptError> {
        let mut options = ScriptOptions::default();
        options.check_thread_access = self.config.check_thread_access;
        options.use_classic_error_locations = self.config.classic_error_locations;
        if let Some(print) = self.print.read().clone() {
            options.print = print;
        }

        let script = Arc::new(Script::with_options(options));
        script
            .performance_stats()
            .set_enabled(self.config.performance_counters);

        let globals = script.globals();
        for (prefix, value) in self.shared_objects.read().iter() {
            globals.set_str(prefix, value.clone());
        }
        let store = self.global_variables.read().clone();
        globals.set_str(GLOBAL_VARIABLES_NAME, self.types.create(store)?);

        let mut instance = ScriptInstance {
            script,
            functions: HashMap::new(),
            generation,
        };
        for entry in self.functions.entries() {
            self.compile_into(&mut instance, &entry)?;
        }

        self.counters.record_instance_created();
        debug!(
            "created script instance {} with {} cached functions",
            instance.script.id(),
            instance.functions.len()
        );
        Ok(instance)
    }

    fn compile_into(
        &self,
        instance: &mut ScriptInstance,
        entry: &FunctionCacheEntry,
    ) -> Result<(), ScriptError> {
        let script = &instance.script;
        let chunk = script.load_string(&entry.wrapped_source(), None, Some(&entry.name))?;
        script.globals().set_str(&entry.name, Value::Nil);
        script.call(&chunk, Vec::new())?;
        instance
            .functions
            .insert(entry.name.clone(), entry.hash.clone());
        self.counters.record_compiled();
        Ok(())
    }

    fn invalidate_pool(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let dropped = self.pool.clear();
        if dropped > 0 {
            debug!("cleared {} pooled instances", dropped);
        }
    }

    fn report(&self, err: &ScriptError) {
        self.counters.record_error();
        let handler = self.exception_handler.read().clone();
        if let Some(handler) = handler {
            handler(err);
        }
    }

    fn finish<R>(&self, result: Result<R, ScriptError>) -> Result<R, ScriptError> {
        if let Err(err) = &result {
            warn!("script error: {}", err);
            self.report(err);
        }
        result
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string())
}
