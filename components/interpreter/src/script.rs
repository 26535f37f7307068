//! The embeddable script instance

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, Thread, ThreadId};

use core_types::{ScriptError, ScriptId, SourceCode, SourceRef, TableRef, Value};
use log::debug;
use parking_lot::{Mutex, MutexGuard};

use crate::builtins;
use crate::debugger::Debugger;
use crate::execution::{ExecutionControlToken, ExecutionPort, ScriptTask};
use crate::options::ScriptOptions;
use crate::profile::{PerformanceCounter, PerformanceStatistics};
use crate::shared::ScriptShared;
use crate::vm::Processor;

#[derive(Debug, Clone)]
struct ThreadOwner {
    id: ThreadId,
    name: String,
}

impl ThreadOwner {
    fn of(thread: &Thread) -> Self {
        Self {
            id: thread.id(),
            name: describe_thread(thread),
        }
    }
}

fn describe_thread(thread: &Thread) -> String {
    thread
        .name()
        .map_or_else(|| format!("{:?}", thread.id()), str::to_string)
}

/// Exclusive hold on the main processor; clears the owner record before
/// the processor is released
struct Entered<'a> {
    processor: MutexGuard<'a, Processor>,
    owner: &'a Mutex<Option<ThreadOwner>>,
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        *self.owner.lock() = None;
    }
}

/// A compiled code segment, its global environment and the processor that
/// runs it
///
/// # Examples
///
/// ```
/// use interpreter::Script;
///
/// let script = Script::new();
/// let result = script.do_string("return 6 * 7").unwrap();
/// assert_eq!(result.as_number(), Some(42.0));
/// ```
pub struct Script {
    shared: ScriptShared,
    processor: Mutex<Processor>,
    owner: Mutex<Option<ThreadOwner>>,
}

impl Script {
    /// Script with default options and the core builtins installed
    pub fn new() -> Self {
        Self::with_options(ScriptOptions::default())
    }

    /// Script with `options` and the core builtins installed
    pub fn with_options(options: ScriptOptions) -> Self {
        let shared = ScriptShared::new(options);
        builtins::register(&shared.globals);
        debug!("script {}: created", shared.id);
        Self {
            shared,
            processor: Mutex::new(Processor::new()),
            owner: Mutex::new(None),
        }
    }

    /// Process-unique id of this script
    pub fn id(&self) -> ScriptId {
        self.shared.id
    }

    /// The global table
    pub fn globals(&self) -> TableRef {
        self.shared.globals.clone()
    }

    /// Table reserved for host bookkeeping, invisible to scripts
    pub fn registry(&self) -> TableRef {
        self.shared.registry.clone()
    }

    /// Snapshot of the current options
    pub fn options(&self) -> ScriptOptions {
        self.shared.options.read().clone()
    }

    /// Change options in place
    pub fn update_options<F: FnOnce(&mut ScriptOptions)>(&self, f: F) {
        f(&mut self.shared.options.write());
    }

    /// Performance counters of this script
    pub fn performance_stats(&self) -> &PerformanceStatistics {
        &self.shared.perf
    }

    /// Compile `code` into a function without running it
    ///
    /// A string starting with [`BASE64_DUMP_HEADER`](crate::BASE64_DUMP_HEADER)
    /// is decoded as a binary dump instead.
    pub fn load_string(
        &self,
        code: &str,
        env: Option<TableRef>,
        name: Option<&str>,
    ) -> Result<Value, ScriptError> {
        self.shared.load_string(code, env, name)
    }

    /// Load source text or a binary dump read from `reader`
    pub fn load_stream<R: Read>(
        &self,
        mut reader: R,
        env: Option<TableRef>,
        name: Option<&str>,
    ) -> Result<Value, ScriptError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.shared.load_bytes(&bytes, env, name)
    }

    /// Load a source or dump file; the chunk is named after the path unless
    /// `name` is given
    pub fn load_file<P: AsRef<Path>>(
        &self,
        path: P,
        env: Option<TableRef>,
        name: Option<&str>,
    ) -> Result<Value, ScriptError> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let default_name = path.display().to_string();
        self.shared
            .load_bytes(&bytes, env, Some(name.unwrap_or(&default_name)))
    }

    /// Compile a bare function body; arguments are reachable through `...`
    pub fn load_function(
        &self,
        code: &str,
        env: Option<TableRef>,
        name: Option<&str>,
    ) -> Result<Value, ScriptError> {
        self.shared.load_function(code, env, name)
    }

    /// Load and run a chunk
    pub fn do_string(&self, code: &str) -> Result<Value, ScriptError> {
        let function = self.load_string(code, None, None)?;
        self.call(&function, Vec::new())
    }

    /// Load and run a file
    pub fn do_file<P: AsRef<Path>>(&self, path: P) -> Result<Value, ScriptError> {
        let function = self.load_file(path, None, None)?;
        self.call(&function, Vec::new())
    }

    /// Load and run source text or a dump read from `reader`
    pub fn do_stream<R: Read>(&self, reader: R) -> Result<Value, ScriptError> {
        let function = self.load_stream(reader, None, None)?;
        self.call(&function, Vec::new())
    }

    /// Call a function; multiple results come back as a tuple
    pub fn call(&self, function: &Value, args: Vec<Value>) -> Result<Value, ScriptError> {
        self.call_with_token(&ExecutionControlToken::new(), function, args)
    }

    /// Call a function and split its results
    pub fn call_multi(&self, function: &Value, args: Vec<Value>) -> Result<Vec<Value>, ScriptError> {
        self.call(function, args).map(Value::into_values)
    }

    /// Call a function with string arguments
    pub fn call_strings(&self, function: &Value, args: &[&str]) -> Result<Value, ScriptError> {
        let args = args.iter().map(|s| Value::from(*s)).collect();
        self.call(function, args)
    }

    /// Call a global function by name
    pub fn call_global(&self, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        let function = self.shared.globals.get_str(name);
        self.call(&function, args)
    }

    /// Call a function under a control token; a cancelled token stops the
    /// call at its next safepoint with [`ScriptError::Cancelled`]
    pub fn call_with_token(
        &self,
        token: &ExecutionControlToken,
        function: &Value,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        let mut entered = self.enter()?;
        let result = {
            let _watch = self
                .shared
                .perf
                .start_stopwatch(PerformanceCounter::Execution);
            entered
                .processor
                .call(&self.shared, token, function, args)
        };
        self.shared.debug.signal_execution_ended();
        result
    }

    /// Call a function on `port`
    pub fn call_async(
        self: &Arc<Self>,
        port: &dyn ExecutionPort,
        token: ExecutionControlToken,
        function: Value,
        args: Vec<Value>,
    ) -> ScriptTask {
        let script = Arc::clone(self);
        ScriptTask::spawn(port, token, move |token| {
            script.call_with_token(token, &function, args)
        })
    }

    /// Load and run a chunk on `port`
    pub fn do_string_async(
        self: &Arc<Self>,
        port: &dyn ExecutionPort,
        token: ExecutionControlToken,
        code: &str,
    ) -> ScriptTask {
        let script = Arc::clone(self);
        let code = code.to_string();
        ScriptTask::spawn(port, token, move |token| {
            let function = script.load_string(&code, None, None)?;
            script.call_with_token(token, &function, Vec::new())
        })
    }

    /// Write `function` as a binary dump
    ///
    /// Only functions whose single upvalue is `_ENV`, or that have none,
    /// can be dumped.
    pub fn dump<W: Write>(&self, function: &Value, out: W) -> Result<W, ScriptError> {
        self.shared.dump(function, out)
    }

    /// Binary dump of `function` as a string [`load_string`](Self::load_string) accepts
    pub fn dump_base64(&self, function: &Value) -> Result<String, ScriptError> {
        self.shared.dump_base64(function)
    }

    /// Attach a debugger; every source loaded so far is replayed to it
    pub fn attach_debugger(&self, debugger: Arc<dyn Debugger>) {
        let sources = self.shared.sources.read().clone();
        self.shared
            .debug
            .attach(Some(debugger), &sources, &self.shared.code);
        debug!("script {}: debugger attached", self.shared.id);
    }

    /// Detach the current debugger, if any
    pub fn detach_debugger(&self) {
        self.shared.debug.attach(None, &[], &self.shared.code);
    }

    /// Toggle (`state == None`), set or clear the breakpoint nearest to a
    /// location of a loaded source
    pub fn toggle_breakpoint(
        &self,
        source_idx: usize,
        line: usize,
        col: usize,
        state: Option<bool>,
    ) -> Result<Vec<SourceRef>, ScriptError> {
        let source = self
            .shared
            .source(source_idx)
            .ok_or_else(|| ScriptError::runtime(format!("no source with index {}", source_idx)))?;
        Ok(self
            .shared
            .debug
            .toggle_breakpoint(&source, line, col, state))
    }

    /// Current breakpoints
    pub fn breakpoints(&self) -> Vec<SourceRef> {
        self.shared.debug.breakpoints()
    }

    /// A loaded source by index
    pub fn source_code(&self, idx: usize) -> Option<Arc<SourceCode>> {
        self.shared.source(idx)
    }

    /// Number of loaded sources
    pub fn source_count(&self) -> usize {
        self.shared.sources.read().len()
    }

    /// True when no execution is in progress and the last one left the
    /// processor clean
    pub fn is_idle(&self) -> bool {
        self.processor
            .try_lock()
            .is_some_and(|processor| processor.is_idle())
    }

    fn enter(&self) -> Result<Entered<'_>, ScriptError> {
        let current = thread::current();
        let uncontended = {
            // the owner is recorded under its lock together with the
            // processor acquisition, so a contender always sees it
            let mut owner = self.owner.lock();
            match self.processor.try_lock() {
                Some(processor) => {
                    *owner = Some(ThreadOwner::of(&current));
                    Some(processor)
                }
                None => {
                    if let Some(owner) = owner.as_ref() {
                        if owner.id == current.id() {
                            return Err(ScriptError::runtime(
                                "script is already running on this thread",
                            ));
                        }
                        if self.shared.options.read().check_thread_access {
                            return Err(ScriptError::ThreadAccessViolation {
                                owner: owner.name.clone(),
                                current: describe_thread(&current),
                            });
                        }
                    }
                    None
                }
            }
        };

        let processor = match uncontended {
            Some(processor) => processor,
            None => {
                let processor = self.processor.lock();
                *self.owner.lock() = Some(ThreadOwner::of(&current));
                processor
            }
        };
        Ok(Entered {
            processor,
            owner: &self.owner,
        })
    }
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script")
            .field("id", &self.shared.id)
            .field("sources", &self.source_count())
            .finish()
    }
}
