//! State shared by every processor of a script
//!
//! The main processor and every coroutine processor of a script read the
//! same code segment, sources, globals and debugger state. Processors are
//! handed a reference to this state for the duration of a call and never
//! store it.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytecode_system::{dump_function, is_dump, undump_function, ByteCode};
use core_types::{
    Closure, CoroutineRef, CoroutineState, DumpError, ScriptError, ScriptId, SourceCode, SourceRef,
    TableRef, UpvaluesType, Value, ValueCell, ENV_NAME,
};
use log::debug;
use parking_lot::{Mutex, RwLock};
use parser::{ChunkKind, CompileOptions};

use crate::debug_state::DebugState;
use crate::options::ScriptOptions;
use crate::profile::{PerformanceCounter, PerformanceStatistics};

/// Prefix marking a base64-encoded binary dump inside a source string
pub const BASE64_DUMP_HEADER: &str = "LanternDump_b64::";

pub(crate) struct ScriptShared {
    pub(crate) id: ScriptId,
    pub(crate) options: RwLock<ScriptOptions>,
    pub(crate) code: ByteCode,
    pub(crate) sources: RwLock<Vec<Arc<SourceCode>>>,
    pub(crate) globals: TableRef,
    pub(crate) registry: TableRef,
    pub(crate) main_coroutine: CoroutineRef,
    /// Coroutines currently running, innermost last
    pub(crate) coroutine_stack: Mutex<Vec<CoroutineRef>>,
    /// Coroutines created and not yet dead
    pub(crate) coroutines: Mutex<Vec<CoroutineRef>>,
    pub(crate) debug: DebugState,
    pub(crate) perf: PerformanceStatistics,
    /// Host-stack re-entries active right now: nested calls and resumes
    nesting: AtomicUsize,
}

/// One level of host-stack recursion; released on drop
pub(crate) struct NestingGuard<'a> {
    shared: &'a ScriptShared,
}

impl Drop for NestingGuard<'_> {
    fn drop(&mut self) {
        self.shared.nesting.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ScriptShared {
    pub(crate) fn new(options: ScriptOptions) -> Self {
        let id = ScriptId::next();
        Self {
            id,
            options: RwLock::new(options),
            code: ByteCode::new(),
            sources: RwLock::new(Vec::new()),
            globals: TableRef::new(),
            registry: TableRef::new(),
            main_coroutine: CoroutineRef::new(id, CoroutineState::Main, None),
            coroutine_stack: Mutex::new(Vec::new()),
            coroutines: Mutex::new(Vec::new()),
            debug: DebugState::new(),
            perf: PerformanceStatistics::new(),
            nesting: AtomicUsize::new(0),
        }
    }

    /// Enter a recursion of the dispatch loop on the host stack
    ///
    /// Fails with "stack overflow" once `max_nested_calls` levels are
    /// active, before the native stack can run out.
    pub(crate) fn enter_nested(&self) -> Result<NestingGuard<'_>, ScriptError> {
        let limit = self.options.read().max_nested_calls;
        if self.nesting.fetch_add(1, Ordering::Relaxed) >= limit {
            self.nesting.fetch_sub(1, Ordering::Relaxed);
            return Err(ScriptError::runtime("stack overflow"));
        }
        Ok(NestingGuard { shared: self })
    }

    pub(crate) fn source(&self, idx: usize) -> Option<Arc<SourceCode>> {
        self.sources.read().get(idx).cloned()
    }

    pub(crate) fn source_name(&self, idx: usize) -> String {
        self.sources
            .read()
            .get(idx)
            .map_or_else(|| "?".to_string(), |s| s.name.clone())
    }

    /// Location prefix for error messages
    pub(crate) fn format_location(&self, sref: &SourceRef) -> String {
        let classic = self.options.read().use_classic_error_locations;
        sref.format_location(&self.source_name(sref.source_idx), classic)
    }

    /// The coroutine running innermost, or the main coroutine
    pub(crate) fn running_coroutine(&self) -> CoroutineRef {
        self.coroutine_stack
            .lock()
            .last()
            .cloned()
            .unwrap_or_else(|| self.main_coroutine.clone())
    }

    pub(crate) fn track_coroutine(&self, coroutine: &CoroutineRef) {
        let mut coroutines = self.coroutines.lock();
        coroutines.retain(|c| c.state() != CoroutineState::Dead);
        coroutines.push(coroutine.clone());
    }

    /// Compile a chunk, or decode a base64 dump, and wrap it in a closure
    pub(crate) fn load_string(
        &self,
        code: &str,
        env: Option<TableRef>,
        name: Option<&str>,
    ) -> Result<Value, ScriptError> {
        if let Some(encoded) = code.strip_prefix(BASE64_DUMP_HEADER) {
            let bytes = BASE64
                .decode(encoded.trim())
                .map_err(|err| DumpError::Malformed(format!("invalid base64 dump: {}", err)))?;
            return self.load_dump(&bytes, env, name);
        }
        self.compile(code, env, name, ChunkKind::Chunk)
    }

    /// Load raw bytes that are either a binary dump or UTF-8 source
    pub(crate) fn load_bytes(
        &self,
        bytes: &[u8],
        env: Option<TableRef>,
        name: Option<&str>,
    ) -> Result<Value, ScriptError> {
        if is_dump(bytes) {
            return self.load_dump(bytes, env, name);
        }
        let code = std::str::from_utf8(bytes).map_err(|err| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, err)
        })?;
        self.load_string(code, env, name)
    }

    /// Compile a bare function body; its arguments are available as `...`
    pub(crate) fn load_function(
        &self,
        code: &str,
        env: Option<TableRef>,
        name: Option<&str>,
    ) -> Result<Value, ScriptError> {
        self.compile(code, env, name, ChunkKind::FunctionBody)
    }

    fn compile(
        &self,
        code: &str,
        env: Option<TableRef>,
        name: Option<&str>,
        kind: ChunkKind,
    ) -> Result<Value, ScriptError> {
        let _watch = self.perf.start_stopwatch(PerformanceCounter::Compilation);

        let source = {
            let mut sources = self.sources.write();
            let idx = sources.len();
            let name = name.map_or_else(|| format!("chunk_{}", idx), str::to_string);
            let mut options = CompileOptions::new(&name, idx);
            if kind == ChunkKind::FunctionBody {
                options = options.function_body();
            }
            let compiled = parser::compile(&self.code, code, &options)?;
            debug!(
                "script {}: compiled '{}' at {:08X}",
                self.id, name, compiled.entry
            );

            let source = Arc::new(SourceCode {
                id: idx,
                name,
                code: code.to_string(),
                owner: self.id,
                refs: compiled.refs,
            });
            sources.push(source.clone());
            (source, compiled.entry, compiled.has_env)
        };

        let (source, entry, has_env) = source;
        self.debug.source_registered(&source, &self.code);
        Ok(self.make_closure(entry, has_env, env))
    }

    fn load_dump(
        &self,
        bytes: &[u8],
        env: Option<TableRef>,
        name: Option<&str>,
    ) -> Result<Value, ScriptError> {
        let (source, entry, has_env) = {
            let mut sources = self.sources.write();
            let idx = sources.len();
            let undumped = undump_function(&self.code, bytes, idx)?;
            let name = name.map_or_else(|| format!("dump_{}", idx), str::to_string);
            debug!(
                "script {}: undumped '{}' as '{}' at {:08X}",
                self.id, undumped.name, name, undumped.entry
            );

            let source = Arc::new(SourceCode {
                id: idx,
                code: format!("-- This script was decoded from a binary dump - {}", name),
                name,
                owner: self.id,
                refs: undumped.refs,
            });
            sources.push(source.clone());
            (source, undumped.entry, undumped.has_env)
        };

        self.debug.source_registered(&source, &self.code);
        Ok(self.make_closure(entry, has_env, env))
    }

    fn make_closure(&self, entry: usize, has_env: bool, env: Option<TableRef>) -> Value {
        let upvalues = if has_env {
            let env = env.unwrap_or_else(|| self.globals.clone());
            vec![(Arc::from(ENV_NAME), ValueCell::new(Value::Table(env)))]
        } else {
            Vec::new()
        };
        Value::Function(Arc::new(Closure::new(self.id, entry, upvalues)))
    }

    /// Write a closure of this script as a binary dump
    pub(crate) fn dump<W: Write>(&self, function: &Value, out: W) -> Result<W, ScriptError> {
        let closure = match function {
            Value::Function(closure) => closure,
            _ => return Err(DumpError::NotAFunction.into()),
        };
        if closure.owner() != self.id {
            return Err(ScriptError::runtime(
                "attempt to dump a function of a different script",
            ));
        }
        let has_env = match closure.upvalues_type() {
            UpvaluesType::None => false,
            UpvaluesType::Environment => true,
            UpvaluesType::Closure => return Err(DumpError::UnsupportedUpvalues.into()),
        };
        Ok(dump_function(&self.code, closure.entry(), has_env, out)?)
    }

    /// Dump a closure as a base64 string loadable by `load_string`
    pub(crate) fn dump_base64(&self, function: &Value) -> Result<String, ScriptError> {
        let bytes = self.dump(function, Vec::new())?;
        Ok(format!("{}{}", BASE64_DUMP_HEADER, BASE64.encode(bytes)))
    }
}
