//! The script processor
//!
//! A [`Processor`] owns one value stack and one call stack. The main
//! processor of a script lives behind the script's mutex; every coroutine
//! owns a processor of its own. Script-to-script calls push frames and stay
//! inside one dispatch loop; calls into host callbacks, metamethods and
//! coroutine resumes re-enter the loop recursively.

use std::sync::Arc;

use core_types::{
    CallArgs, Callback, CallbackKind, Closure, NativeFn, ScriptError, SourceRef, Value,
};

use crate::call_frame::{CallStackItem, FrameKind};
use crate::context::ProcessorContext;
use crate::execution::ExecutionControlToken;
use crate::shared::ScriptShared;

/// Longest `__call` chain followed when calling a non-function
const MAX_CALL_CHAIN: usize = 16;

/// Why the dispatch loop stopped
#[derive(Debug)]
pub(crate) enum Exit {
    /// The entry frame returned
    Return(Value),
    /// The coroutine running on this processor yielded
    Yield(Value),
}

/// Stack machine executing a script's bytecode
pub struct Processor {
    pub(crate) value_stack: Vec<Value>,
    pub(crate) call_stack: Vec<CallStackItem>,
    pub(crate) ip: usize,
    is_coroutine: bool,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("value_stack_depth", &self.value_stack.len())
            .field("call_stack_depth", &self.call_stack.len())
            .field("ip", &self.ip)
            .field("is_coroutine", &self.is_coroutine)
            .finish()
    }
}

impl Processor {
    /// Processor for a script's main execution
    pub fn new() -> Self {
        Self {
            value_stack: Vec::with_capacity(64),
            call_stack: Vec::with_capacity(16),
            ip: 0,
            is_coroutine: false,
        }
    }

    pub(crate) fn for_coroutine() -> Self {
        Self {
            is_coroutine: true,
            ..Self::new()
        }
    }

    /// True when no execution is in progress
    pub fn is_idle(&self) -> bool {
        self.call_stack.is_empty() && self.value_stack.is_empty()
    }

    /// Current depth of the call stack
    pub fn call_stack_depth(&self) -> usize {
        self.call_stack.len()
    }

    pub(crate) fn is_coroutine(&self) -> bool {
        self.is_coroutine
    }

    /// True when `coroutine.yield` may suspend the caller
    pub(crate) fn can_yield(&self) -> bool {
        self.is_coroutine && !self.call_stack.iter().any(CallStackItem::is_host)
    }

    /// Call `function` and run it to completion.
    ///
    /// # Arguments
    ///
    /// * `shared` - State of the script the processor belongs to
    /// * `token` - Checked at every safepoint
    /// * `function` - Script function, callback or value with `__call`
    /// * `args` - Arguments; a trailing tuple is expanded
    ///
    /// # Returns
    ///
    /// The returned value, a tuple when several values were returned. On
    /// error every frame pushed by this call has been unwound.
    pub(crate) fn call(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        function: &Value,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        let _nested = shared.enter_nested()?;

        let entry_depth = self.call_stack.len();
        let stack_height = self.value_stack.len();
        let saved_ip = self.ip;

        let result = self
            .enter(shared, token, function.clone(), flatten(args), entry_depth)
            .and_then(|exit| match exit {
                Exit::Return(value) => Ok(value),
                Exit::Yield(_) => Err(ScriptError::runtime(
                    "attempt to yield across a host-call boundary",
                )),
            });

        if result.is_err() {
            self.call_stack.truncate(entry_depth);
            self.value_stack.truncate(stack_height);
        }
        self.ip = saved_ip;
        result
    }

    /// Start `function` as the body of a coroutine
    pub(crate) fn start(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        function: Value,
        args: Vec<Value>,
    ) -> Result<Exit, ScriptError> {
        let result = self.enter(shared, token, function, flatten(args), 0);
        if result.is_err() {
            self.reset();
        }
        result
    }

    /// Continue a suspended coroutine; `args` become the results of the
    /// pending `yield`
    pub(crate) fn continue_after_yield(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        args: Vec<Value>,
    ) -> Result<Exit, ScriptError> {
        self.value_stack.push(Value::tuple(flatten(args)));
        let result = self.run(shared, token, 0);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn reset(&mut self) {
        self.call_stack.clear();
        self.value_stack.clear();
        self.ip = 0;
    }

    fn enter(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        function: Value,
        args: Vec<Value>,
        entry_depth: usize,
    ) -> Result<Exit, ScriptError> {
        let (function, args) = self.resolve_callable(function, args)?;
        match function {
            Value::Function(closure) => {
                self.push_script_frame(shared, closure, args, FrameKind::EntryPoint, None, None)?;
                self.run(shared, token, entry_depth)
            }
            Value::Callback(callback) => match callback.kind().clone() {
                CallbackKind::Yield => Ok(Exit::Yield(Value::tuple(args))),
                CallbackKind::Native(f) => self
                    .invoke_callback(shared, token, &callback, &f, args, None)
                    .map(Exit::Return),
            },
            other => Err(not_callable(&other)),
        }
    }

    /// Follow `__call` metamethods until a function or callback is found
    pub(crate) fn resolve_callable(
        &self,
        function: Value,
        mut args: Vec<Value>,
    ) -> Result<(Value, Vec<Value>), ScriptError> {
        let mut function = function.scalar();
        for _ in 0..MAX_CALL_CHAIN {
            if function.is_callable() {
                return Ok((function, args));
            }
            match crate::ops::metamethod(&function, "__call") {
                Some(handler) => {
                    args.insert(0, function);
                    function = handler;
                }
                None => return Err(not_callable(&function)),
            }
        }
        Err(ScriptError::runtime("'__call' chain too long; possible loop"))
    }

    /// Push a frame for a script function; execution continues at its
    /// header
    pub(crate) fn push_script_frame(
        &mut self,
        shared: &ScriptShared,
        closure: Arc<Closure>,
        args: Vec<Value>,
        kind: FrameKind,
        return_address: Option<usize>,
        calling_source_ref: Option<SourceRef>,
    ) -> Result<(), ScriptError> {
        if closure.owner() != shared.id {
            return Err(ScriptError::runtime(
                "attempt to call a function of a different script",
            ));
        }
        self.check_stack_limit(shared)?;

        self.ip = closure.entry();
        self.call_stack.push(CallStackItem::script(
            closure,
            args,
            kind,
            return_address,
            self.value_stack.len(),
            calling_source_ref,
        ));
        Ok(())
    }

    fn check_stack_limit(&self, shared: &ScriptShared) -> Result<(), ScriptError> {
        let limit = shared.options.read().call_stack_limit;
        if self.call_stack.len() >= limit {
            return Err(ScriptError::runtime("stack overflow"));
        }
        Ok(())
    }

    /// Run a host callback inside a host frame
    pub(crate) fn invoke_callback(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        callback: &Callback,
        f: &Arc<NativeFn>,
        args: Vec<Value>,
        calling_source_ref: Option<SourceRef>,
    ) -> Result<Value, ScriptError> {
        self.check_stack_limit(shared)?;
        let depth = self.call_stack.len();
        let base = self.value_stack.len();
        let saved_ip = self.ip;
        self.call_stack
            .push(CallStackItem::host(callback.name(), base, calling_source_ref));

        let result = {
            let mut ctx = ProcessorContext::new(self, shared, token, calling_source_ref);
            f(&mut ctx, CallArgs::new(args))
        };

        self.call_stack.truncate(depth);
        self.value_stack.truncate(base);
        self.ip = saved_ip;
        result
    }

    /// Innermost frame that belongs to script code
    pub(crate) fn current_script_frame(&self) -> Option<&CallStackItem> {
        self.call_stack.iter().rev().find(|f| !f.is_host())
    }

    pub(crate) fn current_script_frame_mut(&mut self) -> Option<&mut CallStackItem> {
        self.call_stack.iter_mut().rev().find(|f| !f.is_host())
    }

    /// Names of the active frames, innermost first
    pub(crate) fn call_stack_names(&self, shared: &ScriptShared) -> Vec<String> {
        self.call_stack
            .iter()
            .rev()
            .map(|frame| frame_name(shared, frame))
            .collect()
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

/// Display name of a frame: the callback name or the function header name
pub(crate) fn frame_name(shared: &ScriptShared, frame: &CallStackItem) -> String {
    if let Some(name) = &frame.callback_name {
        return name.to_string();
    }
    match shared.code.instruction(frame.debug_entry_point).map(|i| i.opcode) {
        Some(bytecode_system::OpCode::Meta { name, .. }) => name.to_string(),
        _ => "?".to_string(),
    }
}

/// Adjust an argument list: a trailing tuple is expanded, every other
/// tuple is truncated to its first value
pub(crate) fn flatten(mut values: Vec<Value>) -> Vec<Value> {
    if !values.iter().any(|v| matches!(v, Value::Tuple(_))) {
        return values;
    }
    let last = values.pop();
    let mut out: Vec<Value> = values.into_iter().map(Value::scalar).collect();
    match last {
        Some(Value::Tuple(items)) => out.extend(items.iter().cloned().map(Value::scalar)),
        Some(value) => out.push(value),
        None => {}
    }
    out
}

pub(crate) fn not_callable(value: &Value) -> ScriptError {
    ScriptError::runtime(format!("attempt to call a {} value", value.type_name()))
}
