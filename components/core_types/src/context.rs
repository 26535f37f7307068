//! The interface host callbacks use to talk back to the running script.

use crate::{CoroutineRef, RuntimeError, ScriptError, ScriptId, TableRef, Value};

/// Services a running processor offers to host callbacks.
///
/// Every call made through this trait is routed to the innermost active
/// coroutine of the calling script, so a callback invoked from inside a
/// coroutine re-enters that coroutine's stacks.
pub trait ExecutionContext {
    /// Script the callback is running in.
    fn script_id(&self) -> ScriptId;

    /// Global table of the script.
    fn globals(&self) -> TableRef;

    /// Registry table of the script, reserved for host bookkeeping.
    fn registry(&self) -> TableRef;

    /// Call a function value and wait for its results.
    fn call(&mut self, function: &Value, args: Vec<Value>) -> Result<Value, ScriptError>;

    /// Compile a chunk into the script and return it as a function.
    fn load(
        &mut self,
        code: &str,
        chunk_name: Option<&str>,
        env: Option<TableRef>,
    ) -> Result<Value, ScriptError>;

    /// Wrap a function in a new coroutine.
    fn create_coroutine(&mut self, function: Value) -> Result<Value, ScriptError>;

    /// Resume a coroutine, returning what it yielded or returned.
    fn resume(&mut self, coroutine: &CoroutineRef, args: Vec<Value>)
        -> Result<Value, ScriptError>;

    /// The coroutine currently running, or the main coroutine.
    fn running_coroutine(&self) -> CoroutineRef;

    /// True when the caller may suspend with `coroutine.yield`.
    fn can_yield(&self) -> bool;

    /// True once the execution control token has been cancelled.
    fn is_cancelled(&self) -> bool;

    /// Block the calling execution for `duration`, returning
    /// [`ScriptError::Cancelled`] as soon as the control token is cancelled.
    fn sleep(&mut self, duration: std::time::Duration) -> Result<(), ScriptError>;

    /// Write a line through the script's print sink.
    fn print(&mut self, text: &str);

    /// Location prefix of the script instruction that called the callback.
    fn caller_location(&self) -> Option<String>;
}

/// Arguments handed to a host callback.
///
/// Indexing is 0-based; missing arguments read as `nil`.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    values: Vec<Value>,
}

impl CallArgs {
    /// Wrap already-flattened argument values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Number of arguments actually passed.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no arguments were passed.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Argument `idx`, `nil` when absent.
    pub fn get(&self, idx: usize) -> Value {
        self.values.get(idx).cloned().unwrap_or_default()
    }

    /// Borrow argument `idx` if it was passed.
    pub fn raw(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// All arguments.
    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    /// Take ownership of the arguments.
    pub fn into_vec(self) -> Vec<Value> {
        self.values
    }

    /// Drop the leading `n` arguments (e.g. the receiver of a `:` call).
    pub fn skip(mut self, n: usize) -> Self {
        self.values.drain(..n.min(self.values.len()));
        self
    }

    /// Number argument, coercing numeric strings.
    pub fn check_number(&self, idx: usize, func: &str) -> Result<f64, ScriptError> {
        let v = self.get(idx);
        v.as_number()
            .ok_or_else(|| bad_argument(idx, func, "number", &v))
    }

    /// Integer argument.
    pub fn check_integer(&self, idx: usize, func: &str) -> Result<i64, ScriptError> {
        let n = self.check_number(idx, func)?;
        if n.fract() != 0.0 {
            return Err(RuntimeError::new(format!(
                "bad argument #{} to '{}' (number has no integer representation)",
                idx + 1,
                func
            ))
            .into());
        }
        Ok(n as i64)
    }

    /// String argument; numbers are converted.
    pub fn check_string(&self, idx: usize, func: &str) -> Result<String, ScriptError> {
        let v = self.get(idx);
        v.to_concat_string()
            .ok_or_else(|| bad_argument(idx, func, "string", &v))
    }

    /// Table argument.
    pub fn check_table(&self, idx: usize, func: &str) -> Result<TableRef, ScriptError> {
        match self.get(idx) {
            Value::Table(t) => Ok(t),
            other => Err(bad_argument(idx, func, "table", &other)),
        }
    }

    /// Any value, but the argument must be present.
    pub fn check_any(&self, idx: usize, func: &str) -> Result<Value, ScriptError> {
        match self.values.get(idx) {
            Some(v) => Ok(v.clone()),
            None => Err(RuntimeError::new(format!(
                "bad argument #{} to '{}' (value expected)",
                idx + 1,
                func
            ))
            .into()),
        }
    }

    /// Optional number argument with a default.
    pub fn opt_number(&self, idx: usize, func: &str, default: f64) -> Result<f64, ScriptError> {
        if self.get(idx).is_nil() {
            Ok(default)
        } else {
            self.check_number(idx, func)
        }
    }
}

impl From<Vec<Value>> for CallArgs {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

fn bad_argument(idx: usize, func: &str, expected: &str, got: &Value) -> ScriptError {
    let got = if got.is_nil() { "no value" } else { got.type_name() };
    RuntimeError::new(format!(
        "bad argument #{} to '{}' ({} expected, got {})",
        idx + 1,
        func,
        expected,
        got
    ))
    .into()
}
