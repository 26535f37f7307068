//! Script closures, host callbacks and upvalue cells.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{CallArgs, ExecutionContext, ScriptError, Value, ENV_NAME};

static NEXT_SCRIPT_ID: AtomicU32 = AtomicU32::new(1);

/// Identifier of a script instance. Closures remember the script that
/// created them and may only run inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(u32);

impl ScriptId {
    /// Allocate a fresh process-unique id.
    pub fn next() -> Self {
        ScriptId(NEXT_SCRIPT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "script #{}", self.0)
    }
}

/// A shared, mutable storage cell for a local variable.
///
/// Locals live in cells so that closures capturing them observe later
/// assignments made by the enclosing function and vice versa.
#[derive(Clone, Default)]
pub struct ValueCell(Arc<Mutex<Value>>);

impl ValueCell {
    /// Create a cell holding `value`.
    pub fn new(value: Value) -> Self {
        ValueCell(Arc::new(Mutex::new(value)))
    }

    /// Current content.
    pub fn get(&self) -> Value {
        self.0.lock().clone()
    }

    /// Replace the content.
    pub fn set(&self, value: Value) {
        *self.0.lock() = value;
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &ValueCell) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ValueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueCell({:p})", Arc::as_ptr(&self.0))
    }
}

/// Shape of a closure's captured upvalues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpvaluesType {
    /// No upvalues
    None,
    /// Exactly one upvalue, the environment
    Environment,
    /// Any other capture
    Closure,
}

/// A compiled script function: an entry address in its script's code
/// segment plus the upvalue cells it captured.
pub struct Closure {
    owner: crate::ScriptId,
    entry: usize,
    upvalues: Vec<ValueCell>,
    upvalue_names: Vec<Arc<str>>,
}

impl Closure {
    /// Create a closure; `upvalues` pairs each capture with its name.
    pub fn new(owner: ScriptId, entry: usize, upvalues: Vec<(Arc<str>, ValueCell)>) -> Self {
        let (upvalue_names, upvalues) = upvalues.into_iter().unzip();
        Self {
            owner,
            entry,
            upvalues,
            upvalue_names,
        }
    }

    /// Script that created this closure.
    pub fn owner(&self) -> ScriptId {
        self.owner
    }

    /// Address of the function header in the code segment.
    pub fn entry(&self) -> usize {
        self.entry
    }

    /// Upvalue cell by index.
    pub fn upvalue(&self, idx: usize) -> Option<&ValueCell> {
        self.upvalues.get(idx)
    }

    /// Names of the captured upvalues, in capture order.
    pub fn upvalue_names(&self) -> &[Arc<str>] {
        &self.upvalue_names
    }

    /// Number of captured upvalues.
    pub fn upvalue_count(&self) -> usize {
        self.upvalues.len()
    }

    /// Classify the captures.
    pub fn upvalues_type(&self) -> UpvaluesType {
        match self.upvalue_names.as_slice() {
            [] => UpvaluesType::None,
            [only] if &**only == ENV_NAME => UpvaluesType::Environment,
            _ => UpvaluesType::Closure,
        }
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("owner", &self.owner)
            .field("entry", &self.entry)
            .field("upvalues", &self.upvalue_names)
            .finish()
    }
}

/// Signature of a host function callable from scripts.
pub type NativeFn =
    dyn Fn(&mut dyn ExecutionContext, CallArgs) -> Result<Value, ScriptError> + Send + Sync;

/// What a [`Callback`] does when invoked.
#[derive(Clone)]
pub enum CallbackKind {
    /// Run host code
    Native(Arc<NativeFn>),
    /// Suspend the running coroutine, handing the arguments to `resume`
    Yield,
}

/// A host function exposed to scripts.
///
/// # Examples
///
/// ```
/// use core_types::{Callback, Value};
///
/// let double = Callback::new("double", |_ctx, args| {
///     let n = args.check_number(0, "double")?;
///     Ok(Value::from(n * 2.0))
/// });
/// assert_eq!(double.name(), "double");
/// ```
#[derive(Clone)]
pub struct Callback {
    name: Arc<str>,
    kind: CallbackKind,
}

impl Callback {
    /// Wrap a host closure.
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&mut dyn ExecutionContext, CallArgs) -> Result<Value, ScriptError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: Arc::from(name),
            kind: CallbackKind::Native(Arc::new(f)),
        }
    }

    /// The `coroutine.yield` primitive.
    pub fn yield_request() -> Self {
        Self {
            name: Arc::from("yield"),
            kind: CallbackKind::Yield,
        }
    }

    /// Name used in stack traces and `tostring`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Behaviour of this callback.
    pub fn kind(&self) -> &CallbackKind {
        &self.kind
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Callback) -> bool {
        self.addr() == other.addr()
    }

    /// Identity address.
    pub fn addr(&self) -> usize {
        match &self.kind {
            CallbackKind::Native(f) => Arc::as_ptr(f) as *const u8 as usize,
            CallbackKind::Yield => Arc::as_ptr(&self.name) as *const u8 as usize,
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({})", self.name)
    }
}
