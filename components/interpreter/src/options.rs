//! Per-script configuration

use std::fmt;
use std::sync::Arc;

/// Default limit on the number of call stack frames
pub const DEFAULT_CALL_STACK_LIMIT: usize = 16_384;

/// Default limit on nested host-stack re-entries: metamethods, callbacks
/// calling back into the script, `pcall` and coroutine resumes.
/// Fits a 2 MiB thread stack with room to spare.
pub const DEFAULT_NESTED_CALL_LIMIT: usize = 40;

/// Destination of `print` output
pub type PrintSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Options controlling a [`Script`](crate::Script)
///
/// # Examples
///
/// ```
/// use interpreter::ScriptOptions;
///
/// let options = ScriptOptions::default();
/// assert!(options.check_thread_access);
/// assert_eq!(options.call_stack_limit, 16_384);
/// assert_eq!(options.max_nested_calls, 40);
/// ```
#[derive(Clone)]
pub struct ScriptOptions {
    /// Reject entry from a second thread while the script is running
    pub check_thread_access: bool,
    /// Report runtime error locations as `chunk:line`
    pub use_classic_error_locations: bool,
    /// Maximum depth of the call stack before "stack overflow"
    pub call_stack_limit: usize,
    /// Maximum host-stack re-entries before "stack overflow"; raise only
    /// when scripts run on threads with a larger stack
    pub max_nested_calls: usize,
    /// Where `print` writes
    pub print: PrintSink,
}

impl ScriptOptions {
    /// Replace the print sink
    pub fn with_print<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.print = Arc::new(sink);
        self
    }
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            check_thread_access: true,
            use_classic_error_locations: false,
            call_stack_limit: DEFAULT_CALL_STACK_LIMIT,
            max_nested_calls: DEFAULT_NESTED_CALL_LIMIT,
            print: Arc::new(|line| println!("{}", line)),
        }
    }
}

impl fmt::Debug for ScriptOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptOptions")
            .field("check_thread_access", &self.check_thread_access)
            .field("use_classic_error_locations", &self.use_classic_error_locations)
            .field("call_stack_limit", &self.call_stack_limit)
            .field("max_nested_calls", &self.max_nested_calls)
            .field("print", &"<sink>")
            .finish()
    }
}
