//! Debugger protocol
//!
//! A [`Debugger`] attached to a script is consulted before instructions
//! execute. When the processor pauses it publishes the call stack, the
//! watches, the top of the value stack, the locals of the innermost script
//! frame and the coroutine list, then blocks in [`Debugger::get_action`]
//! until the debugger decides how execution continues.

use bytecode_system::SymbolRef;
use core_types::{RuntimeError, SourceCode, SourceRef, Value};

/// What a debugger front end can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebuggerCaps {
    /// Wants every compiled source
    pub can_debug_source_code: bool,
    /// Wants the bytecode listing
    pub can_debug_byte_code: bool,
    /// Breakpoints and stepping compare lines instead of whole references
    pub has_line_based_breakpoints: bool,
}

/// Kinds of debugger actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    /// Continue until a breakpoint or a pause request
    Run,
    /// Stop at the next different source location, entering calls
    StepIn,
    /// Stop at the next different source location at the same or a
    /// shallower depth
    StepOver,
    /// Stop once the current function returned
    StepOut,
    /// Stop at the next instruction
    ByteCodeStepIn,
    /// Stop at the instruction following the current one
    ByteCodeStepOver,
    /// Stop once the current function returned
    ByteCodeStepOut,
    /// Flip the breakpoint nearest to a location
    ToggleBreakpoint,
    /// Set the breakpoint nearest to a location
    SetBreakpoint,
    /// Clear the breakpoint nearest to a location
    ClearBreakpoint,
    /// Replace the breakpoints of a source with a set of lines
    ResetBreakpoints,
    /// Publish watches again
    Refresh,
    /// Publish watches and breakpoints again
    HardRefresh,
    /// Keep asking
    None,
}

/// An action returned by [`Debugger::get_action`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerAction {
    /// What to do
    pub action: ActionType,
    /// Source the action refers to
    pub source_id: usize,
    /// 1-based line the action refers to
    pub source_line: usize,
    /// 1-based column the action refers to
    pub source_col: usize,
    /// Lines for [`ActionType::ResetBreakpoints`]
    pub lines: Vec<usize>,
}

impl DebuggerAction {
    /// An action without a location
    pub fn new(action: ActionType) -> Self {
        Self {
            action,
            source_id: 0,
            source_line: 0,
            source_col: 0,
            lines: Vec::new(),
        }
    }

    /// A breakpoint action at a location
    pub fn at(action: ActionType, source_id: usize, line: usize, col: usize) -> Self {
        Self {
            action,
            source_id,
            source_line: line,
            source_col: col,
            lines: Vec::new(),
        }
    }

    /// Replace the breakpoints of `source_id` with one per listed line
    pub fn reset_breakpoints(source_id: usize, lines: Vec<usize>) -> Self {
        Self {
            action: ActionType::ResetBreakpoints,
            source_id,
            source_line: 0,
            source_col: 0,
            lines,
        }
    }
}

/// Panels a debugger receives updates for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchType {
    /// Active frames, innermost first
    CallStack,
    /// Values of the debugger's watch expressions
    Watches,
    /// Top of the value stack
    VStack,
    /// Locals of the innermost script frame
    Locals,
    /// Live coroutines
    Threads,
}

/// One row of a debugger panel
#[derive(Debug, Clone, Default)]
pub struct WatchItem {
    /// Code address or stack position
    pub address: Option<usize>,
    /// Value stack base of a frame
    pub base_pointer: Option<usize>,
    /// Return address of a frame
    pub return_address: Option<usize>,
    /// Display name
    pub name: Option<String>,
    /// Current value
    pub value: Option<Value>,
    /// How a watch was resolved
    pub symbol: Option<SymbolRef>,
    /// Source location
    pub location: Option<SourceRef>,
    /// True when the watch could not be evaluated
    pub is_error: bool,
}

/// Interface between the processor and a debugger front end
///
/// Every method is called from the thread running the script. Calls are
/// made without any processor lock held, so implementations may block.
pub trait Debugger: Send + Sync {
    /// Capabilities, read once when the debugger is attached
    fn caps(&self) -> DebuggerCaps {
        DebuggerCaps {
            can_debug_source_code: true,
            ..DebuggerCaps::default()
        }
    }

    /// A source was compiled into the script
    fn set_source_code(&self, _source: &SourceCode) {}

    /// Full bytecode listing, one line per instruction
    fn set_byte_code(&self, _listing: &[String]) {}

    /// Checked before every instruction; `true` pauses as soon as possible
    fn is_pause_requested(&self) -> bool {
        false
    }

    /// A runtime error was raised; return `true` to pause at the faulting
    /// instruction
    fn signal_runtime_error(&self, _error: &RuntimeError) -> bool {
        false
    }

    /// Decide how execution continues from instruction `ip`
    fn get_action(&self, ip: usize, source_ref: Option<SourceRef>) -> DebuggerAction;

    /// The outermost execution returned
    fn signal_execution_ended(&self) {}

    /// New contents for a panel
    fn update(&self, _watch_type: WatchType, _items: &[WatchItem]) {}

    /// Names of the variables to watch
    fn get_watch_items(&self) -> Vec<String> {
        Vec::new()
    }

    /// The complete breakpoint set after it changed
    fn refresh_breakpoints(&self, _refs: &[SourceRef]) {}
}
