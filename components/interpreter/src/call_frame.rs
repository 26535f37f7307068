//! Call stack frames

use std::sync::Arc;

use core_types::{Closure, SourceRef, Value, ValueCell};

/// How a frame was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// First frame of a call made from outside the processor loop
    EntryPoint,
    /// Script function called by a script function
    Nested,
    /// Host callback running on behalf of a script call
    Host,
}

/// A function invocation on the processor's call stack
///
/// Script frames own one cell per local slot. A slot stays `None` until
/// its declaration runs, and every declaration replaces the cell, so
/// closures created in different loop iterations capture different cells.
#[derive(Debug, Clone)]
pub struct CallStackItem {
    /// Value stack height when the frame was pushed
    pub base_pointer: usize,
    /// Instruction to continue at in the caller, `None` for entry points
    pub return_address: Option<usize>,
    /// The running closure; `None` for host frames
    pub closure: Option<Arc<Closure>>,
    /// Callback name for host frames
    pub callback_name: Option<Arc<str>>,
    /// Local cells by slot
    pub local_scope: Vec<Option<ValueCell>>,
    /// Local names by slot, for the debugger
    pub debug_symbols: Arc<[Arc<str>]>,
    /// Extra arguments of a variadic function
    pub varargs: Vec<Value>,
    /// Arguments waiting for the function's `Args` instruction
    pub pending_args: Vec<Value>,
    /// Address of the function header
    pub debug_entry_point: usize,
    /// Location of the call instruction that created the frame
    pub calling_source_ref: Option<SourceRef>,
    /// Entry point, nested or host
    pub kind: FrameKind,
}

impl CallStackItem {
    /// Frame for a script function
    pub fn script(
        closure: Arc<Closure>,
        args: Vec<Value>,
        kind: FrameKind,
        return_address: Option<usize>,
        base_pointer: usize,
        calling_source_ref: Option<SourceRef>,
    ) -> Self {
        Self {
            base_pointer,
            return_address,
            debug_entry_point: closure.entry(),
            closure: Some(closure),
            callback_name: None,
            local_scope: Vec::new(),
            debug_symbols: Arc::from(Vec::new()),
            varargs: Vec::new(),
            pending_args: args,
            calling_source_ref,
            kind,
        }
    }

    /// Frame for a host callback
    pub fn host(name: &str, base_pointer: usize, calling_source_ref: Option<SourceRef>) -> Self {
        Self {
            base_pointer,
            return_address: None,
            closure: None,
            callback_name: Some(Arc::from(name)),
            local_scope: Vec::new(),
            debug_symbols: Arc::from(Vec::new()),
            varargs: Vec::new(),
            pending_args: Vec::new(),
            debug_entry_point: 0,
            calling_source_ref,
            kind: FrameKind::Host,
        }
    }

    /// True for host callback frames
    pub fn is_host(&self) -> bool {
        self.kind == FrameKind::Host
    }

    /// Cell for a local slot, created on first use
    pub fn local_cell(&mut self, slot: usize) -> ValueCell {
        if slot >= self.local_scope.len() {
            self.local_scope.resize(slot + 1, None);
        }
        self.local_scope[slot]
            .get_or_insert_with(|| ValueCell::new(Value::Nil))
            .clone()
    }

    /// Declare a local: the slot gets a fresh cell holding `value`
    pub fn declare_local(&mut self, slot: usize, value: Value) {
        if slot >= self.local_scope.len() {
            self.local_scope.resize(slot + 1, None);
        }
        self.local_scope[slot] = Some(ValueCell::new(value));
    }
}
