//! Debugger hook of the dispatch loop
//!
//! Before every instruction the processor decides whether the current
//! debugger action lets it proceed. When it does not, it publishes its state
//! and asks the debugger what to do next, blocking the script until an action
//! resumes execution.

use std::sync::Arc;

use bytecode_system::SymbolRef;
use core_types::{SourceRef, Value};
use log::trace;

use crate::debug_state::DebugInner;
use crate::debugger::{ActionType, Debugger, WatchItem, WatchType};
use crate::shared::ScriptShared;
use crate::vm::{frame_name, Processor};

/// Entries of the value stack published to the debugger
const VSTACK_WATCH_DEPTH: usize = 32;

fn is_on_different_ref(inner: &DebugInner, sref: &SourceRef) -> bool {
    match &inner.last_hl_ref {
        None => true,
        Some(last) if inner.line_based_breakpoints => {
            last.source_idx != sref.source_idx || last.from_line != sref.from_line
        }
        Some(last) => last != sref,
    }
}

fn is_breakpoint(inner: &DebugInner, sref: &SourceRef) -> bool {
    if inner.line_based_breakpoints {
        inner
            .breakpoints
            .iter()
            .any(|b| b.source_idx == sref.source_idx && b.from_line == sref.from_line)
    } else {
        inner.breakpoints.contains(sref)
    }
}

impl Processor {
    /// Consult the attached debugger before executing the instruction at
    /// `ip`
    pub(crate) fn listen_debugger(
        &mut self,
        shared: &ScriptShared,
        ip: usize,
        source_ref: Option<SourceRef>,
    ) {
        let Some(debugger) = shared.debug.debugger() else {
            return;
        };
        let pause_requested = debugger.is_pause_requested();
        let depth = self.call_stack.len();
        // synthetic code never stops a source-level step
        let step_ref = source_ref.filter(|r| r.is_step_stop);

        {
            let mut inner = shared.debug.lock();
            let hit = step_ref
                .as_ref()
                .is_some_and(|r| is_on_different_ref(&inner, r) && is_breakpoint(&inner, r));
            if pause_requested || hit {
                inner.action = ActionType::None;
            }

            let same_ref = match &step_ref {
                None => true,
                Some(r) => !is_on_different_ref(&inner, r),
            };
            let proceed = match inner.action {
                ActionType::Run => {
                    if step_ref.is_some() {
                        inner.last_hl_ref = step_ref;
                    }
                    true
                }
                ActionType::ByteCodeStepOver => inner.action_target != Some(ip),
                ActionType::StepOut | ActionType::ByteCodeStepOut => {
                    depth >= inner.stack_depth_at_step
                }
                ActionType::StepIn => depth >= inner.stack_depth_at_step && same_ref,
                ActionType::StepOver => same_ref || depth > inner.stack_depth_at_step,
                _ => false,
            };
            if proceed {
                return;
            }
        }

        self.debugger_pause(shared, &debugger, ip, source_ref);
    }

    /// Publish state and loop on the debugger's actions until one resumes
    /// execution
    pub(crate) fn debugger_pause(
        &mut self,
        shared: &ScriptShared,
        debugger: &Arc<dyn Debugger>,
        ip: usize,
        source_ref: Option<SourceRef>,
    ) {
        self.refresh_debugger(shared, debugger.as_ref(), source_ref, false);

        loop {
            let action = debugger.get_action(ip, source_ref);
            trace!("debugger action {:?} at {:08X}", action.action, ip);

            match action.action {
                ActionType::StepIn
                | ActionType::StepOver
                | ActionType::StepOut
                | ActionType::ByteCodeStepOut
                | ActionType::Run => {
                    let mut inner = shared.debug.lock();
                    inner.action = action.action;
                    inner.last_hl_ref = source_ref;
                    inner.stack_depth_at_step = self.call_stack.len();
                    return;
                }
                ActionType::ByteCodeStepIn => {
                    shared.debug.lock().action = ActionType::ByteCodeStepIn;
                    return;
                }
                ActionType::ByteCodeStepOver => {
                    let mut inner = shared.debug.lock();
                    inner.action = ActionType::ByteCodeStepOver;
                    inner.action_target = Some(ip + 1);
                    return;
                }
                ActionType::ToggleBreakpoint
                | ActionType::SetBreakpoint
                | ActionType::ClearBreakpoint => {
                    let state = match action.action {
                        ActionType::SetBreakpoint => Some(true),
                        ActionType::ClearBreakpoint => Some(false),
                        _ => None,
                    };
                    if let Some(source) = shared.source(action.source_id) {
                        shared.debug.toggle_breakpoint(
                            &source,
                            action.source_line,
                            action.source_col,
                            state,
                        );
                    }
                    self.refresh_debugger(shared, debugger.as_ref(), source_ref, true);
                }
                ActionType::ResetBreakpoints => {
                    if let Some(source) = shared.source(action.source_id) {
                        shared.debug.reset_breakpoints(&source, &action.lines);
                    }
                    self.refresh_debugger(shared, debugger.as_ref(), source_ref, true);
                }
                ActionType::Refresh => {
                    self.refresh_debugger(shared, debugger.as_ref(), source_ref, false)
                }
                ActionType::HardRefresh => {
                    self.refresh_debugger(shared, debugger.as_ref(), source_ref, true)
                }
                ActionType::None => {}
            }
        }
    }

    fn refresh_debugger(
        &self,
        shared: &ScriptShared,
        debugger: &dyn Debugger,
        source_ref: Option<SourceRef>,
        hard: bool,
    ) {
        debugger.update(WatchType::CallStack, &self.debugger_call_stack(shared, source_ref));
        debugger.update(WatchType::Watches, &self.debugger_watches(shared, debugger));
        debugger.update(WatchType::VStack, &self.debugger_value_stack());
        debugger.update(WatchType::Locals, &self.debugger_locals());
        debugger.update(WatchType::Threads, &debugger_threads(shared));
        if hard {
            debugger.refresh_breakpoints(&shared.debug.breakpoints());
        }
    }

    fn debugger_call_stack(
        &self,
        shared: &ScriptShared,
        source_ref: Option<SourceRef>,
    ) -> Vec<WatchItem> {
        let mut location = source_ref;
        self.call_stack
            .iter()
            .rev()
            .map(|frame| {
                let item = WatchItem {
                    address: (!frame.is_host()).then_some(frame.debug_entry_point),
                    base_pointer: Some(frame.base_pointer),
                    return_address: frame.return_address,
                    name: Some(frame_name(shared, frame)),
                    location,
                    ..WatchItem::default()
                };
                location = frame.calling_source_ref;
                item
            })
            .collect()
    }

    fn debugger_watches(&self, shared: &ScriptShared, debugger: &dyn Debugger) -> Vec<WatchItem> {
        debugger
            .get_watch_items()
            .into_iter()
            .map(|name| {
                let symbol = self.find_symbol_by_name(&name);
                let (value, is_error) = match self.peek_symbol(shared, &symbol) {
                    Ok(value) => (value, false),
                    Err(err) => (Value::from(err.to_string()), true),
                };
                WatchItem {
                    name: Some(name),
                    value: Some(value),
                    symbol: Some(symbol),
                    is_error,
                    ..WatchItem::default()
                }
            })
            .collect()
    }

    fn debugger_value_stack(&self) -> Vec<WatchItem> {
        self.value_stack
            .iter()
            .enumerate()
            .rev()
            .take(VSTACK_WATCH_DEPTH)
            .map(|(address, value)| WatchItem {
                address: Some(address),
                value: Some(value.clone()),
                ..WatchItem::default()
            })
            .collect()
    }

    fn debugger_locals(&self) -> Vec<WatchItem> {
        let Some(frame) = self.current_script_frame() else {
            return Vec::new();
        };
        frame
            .debug_symbols
            .iter()
            .enumerate()
            .filter_map(|(slot, name)| {
                let cell = frame.local_scope.get(slot)?.as_ref()?;
                Some(WatchItem {
                    address: Some(slot),
                    name: Some(name.to_string()),
                    value: Some(cell.get()),
                    symbol: Some(SymbolRef::local(name, slot)),
                    ..WatchItem::default()
                })
            })
            .collect()
    }
}

fn debugger_threads(shared: &ScriptShared) -> Vec<WatchItem> {
    shared
        .coroutines
        .lock()
        .iter()
        .map(|coroutine| WatchItem {
            address: usize::try_from(coroutine.id()).ok(),
            name: Some(format!("{:?}", coroutine.state())),
            value: Some(Value::Coroutine(coroutine.clone())),
            ..WatchItem::default()
        })
        .collect()
}
