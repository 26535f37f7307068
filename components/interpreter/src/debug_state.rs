//! Breakpoints and stepping state of a script

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytecode_system::ByteCode;
use core_types::{SourceCode, SourceRef};
use log::trace;
use parking_lot::{Mutex, MutexGuard};

use crate::debugger::{ActionType, Debugger};

pub(crate) struct DebugInner {
    pub(crate) debugger: Option<Arc<dyn Debugger>>,
    pub(crate) breakpoints: HashSet<SourceRef>,
    pub(crate) action: ActionType,
    pub(crate) action_target: Option<usize>,
    pub(crate) stack_depth_at_step: usize,
    pub(crate) last_hl_ref: Option<SourceRef>,
    pub(crate) line_based_breakpoints: bool,
}

pub(crate) struct DebugState {
    attached: AtomicBool,
    inner: Mutex<DebugInner>,
}

impl DebugState {
    pub(crate) fn new() -> Self {
        Self {
            attached: AtomicBool::new(false),
            inner: Mutex::new(DebugInner {
                debugger: None,
                breakpoints: HashSet::new(),
                action: ActionType::None,
                action_target: None,
                stack_depth_at_step: 0,
                last_hl_ref: None,
                line_based_breakpoints: false,
            }),
        }
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, DebugInner> {
        self.inner.lock()
    }

    pub(crate) fn debugger(&self) -> Option<Arc<dyn Debugger>> {
        if !self.is_attached() {
            return None;
        }
        self.inner.lock().debugger.clone()
    }

    /// Attach or detach a debugger, replaying every known source to it
    pub(crate) fn attach(
        &self,
        debugger: Option<Arc<dyn Debugger>>,
        sources: &[Arc<SourceCode>],
        code: &ByteCode,
    ) {
        {
            let mut inner = self.inner.lock();
            inner.line_based_breakpoints = debugger
                .as_ref()
                .is_some_and(|d| d.caps().has_line_based_breakpoints);
            inner.action = ActionType::None;
            inner.action_target = None;
            inner.last_hl_ref = None;
            inner.debugger = debugger.clone();
        }
        self.attached.store(debugger.is_some(), Ordering::Release);

        if let Some(debugger) = debugger {
            let caps = debugger.caps();
            if caps.can_debug_source_code {
                for source in sources {
                    debugger.set_source_code(source);
                }
            }
            if caps.can_debug_byte_code {
                debugger.set_byte_code(&code.listing());
            }
        }
    }

    pub(crate) fn source_registered(&self, source: &SourceCode, code: &ByteCode) {
        if let Some(debugger) = self.debugger() {
            let caps = debugger.caps();
            if caps.can_debug_source_code {
                debugger.set_source_code(source);
            }
            if caps.can_debug_byte_code {
                debugger.set_byte_code(&code.listing());
            }
        }
    }

    pub(crate) fn signal_execution_ended(&self) {
        if let Some(debugger) = self.debugger() {
            debugger.signal_execution_ended();
        }
    }

    /// Current breakpoints, ordered by location
    pub(crate) fn breakpoints(&self) -> Vec<SourceRef> {
        let mut refs: Vec<SourceRef> = self.inner.lock().breakpoints.iter().copied().collect();
        refs.sort_by_key(|r| (r.source_idx, r.from_line, r.from_char, r.to_line, r.to_char));
        refs
    }

    /// Toggle (`state == None`), set or clear the breakpoints at a location.
    ///
    /// References containing the location win; without one, the breakable
    /// reference nearest to it is used. Returns the affected references.
    pub(crate) fn toggle_breakpoint(
        &self,
        source: &SourceCode,
        line: usize,
        col: usize,
        state: Option<bool>,
    ) -> Vec<SourceRef> {
        let breakable = || source.refs.iter().filter(|r| !r.cannot_breakpoint);

        let mut targets: Vec<SourceRef> = breakable()
            .filter(|r| r.includes_location(source.id, line, col))
            .copied()
            .collect();
        if targets.is_empty() {
            let nearest = breakable()
                .map(|r| (r.get_location_distance(source.id, line, col), r))
                .filter(|(distance, _)| *distance != u64::MAX)
                .min_by_key(|(distance, _)| *distance)
                .map(|(_, r)| *r);
            targets.extend(nearest);
        }

        let mut inner = self.inner.lock();
        for target in &targets {
            let enable = state.unwrap_or_else(|| !inner.breakpoints.contains(target));
            if enable {
                inner.breakpoints.insert(*target);
            } else {
                inner.breakpoints.remove(target);
            }
            trace!(
                "breakpoint {} at {}:{}",
                if enable { "set" } else { "cleared" },
                source.name,
                target.from_line
            );
        }
        targets
    }

    /// Replace every breakpoint of `source` with one per breakable
    /// reference starting on a listed line; returns the lines that got one
    pub(crate) fn reset_breakpoints(&self, source: &SourceCode, lines: &[usize]) -> Vec<usize> {
        let wanted: HashSet<usize> = lines.iter().copied().collect();
        let mut inner = self.inner.lock();
        inner.breakpoints.retain(|r| r.source_idx != source.id);

        let mut placed = Vec::new();
        for sref in source.refs.iter().filter(|r| !r.cannot_breakpoint) {
            if wanted.contains(&sref.from_line) {
                inner.breakpoints.insert(*sref);
                placed.push(sref.from_line);
            }
        }
        placed.sort_unstable();
        placed.dedup();
        placed
    }
}
