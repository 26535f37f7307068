//! Coroutine handles.
//!
//! A coroutine owns a suspended processor. The processor type lives in the
//! interpreter crate, so the handle stores it as an opaque boxed body which
//! is taken out while the coroutine runs and put back when it suspends.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{RuntimeError, ScriptError, ScriptId};

static NEXT_COROUTINE_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a coroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoroutineState {
    /// The script's main processor
    Main,
    /// Created, never resumed
    NotStarted,
    /// Currently executing
    Running,
    /// Waiting in `yield`
    Suspended,
    /// Returned or raised an error
    Dead,
}

impl CoroutineState {
    /// Whether moving from `self` to `to` is a legal transition.
    pub fn can_transition_to(self, to: CoroutineState) -> bool {
        use CoroutineState::*;
        matches!(
            (self, to),
            (NotStarted, Running) | (Running, Suspended) | (Suspended, Running) | (Running, Dead)
        )
    }
}

struct Coroutine {
    owner: ScriptId,
    id: u64,
    state: Mutex<CoroutineState>,
    body: Mutex<Option<Box<dyn Any + Send>>>,
}

/// Shared handle to a coroutine.
#[derive(Clone)]
pub struct CoroutineRef(Arc<Coroutine>);

impl CoroutineRef {
    /// Create a coroutine owned by `owner` in the given initial state.
    pub fn new(owner: ScriptId, state: CoroutineState, body: Option<Box<dyn Any + Send>>) -> Self {
        CoroutineRef(Arc::new(Coroutine {
            owner,
            id: NEXT_COROUTINE_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(state),
            body: Mutex::new(body),
        }))
    }

    /// Script that created this coroutine.
    pub fn owner(&self) -> ScriptId {
        self.0.owner
    }

    /// Process-unique reference id.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Current state.
    pub fn state(&self) -> CoroutineState {
        *self.0.state.lock()
    }

    /// Move to a new state, rejecting illegal transitions.
    pub fn transition(&self, to: CoroutineState) -> Result<(), ScriptError> {
        let mut state = self.0.state.lock();
        if !state.can_transition_to(to) {
            return Err(RuntimeError::new(format!(
                "invalid coroutine state transition from {:?} to {:?}",
                *state, to
            ))
            .into());
        }
        *state = to;
        Ok(())
    }

    /// Take the suspended body out for execution.
    pub fn take_body(&self) -> Option<Box<dyn Any + Send>> {
        self.0.body.lock().take()
    }

    /// Store the body back after execution stopped.
    pub fn put_body(&self, body: Box<dyn Any + Send>) {
        *self.0.body.lock() = Some(body);
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &CoroutineRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity address.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const u8 as usize
    }
}

impl fmt::Debug for CoroutineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Coroutine(#{}, {:?})", self.id(), self.state())
    }
}
