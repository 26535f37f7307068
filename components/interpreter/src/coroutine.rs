//! Coroutines
//!
//! A coroutine owns a [`Processor`] of its own, boxed inside the
//! [`CoroutineRef`] handle while the coroutine is suspended. Resuming takes
//! the processor out, runs it on the resumer's thread and puts it back on
//! yield. Dead coroutines drop their processor.

use core_types::{CoroutineRef, CoroutineState, ScriptError, Value};
use log::trace;

use crate::execution::ExecutionControlToken;
use crate::shared::ScriptShared;
use crate::vm::{Exit, Processor};

pub(crate) struct CoroutineBody {
    processor: Processor,
    /// Body function, taken by the first resume
    function: Option<Value>,
}

/// Pops the running-coroutine stack even when the body panics
struct RunningGuard<'a> {
    shared: &'a ScriptShared,
}

impl<'a> RunningGuard<'a> {
    fn enter(shared: &'a ScriptShared, coroutine: &CoroutineRef) -> Self {
        shared.coroutine_stack.lock().push(coroutine.clone());
        Self { shared }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.shared.coroutine_stack.lock().pop();
    }
}

/// Wrap `function` in a new, not yet started coroutine
pub(crate) fn create(shared: &ScriptShared, function: Value) -> Result<CoroutineRef, ScriptError> {
    let function = function.scalar();
    match &function {
        Value::Function(closure) if closure.owner() != shared.id => {
            return Err(ScriptError::runtime(
                "attempt to create a coroutine from a function of a different script",
            ))
        }
        Value::Function(_) | Value::Callback(_) => {}
        other => {
            return Err(ScriptError::runtime(format!(
                "bad argument #1 to 'create' (function expected, got {})",
                other.type_name()
            )))
        }
    }

    let body = CoroutineBody {
        processor: Processor::for_coroutine(),
        function: Some(function),
    };
    let coroutine = CoroutineRef::new(shared.id, CoroutineState::NotStarted, Some(Box::new(body)));
    shared.track_coroutine(&coroutine);
    trace!("script {}: created coroutine #{}", shared.id, coroutine.id());
    Ok(coroutine)
}

/// Resume `coroutine`; returns what it yielded or returned
pub(crate) fn resume(
    shared: &ScriptShared,
    token: &ExecutionControlToken,
    coroutine: &CoroutineRef,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    if coroutine.owner() != shared.id {
        return Err(ScriptError::runtime(
            "attempt to resume a coroutine of a different script",
        ));
    }
    match coroutine.state() {
        CoroutineState::NotStarted | CoroutineState::Suspended => {}
        CoroutineState::Dead => return Err(ScriptError::runtime("cannot resume dead coroutine")),
        CoroutineState::Main | CoroutineState::Running => {
            return Err(ScriptError::runtime("cannot resume non-suspended coroutine"))
        }
    }
    let _nested = shared.enter_nested()?;

    let mut body = coroutine
        .take_body()
        .and_then(|body| body.downcast::<CoroutineBody>().ok())
        .ok_or_else(|| ScriptError::runtime("cannot resume dead coroutine"))?;

    coroutine.transition(CoroutineState::Running)?;
    let result = {
        let _running = RunningGuard::enter(shared, coroutine);
        match body.function.take() {
            Some(function) => body.processor.start(shared, token, function, args),
            None => body.processor.continue_after_yield(shared, token, args),
        }
    };

    match result {
        Ok(Exit::Yield(value)) => {
            coroutine.transition(CoroutineState::Suspended)?;
            coroutine.put_body(body);
            Ok(value)
        }
        Ok(Exit::Return(value)) => {
            coroutine.transition(CoroutineState::Dead)?;
            trace!("script {}: coroutine #{} finished", shared.id, coroutine.id());
            Ok(value)
        }
        Err(err) => {
            coroutine.transition(CoroutineState::Dead)?;
            Err(err)
        }
    }
}
