//! Execution context handed to host callbacks

use std::time::Duration;

use core_types::{
    CoroutineRef, ExecutionContext, ScriptError, ScriptId, SourceRef, TableRef, Value,
};

use crate::coroutine;
use crate::execution::ExecutionControlToken;
use crate::shared::ScriptShared;
use crate::vm::Processor;

/// The processor, script state and control token of a running callback
///
/// Calls made through the context run on the processor that invoked the
/// callback, which is the innermost running coroutine's processor when the
/// callback was called from inside a coroutine.
pub(crate) struct ProcessorContext<'a> {
    processor: &'a mut Processor,
    shared: &'a ScriptShared,
    token: &'a ExecutionControlToken,
    caller: Option<SourceRef>,
}

impl<'a> ProcessorContext<'a> {
    pub(crate) fn new(
        processor: &'a mut Processor,
        shared: &'a ScriptShared,
        token: &'a ExecutionControlToken,
        caller: Option<SourceRef>,
    ) -> Self {
        Self {
            processor,
            shared,
            token,
            caller,
        }
    }
}

impl ExecutionContext for ProcessorContext<'_> {
    fn script_id(&self) -> ScriptId {
        self.shared.id
    }

    fn globals(&self) -> TableRef {
        self.shared.globals.clone()
    }

    fn registry(&self) -> TableRef {
        self.shared.registry.clone()
    }

    fn call(&mut self, function: &Value, args: Vec<Value>) -> Result<Value, ScriptError> {
        self.processor.call(self.shared, self.token, function, args)
    }

    fn load(
        &mut self,
        code: &str,
        chunk_name: Option<&str>,
        env: Option<TableRef>,
    ) -> Result<Value, ScriptError> {
        self.shared.load_string(code, env, chunk_name)
    }

    fn create_coroutine(&mut self, function: Value) -> Result<Value, ScriptError> {
        coroutine::create(self.shared, function).map(Value::Coroutine)
    }

    fn resume(
        &mut self,
        coroutine: &CoroutineRef,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        coroutine::resume(self.shared, self.token, coroutine, args)
    }

    fn running_coroutine(&self) -> CoroutineRef {
        self.shared.running_coroutine()
    }

    fn can_yield(&self) -> bool {
        // the callback's own frame is the only host frame allowed
        self.processor.is_coroutine()
            && self
                .processor
                .call_stack
                .iter()
                .filter(|frame| frame.is_host())
                .count()
                <= 1
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn sleep(&mut self, duration: Duration) -> Result<(), ScriptError> {
        if self.token.sleep(duration) {
            return Err(ScriptError::Cancelled);
        }
        Ok(())
    }

    fn print(&mut self, text: &str) {
        let sink = self.shared.options.read().print.clone();
        sink(text);
    }

    fn caller_location(&self) -> Option<String> {
        self.caller.map(|sref| self.shared.format_location(&sref))
    }
}
