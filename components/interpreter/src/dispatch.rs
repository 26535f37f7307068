//! Dispatch loop for bytecode execution
//!
//! Fetches instructions from the code segment and executes them until the
//! frame that started the loop returns or the coroutine yields.

use std::sync::Arc;

use bytecode_system::{CodeBlock, Instruction, OpCode, SymbolRef};
use core_types::{CallbackKind, Closure, ScriptError, SourceRef, TableRef, Value, ValueCell};

use crate::builtins;
use crate::call_frame::{CallStackItem, FrameKind};
use crate::execution::ExecutionControlToken;
use crate::shared::ScriptShared;
use crate::vm::{flatten, not_callable, Exit, Processor};

/// Outcome of one instruction
enum Step {
    Continue,
    Exit(Exit),
}

fn underflow() -> ScriptError {
    ScriptError::runtime("value stack underflow")
}

fn loop_number(value: &Value, what: &str) -> Result<f64, ScriptError> {
    value
        .as_number()
        .ok_or_else(|| ScriptError::runtime(format!("'for' {} must be a number", what)))
}

impl Processor {
    /// Run until the call stack shrinks back to `entry_depth` or the
    /// running coroutine yields
    pub(crate) fn run(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        entry_depth: usize,
    ) -> Result<Exit, ScriptError> {
        let mut block: Option<CodeBlock> = None;
        loop {
            let code = match block.take() {
                Some(b) if b.contains(self.ip) => b,
                _ => shared.code.block_at(self.ip).ok_or_else(|| {
                    ScriptError::runtime(format!("invalid code address {:08X}", self.ip))
                })?,
            };
            let inst = code
                .get(self.ip)
                .ok_or_else(|| ScriptError::runtime("invalid code address"))?;

            if shared.debug.is_attached() {
                self.listen_debugger(shared, self.ip, inst.source_ref);
            }

            match self.execute(shared, token, inst, entry_depth) {
                Ok(Step::Continue) => {}
                Ok(Step::Exit(exit)) => return Ok(exit),
                Err(err) => return Err(self.on_error(shared, err, inst.source_ref)),
            }
            block = Some(code);
        }
    }

    /// Attach location and call stack to a runtime error and tell the
    /// debugger about it
    fn on_error(
        &mut self,
        shared: &ScriptShared,
        err: ScriptError,
        location: Option<SourceRef>,
    ) -> ScriptError {
        let ScriptError::Runtime(mut runtime) = err else {
            return err;
        };
        if !runtime.is_decorated() {
            if let Some(sref) = location {
                runtime.decorate(Some(sref), &shared.format_location(&sref));
            }
        }
        if runtime.call_stack.is_empty() {
            runtime.call_stack = self.call_stack_names(shared);
        }

        if let Some(debugger) = shared.debug.debugger() {
            if debugger.signal_runtime_error(&runtime) {
                self.debugger_pause(shared, &debugger, self.ip, location);
            }
        }
        ScriptError::Runtime(runtime)
    }

    fn pop(&mut self) -> Result<Value, ScriptError> {
        self.value_stack.pop().ok_or_else(underflow)
    }

    fn peek(&self, depth: usize) -> Result<&Value, ScriptError> {
        let len = self.value_stack.len();
        len.checked_sub(depth + 1)
            .and_then(|i| self.value_stack.get(i))
            .ok_or_else(underflow)
    }

    fn frame_mut(&mut self) -> Result<&mut CallStackItem, ScriptError> {
        self.call_stack
            .last_mut()
            .ok_or_else(|| ScriptError::runtime("no active frame"))
    }

    fn jump(&mut self, token: &ExecutionControlToken, target: usize) -> Result<Step, ScriptError> {
        if target <= self.ip {
            token.check()?;
        }
        self.ip = target;
        Ok(Step::Continue)
    }

    fn execute(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        inst: &Instruction,
        entry_depth: usize,
    ) -> Result<Step, ScriptError> {
        match &inst.opcode {
            OpCode::Nop | OpCode::Meta { .. } => {}

            OpCode::BeginFn { locals } => {
                let frame = self.frame_mut()?;
                frame.local_scope = vec![None; locals.len()];
                frame.debug_symbols = locals.clone();
            }

            OpCode::Args { params, varargs } => {
                let frame = self.frame_mut()?;
                let mut args = std::mem::take(&mut frame.pending_args);
                let extra = if args.len() > *params {
                    args.split_off(*params)
                } else {
                    Vec::new()
                };
                args.resize(*params, Value::Nil);
                for (slot, value) in args.into_iter().enumerate() {
                    frame.declare_local(slot, value);
                }
                if *varargs {
                    frame.varargs = extra;
                }
            }

            OpCode::Literal(value) => self.value_stack.push(value.clone()),

            OpCode::Pop(n) => {
                let len = self.value_stack.len().checked_sub(*n).ok_or_else(underflow)?;
                self.value_stack.truncate(len);
            }

            OpCode::Copy(n) => {
                let value = self.peek(*n)?.clone();
                self.value_stack.push(value);
            }

            OpCode::Load(symbol) => {
                let value = self.get_symbol(shared, token, symbol)?;
                self.value_stack.push(value);
            }

            OpCode::Store { symbol, index } => {
                let value = self.peek(0)?.nth(*index);
                self.assign_symbol(shared, token, symbol, value)?;
            }

            OpCode::Local { slot, index } => {
                let value = self.peek(0)?.nth(*index);
                self.frame_mut()?.declare_local(*slot, value);
            }

            OpCode::Closure { entry, captures } => {
                let closure = self.make_closure(shared, token, *entry, captures)?;
                self.value_stack.push(Value::Function(Arc::new(closure)));
            }

            OpCode::VarArgs => {
                let varargs = self.frame_mut()?.varargs.clone();
                self.value_stack.push(Value::tuple(varargs));
            }

            OpCode::Call { argc } => return self.exec_call(shared, token, *argc, inst.source_ref),

            OpCode::Method { name } => {
                let object = self.pop()?;
                let method = self.index(shared, token, object.clone(), Value::String(name.clone()))?;
                self.value_stack.push(method);
                self.value_stack.push(object);
            }

            OpCode::Ret { values } => return self.exec_ret(*values, entry_depth),

            OpCode::Jump(target) => return self.jump(token, *target),

            OpCode::JumpIfFalse(target) => {
                if !self.pop()?.is_truthy() {
                    return self.jump(token, *target);
                }
            }

            OpCode::JfOrPop(target) => {
                if !self.peek(0)?.is_truthy() {
                    return self.jump(token, *target);
                }
                self.pop()?;
            }

            OpCode::JtOrPop(target) => {
                if self.peek(0)?.is_truthy() {
                    return self.jump(token, *target);
                }
                self.pop()?;
            }

            OpCode::Binary(op) => {
                let b = self.pop()?;
                let a = self.pop()?;
                let result = self.binary(shared, token, *op, a, b)?;
                self.value_stack.push(result);
            }

            OpCode::Not => {
                let value = self.pop()?;
                self.value_stack.push(Value::Boolean(!value.is_truthy()));
            }

            OpCode::Neg => {
                let value = self.pop()?;
                let result = self.negate(shared, token, value)?;
                self.value_stack.push(result);
            }

            OpCode::Len => {
                let value = self.pop()?;
                let result = self.length(shared, token, value)?;
                self.value_stack.push(result);
            }

            OpCode::NewTable => self.value_stack.push(Value::Table(TableRef::new())),

            OpCode::TblSet => {
                let value = self.pop()?;
                let key = self.pop()?.scalar();
                self.table_on_top()?.set(key, value)?;
            }

            OpCode::TblAppend { index, expand } => {
                let value = self.pop()?;
                let table = self.table_on_top()?;
                if *expand {
                    for (offset, item) in value.into_values().into_iter().enumerate() {
                        table.set(Value::from(index + offset), item)?;
                    }
                } else {
                    table.set(Value::from(*index), value)?;
                }
            }

            OpCode::Index => {
                let key = self.pop()?.scalar();
                let object = self.pop()?;
                let value = self.index(shared, token, object, key)?;
                self.value_stack.push(value);
            }

            OpCode::IndexSet { index } => {
                let key = self.pop()?.scalar();
                let object = self.pop()?;
                let value = self.peek(0)?.nth(*index);
                self.set_index(shared, token, object, key, value)?;
            }

            OpCode::MkTuple(n) => {
                let at = self.value_stack.len().checked_sub(*n).ok_or_else(underflow)?;
                let items = self.value_stack.split_off(at);
                self.value_stack.push(Value::tuple(flatten(items)));
            }

            OpCode::Scalar => {
                let value = self.pop()?;
                self.value_stack.push(value.scalar());
            }

            OpCode::ForPrep => {
                let len = self.value_stack.len();
                let at = len.checked_sub(3).ok_or_else(underflow)?;
                let start = loop_number(&self.value_stack[at], "initial value")?;
                let limit = loop_number(&self.value_stack[at + 1], "limit")?;
                let step = loop_number(&self.value_stack[at + 2], "step")?;
                self.value_stack[at] = Value::Number(start);
                self.value_stack[at + 1] = Value::Number(limit);
                self.value_stack[at + 2] = Value::Number(step);
            }

            OpCode::ForLoop { exit } => {
                let (value, limit, step) = self.loop_state()?;
                if (step > 0.0 && value > limit) || (step <= 0.0 && value < limit) {
                    self.ip = *exit;
                    return Ok(Step::Continue);
                }
            }

            OpCode::ForStep => {
                let (value, _, step) = self.loop_state()?;
                let at = self.value_stack.len() - 3;
                self.value_stack[at] = Value::Number(value + step);
            }

            OpCode::ForVar { slot } => {
                let value = self.peek(2)?.clone();
                self.frame_mut()?.declare_local(*slot, value);
            }

            OpCode::IterPrep => {
                let triple = self.pop()?;
                let mut function = triple.nth(0);
                let mut state = triple.nth(1);
                let mut control = triple.nth(2);
                if let Value::Table(_) = &function {
                    if crate::ops::metamethod(&function, "__call").is_none() {
                        state = function;
                        function = Value::Callback(builtins::next_callback());
                        control = Value::Nil;
                    }
                }
                self.value_stack.extend([function, state, control]);
            }

            OpCode::IterCheck { exit } => {
                let result = self.pop()?;
                let first = result.nth(0);
                if first.is_nil() {
                    self.ip = *exit;
                    return Ok(Step::Continue);
                }
                let top = self.value_stack.last_mut().ok_or_else(underflow)?;
                *top = first;
                self.value_stack.push(result);
            }
        }

        self.ip += 1;
        Ok(Step::Continue)
    }

    fn table_on_top(&self) -> Result<TableRef, ScriptError> {
        match self.peek(0)? {
            Value::Table(table) => Ok(table.clone()),
            other => Err(ScriptError::runtime(format!(
                "attempt to index a {} value",
                other.type_name()
            ))),
        }
    }

    fn loop_state(&self) -> Result<(f64, f64, f64), ScriptError> {
        let number = |depth| {
            self.peek(depth)
                .map(|v| v.as_number().unwrap_or(f64::NAN))
        };
        Ok((number(2)?, number(1)?, number(0)?))
    }

    fn exec_call(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        argc: usize,
        source_ref: Option<SourceRef>,
    ) -> Result<Step, ScriptError> {
        let at = self
            .value_stack
            .len()
            .checked_sub(argc + 1)
            .ok_or_else(underflow)?;
        let args = flatten(self.value_stack.split_off(at + 1));
        let function = self.pop()?;
        token.check()?;

        let (function, args) = self.resolve_callable(function, args)?;
        match function {
            Value::Function(closure) => {
                let return_address = self.ip + 1;
                self.push_script_frame(
                    shared,
                    closure,
                    args,
                    FrameKind::Nested,
                    Some(return_address),
                    source_ref,
                )?;
                Ok(Step::Continue)
            }
            Value::Callback(callback) => match callback.kind().clone() {
                CallbackKind::Yield => {
                    if !self.is_coroutine() {
                        return Err(ScriptError::runtime(
                            "attempt to yield from outside a coroutine",
                        ));
                    }
                    if !self.can_yield() {
                        return Err(ScriptError::runtime(
                            "attempt to yield across a host-call boundary",
                        ));
                    }
                    self.ip += 1;
                    Ok(Step::Exit(Exit::Yield(Value::tuple(args))))
                }
                CallbackKind::Native(f) => {
                    let result =
                        self.invoke_callback(shared, token, &callback, &f, args, source_ref)?;
                    self.value_stack.push(result);
                    self.ip += 1;
                    Ok(Step::Continue)
                }
            },
            other => Err(not_callable(&other)),
        }
    }

    fn exec_ret(&mut self, values: usize, entry_depth: usize) -> Result<Step, ScriptError> {
        let result = if values == 0 {
            Value::void()
        } else {
            self.pop()?
        };
        let frame = self
            .call_stack
            .pop()
            .ok_or_else(|| ScriptError::runtime("return without an active frame"))?;
        self.value_stack.truncate(frame.base_pointer);

        match frame.return_address {
            Some(address) if self.call_stack.len() > entry_depth => {
                self.ip = address;
                self.value_stack.push(result);
                Ok(Step::Continue)
            }
            _ => Ok(Step::Exit(Exit::Return(result))),
        }
    }

    fn make_closure(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        entry: usize,
        captures: &[SymbolRef],
    ) -> Result<Closure, ScriptError> {
        let mut upvalues = Vec::with_capacity(captures.len());
        for symbol in captures {
            let cell = match symbol {
                SymbolRef::Local { index, .. } => self.frame_mut()?.local_cell(*index),
                SymbolRef::Upvalue { name, index } => self
                    .call_stack
                    .last()
                    .and_then(|frame| frame.closure.as_ref())
                    .and_then(|closure| closure.upvalue(*index))
                    .cloned()
                    .ok_or_else(|| ScriptError::runtime(format!("invalid upvalue '{}'", name)))?,
                SymbolRef::DefaultEnv => ValueCell::new(Value::Table(shared.globals.clone())),
                SymbolRef::Global { .. } => ValueCell::new(self.get_symbol(shared, token, symbol)?),
            };
            upvalues.push((Arc::from(symbol.name()), cell));
        }
        Ok(Closure::new(shared.id, entry, upvalues))
    }
}
