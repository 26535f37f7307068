//! Runtime symbol access
//!
//! Locals and upvalues are cells; globals are fields of whatever the
//! environment symbol evaluates to when the access runs.

use bytecode_system::SymbolRef;
use core_types::{ScriptError, Value, ENV_NAME};

use crate::execution::ExecutionControlToken;
use crate::shared::ScriptShared;
use crate::vm::Processor;

fn env_not_a_table(env: &Value) -> ScriptError {
    ScriptError::runtime(format!("{} is not a table but a {}", ENV_NAME, env.type_name()))
}

impl Processor {
    /// Value of a local, upvalue or default-environment symbol; `None` for
    /// globals, which need an environment lookup
    fn read_cell(&self, shared: &ScriptShared, symbol: &SymbolRef) -> Option<Value> {
        match symbol {
            SymbolRef::Local { index, .. } => Some(
                self.current_script_frame()
                    .and_then(|frame| frame.local_scope.get(*index))
                    .and_then(Option::as_ref)
                    .map_or(Value::Nil, |cell| cell.get()),
            ),
            SymbolRef::Upvalue { index, .. } => Some(
                self.current_script_frame()
                    .and_then(|frame| frame.closure.as_ref())
                    .and_then(|closure| closure.upvalue(*index))
                    .map_or(Value::Nil, |cell| cell.get()),
            ),
            SymbolRef::DefaultEnv => Some(Value::Table(shared.globals.clone())),
            SymbolRef::Global { .. } => None,
        }
    }

    /// Read a symbol
    pub(crate) fn get_symbol(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        symbol: &SymbolRef,
    ) -> Result<Value, ScriptError> {
        if let Some(value) = self.read_cell(shared, symbol) {
            return Ok(value);
        }
        let SymbolRef::Global { name, env } = symbol else {
            return Ok(Value::Nil);
        };
        let env = self.get_symbol(shared, token, env)?;
        match &env {
            Value::Table(table) => {
                let key = Value::String(name.clone());
                let raw = table.get(&key);
                if !raw.is_nil() || table.metatable().is_none() {
                    return Ok(raw);
                }
                self.index(shared, token, env, key)
            }
            other => Err(env_not_a_table(other)),
        }
    }

    /// Write a symbol
    pub(crate) fn assign_symbol(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        symbol: &SymbolRef,
        value: Value,
    ) -> Result<(), ScriptError> {
        match symbol {
            SymbolRef::Local { index, .. } => {
                let frame = self
                    .current_script_frame_mut()
                    .ok_or_else(|| ScriptError::runtime("no active script frame"))?;
                frame.local_cell(*index).set(value.scalar());
                Ok(())
            }
            SymbolRef::Upvalue { name, index } => {
                let cell = self
                    .current_script_frame()
                    .and_then(|frame| frame.closure.as_ref())
                    .and_then(|closure| closure.upvalue(*index))
                    .ok_or_else(|| ScriptError::runtime(format!("invalid upvalue '{}'", name)))?;
                cell.set(value.scalar());
                Ok(())
            }
            SymbolRef::Global { name, env } => {
                let env = self.get_symbol(shared, token, env)?;
                if !matches!(env, Value::Table(_)) {
                    return Err(env_not_a_table(&env));
                }
                self.set_index(shared, token, env, Value::String(name.clone()), value.scalar())
            }
            SymbolRef::DefaultEnv => Err(ScriptError::runtime(
                "cannot assign to the default environment",
            )),
        }
    }

    /// Resolve `name` the way the compiler would at the current
    /// instruction: innermost live local first, then the running closure's
    /// upvalues, then a global
    pub fn find_symbol_by_name(&self, name: &str) -> SymbolRef {
        if let Some(frame) = self.current_script_frame() {
            let local = frame
                .debug_symbols
                .iter()
                .enumerate()
                .rev()
                .find(|(slot, local)| {
                    &***local == name && frame.local_scope.get(*slot).is_some_and(Option::is_some)
                });
            if let Some((slot, _)) = local {
                return SymbolRef::local(name, slot);
            }

            let upvalue = frame
                .closure
                .as_ref()
                .and_then(|c| c.upvalue_names().iter().position(|n| &**n == name));
            if let Some(index) = upvalue {
                return SymbolRef::upvalue(name, index);
            }
        }

        if name == ENV_NAME {
            SymbolRef::DefaultEnv
        } else {
            SymbolRef::global(name, self.find_symbol_by_name(ENV_NAME))
        }
    }

    /// Read a symbol without running metamethods
    pub(crate) fn peek_symbol(
        &self,
        shared: &ScriptShared,
        symbol: &SymbolRef,
    ) -> Result<Value, ScriptError> {
        if let Some(value) = self.read_cell(shared, symbol) {
            return Ok(value);
        }
        match symbol {
            SymbolRef::Global { name, env } => match self.peek_symbol(shared, env)? {
                Value::Table(table) => Ok(table.get(&Value::String(name.clone()))),
                other => Err(env_not_a_table(&other)),
            },
            _ => Ok(Value::Nil),
        }
    }
}
