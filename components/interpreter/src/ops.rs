//! Operators and indexing
//!
//! Primitive operands are handled inline; everything else falls back to the
//! operands' metatables. Metamethods run through [`Processor::call`], so
//! they count against the nesting limit like any other host-boundary call.

use bytecode_system::BinaryOp;
use core_types::{ScriptError, Value};

use crate::execution::ExecutionControlToken;
use crate::shared::ScriptShared;
use crate::vm::Processor;

/// Longest `__index` / `__newindex` chain followed before giving up
const MAX_META_CHAIN: usize = 100;

/// Handler `name` in the metatable of `value`
pub(crate) fn metamethod(value: &Value, name: &str) -> Option<Value> {
    match value {
        Value::Table(table) => table
            .metatable()
            .map(|meta| meta.get_str(name))
            .filter(|handler| !handler.is_nil()),
        _ => None,
    }
}

fn arith_event(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "__add",
        BinaryOp::Sub => "__sub",
        BinaryOp::Mul => "__mul",
        BinaryOp::Div => "__div",
        BinaryOp::Mod => "__mod",
        BinaryOp::Pow => "__pow",
        _ => "__concat",
    }
}

fn arith_numbers(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a - (a / b).floor() * b,
        _ => a.powf(b),
    }
}

fn arith_error(a: &Value, b: &Value) -> ScriptError {
    let culprit = if a.as_number().is_none() { a } else { b };
    ScriptError::runtime(format!(
        "attempt to perform arithmetic on a {} value",
        culprit.type_name()
    ))
}

fn compare_error(a: &Value, b: &Value) -> ScriptError {
    let (ta, tb) = (a.type_name(), b.type_name());
    if ta == tb {
        ScriptError::runtime(format!("attempt to compare two {} values", ta))
    } else {
        ScriptError::runtime(format!("attempt to compare {} with {}", ta, tb))
    }
}

impl Processor {
    fn call_meta(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        handler: &Value,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        Ok(self.call(shared, token, handler, args)?.scalar())
    }

    /// Evaluate a binary operator
    pub(crate) fn binary(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        op: BinaryOp,
        a: Value,
        b: Value,
    ) -> Result<Value, ScriptError> {
        match op {
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Mod
            | BinaryOp::Pow => self.arith(shared, token, op, a, b),
            BinaryOp::Concat => self.concat(shared, token, a, b),
            BinaryOp::Eq => Ok(Value::Boolean(self.equals(shared, token, a, b)?)),
            BinaryOp::Ne => Ok(Value::Boolean(!self.equals(shared, token, a, b)?)),
            BinaryOp::Lt => Ok(Value::Boolean(self.less_than(shared, token, a, b)?)),
            BinaryOp::Le => Ok(Value::Boolean(self.less_equal(shared, token, a, b)?)),
            BinaryOp::Gt => Ok(Value::Boolean(self.less_than(shared, token, b, a)?)),
            BinaryOp::Ge => Ok(Value::Boolean(self.less_equal(shared, token, b, a)?)),
        }
    }

    fn arith(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        op: BinaryOp,
        a: Value,
        b: Value,
    ) -> Result<Value, ScriptError> {
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return Ok(Value::Number(arith_numbers(op, x, y)));
        }
        let event = arith_event(op);
        match metamethod(&a, event).or_else(|| metamethod(&b, event)) {
            Some(handler) => self.call_meta(shared, token, &handler, vec![a, b]),
            None => Err(arith_error(&a, &b)),
        }
    }

    fn concat(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        a: Value,
        b: Value,
    ) -> Result<Value, ScriptError> {
        if let (Some(x), Some(y)) = (a.to_concat_string(), b.to_concat_string()) {
            return Ok(Value::from(x + &y));
        }
        match metamethod(&a, "__concat").or_else(|| metamethod(&b, "__concat")) {
            Some(handler) => self.call_meta(shared, token, &handler, vec![a, b]),
            None => {
                let culprit = if a.to_concat_string().is_none() { &a } else { &b };
                Err(ScriptError::runtime(format!(
                    "attempt to concatenate a {} value",
                    culprit.type_name()
                )))
            }
        }
    }

    /// `==` with the `__eq` fallback for distinct tables
    pub(crate) fn equals(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        a: Value,
        b: Value,
    ) -> Result<bool, ScriptError> {
        if a.raw_equals(&b) {
            return Ok(true);
        }
        if !(matches!(a, Value::Table(_)) && matches!(b, Value::Table(_))) {
            return Ok(false);
        }
        match metamethod(&a, "__eq").or_else(|| metamethod(&b, "__eq")) {
            Some(handler) => Ok(self.call_meta(shared, token, &handler, vec![a, b])?.is_truthy()),
            None => Ok(false),
        }
    }

    fn less_than(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        a: Value,
        b: Value,
    ) -> Result<bool, ScriptError> {
        match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => Ok(x < y),
            (Value::String(x), Value::String(y)) => Ok(x < y),
            _ => match metamethod(&a, "__lt").or_else(|| metamethod(&b, "__lt")) {
                Some(handler) => Ok(self.call_meta(shared, token, &handler, vec![a, b])?.is_truthy()),
                None => Err(compare_error(&a, &b)),
            },
        }
    }

    fn less_equal(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        a: Value,
        b: Value,
    ) -> Result<bool, ScriptError> {
        match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => Ok(x <= y),
            (Value::String(x), Value::String(y)) => Ok(x <= y),
            _ => {
                if let Some(handler) = metamethod(&a, "__le").or_else(|| metamethod(&b, "__le")) {
                    return Ok(self.call_meta(shared, token, &handler, vec![a, b])?.is_truthy());
                }
                // a <= b is not (b < a)
                match metamethod(&a, "__lt").or_else(|| metamethod(&b, "__lt")) {
                    Some(handler) => {
                        Ok(!self.call_meta(shared, token, &handler, vec![b, a])?.is_truthy())
                    }
                    None => Err(compare_error(&a, &b)),
                }
            }
        }
    }

    /// Unary minus
    pub(crate) fn negate(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        a: Value,
    ) -> Result<Value, ScriptError> {
        if let Some(n) = a.as_number() {
            return Ok(Value::Number(-n));
        }
        match metamethod(&a, "__unm") {
            Some(handler) => self.call_meta(shared, token, &handler, vec![a.clone(), a]),
            None => Err(arith_error(&a, &a)),
        }
    }

    /// The `#` operator
    pub(crate) fn length(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        a: Value,
    ) -> Result<Value, ScriptError> {
        if let Some(handler) = metamethod(&a, "__len") {
            return self.call_meta(shared, token, &handler, vec![a]);
        }
        match &a {
            Value::String(s) => Ok(Value::from(s.len())),
            Value::Table(t) => Ok(Value::from(t.length())),
            other => Err(ScriptError::runtime(format!(
                "attempt to get length of a {} value",
                other.type_name()
            ))),
        }
    }

    /// `object[key]` honouring `__index` and userdata descriptors
    pub(crate) fn index(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        object: Value,
        key: Value,
    ) -> Result<Value, ScriptError> {
        let mut object = object.scalar();
        for _ in 0..MAX_META_CHAIN {
            match &object {
                Value::Table(table) => {
                    let value = table.get(&key);
                    if !value.is_nil() {
                        return Ok(value);
                    }
                    match metamethod(&object, "__index") {
                        None => return Ok(Value::Nil),
                        Some(handler) if handler.is_callable() => {
                            return self.call_meta(shared, token, &handler, vec![object, key]);
                        }
                        Some(next) => object = next,
                    }
                }
                Value::UserData(userdata) => {
                    return userdata.descriptor().index(userdata, &key)?.ok_or_else(|| {
                        ScriptError::runtime(format!(
                            "cannot access field {} of userdata<{}>",
                            key,
                            userdata.descriptor().type_name()
                        ))
                    });
                }
                other => {
                    return Err(ScriptError::runtime(format!(
                        "attempt to index a {} value",
                        other.type_name()
                    )))
                }
            }
        }
        Err(ScriptError::runtime("'__index' chain too long; possible loop"))
    }

    /// `object[key] = value` honouring `__newindex` and userdata descriptors
    pub(crate) fn set_index(
        &mut self,
        shared: &ScriptShared,
        token: &ExecutionControlToken,
        object: Value,
        key: Value,
        value: Value,
    ) -> Result<(), ScriptError> {
        let mut object = object.scalar();
        for _ in 0..MAX_META_CHAIN {
            match &object {
                Value::Table(table) => {
                    let handler = if table.get(&key).is_nil() {
                        metamethod(&object, "__newindex")
                    } else {
                        None
                    };
                    match handler {
                        None => return table.set(key, value),
                        Some(handler) if handler.is_callable() => {
                            self.call(shared, token, &handler, vec![object, key, value])?;
                            return Ok(());
                        }
                        Some(next) => object = next,
                    }
                }
                Value::UserData(userdata) => {
                    if userdata.descriptor().set_index(userdata, &key, value)? {
                        return Ok(());
                    }
                    return Err(ScriptError::runtime(format!(
                        "cannot assign field {} of userdata<{}>",
                        key,
                        userdata.descriptor().type_name()
                    )));
                }
                other => {
                    return Err(ScriptError::runtime(format!(
                        "attempt to index a {} value",
                        other.type_name()
                    )))
                }
            }
        }
        Err(ScriptError::runtime("'__newindex' chain too long; possible loop"))
    }
}
