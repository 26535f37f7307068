//! Core builtins installed into every script's global table
//!
//! This is the small set of functions the runtime itself relies on (iteration,
//! error handling, metatables, coroutines, loading), not a standard library.

mod base;
mod coroutine_lib;

use core_types::{Callback, ExecutionContext, ScriptError, TableRef, Value};

pub(crate) use base::next_callback;

/// Version string published as `_VERSION`
pub const VERSION: &str = "Lantern Lua 5.2";

/// Install the builtins into `globals`
pub(crate) fn register(globals: &TableRef) {
    base::register(globals);
    globals.set_str("coroutine", Value::Table(coroutine_lib::table()));
    globals.set_str("_G", Value::Table(globals.clone()));
    globals.set_str("_VERSION", Value::from(VERSION));
}

fn set_function<F>(table: &TableRef, name: &str, f: F)
where
    F: Fn(&mut dyn ExecutionContext, core_types::CallArgs) -> Result<Value, ScriptError>
        + Send
        + Sync
        + 'static,
{
    table.set_str(name, Value::Callback(Callback::new(name, f)));
}

/// `tostring` semantics, including `__tostring`
pub(crate) fn to_display_string(
    ctx: &mut dyn ExecutionContext,
    value: &Value,
) -> Result<String, ScriptError> {
    if let Some(handler) = crate::ops::metamethod(value, "__tostring") {
        let text = ctx.call(&handler, vec![value.clone()])?.scalar();
        return match text {
            Value::String(s) => Ok(s.to_string()),
            Value::Number(_) => Ok(text.to_string()),
            _ => Err(ScriptError::runtime("'__tostring' must return a string")),
        };
    }
    Ok(value.clone().scalar().to_string())
}

/// Results of a protected call: `true` followed by the values, or `false`
/// and the error object for errors a script may catch
pub(crate) fn protected_result(result: Result<Value, ScriptError>) -> Result<Value, ScriptError> {
    match result {
        Ok(value) => {
            let mut values = vec![Value::Boolean(true)];
            values.extend(value.into_values());
            Ok(Value::tuple(values))
        }
        Err(ScriptError::Runtime(err)) => Ok(Value::tuple(vec![Value::Boolean(false), err.value])),
        Err(err) => Err(err),
    }
}
