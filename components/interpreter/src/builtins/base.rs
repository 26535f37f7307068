//! Basic functions

use std::time::Duration;

use core_types::{
    str_to_number, CallArgs, Callback, ExecutionContext, RuntimeError, ScriptError, TableRef,
    Value,
};

use super::{protected_result, set_function, to_display_string};

pub(super) fn register(globals: &TableRef) {
    set_function(globals, "print", print);
    set_function(globals, "type", type_of);
    set_function(globals, "tostring", tostring);
    set_function(globals, "tonumber", tonumber);
    set_function(globals, "pairs", pairs);
    set_function(globals, "ipairs", ipairs);
    globals.set_str("next", Value::Callback(next_callback()));
    set_function(globals, "select", select);
    set_function(globals, "error", error);
    set_function(globals, "assert", assert);
    set_function(globals, "pcall", pcall);
    set_function(globals, "rawget", rawget);
    set_function(globals, "rawset", rawset);
    set_function(globals, "rawequal", rawequal);
    set_function(globals, "rawlen", rawlen);
    set_function(globals, "setmetatable", setmetatable);
    set_function(globals, "getmetatable", getmetatable);
    set_function(globals, "unpack", unpack);
    set_function(globals, "load", load);
    set_function(globals, "sleep", sleep);
}

/// The `next` primitive, also used by generic `for` over plain tables
pub(crate) fn next_callback() -> Callback {
    Callback::new("next", next)
}

fn print(ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let mut parts = Vec::with_capacity(args.len());
    for value in args.as_slice() {
        parts.push(to_display_string(ctx, value)?);
    }
    ctx.print(&parts.join("\t"));
    Ok(Value::void())
}

fn type_of(_ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let value = args.check_any(0, "type")?;
    Ok(Value::from(value.type_name()))
}

fn tostring(ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let value = args.check_any(0, "tostring")?;
    Ok(Value::from(to_display_string(ctx, &value)?))
}

fn tonumber(_ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let value = args.check_any(0, "tonumber")?;
    if args.get(1).is_nil() {
        return Ok(match value {
            Value::Number(_) => value,
            Value::String(s) => str_to_number(&s).map_or(Value::Nil, Value::Number),
            _ => Value::Nil,
        });
    }

    let base = args.check_integer(1, "tonumber")?;
    if !(2..=36).contains(&base) {
        return Err(ScriptError::runtime(
            "bad argument #2 to 'tonumber' (base out of range)",
        ));
    }
    let text = args.check_string(0, "tonumber")?;
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    // base is within 2..=36
    Ok(i64::from_str_radix(digits, base as u32)
        .map(|n| Value::Number(if negative { -(n as f64) } else { n as f64 }))
        .unwrap_or(Value::Nil))
}

fn next(_ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let table = args.check_table(0, "next")?;
    let entry = table.read().next(&args.get(1))?;
    Ok(match entry {
        Some((key, value)) => Value::tuple(vec![key, value]),
        None => Value::Nil,
    })
}

fn pairs(ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let value = args.check_any(0, "pairs")?;
    if let Some(handler) = crate::ops::metamethod(&value, "__pairs") {
        let result = ctx.call(&handler, vec![value])?;
        return Ok(Value::tuple(vec![result.nth(0), result.nth(1), result.nth(2)]));
    }
    let table = args.check_table(0, "pairs")?;
    Ok(Value::tuple(vec![
        Value::Callback(next_callback()),
        Value::Table(table),
        Value::Nil,
    ]))
}

fn ipairs_step(_ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let table = args.check_table(0, "ipairs")?;
    let index = args.check_integer(1, "ipairs")? + 1;
    let value = table.get(&Value::from(index));
    if value.is_nil() {
        return Ok(Value::Nil);
    }
    Ok(Value::tuple(vec![Value::from(index), value]))
}

fn ipairs(_ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let table = args.check_table(0, "ipairs")?;
    Ok(Value::tuple(vec![
        Value::Callback(Callback::new("ipairs_iterator", ipairs_step)),
        Value::Table(table),
        Value::from(0),
    ]))
}

fn select(_ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let selector = args.check_any(0, "select")?;
    let rest = args.skip(1).into_vec();
    if selector.as_str() == Some("#") {
        return Ok(Value::from(rest.len()));
    }

    let n = selector.as_integer().ok_or_else(|| {
        ScriptError::runtime(format!(
            "bad argument #1 to 'select' (number expected, got {})",
            selector.type_name()
        ))
    })?;
    let len = rest.len() as i64;
    let start = match n {
        n if n < 0 && -n <= len => len + n,
        n if n > 0 => (n - 1).min(len),
        _ => {
            return Err(ScriptError::runtime(
                "bad argument #1 to 'select' (index out of range)",
            ))
        }
    };
    Ok(Value::tuple(rest.into_iter().skip(start as usize).collect()))
}

fn error(ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let value = args.get(0);
    let level = args.opt_number(1, "error", 1.0)?;
    let mut err = RuntimeError::with_value(value);

    if level > 0.0 {
        if let (Value::String(_), Some(location)) = (&err.value, ctx.caller_location()) {
            err.decorate(None, &location);
        }
    }
    if !err.is_decorated() {
        // keep the processor from adding a location of its own
        err.decorated_message = Some(err.message.clone());
    }
    Err(err.into())
}

fn assert(_ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    if args.get(0).is_truthy() {
        return Ok(Value::tuple(args.into_vec()));
    }
    match args.get(1) {
        Value::Nil => Err(ScriptError::runtime("assertion failed!")),
        message => Err(RuntimeError::with_value(message).into()),
    }
}

fn pcall(ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let function = args.check_any(0, "pcall")?;
    let rest = args.skip(1).into_vec();
    protected_result(ctx.call(&function, rest))
}

fn rawget(_ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let table = args.check_table(0, "rawget")?;
    Ok(table.get(&args.get(1)))
}

fn rawset(_ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let table = args.check_table(0, "rawset")?;
    table.set(args.get(1), args.get(2))?;
    Ok(Value::Table(table))
}

fn rawequal(_ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let a = args.check_any(0, "rawequal")?;
    let b = args.check_any(1, "rawequal")?;
    Ok(Value::Boolean(a.raw_equals(&b)))
}

fn rawlen(_ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    match args.get(0) {
        Value::Table(table) => Ok(Value::from(table.length())),
        Value::String(s) => Ok(Value::from(s.len())),
        _ => Err(ScriptError::runtime(
            "table or string expected",
        )),
    }
}

fn setmetatable(_ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let table = args.check_table(0, "setmetatable")?;
    let metatable = match args.get(1) {
        Value::Nil => None,
        Value::Table(meta) => Some(meta),
        _ => {
            return Err(ScriptError::runtime(
                "bad argument #2 to 'setmetatable' (nil or table expected)",
            ))
        }
    };
    if let Some(current) = table.metatable() {
        if !current.get_str("__metatable").is_nil() {
            return Err(ScriptError::runtime("cannot change a protected metatable"));
        }
    }
    table.write().set_metatable(metatable);
    Ok(Value::Table(table))
}

fn getmetatable(_ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let Value::Table(table) = args.get(0) else {
        return Ok(Value::Nil);
    };
    Ok(match table.metatable() {
        None => Value::Nil,
        Some(meta) => {
            let protected = meta.get_str("__metatable");
            if protected.is_nil() {
                Value::Table(meta)
            } else {
                protected
            }
        }
    })
}

/// Most values one `unpack` call may produce.
const MAX_UNPACK_RESULTS: i64 = 1_000_000;

fn unpack(_ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let table = args.check_table(0, "unpack")?;
    let first = args.opt_number(1, "unpack", 1.0)? as i64;
    let last = match args.get(2) {
        Value::Nil => table.length() as i64,
        _ => args.check_integer(2, "unpack")?,
    };
    if first > last {
        return Ok(Value::tuple(Vec::new()));
    }
    let count = last
        .checked_sub(first)
        .and_then(|n| n.checked_add(1))
        .filter(|&n| n <= MAX_UNPACK_RESULTS)
        .ok_or_else(|| ScriptError::runtime("too many results to unpack"))?;
    let mut values = Vec::with_capacity(count as usize);
    for i in first..=last {
        values.push(table.get(&Value::from(i)));
    }
    Ok(Value::tuple(values))
}

fn load(ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let code = match args.get(0) {
        Value::String(s) => s.to_string(),
        reader if reader.is_callable() => {
            let mut code = String::new();
            loop {
                match ctx.call(&reader, Vec::new())?.scalar() {
                    Value::String(piece) if !piece.is_empty() => code.push_str(&piece),
                    Value::Nil | Value::String(_) => break,
                    _ => return Err(ScriptError::runtime("reader function must return a string")),
                }
            }
            code
        }
        other => {
            return Err(ScriptError::runtime(format!(
                "bad argument #1 to 'load' (string expected, got {})",
                other.type_name()
            )))
        }
    };
    let name = args.get(1).as_str().map(str::to_string);
    let env = match args.get(3) {
        Value::Table(env) => Some(env),
        _ => None,
    };

    match ctx.load(&code, name.as_deref(), env) {
        Ok(function) => Ok(function),
        Err(ScriptError::Syntax(err)) => Ok(Value::tuple(vec![
            Value::Nil,
            Value::from(err.to_string()),
        ])),
        Err(err) => Err(err),
    }
}

fn sleep(ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let millis = args.check_number(0, "sleep")?.max(0.0);
    ctx.sleep(Duration::from_millis(millis as u64))?;
    Ok(Value::void())
}
