//! The `coroutine` table

use core_types::{
    CallArgs, Callback, CoroutineRef, CoroutineState, ExecutionContext, ScriptError, TableRef,
    Value,
};

use super::{protected_result, set_function};

pub(super) fn table() -> TableRef {
    let table = TableRef::new();
    set_function(&table, "create", create);
    set_function(&table, "resume", resume);
    table.set_str("yield", Value::Callback(Callback::yield_request()));
    set_function(&table, "status", status);
    set_function(&table, "running", running);
    set_function(&table, "wrap", wrap);
    set_function(&table, "isyieldable", isyieldable);
    table
}

fn check_coroutine(args: &CallArgs, func: &str) -> Result<CoroutineRef, ScriptError> {
    match args.get(0) {
        Value::Coroutine(coroutine) => Ok(coroutine),
        other => Err(ScriptError::runtime(format!(
            "bad argument #1 to '{}' (coroutine expected, got {})",
            func,
            other.type_name()
        ))),
    }
}

fn create(ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let function = args.check_any(0, "create")?;
    ctx.create_coroutine(function)
}

fn resume(ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let coroutine = check_coroutine(&args, "resume")?;
    let rest = args.skip(1).into_vec();
    protected_result(ctx.resume(&coroutine, rest))
}

fn status(ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let coroutine = check_coroutine(&args, "status")?;
    let status = match coroutine.state() {
        CoroutineState::Running | CoroutineState::Main => {
            if ctx.running_coroutine().ptr_eq(&coroutine) {
                "running"
            } else {
                "normal"
            }
        }
        CoroutineState::NotStarted | CoroutineState::Suspended => "suspended",
        CoroutineState::Dead => "dead",
    };
    Ok(Value::from(status))
}

fn running(ctx: &mut dyn ExecutionContext, _args: CallArgs) -> Result<Value, ScriptError> {
    let coroutine = ctx.running_coroutine();
    let is_main = coroutine.state() == CoroutineState::Main;
    Ok(Value::tuple(vec![
        Value::Coroutine(coroutine),
        Value::Boolean(is_main),
    ]))
}

fn wrap(ctx: &mut dyn ExecutionContext, args: CallArgs) -> Result<Value, ScriptError> {
    let function = args.check_any(0, "wrap")?;
    let Value::Coroutine(coroutine) = ctx.create_coroutine(function)? else {
        return Err(ScriptError::runtime("cannot wrap a non-coroutine value"));
    };
    Ok(Value::Callback(Callback::new("wrap", move |ctx, args| {
        ctx.resume(&coroutine, args.into_vec())
    })))
}

fn isyieldable(ctx: &mut dyn ExecutionContext, _args: CallArgs) -> Result<Value, ScriptError> {
    Ok(Value::Boolean(ctx.can_yield()))
}
