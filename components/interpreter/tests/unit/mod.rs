//! Unit tests for the interpreter: language semantics and builtins

use std::sync::Arc;

use core_types::{ScriptError, Value};
use interpreter::{Script, ScriptOptions};
use parking_lot::Mutex;

fn eval(code: &str) -> Value {
    Script::new().do_string(code).unwrap()
}

fn eval_err(code: &str) -> String {
    Script::new().do_string(code).unwrap_err().to_string()
}

fn number(code: &str) -> f64 {
    eval(code).as_number().unwrap()
}

// ============================================================================
// Expressions and control flow
// ============================================================================

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(number("return 1 + 2 * 3"), 7.0);
    assert_eq!(number("return (1 + 2) * 3"), 9.0);
    assert_eq!(number("return 2 ^ 3 ^ 2"), 512.0);
    assert_eq!(number("return -7 % 3"), 2.0);
}

#[test]
fn test_string_coercion() {
    assert_eq!(number("return '10' + 5"), 15.0);
    assert_eq!(eval("return 1 .. 2").as_str(), Some("12"));
}

#[test]
fn test_numeric_for() {
    assert_eq!(number("local s = 0 for i = 1, 10 do s = s + i end return s"), 55.0);
    assert_eq!(number("local s = 0 for i = 10, 1, -2 do s = s + i end return s"), 30.0);
}

#[test]
fn test_generic_for_over_table() {
    let code = "
        local t = { 10, 20, 30 }
        local s = 0
        for i, v in ipairs(t) do s = s + i * v end
        return s";
    assert_eq!(number(code), 140.0);
}

#[test]
fn test_while_repeat_break() {
    let code = "
        local n = 0
        while true do
            n = n + 1
            if n == 5 then break end
        end
        repeat n = n + 1 until n >= 8
        return n";
    assert_eq!(number(code), 8.0);
}

#[test]
fn test_closures_capture_per_iteration() {
    let code = "
        local fns = {}
        for i = 1, 3 do fns[i] = function() return i end end
        return fns[1]() + fns[2]() * 10 + fns[3]() * 100";
    assert_eq!(number(code), 321.0);
}

#[test]
fn test_shared_upvalue() {
    let code = "
        local function counter()
            local n = 0
            return function() n = n + 1 return n end
        end
        local c = counter()
        c() c()
        return c()";
    assert_eq!(number(code), 3.0);
}

#[test]
fn test_varargs_and_select() {
    let code = "
        local function f(...) return select('#', ...), select(2, ...) end
        return f(4, 5, 6)";
    let values = eval(code).into_values();
    assert_eq!(values.len(), 3);
    assert_eq!(values[0].as_number(), Some(3.0));
    assert_eq!(values[1].as_number(), Some(5.0));
}

#[test]
fn test_multiple_assignment_swaps() {
    assert_eq!(number("local a, b = 1, 2 a, b = b, a return a * 10 + b"), 21.0);
}

#[test]
fn test_recursion() {
    let code = "
        local function fib(n) if n < 2 then return n end return fib(n - 1) + fib(n - 2) end
        return fib(15)";
    assert_eq!(number(code), 610.0);
}

#[test]
fn test_method_call_syntax() {
    let code = "
        local obj = { v = 4 }
        function obj:get(k) return self.v * k end
        return obj:get(3)";
    assert_eq!(number(code), 12.0);
}

// ============================================================================
// Metatables
// ============================================================================

#[test]
fn test_index_table_fallback() {
    let code = "
        local base = { greet = 'hi' }
        local t = setmetatable({}, { __index = base })
        return t.greet";
    assert_eq!(eval(code).as_str(), Some("hi"));
}

#[test]
fn test_index_function_and_newindex() {
    let code = "
        local log = {}
        local t = setmetatable({}, {
            __index = function(_, k) return k .. '!' end,
            __newindex = function(_, k, v) rawset(log, k, v) end,
        })
        t.a = 1
        return t.x, rawget(t, 'a'), log.a";
    let values = eval(code).into_values();
    assert_eq!(values[0].as_str(), Some("x!"));
    assert!(values[1].is_nil());
    assert_eq!(values[2].as_number(), Some(1.0));
}

#[test]
fn test_call_metamethod() {
    let code = "
        local callable = setmetatable({}, { __call = function(self, a) return a * 2 end })
        return callable(21)";
    assert_eq!(number(code), 42.0);
}

#[test]
fn test_arith_and_tostring_metamethods() {
    let code = "
        local mt = {}
        mt.__add = function(a, b) return setmetatable({ v = a.v + b.v }, mt) end
        mt.__tostring = function(a) return 'V(' .. a.v .. ')' end
        local x = setmetatable({ v = 1 }, mt)
        local y = setmetatable({ v = 2 }, mt)
        return tostring(x + y)";
    assert_eq!(eval(code).as_str(), Some("V(3)"));
}

#[test]
fn test_protected_metatable() {
    let message = eval_err(
        "local t = setmetatable({}, { __metatable = 'locked' })
         assert(getmetatable(t) == 'locked')
         setmetatable(t, {})",
    );
    assert!(message.contains("cannot change a protected metatable"), "{}", message);
}

// ============================================================================
// Builtins
// ============================================================================

#[test]
fn test_type_and_tonumber() {
    let values = eval("return type(nil), type(print), tonumber('ff', 16), tonumber('z')").into_values();
    assert_eq!(values[0].as_str(), Some("nil"));
    assert_eq!(values[1].as_str(), Some("function"));
    assert_eq!(values[2].as_number(), Some(255.0));
    assert!(values[3].is_nil());
}

#[test]
fn test_pairs_visits_every_entry() {
    let code = "
        local t = { a = 1, b = 2, 3 }
        local n, s = 0, 0
        for k, v in pairs(t) do n = n + 1 s = s + v end
        return n, s";
    let values = eval(code).into_values();
    assert_eq!(values[0].as_number(), Some(3.0));
    assert_eq!(values[1].as_number(), Some(6.0));
}

#[test]
fn test_unpack_and_rawlen() {
    let values = eval("local t = { 1, 2, 3 } return rawlen(t), unpack(t)").into_values();
    assert_eq!(values.len(), 4);
    assert_eq!(values[3].as_number(), Some(3.0));
}

#[test]
fn test_unpack_rejects_huge_ranges() {
    let message = eval_err("return select('#', unpack({}, 1, 1e10))");
    assert!(message.contains("too many results to unpack"), "{}", message);

    let message = eval_err("return unpack({}, -9007199254740991, 9007199254740991)");
    assert!(message.contains("too many results to unpack"), "{}", message);

    let values = eval("return select('#', unpack({}, 5, 1))").into_values();
    assert_eq!(values[0].as_number(), Some(0.0));
}

#[test]
fn test_print_goes_to_sink() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    let options = ScriptOptions::default().with_print(move |s| sink.lock().push(s.to_string()));
    let script = Script::with_options(options);
    script.do_string("print('a', 1, nil, true)").unwrap();
    assert_eq!(lines.lock().as_slice(), ["a\t1\tnil\ttrue"]);
}

#[test]
fn test_version_global() {
    assert_eq!(eval("return _VERSION").as_str(), Some(interpreter::VERSION));
    assert!(eval("return _G == _G._G").is_truthy());
}

#[test]
fn test_load_compiles_chunk() {
    let code = "
        local f = load('return 1 + ...')
        local bad, msg = load('return +')
        return f(41), bad, type(msg)";
    let values = eval(code).into_values();
    assert_eq!(values[0].as_number(), Some(42.0));
    assert!(values[1].is_nil());
    assert_eq!(values[2].as_str(), Some("string"));
}

#[test]
fn test_load_with_env() {
    let code = "
        local env = { x = 5 }
        local f = load('return x', 'chunk', 't', env)
        return f()";
    assert_eq!(number(code), 5.0);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_pcall_catches_error_value() {
    let code = "
        local ok, err = pcall(function() error({ code = 7 }) end)
        return ok, err.code";
    let values = eval(code).into_values();
    assert!(!values[0].is_truthy());
    assert_eq!(values[1].as_number(), Some(7.0));
}

#[test]
fn test_pcall_success_passes_results() {
    let values = eval("return pcall(function(a, b) return a + b, 'x' end, 1, 2)").into_values();
    assert!(values[0].is_truthy());
    assert_eq!(values[1].as_number(), Some(3.0));
    assert_eq!(values[2].as_str(), Some("x"));
}

#[test]
fn test_error_message_carries_location() {
    let script = Script::new();
    let f = script.load_string("\n\nerror('boom')", None, Some("trigger")).unwrap();
    let message = script.call(&f, vec![]).unwrap_err().to_string();
    assert!(message.starts_with("trigger:(Line 3,"), "{}", message);
    assert!(message.ends_with("boom"), "{}", message);
}

#[test]
fn test_error_level_zero_is_undecorated() {
    let message = eval_err("error('plain', 0)");
    assert_eq!(message, "plain");
}

#[test]
fn test_classic_error_locations() {
    let mut options = ScriptOptions::default();
    options.use_classic_error_locations = true;
    let script = Script::with_options(options);
    let f = script.load_string("local t\nreturn t.x", None, Some("x")).unwrap();
    let message = script.call(&f, vec![]).unwrap_err().to_string();
    assert_eq!(message, "x:2: attempt to index a nil value");
}

#[test]
fn test_runtime_error_messages() {
    assert!(eval_err("return {} + 1").contains("attempt to perform arithmetic on a table value"));
    assert!(eval_err("return {} < {}").contains("attempt to compare two table values"));
    assert!(eval_err("local f = 3 f()").contains("attempt to call a number value"));
    assert!(eval_err("return 'a' .. {}").contains("attempt to concatenate a table value"));
}

#[test]
fn test_env_not_a_table() {
    let message = eval_err("local _ENV = 5 return x");
    assert!(message.contains("_ENV is not a table but a number"), "{}", message);
}

#[test]
fn test_syntax_error_registers_no_source() {
    let script = Script::new();
    let err = script.load_string("local = 1", None, Some("broken")).unwrap_err();
    assert!(matches!(err, ScriptError::Syntax(_)));
    assert!(err.to_string().starts_with("broken:("));
    assert_eq!(script.source_count(), 0);
}

#[test]
fn test_stack_overflow_is_an_error() {
    let message = eval_err("local function f() return 1 + f() end return f()");
    assert!(message.contains("stack overflow"), "{}", message);
}

// ============================================================================
// Coroutines
// ============================================================================

#[test]
fn test_coroutine_state_transitions() {
    let code = "
        local states = {}
        local co
        co = coroutine.create(function(a)
            states[#states + 1] = coroutine.status(co)
            local b = coroutine.yield(a + 1)
            return b * 2
        end)
        states[#states + 1] = coroutine.status(co)
        local ok1, v1 = coroutine.resume(co, 1)
        states[#states + 1] = coroutine.status(co)
        local ok2, v2 = coroutine.resume(co, 10)
        states[#states + 1] = coroutine.status(co)
        local ok3, msg = coroutine.resume(co)
        return states[1] .. ',' .. states[2] .. ',' .. states[3] .. ',' .. states[4],
            v1, v2, ok3, msg";
    let values = eval(code).into_values();
    assert_eq!(
        values[0].as_str(),
        Some("suspended,running,suspended,dead")
    );
    assert_eq!(values[1].as_number(), Some(2.0));
    assert_eq!(values[2].as_number(), Some(20.0));
    assert!(!values[3].is_truthy());
    assert_eq!(values[4].as_str(), Some("cannot resume dead coroutine"));
}

#[test]
fn test_coroutine_wrap_generator() {
    let code = "
        local gen = coroutine.wrap(function()
            for i = 1, 3 do coroutine.yield(i) end
        end)
        return gen() + gen() * 10 + gen() * 100";
    assert_eq!(number(code), 321.0);
}

#[test]
fn test_coroutine_error_marks_dead() {
    let code = "
        local co = coroutine.create(function() error('inside', 0) end)
        local ok, msg = coroutine.resume(co)
        return ok, msg, coroutine.status(co)";
    let values = eval(code).into_values();
    assert!(!values[0].is_truthy());
    assert_eq!(values[1].as_str(), Some("inside"));
    assert_eq!(values[2].as_str(), Some("dead"));
}

#[test]
fn test_yield_outside_coroutine() {
    let message = eval_err("coroutine.yield(1)");
    assert!(message.contains("attempt to yield from outside a coroutine"), "{}", message);
}

#[test]
fn test_yield_across_pcall_is_rejected() {
    let code = "
        local co = coroutine.create(function()
            return pcall(coroutine.yield, 1)
        end)
        local ok, inner_ok, msg = coroutine.resume(co)
        return ok, inner_ok, msg";
    let values = eval(code).into_values();
    assert!(values[0].is_truthy());
    assert!(!values[1].is_truthy());
    assert!(values[2].as_str().is_some_and(|m| m.contains("host-call boundary")));
}

#[test]
fn test_running_and_isyieldable() {
    let values = eval(
        "local co, main = coroutine.running()
         local inner = coroutine.wrap(function() return coroutine.isyieldable() end)
         return main, coroutine.isyieldable(), inner()",
    )
    .into_values();
    assert!(values[0].is_truthy());
    assert!(!values[1].is_truthy());
    assert!(values[2].is_truthy());
}
