//! Full pipeline tests: source through compiler, processor and dump codec

use std::sync::Arc;

use core_types::{ScriptError, Value};
use interpreter::{Script, ScriptOptions};
use parking_lot::Mutex;

fn capture_print() -> (Script, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    let options = ScriptOptions::default().with_print(move |line| sink.lock().push(line.to_string()));
    (Script::with_options(options), lines)
}

#[test]
fn test_producer_consumer_coroutines() {
    let (script, lines) = capture_print();
    script
        .do_string(
            r#"
            local producer = coroutine.create(function(n)
                for i = 1, n do coroutine.yield(i * 10) end
                return "done"
            end)
            local ok, v = coroutine.resume(producer, 3)
            while coroutine.status(producer) ~= "dead" do
                print(v)
                ok, v = coroutine.resume(producer)
            end
            print(v)
            "#,
        )
        .unwrap();
    assert_eq!(lines.lock().as_slice(), ["10", "20", "30", "done"]);
}

#[test]
fn test_metatable_driven_objects() {
    let script = Script::new();
    let result = script
        .do_string(
            r#"
            local Vector = {}
            Vector.__index = Vector
            Vector.__add = function(a, b) return Vector.new(a.x + b.x, a.y + b.y) end
            Vector.__tostring = function(v) return "(" .. v.x .. "," .. v.y .. ")" end
            function Vector.new(x, y) return setmetatable({ x = x, y = y }, Vector) end
            function Vector:length2() return self.x * self.x + self.y * self.y end

            local v = Vector.new(1, 2) + Vector.new(2, 2)
            return tostring(v), v:length2()
            "#,
        )
        .unwrap();
    assert_eq!(result.nth(0).as_str(), Some("(3,4)"));
    assert_eq!(result.nth(1).as_number(), Some(25.0));
}

#[test]
fn test_dump_moves_function_between_scripts() {
    let source = Script::new();
    let function = source
        .load_string("local a, b = ... return a * b + bias", None, Some("scaled"))
        .unwrap();
    let bytes = source.dump(&function, Vec::new()).unwrap();

    let target = Script::new();
    target.globals().set_str("bias", Value::from(2));
    let loaded = target.load_stream(bytes.as_slice(), None, Some("undumped")).unwrap();
    let result = target
        .call(&loaded, vec![Value::from(4), Value::from(5)])
        .unwrap();
    assert_eq!(result.as_number(), Some(22.0));
}

#[test]
fn test_base64_dump_through_load() {
    let source = Script::new();
    let function = source.load_string("return 'packed'", None, None).unwrap();
    let text = source.dump_base64(&function).unwrap();

    let target = Script::new();
    target.globals().set_str("blob", Value::from(text.as_str()));
    let result = target.do_string("return load(blob)()").unwrap();
    assert_eq!(result.as_str(), Some("packed"));
}

#[test]
fn test_error_crosses_pcall_and_host() {
    let script = Script::new();
    let result = script
        .do_string(
            r#"
            local ok, err = pcall(function() error({ code = 42 }) end)
            return ok, err.code
            "#,
        )
        .unwrap();
    assert!(matches!(result.nth(0), Value::Boolean(false)));
    assert_eq!(result.nth(1).as_number(), Some(42.0));

    let err = script.do_string("error('to host', 0)").unwrap_err();
    match err {
        ScriptError::Runtime(e) => assert_eq!(e.value.as_str(), Some("to host")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_sources_are_registered_per_load() {
    let script = Script::new();
    let before = script.source_count();
    script.load_string("return 1", None, Some("one")).unwrap();
    script.load_string("return 2", None, Some("two")).unwrap();
    assert!(script.load_string("return (", None, Some("bad")).is_err());

    assert_eq!(script.source_count(), before + 2);
    let last = script.source_code(before + 1).unwrap();
    assert_eq!(last.name, "two");
}
