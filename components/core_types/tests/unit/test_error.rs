//! Unit tests for the error taxonomy

use core_types::{DumpError, RuntimeError, ScriptError, SourceRef, SyntaxError, Value};

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_premature_end_flag_survives_conversion() {
        let err: ScriptError = SyntaxError::new("repl", 2, 1, "'end' expected")
            .at_end_of_input()
            .into();
        assert!(err.is_premature_end());
        assert!(!err.is_catchable());
    }

    #[test]
    fn test_runtime_error_decoration_records_location() {
        let sref = SourceRef::new(0, 4, 2, 4, 9);
        let mut err = RuntimeError::new("attempt to call a nil value");
        err.decorate(Some(sref), &sref.format_location("test", false));

        assert_eq!(err.location, Some(sref));
        assert_eq!(err.to_string(), "test:(Line 4, Position 2-9): attempt to call a nil value");
    }

    #[test]
    fn test_table_error_value_is_kept() {
        let err = RuntimeError::with_value(Value::Table(core_types::TableRef::new()));
        assert!(matches!(err.value, Value::Table(_)));
        assert_eq!(err.message, "(error object is a table value)");
    }

    #[test]
    fn test_thread_access_violation_message() {
        let err = ScriptError::ThreadAccessViolation {
            owner: "ThreadId(2)".into(),
            current: "ThreadId(3)".into(),
        };
        assert!(err.to_string().contains("two different threads"));
    }

    #[test]
    fn test_dump_error_wraps() {
        let err: ScriptError = DumpError::StringMapFailure(9).into();
        assert_eq!(
            err.to_string(),
            "string map failure: index 9 is out of range"
        );
    }
}
