//! Contract compliance tests for core_types
//!
//! These tests pin the public surface the compiler, the VM and the host rely
//! on.

use core_types::{
    CallArgs, Closure, CoroutineRef, CoroutineState, ScriptError, ScriptId, TableRef,
    UpvaluesType, Value, ValueCell, ENV_NAME,
};
use std::sync::Arc;

#[cfg(test)]
mod value_contract_tests {
    use super::*;

    /// Contract: Value has one variant per guest type plus Tuple
    #[test]
    fn test_value_variants() {
        let _ = Value::Nil;
        let _ = Value::Boolean(true);
        let _ = Value::Number(1.0);
        let _ = Value::from("s");
        let _ = Value::Table(TableRef::new());
        let _ = Value::Tuple(Arc::from(Vec::new()));
    }

    /// Contract: values are shareable across threads
    #[test]
    fn test_value_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Value>();
        assert_send_sync::<TableRef>();
        assert_send_sync::<ScriptError>();
    }

    /// Contract: tables compare by identity
    #[test]
    fn test_table_identity() {
        let t = TableRef::new();
        assert!(Value::Table(t.clone()).raw_equals(&Value::Table(t)));
    }
}

#[cfg(test)]
mod closure_contract_tests {
    use super::*;

    /// Contract: a chunk closure captures exactly the environment
    #[test]
    fn test_chunk_closure_shape() {
        let env = ValueCell::new(Value::Table(TableRef::new()));
        let closure = Closure::new(ScriptId::next(), 5, vec![(Arc::from(ENV_NAME), env)]);
        assert_eq!(closure.entry(), 5);
        assert_eq!(closure.upvalues_type(), UpvaluesType::Environment);
    }

    /// Contract: coroutine state machine is monotonic except Running/Suspended
    #[test]
    fn test_coroutine_dead_is_terminal() {
        let co = CoroutineRef::new(ScriptId::next(), CoroutineState::NotStarted, None);
        assert!(co.transition(CoroutineState::Suspended).is_err());
        co.transition(CoroutineState::Running).unwrap();
        co.transition(CoroutineState::Dead).unwrap();
        assert!(co.transition(CoroutineState::Running).is_err());
    }

    /// Contract: CallArgs reads missing arguments as nil
    #[test]
    fn test_call_args_padding() {
        let args = CallArgs::new(vec![]);
        assert!(args.get(0).is_nil());
        assert!(args.check_table(0, "f").is_err());
    }
}
