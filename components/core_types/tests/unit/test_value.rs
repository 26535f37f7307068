//! Unit tests for Value

use core_types::{Callback, DataType, TableRef, Value};

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Nil.type_name(), "nil");
        assert_eq!(Value::from(1.5).type_name(), "number");
        assert_eq!(Value::from("s").type_name(), "string");
        assert_eq!(Value::Table(TableRef::new()).type_name(), "table");
        let cb = Callback::new("f", |_, _| Ok(Value::Nil));
        assert_eq!(Value::Callback(cb).type_name(), "function");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::from(false).is_truthy());
        assert!(Value::from(0).is_truthy());
        assert!(Value::from("").is_truthy());
    }

    #[test]
    fn test_string_number_coercion() {
        assert_eq!(Value::from("12").as_number(), Some(12.0));
        assert_eq!(Value::from(" 0x10 ").as_number(), Some(16.0));
        assert_eq!(Value::from("twelve").as_number(), None);
        assert_eq!(Value::from(3.0).as_integer(), Some(3));
        assert_eq!(Value::from(3.5).as_integer(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from(10).to_string(), "10");
        assert_eq!(Value::from(0.25).to_string(), "0.25");
        assert_eq!(Value::Nil.to_string(), "nil");
        assert!(Value::Table(TableRef::new()).to_string().starts_with("table: 0x"));
        let t = Value::tuple(vec![Value::from(1), Value::from("a")]);
        assert_eq!(t.to_string(), "1\ta");
    }

    #[test]
    fn test_into_values() {
        assert_eq!(Value::void().into_values().len(), 0);
        assert_eq!(Value::from(1).into_values().len(), 1);
        assert_eq!(Value::Tuple(vec![Value::Nil, Value::Nil].into()).data_type(), DataType::Tuple);
    }
}
