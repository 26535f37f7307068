//! Unit tests for tables

use core_types::{Table, TableRef, Value};

#[cfg(test)]
mod table_tests {
    use super::*;

    #[test]
    fn test_traversal_order_is_insertion_order() {
        let mut t = Table::new();
        t.set_str("z", Value::from(1));
        t.set_str("a", Value::from(2));
        t.set_str("m", Value::from(3));

        let keys: Vec<String> = t
            .pairs()
            .into_iter()
            .map(|(k, _)| k.to_string())
            .collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_next_walks_every_entry() {
        let t = TableRef::from_sequence(vec![Value::from("a"), Value::from("b")]);
        let table = t.read();
        let mut key = Value::Nil;
        let mut seen = 0;
        while let Some((k, _)) = table.next(&key).unwrap() {
            key = k;
            seen += 1;
        }
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_next_with_unknown_key_fails() {
        let t = Table::new();
        assert!(t.next(&Value::from("missing")).is_err());
    }

    #[test]
    fn test_metatable_roundtrip() {
        let t = TableRef::new();
        let mt = TableRef::new();
        t.write().set_metatable(Some(mt.clone()));
        assert!(t.metatable().unwrap().ptr_eq(&mt));
    }

    #[test]
    fn test_append() {
        let mut t = Table::new();
        t.append(Value::from("x"));
        t.append(Value::from("y"));
        assert_eq!(t.length(), 2);
        assert_eq!(t.get(&Value::from(2)).as_str(), Some("y"));
    }
}
