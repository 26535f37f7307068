//! Contract tests for bytecode_system
//!
//! Pin the encoding rules other components and stored dumps depend on.

use bytecode_system::{BinDumpReader, BinDumpWriter, OpCode, SymbolRef, DUMP_MAGIC};

#[test]
fn test_magic_is_four_bytes_starting_with_escape() {
    assert_eq!(DUMP_MAGIC.len(), 4);
    assert_eq!(DUMP_MAGIC[0], 0x1B);
}

#[test]
fn test_varint_thresholds() {
    let cases: [(i32, usize); 6] = [
        (0, 1),
        (-128, 1),
        (0x7D, 1),
        (0x7E, 3),
        (-129, 3),
        (40_000, 5),
    ];
    for (value, expected_len) in cases {
        let mut w = BinDumpWriter::new(Vec::new());
        w.write_int(value).unwrap();
        let bytes = w.into_inner();
        assert_eq!(bytes.len(), expected_len, "value {}", value);
        let mut r = BinDumpReader::new(bytes.as_slice());
        assert_eq!(r.read_int().unwrap(), value);
    }
}

#[test]
fn test_first_occurrence_writes_index_then_literal() {
    let mut w = BinDumpWriter::new(Vec::new());
    w.write_str("a").unwrap();
    w.write_str("b").unwrap();
    w.write_str("a").unwrap();
    assert_eq!(w.into_inner(), vec![0, 1, b'a', 1, 1, b'b', 0]);
}

#[test]
fn test_global_symbol_names_environment() {
    let sym = SymbolRef::global("x", SymbolRef::DefaultEnv);
    match sym {
        SymbolRef::Global { env, .. } => assert_eq!(*env, SymbolRef::DefaultEnv),
        _ => panic!("expected global"),
    }
}

#[test]
fn test_jump_opcodes_expose_targets() {
    for op in [
        OpCode::Jump(4),
        OpCode::JumpIfFalse(4),
        OpCode::JfOrPop(4),
        OpCode::JtOrPop(4),
        OpCode::ForLoop { exit: 4 },
        OpCode::IterCheck { exit: 4 },
    ] {
        assert_eq!(op.jump_target(), Some(4));
    }
}
