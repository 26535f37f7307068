//! Tests for dumping and undumping hand-built functions

use std::sync::Arc;

use bytecode_system::{
    dump_function, is_dump, undump_function, BinaryOp, ByteCode, MetaKind, OpCode, SymbolRef,
    DUMP_VERSION,
};
use core_types::{DumpError, SourceRef, Value, ENV_NAME};

/// `return x + 1` where `x` is a global, wrapped in a chunk header.
fn build_chunk(code: &ByteCode) -> usize {
    let (block, ()) = code
        .append_with(|b| -> Result<(), ()> {
            let meta = b.emit(OpCode::Meta {
                name: Arc::from("chunk_0"),
                kind: MetaKind::Chunk,
                length: 0,
            });
            b.emit(OpCode::BeginFn {
                locals: Arc::from(Vec::new()),
            });
            b.emit(OpCode::Args {
                params: 0,
                varargs: true,
            });
            b.set_source_ref(Some(SourceRef::new(0, 1, 1, 1, 12)));
            b.emit(OpCode::Load(SymbolRef::global(
                "x",
                SymbolRef::upvalue(ENV_NAME, 0),
            )));
            b.emit(OpCode::Literal(Value::from(1)));
            b.emit(OpCode::Binary(BinaryOp::Add));
            let jump = b.emit(OpCode::Jump(0));
            let target = b.emit(OpCode::Ret { values: 1 });
            b.patch_jump(jump, target);
            b.close_meta(meta);
            Ok(())
        })
        .unwrap();
    block.base()
}

#[test]
fn test_dump_starts_with_signature() {
    let code = ByteCode::new();
    let entry = build_chunk(&code);
    let bytes = dump_function(&code, entry, true, Vec::new()).unwrap();
    assert!(is_dump(&bytes));
    assert_eq!(bytes[4], DUMP_VERSION);
}

#[test]
fn test_undump_relocates_jumps() {
    let source = ByteCode::new();
    let entry = build_chunk(&source);
    let bytes = dump_function(&source, entry, true, Vec::new()).unwrap();

    let target = ByteCode::new();
    // Occupy some addresses so the undumped block lands at a new base.
    build_chunk(&target);
    let undumped = undump_function(&target, bytes.as_slice(), 3).unwrap();

    assert_eq!(undumped.entry, 8);
    assert!(undumped.has_env);
    assert_eq!(&*undumped.name, "chunk_0");
    let jump = target.instruction(undumped.entry + 6).unwrap();
    assert_eq!(jump.opcode.jump_target(), Some(undumped.entry + 7));
    assert!(undumped.refs.iter().all(|r| r.source_idx == 3));
}

#[test]
fn test_version_mismatch_is_rejected() {
    let code = ByteCode::new();
    let entry = build_chunk(&code);
    let mut bytes = dump_function(&code, entry, true, Vec::new()).unwrap();
    bytes[4] = DUMP_VERSION + 1;

    let err = undump_function(&ByteCode::new(), bytes.as_slice(), 0).unwrap_err();
    assert_eq!(
        err,
        DumpError::VersionMismatch {
            found: DUMP_VERSION + 1,
            expected: DUMP_VERSION
        }
    );
}

#[test]
fn test_bad_header_is_rejected() {
    let err = undump_function(&ByteCode::new(), &b"return 1"[..], 0).unwrap_err();
    assert_eq!(err, DumpError::BadHeader);
}

#[test]
fn test_truncated_dump_commits_nothing() {
    let code = ByteCode::new();
    let entry = build_chunk(&code);
    let bytes = dump_function(&code, entry, true, Vec::new()).unwrap();

    let target = ByteCode::new();
    let result = undump_function(&target, &bytes[..bytes.len() - 3], 0);
    assert!(result.is_err());
    assert!(target.is_empty());
}

#[test]
fn test_dump_requires_function_header() {
    let code = ByteCode::new();
    code.append_with(|b| -> Result<(), ()> {
        b.emit(OpCode::Nop);
        Ok(())
    })
    .unwrap();
    assert!(matches!(
        dump_function(&code, 0, false, Vec::new()),
        Err(DumpError::Malformed(_))
    ));
}

/// Header followed by `has_env = 0`; the caller appends the body.
fn header() -> Vec<u8> {
    vec![0x1B, b'L', b'N', b'T', DUMP_VERSION, 0]
}

fn int32(bytes: &mut Vec<u8>, value: i32) {
    bytes.push(0x7E);
    bytes.extend_from_slice(&value.to_le_bytes());
}

#[test]
fn test_oversized_instruction_count_is_an_error() {
    let mut bytes = header();
    int32(&mut bytes, i32::MAX);

    let target = ByteCode::new();
    let err = undump_function(&target, &bytes[..], 0).unwrap_err();
    assert_eq!(err, DumpError::UnexpectedEof);
    assert!(target.is_empty());
}

#[test]
fn test_oversized_string_length_is_an_error() {
    let mut bytes = header();
    bytes.push(1); // one instruction
    bytes.push(1); // Meta
    bytes.push(0); // string index 0, first occurrence
    int32(&mut bytes, i32::MAX);
    bytes.extend_from_slice(b"chunk");

    let err = undump_function(&ByteCode::new(), &bytes[..], 0).unwrap_err();
    assert_eq!(err, DumpError::UnexpectedEof);
}

#[test]
fn test_oversized_local_count_is_an_error() {
    let mut bytes = header();
    bytes.push(2); // two instructions
    bytes.push(2); // BeginFn
    int32(&mut bytes, i32::MAX);

    let err = undump_function(&ByteCode::new(), &bytes[..], 0).unwrap_err();
    assert_eq!(err, DumpError::UnexpectedEof);
}
