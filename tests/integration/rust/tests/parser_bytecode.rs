//! Parser to bytecode integration tests
//!
//! Source is compiled into a shared code segment, listed, dumped and read
//! back into a second segment.

use bytecode_system::{dump_function, is_dump, undump_function, ByteCode, OpCode};
use parser::{check, compile, CompileOptions};

#[test]
fn test_compile_commits_block_with_header() {
    let code = ByteCode::new();
    let chunk = compile(&code, "return 1 + 2", &CompileOptions::new("sum", 0)).unwrap();

    assert!(!code.is_empty());
    assert!(chunk.block.contains(chunk.entry));
    assert!(chunk.has_env);
    assert!(matches!(
        code.instruction(chunk.entry).map(|i| i.opcode),
        Some(OpCode::Meta { .. })
    ));
}

#[test]
fn test_chunks_append_without_overlap() {
    let code = ByteCode::new();
    let first = compile(&code, "local a = 1", &CompileOptions::new("a", 0)).unwrap();
    let second = compile(&code, "local b = 2", &CompileOptions::new("b", 1)).unwrap();

    assert_eq!(first.block.end(), second.block.base());
    assert_eq!(code.len(), second.block.end());
    assert!(first.refs.iter().all(|r| r.source_idx == 0));
    assert!(second.refs.iter().all(|r| r.source_idx == 1));
}

#[test]
fn test_syntax_error_commits_nothing() {
    let code = ByteCode::new();
    compile(&code, "x = 1", &CompileOptions::new("ok", 0)).unwrap();
    let before = code.len();

    let err = compile(&code, "x = = 1", &CompileOptions::new("bad", 1)).unwrap_err();
    assert_eq!(err.chunk_name, "bad");
    assert_eq!(err.line, 1);
    assert!(!err.premature_end);
    assert_eq!(code.len(), before);
}

#[test]
fn test_premature_end_is_flagged() {
    let err = check("while true do", "repl").unwrap_err();
    assert!(err.premature_end);
    assert!(check("while true do end", "repl").is_ok());
}

#[test]
fn test_source_refs_carry_lines() {
    let code = ByteCode::new();
    let chunk = compile(
        &code,
        "local a = 1\nlocal b = 2\nreturn a + b",
        &CompileOptions::new("lines", 0),
    )
    .unwrap();

    let lines: Vec<usize> = chunk.refs.iter().map(|r| r.from_line).collect();
    assert!(lines.contains(&1));
    assert!(lines.contains(&3));
}

#[test]
fn test_listing_covers_segment() {
    let code = ByteCode::new();
    compile(&code, "print('hi')", &CompileOptions::new("list", 0)).unwrap();
    assert_eq!(code.listing().len(), code.len());
}

#[test]
fn test_dump_into_fresh_segment() {
    let code = ByteCode::new();
    let chunk = compile(
        &code,
        "local t = {} for i = 1, 3 do t[i] = i * i end return t[3]",
        &CompileOptions::new("squares", 0),
    )
    .unwrap();

    let bytes = dump_function(&code, chunk.entry, chunk.has_env, Vec::new()).unwrap();
    assert!(is_dump(&bytes));

    let target = ByteCode::new();
    compile(&target, "local pad = 0", &CompileOptions::new("pad", 0)).unwrap();
    let loaded = undump_function(&target, bytes.as_slice(), 7).unwrap();

    assert!(loaded.has_env);
    assert!(loaded.block.contains(loaded.entry));
    let length = match code.instruction(chunk.entry).map(|i| i.opcode) {
        Some(OpCode::Meta { length, .. }) => length,
        other => panic!("expected a function header, found {:?}", other),
    };
    assert_eq!(loaded.entry, loaded.block.base());
    assert_eq!(loaded.block.end() - loaded.block.base(), length);
    assert!(loaded.refs.iter().all(|r| r.source_idx == 7));
}

#[test]
fn test_undump_rejects_source_text() {
    let code = ByteCode::new();
    assert!(!is_dump(b"return 1"));
    assert!(undump_function(&code, &b"return 1"[..], 0).is_err());
    assert!(code.is_empty());
}
