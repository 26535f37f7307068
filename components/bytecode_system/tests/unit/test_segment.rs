//! Tests for the code segment and the chunk builder

use bytecode_system::{ByteCode, OpCode};
use std::sync::Arc;
use std::thread;

#[test]
fn test_concurrent_appends_never_overlap() {
    let code = Arc::new(ByteCode::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let code = Arc::clone(&code);
            thread::spawn(move || {
                for _ in 0..25 {
                    code.append_with(|b| -> Result<(), ()> {
                        b.emit(OpCode::Nop);
                        b.emit(OpCode::Ret { values: 0 });
                        Ok(())
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(code.len(), 200);
    for addr in (0..200).step_by(2) {
        assert!(matches!(code.instruction(addr).unwrap().opcode, OpCode::Nop));
        assert!(matches!(
            code.instruction(addr + 1).unwrap().opcode,
            OpCode::Ret { .. }
        ));
    }
}

#[test]
fn test_listing_has_addresses() {
    let code = ByteCode::new();
    code.append_with(|b| -> Result<(), ()> {
        b.emit(OpCode::Pop(2));
        Ok(())
    })
    .unwrap();
    assert_eq!(code.listing(), vec!["00000000  POP        2".to_string()]);
}

#[test]
fn test_empty_build_commits_no_block() {
    let code = ByteCode::new();
    let (block, ()) = code.append_with(|_| -> Result<(), ()> { Ok(()) }).unwrap();
    assert_eq!(block.base(), 0);
    assert!(code.block_at(0).is_none());
}
