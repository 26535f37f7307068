//! Bytecode system for the Lantern script runtime
//!
//! This crate provides the stack-machine instruction set, resolved symbol
//! references, the append-only code segment a script compiles into, and the
//! binary dump codec used to distribute precompiled functions.
//!
//! # Features
//!
//! - Stack-based instruction set with per-instruction source mapping
//! - Append-only, lock-protected code segment shared by every processor of
//!   a script
//! - Compact binary dumps: variable-width integers and a first-seen string
//!   table
//!
//! # Example
//!
//! ```
//! use bytecode_system::{ByteCode, OpCode};
//! use core_types::Value;
//!
//! let code = ByteCode::new();
//! let (block, ()) = code
//!     .append_with(|b| -> Result<(), ()> {
//!         b.emit(OpCode::Literal(Value::from(42)));
//!         b.emit(OpCode::Ret { values: 1 });
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! assert_eq!(block.base(), 0);
//! assert_eq!(code.len(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod dump;
pub mod instruction;
pub mod opcode;
pub mod segment;
pub mod symbol;

// Re-export main types at crate root
pub use chunk::ChunkBuilder;
pub use dump::{
    dump_function, is_dump, undump_function, BinDumpReader, BinDumpWriter, UndumpedFunction,
    DUMP_MAGIC, DUMP_VERSION,
};
pub use instruction::Instruction;
pub use opcode::{BinaryOp, MetaKind, OpCode};
pub use segment::{ByteCode, CodeBlock};
pub use symbol::SymbolRef;
