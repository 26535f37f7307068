//! Lua Loader/Compiler
//!
//! Provides the lexer, parser, AST, scope resolver and bytecode generator
//! for the Lua 5.2 dialect understood by the runtime.
//!
//! # Overview
//!
//! - [`Lexer`] - Tokenizes source code
//! - [`Parser`] - Recursive descent parser producing the AST
//! - [`ScopeStack`] - Resolves identifiers to locals, upvalues and globals
//! - [`BytecodeGenerator`] - Emits bytecode into a script's code segment
//!
//! # Example
//!
//! ```
//! use bytecode_system::ByteCode;
//! use parser::{compile, ChunkKind, CompileOptions};
//!
//! let code = ByteCode::new();
//! let options = CompileOptions::new("chunk_0", 0);
//! let compiled = compile(&code, "local x = 42 return x", &options).unwrap();
//! assert_eq!(compiled.entry, 0);
//! assert!(compiled.has_env);
//! assert!(!code.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod bytecode_gen;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod scope;

pub use ast::{Block, Expression, Statement};
pub use bytecode_gen::{BytecodeGenerator, ChunkKind, GeneratedChunk};
pub use lexer::{Keyword, Lexer, Punctuator, Token};
pub use parser::Parser;
pub use scope::{FunctionScope, ScopeStack};

use bytecode_system::{ByteCode, CodeBlock};
use core_types::{SourceRef, SyntaxError};

/// How a piece of source is compiled
#[derive(Debug, Clone)]
pub struct CompileOptions<'a> {
    /// Friendly name used in error messages and function headers
    pub chunk_name: &'a str,
    /// Index the source will be registered under
    pub source_idx: usize,
    /// Chunk or bare function body
    pub kind: ChunkKind,
    /// Whether globals go through an `_ENV` upvalue
    pub env_upvalue: bool,
}

impl<'a> CompileOptions<'a> {
    /// Options for an ordinary chunk with an `_ENV` upvalue
    pub fn new(chunk_name: &'a str, source_idx: usize) -> Self {
        Self {
            chunk_name,
            source_idx,
            kind: ChunkKind::Chunk,
            env_upvalue: true,
        }
    }

    /// Compile as a bare function body
    pub fn function_body(mut self) -> Self {
        self.kind = ChunkKind::FunctionBody;
        self
    }

    /// Resolve globals against the script's default environment
    pub fn without_env(mut self) -> Self {
        self.env_upvalue = false;
        self
    }
}

/// Result of a successful compilation
#[derive(Debug, Clone)]
pub struct CompiledChunk {
    /// The committed code block
    pub block: CodeBlock,
    /// Address of the chunk's header
    pub entry: usize,
    /// Source references emitted for the chunk
    pub refs: Vec<SourceRef>,
    /// Whether the chunk expects an `_ENV` upvalue
    pub has_env: bool,
}

/// Compile `source` and commit it to `code`.
///
/// Parsing happens before the segment is locked; nothing is committed when
/// either parsing or generation fails.
pub fn compile(
    code: &ByteCode,
    source: &str,
    options: &CompileOptions<'_>,
) -> Result<CompiledChunk, SyntaxError> {
    let ast = Parser::new(source, options.chunk_name).parse()?;
    let (block, generated) = code.append_with(|builder| {
        BytecodeGenerator::new(
            builder,
            options.chunk_name,
            options.source_idx,
            options.env_upvalue,
        )
        .generate(&ast, options.kind)
    })?;
    Ok(CompiledChunk {
        block,
        entry: generated.entry,
        refs: generated.refs,
        has_env: generated.has_env,
    })
}

/// Check `source` for syntax errors without generating code
pub fn check(source: &str, chunk_name: &str) -> Result<(), SyntaxError> {
    Parser::new(source, chunk_name).parse().map(|_| ())
}
