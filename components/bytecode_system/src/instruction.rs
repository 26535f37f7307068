//! Bytecode instruction representation
//!
//! Contains the instruction structure and its source mapping.

use std::fmt;

use core_types::SourceRef;

use crate::opcode::OpCode;

/// A single bytecode instruction with optional source mapping
#[derive(Debug, Clone)]
pub struct Instruction {
    /// The operation
    pub opcode: OpCode,
    /// Source span this instruction was compiled from
    pub source_ref: Option<SourceRef>,
}

impl Instruction {
    /// Create a new instruction without source mapping
    pub fn new(opcode: OpCode) -> Self {
        Self {
            opcode,
            source_ref: None,
        }
    }

    /// Create a new instruction mapped to a source span
    pub fn with_ref(opcode: OpCode, source_ref: Option<SourceRef>) -> Self {
        Self { opcode, source_ref }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)
    }
}
