//! Instruction emission for a single compilation unit.
//!
//! A [`ChunkBuilder`] collects the instructions of one chunk before they are
//! committed to a script's [`crate::ByteCode`] segment. Addresses handed out
//! by the builder are absolute: they already include the base address the
//! chunk will occupy once committed.

use core_types::SourceRef;

use crate::instruction::Instruction;
use crate::opcode::OpCode;

/// Builder for the instructions of one chunk
#[derive(Debug)]
pub struct ChunkBuilder {
    base: usize,
    instructions: Vec<Instruction>,
    current_ref: Option<SourceRef>,
}

impl ChunkBuilder {
    /// Create a builder for a chunk that will start at `base`
    pub fn new(base: usize) -> Self {
        Self {
            base,
            instructions: Vec::new(),
            current_ref: None,
        }
    }

    /// Address the chunk will start at
    pub fn base(&self) -> usize {
        self.base
    }

    /// Address of the next instruction to be emitted
    pub fn next_address(&self) -> usize {
        self.base + self.instructions.len()
    }

    /// Number of instructions emitted so far
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// True if nothing was emitted yet
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Source span attached to subsequently emitted instructions;
    /// returns the previous one so callers can restore it
    pub fn set_source_ref(&mut self, source_ref: Option<SourceRef>) -> Option<SourceRef> {
        std::mem::replace(&mut self.current_ref, source_ref)
    }

    /// Emit an instruction and return its address
    pub fn emit(&mut self, opcode: OpCode) -> usize {
        let addr = self.next_address();
        self.instructions
            .push(Instruction::with_ref(opcode, self.current_ref));
        addr
    }

    /// Mutable access to an emitted instruction
    pub fn get_mut(&mut self, addr: usize) -> Option<&mut Instruction> {
        let idx = addr.checked_sub(self.base)?;
        self.instructions.get_mut(idx)
    }

    /// Point the jump at `addr` to `target`
    pub fn patch_jump(&mut self, addr: usize, target: usize) {
        if let Some(inst) = self.get_mut(addr) {
            inst.opcode.set_jump_target(target);
        }
    }

    /// Set the length of the `Meta` header at `addr` so that it spans every
    /// instruction emitted since
    pub fn close_meta(&mut self, addr: usize) {
        let end = self.next_address();
        if let Some(inst) = self.get_mut(addr) {
            if let OpCode::Meta { length, .. } = &mut inst.opcode {
                *length = end - addr;
            }
        }
    }

    /// Finish and hand out the instructions
    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    /// Borrow the emitted instructions
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
}
