//! The append-only code segment shared by every processor of a script.
//!
//! Each successful load commits one immutable [`CodeBlock`]. Processors
//! keep a clone of the block they are executing (a cheap `Arc` clone) and
//! only go back to the segment when control leaves that block, so the
//! segment lock is never held while code runs.

use std::sync::Arc;

use parking_lot::RwLock;

use core_types::SourceRef;

use crate::chunk::ChunkBuilder;
use crate::instruction::Instruction;

/// A contiguous, immutable run of committed instructions
#[derive(Debug, Clone)]
pub struct CodeBlock {
    base: usize,
    code: Arc<[Instruction]>,
}

impl CodeBlock {
    /// First address of the block
    pub fn base(&self) -> usize {
        self.base
    }

    /// One past the last address of the block
    pub fn end(&self) -> usize {
        self.base + self.code.len()
    }

    /// True if `addr` lies inside the block
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.end()
    }

    /// Instruction at absolute address `addr`
    pub fn get(&self, addr: usize) -> Option<&Instruction> {
        addr.checked_sub(self.base).and_then(|i| self.code.get(i))
    }

    /// Instructions in `[from, from + len)`, if fully inside the block
    pub fn range(&self, from: usize, len: usize) -> Option<&[Instruction]> {
        let start = from.checked_sub(self.base)?;
        self.code.get(start..start + len)
    }
}

/// The code segment of one script
#[derive(Debug, Default)]
pub struct ByteCode {
    blocks: RwLock<Vec<CodeBlock>>,
}

impl ByteCode {
    /// Create an empty segment
    pub fn new() -> Self {
        Self::default()
    }

    /// Address the next committed block will start at
    pub fn len(&self) -> usize {
        self.blocks.read().last().map_or(0, CodeBlock::end)
    }

    /// True if nothing has been committed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build and commit a block atomically.
    ///
    /// `build` receives a [`ChunkBuilder`] positioned at the next free
    /// address and runs with the segment locked, so concurrent loads into
    /// the same script cannot interleave. If `build` fails nothing is
    /// committed.
    pub fn append_with<R, E, F>(&self, build: F) -> Result<(CodeBlock, R), E>
    where
        F: FnOnce(&mut ChunkBuilder) -> Result<R, E>,
    {
        let mut blocks = self.blocks.write();
        let base = blocks.last().map_or(0, CodeBlock::end);
        let mut builder = ChunkBuilder::new(base);
        let result = build(&mut builder)?;

        let block = CodeBlock {
            base,
            code: builder.into_instructions().into(),
        };
        if !block.code.is_empty() {
            blocks.push(block.clone());
        }
        Ok((block, result))
    }

    /// Block containing `addr`
    pub fn block_at(&self, addr: usize) -> Option<CodeBlock> {
        let blocks = self.blocks.read();
        let idx = blocks.partition_point(|b| b.end() <= addr);
        blocks.get(idx).filter(|b| b.contains(addr)).cloned()
    }

    /// Copy of the instruction at `addr`
    pub fn instruction(&self, addr: usize) -> Option<Instruction> {
        self.block_at(addr).and_then(|b| b.get(addr).cloned())
    }

    /// Source span of the instruction at `addr`
    pub fn source_ref(&self, addr: usize) -> Option<SourceRef> {
        self.block_at(addr).and_then(|b| b.get(addr).and_then(|i| i.source_ref))
    }

    /// Human-readable listing of the whole segment, one line per
    /// instruction
    pub fn listing(&self) -> Vec<String> {
        self.blocks
            .read()
            .iter()
            .flat_map(|b| {
                b.code
                    .iter()
                    .enumerate()
                    .map(move |(i, inst)| format!("{:08X}  {}", b.base + i, inst))
            })
            .collect()
    }
}
