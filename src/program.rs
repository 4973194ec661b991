//! Block and program arena.
//!
//! Addresses are deferred lookups through a label table rather than
//! pre-computed offsets: blocks are built symbolically, the arena may be
//! reordered or grown freely, and the resolver recomputes every address
//! from scratch afterwards. There is no emit-then-truncate correction path.

use crate::mos6502::TargetInstruction;

/// One entry in a block: an instruction or a run of literal data bytes,
/// either with an optional inline label (e.g. a loop head).
#[derive(Debug, Clone)]
pub enum BlockItem {
    Inst {
        label: Option<String>,
        inst: TargetInstruction,
    },
    Data {
        label: Option<String>,
        bytes: Vec<u8>,
    },
}

impl BlockItem {
    pub fn size(&self) -> usize {
        match self {
            BlockItem::Inst { inst, .. } => inst.size(),
            BlockItem::Data { bytes, .. } => bytes.len(),
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            BlockItem::Inst { label, .. } | BlockItem::Data { label, .. } => label.as_deref(),
        }
    }
}

/// An ordered, contiguous sequence of target instructions with an optional
/// leading label (e.g. a subroutine entry point).
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub label: Option<String>,
    pub items: Vec<BlockItem>,
}

impl Block {
    pub fn new(label: &str) -> Self {
        Block {
            label: Some(label.to_string()),
            items: Vec::new(),
        }
    }

    pub fn anonymous() -> Self {
        Block::default()
    }

    pub fn push(&mut self, inst: TargetInstruction) {
        self.items.push(BlockItem::Inst { label: None, inst });
    }

    pub fn push_labeled(&mut self, label: &str, inst: TargetInstruction) {
        self.items.push(BlockItem::Inst {
            label: Some(label.to_string()),
            inst,
        });
    }

    pub fn push_data(&mut self, label: Option<String>, bytes: Vec<u8>) {
        self.items.push(BlockItem::Data { label, bytes });
    }

    /// Encoded size of the whole block in bytes.
    pub fn size(&self) -> usize {
        self.items.iter().map(|i| i.size()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The ordered list of blocks plus a base load address.
#[derive(Debug, Clone)]
pub struct Program {
    pub base: u16,
    pub blocks: Vec<Block>,
}

impl Program {
    pub fn new(base: u16) -> Self {
        Program {
            base,
            blocks: Vec::new(),
        }
    }

    pub fn push_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Total encoded size; by construction the sum of block sizes.
    pub fn total_size(&self) -> usize {
        self.blocks.iter().map(|b| b.size()).sum()
    }
}
