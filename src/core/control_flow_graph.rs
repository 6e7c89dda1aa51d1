//! Per-function flow chart: the ordered basic blocks of one function.

use serde::{Deserialize, Serialize};

use crate::core::basic_block::BasicBlock;

/// Ordered list of basic blocks for one function, entry block first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowChart {
    /// Entry address of the owning function
    pub function_start: u64,
    /// Blocks in address order, entry first
    pub blocks: Vec<BasicBlock>,
}

impl FlowChart {
    pub fn new(function_start: u64, mut blocks: Vec<BasicBlock>) -> Self {
        blocks.sort_by_key(|b| (b.start_address != function_start, b.start_address));
        Self {
            function_start,
            blocks,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks that hand control back to the caller.
    pub fn return_blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().filter(|b| b.is_return())
    }

    pub fn block_containing(&self, address: u64) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.contains(address))
    }

    pub fn edge_count(&self) -> usize {
        self.blocks.iter().map(|b| b.successors.len()).sum()
    }
}
