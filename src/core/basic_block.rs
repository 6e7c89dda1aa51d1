//! BasicBlock type for representing straight-line code regions.
//!
//! BasicBlock represents a fundamental unit of control flow analysis,
//! containing a sequence of instructions with a single entry point and
//! potentially multiple exit points.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How control leaves a basic block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    /// Falls through or branches to another block of the same function
    Normal,
    /// Ends with a return to the caller
    Return,
    /// Ends with a call that never returns
    NoReturn,
    /// Lies outside the function body (tail jump target)
    External,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKind::Normal => write!(f, "normal"),
            BlockKind::Return => write!(f, "return"),
            BlockKind::NoReturn => write!(f, "noreturn"),
            BlockKind::External => write!(f, "external"),
        }
    }
}

/// BasicBlock represents a straight-line code region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    /// Starting address of the basic block
    pub start_address: u64,
    /// Ending address of the basic block (exclusive)
    pub end_address: u64,
    /// Exit classification
    pub kind: BlockKind,
    /// Start addresses of successor blocks
    pub successors: Vec<u64>,
}

impl BasicBlock {
    pub fn new(start_address: u64, end_address: u64, kind: BlockKind) -> Self {
        Self {
            start_address,
            end_address,
            kind,
            successors: Vec::new(),
        }
    }

    pub fn with_successors(mut self, successors: Vec<u64>) -> Self {
        self.successors = successors;
        self
    }

    pub fn is_return(&self) -> bool {
        self.kind == BlockKind::Return
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.start_address && address < self.end_address
    }

    pub fn size(&self) -> u64 {
        self.end_address.saturating_sub(self.start_address)
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BasicBlock({:#x}..{:#x}, {})",
            self.start_address, self.end_address, self.kind
        )
    }
}
