//! Disassembler trait and error types for single-instruction decoding.
//!
//! The recovery heuristics never sweep a binary; they only ask the host to
//! decode the instruction at a given address. Backends implement this trait
//! over raw bytes and the program image feeds them from its memory.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::instruction::Instruction;

/// Errors that can occur during disassembly operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisassemblerError {
    #[error("invalid instruction at {0:#x}")]
    InvalidInstruction(u64),
    #[error("insufficient bytes at {0:#x}")]
    InsufficientBytes(u64),
    #[error("unsupported architecture {0}")]
    UnsupportedArchitecture(Architecture),
}

/// Result type for disassembly operations
pub type DisassemblerResult<T> = Result<T, DisassemblerError>;

/// Architectures an image may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    X86,
    X86_64,
    ARM,
    ARM64,
    Unknown,
}

impl Architecture {
    /// Address size in bits
    pub fn address_bits(&self) -> u8 {
        match self {
            Architecture::X86 | Architecture::ARM => 32,
            Architecture::X86_64 | Architecture::ARM64 | Architecture::Unknown => 64,
        }
    }

    /// Pointer size in bytes
    pub fn pointer_size(&self) -> u8 {
        self.address_bits() / 8
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86 => write!(f, "x86"),
            Architecture::X86_64 => write!(f, "x86_64"),
            Architecture::ARM => write!(f, "arm"),
            Architecture::ARM64 => write!(f, "arm64"),
            Architecture::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<object::Architecture> for Architecture {
    fn from(a: object::Architecture) -> Self {
        match a {
            object::Architecture::I386 => Architecture::X86,
            object::Architecture::X86_64 => Architecture::X86_64,
            object::Architecture::Arm => Architecture::ARM,
            object::Architecture::Aarch64 => Architecture::ARM64,
            _ => Architecture::Unknown,
        }
    }
}

/// Core disassembler trait that provides a common interface for instruction decoding
pub trait Disassembler {
    /// Decode the single instruction at `address` whose bytes start `bytes`.
    fn disassemble_instruction(&self, address: u64, bytes: &[u8])
        -> DisassemblerResult<Instruction>;

    /// Maximum instruction length for this architecture in bytes
    fn max_instruction_length(&self) -> usize;

    /// Architecture this disassembler supports
    fn architecture(&self) -> Architecture;

    /// Human-readable backend name
    fn name(&self) -> &str {
        "Generic Disassembler"
    }
}
