//! Instruction and Operand types for decoded assembly instructions.
//!
//! Instruction represents one decoded instruction at a specific address. The
//! operand model is deliberately coarse: the heuristics only ask which class
//! an operand belongs to and what numeric value it carries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Types of operands that can appear in instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperandKind {
    /// General register
    Register,
    /// Immediate value
    Immediate,
    /// Memory at a fixed address (absolute or RIP-relative)
    DirectMemory,
    /// Memory through base/index registers, with or without displacement
    IndirectMemory,
    /// Near code address (branch/call target)
    NearCode,
    /// Far code address
    FarCode,
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandKind::Register => write!(f, "Register"),
            OperandKind::Immediate => write!(f, "Immediate"),
            OperandKind::DirectMemory => write!(f, "DirectMemory"),
            OperandKind::IndirectMemory => write!(f, "IndirectMemory"),
            OperandKind::NearCode => write!(f, "NearCode"),
            OperandKind::FarCode => write!(f, "FarCode"),
        }
    }
}

/// Structured operand representation for instructions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operand {
    /// Type of operand
    pub kind: OperandKind,
    /// Immediate, absolute memory address, displacement or branch target
    pub value: u64,
    /// Register name (register operands, base register of memory operands)
    pub register: Option<String>,
}

impl Operand {
    pub fn register(name: impl Into<String>) -> Self {
        Self {
            kind: OperandKind::Register,
            value: 0,
            register: Some(name.into()),
        }
    }

    pub fn immediate(value: u64) -> Self {
        Self {
            kind: OperandKind::Immediate,
            value,
            register: None,
        }
    }

    /// Memory operand at a fixed address.
    pub fn direct_memory(address: u64) -> Self {
        Self {
            kind: OperandKind::DirectMemory,
            value: address,
            register: None,
        }
    }

    /// Memory operand `[base + displacement]`.
    pub fn indirect_memory(base: impl Into<String>, displacement: u64) -> Self {
        Self {
            kind: OperandKind::IndirectMemory,
            value: displacement,
            register: Some(base.into()),
        }
    }

    pub fn near_code(target: u64) -> Self {
        Self {
            kind: OperandKind::NearCode,
            value: target,
            register: None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.register) {
            (OperandKind::Register, Some(r)) => write!(f, "{}", r),
            (OperandKind::IndirectMemory, Some(base)) => {
                write!(f, "[{} + {:#x}]", base, self.value)
            }
            (OperandKind::DirectMemory, _) => write!(f, "[{:#x}]", self.value),
            _ => write!(f, "{:#x}", self.value),
        }
    }
}

/// One decoded instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Address of the first byte
    pub address: u64,
    /// Length in bytes
    pub length: u16,
    /// Lowercase mnemonic
    pub mnemonic: String,
    /// Operands in destination-first order
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(address: u64, length: u16, mnemonic: impl Into<String>, operands: Vec<Operand>) -> Self {
        Self {
            address,
            length,
            mnemonic: mnemonic.into().to_ascii_lowercase(),
            operands,
        }
    }

    /// Address of the following instruction.
    pub fn end_address(&self) -> u64 {
        self.address.saturating_add(self.length as u64)
    }

    pub fn operand(&self, index: usize) -> Option<&Operand> {
        self.operands.get(index)
    }

    pub fn operand_kind(&self, index: usize) -> Option<OperandKind> {
        self.operands.get(index).map(|op| op.kind)
    }

    pub fn operand_value(&self, index: usize) -> Option<u64> {
        self.operands.get(index).map(|op| op.value)
    }

    /// Plain data moves (`mov`, and the AT&T sized spellings).
    pub fn is_mov(&self) -> bool {
        matches!(self.mnemonic.as_str(), "mov" | "movl" | "movq")
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}: {}", self.address, self.mnemonic)?;
        for (i, op) in self.operands.iter().enumerate() {
            if i == 0 {
                write!(f, " {}", op)?;
            } else {
                write!(f, ", {}", op)?;
            }
        }
        Ok(())
    }
}
