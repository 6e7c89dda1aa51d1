//! Error types for Go symbol table recovery.
//!
//! Errors fall into two groups. Format errors mean the embedded table cannot be
//! trusted at all and abort the run. Everything else is scoped to a single
//! field or entry and is converted into an empty value plus a log line by the
//! phase that can tolerate the missing result.

use thiserror::Error;

use crate::analysis::database::DatabaseError;
use crate::analysis::memory::MemoryError;
use crate::core::disassembler::DisassemblerError;

/// Main error type for recovery operations.
#[derive(Debug, Error)]
pub enum RecoverError {
    /// No segment or symbol marks the start of the symbol table
    #[error("symbol table not found (tried segments {segments:?} and symbol {symbol:?})")]
    SymtabNotFound {
        segments: Vec<String>,
        symbol: String,
    },

    /// Header magic is not one of the known generations
    #[error("invalid symbol table magic {magic:#010x} at {address:#x}")]
    BadMagic { address: u64, magic: u32 },

    /// Header magic belongs to a generation whose layout is not decoded
    #[error("unsupported symbol table format version {generation} (magic {magic:#010x})")]
    UnsupportedVersion { generation: &'static str, magic: u32 },

    /// The two reserved header bytes are not zero
    #[error("invalid symbol table header: reserved field is {value:#06x}")]
    ReservedNotZero { value: u16 },

    /// Instruction size quantum outside {1, 2, 4}
    #[error("invalid instruction size quantum {0}")]
    InvalidQuantum(u8),

    /// Pointer size outside {4, 8}
    #[error("invalid pointer size {0}")]
    InvalidPointerSize(u8),

    /// A runtime function required by a heuristic is not present
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    /// A heuristic did not find its instruction shape
    #[error("pattern not matched in {function}: {detail}")]
    PatternNotMatched { function: String, detail: String },

    /// A candidate value was found but is outside the plausible range
    #[error("implausible length {length} at {address:#x}")]
    ImplausibleLength { address: u64, length: u64 },

    /// Install-root pointer or length resolved to zero, or the bytes decoded to nothing
    #[error("invalid install-root address/length ({pointer:#x}, {length})")]
    InvalidInstallRoot { pointer: u64, length: u64 },

    /// Bounded memory read failed
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Host database mutation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Single-instruction decode failed
    #[error("disassembler error: {0}")]
    Disassembler(#[from] DisassemblerError),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Object file could not be parsed
    #[error("object parse error: {0}")]
    Object(#[from] object::Error),
}

impl RecoverError {
    /// True for errors after which nothing downstream can be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RecoverError::SymtabNotFound { .. }
                | RecoverError::BadMagic { .. }
                | RecoverError::UnsupportedVersion { .. }
                | RecoverError::ReservedNotZero { .. }
                | RecoverError::InvalidQuantum(_)
                | RecoverError::InvalidPointerSize(_)
        )
    }
}

/// Result type alias for recovery operations
pub type Result<T> = std::result::Result<T, RecoverError>;
