//! MemoryView: safe, bounded reads by virtual address.
//!
//! This trait and helpers allow decoding code to read typed little-endian
//! values without caring whether the bytes come from a mapped file, a program
//! database or a test buffer. Implementations should be deterministic and
//! enforce bounds to avoid panics.

use serde::{Deserialize, Serialize};

/// Errors that can occur during memory reads.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("address {0:#x} is not mapped")]
    Unmapped(u64),
    #[error("read at {0:#x} runs past the end of its segment")]
    OutOfRange(u64),
    #[error("no NUL terminator within {limit} bytes of {address:#x}")]
    Unterminated { address: u64, limit: usize },
}

/// Width of a typed data item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemSize {
    Byte,
    Word,
    Dword,
    Qword,
}

impl ItemSize {
    pub fn bytes(self) -> usize {
        match self {
            ItemSize::Byte => 1,
            ItemSize::Word => 2,
            ItemSize::Dword => 4,
            ItemSize::Qword => 8,
        }
    }

    /// Item size matching a pointer width; `None` for widths the format never uses.
    pub fn for_pointer(pointer_size: u8) -> Option<Self> {
        match pointer_size {
            4 => Some(ItemSize::Dword),
            8 => Some(ItemSize::Qword),
            _ => None,
        }
    }

    /// Prefix of the host's auto-generated label for a data item of this width.
    pub fn label_prefix(self) -> &'static str {
        match self {
            ItemSize::Byte => "byte",
            ItemSize::Word => "word",
            ItemSize::Dword => "dword",
            ItemSize::Qword => "qword",
        }
    }
}

/// Longest NUL-terminated string the readers will follow.
pub const MAX_C_STRING: usize = 4096;

const C_STRING_CHUNK: usize = 64;

/// Bounded little-endian memory reads by virtual address.
pub trait MemoryView {
    /// Read `len` bytes starting at `address`.
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>, MemoryError>;

    fn read_u8(&self, address: u64) -> Result<u8, MemoryError> {
        Ok(self.read_bytes(address, 1)?[0])
    }

    fn read_u16(&self, address: u64) -> Result<u16, MemoryError> {
        let b = self.read_bytes(address, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&self, address: u64) -> Result<u32, MemoryError> {
        let b = self.read_bytes(address, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&self, address: u64) -> Result<u64, MemoryError> {
        let b = self.read_bytes(address, 8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read an unsigned value of the given width, zero-extended.
    fn read_uint(&self, address: u64, size: ItemSize) -> Result<u64, MemoryError> {
        match size {
            ItemSize::Byte => self.read_u8(address).map(u64::from),
            ItemSize::Word => self.read_u16(address).map(u64::from),
            ItemSize::Dword => self.read_u32(address).map(u64::from),
            ItemSize::Qword => self.read_u64(address),
        }
    }

    /// Read bytes up to (not including) the next NUL.
    fn read_c_string(&self, address: u64) -> Result<Vec<u8>, MemoryError> {
        let mut out = Vec::new();
        let mut cursor = address;
        while out.len() < MAX_C_STRING {
            let chunk = match self.read_bytes(cursor, C_STRING_CHUNK) {
                Ok(chunk) => chunk,
                // Near the end of a segment: fall back to single bytes.
                Err(MemoryError::OutOfRange(_)) => vec![self.read_u8(cursor)?],
                Err(e) => return Err(e),
            };
            if let Some(pos) = memchr::memchr(0, &chunk) {
                out.extend_from_slice(&chunk[..pos]);
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
            cursor = cursor.saturating_add(chunk.len() as u64);
        }
        Err(MemoryError::Unterminated {
            address,
            limit: MAX_C_STRING,
        })
    }
}

/// A memory view over a byte slice mapped at `base`.
pub struct SliceMemoryView<'a> {
    base: u64,
    data: &'a [u8],
}

impl<'a> SliceMemoryView<'a> {
    pub fn new(base: u64, data: &'a [u8]) -> Self {
        Self { base, data }
    }
}

impl<'a> MemoryView for SliceMemoryView<'a> {
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>, MemoryError> {
        if address < self.base {
            return Err(MemoryError::Unmapped(address));
        }
        let start = (address - self.base) as usize;
        if start >= self.data.len() {
            return Err(MemoryError::Unmapped(address));
        }
        let end = start.checked_add(len).ok_or(MemoryError::OutOfRange(address))?;
        if end > self.data.len() {
            return Err(MemoryError::OutOfRange(address));
        }
        Ok(self.data[start..end].to_vec())
    }
}
