//! StringLiteral type for strings materialised in the program database.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A length-delimited string the recovery created at an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringLiteral {
    /// Address of the first byte
    pub address: u64,
    /// Length in bytes, excluding any terminator
    pub length: u64,
    /// Decoded value
    pub value: String,
}

impl StringLiteral {
    pub fn new(address: u64, length: u64, value: String) -> Self {
        Self {
            address,
            length,
            value,
        }
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Display for StringLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}: {:?}", self.address, self.value)
    }
}

/// Decode bytes as UTF-8, dropping invalid sequences instead of replacing them.
pub fn decode_lenient(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}
