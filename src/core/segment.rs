//! Segment type for mapped memory regions.
//!
//! Segments carry their own bytes so the in-memory program image can serve
//! reads without going back to the file.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Permission flags for memory segments
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Perms: u8 {
        const READ = 1;
        const WRITE = 2;
        const EXECUTE = 4;
    }
}

impl Perms {
    /// Readable and executable (code segment)
    pub fn is_code(&self) -> bool {
        self.contains(Perms::READ | Perms::EXECUTE) && !self.contains(Perms::WRITE)
    }

    /// Readable only
    pub fn is_readonly(&self) -> bool {
        *self == Perms::READ
    }
}

impl fmt::Display for Perms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut perms = String::new();
        perms.push(if self.contains(Perms::READ) { 'r' } else { '-' });
        perms.push(if self.contains(Perms::WRITE) { 'w' } else { '-' });
        perms.push(if self.contains(Perms::EXECUTE) { 'x' } else { '-' });
        write!(f, "{}", perms)
    }
}

/// Named, mapped memory region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Section or segment name, e.g. `.gopclntab`
    pub name: String,
    /// Virtual start address
    pub start: u64,
    /// Mapped size; bytes beyond `data.len()` read as zero
    pub size: u64,
    /// Memory permissions
    pub perms: Perms,
    /// Initialized contents
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Segment {
    pub fn new(name: impl Into<String>, start: u64, data: Vec<u8>, perms: Perms) -> Self {
        Self {
            name: name.into(),
            start,
            size: data.len() as u64,
            perms,
            data,
        }
    }

    /// Zero-filled region (e.g. `.bss`).
    pub fn uninitialized(name: impl Into<String>, start: u64, size: u64, perms: Perms) -> Self {
        Self {
            name: name.into(),
            start,
            size,
            perms,
            data: Vec::new(),
        }
    }

    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end()
    }

    /// Copy `len` bytes at `address`, or `None` if the range leaves the segment.
    pub fn read(&self, address: u64, len: usize) -> Option<Vec<u8>> {
        if !self.contains(address) {
            return None;
        }
        let offset = (address - self.start) as usize;
        let end = offset.checked_add(len)?;
        if end as u64 > self.size {
            return None;
        }
        let mut out = vec![0u8; len];
        if offset < self.data.len() {
            let avail = end.min(self.data.len());
            out[..avail - offset].copy_from_slice(&self.data[offset..avail]);
        }
        Some(out)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:#x}..{:#x}) {}",
            self.name,
            self.start,
            self.end(),
            self.perms
        )
    }
}
