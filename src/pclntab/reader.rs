//! Field readers for table decoding.
//!
//! Every table field is read through a [`FieldReader`]. [`ProbeReader`] only
//! reads, so the same decode can run against a bare byte buffer or a live
//! database without leaving a trace. [`DefiningReader`] types each field as a
//! data item of its width first, drains the analysis queue, then reads.

use tracing::debug;

use crate::analysis::database::ProgramDatabase;
use crate::analysis::memory::{ItemSize, MemoryView};
use crate::error::{RecoverError, Result};

/// Typed little-endian field access.
pub trait FieldReader {
    /// Read an unsigned field of the given width.
    fn read_field(&mut self, address: u64, size: ItemSize) -> Result<u64>;

    /// Read a NUL-terminated byte string. Never retypes memory.
    fn read_string(&mut self, address: u64) -> Result<Vec<u8>>;

    /// Whether `len` bytes at `address` can be read.
    fn is_readable(&self, address: u64, len: usize) -> bool;

    fn read_pointer(&mut self, address: u64, pointer_size: u8) -> Result<u64> {
        let size = ItemSize::for_pointer(pointer_size)
            .ok_or(RecoverError::InvalidPointerSize(pointer_size))?;
        self.read_field(address, size)
    }

    fn read_u32(&mut self, address: u64) -> Result<u32> {
        Ok(self.read_field(address, ItemSize::Dword)? as u32)
    }
}

/// Read-only reader over any memory view.
pub struct ProbeReader<'a, M: MemoryView + ?Sized> {
    memory: &'a M,
}

impl<'a, M: MemoryView + ?Sized> ProbeReader<'a, M> {
    pub fn new(memory: &'a M) -> Self {
        Self { memory }
    }
}

impl<'a, M: MemoryView + ?Sized> FieldReader for ProbeReader<'a, M> {
    fn read_field(&mut self, address: u64, size: ItemSize) -> Result<u64> {
        Ok(self.memory.read_uint(address, size)?)
    }

    fn read_string(&mut self, address: u64) -> Result<Vec<u8>> {
        Ok(self.memory.read_c_string(address)?)
    }

    fn is_readable(&self, address: u64, len: usize) -> bool {
        self.memory.read_bytes(address, len).is_ok()
    }
}

/// Reader that types every field it reads as a data item.
pub struct DefiningReader<'a, D: ProgramDatabase + ?Sized> {
    db: &'a mut D,
}

impl<'a, D: ProgramDatabase + ?Sized> DefiningReader<'a, D> {
    pub fn new(db: &'a mut D) -> Self {
        Self { db }
    }
}

impl<'a, D: ProgramDatabase + ?Sized> FieldReader for DefiningReader<'a, D> {
    fn read_field(&mut self, address: u64, size: ItemSize) -> Result<u64> {
        let len = size.bytes() as u64;
        if let Err(e) = self.db.delete_items(address, len, false) {
            debug!(address = format_args!("{:#x}", address), error = %e, "could not undefine field");
        }
        if let Err(e) = self.db.create_data(address, size) {
            debug!(address = format_args!("{:#x}", address), error = %e, "could not type field");
        }
        self.db.wait_for_analysis();
        Ok(self.db.read_uint(address, size)?)
    }

    fn read_string(&mut self, address: u64) -> Result<Vec<u8>> {
        self.db.wait_for_analysis();
        Ok(self.db.read_c_string(address)?)
    }

    fn is_readable(&self, address: u64, len: usize) -> bool {
        self.db.read_bytes(address, len).is_ok()
    }
}
