//! Symbol table header.
//!
//! ```text
//! +0  u32  magic
//! +4  u16  reserved, must be zero
//! +6  u8   instruction size quantum (1, 2 or 4)
//! +7  u8   pointer size (4 or 8)
//! +8  ptr  number of function table entries
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::analysis::database::ProgramDatabase;
use crate::analysis::memory::ItemSize;
use crate::error::{RecoverError, Result};
use crate::pclntab::reader::FieldReader;

pub const MAGIC_GO12: u32 = 0xFFFF_FFFB;
pub const MAGIC_GO116: u32 = 0xFFFF_FFFA;
pub const MAGIC_GO118: u32 = 0xFFFF_FFF0;

/// Size of the fixed part of the header, before the function count.
pub const HEADER_SIZE: u64 = 8;

/// Table layout generation, identified by the header magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatGeneration {
    /// Go 1.2 through 1.15
    Go12,
    /// Go 1.16 and 1.17
    Go116,
    /// Go 1.18 onwards
    Go118,
}

impl FormatGeneration {
    pub fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            MAGIC_GO12 => Some(Self::Go12),
            MAGIC_GO116 => Some(Self::Go116),
            MAGIC_GO118 => Some(Self::Go118),
            _ => None,
        }
    }

    pub fn magic(self) -> u32 {
        match self {
            Self::Go12 => MAGIC_GO12,
            Self::Go116 => MAGIC_GO116,
            Self::Go118 => MAGIC_GO118,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Go12 => "go1.2",
            Self::Go116 => "go1.16",
            Self::Go118 => "go1.18",
        }
    }

    /// Whether the tables behind this header can be decoded.
    pub fn is_supported(self) -> bool {
        self == Self::Go12
    }
}

impl fmt::Display for FormatGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validated header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymtabHeader {
    pub start_address: u64,
    pub generation: FormatGeneration,
    pub instruction_quantum: u8,
    pub pointer_size: u8,
}

impl SymtabHeader {
    /// Decode and validate the header at `start`.
    ///
    /// Every failure here is a format error: the rest of the table cannot be
    /// trusted.
    pub fn decode<R: FieldReader + ?Sized>(reader: &mut R, start: u64) -> Result<Self> {
        let magic = reader.read_u32(start)?;
        let generation = FormatGeneration::from_magic(magic).ok_or(RecoverError::BadMagic {
            address: start,
            magic,
        })?;
        if !generation.is_supported() {
            return Err(RecoverError::UnsupportedVersion {
                generation: generation.name(),
                magic,
            });
        }

        let reserved = reader.read_field(start + 4, ItemSize::Word)? as u16;
        if reserved != 0 {
            return Err(RecoverError::ReservedNotZero { value: reserved });
        }

        let instruction_quantum = reader.read_field(start + 6, ItemSize::Byte)? as u8;
        if !matches!(instruction_quantum, 1 | 2 | 4) {
            return Err(RecoverError::InvalidQuantum(instruction_quantum));
        }

        let pointer_size = reader.read_field(start + 7, ItemSize::Byte)? as u8;
        if !matches!(pointer_size, 4 | 8) {
            return Err(RecoverError::InvalidPointerSize(pointer_size));
        }

        debug!(
            address = format_args!("{:#x}", start),
            generation = %generation,
            quantum = instruction_quantum,
            pointer_size,
            "decoded symbol table header"
        );
        Ok(Self {
            start_address: start,
            generation,
            instruction_quantum,
            pointer_size,
        })
    }

    pub fn pointer_item(&self) -> ItemSize {
        if self.pointer_size == 4 {
            ItemSize::Dword
        } else {
            ItemSize::Qword
        }
    }

    /// Address of the pointer-sized function count.
    pub fn function_count_address(&self) -> u64 {
        self.start_address + HEADER_SIZE
    }

    /// Address of the first (entry, offset) pair.
    pub fn function_table_address(&self) -> u64 {
        self.function_count_address() + u64::from(self.pointer_size)
    }

    /// Label and comment the header fields.
    pub fn annotate<D: ProgramDatabase + ?Sized>(&self, db: &mut D) {
        let start = self.start_address;
        db.set_comment(start, "Magic Number");
        if let Err(e) = db.set_name(start, "runtime_symtab") {
            debug!(error = %e, "could not name symbol table");
        }
        db.set_comment(start + 6, "instruction size quantum");
        db.set_comment(start + 7, "ptr size");
        db.wait_for_analysis();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::image::ProgramImage;
    use crate::analysis::memory::SliceMemoryView;
    use crate::core::segment::{Perms, Segment};
    use crate::pclntab::reader::{DefiningReader, ProbeReader};

    fn header_bytes(magic: u32, reserved: u16, quantum: u8, ptr: u8) -> Vec<u8> {
        let mut b = magic.to_le_bytes().to_vec();
        b.extend_from_slice(&reserved.to_le_bytes());
        b.push(quantum);
        b.push(ptr);
        b.extend_from_slice(&[0u8; 8]);
        b
    }

    fn probe(bytes: &[u8]) -> Result<SymtabHeader> {
        let view = SliceMemoryView::new(0x1000, bytes);
        SymtabHeader::decode(&mut ProbeReader::new(&view), 0x1000)
    }

    #[test]
    fn decodes_oldest_generation() {
        let h = probe(&header_bytes(MAGIC_GO12, 0, 1, 8)).unwrap();
        assert_eq!(h.generation, FormatGeneration::Go12);
        assert_eq!((h.pointer_size, h.instruction_quantum), (8, 1));
        assert_eq!(h.function_count_address(), 0x1008);
        assert_eq!(h.function_table_address(), 0x1010);
        assert_eq!(h.pointer_item(), ItemSize::Qword);

        let h32 = probe(&header_bytes(MAGIC_GO12, 0, 4, 4)).unwrap();
        assert_eq!(h32.function_table_address(), 0x100c);
        assert_eq!(h32.pointer_item(), ItemSize::Dword);
    }

    #[test]
    fn newer_generations_are_unsupported() {
        for (magic, name) in [(MAGIC_GO116, "go1.16"), (MAGIC_GO118, "go1.18")] {
            match probe(&header_bytes(magic, 0, 1, 8)) {
                Err(RecoverError::UnsupportedVersion { generation, magic: m }) => {
                    assert_eq!(generation, name);
                    assert_eq!(m, magic);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn format_errors() {
        assert!(matches!(
            probe(&header_bytes(0xdead_beef, 0, 1, 8)),
            Err(RecoverError::BadMagic { address: 0x1000, magic: 0xdead_beef })
        ));
        assert!(matches!(
            probe(&header_bytes(MAGIC_GO12, 1, 1, 8)),
            Err(RecoverError::ReservedNotZero { value: 1 })
        ));
        assert!(matches!(
            probe(&header_bytes(MAGIC_GO12, 0, 3, 8)),
            Err(RecoverError::InvalidQuantum(3))
        ));
        assert!(matches!(
            probe(&header_bytes(MAGIC_GO12, 0, 1, 2)),
            Err(RecoverError::InvalidPointerSize(2))
        ));
        for err in [
            probe(&header_bytes(0, 0, 1, 8)).unwrap_err(),
            probe(&header_bytes(MAGIC_GO12, 0, 0, 8)).unwrap_err(),
        ] {
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn probe_decode_is_pure_and_repeatable() {
        let mut img = ProgramImage::new(8);
        img.add_segment(Segment::new(
            ".gopclntab",
            0x1000,
            header_bytes(MAGIC_GO12, 0, 2, 8),
            Perms::READ,
        ));
        let first = SymtabHeader::decode(&mut ProbeReader::new(&img), 0x1000).unwrap();
        let second = SymtabHeader::decode(&mut ProbeReader::new(&img), 0x1000).unwrap();
        assert_eq!(first, second);
        assert_eq!(img.pending_mutations(), 0);
        assert_eq!(img.barrier_count(), 0);
        assert_eq!(img.item_at(0x1000), None);
    }

    #[test]
    fn defining_decode_types_and_annotates() {
        let mut img = ProgramImage::new(8);
        img.add_segment(Segment::new(
            ".gopclntab",
            0x1000,
            header_bytes(MAGIC_GO12, 0, 1, 8),
            Perms::READ,
        ));
        let header = SymtabHeader::decode(&mut DefiningReader::new(&mut img), 0x1000).unwrap();
        header.annotate(&mut img);
        assert_eq!(img.item_at(0x1000), Some(crate::analysis::ItemKind::Data(ItemSize::Dword)));
        assert_eq!(img.name_at(0x1000).as_deref(), Some("runtime_symtab"));
        assert_eq!(img.comment_at(0x1007).as_deref(), Some("ptr size"));
        assert_eq!(img.stale_read_count(), 0);
        assert_eq!(img.pending_mutations(), 0);
    }
}
