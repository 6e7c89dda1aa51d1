//! Build a [`ProgramImage`] from an ELF, PE or Mach-O file.
//!
//! Allocated sections become segments carrying their bytes; named symbols
//! become labels, and text symbols become functions. Relocatable objects have
//! no load addresses, so their sections are laid out back to back from
//! [`RELOCATABLE_BASE`].

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use object::{Object, ObjectKind, ObjectSection, ObjectSymbol, SectionIndex, SectionKind, SymbolKind};
use tracing::{debug, info, warn};

use crate::analysis::image::ProgramImage;
use crate::core::disassembler::Architecture;
use crate::core::segment::{Perms, Segment};
use crate::error::Result;

/// First address assigned to sections of a relocatable object.
pub const RELOCATABLE_BASE: u64 = 0x1000;

fn section_perms(kind: SectionKind) -> Option<Perms> {
    match kind {
        SectionKind::Text => Some(Perms::READ | Perms::EXECUTE),
        SectionKind::Data
        | SectionKind::Tls
        | SectionKind::UninitializedData
        | SectionKind::UninitializedTls
        | SectionKind::Common => Some(Perms::READ | Perms::WRITE),
        SectionKind::ReadOnlyData
        | SectionKind::ReadOnlyDataWithRel
        | SectionKind::ReadOnlyString => Some(Perms::READ),
        _ => None,
    }
}

fn is_uninitialized(kind: SectionKind) -> bool {
    matches!(
        kind,
        SectionKind::UninitializedData | SectionKind::UninitializedTls | SectionKind::Common
    )
}

fn align_up(value: u64, align: u64) -> u64 {
    let align = align.max(1);
    value.div_ceil(align).saturating_mul(align)
}

/// Parse an object file held in memory.
pub fn load_object_bytes(data: &[u8]) -> Result<ProgramImage> {
    let file = object::File::parse(data)?;
    let arch = Architecture::from(file.architecture());
    let pointer_size = if file.is_64() { 8 } else { 4 };
    if !file.is_little_endian() {
        warn!(arch = %arch, "big-endian image; table fields are decoded little-endian");
    }
    let relocatable = file.kind() == ObjectKind::Relocatable;

    let mut image = ProgramImage::new(pointer_size);
    let mut bases: HashMap<SectionIndex, u64> = HashMap::new();
    let mut next_base = RELOCATABLE_BASE;

    for section in file.sections() {
        let kind = section.kind();
        let Some(perms) = section_perms(kind) else {
            continue;
        };
        let name = section.name().unwrap_or_default().to_string();
        let start = if relocatable {
            let base = align_up(next_base, section.align().max(16));
            next_base = base.saturating_add(section.size().max(1));
            base
        } else if section.address() == 0 {
            continue;
        } else {
            section.address()
        };
        let segment = if is_uninitialized(kind) {
            Segment::uninitialized(name, start, section.size(), perms)
        } else {
            let mut seg = Segment::new(name, start, section.data()?.to_vec(), perms);
            seg.size = seg.size.max(section.size());
            seg
        };
        debug!(segment = %segment, "mapped section");
        bases.insert(section.index(), start);
        image.add_segment(segment);
    }

    let mut named = 0usize;
    for symbol in file.symbols() {
        let Ok(name) = symbol.name() else { continue };
        if name.is_empty() || !matches!(symbol.kind(), SymbolKind::Text | SymbolKind::Data | SymbolKind::Unknown) {
            continue;
        }
        let Some(index) = symbol.section_index() else {
            continue;
        };
        let Some(&base) = bases.get(&index) else {
            continue;
        };
        let address = if relocatable {
            base.saturating_add(symbol.address())
        } else {
            symbol.address()
        };
        image.add_name(address, name);
        if symbol.kind() == SymbolKind::Text {
            let end = (symbol.size() > 0).then(|| address.saturating_add(symbol.size()));
            image.add_function(address, end);
        }
        named += 1;
    }

    if let Some(disassembler) = crate::disasm::for_arch(arch) {
        image.set_disassembler(disassembler);
    } else {
        warn!(arch = %arch, "no instruction decoder for architecture");
    }
    info!(
        arch = %arch,
        segments = bases.len(),
        symbols = named,
        "loaded object file"
    );
    Ok(image)
}

/// Map a file from disk and parse it.
pub fn load_object_file<P: AsRef<Path>>(path: P) -> Result<ProgramImage> {
    let path = path.as_ref();
    let file = File::open(path)?;
    debug!(path = %path.display(), "mapping object file");
    // Safety: read-only map of a regular file that outlives the parse.
    let mmap = unsafe { Mmap::map(&file)? };
    load_object_bytes(&mmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::database::{CodeView, ProgramDatabase};
    use crate::analysis::memory::MemoryView;
    use object::write::{Object as WriteObject, Symbol, SymbolSection};
    use object::{Architecture as ObjArch, BinaryFormat, Endianness, SymbolFlags, SymbolScope};

    fn sample_object() -> Vec<u8> {
        let mut obj = WriteObject::new(BinaryFormat::Elf, ObjArch::X86_64, Endianness::Little);
        let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
        obj.append_section_data(text, &[0x90, 0xc3], 16);
        let tab = obj.add_section(Vec::new(), b".gopclntab".to_vec(), SectionKind::ReadOnlyData);
        obj.append_section_data(tab, &[0xfb, 0xff, 0xff, 0xff, 0, 0, 1, 8], 8);
        obj.add_symbol(Symbol {
            name: b"main.main".to_vec(),
            value: 0,
            size: 2,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(text),
            flags: SymbolFlags::None,
        });
        obj.add_symbol(Symbol {
            name: b"runtime.pclntab".to_vec(),
            value: 0,
            size: 8,
            kind: SymbolKind::Data,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(tab),
            flags: SymbolFlags::None,
        });
        obj.write().unwrap()
    }

    #[test]
    fn loads_sections_and_symbols() {
        let image = load_object_bytes(&sample_object()).unwrap();
        let tab = image.segment_by_name(".gopclntab").unwrap();
        assert!(tab.perms.is_readonly());
        assert_eq!(image.read_u32(tab.start).unwrap(), 0xFFFF_FFFB);
        assert_eq!(image.address_of_name("runtime.pclntab"), Some(tab.start));

        let text = image.segment_by_name(".text").unwrap();
        assert!(text.perms.is_code());
        assert_eq!(image.functions(), vec![text.start]);
        assert_eq!(image.function_by_name("main.main"), Some(text.start));
        assert_eq!(image.pointer_size(), 8);
    }

    #[cfg(feature = "iced-backend")]
    #[test]
    fn attaches_x86_decoder() {
        let image = load_object_bytes(&sample_object()).unwrap();
        let text = image.segment_by_name(".text").unwrap();
        let ins = image.instruction_at(text.start + 1).unwrap();
        assert_eq!(ins.mnemonic, "ret");
        let chart = image.flow_chart(text.start).unwrap();
        assert_eq!(chart.return_blocks().count(), 1);
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.o");
        std::fs::write(&path, sample_object()).unwrap();
        let image = load_object_file(&path).unwrap();
        assert!(image.segment_by_name(".gopclntab").is_some());
    }

    #[test]
    fn rejects_garbage() {
        assert!(load_object_bytes(b"not an object file").is_err());
    }
}
