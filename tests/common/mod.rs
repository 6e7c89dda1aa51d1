//! Common test utilities and helpers.
//!
//! Builds in-memory Go images: a text segment, a symbol table segment from
//! [`SymtabBuilder`], read-only data, and optional runtime functions whose
//! code matches the install-root and version heuristics.

#![allow(dead_code)]

use gosym_recover::analysis::{ItemSize, ProgramImage};
use gosym_recover::core::basic_block::{BasicBlock, BlockKind};
use gosym_recover::core::control_flow_graph::FlowChart;
use gosym_recover::core::instruction::{Instruction, Operand};
use gosym_recover::core::segment::{Perms, Segment};
use gosym_recover::pclntab::{BuiltSymtab, SymtabBuilder};

pub const TEXT: u64 = 0x40_1000;
pub const TEXT_SIZE: usize = 0x2000;
pub const RODATA: u64 = 0x4a_0000;
pub const RODATA_SIZE: usize = 0x1000;
pub const PCLNTAB: u64 = 0x4c_0000;

/// Offsets into read-only data used by the runtime fixtures.
pub mod layout {
    pub const INSTALL_ROOT: u64 = 0x100;
    pub const VERSION_HEADER: u64 = 0x200;
    pub const VERSION_TEXT: u64 = 0x300;
    pub const POINTER_TABLE: u64 = 0x400;
}

/// Entry points of the runtime functions in the fixture.
pub const GOROOT_ENTRY: u64 = TEXT + 0x1000;
pub const SCHEDINIT_ENTRY: u64 = TEXT + 0x1100;

/// One Go function placed in the text segment.
#[derive(Debug, Clone)]
pub struct GoFunction {
    pub entry: u64,
    pub name: &'static str,
    pub args: u32,
    pub frame: u32,
}

impl GoFunction {
    pub fn new(entry: u64, name: &'static str) -> Self {
        Self {
            entry,
            name,
            args: 0,
            frame: 0,
        }
    }
}

/// Fixture builder for a complete Go image.
pub struct GoImage {
    pub pointer_size: u8,
    pub pclntab_segment: &'static str,
    pub functions: Vec<GoFunction>,
    pub files: Vec<&'static str>,
    pub rodata: Vec<u8>,
    pub install_root: Option<&'static str>,
    pub version: Option<&'static str>,
    pub pointer_targets: Vec<u64>,
}

impl GoImage {
    pub fn new(pointer_size: u8) -> Self {
        Self {
            pointer_size,
            pclntab_segment: ".gopclntab",
            functions: Vec::new(),
            files: Vec::new(),
            rodata: vec![0u8; RODATA_SIZE],
            install_root: None,
            version: None,
            pointer_targets: Vec::new(),
        }
    }

    pub fn function(mut self, function: GoFunction) -> Self {
        self.functions.push(function);
        self
    }

    pub fn file(mut self, path: &'static str) -> Self {
        self.files.push(path);
        self
    }

    /// Add `runtime.GOROOT` returning `root` with an immediate length.
    pub fn install_root(mut self, root: &'static str) -> Self {
        self.install_root = Some(root);
        self
    }

    /// Add `runtime.schedinit` storing the length of `version`.
    pub fn version(mut self, version: &'static str) -> Self {
        self.version = Some(version);
        self
    }

    /// Add a pointer slot in read-only data aimed at `target`.
    pub fn pointer_to(mut self, target: u64) -> Self {
        self.pointer_targets.push(target);
        self
    }

    fn put_ptr(&mut self, offset: u64, value: u64) {
        let at = offset as usize;
        if self.pointer_size == 4 {
            self.rodata[at..at + 4].copy_from_slice(&(value as u32).to_le_bytes());
        } else {
            self.rodata[at..at + 8].copy_from_slice(&value.to_le_bytes());
        }
    }

    fn put_bytes(&mut self, offset: u64, bytes: &[u8]) {
        let at = offset as usize;
        self.rodata[at..at + bytes.len()].copy_from_slice(bytes);
    }

    pub fn symtab(&self) -> BuiltSymtab {
        let mut builder = SymtabBuilder::new(self.pointer_size);
        let mut functions = self.functions.clone();
        if self.install_root.is_some() {
            functions.push(GoFunction::new(GOROOT_ENTRY, "runtime.GOROOT"));
        }
        if self.version.is_some() {
            functions.push(GoFunction::new(SCHEDINIT_ENTRY, "runtime.schedinit"));
        }
        for f in &functions {
            builder = builder.function(f.entry, f.name, f.args, f.frame);
        }
        for path in &self.files {
            builder = builder.file(path);
        }
        builder.build()
    }

    pub fn build(mut self) -> ProgramImage {
        let built = self.symtab();
        let ptr = u64::from(self.pointer_size);
        let mut listing = Vec::new();
        let mut charts = Vec::new();

        for f in &self.functions {
            listing.push(Instruction::new(f.entry, 1, "ret", vec![]));
        }

        if let Some(root) = self.install_root {
            self.put_bytes(layout::INSTALL_ROOT, root.as_bytes());
            let (body, blocks) = goroot_code(RODATA + layout::INSTALL_ROOT, root.len() as u64);
            listing.extend(body);
            charts.push(FlowChart::new(GOROOT_ENTRY, blocks));
        }

        if let Some(version) = self.version {
            let header = layout::VERSION_HEADER;
            self.put_ptr(header, RODATA + layout::VERSION_TEXT);
            self.put_ptr(header + ptr, version.len() as u64);
            self.put_bytes(layout::VERSION_TEXT, version.as_bytes());
            let (body, blocks) = schedinit_code(RODATA + header + ptr);
            listing.extend(body);
            charts.push(FlowChart::new(SCHEDINIT_ENTRY, blocks));
        }

        let targets = std::mem::take(&mut self.pointer_targets);
        for (i, &target) in targets.iter().enumerate() {
            self.put_ptr(layout::POINTER_TABLE + i as u64 * ptr, target);
        }

        let mut image = ProgramImage::new(self.pointer_size);
        image.add_segment(Segment::new(
            ".text",
            TEXT,
            vec![0xcc; TEXT_SIZE],
            Perms::READ | Perms::EXECUTE,
        ));
        image.add_segment(Segment::new(".rodata", RODATA, self.rodata, Perms::READ));
        image.add_segment(Segment::new(
            self.pclntab_segment,
            PCLNTAB,
            built.data,
            Perms::READ,
        ));
        image.add_instructions(listing);
        for chart in charts {
            image.add_flow_chart(chart);
        }
        let item = if self.pointer_size == 4 {
            ItemSize::Dword
        } else {
            ItemSize::Qword
        };
        for i in 0..targets.len() as u64 {
            image.add_data_item(RODATA + layout::POINTER_TABLE + i * ptr, item);
        }
        image
    }
}

/// Two returns: a failure path storing a register, and a success path
/// loading the root's address and storing its length as an immediate.
pub fn goroot_code(root: u64, length: u64) -> (Vec<Instruction>, Vec<BasicBlock>) {
    let e = GOROOT_ENTRY;
    let body = vec![
        Instruction::new(e, 5, "mov", vec![Operand::indirect_memory("rsp", 0x30), Operand::register("rax")]),
        Instruction::new(e + 5, 1, "ret", vec![]),
        Instruction::new(e + 0x10, 7, "lea", vec![Operand::register("rax"), Operand::direct_memory(root)]),
        Instruction::new(e + 0x17, 5, "mov", vec![Operand::indirect_memory("rsp", 0x30), Operand::register("rax")]),
        Instruction::new(e + 0x1c, 9, "mov", vec![Operand::indirect_memory("rsp", 0x38), Operand::immediate(length)]),
        Instruction::new(e + 0x25, 1, "ret", vec![]),
    ];
    let blocks = vec![
        BasicBlock::new(e, e + 6, BlockKind::Return),
        BasicBlock::new(e + 0x10, e + 0x26, BlockKind::Return),
    ];
    (body, blocks)
}

/// A single block that stores 7 into the version length slot.
pub fn schedinit_code(length_slot: u64) -> (Vec<Instruction>, Vec<BasicBlock>) {
    let e = SCHEDINIT_ENTRY;
    let body = vec![
        Instruction::new(e, 4, "sub", vec![Operand::register("rsp"), Operand::immediate(0x58)]),
        Instruction::new(e + 4, 11, "mov", vec![Operand::direct_memory(length_slot), Operand::immediate(7)]),
        Instruction::new(e + 15, 1, "ret", vec![]),
    ];
    (body, vec![BasicBlock::new(e, e + 16, BlockKind::Return)])
}

/// Text plus a `.gopclntab` segment holding `pclntab` verbatim.
pub fn bare_image(pointer_size: u8, pclntab: Vec<u8>) -> ProgramImage {
    let mut image = ProgramImage::new(pointer_size);
    image.add_segment(Segment::new(
        ".text",
        TEXT,
        vec![0xcc; TEXT_SIZE],
        Perms::READ | Perms::EXECUTE,
    ));
    image.add_segment(Segment::new(".gopclntab", PCLNTAB, pclntab, Perms::READ));
    image
}
