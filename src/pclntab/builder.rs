//! Synthesize Go 1.2 symbol tables.
//!
//! Produces byte-exact tables for tests, benchmarks and fuzz seeds. Layout:
//! header, function count, pairs, end PC, file table offset, then records,
//! names, the file table and the file paths, each record aligned to the
//! pointer size.

use crate::pclntab::header::MAGIC_GO12;

#[derive(Debug, Clone)]
struct PlannedFunction {
    entry: u64,
    name: Vec<u8>,
    args: u32,
    frame: u32,
}

/// Builder for a synthetic symbol table.
#[derive(Debug, Clone)]
pub struct SymtabBuilder {
    magic: u32,
    reserved: u16,
    quantum: u8,
    pointer_size: u8,
    end_pc: Option<u64>,
    functions: Vec<PlannedFunction>,
    files: Vec<Vec<u8>>,
}

/// A built table and where its parts landed, as offsets from its start.
#[derive(Debug, Clone)]
pub struct BuiltSymtab {
    pub data: Vec<u8>,
    pub record_offsets: Vec<u64>,
    pub name_offsets: Vec<u64>,
    pub filetab_offset: u64,
    pub file_offsets: Vec<u64>,
}

impl SymtabBuilder {
    pub fn new(pointer_size: u8) -> Self {
        Self {
            magic: MAGIC_GO12,
            reserved: 0,
            quantum: 1,
            pointer_size,
            end_pc: None,
            functions: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn magic(mut self, magic: u32) -> Self {
        self.magic = magic;
        self
    }

    pub fn reserved(mut self, reserved: u16) -> Self {
        self.reserved = reserved;
        self
    }

    pub fn quantum(mut self, quantum: u8) -> Self {
        self.quantum = quantum;
        self
    }

    pub fn end_pc(mut self, end_pc: u64) -> Self {
        self.end_pc = Some(end_pc);
        self
    }

    pub fn function(self, entry: u64, name: &str, args: u32, frame: u32) -> Self {
        self.function_raw(entry, name.as_bytes(), args, frame)
    }

    /// Add a function whose name bytes need not be valid UTF-8.
    pub fn function_raw(mut self, entry: u64, name: &[u8], args: u32, frame: u32) -> Self {
        self.functions.push(PlannedFunction {
            entry,
            name: name.to_vec(),
            args,
            frame,
        });
        self
    }

    pub fn file(mut self, path: &str) -> Self {
        self.files.push(path.as_bytes().to_vec());
        self
    }

    fn put_ptr(&self, out: &mut Vec<u8>, at: usize, value: u64) {
        if self.pointer_size == 4 {
            out[at..at + 4].copy_from_slice(&(value as u32).to_le_bytes());
        } else {
            out[at..at + 8].copy_from_slice(&value.to_le_bytes());
        }
    }

    fn align(&self, out: &mut Vec<u8>) {
        let p = usize::from(self.pointer_size.max(1));
        while out.len() % p != 0 {
            out.push(0);
        }
    }

    pub fn build(&self) -> BuiltSymtab {
        let p = usize::from(self.pointer_size);
        let n = self.functions.len();
        let table = 8 + p;
        let fixed = table + n * 2 * p + p + 4;
        let mut out = vec![0u8; fixed];

        out[..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..6].copy_from_slice(&self.reserved.to_le_bytes());
        out[6] = self.quantum;
        out[7] = self.pointer_size;
        self.put_ptr(&mut out, 8, n as u64);

        let mut record_offsets = Vec::with_capacity(n);
        for f in &self.functions {
            self.align(&mut out);
            let at = out.len();
            record_offsets.push(at as u64);
            out.resize(at + p + 8 * 4, 0);
            self.put_ptr(&mut out, at, f.entry);
            out[at + p + 4..at + p + 8].copy_from_slice(&f.args.to_le_bytes());
            out[at + p + 8..at + p + 12].copy_from_slice(&f.frame.to_le_bytes());
        }

        let mut name_offsets = Vec::with_capacity(n);
        for (f, &record) in self.functions.iter().zip(&record_offsets) {
            let at = out.len();
            name_offsets.push(at as u64);
            out.extend_from_slice(&f.name);
            out.push(0);
            let field = record as usize + p;
            out[field..field + 4].copy_from_slice(&(at as u32).to_le_bytes());
        }

        self.align(&mut out);
        let filetab_offset = out.len() as u64;
        let count = self.files.len() as u32 + 1;
        out.extend_from_slice(&count.to_le_bytes());
        out.resize(out.len() + self.files.len() * 4, 0);
        let mut file_offsets = Vec::with_capacity(self.files.len());
        for (i, path) in self.files.iter().enumerate() {
            let at = out.len();
            file_offsets.push(at as u64);
            out.extend_from_slice(path);
            out.push(0);
            let slot = filetab_offset as usize + (i + 1) * 4;
            out[slot..slot + 4].copy_from_slice(&(at as u32).to_le_bytes());
        }

        for (i, (f, &record)) in self.functions.iter().zip(&record_offsets).enumerate() {
            let slot = table + i * 2 * p;
            self.put_ptr(&mut out, slot, f.entry);
            self.put_ptr(&mut out, slot + p, record);
        }
        let end_pc = self.end_pc.unwrap_or_else(|| {
            self.functions.iter().map(|f| f.entry).max().map_or(0, |e| e + 1)
        });
        let tail = table + n * 2 * p;
        self.put_ptr(&mut out, tail, end_pc);
        out[tail + p..tail + p + 4].copy_from_slice(&(filetab_offset as u32).to_le_bytes());

        BuiltSymtab {
            data: out,
            record_offsets,
            name_offsets,
            filetab_offset,
            file_offsets,
        }
    }
}
