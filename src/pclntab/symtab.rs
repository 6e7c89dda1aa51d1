//! The recovered symbol table.

use serde::{Deserialize, Serialize};

use crate::pclntab::functab::{FunctionRecord, FunctionTable};
use crate::pclntab::header::{FormatGeneration, SymtabHeader};

/// Everything recovered from one binary.
///
/// Filled in phase by phase and read-only once [`crate::pclntab::recover`]
/// returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTable {
    pub start_address: u64,
    pub generation: FormatGeneration,
    pub pointer_size: u8,
    pub instruction_quantum: u8,
    pub function_count: u64,
    pub function_table_address: u64,
    /// `function_count * 2 * pointer_size`
    pub function_table_size: u64,
    /// End-of-text PC following the function table
    pub end_pc: u64,
    pub source_file_table_address: u64,
    /// Paths the table declares, kept or not
    pub source_file_count: u64,
    /// Empty when not found
    pub install_root: String,
    /// Empty when not found
    pub version: String,
    /// User-code paths, in table order
    pub source_files: Vec<String>,
    pub functions: Vec<FunctionRecord>,
}

impl SymbolTable {
    pub fn new(header: &SymtabHeader) -> Self {
        Self {
            start_address: header.start_address,
            generation: header.generation,
            pointer_size: header.pointer_size,
            instruction_quantum: header.instruction_quantum,
            function_count: 0,
            function_table_address: header.function_table_address(),
            function_table_size: 0,
            end_pc: 0,
            source_file_table_address: 0,
            source_file_count: 0,
            install_root: String::new(),
            version: String::new(),
            source_files: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn header(&self) -> SymtabHeader {
        SymtabHeader {
            start_address: self.start_address,
            generation: self.generation,
            instruction_quantum: self.instruction_quantum,
            pointer_size: self.pointer_size,
        }
    }

    pub fn set_function_table(&mut self, table: FunctionTable) {
        self.function_count = table.count;
        self.function_table_address = table.address;
        self.function_table_size = table.size;
        self.end_pc = table.end_pc;
        self.functions = table.records;
    }

    /// Address of the 4-byte source file table offset.
    pub fn source_file_offset_address(&self) -> u64 {
        self.function_table_address + self.function_table_size + u64::from(self.pointer_size)
    }

    pub fn function_at(&self, entry: u64) -> Option<&FunctionRecord> {
        self.functions.iter().find(|f| f.entry_address == entry)
    }

    pub fn function_named(&self, name: &str) -> Option<&FunctionRecord> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_geometry() {
        let header = SymtabHeader {
            start_address: 0x4000,
            generation: FormatGeneration::Go12,
            instruction_quantum: 1,
            pointer_size: 8,
        };
        let mut symtab = SymbolTable::new(&header);
        symtab.set_function_table(FunctionTable {
            count: 2,
            address: 0x4010,
            size: 32,
            end_pc: 0x9000,
            records: Vec::new(),
        });
        assert_eq!(symtab.function_table_size, symtab.function_count * 2 * 8);
        assert_eq!(symtab.source_file_offset_address(), 0x4038);
        assert_eq!(symtab.header(), header);
        assert!(symtab.function_at(0x1000).is_none());
    }
}
