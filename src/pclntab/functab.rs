//! Function table and per-function records.
//!
//! The table follows the header's function count: `count` pairs of
//! pointer-sized `(entry, record offset)`, then the end-of-text PC. Each
//! record sits at `start + record offset`:
//!
//! ```text
//! +0        ptr  entry
//! +ptr+0    i32  name offset (from table start)
//! +ptr+4    i32  args
//! +ptr+8    i32  frame
//! +ptr+12   i32  pcsp
//! +ptr+16   i32  pcfile
//! +ptr+20   i32  pcln
//! +ptr+24   i32  nfuncdata
//! +ptr+28   i32  npcdata
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::database::ProgramDatabase;
use crate::core::string_literal::decode_lenient;
use crate::error::{RecoverError, Result};
use crate::pclntab::header::SymtabHeader;
use crate::pclntab::names::sanitize_name;
use crate::pclntab::reader::{DefiningReader, FieldReader};

const RECORD_FIELDS: [&str; 7] = [
    "args",
    "frame",
    "pcsp",
    "pcfile",
    "pcln",
    "nfuncdata",
    "npcdata",
];

/// Metadata of one compiled function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    /// Entry PC, as listed in the function table
    pub entry_address: u64,
    /// Second word of the table pair: the record's offset from the table
    /// start. Some tooling calls this the function's name offset; the name's
    /// own offset is [`Self::name_offset`], read from the record itself.
    pub func_offset: u64,
    pub record_address: u64,
    /// Name offset stored in the record
    pub name_offset: u32,
    pub name_address: u64,
    /// Raw name, leniently decoded
    pub raw_name: String,
    /// Byte length of the raw name
    pub name_length: u64,
    /// Sanitized name; empty when nothing usable remained
    pub name: String,
    pub args_size: u32,
    pub frame_size: u32,
    pub pcsp_offset: u32,
    pub pcfile_offset: u32,
    pub pcln_offset: u32,
    pub funcdata_count: u32,
    pub pcdata_count: u32,
}

impl FunctionRecord {
    /// Decode the record the table pair `(entry, func_offset)` points at.
    pub fn decode<R: FieldReader + ?Sized>(
        reader: &mut R,
        header: &SymtabHeader,
        entry_address: u64,
        func_offset: u64,
    ) -> Result<Self> {
        let start = header.start_address;
        let ptr = u64::from(header.pointer_size);
        let record_address = start.wrapping_add(func_offset);

        let record_entry = reader.read_pointer(record_address, header.pointer_size)?;
        if record_entry != entry_address {
            debug!(
                table = format_args!("{:#x}", entry_address),
                record = format_args!("{:#x}", record_entry),
                "record entry differs from table entry"
            );
        }

        let fields_at = record_address + ptr;
        let name_offset = reader.read_u32(fields_at)?;
        let mut values = [0u32; 7];
        for (i, value) in values.iter_mut().enumerate() {
            *value = reader.read_u32(fields_at + 4 * (i as u64 + 1))?;
        }

        let name_address = start.wrapping_add(u64::from(name_offset));
        let raw = reader.read_string(name_address)?;
        let name = sanitize_name(&raw);

        Ok(Self {
            entry_address,
            func_offset,
            record_address,
            name_offset,
            name_address,
            raw_name: decode_lenient(&raw),
            name_length: raw.len() as u64,
            name,
            args_size: values[0],
            frame_size: values[1],
            pcsp_offset: values[2],
            pcfile_offset: values[3],
            pcln_offset: values[4],
            funcdata_count: values[5],
            pcdata_count: values[6],
        })
    }

    /// Comment the record fields, materialize the name and rename the function.
    pub fn annotate<D: ProgramDatabase + ?Sized>(&self, db: &mut D, pointer_size: u8) {
        let fields_at = self.record_address + u64::from(pointer_size);
        db.set_comment(self.record_address, "Func Entry");
        db.set_comment(
            fields_at,
            &format!(
                "Func name offset(Addr @ {:#x}), name string: {}",
                self.name_address, self.raw_name
            ),
        );
        db.wait_for_analysis();

        if self.name.is_empty() {
            debug!(
                entry = format_args!("{:#x}", self.entry_address),
                "no usable function name"
            );
        } else {
            match db.create_string_literal(self.name_address, self.name_length) {
                Ok(()) => db.wait_for_analysis(),
                Err(e) => warn!(
                    address = format_args!("{:#x}", self.name_address),
                    name = %self.name,
                    error = %e,
                    "could not create function name string"
                ),
            }
            if db.function_containing(self.entry_address) == Some(self.entry_address) {
                match db.set_name(self.entry_address, &self.name) {
                    Ok(()) => {
                        db.wait_for_analysis();
                        debug!(
                            entry = format_args!("{:#x}", self.entry_address),
                            name = %self.name,
                            "renamed function"
                        );
                    }
                    Err(e) => warn!(
                        entry = format_args!("{:#x}", self.entry_address),
                        error = %e,
                        "could not rename function"
                    ),
                }
            }
        }

        for (i, label) in RECORD_FIELDS.iter().enumerate() {
            db.set_comment(fields_at + 4 * (i as u64 + 1), label);
        }
        db.wait_for_analysis();
    }
}

/// Decoded function table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionTable {
    pub count: u64,
    pub address: u64,
    /// `count * 2 * pointer_size`
    pub size: u64,
    /// End-of-text PC following the last pair
    pub end_pc: u64,
    pub records: Vec<FunctionRecord>,
}

impl FunctionTable {
    pub fn end_address(&self) -> u64 {
        self.address + self.size
    }
}

/// Read the function count and check the table it implies fits in memory.
pub fn read_function_count<R: FieldReader + ?Sized>(
    reader: &mut R,
    header: &SymtabHeader,
) -> Result<(u64, u64)> {
    let count_address = header.function_count_address();
    let count = reader.read_pointer(count_address, header.pointer_size)?;
    let ptr = u64::from(header.pointer_size);
    let implausible = || RecoverError::ImplausibleLength {
        address: count_address,
        length: count,
    };
    let size = count.checked_mul(2 * ptr).ok_or_else(implausible)?;
    // The table is followed by the end PC and the 4-byte file table offset.
    let tail = header
        .function_table_address()
        .checked_add(size)
        .and_then(|end| end.checked_add(ptr + 4))
        .ok_or_else(implausible)?;
    if !reader.is_readable(tail - 1, 1) {
        return Err(implausible());
    }
    Ok((count, size))
}

/// Decode the table without touching the host.
pub fn decode_function_table<R: FieldReader + ?Sized>(
    reader: &mut R,
    header: &SymtabHeader,
) -> Result<FunctionTable> {
    let (count, size) = read_function_count(reader, header)?;
    let address = header.function_table_address();
    let ptr = u64::from(header.pointer_size);
    let mut records = Vec::with_capacity(count.min(1 << 16) as usize);
    for idx in 0..count {
        let slot = address + idx * 2 * ptr;
        let entry = reader.read_pointer(slot, header.pointer_size)?;
        let func_offset = reader.read_pointer(slot + ptr, header.pointer_size)?;
        records.push(FunctionRecord::decode(reader, header, entry, func_offset)?);
    }
    let end_pc = reader.read_pointer(address + size, header.pointer_size)?;
    Ok(FunctionTable {
        count,
        address,
        size,
        end_pc,
        records,
    })
}

/// Make sure a function starts at `entry`, creating one if needed.
fn ensure_function<D: ProgramDatabase + ?Sized>(db: &mut D, entry: u64) -> bool {
    if db.function_containing(entry) == Some(entry) {
        return true;
    }
    debug!(entry = format_args!("{:#x}", entry), "creating function");
    if let Err(e) = db.delete_items(entry, 1, true) {
        debug!(entry = format_args!("{:#x}", entry), error = %e, "could not undefine entry");
    }
    db.wait_for_analysis();
    if let Err(e) = db.create_instruction(entry) {
        warn!(entry = format_args!("{:#x}", entry), error = %e, "could not create instruction");
    }
    db.wait_for_analysis();
    match db.create_function(entry) {
        Ok(()) => {
            db.wait_for_analysis();
            debug!(entry = format_args!("{:#x}", entry), "created function");
            true
        }
        Err(e) => {
            warn!(entry = format_args!("{:#x}", entry), error = %e, "could not create function");
            false
        }
    }
}

/// Walk the table in the host: create functions, type fields, name and
/// comment everything.
///
/// A record that cannot be read is logged and skipped; a table slot that
/// cannot be read aborts the walk.
pub fn recover_function_table<D: ProgramDatabase + ?Sized>(
    db: &mut D,
    header: &SymtabHeader,
) -> Result<FunctionTable> {
    let (count, size) = read_function_count(&mut DefiningReader::new(&mut *db), header)?;
    let count_address = header.function_count_address();
    let address = header.function_table_address();
    let ptr = u64::from(header.pointer_size);

    db.set_comment(count_address, "Functions number");
    for (at, name) in [(count_address, "funcs_entry"), (address, "pc0")] {
        if let Err(e) = db.set_name(at, name) {
            debug!(error = %e, "could not label function table");
        }
        db.wait_for_analysis();
    }

    let mut records = Vec::with_capacity(count.min(1 << 16) as usize);
    for idx in 0..count {
        let slot = address + idx * 2 * ptr;
        let entry = DefiningReader::new(&mut *db).read_pointer(slot, header.pointer_size)?;
        ensure_function(db, entry);

        let func_offset = DefiningReader::new(&mut *db).read_pointer(slot + ptr, header.pointer_size)?;
        match FunctionRecord::decode(&mut DefiningReader::new(&mut *db), header, entry, func_offset) {
            Ok(record) => {
                record.annotate(db, header.pointer_size);
                records.push(record);
            }
            Err(e) => warn!(
                index = idx,
                entry = format_args!("{:#x}", entry),
                error = %e,
                "skipping unreadable function record"
            ),
        }
        db.set_comment(
            slot + ptr,
            &format!("Func Struct @ {:#x}", header.start_address.wrapping_add(func_offset)),
        );
        db.wait_for_analysis();
    }

    let end_pc = DefiningReader::new(&mut *db).read_pointer(address + size, header.pointer_size)?;
    db.set_comment(address + size, "end pc");
    Ok(FunctionTable {
        count,
        address,
        size,
        end_pc,
        records,
    })
}
