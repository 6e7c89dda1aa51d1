//! Source file table and path classification.
//!
//! The 4-byte slot after the end PC holds the table's offset from the symbol
//! table start. The table begins with a 4-byte count whose first entry is a
//! placeholder, so it lists `count - 1` paths; entry `i` is a 4-byte offset
//! at `table + 4 * i`.

use memchr::memmem;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::analysis::database::ProgramDatabase;
use crate::config::SourceFilterConfig;
use crate::error::{RecoverError, Result};
use crate::pclntab::reader::{DefiningReader, FieldReader};

/// Why a path was or was not kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathClass {
    User,
    Empty,
    InstallRoot,
    Generated,
    /// Contains the given standard-library, cgo or vendor marker
    Excluded(String),
}

/// Classifies source paths as user code or toolchain/generated code.
pub struct SourceFilter<'a> {
    install_root: &'a str,
    config: &'a SourceFilterConfig,
}

impl<'a> SourceFilter<'a> {
    pub fn new(install_root: &'a str, config: &'a SourceFilterConfig) -> Self {
        Self {
            install_root,
            config,
        }
    }

    pub fn classify(&self, path: &str) -> PathClass {
        if path.is_empty() {
            return PathClass::Empty;
        }
        if !self.install_root.is_empty() && path.starts_with(self.install_root) {
            return PathClass::InstallRoot;
        }
        if self.config.generated_paths.iter().any(|g| g == path) {
            return PathClass::Generated;
        }
        let haystack = path.as_bytes();
        for marker in &self.config.excluded_markers {
            if memmem::find(haystack, marker.as_bytes()).is_some() {
                return PathClass::Excluded(marker.clone());
            }
        }
        PathClass::User
    }

    pub fn is_user_path(&self, path: &str) -> bool {
        self.classify(path) == PathClass::User
    }
}

/// One resolved table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileEntry {
    pub index: u64,
    pub slot_address: u64,
    pub path_address: u64,
    pub path: String,
}

/// The source file table: where it is, how many paths it declares, and
/// the entries that resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileTable {
    pub address: u64,
    /// Declared number of paths (`count - 1`)
    pub count: u64,
    pub entries: Vec<SourceFileEntry>,
}

impl SourceFileTable {
    /// Paths the filter keeps, in table order, duplicates included.
    pub fn user_paths(&self, filter: &SourceFilter<'_>) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| filter.is_user_path(&e.path))
            .map(|e| e.path.clone())
            .collect()
    }
}

fn read_entry<R: FieldReader + ?Sized>(
    reader: &mut R,
    start: u64,
    table: u64,
    index: u64,
) -> Result<SourceFileEntry> {
    let slot_address = table + 4 * index;
    let offset = reader.read_u32(slot_address)?;
    let path_address = start.wrapping_add(u64::from(offset));
    let bytes = reader.read_string(path_address)?;
    let path = String::from_utf8(bytes).map_err(|e| RecoverError::PatternNotMatched {
        function: "source file table".into(),
        detail: format!("entry {index} is not UTF-8: {e}"),
    })?;
    Ok(SourceFileEntry {
        index,
        slot_address,
        path_address,
        path,
    })
}

fn table_location<R: FieldReader + ?Sized>(
    reader: &mut R,
    start: u64,
    offset_slot: u64,
) -> Result<(u64, u64)> {
    let offset = reader.read_u32(offset_slot)?;
    let address = start.wrapping_add(u64::from(offset));
    let count = u64::from(reader.read_u32(address)?.saturating_sub(1));
    let implausible = || RecoverError::ImplausibleLength {
        address,
        length: count,
    };
    // Placeholder slot plus one slot per path, each 4 bytes.
    let size = (count + 1).checked_mul(4).ok_or_else(implausible)?;
    let end = address.checked_add(size).ok_or_else(implausible)?;
    if !reader.is_readable(end - 1, 1) {
        return Err(implausible());
    }
    Ok((address, count))
}

/// Decode the table without touching the host. Unreadable entries are logged
/// and skipped.
///
/// A count whose slots run past readable memory is rejected as
/// [`RecoverError::ImplausibleLength`].
pub fn decode_source_file_table<R: FieldReader + ?Sized>(
    reader: &mut R,
    start: u64,
    offset_slot: u64,
) -> Result<SourceFileTable> {
    let (address, count) = table_location(reader, start, offset_slot)?;
    let mut entries = Vec::new();
    for index in 1..=count {
        match read_entry(reader, start, address, index) {
            Ok(entry) => entries.push(entry),
            Err(e) => debug!(index, error = %e, "skipping unreadable source file entry"),
        }
    }
    Ok(SourceFileTable {
        address,
        count,
        entries,
    })
}

/// Walk the table in the host, materializing every path as a string literal
/// referenced from its slot.
///
/// Entries that cannot be read, are empty or are not UTF-8 are logged and
/// skipped.
pub fn recover_source_file_table<D: ProgramDatabase + ?Sized>(
    db: &mut D,
    start: u64,
    offset_slot: u64,
) -> Result<SourceFileTable> {
    let (address, count) = table_location(&mut DefiningReader::new(&mut *db), start, offset_slot)?;
    db.set_comment(offset_slot, &format!("Source file table addr: {:#x}", address));
    if let Err(e) = db.set_name(address, "runtime_filetab") {
        debug!(error = %e, "could not name source file table");
    }
    db.wait_for_analysis();
    info!(count, table = format_args!("{:#x}", address), "source file table");

    let mut entries = Vec::new();
    for index in 1..=count {
        let entry = match read_entry(&mut DefiningReader::new(&mut *db), start, address, index) {
            Ok(entry) if entry.path.is_empty() => {
                error!(
                    index,
                    slot = format_args!("{:#x}", entry.slot_address),
                    "empty source file entry"
                );
                continue;
            }
            Ok(entry) => entry,
            Err(e) => {
                error!(index, error = %e, "failed to parse source file entry");
                continue;
            }
        };
        match db.create_string_literal(entry.path_address, entry.path.len() as u64) {
            Ok(()) => db.wait_for_analysis(),
            Err(e) => warn!(
                address = format_args!("{:#x}", entry.path_address),
                error = %e,
                "could not create source path string"
            ),
        }
        db.set_comment(entry.slot_address, "");
        db.add_data_ref(entry.slot_address, entry.path_address);
        db.wait_for_analysis();
        entries.push(entry);
    }
    Ok(SourceFileTable {
        address,
        count,
        entries,
    })
}
