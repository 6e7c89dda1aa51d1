//! Go runtime symbol table (pclntab) recovery.
//!
//! Phases, in order: locate the table, validate its header, walk the
//! function table (creating, typing and naming as it goes), recover the
//! install root and version from runtime code, decode the source file table
//! and classify its paths, then relabel function pointers in read-only data.
//! Format errors abort the run; every other failure leaves its field empty
//! and is logged.

pub mod builder;
pub mod filetab;
pub mod functab;
pub mod funcptr;
pub mod header;
pub mod names;
pub mod reader;
pub mod report;
pub mod runtime_strings;
pub mod symtab;

pub use builder::{BuiltSymtab, SymtabBuilder};
pub use filetab::{PathClass, SourceFilter, SourceFileTable};
pub use functab::{FunctionRecord, FunctionTable};
pub use funcptr::correlate_function_pointers;
pub use header::{FormatGeneration, SymtabHeader};
pub use names::sanitize_name;
pub use reader::{DefiningReader, FieldReader, ProbeReader};
pub use report::RecoveryReport;
pub use runtime_strings::{
    Go12Strategy, LengthEncoding, RuntimeStringProbe, RuntimeStringStrategy,
};
pub use symtab::SymbolTable;

use tracing::{debug, info, info_span, warn};

use crate::analysis::database::{Program, ProgramDatabase};
use crate::analysis::memory::MemoryView;
use crate::config::{LocateConfig, RecoverConfig, SourceFilterConfig};
use crate::error::{RecoverError, Result};

/// Start address of the symbol table: a known segment, else a known symbol.
pub fn locate_symtab<D: ProgramDatabase + ?Sized>(db: &D, config: &LocateConfig) -> Result<u64> {
    for name in &config.segment_names {
        if let Some(segment) = db.segment_by_name(name) {
            info!(segment = %name, address = format_args!("{:#x}", segment.start), "found symbol table segment");
            return Ok(segment.start);
        }
    }
    if !config.fallback_symbol.is_empty() {
        if let Some(address) = db.address_of_name(&config.fallback_symbol) {
            info!(
                symbol = %config.fallback_symbol,
                address = format_args!("{:#x}", address),
                "found symbol table symbol"
            );
            return Ok(address);
        }
    }
    Err(RecoverError::SymtabNotFound {
        segments: config.segment_names.clone(),
        symbol: config.fallback_symbol.clone(),
    })
}

/// Decode a table without modifying anything.
///
/// Source paths are classified with an empty install root.
pub fn probe_symtab<M: MemoryView + ?Sized>(
    memory: &M,
    start: u64,
    sources: &SourceFilterConfig,
) -> Result<SymbolTable> {
    let mut reader = ProbeReader::new(memory);
    let header = SymtabHeader::decode(&mut reader, start)?;
    let mut symtab = SymbolTable::new(&header);
    symtab.set_function_table(functab::decode_function_table(&mut reader, &header)?);
    let table =
        filetab::decode_source_file_table(&mut reader, start, symtab.source_file_offset_address())?;
    symtab.source_file_table_address = table.address;
    symtab.source_file_count = table.count;
    symtab.source_files = table.user_paths(&SourceFilter::new("", sources));
    Ok(symtab)
}

/// Run the full recovery with the default runtime heuristics.
pub fn recover<P: Program + ?Sized>(
    program: &mut P,
    config: &RecoverConfig,
) -> Result<(SymbolTable, RecoveryReport)> {
    let strategy = Go12Strategy::new(config.runtime.clone());
    recover_with(program, config, &strategy)
}

/// Run the full recovery with the given runtime-string heuristics.
pub fn recover_with<P, S>(
    program: &mut P,
    config: &RecoverConfig,
    strategy: &S,
) -> Result<(SymbolTable, RecoveryReport)>
where
    P: Program + ?Sized,
    S: RuntimeStringStrategy,
{
    config.validate()?;

    let start = {
        let _span = info_span!("locate").entered();
        locate_symtab(&*program, &config.locate)?
    };

    let header = {
        let _span = info_span!("header", address = format_args!("{:#x}", start)).entered();
        let header = SymtabHeader::decode(&mut DefiningReader::new(&mut *program), start)?;
        header.annotate(&mut *program);
        header
    };
    let mut symtab = SymbolTable::new(&header);

    {
        let _span = info_span!("functions").entered();
        let table = functab::recover_function_table(&mut *program, &header)?;
        info!(count = table.count, "Total functions number");
        symtab.set_function_table(table);
    }
    program.wait_for_analysis();

    {
        let _span = info_span!("runtime_strings", strategy = strategy.name()).entered();
        match strategy.find_install_root(&mut *program, header.pointer_size) {
            Ok(root) => symtab.install_root = root,
            Err(e @ RecoverError::InvalidInstallRoot { .. }) => {
                crate::log_error!(e, "install root rejected");
            }
            Err(e) => warn!(error = %e, "install root not found"),
        }
        match strategy.find_version(&mut *program, header.pointer_size) {
            Ok(version) => symtab.version = version,
            Err(e) => warn!(error = %e, "version not found"),
        }
    }

    {
        let _span = info_span!("source_files").entered();
        let offset_slot = symtab.source_file_offset_address();
        match filetab::recover_source_file_table(&mut *program, start, offset_slot) {
            Ok(table) => {
                let filter = SourceFilter::new(&symtab.install_root, &config.sources);
                for entry in &table.entries {
                    match filter.classify(&entry.path) {
                        PathClass::User => {
                            info!(path = %entry.path, "user source file");
                            symtab.source_files.push(entry.path.clone());
                        }
                        class => debug!(path = %entry.path, class = ?class, "skipping source file"),
                    }
                }
                symtab.source_file_table_address = table.address;
                symtab.source_file_count = table.count;
            }
            Err(e) => warn!(error = %e, "source file table unreadable"),
        }
    }

    let pointer_labels = {
        let _span = info_span!("function_pointers").entered();
        match correlate_function_pointers(&mut *program, &config.pointers) {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "function pointer correlation failed");
                0
            }
        }
    };

    let report = RecoveryReport::new(&symtab, pointer_labels);
    info!(
        functions = report.function_count,
        install_root = %report.install_root,
        version = %report.version,
        source_files = report.source_files.len(),
        pointer_labels,
        "recovery complete"
    );
    Ok((symtab, report))
}
