//! Recover symbols from the runtime symbol table embedded in Go binaries.
//!
//! Stripped Go executables still carry the runtime's pclntab: function entry
//! points and names, plus the source file table. [`recover`] walks it inside
//! a host program database, creating and naming functions, then recovers the
//! toolchain install root and version from runtime code, classifies source
//! paths as user code or toolchain code, and relabels function pointers in
//! read-only data. Only the Go 1.2 through 1.15 layout is decoded.
//!
//! Hosts plug in through the traits in [`analysis`]; [`analysis::ProgramImage`]
//! is an in-memory host that [`analysis::loader`] builds from an object file.

/// Host capability traits and the in-memory host
pub mod analysis;
/// Pipeline configuration
pub mod config;
/// Core data types
pub mod core;
/// Instruction decoding backends
pub mod disasm;
/// Error types
pub mod error;
/// Tracing subscriber setup
pub mod logging;
/// Symbol table decoding and recovery
pub mod pclntab;

pub use analysis::{CodeView, Program, ProgramDatabase, ProgramImage};
pub use config::RecoverConfig;
pub use error::{RecoverError, Result};
pub use pclntab::{
    locate_symtab, probe_symtab, recover, recover_with, RecoveryReport, SymbolTable, SymtabHeader,
};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Load an object file and run the full recovery over it.
pub fn recover_file<P: AsRef<std::path::Path>>(
    path: P,
    config: &RecoverConfig,
) -> Result<(SymbolTable, RecoveryReport)> {
    let mut image = analysis::loader::load_object_file(path)?;
    recover(&mut image, config)
}
