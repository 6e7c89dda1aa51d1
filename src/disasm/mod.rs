//! Disassembly backends.
//!
//! iced-x86 decodes x86 and x86-64. Images for other architectures load
//! without a decoder; hosts that carry their own listing still work.

#[cfg(feature = "iced-backend")]
pub mod iced;

use crate::core::disassembler::{Architecture, Disassembler};

/// Select a decoder for the given architecture, if one is compiled in.
pub fn for_arch(arch: Architecture) -> Option<Box<dyn Disassembler + Send + Sync>> {
    match arch {
        #[cfg(feature = "iced-backend")]
        Architecture::X86 | Architecture::X86_64 => iced::IcedDisassembler::new(arch)
            .ok()
            .map(|d| Box::new(d) as Box<dyn Disassembler + Send + Sync>),
        _ => None,
    }
}
