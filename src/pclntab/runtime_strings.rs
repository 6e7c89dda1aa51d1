//! Install root and version string heuristics.
//!
//! Neither string is referenced from the symbol table. Both are found by
//! matching the code the compiler emits for two runtime functions: the
//! function returning the install root, and scheduler initialization, which
//! stores the version string's length. The shapes belong to one compiler
//! generation, so they sit behind [`RuntimeStringStrategy`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::database::Program;
use crate::config::RuntimeConfig;
use crate::core::instruction::{Instruction, OperandKind};
use crate::core::string_literal::decode_lenient;
use crate::error::{RecoverError, Result};
use crate::pclntab::reader::{DefiningReader, FieldReader};

/// How a string's length was encoded at the match site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthEncoding {
    /// Length is an immediate operand; the pointer is the loaded address
    Immediate,
    /// Pointer and length are read from a string header in memory
    Indirect,
}

/// Candidate string location produced by a pattern match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeStringProbe {
    pub pointer: u64,
    pub length: u64,
    pub encoding: LengthEncoding,
}

/// A set of code-shape heuristics for one compiler generation.
pub trait RuntimeStringStrategy {
    fn name(&self) -> &str;

    /// Recover the toolchain install root, with `/` separators.
    fn find_install_root<P: Program + ?Sized>(&self, program: &mut P, pointer_size: u8)
        -> Result<String>;

    /// Recover the toolchain version, without its prefix tag.
    fn find_version<P: Program + ?Sized>(&self, program: &mut P, pointer_size: u8)
        -> Result<String>;
}

/// Heuristics for binaries built by Go 1.2 through 1.15 toolchains.
#[derive(Debug, Clone, Default)]
pub struct Go12Strategy {
    config: RuntimeConfig,
}

impl Go12Strategy {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    fn locate<P: Program + ?Sized>(program: &P, name: &str) -> Result<u64> {
        program
            .function_by_name(name)
            .or_else(|| {
                program
                    .address_of_name(name)
                    .and_then(|a| program.function_containing(a))
            })
            .ok_or_else(|| RecoverError::FunctionNotFound(name.to_string()))
    }

    /// Find the `(pointer, length)` pair in the install-root function.
    ///
    /// The function has a failure return and a success return. The success
    /// path starts by loading the string's address into a register; the
    /// length follows either as a second load from memory (the pair lives in
    /// a string header) or as an immediate store.
    pub fn probe_install_root<P: Program + ?Sized>(
        &self,
        program: &mut P,
        pointer_size: u8,
    ) -> Result<RuntimeStringProbe> {
        let function = Self::locate(program, &self.config.install_root_function)?;
        let chart = program.flow_chart(function).ok_or_else(|| RecoverError::PatternNotMatched {
            function: self.config.install_root_function.clone(),
            detail: "no flow chart".into(),
        })?;

        let candidate = chart.return_blocks().find_map(|block| {
            let first = program.instruction_at(block.start_address)?;
            (first.operand_kind(0) == Some(OperandKind::Register)).then_some((block.clone(), first))
        });
        let Some((block, first)) = candidate else {
            return Err(RecoverError::PatternNotMatched {
                function: self.config.install_root_function.clone(),
                detail: "no return block loads a register".into(),
            });
        };
        let pointer_value = first.operand_value(1).unwrap_or(0);
        debug!(
            block = format_args!("{:#x}", block.start_address),
            pointer = format_args!("{:#x}", pointer_value),
            "install-root return block"
        );

        let mut cursor = first.end_address();
        while cursor < block.end_address {
            let Some(ins) = program.instruction_at(cursor) else {
                break;
            };
            match ins.operand_kind(1) {
                Some(OperandKind::DirectMemory) => {
                    let mut reader = DefiningReader::new(&mut *program);
                    let pointer = reader.read_pointer(pointer_value, pointer_size)?;
                    let length = reader
                        .read_pointer(pointer_value + u64::from(pointer_size), pointer_size)?;
                    return Ok(RuntimeStringProbe {
                        pointer,
                        length,
                        encoding: LengthEncoding::Indirect,
                    });
                }
                Some(OperandKind::Immediate) => {
                    return Ok(RuntimeStringProbe {
                        pointer: pointer_value,
                        length: ins.operand_value(1).unwrap_or(0),
                        encoding: LengthEncoding::Immediate,
                    });
                }
                _ => cursor = ins.end_address(),
            }
        }
        Err(RecoverError::InvalidInstallRoot {
            pointer: pointer_value,
            length: 0,
        })
    }

    fn is_version_length_store(&self, ins: &Instruction) -> bool {
        ins.is_mov()
            && ins.operand_kind(0) == Some(OperandKind::DirectMemory)
            && ins.operand_kind(1) == Some(OperandKind::Immediate)
            && ins.operand_value(1) == Some(self.config.version_length_immediate)
    }

    /// Check one candidate length store and return the version it names.
    fn try_version_at<P: Program + ?Sized>(
        &self,
        program: &mut P,
        pointer_size: u8,
        length_address: u64,
    ) -> Result<Option<String>> {
        let ptr = u64::from(pointer_size);
        let mut reader = DefiningReader::new(&mut *program);
        let pointer = reader.read_pointer(length_address.wrapping_sub(ptr), pointer_size)?;
        let length = reader.read_pointer(length_address, pointer_size)?;
        let range = self.config.min_version_length..self.config.max_version_length;
        if !range.contains(&length) {
            debug!(
                address = format_args!("{:#x}", length_address),
                length, "implausible version length"
            );
            return Ok(None);
        }
        if let Err(e) = program.create_string_literal(pointer, length) {
            debug!(address = format_args!("{:#x}", pointer), error = %e, "could not create version string");
            return Ok(None);
        }
        program.wait_for_analysis();
        let bytes = program.read_bytes(pointer, length as usize)?;
        let Ok(text) = String::from_utf8(bytes) else {
            debug!(address = format_args!("{:#x}", pointer), "version string is not UTF-8");
            return Ok(None);
        };
        match text.strip_prefix(self.config.version_prefix.as_str()) {
            Some(version) => Ok(Some(version.to_string())),
            None => {
                debug!(candidate = %text, "version string lacks prefix");
                Ok(None)
            }
        }
    }
}

impl RuntimeStringStrategy for Go12Strategy {
    fn name(&self) -> &str {
        "go1.2"
    }

    fn find_install_root<P: Program + ?Sized>(
        &self,
        program: &mut P,
        pointer_size: u8,
    ) -> Result<String> {
        let probe = self.probe_install_root(program, pointer_size)?;
        if probe.pointer == 0 || probe.length == 0 {
            return Err(RecoverError::InvalidInstallRoot {
                pointer: probe.pointer,
                length: probe.length,
            });
        }
        let bytes = program.read_bytes(probe.pointer, probe.length as usize)?;
        let root = decode_lenient(&bytes);
        if root.is_empty() {
            return Err(RecoverError::InvalidInstallRoot {
                pointer: probe.pointer,
                length: probe.length,
            });
        }
        match program.create_string_literal(probe.pointer, probe.length) {
            Ok(()) => program.wait_for_analysis(),
            Err(e) => warn!(
                address = format_args!("{:#x}", probe.pointer),
                error = %e,
                "could not create install-root string"
            ),
        }
        let root = root.replace('\\', "/");
        info!(install_root = %root, encoding = ?probe.encoding, "recovered install root");
        Ok(root)
    }

    fn find_version<P: Program + ?Sized>(&self, program: &mut P, pointer_size: u8) -> Result<String> {
        let function = Self::locate(program, &self.config.version_function)?;
        let chart = program.flow_chart(function).ok_or_else(|| RecoverError::PatternNotMatched {
            function: self.config.version_function.clone(),
            detail: "no flow chart".into(),
        })?;
        debug!(blocks = chart.len(), "scanning scheduler initialization");

        for block in &chart.blocks {
            let mut cursor = block.start_address;
            while cursor < block.end_address {
                let Some(ins) = program.instruction_at(cursor) else {
                    break;
                };
                cursor = ins.end_address();
                if !self.is_version_length_store(&ins) {
                    continue;
                }
                let length_address = ins.operand_value(0).unwrap_or(0);
                debug!(
                    at = format_args!("{:#x}", ins.address),
                    length_address = format_args!("{:#x}", length_address),
                    "version length store"
                );
                match self.try_version_at(program, pointer_size, length_address) {
                    Ok(Some(version)) => {
                        info!(version = %version, "recovered version");
                        return Ok(version);
                    }
                    Ok(None) => {}
                    Err(e) => debug!(error = %e, "version candidate unreadable"),
                }
            }
        }
        Err(RecoverError::PatternNotMatched {
            function: self.config.version_function.clone(),
            detail: "no plausible version length store".into(),
        })
    }
}
