//! Capabilities the recovery needs from the hosting analysis platform.
//!
//! The decoder never touches a global "current database": every phase takes
//! the capabilities it uses as explicit generic bounds. `ProgramDatabase`
//! covers item typing, names, comments, segments, functions and data
//! references; `CodeView` covers single-instruction decoding and flow charts.
//!
//! Hosts run their own background analysis after each mutation. Callers must
//! invoke [`ProgramDatabase::wait_for_analysis`] after creating, typing or
//! renaming an item and before any read that depends on it.

use thiserror::Error;

use crate::analysis::memory::{ItemSize, MemoryView};
use crate::core::control_flow_graph::FlowChart;
use crate::core::instruction::Instruction;
use crate::core::segment::Segment;

/// Errors reported by database mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("address {0:#x} is not mapped")]
    Unmapped(u64),
    #[error("no code can be created at {0:#x}")]
    NotCode(u64),
    #[error("function already exists at {0:#x}")]
    FunctionExists(u64),
    #[error("invalid name {name:?} at {address:#x}")]
    InvalidName { address: u64, name: String },
    #[error("empty item at {0:#x}")]
    Empty(u64),
    #[error("item at {address:#x} conflicts with existing item at {existing:#x}")]
    Conflict { address: u64, existing: u64 },
}

/// Program database operations: typing, naming, functions, references.
pub trait ProgramDatabase: MemoryView {
    /// Undefine items overlapping `[address, address + len)`.
    ///
    /// With `expand` the whole of any item touching the range is removed,
    /// including a function that starts inside it.
    fn delete_items(&mut self, address: u64, len: u64, expand: bool) -> Result<(), DatabaseError>;

    /// Type `address` as a data item of the given width.
    fn create_data(&mut self, address: u64, size: ItemSize) -> Result<(), DatabaseError>;

    /// Type `address` as the start of an instruction.
    fn create_instruction(&mut self, address: u64) -> Result<(), DatabaseError>;

    /// Type `[address, address + len)` as a string literal.
    fn create_string_literal(&mut self, address: u64, len: u64) -> Result<(), DatabaseError>;

    /// Current label at `address`: the explicit name, else a host-generated one.
    fn name_at(&self, address: u64) -> Option<String>;

    /// Name `address`, making the name unique if another address already uses it.
    fn set_name(&mut self, address: u64, name: &str) -> Result<(), DatabaseError>;

    /// Address carrying exactly this name.
    fn address_of_name(&self, name: &str) -> Option<u64>;

    fn set_comment(&mut self, address: u64, comment: &str);

    fn comment_at(&self, address: u64) -> Option<String>;

    fn segments(&self) -> Vec<Segment>;

    fn segment_by_name(&self, name: &str) -> Option<Segment> {
        self.segments().into_iter().find(|s| s.name == name)
    }

    fn segment_at(&self, address: u64) -> Option<Segment> {
        self.segments().into_iter().find(|s| s.contains(address))
    }

    /// Name of the segment containing `address`, without copying its contents.
    fn segment_name_at(&self, address: u64) -> Option<String> {
        self.segment_at(address).map(|s| s.name)
    }

    /// Start addresses of all known functions, ascending.
    fn functions(&self) -> Vec<u64>;

    /// Start of the function whose body contains `address`.
    fn function_containing(&self, address: u64) -> Option<u64>;

    /// Establish a function boundary at `address`.
    fn create_function(&mut self, address: u64) -> Result<(), DatabaseError>;

    /// Start of the function currently named `name`.
    fn function_by_name(&self, name: &str) -> Option<u64> {
        self.functions()
            .into_iter()
            .find(|&f| self.name_at(f).as_deref() == Some(name))
    }

    /// Data (non-code) references into `address`, ascending by source.
    fn data_refs_to(&self, address: u64) -> Vec<u64>;

    /// Record a data reference `from -> to`.
    fn add_data_ref(&mut self, from: u64, to: u64);

    /// Block until the host's asynchronous analysis queue is empty.
    fn wait_for_analysis(&mut self);
}

/// Code inspection: single-instruction decode and per-function flow charts.
pub trait CodeView {
    fn instruction_at(&self, address: u64) -> Option<Instruction>;

    /// Flow chart of the function starting at `function_start`.
    fn flow_chart(&self, function_start: u64) -> Option<FlowChart>;
}

/// Everything the full recovery pipeline needs from its host.
pub trait Program: ProgramDatabase + CodeView {}

impl<T: ProgramDatabase + CodeView> Program for T {}
