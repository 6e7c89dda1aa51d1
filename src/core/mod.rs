//! Core data types shared by the host capability traits and the decoder.
//!
//! Addresses are plain virtual addresses (`u64`); the only image model the
//! recovery needs is segments, decoded instructions and per-function flow
//! charts.

pub mod basic_block;
pub mod control_flow_graph;
pub mod disassembler;
pub mod instruction;
pub mod segment;
pub mod string_literal;

pub use basic_block::{BasicBlock, BlockKind};
pub use control_flow_graph::FlowChart;
pub use instruction::{Instruction, Operand, OperandKind};
pub use segment::{Perms, Segment};
pub use string_literal::StringLiteral;
