//! Host analysis capabilities and an in-memory host.
//!
//! The decoder talks to its host only through the traits in [`memory`] and
//! [`database`]. [`image::ProgramImage`] implements all of them over plain
//! segments, and [`loader`] builds one from an object file.

pub mod database;
pub mod flow;
pub mod image;
pub mod loader;
pub mod memory;

pub use database::{CodeView, DatabaseError, Program, ProgramDatabase};
pub use image::{ItemKind, ProgramImage};
pub use memory::{ItemSize, MemoryError, MemoryView, SliceMemoryView};
