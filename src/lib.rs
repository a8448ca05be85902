//! Kore virtual machine library.
//!
//! Provides the bytecode format, the interpreter, an assembler and the
//! supporting encoding and logging utilities.

pub mod types;
pub mod utils;
pub mod virtual_machine;
