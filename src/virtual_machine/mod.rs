//! Register-based bytecode virtual machine.
//!
//! The VM executes modules produced by a compiler front end (or by the
//! textual [`assembler`]) and keeps typed values in a fixed register file.
//!
//! # Architecture
//!
//! - **Registers**: 256 registers per frame holding tagged [`value::Value`]s
//!   (`Bool`, `I32`, `I64`, `F32`, `F64`, `Array`, `Function`)
//! - **Instruction format**: fixed 32-bit words; the top byte is the opcode
//!   and selects one of three operand layouts
//! - **Execution model**: typed arithmetic and comparison, branching,
//!   calls with saved register windows, globals and heap arrays
//! - **Heap**: reference-counted arrays behind generational handles
//!
//! # Program model
//!
//! - [`compiled::CompiledObject`]: one function's instructions and register usage
//! - [`program::Module`]: functions, typed constant tables and globals
//!
//! # Modules
//!
//! - [`assembler`]: Assembly parsing, diagnostics, and module generation
//! - [`compiled`]: Register allocation and compiled functions
//! - [`errors`]: Assembly and execution error types
//! - [`heap`]: Array storage and reference counting
//! - [`instruction`]: Instruction word packing and disassembly
//! - [`isa`]: Instruction set definition and opcode mappings
//! - [`program`]: Modules, constant tables and the persisted format
//! - [`value`]: Runtime values
//! - [`vm`]: The interpreter

pub mod assembler;
pub mod compiled;
pub mod errors;
pub mod heap;
pub mod instruction;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod program;
pub mod value;
pub mod vm;
