//! Compiled functions and their register allocation.
//!
//! Code generation drives a [`CompiledObjectBuilder`]: it allocates registers
//! in strict LIFO order, appends instructions and back-patches jumps. Once
//! [`finalize`](CompiledObjectBuilder::finalize) is called the resulting
//! [`CompiledObject`] is immutable.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::instruction::Instruction;
use crate::virtual_machine::isa::{Opcode, OperandKind, Slot};
use kore_derive::BinaryCodec;
use std::fmt;

/// Number of registers a single frame can address.
pub const REGISTER_CAPACITY: usize = 256;

/// Where a function was defined in its source file.
#[derive(Clone, Debug, Default, Eq, PartialEq, BinaryCodec)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Bump allocator over the register file.
///
/// `live` is the top of the stack; `max_used` is the high-water mark and never
/// decreases.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RegisterStack {
    live: u16,
    max_used: u16,
}

impl RegisterStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next free register.
    pub fn allocate(&mut self) -> Result<u8, VMError> {
        if self.live as usize >= REGISTER_CAPACITY {
            return Err(VMError::RegisterOverflow {
                capacity: REGISTER_CAPACITY,
            });
        }
        let reg = self.live as u8;
        self.live += 1;
        self.max_used = self.max_used.max(self.live);
        Ok(reg)
    }

    /// Releases the `count` most recently allocated registers.
    pub fn free(&mut self, count: u16) -> Result<(), VMError> {
        if count > self.live {
            return Err(VMError::RegisterUnderflow {
                requested: count,
                live: self.live,
            });
        }
        self.live -= count;
        Ok(())
    }

    pub fn live(&self) -> u16 {
        self.live
    }

    pub fn max_used(&self) -> u16 {
        self.max_used
    }
}

/// Mutable, in-progress function body.
#[derive(Debug)]
pub struct CompiledObjectBuilder {
    name: String,
    location: SourceLocation,
    param_count: u16,
    local_count: u16,
    instructions: Vec<Instruction>,
    registers: RegisterStack,
}

impl CompiledObjectBuilder {
    pub fn new(name: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            name: name.into(),
            location,
            param_count: 0,
            local_count: 0,
            instructions: Vec::new(),
            registers: RegisterStack::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn allocate_register(&mut self) -> Result<u8, VMError> {
        self.registers.allocate()
    }

    pub fn free_registers(&mut self, count: u16) -> Result<(), VMError> {
        self.registers.free(count)
    }

    pub fn live_registers(&self) -> u16 {
        self.registers.live()
    }

    pub fn max_regs_used(&self) -> u16 {
        self.registers.max_used()
    }

    pub fn set_param_count(&mut self, count: u16) {
        self.param_count = count;
    }

    pub fn set_local_count(&mut self, count: u16) {
        self.local_count = count;
    }

    /// Index the next appended instruction will have.
    pub fn current_pc(&self) -> usize {
        self.instructions.len()
    }

    /// Appends an already encoded instruction and returns its pc.
    pub fn add_instruction(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    /// Encodes `opcode` with operands in assembly order and appends it.
    pub fn emit(&mut self, opcode: Opcode, operands: &[u32]) -> Result<usize, VMError> {
        let instruction = Instruction::from_fields(opcode, operands)?;
        Ok(self.add_instruction(instruction))
    }

    /// Rewrites the target of the jump at `at` to `target`.
    pub fn patch_jump(&mut self, at: usize, target: usize) -> Result<(), VMError> {
        let not_a_jump = |reason: String| VMError::EncodingError {
            mnemonic: "JUMP",
            reason,
        };
        let existing = *self
            .instructions
            .get(at)
            .ok_or_else(|| not_a_jump(format!("no instruction at pc {at}")))?;
        let opcode = existing.decode_opcode()?;
        let Some(spec) = opcode
            .operands()
            .iter()
            .find(|spec| spec.kind == OperandKind::Label)
        else {
            return Err(not_a_jump(format!("{opcode} at pc {at} has no jump target")));
        };
        let target = u32::try_from(target)
            .map_err(|_| not_a_jump(format!("jump target {target} is too large")))?;

        let mut operands = existing.operands(opcode.layout());
        match spec.slot {
            Slot::A => operands.a = target,
            Slot::B => operands.b = target,
            Slot::C => operands.c = target,
        }
        self.instructions[at] = Instruction::encode(opcode, operands)?;
        Ok(())
    }

    /// Freezes the instruction stream and register counts.
    pub fn finalize(self) -> CompiledObject {
        CompiledObject {
            name: self.name,
            location: self.location,
            param_count: self.param_count,
            local_count: self.local_count,
            max_regs_used: self.registers.max_used().max(self.param_count),
            instructions: self.instructions.into_boxed_slice(),
        }
    }
}

/// Finalized bytecode and metadata for one function.
#[derive(Clone, Debug, Eq, PartialEq, BinaryCodec)]
pub struct CompiledObject {
    name: String,
    location: SourceLocation,
    param_count: u16,
    local_count: u16,
    max_regs_used: u16,
    instructions: Box<[Instruction]>,
}

impl CompiledObject {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    pub fn param_count(&self) -> u16 {
        self.param_count
    }

    pub fn local_count(&self) -> u16 {
        self.local_count
    }

    /// Size of the register window this function needs.
    pub fn max_regs_used(&self) -> u16 {
        self.max_regs_used
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn instruction(&self, pc: usize) -> Option<Instruction> {
        self.instructions.get(pc).copied()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Display for CompiledObject {
    /// Listing with one instruction per line, prefixed by its pc.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            ".func {} {} # {} regs, {} locals, {}",
            self.name, self.param_count, self.max_regs_used, self.local_count, self.location
        )?;
        for (pc, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "{pc:>5}  {instruction}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::isa::Layout;

    fn builder() -> CompiledObjectBuilder {
        CompiledObjectBuilder::new("main", SourceLocation::new("test.kasm", 1))
    }

    #[test]
    fn registers_are_allocated_in_order() {
        let mut b = builder();
        assert_eq!(b.allocate_register().unwrap(), 0);
        assert_eq!(b.allocate_register().unwrap(), 1);
        assert_eq!(b.allocate_register().unwrap(), 2);
        assert_eq!(b.live_registers(), 3);
    }

    #[test]
    fn free_restores_live_count_and_keeps_high_water_mark() {
        let mut b = builder();
        b.allocate_register().unwrap();
        let before = b.live_registers();
        for _ in 0..5 {
            b.allocate_register().unwrap();
        }
        b.free_registers(2).unwrap();
        b.free_registers(3).unwrap();
        assert_eq!(b.live_registers(), before);
        assert_eq!(b.max_regs_used(), 6);

        b.allocate_register().unwrap();
        assert_eq!(b.max_regs_used(), 6);
    }

    #[test]
    fn max_regs_used_never_decreases() {
        let mut b = builder();
        let mut last = 0;
        for step in 0..40u16 {
            if step % 3 == 2 {
                b.free_registers(1).unwrap();
            } else {
                b.allocate_register().unwrap();
            }
            assert!(b.max_regs_used() >= last);
            last = b.max_regs_used();
        }
    }

    #[test]
    fn register_257_overflows() {
        let mut b = builder();
        for i in 0..256 {
            assert_eq!(b.allocate_register().unwrap() as usize, i);
        }
        assert!(matches!(
            b.allocate_register(),
            Err(VMError::RegisterOverflow { capacity: 256 })
        ));
    }

    #[test]
    fn over_free_is_rejected() {
        let mut b = builder();
        b.allocate_register().unwrap();
        assert!(matches!(
            b.free_registers(2),
            Err(VMError::RegisterUnderflow { requested: 2, live: 1 })
        ));
    }

    #[test]
    fn jumps_are_back_patched() {
        let mut b = builder();
        let cond = b.allocate_register().unwrap();
        let jump = b.emit(Opcode::JumpIfNot, &[cond as u32, 0]).unwrap();
        b.emit(Opcode::LoadI32, &[0, 1]).unwrap();
        let end = b.current_pc();
        b.patch_jump(jump, end).unwrap();

        let object = b.finalize();
        let patched = object.instruction(jump).unwrap();
        assert_eq!(patched.operands(Layout::Two).imm(), 2);
        assert_eq!(patched.decode_opcode().unwrap(), Opcode::JumpIfNot);
    }

    #[test]
    fn patching_a_non_jump_fails() {
        let mut b = builder();
        let at = b.emit(Opcode::LoadI32, &[0, 1]).unwrap();
        assert!(b.patch_jump(at, 0).is_err());
        assert!(b.patch_jump(99, 0).is_err());
    }

    #[test]
    fn finalize_freezes_counts() {
        let mut b = builder();
        b.set_param_count(2);
        b.set_local_count(1);
        b.allocate_register().unwrap();
        b.emit(Opcode::Ret, &[0]).unwrap();
        let object = b.finalize();
        assert_eq!(object.name(), "main");
        assert_eq!(object.param_count(), 2);
        assert_eq!(object.local_count(), 1);
        // the window must at least hold the parameters
        assert_eq!(object.max_regs_used(), 2);
        assert_eq!(object.len(), 1);
        assert_eq!(object.location().to_string(), "test.kasm:1");
    }
}
