//! Packing and unpacking of 32-bit instruction words.
//!
//! Encoding validates operand widths against the opcode's [`Layout`]; decoding
//! is total, so any word yields some field values and the interpreter decides
//! whether they make sense.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Layout, Opcode, OperandKind, Slot};
use kore_derive::BinaryCodec;
use std::fmt;

const OPCODE_SHIFT: u32 = 24;
const A_SHIFT: u32 = 16;
const B3_SHIFT: u32 = 8;

/// Unpacked operand fields of one instruction.
///
/// Fields a layout does not use are zero.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Operands {
    pub a: u32,
    pub b: u32,
    pub c: u32,
}

impl Operands {
    pub const fn new(a: u32, b: u32, c: u32) -> Self {
        Self { a, b, c }
    }

    pub const fn get(&self, slot: Slot) -> u32 {
        match slot {
            Slot::A => self.a,
            Slot::B => self.b,
            Slot::C => self.c,
        }
    }

    fn set(&mut self, slot: Slot, value: u32) {
        match slot {
            Slot::A => self.a = value,
            Slot::B => self.b = value,
            Slot::C => self.c = value,
        }
    }

    pub const fn ra(&self) -> u8 {
        self.a as u8
    }

    pub const fn rb(&self) -> u8 {
        self.b as u8
    }

    pub const fn rc(&self) -> u8 {
        self.c as u8
    }

    /// Field `b` of a two-operand instruction as an unsigned index.
    pub const fn imm(&self) -> u16 {
        self.b as u16
    }

    /// Field `b` of a two-operand instruction as a signed immediate.
    pub const fn simm(&self) -> i16 {
        self.b as u16 as i16
    }
}

/// One encoded VM instruction.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, BinaryCodec)]
pub struct Instruction(u32);

impl Instruction {
    /// Packs `operands` with the layout of `opcode`.
    ///
    /// Fails with [`VMError::EncodingError`] if a field exceeds its width or a
    /// field the layout does not have is non-zero.
    pub fn encode(opcode: Opcode, operands: Operands) -> Result<Self, VMError> {
        let layout = opcode.layout();
        let mut word = (opcode as u32) << OPCODE_SHIFT;
        for (slot, value) in [
            (Slot::A, operands.a),
            (Slot::B, operands.b),
            (Slot::C, operands.c),
        ] {
            match layout.field_max(slot) {
                Some(max) if value <= max => {}
                Some(max) => {
                    return Err(VMError::EncodingError {
                        mnemonic: opcode.mnemonic(),
                        reason: format!("operand {value} in field {slot:?} exceeds {max}"),
                    });
                }
                None if value == 0 => continue,
                None => {
                    return Err(VMError::EncodingError {
                        mnemonic: opcode.mnemonic(),
                        reason: format!("{layout:?} layout has no field {slot:?}"),
                    });
                }
            }
            word |= value << field_shift(layout, slot);
        }
        Ok(Instruction(word))
    }

    /// Encodes a one-operand instruction.
    pub fn encode1(opcode: Opcode, a: u32) -> Result<Self, VMError> {
        Self::expect_layout(opcode, Layout::One)?;
        Self::encode(opcode, Operands::new(a, 0, 0))
    }

    /// Encodes a two-operand instruction.
    pub fn encode2(opcode: Opcode, a: u32, b: u32) -> Result<Self, VMError> {
        Self::expect_layout(opcode, Layout::Two)?;
        Self::encode(opcode, Operands::new(a, b, 0))
    }

    /// Encodes a three-operand instruction.
    pub fn encode3(opcode: Opcode, a: u32, b: u32, c: u32) -> Result<Self, VMError> {
        Self::expect_layout(opcode, Layout::Three)?;
        Self::encode(opcode, Operands::new(a, b, c))
    }

    fn expect_layout(opcode: Opcode, layout: Layout) -> Result<(), VMError> {
        if opcode.layout() == layout {
            return Ok(());
        }
        Err(VMError::EncodingError {
            mnemonic: opcode.mnemonic(),
            reason: format!("uses the {:?} layout, not {layout:?}", opcode.layout()),
        })
    }

    /// Wraps a raw word without validation.
    pub const fn from_raw(word: u32) -> Self {
        Instruction(word)
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Top 8 bits, whether or not they name an opcode.
    pub const fn opcode_byte(&self) -> u8 {
        (self.0 >> OPCODE_SHIFT) as u8
    }

    pub fn decode_opcode(&self) -> Result<Opcode, VMError> {
        Opcode::try_from(self.opcode_byte())
    }

    /// Operand of a one-operand instruction.
    pub const fn decode_address1(&self) -> u8 {
        self.0 as u8
    }

    /// `(destination, imm16)` of a two-operand instruction.
    pub const fn decode_address2(&self) -> (u8, u16) {
        ((self.0 >> A_SHIFT) as u8, self.0 as u16)
    }

    /// `(destination, source1, source2)` of a three-operand instruction.
    pub const fn decode_address3(&self) -> (u8, u8, u8) {
        (
            (self.0 >> A_SHIFT) as u8,
            (self.0 >> B3_SHIFT) as u8,
            self.0 as u8,
        )
    }

    /// Unpacks the fields selected by `layout`.
    pub const fn operands(&self, layout: Layout) -> Operands {
        match layout {
            Layout::One => Operands::new(self.decode_address1() as u32, 0, 0),
            Layout::Two => {
                let (a, b) = self.decode_address2();
                Operands::new(a as u32, b as u32, 0)
            }
            Layout::Three => {
                let (a, b, c) = self.decode_address3();
                Operands::new(a as u32, b as u32, c as u32)
            }
        }
    }

    /// Builds an instruction from per-operand values listed in assembly order.
    pub fn from_fields(opcode: Opcode, values: &[u32]) -> Result<Self, VMError> {
        let specs = opcode.operands();
        if specs.len() != values.len() {
            return Err(VMError::EncodingError {
                mnemonic: opcode.mnemonic(),
                reason: format!("expected {} operands, got {}", specs.len(), values.len()),
            });
        }
        let mut operands = Operands::default();
        for (spec, value) in specs.iter().zip(values) {
            operands.set(spec.slot, *value);
        }
        Self::encode(opcode, operands)
    }
}

fn field_shift(layout: Layout, slot: Slot) -> u32 {
    match (layout, slot) {
        (Layout::One, _) => 0,
        (_, Slot::A) => A_SHIFT,
        (Layout::Two, _) => 0,
        (Layout::Three, Slot::B) => B3_SHIFT,
        (Layout::Three, Slot::C) => 0,
    }
}

impl fmt::Display for Instruction {
    /// Disassembles the word, e.g. `ADD_I32 r2, r0, r1`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(opcode) = self.decode_opcode() else {
            return write!(f, ".word 0x{:08x}", self.0);
        };
        let operands = self.operands(opcode.layout());
        write!(f, "{}", opcode.mnemonic())?;
        for (i, spec) in opcode.operands().iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            let value = operands.get(spec.slot);
            match spec.kind {
                OperandKind::Reg => write!(f, "r{value}")?,
                OperandKind::Bool => write!(f, "{}", value != 0)?,
                OperandKind::SImm16 => write!(f, "{}", value as u16 as i16)?,
                OperandKind::Label => write!(f, "@{value}")?,
                OperandKind::Func => write!(f, "fn#{value}")?,
                OperandKind::Slot => write!(f, "g{value}")?,
                OperandKind::ConstI32
                | OperandKind::ConstI64
                | OperandKind::ConstF32
                | OperandKind::ConstF64
                | OperandKind::Str => write!(f, "k{value}")?,
            }
        }
        Ok(())
    }
}
