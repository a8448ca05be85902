//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical opcode table and invokes a callback macro for code generation, so
//! the opcode enum, the assembler and the ISA fingerprint test all read the
//! same definitions.
//!
//! This module generates:
//! - The [`Opcode`] enum with its byte values
//! - `TryFrom<u8>` for decoding opcodes
//! - Per-opcode mnemonic, [`Layout`] and operand descriptions
//!
//! # Instruction Format
//!
//! Every instruction is one 32-bit word. The opcode occupies bits 31..24 and
//! selects exactly one layout for the remaining 24 bits:
//!
//! | layout  | a        | b        | c      |
//! |---------|----------|----------|--------|
//! | `One`   | 7..0     | -        | -      |
//! | `Two`   | 23..16   | 15..0    | -      |
//! | `Three` | 23..16   | 15..8    | 7..0   |
//!
//! See [`instruction`](super::instruction) for packing and unpacking.

use crate::virtual_machine::errors::VMError;
use std::fmt;

/// Invokes a callback macro with the complete instruction definition list.
///
/// Each entry reads `Name = opcode, "MNEMONIC", Layout => [field: Kind @ slot]`.
/// Fields are listed in assembly operand order; `slot` names the bit field
/// (`A`, `B` or `C`) the operand is packed into.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Loads
            // =========================
            /// LOAD_BOOL rd, true|false ; rd = bool
            LoadBool = 0x01, "LOAD_BOOL", Two => [rd: Reg @ A, value: Bool @ B],
            /// LOAD_I32 rd, imm16 ; rd = I32(sign-extended imm16)
            LoadI32 = 0x02, "LOAD_I32", Two => [rd: Reg @ A, imm: SImm16 @ B],
            /// LOAD_I64 rd, imm16 ; rd = I64(sign-extended imm16)
            LoadI64 = 0x03, "LOAD_I64", Two => [rd: Reg @ A, imm: SImm16 @ B],
            /// LOAD_CONST_I32 rd, k ; rd = i32 constant k
            LoadConstI32 = 0x04, "LOAD_CONST_I32", Two => [rd: Reg @ A, constant: ConstI32 @ B],
            /// LOAD_CONST_I64 rd, k ; rd = i64 constant k
            LoadConstI64 = 0x05, "LOAD_CONST_I64", Two => [rd: Reg @ A, constant: ConstI64 @ B],
            /// LOAD_CONST_F32 rd, k ; rd = f32 constant k
            LoadConstF32 = 0x06, "LOAD_CONST_F32", Two => [rd: Reg @ A, constant: ConstF32 @ B],
            /// LOAD_CONST_F64 rd, k ; rd = f64 constant k
            LoadConstF64 = 0x07, "LOAD_CONST_F64", Two => [rd: Reg @ A, constant: ConstF64 @ B],
            /// LOAD_FUNCTION rd, fn ; rd = compiled function fn
            LoadFunction = 0x08, "LOAD_FUNCTION", Two => [rd: Reg @ A, function: Func @ B],
            /// LOAD_NATIVE rd, "name" ; rd = native function named by string constant
            LoadNative = 0x09, "LOAD_NATIVE", Two => [rd: Reg @ A, name: Str @ B],
            /// LOAD_GLOBAL rd, slot ; rd = globals[slot]
            LoadGlobal = 0x0A, "LOAD_GLOBAL", Two => [rd: Reg @ A, slot: Slot @ B],
            /// STORE_GLOBAL rs, slot ; globals[slot] = rs
            StoreGlobal = 0x0B, "STORE_GLOBAL", Two => [rs: Reg @ A, slot: Slot @ B],
            // =========================
            // Moves / casts
            // =========================
            /// MOVE rd, rs ; rd = rs
            Move = 0x10, "MOVE", Three => [rd: Reg @ A, rs: Reg @ B],
            /// I32_TO_I64 rd, rs ; rd = rs as i64
            I32ToI64 = 0x11, "I32_TO_I64", Three => [rd: Reg @ A, rs: Reg @ B],
            /// I64_TO_I32 rd, rs ; rd = rs as i32 (truncating)
            I64ToI32 = 0x12, "I64_TO_I32", Three => [rd: Reg @ A, rs: Reg @ B],
            /// I32_TO_F64 rd, rs ; rd = rs as f64
            I32ToF64 = 0x13, "I32_TO_F64", Three => [rd: Reg @ A, rs: Reg @ B],
            /// F64_TO_I32 rd, rs ; rd = rs as i32 (saturating, NaN = 0)
            F64ToI32 = 0x14, "F64_TO_I32", Three => [rd: Reg @ A, rs: Reg @ B],
            /// I64_TO_F64 rd, rs ; rd = rs as f64
            I64ToF64 = 0x15, "I64_TO_F64", Three => [rd: Reg @ A, rs: Reg @ B],
            /// F64_TO_I64 rd, rs ; rd = rs as i64 (saturating, NaN = 0)
            F64ToI64 = 0x16, "F64_TO_I64", Three => [rd: Reg @ A, rs: Reg @ B],
            /// F32_TO_F64 rd, rs ; rd = rs as f64
            F32ToF64 = 0x17, "F32_TO_F64", Three => [rd: Reg @ A, rs: Reg @ B],
            /// F64_TO_F32 rd, rs ; rd = rs as f32
            F64ToF32 = 0x18, "F64_TO_F32", Three => [rd: Reg @ A, rs: Reg @ B],
            // =========================
            // I32 arithmetic
            // =========================
            /// ADD_I32 rd, rs1, rs2 ; rd = rs1 + rs2 (wrapping)
            AddI32 = 0x20, "ADD_I32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// SUB_I32 rd, rs1, rs2 ; rd = rs1 - rs2 (wrapping)
            SubI32 = 0x21, "SUB_I32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// MULT_I32 rd, rs1, rs2 ; rd = rs1 * rs2 (wrapping)
            MultI32 = 0x22, "MULT_I32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// POW_I32 rd, rs1, rs2 ; rd = rs1 ^ rs2 (wrapping)
            PowI32 = 0x23, "POW_I32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// DIV_I32 rd, rs1, rs2 ; rd = rs1 / rs2 (trap on division by zero)
            DivI32 = 0x24, "DIV_I32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// NEG_I32 rd, rs ; rd = -rs (wrapping)
            NegI32 = 0x25, "NEG_I32", Three => [rd: Reg @ A, rs: Reg @ B],
            // =========================
            // I64 arithmetic
            // =========================
            /// ADD_I64 rd, rs1, rs2 ; rd = rs1 + rs2 (wrapping)
            AddI64 = 0x28, "ADD_I64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// SUB_I64 rd, rs1, rs2 ; rd = rs1 - rs2 (wrapping)
            SubI64 = 0x29, "SUB_I64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// MULT_I64 rd, rs1, rs2 ; rd = rs1 * rs2 (wrapping)
            MultI64 = 0x2A, "MULT_I64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// POW_I64 rd, rs1, rs2 ; rd = rs1 ^ rs2 (wrapping)
            PowI64 = 0x2B, "POW_I64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// DIV_I64 rd, rs1, rs2 ; rd = rs1 / rs2 (trap on division by zero)
            DivI64 = 0x2C, "DIV_I64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// NEG_I64 rd, rs ; rd = -rs (wrapping)
            NegI64 = 0x2D, "NEG_I64", Three => [rd: Reg @ A, rs: Reg @ B],
            // =========================
            // F32 arithmetic
            // =========================
            /// ADD_F32 rd, rs1, rs2 ; rd = rs1 + rs2
            AddF32 = 0x30, "ADD_F32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// SUB_F32 rd, rs1, rs2 ; rd = rs1 - rs2
            SubF32 = 0x31, "SUB_F32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// MULT_F32 rd, rs1, rs2 ; rd = rs1 * rs2
            MultF32 = 0x32, "MULT_F32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// POW_F32 rd, rs1, rs2 ; rd = rs1 ^ rs2
            PowF32 = 0x33, "POW_F32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// DIV_F32 rd, rs1, rs2 ; rd = rs1 / rs2
            DivF32 = 0x34, "DIV_F32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// NEG_F32 rd, rs ; rd = -rs
            NegF32 = 0x35, "NEG_F32", Three => [rd: Reg @ A, rs: Reg @ B],
            // =========================
            // F64 arithmetic
            // =========================
            /// ADD_F64 rd, rs1, rs2 ; rd = rs1 + rs2
            AddF64 = 0x38, "ADD_F64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// SUB_F64 rd, rs1, rs2 ; rd = rs1 - rs2
            SubF64 = 0x39, "SUB_F64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// MULT_F64 rd, rs1, rs2 ; rd = rs1 * rs2
            MultF64 = 0x3A, "MULT_F64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// POW_F64 rd, rs1, rs2 ; rd = rs1 ^ rs2
            PowF64 = 0x3B, "POW_F64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// DIV_F64 rd, rs1, rs2 ; rd = rs1 / rs2
            DivF64 = 0x3C, "DIV_F64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// NEG_F64 rd, rs ; rd = -rs
            NegF64 = 0x3D, "NEG_F64", Three => [rd: Reg @ A, rs: Reg @ B],
            // =========================
            // I32 comparison
            // =========================
            /// LT_I32 rd, rs1, rs2 ; rd = (rs1 < rs2)
            LtI32 = 0x40, "LT_I32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// LE_I32 rd, rs1, rs2 ; rd = (rs1 <= rs2)
            LeI32 = 0x41, "LE_I32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// GT_I32 rd, rs1, rs2 ; rd = (rs1 > rs2)
            GtI32 = 0x42, "GT_I32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// GE_I32 rd, rs1, rs2 ; rd = (rs1 >= rs2)
            GeI32 = 0x43, "GE_I32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// EQ_I32 rd, rs1, rs2 ; rd = (rs1 == rs2)
            EqI32 = 0x44, "EQ_I32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// NEQ_I32 rd, rs1, rs2 ; rd = (rs1 != rs2)
            NeqI32 = 0x45, "NEQ_I32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            // =========================
            // I64 comparison
            // =========================
            /// LT_I64 rd, rs1, rs2 ; rd = (rs1 < rs2)
            LtI64 = 0x48, "LT_I64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// LE_I64 rd, rs1, rs2 ; rd = (rs1 <= rs2)
            LeI64 = 0x49, "LE_I64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// GT_I64 rd, rs1, rs2 ; rd = (rs1 > rs2)
            GtI64 = 0x4A, "GT_I64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// GE_I64 rd, rs1, rs2 ; rd = (rs1 >= rs2)
            GeI64 = 0x4B, "GE_I64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// EQ_I64 rd, rs1, rs2 ; rd = (rs1 == rs2)
            EqI64 = 0x4C, "EQ_I64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// NEQ_I64 rd, rs1, rs2 ; rd = (rs1 != rs2)
            NeqI64 = 0x4D, "NEQ_I64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            // =========================
            // F32 comparison
            // =========================
            /// LT_F32 rd, rs1, rs2 ; rd = (rs1 < rs2)
            LtF32 = 0x50, "LT_F32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// LE_F32 rd, rs1, rs2 ; rd = (rs1 <= rs2)
            LeF32 = 0x51, "LE_F32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// GT_F32 rd, rs1, rs2 ; rd = (rs1 > rs2)
            GtF32 = 0x52, "GT_F32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// GE_F32 rd, rs1, rs2 ; rd = (rs1 >= rs2)
            GeF32 = 0x53, "GE_F32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// EQ_F32 rd, rs1, rs2 ; rd = (rs1 == rs2)
            EqF32 = 0x54, "EQ_F32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// NEQ_F32 rd, rs1, rs2 ; rd = (rs1 != rs2)
            NeqF32 = 0x55, "NEQ_F32", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            // =========================
            // F64 comparison
            // =========================
            /// LT_F64 rd, rs1, rs2 ; rd = (rs1 < rs2)
            LtF64 = 0x58, "LT_F64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// LE_F64 rd, rs1, rs2 ; rd = (rs1 <= rs2)
            LeF64 = 0x59, "LE_F64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// GT_F64 rd, rs1, rs2 ; rd = (rs1 > rs2)
            GtF64 = 0x5A, "GT_F64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// GE_F64 rd, rs1, rs2 ; rd = (rs1 >= rs2)
            GeF64 = 0x5B, "GE_F64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// EQ_F64 rd, rs1, rs2 ; rd = (rs1 == rs2)
            EqF64 = 0x5C, "EQ_F64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// NEQ_F64 rd, rs1, rs2 ; rd = (rs1 != rs2)
            NeqF64 = 0x5D, "NEQ_F64", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            // =========================
            // Boolean
            // =========================
            /// NOT rd, rs ; rd = !rs
            Not = 0x60, "NOT", Three => [rd: Reg @ A, rs: Reg @ B],
            /// AND rd, rs1, rs2 ; rd = rs1 && rs2
            And = 0x61, "AND", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// OR rd, rs1, rs2 ; rd = rs1 || rs2
            Or = 0x62, "OR", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// EQ_BOOL rd, rs1, rs2 ; rd = (rs1 == rs2)
            EqBool = 0x63, "EQ_BOOL", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            /// NEQ_BOOL rd, rs1, rs2 ; rd = (rs1 != rs2)
            NeqBool = 0x64, "NEQ_BOOL", Three => [rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C],
            // =========================
            // Arrays
            // =========================
            /// NEW_ARRAY rd, rlen, rfill ; rd = array of I32 length rlen filled with rfill
            NewArray = 0x70, "NEW_ARRAY", Three => [rd: Reg @ A, len: Reg @ B, fill: Reg @ C],
            /// ARRAY_GET rd, rarr, ridx ; rd = rarr[ridx]
            ArrayGet = 0x71, "ARRAY_GET", Three => [rd: Reg @ A, array: Reg @ B, index: Reg @ C],
            /// ARRAY_SET rarr, ridx, rs ; rarr[ridx] = rs
            ArraySet = 0x72, "ARRAY_SET", Three => [array: Reg @ A, index: Reg @ B, rs: Reg @ C],
            /// ARRAY_LEN rd, rarr ; rd = I32(len(rarr))
            ArrayLen = 0x73, "ARRAY_LEN", Three => [rd: Reg @ A, array: Reg @ B],
            // =========================
            // Memory
            // =========================
            /// REF_INC rarr ; refcount(rarr) += 1
            RefInc = 0x80, "REF_INC", One => [array: Reg @ A],
            /// REF_DEC rarr ; refcount(rarr) -= 1
            RefDec = 0x81, "REF_DEC", One => [array: Reg @ A],
            /// DESTROY rarr ; free a function-local array regardless of refcount
            Destroy = 0x82, "DESTROY", One => [array: Reg @ A],
            /// FREE rarr ; free an array whose refcount has dropped to zero
            Free = 0x83, "FREE", One => [array: Reg @ A],
            // =========================
            // Control Flow
            // =========================
            /// JUMP target ; pc = target
            Jump = 0x90, "JUMP", Two => [target: Label @ B],
            /// JUMP_IF rc, target ; if rc then pc = target
            JumpIf = 0x91, "JUMP_IF", Two => [cond: Reg @ A, target: Label @ B],
            /// JUMP_IF_NOT rc, target ; if !rc then pc = target
            JumpIfNot = 0x92, "JUMP_IF_NOT", Two => [cond: Reg @ A, target: Label @ B],
            /// CALL rd, rfn, rargs ; rd = rfn(rargs, rargs+1, ...)
            Call = 0x93, "CALL", Three => [rd: Reg @ A, callee: Reg @ B, args: Reg @ C],
            /// RET rs ; return rs to the caller, or halt at top level
            Ret = 0x94, "RET", One => [rs: Reg @ A],
        }
    };
}

/// Bit-field arrangement of the 24 operand bits of an instruction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Layout {
    /// `a` = bits 7..0.
    One,
    /// `a` = bits 23..16, `b` = bits 15..0.
    Two,
    /// `a` = bits 23..16, `b` = bits 15..8, `c` = bits 7..0.
    Three,
}

impl Layout {
    /// Largest value the given field can hold, or `None` if the layout has no
    /// such field.
    pub const fn field_max(&self, slot: Slot) -> Option<u32> {
        match (self, slot) {
            (Layout::One, Slot::A) => Some(u8::MAX as u32),
            (Layout::Two, Slot::A) => Some(u8::MAX as u32),
            (Layout::Two, Slot::B) => Some(u16::MAX as u32),
            (Layout::Three, _) => Some(u8::MAX as u32),
            _ => None,
        }
    }
}

/// Operand bit field.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Slot {
    A,
    B,
    C,
}

/// How an operand is written in assembly and interpreted by the VM.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// Register index `rN`.
    Reg,
    /// `true` / `false`.
    Bool,
    /// Signed 16-bit immediate, stored as its two's complement bits.
    SImm16,
    /// Index into the i32 constant table.
    ConstI32,
    /// Index into the i64 constant table.
    ConstI64,
    /// Index into the f32 constant table.
    ConstF32,
    /// Index into the f64 constant table.
    ConstF64,
    /// Index into the string constant table.
    Str,
    /// Index of a compiled function in the module.
    Func,
    /// Global variable slot.
    Slot,
    /// Absolute instruction index within the current function.
    Label,
}

/// One operand of an instruction: its assembly name, kind and bit field.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OperandSpec {
    pub name: &'static str,
    pub kind: OperandKind,
    pub slot: Slot,
}

/// Numeric element type an arithmetic or comparison opcode operates on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NumType {
    I32,
    I64,
    F32,
    F64,
}

/// Operation performed by an arithmetic or comparison opcode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NumericOp {
    Add,
    Sub,
    Mult,
    Pow,
    Div,
    Neg,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Neq,
}

impl NumericOp {
    /// True if the result is a `Bool` rather than the operand type.
    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            NumericOp::Lt | NumericOp::Le | NumericOp::Gt | NumericOp::Ge | NumericOp::Eq | NumericOp::Neq
        )
    }
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal, $layout:ident => [
                $( $field:ident : $kind:ident @ $slot:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        /// VM operation selector stored in the top byte of an instruction.
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Opcode {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Opcode::$name), )*
                    _ => Err(VMError::UnknownOpcode { opcode: value }),
                }
            }
        }

        impl Opcode {
            /// Every opcode, in table order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the operand layout this opcode is encoded with.
            pub const fn layout(&self) -> Layout {
                match self {
                    $( Opcode::$name => Layout::$layout, )*
                }
            }

            /// Returns the operands in assembly order.
            pub const fn operands(&self) -> &'static [OperandSpec] {
                match self {
                    $(
                        Opcode::$name => &[
                            $( OperandSpec {
                                name: stringify!($field),
                                kind: OperandKind::$kind,
                                slot: Slot::$slot,
                            }, )*
                        ],
                    )*
                }
            }

            /// Looks an opcode up by its assembly mnemonic.
            pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
                match mnemonic {
                    $( $mnemonic => Some(Opcode::$name), )*
                    _ => None,
                }
            }
        }
    };
}

for_each_instruction!(define_instructions);

impl Opcode {
    /// Classifies the typed arithmetic and comparison opcodes.
    ///
    /// Each numeric group spans eight opcode values: the high nibble plus bit 3
    /// select the type, the low three bits select the operation.
    pub fn numeric_class(&self) -> Option<(NumericOp, NumType)> {
        let byte = *self as u8;
        let (ops, base): (&[NumericOp], u8) = match byte {
            0x20..=0x3F => (
                &[
                    NumericOp::Add,
                    NumericOp::Sub,
                    NumericOp::Mult,
                    NumericOp::Pow,
                    NumericOp::Div,
                    NumericOp::Neg,
                ],
                0x20,
            ),
            0x40..=0x5F => (
                &[
                    NumericOp::Lt,
                    NumericOp::Le,
                    NumericOp::Gt,
                    NumericOp::Ge,
                    NumericOp::Eq,
                    NumericOp::Neq,
                ],
                0x40,
            ),
            _ => return None,
        };
        let offset = byte - base;
        let ty = match offset / 8 {
            0 => NumType::I32,
            1 => NumType::I64,
            2 => NumType::F32,
            _ => NumType::F64,
        };
        let index = (offset % 8) as usize;
        if index >= ops.len() {
            return None;
        }
        Some((ops[index], ty))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
