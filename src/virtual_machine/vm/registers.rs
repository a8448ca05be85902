use super::numeric::Numeric;
use crate::virtual_machine::compiled::REGISTER_CAPACITY;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::value::{ArrayRef, FunctionRef, Value};

/// Register file holding the current frame's values.
///
/// Provides [`REGISTER_CAPACITY`] registers, all starting as `I32(0)`. Call
/// frames save and restore a prefix of the file (the caller's window).
pub(super) struct Registers {
    regs: Vec<Value>,
}

macro_rules! typed_getter {
    ($($(#[$doc:meta])* $fn_name:ident -> $t:ty, $variant:ident, $expected:literal;)*) => {
        $(
            $(#[$doc])*
            pub(super) fn $fn_name(&self, idx: u8, instr: &'static str) -> Result<$t, VMError> {
                match self.get(idx) {
                    Value::$variant(v) => Ok(v),
                    other => Err(type_mismatch(instr, idx, $expected, &other)),
                }
            }
        )*
    };
}

fn type_mismatch(instr: &'static str, idx: u8, expected: &'static str, actual: &Value) -> VMError {
    VMError::TypeMismatch {
        instruction: instr,
        register: idx,
        expected,
        actual: actual.type_name(),
    }
}

impl Registers {
    pub(super) fn new() -> Self {
        Self {
            regs: vec![Value::default(); REGISTER_CAPACITY],
        }
    }

    /// Returns the value in register `idx`.
    pub(super) fn get(&self, idx: u8) -> Value {
        self.regs[idx as usize]
    }

    pub(super) fn set(&mut self, idx: u8, value: Value) {
        self.regs[idx as usize] = value;
    }

    typed_getter! {
        /// Returns the boolean in register `idx` or [`VMError::TypeMismatch`].
        get_bool -> bool, Bool, "Bool";
        /// Returns the i32 in register `idx` or [`VMError::TypeMismatch`].
        get_i32 -> i32, I32, "I32";
        /// Returns the array handle in register `idx` or [`VMError::TypeMismatch`].
        get_array -> ArrayRef, Array, "Array";
        /// Returns the callable in register `idx` or [`VMError::TypeMismatch`].
        get_function -> FunctionRef, Function, "Function";
    }

    /// Reads register `idx` as the numeric type `T`.
    pub(super) fn get_typed<T: Numeric>(&self, idx: u8, instr: &'static str) -> Result<T, VMError> {
        let value = self.get(idx);
        T::from_value(value).ok_or_else(|| type_mismatch(instr, idx, T::TYPE_NAME, &value))
    }

    /// Copies of registers `first .. first + count`.
    pub(super) fn read_range(&self, first: u8, count: usize) -> Vec<Value> {
        let start = first as usize;
        self.regs[start..start + count].to_vec()
    }

    /// Copy of the `len` lowest registers, for a call frame.
    pub(super) fn save_window(&self, len: usize) -> Vec<Value> {
        self.regs[..len.min(REGISTER_CAPACITY)].to_vec()
    }

    /// Writes a saved window back into the lowest registers.
    pub(super) fn restore_window(&mut self, saved: &[Value]) {
        self.regs[..saved.len()].copy_from_slice(saved);
    }

    /// Resets the `len` lowest registers to `I32(0)` and loads `args` into
    /// `r0 ..`.
    pub(super) fn enter_window(&mut self, len: usize, args: &[Value]) {
        let len = len.max(args.len()).min(REGISTER_CAPACITY);
        self.regs[..len].fill(Value::default());
        self.regs[..args.len()].copy_from_slice(args);
    }

    pub(super) fn as_slice(&self) -> &[Value] {
        &self.regs
    }
}
