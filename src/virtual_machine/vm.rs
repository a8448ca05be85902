//! The fetch-decode-execute loop.
//!
//! An [`Interpreter`] owns a fixed register file, a [`Heap`], the global slots
//! and the call stack. It executes a [`Module`] one instruction at a time:
//! fetch the word at `pc`, advance `pc`, decode the opcode and dispatch. Any
//! error stops execution and is recorded as a [`Fault`]; registers and heap
//! stay inspectable afterwards.

mod context;
mod natives;
mod numeric;
mod registers;

#[cfg(test)]
mod tests;

pub use context::{DEFAULT_MAX_CALL_DEPTH, InterpreterConfig};

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::heap::Heap;
use crate::virtual_machine::instruction::{Instruction, Operands};
use crate::virtual_machine::isa::{NumType, NumericOp, Opcode, Slot};
use crate::virtual_machine::program::Module;
use crate::virtual_machine::value::{FunctionRef, NativeFunction, Value};
use context::CallFrame;
use numeric::Numeric;
use registers::Registers;
use std::fmt;

/// Runtime fault: the error plus where it happened.
#[derive(Clone, Debug, PartialEq)]
pub struct Fault {
    pub error: VMError,
    /// pc of the instruction that failed.
    pub pc: usize,
    /// Name of the function executing when the fault occurred.
    pub function: String,
    /// The failing instruction, if one was fetched.
    pub instruction: Option<Instruction>,
}

impl Fault {
    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at pc {} in {}", self.kind(), self.pc, self.function)?;
        if let Some(instruction) = &self.instruction {
            write!(f, " ({instruction})")?;
        }
        write!(f, ": {}", self.error)
    }
}

impl std::error::Error for Fault {}

/// Lifecycle of an interpreter run.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecState {
    Ready,
    Running,
    Halted,
    Faulted(Fault),
}

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        module = $module:ident,
        opcode = $opcode:ident,
        operands = $ops:ident,
        numeric = $numeric:ident,
        { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
    ) => {{
        let instr_name = $opcode.mnemonic();
        match $opcode {
            $(
                Opcode::$variant => exec_vm!(@call $vm, $module, $ops, instr_name, $handler, $args),
            )*
            // Typed arithmetic and comparison go through one generic handler.
            _ => match $opcode.numeric_class() {
                Some((op, ty)) => $vm.$numeric(instr_name, op, ty, $ops),
                None => Err(VMError::UnknownOpcode { opcode: $opcode as u8 }),
            },
        }
    }};

    // Handler that reads the module (semicolon separator)
    (@call $vm:ident, $module:ident, $ops:ident, $instr_name:expr, $handler:ident,
        (module; $( $field:ident : $kind:ident @ $slot:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $ops, $kind, $slot); )*
        $vm.$handler($instr_name, $module, $( $field ),*)
    }};

    // Handler without module access
    (@call $vm:ident, $module:ident, $ops:ident, $instr_name:expr, $handler:ident,
        ( $( $field:ident : $kind:ident @ $slot:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $ops, $kind, $slot); )*
        $vm.$handler($instr_name, $( $field ),*)
    }};

    (@read $ops:ident, Reg, $slot:ident) => { $ops.get(Slot::$slot) as u8 };
    (@read $ops:ident, Bool, $slot:ident) => { $ops.get(Slot::$slot) != 0 };
    (@read $ops:ident, SImm16, $slot:ident) => { $ops.get(Slot::$slot) as u16 as i16 };
    (@read $ops:ident, Index, $slot:ident) => { $ops.get(Slot::$slot) as u16 };
}

/// Bytecode interpreter.
///
/// Executes one [`Module`] function at a time, starting at pc 0, until a
/// top-level `RET`, the end of the entry function, or a fault.
pub struct Interpreter {
    config: InterpreterConfig,
    /// Register file (256 registers).
    registers: Registers,
    heap: Heap,
    globals: Vec<Value>,
    /// Call stack for function calls.
    frames: Vec<CallFrame>,
    /// Index of the executing function in the module.
    function: u16,
    /// Function the current run started in.
    entry: u16,
    /// Index of the next instruction to fetch.
    pc: usize,
    state: ExecState,
    return_value: Option<Value>,
    /// Instructions executed by the current run.
    executed: u64,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(InterpreterConfig::default())
    }
}

impl Interpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        Self {
            heap: Heap::new(config.heap_limit),
            config,
            registers: Registers::new(),
            globals: Vec::new(),
            frames: Vec::new(),
            function: 0,
            entry: 0,
            pc: 0,
            state: ExecState::Ready,
            return_value: None,
            executed: 0,
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn state(&self) -> &ExecState {
        &self.state
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Index of the function that is (or was last) executing.
    pub fn current_function(&self) -> u16 {
        self.function
    }

    /// Index of the function the current (or last) run started in.
    pub fn entry_function(&self) -> u16 {
        self.entry
    }

    pub fn registers(&self) -> &[Value] {
        self.registers.as_slice()
    }

    /// Register window of the entry function.
    ///
    /// While calls are pending (a fault inside a callee, or a paused step),
    /// the entry window lives in the outermost frame; otherwise it is the
    /// live register file.
    pub fn entry_registers(&self) -> &[Value] {
        match self.frames.first() {
            Some(frame) => &frame.saved,
            None => self.registers.as_slice(),
        }
    }

    pub fn register(&self, idx: u8) -> Value {
        self.registers.get(idx)
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    /// Value passed to the top-level `RET`, if the last run returned one.
    pub fn return_value(&self) -> Option<Value> {
        self.return_value
    }

    /// Instructions executed by the current run.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Runs the module's entry function to completion.
    pub fn run(&mut self, module: &Module) -> Result<Option<Value>, Fault> {
        self.run_function(module, module.entry())
    }

    /// Runs function `index` to completion.
    ///
    /// Registers, heap and globals carry over from previous runs; pc, frames
    /// and state are reset.
    pub fn run_function(&mut self, module: &Module, index: u16) -> Result<Option<Value>, Fault> {
        self.start(module, index)?;
        while self.state == ExecState::Running {
            self.step(module)?;
        }
        Ok(self.return_value)
    }

    /// Prepares a run of function `index` without executing anything.
    pub fn start(&mut self, module: &Module, index: u16) -> Result<(), Fault> {
        self.frames.clear();
        self.function = index;
        self.entry = index;
        self.pc = 0;
        self.executed = 0;
        self.return_value = None;
        let globals = module.global_count() as usize;
        if self.globals.len() < globals {
            self.globals.resize(globals, Value::default());
        }
        if module.function(index).is_none() {
            let error = if module.functions().is_empty() {
                VMError::MissingFunction
            } else {
                VMError::InvalidFunction { index }
            };
            return Err(self.fault(module, error, None));
        }
        self.state = ExecState::Running;
        Ok(())
    }

    /// Executes a single instruction.
    ///
    /// Returns `Ok(true)` while the run can continue. Calling `step` on a
    /// halted or faulted interpreter does nothing.
    pub fn step(&mut self, module: &Module) -> Result<bool, Fault> {
        match &self.state {
            ExecState::Running => {}
            ExecState::Faulted(fault) => return Err(fault.clone()),
            ExecState::Ready | ExecState::Halted => return Ok(false),
        }

        let at = self.pc;
        let mut fetched = None;
        let result = self.fetch_and_exec(module, &mut fetched);
        if let Err(error) = result {
            self.pc = at;
            return Err(self.fault(module, error, fetched));
        }
        Ok(self.state == ExecState::Running)
    }

    fn fault(&mut self, module: &Module, error: VMError, instruction: Option<Instruction>) -> Fault {
        let fault = Fault {
            error,
            pc: self.pc,
            function: module
                .function(self.function)
                .map(|f| f.name().to_string())
                .unwrap_or_else(|| format!("#{}", self.function)),
            instruction,
        };
        self.state = ExecState::Faulted(fault.clone());
        fault
    }

    fn fetch_and_exec(&mut self, module: &Module, fetched: &mut Option<Instruction>) -> Result<(), VMError> {
        let function = module
            .function(self.function)
            .ok_or(VMError::InvalidFunction { index: self.function })?;
        let Some(instruction) = function.instruction(self.pc) else {
            self.fall_off_end();
            return Ok(());
        };
        *fetched = Some(instruction);

        if matches!(self.config.instruction_budget, Some(budget) if self.executed >= budget) {
            return Err(VMError::BudgetExhausted {
                executed: self.executed,
            });
        }

        self.pc += 1;
        self.executed += 1;
        let opcode = instruction.decode_opcode()?;
        let operands = instruction.operands(opcode.layout());
        self.exec(module, opcode, operands)
    }

    /// Reaching the end of a function returns without a value; at top level
    /// the run halts.
    fn fall_off_end(&mut self) {
        match self.frames.pop() {
            Some(frame) => {
                self.registers.restore_window(&frame.saved);
                self.function = frame.function;
                self.pc = frame.return_pc;
            }
            None => self.state = ExecState::Halted,
        }
    }

    /// Executes a single decoded instruction.
    fn exec(&mut self, module: &Module, opcode: Opcode, operands: Operands) -> Result<(), VMError> {
        exec_vm! {
            vm = self,
            module = module,
            opcode = opcode,
            operands = operands,
            numeric = op_numeric,
            {
                // Loads
                LoadBool => op_load_bool(rd: Reg @ A, value: Bool @ B),
                LoadI32 => op_load_i32(rd: Reg @ A, imm: SImm16 @ B),
                LoadI64 => op_load_i64(rd: Reg @ A, imm: SImm16 @ B),
                LoadConstI32 => op_load_const_i32(module; rd: Reg @ A, k: Index @ B),
                LoadConstI64 => op_load_const_i64(module; rd: Reg @ A, k: Index @ B),
                LoadConstF32 => op_load_const_f32(module; rd: Reg @ A, k: Index @ B),
                LoadConstF64 => op_load_const_f64(module; rd: Reg @ A, k: Index @ B),
                LoadFunction => op_load_function(module; rd: Reg @ A, index: Index @ B),
                LoadNative => op_load_native(module; rd: Reg @ A, k: Index @ B),
                LoadGlobal => op_load_global(rd: Reg @ A, slot: Index @ B),
                StoreGlobal => op_store_global(rs: Reg @ A, slot: Index @ B),
                // Moves / casts
                Move => op_move(rd: Reg @ A, rs: Reg @ B),
                I32ToI64 => op_i32_to_i64(rd: Reg @ A, rs: Reg @ B),
                I64ToI32 => op_i64_to_i32(rd: Reg @ A, rs: Reg @ B),
                I32ToF64 => op_i32_to_f64(rd: Reg @ A, rs: Reg @ B),
                F64ToI32 => op_f64_to_i32(rd: Reg @ A, rs: Reg @ B),
                I64ToF64 => op_i64_to_f64(rd: Reg @ A, rs: Reg @ B),
                F64ToI64 => op_f64_to_i64(rd: Reg @ A, rs: Reg @ B),
                F32ToF64 => op_f32_to_f64(rd: Reg @ A, rs: Reg @ B),
                F64ToF32 => op_f64_to_f32(rd: Reg @ A, rs: Reg @ B),
                // Boolean
                Not => op_not(rd: Reg @ A, rs: Reg @ B),
                And => op_and(rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C),
                Or => op_or(rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C),
                EqBool => op_eq_bool(rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C),
                NeqBool => op_neq_bool(rd: Reg @ A, rs1: Reg @ B, rs2: Reg @ C),
                // Arrays
                NewArray => op_new_array(rd: Reg @ A, len: Reg @ B, fill: Reg @ C),
                ArrayGet => op_array_get(rd: Reg @ A, array: Reg @ B, index: Reg @ C),
                ArraySet => op_array_set(array: Reg @ A, index: Reg @ B, rs: Reg @ C),
                ArrayLen => op_array_len(rd: Reg @ A, array: Reg @ B),
                // Memory
                RefInc => op_ref_inc(array: Reg @ A),
                RefDec => op_ref_dec(array: Reg @ A),
                Destroy => op_destroy(array: Reg @ A),
                Free => op_free(array: Reg @ A),
                // Control Flow
                Jump => op_jump(target: Index @ B),
                JumpIf => op_jump_if(cond: Reg @ A, target: Index @ B),
                JumpIfNot => op_jump_if_not(cond: Reg @ A, target: Index @ B),
                Call => op_call(module; rd: Reg @ A, callee: Reg @ B, args: Reg @ C),
                Ret => op_ret(rs: Reg @ A),
            }
        }
    }

    fn op_numeric(
        &mut self,
        instr: &'static str,
        op: NumericOp,
        ty: NumType,
        operands: Operands,
    ) -> Result<(), VMError> {
        let (dst, a, b) = (operands.ra(), operands.rb(), operands.rc());
        match ty {
            NumType::I32 => self.apply_numeric::<i32>(instr, op, dst, a, b),
            NumType::I64 => self.apply_numeric::<i64>(instr, op, dst, a, b),
            NumType::F32 => self.apply_numeric::<f32>(instr, op, dst, a, b),
            NumType::F64 => self.apply_numeric::<f64>(instr, op, dst, a, b),
        }
    }

    fn apply_numeric<T: Numeric>(
        &mut self,
        instr: &'static str,
        op: NumericOp,
        dst: u8,
        a: u8,
        b: u8,
    ) -> Result<(), VMError> {
        let va = self.registers.get_typed::<T>(a, instr)?;
        let result = if op == NumericOp::Neg {
            va.negate().into_value()
        } else {
            let vb = self.registers.get_typed::<T>(b, instr)?;
            if op.is_comparison() {
                Value::Bool(numeric::compare(op, va, vb))
            } else {
                T::arith(op, va, vb)?.into_value()
            }
        };
        self.registers.set(dst, result);
        Ok(())
    }

    fn op_load_bool(&mut self, _instr: &'static str, dst: u8, value: bool) -> Result<(), VMError> {
        self.registers.set(dst, Value::Bool(value));
        Ok(())
    }

    fn op_load_i32(&mut self, _instr: &'static str, dst: u8, imm: i16) -> Result<(), VMError> {
        self.registers.set(dst, Value::I32(imm as i32));
        Ok(())
    }

    fn op_load_i64(&mut self, _instr: &'static str, dst: u8, imm: i16) -> Result<(), VMError> {
        self.registers.set(dst, Value::I64(imm as i64));
        Ok(())
    }

    fn op_load_const_i32(&mut self, _instr: &'static str, module: &Module, dst: u8, k: u16) -> Result<(), VMError> {
        let v = *module.i32_constants.fetch(k)?;
        self.registers.set(dst, Value::I32(v));
        Ok(())
    }

    fn op_load_const_i64(&mut self, _instr: &'static str, module: &Module, dst: u8, k: u16) -> Result<(), VMError> {
        let v = *module.i64_constants.fetch(k)?;
        self.registers.set(dst, Value::I64(v));
        Ok(())
    }

    fn op_load_const_f32(&mut self, _instr: &'static str, module: &Module, dst: u8, k: u16) -> Result<(), VMError> {
        let v = *module.f32_constants.fetch(k)?;
        self.registers.set(dst, Value::F32(v));
        Ok(())
    }

    fn op_load_const_f64(&mut self, _instr: &'static str, module: &Module, dst: u8, k: u16) -> Result<(), VMError> {
        let v = *module.f64_constants.fetch(k)?;
        self.registers.set(dst, Value::F64(v));
        Ok(())
    }

    fn op_load_function(
        &mut self,
        _instr: &'static str,
        module: &Module,
        dst: u8,
        index: u16,
    ) -> Result<(), VMError> {
        if module.function(index).is_none() {
            return Err(VMError::InvalidFunction { index });
        }
        self.registers
            .set(dst, Value::from_function(FunctionRef::Compiled(index)));
        Ok(())
    }

    fn op_load_native(&mut self, _instr: &'static str, module: &Module, dst: u8, k: u16) -> Result<(), VMError> {
        let name = module.strings.fetch(k)?;
        let native = NativeFunction::from_name(name).ok_or_else(|| VMError::UnknownNative {
            name: name.clone(),
        })?;
        self.registers
            .set(dst, Value::from_function(FunctionRef::Native(native)));
        Ok(())
    }

    fn global_slot(&self, slot: u16) -> Result<usize, VMError> {
        let index = slot as usize;
        if index >= self.globals.len() {
            return Err(VMError::InvalidGlobal {
                slot,
                count: self.globals.len(),
            });
        }
        Ok(index)
    }

    fn op_load_global(&mut self, _instr: &'static str, dst: u8, slot: u16) -> Result<(), VMError> {
        let index = self.global_slot(slot)?;
        self.registers.set(dst, self.globals[index]);
        Ok(())
    }

    fn op_store_global(&mut self, _instr: &'static str, src: u8, slot: u16) -> Result<(), VMError> {
        let index = self.global_slot(slot)?;
        self.globals[index] = self.registers.get(src);
        Ok(())
    }

    fn op_move(&mut self, _instr: &'static str, dst: u8, src: u8) -> Result<(), VMError> {
        let v = self.registers.get(src);
        self.registers.set(dst, v);
        Ok(())
    }

    fn op_i32_to_i64(&mut self, instr: &'static str, dst: u8, src: u8) -> Result<(), VMError> {
        let v = self.registers.get_i32(src, instr)?;
        self.registers.set(dst, Value::I64(v as i64));
        Ok(())
    }

    fn op_i64_to_i32(&mut self, instr: &'static str, dst: u8, src: u8) -> Result<(), VMError> {
        let v = self.registers.get_typed::<i64>(src, instr)?;
        self.registers.set(dst, Value::I32(v as i32));
        Ok(())
    }

    fn op_i32_to_f64(&mut self, instr: &'static str, dst: u8, src: u8) -> Result<(), VMError> {
        let v = self.registers.get_i32(src, instr)?;
        self.registers.set(dst, Value::F64(v as f64));
        Ok(())
    }

    fn op_f64_to_i32(&mut self, instr: &'static str, dst: u8, src: u8) -> Result<(), VMError> {
        let v = self.registers.get_typed::<f64>(src, instr)?;
        self.registers.set(dst, Value::I32(v as i32));
        Ok(())
    }

    fn op_i64_to_f64(&mut self, instr: &'static str, dst: u8, src: u8) -> Result<(), VMError> {
        let v = self.registers.get_typed::<i64>(src, instr)?;
        self.registers.set(dst, Value::F64(v as f64));
        Ok(())
    }

    fn op_f64_to_i64(&mut self, instr: &'static str, dst: u8, src: u8) -> Result<(), VMError> {
        let v = self.registers.get_typed::<f64>(src, instr)?;
        self.registers.set(dst, Value::I64(v as i64));
        Ok(())
    }

    fn op_f32_to_f64(&mut self, instr: &'static str, dst: u8, src: u8) -> Result<(), VMError> {
        let v = self.registers.get_typed::<f32>(src, instr)?;
        self.registers.set(dst, Value::F64(v as f64));
        Ok(())
    }

    fn op_f64_to_f32(&mut self, instr: &'static str, dst: u8, src: u8) -> Result<(), VMError> {
        let v = self.registers.get_typed::<f64>(src, instr)?;
        self.registers.set(dst, Value::F32(v as f32));
        Ok(())
    }

    fn op_not(&mut self, instr: &'static str, dst: u8, src: u8) -> Result<(), VMError> {
        let v = self.registers.get_bool(src, instr)?;
        self.registers.set(dst, Value::Bool(!v));
        Ok(())
    }

    fn bool_pair(&self, instr: &'static str, a: u8, b: u8) -> Result<(bool, bool), VMError> {
        Ok((
            self.registers.get_bool(a, instr)?,
            self.registers.get_bool(b, instr)?,
        ))
    }

    fn op_and(&mut self, instr: &'static str, dst: u8, a: u8, b: u8) -> Result<(), VMError> {
        let (va, vb) = self.bool_pair(instr, a, b)?;
        self.registers.set(dst, Value::Bool(va && vb));
        Ok(())
    }

    fn op_or(&mut self, instr: &'static str, dst: u8, a: u8, b: u8) -> Result<(), VMError> {
        let (va, vb) = self.bool_pair(instr, a, b)?;
        self.registers.set(dst, Value::Bool(va || vb));
        Ok(())
    }

    fn op_eq_bool(&mut self, instr: &'static str, dst: u8, a: u8, b: u8) -> Result<(), VMError> {
        let (va, vb) = self.bool_pair(instr, a, b)?;
        self.registers.set(dst, Value::Bool(va == vb));
        Ok(())
    }

    fn op_neq_bool(&mut self, instr: &'static str, dst: u8, a: u8, b: u8) -> Result<(), VMError> {
        let (va, vb) = self.bool_pair(instr, a, b)?;
        self.registers.set(dst, Value::Bool(va != vb));
        Ok(())
    }

    fn op_new_array(&mut self, instr: &'static str, dst: u8, len: u8, fill: u8) -> Result<(), VMError> {
        let len = self.registers.get_i32(len, instr)?;
        let size = usize::try_from(len).map_err(|_| VMError::IndexOutOfRange {
            index: len as i64,
            len: 0,
        })?;
        let fill = self.registers.get(fill);
        let array = self.heap.allocate_array_filled(size, fill)?;
        self.registers.set(dst, array);
        Ok(())
    }

    fn op_array_get(&mut self, instr: &'static str, dst: u8, array: u8, index: u8) -> Result<(), VMError> {
        let handle = self.registers.get_array(array, instr)?;
        let index = self.registers.get_i32(index, instr)?;
        let v = self.heap.load(handle, index as i64)?;
        self.registers.set(dst, v);
        Ok(())
    }

    fn op_array_set(&mut self, instr: &'static str, array: u8, index: u8, src: u8) -> Result<(), VMError> {
        let handle = self.registers.get_array(array, instr)?;
        let index = self.registers.get_i32(index, instr)?;
        let v = self.registers.get(src);
        self.heap.store(handle, index as i64, v)
    }

    fn op_array_len(&mut self, instr: &'static str, dst: u8, array: u8) -> Result<(), VMError> {
        let handle = self.registers.get_array(array, instr)?;
        let len = self.heap.len(handle)?;
        self.registers.set(dst, Value::I32(len as i32));
        Ok(())
    }

    fn op_ref_inc(&mut self, instr: &'static str, array: u8) -> Result<(), VMError> {
        let handle = self.registers.get_array(array, instr)?;
        self.heap.ref_inc(handle)
    }

    fn op_ref_dec(&mut self, instr: &'static str, array: u8) -> Result<(), VMError> {
        let handle = self.registers.get_array(array, instr)?;
        self.heap.ref_dec(handle)
    }

    fn op_destroy(&mut self, instr: &'static str, array: u8) -> Result<(), VMError> {
        let handle = self.registers.get_array(array, instr)?;
        self.heap.deallocate_array(handle, true)
    }

    fn op_free(&mut self, instr: &'static str, array: u8) -> Result<(), VMError> {
        let handle = self.registers.get_array(array, instr)?;
        self.heap.deallocate_array(handle, false)
    }

    fn op_jump(&mut self, _instr: &'static str, target: u16) -> Result<(), VMError> {
        self.pc = target as usize;
        Ok(())
    }

    fn op_jump_if(&mut self, instr: &'static str, cond: u8, target: u16) -> Result<(), VMError> {
        if self.registers.get_bool(cond, instr)? {
            self.pc = target as usize;
        }
        Ok(())
    }

    fn op_jump_if_not(&mut self, instr: &'static str, cond: u8, target: u16) -> Result<(), VMError> {
        if !self.registers.get_bool(cond, instr)? {
            self.pc = target as usize;
        }
        Ok(())
    }

    /// Calls the function in `callee` with arguments from `args ..`.
    ///
    /// Compiled callees get a fresh register window with the arguments in
    /// `r0 ..`; the caller's window is saved in the new frame.
    fn op_call(
        &mut self,
        instr: &'static str,
        module: &Module,
        dst: u8,
        callee: u8,
        args: u8,
    ) -> Result<(), VMError> {
        let index = match self.registers.get_function(callee, instr)? {
            FunctionRef::Native(native) => {
                check_argument_window(native.name(), native.arity(), args)?;
                let result = natives::invoke(native, &self.registers, &self.heap, args)?;
                self.registers.set(dst, result);
                return Ok(());
            }
            FunctionRef::Compiled(index) => index,
        };

        if self.frames.len() >= self.config.max_call_depth {
            return Err(VMError::CallStackOverflow {
                depth: self.frames.len() + 1,
            });
        }
        let target = module
            .function(index)
            .ok_or(VMError::InvalidFunction { index })?;
        let param_count = target.param_count() as usize;
        check_argument_window(target.name(), param_count, args)?;

        let caller_window = module
            .function(self.function)
            .map(|f| f.max_regs_used() as usize)
            .unwrap_or_default();
        let arguments = self.registers.read_range(args, param_count);
        self.frames.push(CallFrame {
            return_pc: self.pc,
            function: self.function,
            dst_reg: dst,
            saved: self.registers.save_window(caller_window),
        });
        self.registers
            .enter_window(target.max_regs_used() as usize, &arguments);
        self.function = index;
        self.pc = 0;
        Ok(())
    }

    /// Returns `src` to the caller; without a caller the run halts.
    fn op_ret(&mut self, _instr: &'static str, src: u8) -> Result<(), VMError> {
        let value = self.registers.get(src);
        match self.frames.pop() {
            Some(frame) => {
                self.registers.restore_window(&frame.saved);
                self.registers.set(frame.dst_reg, value);
                self.function = frame.function;
                self.pc = frame.return_pc;
            }
            None => {
                self.return_value = Some(value);
                self.state = ExecState::Halted;
            }
        }
        Ok(())
    }
}

fn check_argument_window(name: &str, count: usize, first: u8) -> Result<(), VMError> {
    if first as usize + count > crate::virtual_machine::compiled::REGISTER_CAPACITY {
        return Err(VMError::ArgumentWindowOverflow {
            function: name.to_string(),
            count,
            first,
        });
    }
    Ok(())
}
