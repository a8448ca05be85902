use crate::types::encoding::DecodeError;
use kore_derive::Error;

/// Errors produced while building, loading, assembling or executing bytecode.
///
/// `EncodingError`, `RegisterOverflow` and `RegisterUnderflow` come from the
/// producing compiler and abort code generation. Everything raised by the
/// dispatch loop is wrapped in a [`Fault`](crate::virtual_machine::vm::Fault)
/// and stops execution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VMError {
    /// Operand does not fit its bit field, or the opcode has another layout.
    #[error("cannot encode {mnemonic}: {reason}")]
    EncodingError {
        mnemonic: &'static str,
        reason: String,
    },
    /// More live registers requested than the register file holds.
    #[error("register overflow: all {capacity} registers are live")]
    RegisterOverflow { capacity: usize },
    /// `free_registers` asked to release more registers than are live.
    #[error("cannot free {requested} registers, only {live} are live")]
    RegisterUnderflow { requested: u16, live: u16 },
    /// Double free, stale handle, or free of a still-referenced array.
    #[error("heap invariant violated for array #{index}: {reason}")]
    HeapInvariantViolation { index: u32, reason: &'static str },
    /// Top byte of an instruction names no opcode.
    #[error("unknown opcode 0x{opcode:02x}")]
    UnknownOpcode { opcode: u8 },
    /// Register tag does not match the type the instruction operates on.
    #[error("{instruction} expected r{register} to hold {expected} but found {actual}")]
    TypeMismatch {
        instruction: &'static str,
        register: u8,
        expected: &'static str,
        actual: &'static str,
    },
    /// Array index outside `0..len`.
    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    /// Heap limit reached or the allocator refused the request.
    #[error("out of memory allocating {requested} elements")]
    OutOfMemory { requested: usize },
    /// Integer division (or negative power) by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Constant load references an index past the end of its table.
    #[error("constant {index} is out of range for the {table} table")]
    InvalidConstant { table: &'static str, index: u16 },
    /// Function index not present in the module.
    #[error("function {index} does not exist")]
    InvalidFunction { index: u16 },
    /// Global slot not declared by the module.
    #[error("global slot {slot} does not exist (module declares {count})")]
    InvalidGlobal { slot: u16, count: usize },
    /// Native function name not known to the interpreter.
    #[error("unknown native function {name:?}")]
    UnknownNative { name: String },
    /// Arguments of a call do not fit in the register file.
    #[error("arguments of {function} overflow the register file: {count} registers starting at r{first}")]
    ArgumentWindowOverflow {
        function: String,
        count: usize,
        first: u8,
    },
    /// Call nesting exceeded the configured maximum depth.
    #[error("call stack overflow at depth {depth}")]
    CallStackOverflow { depth: usize },
    /// Embedder-supplied instruction budget ran out.
    #[error("instruction budget exhausted after {executed} instructions")]
    BudgetExhausted { executed: u64 },
    /// Persisted module could not be decoded.
    #[error("decoding error: {reason}")]
    DecodeError { reason: String },
    /// File system failure while loading or saving a module.
    #[error("io error: {reason}")]
    Io { reason: String },
    /// Assembly error with source position.
    #[error("line {line}:{offset}: {message}")]
    AssemblyError {
        line: usize,
        offset: usize,
        message: String,
    },
    /// Tokenizer error with source position.
    #[error("line {line}:{offset}: {message}")]
    ParseError {
        line: usize,
        offset: usize,
        message: &'static str,
    },
    /// Unrecognized instruction mnemonic during assembly.
    #[error("invalid instruction name: {0}")]
    InvalidInstructionName(String),
    /// Expected a register operand (e.g., `r0`) but got something else.
    #[error("expected register, got {0}")]
    ExpectedRegister(String),
    /// Operand token could not be parsed as the expected kind.
    #[error("invalid {expected} operand: {token}")]
    InvalidOperand {
        expected: &'static str,
        token: String,
    },
    /// Wrong number of operands for an instruction.
    #[error("{instruction} takes {expected} operands, got {actual}")]
    OperandCount {
        instruction: String,
        expected: usize,
        actual: usize,
    },
    /// Label defined more than once within a function.
    #[error("duplicate label: {0}")]
    DuplicateLabel(String),
    /// Reference to undefined label.
    #[error("undefined label: {0}")]
    UndefinedLabel(String),
    /// Reference to a function the module does not define.
    #[error("undefined function: {0}")]
    UndefinedFunction(String),
    /// Two `.func` blocks with the same name.
    #[error("duplicate function: {0}")]
    DuplicateFunction(String),
    /// Module has no function to run.
    #[error("module contains no functions")]
    MissingFunction,
}

impl VMError {
    /// Stable taxonomy name used in fault reports.
    pub fn kind(&self) -> &'static str {
        match self {
            VMError::EncodingError { .. } => "EncodingError",
            VMError::RegisterOverflow { .. } => "RegisterOverflow",
            VMError::RegisterUnderflow { .. } => "RegisterUnderflow",
            VMError::HeapInvariantViolation { .. } => "HeapInvariantViolation",
            VMError::UnknownOpcode { .. } => "UnknownOpcode",
            VMError::TypeMismatch { .. } => "TypeMismatch",
            VMError::IndexOutOfRange { .. } => "IndexOutOfRange",
            VMError::OutOfMemory { .. } => "OutOfMemory",
            VMError::DivisionByZero => "DivisionByZero",
            VMError::InvalidConstant { .. } => "InvalidConstant",
            VMError::InvalidFunction { .. } => "InvalidFunction",
            VMError::InvalidGlobal { .. } => "InvalidGlobal",
            VMError::UnknownNative { .. } => "UnknownNative",
            VMError::ArgumentWindowOverflow { .. } => "ArgumentWindowOverflow",
            VMError::CallStackOverflow { .. } => "CallStackOverflow",
            VMError::BudgetExhausted { .. } => "BudgetExhausted",
            VMError::DecodeError { .. } => "DecodeError",
            VMError::Io { .. } => "Io",
            VMError::AssemblyError { .. }
            | VMError::ParseError { .. }
            | VMError::InvalidInstructionName(_)
            | VMError::ExpectedRegister(_)
            | VMError::InvalidOperand { .. }
            | VMError::OperandCount { .. }
            | VMError::DuplicateLabel(_)
            | VMError::UndefinedLabel(_)
            | VMError::UndefinedFunction(_)
            | VMError::DuplicateFunction(_)
            | VMError::MissingFunction => "AssemblyError",
        }
    }

    /// True for faults caused by the running program rather than by a
    /// malformed module or an interpreter bug.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            VMError::TypeMismatch { .. } | VMError::IndexOutOfRange { .. } | VMError::DivisionByZero
        )
    }
}

impl From<DecodeError> for VMError {
    fn from(err: DecodeError) -> Self {
        VMError::DecodeError {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for VMError {
    fn from(err: std::io::Error) -> Self {
        VMError::Io {
            reason: err.to_string(),
        }
    }
}
