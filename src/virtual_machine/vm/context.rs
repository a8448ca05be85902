use crate::virtual_machine::heap::DEFAULT_HEAP_LIMIT;
use crate::virtual_machine::value::Value;

/// Default maximum nesting of `CALL`s.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Embedder-supplied limits for one interpreter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InterpreterConfig {
    /// Number of frames that may be active at once.
    pub max_call_depth: usize,
    /// Instructions a run may execute before faulting with
    /// `BudgetExhausted`; `None` is unbounded.
    pub instruction_budget: Option<u64>,
    /// Live array elements the heap may hold.
    pub heap_limit: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            instruction_budget: None,
            heap_limit: DEFAULT_HEAP_LIMIT,
        }
    }
}

/// Call stack frame: where to resume and what the caller's registers were.
#[derive(Clone, Debug)]
pub(super) struct CallFrame {
    /// Caller pc to resume at (the instruction after `CALL`).
    pub(super) return_pc: usize,
    /// Caller function index.
    pub(super) function: u16,
    /// Caller register receiving the return value.
    pub(super) dst_reg: u8,
    /// Caller's register window `r0 .. max_regs_used`.
    pub(super) saved: Vec<Value>,
}
