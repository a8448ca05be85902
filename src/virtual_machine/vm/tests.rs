use super::*;
use crate::utils::test_utils::utils::{function, module_of, raw_function};
use crate::virtual_machine::assembler::assemble_source;

fn run_vm_with(source: &str, config: InterpreterConfig) -> Interpreter {
    let module = assemble_source(source).expect("assembly failed");
    let mut vm = Interpreter::new(config);
    vm.run(&module).expect("vm run failed");
    vm
}

fn run_vm(source: &str) -> Interpreter {
    run_vm_with(source, InterpreterConfig::default())
}

fn run_and_get_i32(source: &str, reg: u8) -> i32 {
    run_vm(source).register(reg).as_i32().expect("register does not hold an I32")
}

fn run_and_get_bool(source: &str, reg: u8) -> bool {
    run_vm(source).register(reg).as_bool().expect("register does not hold a Bool")
}

fn run_and_get_f64(source: &str, reg: u8) -> f64 {
    run_vm(source).register(reg).as_f64().expect("register does not hold an F64")
}

fn run_expect_fault_with(source: &str, config: InterpreterConfig) -> Fault {
    let module = assemble_source(source).expect("assembly failed");
    let mut vm = Interpreter::new(config);
    let fault = vm.run(&module).expect_err("expected a fault");
    assert_eq!(vm.state(), &ExecState::Faulted(fault.clone()));
    fault
}

fn run_expect_err(source: &str) -> VMError {
    run_expect_fault_with(source, InterpreterConfig::default()).error
}

// ==================== Loads ====================

#[test]
fn add_two_immediates() {
    let source = "
        LOAD_I32 r0, 5
        LOAD_I32 r1, 7
        ADD_I32 r2, r0, r1
        RET r2
    ";
    let vm = run_vm(source);
    assert_eq!(vm.register(2).as_i32(), Some(12));
    assert_eq!(vm.return_value().and_then(|v| v.as_i32()), Some(12));
    assert_eq!(vm.state(), &ExecState::Halted);
    assert_eq!(vm.executed(), 4);
}

#[test]
fn load_immediates_are_sign_extended() {
    let vm = run_vm("LOAD_I32 r0, -3\nLOAD_I64 r1, -32768\nLOAD_BOOL r2, true");
    assert_eq!(vm.register(0).as_i32(), Some(-3));
    assert_eq!(vm.register(1).as_i64(), Some(-32768));
    assert_eq!(vm.register(2).as_bool(), Some(true));
}

#[test]
fn load_constants() {
    let source = "
        LOAD_CONST_I32 r0, 2147483647
        LOAD_CONST_I64 r1, -9000000000
        LOAD_CONST_F32 r2, 0.5
        LOAD_CONST_F64 r3, 6.25
    ";
    let vm = run_vm(source);
    assert_eq!(vm.register(0).as_i32(), Some(i32::MAX));
    assert_eq!(vm.register(1).as_i64(), Some(-9_000_000_000));
    assert_eq!(vm.register(2).as_f32(), Some(0.5));
    assert_eq!(vm.register(3).as_f64(), Some(6.25));
}

#[test]
fn registers_default_to_i32_zero() {
    let vm = run_vm("LOAD_I32 r0, 1");
    assert_eq!(vm.registers().len(), 256);
    assert_eq!(vm.register(200).as_i32(), Some(0));
}

#[test]
fn invalid_constant_index() {
    let module = module_of(vec![function("main", 0, &[(Opcode::LoadConstI32, &[0, 5])])]);
    let fault = Interpreter::default().run(&module).unwrap_err();
    assert_eq!(
        fault.error,
        VMError::InvalidConstant {
            table: "i32",
            index: 5
        }
    );
}

// ==================== Moves / casts ====================

#[test]
fn move_copies_any_value() {
    let vm = run_vm("LOAD_BOOL r0, true\nMOVE r1, r0");
    assert_eq!(vm.register(1).as_bool(), Some(true));
}

#[test]
fn integer_casts() {
    let source = "
        LOAD_CONST_I64 r0, 4294967297
        I64_TO_I32 r1, r0
        LOAD_I32 r2, -7
        I32_TO_I64 r3, r2
        I32_TO_F64 r4, r2
    ";
    let vm = run_vm(source);
    assert_eq!(vm.register(1).as_i32(), Some(1));
    assert_eq!(vm.register(3).as_i64(), Some(-7));
    assert_eq!(vm.register(4).as_f64(), Some(-7.0));
}

#[test]
fn float_to_int_casts_saturate() {
    let source = "
        LOAD_CONST_F64 r0, 1e20
        F64_TO_I32 r1, r0
        LOAD_CONST_F64 r2, NaN
        F64_TO_I64 r3, r2
        LOAD_CONST_F64 r4, -2.9
        F64_TO_I32 r5, r4
    ";
    let vm = run_vm(source);
    assert_eq!(vm.register(1).as_i32(), Some(i32::MAX));
    assert_eq!(vm.register(3).as_i64(), Some(0));
    assert_eq!(vm.register(5).as_i32(), Some(-2));
}

#[test]
fn float_width_casts() {
    let source = "
        LOAD_CONST_F32 r0, 1.5
        F32_TO_F64 r1, r0
        F64_TO_F32 r2, r1
    ";
    let vm = run_vm(source);
    assert_eq!(vm.register(1).as_f64(), Some(1.5));
    assert_eq!(vm.register(2).as_f32(), Some(1.5));
}

#[test]
fn casts_check_source_type() {
    assert!(matches!(
        run_expect_err("I64_TO_F64 r3, r4"),
        VMError::TypeMismatch {
            instruction: "I64_TO_F64",
            register: 4,
            expected: "I64",
            actual: "I32"
        }
    ));
}

// ==================== Arithmetic ====================

#[test]
fn i32_arithmetic_wraps() {
    let source = "
        LOAD_CONST_I32 r0, 2147483647
        LOAD_I32 r1, 1
        ADD_I32 r2, r0, r1
        NEG_I32 r3, r2
    ";
    let vm = run_vm(source);
    assert_eq!(vm.register(2).as_i32(), Some(i32::MIN));
    assert_eq!(vm.register(3).as_i32(), Some(i32::MIN));
}

#[test]
fn i64_arithmetic() {
    let source = "
        LOAD_I64 r0, 3
        LOAD_I64 r1, 40
        POW_I64 r2, r0, r1
        LOAD_I64 r3, -7
        LOAD_I64 r4, 2
        DIV_I64 r5, r3, r4
        SUB_I64 r6, r3, r4
        MULT_I64 r7, r3, r4
    ";
    let vm = run_vm(source);
    assert_eq!(vm.register(2).as_i64(), Some(3i64.wrapping_pow(40)));
    assert_eq!(vm.register(5).as_i64(), Some(-3));
    assert_eq!(vm.register(6).as_i64(), Some(-9));
    assert_eq!(vm.register(7).as_i64(), Some(-14));
}

#[test]
fn float_arithmetic() {
    let source = "
        LOAD_CONST_F32 r0, 1.5
        ADD_F32 r1, r0, r0
        LOAD_CONST_F64 r2, 2.0
        LOAD_CONST_F64 r3, 10.0
        POW_F64 r4, r2, r3
        NEG_F64 r5, r4
        LOAD_CONST_F64 r6, 0.0
        DIV_F64 r7, r2, r6
    ";
    let vm = run_vm(source);
    assert_eq!(vm.register(1).as_f32(), Some(3.0));
    assert_eq!(vm.register(4).as_f64(), Some(1024.0));
    assert_eq!(vm.register(5).as_f64(), Some(-1024.0));
    assert_eq!(vm.register(7).as_f64(), Some(f64::INFINITY));
}

#[test]
fn integer_division_by_zero_faults() {
    let source = "
        LOAD_I32 r0, 10
        LOAD_I32 r1, 0
        DIV_I32 r2, r0, r1
        RET r2
    ";
    let fault = run_expect_fault_with(source, InterpreterConfig::default());
    assert_eq!(fault.error, VMError::DivisionByZero);
    assert_eq!(fault.pc, 2);
    assert_eq!(fault.function, "main");
    assert!(fault.error.is_user_error());
}

#[test]
fn arithmetic_type_mismatch() {
    let source = "
        LOAD_I32 r0, 1
        LOAD_I64 r1, 2
        ADD_I32 r2, r0, r1
    ";
    let fault = run_expect_fault_with(source, InterpreterConfig::default());
    assert_eq!(
        fault.error,
        VMError::TypeMismatch {
            instruction: "ADD_I32",
            register: 1,
            expected: "I32",
            actual: "I64",
        }
    );
    assert_eq!(fault.pc, 2);
    assert_eq!(
        fault.to_string(),
        "TypeMismatch at pc 2 in main (ADD_I32 r2, r0, r1): ADD_I32 expected r1 to hold I32 but found I64"
    );
}

#[test]
fn fault_leaves_destination_untouched() {
    let source = "
        LOAD_I32 r2, 9
        LOAD_BOOL r0, true
        SUB_I32 r2, r0, r0
    ";
    let module = assemble_source(source).unwrap();
    let mut vm = Interpreter::default();
    assert!(vm.run(&module).is_err());
    assert_eq!(vm.register(2).as_i32(), Some(9));
}

// ==================== Comparison / boolean ====================

#[test]
fn comparisons_produce_bool() {
    let source = "
        LOAD_I32 r0, 3
        LOAD_I32 r1, 4
        LT_I32 r2, r0, r1
        GE_I32 r3, r0, r1
        LOAD_CONST_F64 r4, NaN
        EQ_F64 r5, r4, r4
        NEQ_F64 r6, r4, r4
    ";
    let vm = run_vm(source);
    assert_eq!(vm.register(2).as_bool(), Some(true));
    assert_eq!(vm.register(3).as_bool(), Some(false));
    assert_eq!(vm.register(5).as_bool(), Some(false));
    assert_eq!(vm.register(6).as_bool(), Some(true));
}

#[test]
fn boolean_logic() {
    let source = "
        LOAD_BOOL r0, true
        LOAD_BOOL r1, false
        AND r2, r0, r1
        OR r3, r0, r1
        NOT r4, r1
        EQ_BOOL r5, r0, r1
        NEQ_BOOL r6, r0, r1
    ";
    let vm = run_vm(source);
    let bools: Vec<_> = (2..=6).map(|r| vm.register(r).as_bool()).collect();
    assert_eq!(
        bools,
        [Some(false), Some(true), Some(true), Some(false), Some(true)]
    );
}

#[test]
fn not_requires_bool() {
    assert!(matches!(
        run_expect_err("LOAD_I32 r0, 1\nNOT r1, r0"),
        VMError::TypeMismatch {
            instruction: "NOT",
            expected: "Bool",
            ..
        }
    ));
}

// ==================== Control flow ====================

#[test]
fn loop_sums_to_ten() {
    let source = "
        LOAD_I32 r0, 0      # sum
        LOAD_I32 r1, 1      # i
        LOAD_I32 r2, 10
        LOAD_I32 r3, 1
    loop:
        ADD_I32 r0, r0, r1
        ADD_I32 r1, r1, r3
        LE_I32 r4, r1, r2
        JUMP_IF r4, loop
        RET r0
    ";
    assert_eq!(run_and_get_i32(source, 0), 55);
}

#[test]
fn jump_if_not_and_unconditional_jump() {
    let source = "
        LOAD_BOOL r0, false
        JUMP_IF_NOT r0, skip
        LOAD_I32 r1, 1
    skip:
        JUMP end
        LOAD_I32 r1, 2
    end:
        LOAD_BOOL r2, true
    ";
    let vm = run_vm(source);
    assert_eq!(vm.register(1).as_i32(), Some(0));
    assert!(run_and_get_bool(source, 2));
}

#[test]
fn conditional_jump_requires_bool() {
    assert!(matches!(
        run_expect_err("LOAD_I32 r0, 1\nJUMP_IF r0, 0"),
        VMError::TypeMismatch {
            instruction: "JUMP_IF",
            register: 0,
            ..
        }
    ));
}

#[test]
fn falling_off_entry_halts_without_value() {
    let vm = run_vm("LOAD_I32 r0, 1");
    assert_eq!(vm.state(), &ExecState::Halted);
    assert!(vm.return_value().is_none());
}

#[test]
fn jump_past_end_halts() {
    let vm = run_vm("JUMP 100\nLOAD_I32 r0, 1");
    assert_eq!(vm.state(), &ExecState::Halted);
    assert_eq!(vm.register(0).as_i32(), Some(0));
}

#[test]
fn budget_exhausted() {
    let config = InterpreterConfig {
        instruction_budget: Some(100),
        ..InterpreterConfig::default()
    };
    let fault = run_expect_fault_with("top: JUMP top", config);
    assert_eq!(fault.error, VMError::BudgetExhausted { executed: 100 });
    assert_eq!(fault.pc, 0);
}

// ==================== Calls ====================

const FACTORIAL: &str = "
.func fact 1
    LOAD_I32 r1, 1
    LE_I32 r2, r0, r1
    JUMP_IF r2, base
    SUB_I32 r3, r0, r1
    LOAD_FUNCTION r4, fact
    CALL r5, r4, r3
    MULT_I32 r6, r0, r5
    RET r6
base:
    RET r1
.func main
    LOAD_I32 r0, 10
    LOAD_FUNCTION r1, fact
    CALL r2, r1, r0
    RET r2
.entry main
";

#[test]
fn recursive_factorial() {
    let vm = run_vm(FACTORIAL);
    assert_eq!(vm.return_value().and_then(|v| v.as_i32()), Some(3_628_800));
    // caller window restored after the call
    assert_eq!(vm.register(0).as_i32(), Some(10));
    assert!(matches!(
        vm.register(1).as_function(),
        Some(FunctionRef::Compiled(0))
    ));
}

#[test]
fn entry_window_survives_fault_in_callee() {
    let source = "
    .func bad
        LOAD_BOOL r0, true
        ADD_I32 r1, r0, r0
        RET r1
    .func main
        LOAD_I32 r0, 41
        LOAD_FUNCTION r1, bad
        CALL r2, r1, r3
        RET r2
    .entry main
    ";
    let module = assemble_source(source).expect("assembly failed");
    let mut vm = Interpreter::default();
    let fault = vm.run(&module).unwrap_err();
    assert_eq!(fault.function, "bad");
    assert_eq!(vm.current_function(), 0);
    assert_eq!(vm.entry_function(), 1);
    // live registers belong to the callee
    assert_eq!(vm.register(0).as_bool(), Some(true));
    let entry = vm.entry_registers();
    assert_eq!(entry.len(), module.function(1).unwrap().max_regs_used() as usize);
    assert_eq!(entry[0].as_i32(), Some(41));
    assert!(matches!(entry[1].as_function(), Some(FunctionRef::Compiled(0))));
}

#[test]
fn entry_window_is_live_file_after_halt() {
    let vm = run_vm(FACTORIAL);
    assert_eq!(vm.entry_registers()[0].as_i32(), Some(10));
    assert_eq!(vm.entry_registers().len(), vm.registers().len());
}

#[test]
fn callee_without_ret_leaves_destination() {
    let source = "
    .func noop
        LOAD_I32 r0, 99
    .func main
        LOAD_I32 r1, 5
        LOAD_FUNCTION r0, noop
        CALL r1, r0, r2
        RET r1
    ";
    let vm = run_vm(source);
    assert_eq!(vm.return_value().and_then(|v| v.as_i32()), Some(5));
    assert!(vm.register(0).as_function().is_some());
}

#[test]
fn arguments_are_copied_to_callee_window() {
    let source = "
    .func sub 2
        SUB_I32 r2, r0, r1
        RET r2
    .func main
        LOAD_FUNCTION r0, sub
        LOAD_I32 r5, 10
        LOAD_I32 r6, 3
        CALL r7, r0, r5
        RET r7
    .entry main
    ";
    assert_eq!(run_and_get_i32(source, 7), 7);
}

#[test]
fn call_depth_is_bounded() {
    let source = "
    .func spin
        LOAD_FUNCTION r0, spin
        CALL r1, r0, r2
    .entry spin
    ";
    let config = InterpreterConfig {
        max_call_depth: 16,
        ..InterpreterConfig::default()
    };
    let fault = run_expect_fault_with(source, config);
    assert_eq!(fault.error, VMError::CallStackOverflow { depth: 17 });
    assert_eq!(fault.function, "spin");
    assert_eq!(fault.pc, 1);
}

#[test]
fn call_requires_function_value() {
    assert!(matches!(
        run_expect_err("LOAD_I32 r0, 1\nCALL r1, r0, r2"),
        VMError::TypeMismatch {
            instruction: "CALL",
            expected: "Function",
            actual: "I32",
            ..
        }
    ));
}

#[test]
fn call_arguments_must_fit_register_file() {
    let source = "
    .func pair 2
        RET r0
    .func main
        LOAD_FUNCTION r0, pair
        CALL r1, r0, r255
    .entry main
    ";
    assert!(matches!(
        run_expect_err(source),
        VMError::ArgumentWindowOverflow {
            count: 2,
            first: 255,
            ..
        }
    ));
    assert_eq!(
        run_expect_err(source).to_string(),
        "arguments of pair overflow the register file: 2 registers starting at r255"
    );
}

#[test]
fn invalid_function_index() {
    let module = module_of(vec![function("main", 0, &[(Opcode::LoadFunction, &[0, 9])])]);
    let fault = Interpreter::default().run(&module).unwrap_err();
    assert_eq!(fault.error, VMError::InvalidFunction { index: 9 });
}

// ==================== Natives ====================

#[test]
fn native_sqrt() {
    let source = "
        LOAD_NATIVE r0, \"sqrt\"
        LOAD_CONST_F64 r1, 16.0
        CALL r2, r0, r1
    ";
    assert_eq!(run_and_get_f64(source, 2), 4.0);
}

#[test]
fn native_len() {
    let source = "
        LOAD_I32 r0, 4
        NEW_ARRAY r1, r0, r0
        LOAD_NATIVE r2, \"len\"
        CALL r3, r2, r1
    ";
    assert_eq!(run_and_get_i32(source, 3), 4);
}

#[test]
fn unknown_native() {
    assert_eq!(
        run_expect_err("LOAD_NATIVE r0, \"nope\""),
        VMError::UnknownNative {
            name: "nope".to_string()
        }
    );
}

// ==================== Globals ====================

#[test]
fn globals_persist_across_calls() {
    let source = "
    .globals 1
    .func set
        LOAD_I32 r0, 42
        STORE_GLOBAL r0, 0
    .func main
        LOAD_FUNCTION r0, set
        CALL r1, r0, r2
        LOAD_GLOBAL r3, g0
        RET r3
    .entry main
    ";
    let vm = run_vm(source);
    assert_eq!(vm.register(3).as_i32(), Some(42));
    assert_eq!(vm.globals()[0].as_i32(), Some(42));
}

#[test]
fn undeclared_global() {
    assert_eq!(
        run_expect_err(".globals 1\nLOAD_GLOBAL r0, 1"),
        VMError::InvalidGlobal { slot: 1, count: 1 }
    );
}

// ==================== Arrays / memory ====================

#[test]
fn array_get_set_len() {
    let source = "
        LOAD_I32 r0, 3
        LOAD_I32 r1, 7
        NEW_ARRAY r2, r0, r1
        LOAD_I32 r3, 1
        LOAD_I32 r4, -5
        ARRAY_SET r2, r3, r4
        ARRAY_GET r5, r2, r3
        LOAD_I32 r6, 2
        ARRAY_GET r7, r2, r6
        ARRAY_LEN r8, r2
    ";
    let vm = run_vm(source);
    assert_eq!(vm.register(5).as_i32(), Some(-5));
    assert_eq!(vm.register(7).as_i32(), Some(7));
    assert_eq!(vm.register(8).as_i32(), Some(3));
    assert_eq!(vm.heap().live_arrays(), 1);
    let array = vm.register(2);
    assert_eq!(vm.heap().render(&array), "[7, -5, 7]");
}

#[test]
fn array_index_out_of_range() {
    let source = "
        LOAD_I32 r0, 3
        NEW_ARRAY r1, r0, r0
        ARRAY_GET r2, r1, r0
    ";
    assert_eq!(
        run_expect_err(source),
        VMError::IndexOutOfRange { index: 3, len: 3 }
    );
    let negative = "
        LOAD_I32 r0, 3
        NEW_ARRAY r1, r0, r0
        LOAD_I32 r2, -1
        ARRAY_SET r1, r2, r0
    ";
    assert_eq!(
        run_expect_err(negative),
        VMError::IndexOutOfRange { index: -1, len: 3 }
    );
}

#[test]
fn negative_array_length() {
    assert_eq!(
        run_expect_err("LOAD_I32 r0, -1\nNEW_ARRAY r1, r0, r0"),
        VMError::IndexOutOfRange { index: -1, len: 0 }
    );
}

#[test]
fn heap_limit_is_enforced() {
    let config = InterpreterConfig {
        heap_limit: 10,
        ..InterpreterConfig::default()
    };
    let fault = run_expect_fault_with("LOAD_I32 r0, 11\nNEW_ARRAY r1, r0, r0", config);
    assert_eq!(fault.error, VMError::OutOfMemory { requested: 11 });
}

#[test]
fn free_honors_refcount() {
    let still_referenced = "
        LOAD_I32 r0, 2
        NEW_ARRAY r1, r0, r0
        FREE r1
    ";
    assert!(matches!(
        run_expect_err(still_referenced),
        VMError::HeapInvariantViolation {
            reason: "free of an array that is still referenced",
            ..
        }
    ));

    let released = "
        LOAD_I32 r0, 2
        NEW_ARRAY r1, r0, r0
        REF_INC r1
        REF_DEC r1
        REF_DEC r1
        FREE r1
    ";
    assert_eq!(run_vm(released).heap().live_arrays(), 0);
}

#[test]
fn destroy_ignores_refcount() {
    let source = "
        LOAD_I32 r0, 2
        NEW_ARRAY r1, r0, r0
        REF_INC r1
        DESTROY r1
    ";
    assert_eq!(run_vm(source).heap().live_arrays(), 0);
}

#[test]
fn use_after_destroy_faults() {
    let source = "
        LOAD_I32 r0, 2
        NEW_ARRAY r1, r0, r0
        DESTROY r1
        ARRAY_LEN r2, r1
    ";
    assert!(matches!(
        run_expect_err(source),
        VMError::HeapInvariantViolation {
            reason: "use of a freed array",
            ..
        }
    ));
}

#[test]
fn double_destroy_faults() {
    let source = "
        LOAD_I32 r0, 2
        NEW_ARRAY r1, r0, r0
        DESTROY r1
        DESTROY r1
    ";
    let fault = run_expect_fault_with(source, InterpreterConfig::default());
    assert_eq!(fault.pc, 3);
    assert!(matches!(
        fault.error,
        VMError::HeapInvariantViolation {
            reason: "double free",
            ..
        }
    ));
}

#[test]
fn ref_dec_below_zero_faults() {
    let source = "
        LOAD_I32 r0, 1
        NEW_ARRAY r1, r0, r0
        REF_DEC r1
        REF_DEC r1
    ";
    assert!(matches!(
        run_expect_err(source),
        VMError::HeapInvariantViolation {
            reason: "refcount would drop below zero",
            ..
        }
    ));
}

#[test]
fn freeing_parent_leaves_children_alive() {
    let source = "
        LOAD_I32 r0, 1
        NEW_ARRAY r1, r0, r0     # child, refcount 1
        NEW_ARRAY r2, r0, r1     # parent holds the child
        REF_DEC r2
        FREE r2
    ";
    assert_eq!(run_vm(source).heap().live_arrays(), 1);
}

#[test]
fn destroyed_parent_does_not_free_child_held_in_register() {
    let source = "
        LOAD_I32 r0, 2
        LOAD_I32 r1, 0
        NEW_ARRAY r2, r0, r1
        NEW_ARRAY r3, r0, r2
        DESTROY r3
        ARRAY_GET r4, r2, r1
        RET r4
    ";
    let vm = run_vm(source);
    assert_eq!(vm.state(), &ExecState::Halted);
    assert_eq!(vm.return_value().and_then(|v| v.as_i32()), Some(0));
    assert_eq!(vm.heap().live_arrays(), 1);
}

// ==================== Faults / lifecycle ====================

#[test]
fn unknown_opcode_records_pc() {
    let module = module_of(vec![raw_function("main", &[0x0200_0001, 0xFF00_0000])]);
    let mut vm = Interpreter::default();
    let fault = vm.run(&module).unwrap_err();
    assert_eq!(fault.error, VMError::UnknownOpcode { opcode: 0xFF });
    assert_eq!(fault.pc, 1);
    assert_eq!(fault.instruction, Some(Instruction::from_raw(0xFF00_0000)));
    assert_eq!(
        fault.to_string(),
        "UnknownOpcode at pc 1 in main (.word 0xff000000): unknown opcode 0xff"
    );
    // registers survive the fault
    assert_eq!(vm.register(0).as_i32(), Some(1));
    assert_eq!(vm.pc(), 1);
}

#[test]
fn step_after_fault_repeats_fault() {
    let module = module_of(vec![raw_function("main", &[0xFF00_0000])]);
    let mut vm = Interpreter::default();
    vm.start(&module, 0).unwrap();
    let first = vm.step(&module).unwrap_err();
    let second = vm.step(&module).unwrap_err();
    assert_eq!(first, second);
}

#[test]
fn stepping_one_instruction_at_a_time() {
    let module = assemble_source("LOAD_I32 r0, 1\nLOAD_I32 r1, 2\nRET r1").unwrap();
    let mut vm = Interpreter::default();
    assert_eq!(vm.state(), &ExecState::Ready);
    assert!(!vm.step(&module).unwrap());

    vm.start(&module, module.entry()).unwrap();
    assert!(vm.step(&module).unwrap());
    assert_eq!(vm.pc(), 1);
    assert!(vm.step(&module).unwrap());
    assert!(!vm.step(&module).unwrap());
    assert_eq!(vm.state(), &ExecState::Halted);
    assert_eq!(vm.executed(), 3);
}

#[test]
fn empty_module_faults() {
    let fault = Interpreter::default().run(&Module::new()).unwrap_err();
    assert_eq!(fault.error, VMError::MissingFunction);
}

#[test]
fn registers_persist_between_runs() {
    let mut vm = Interpreter::default();
    let first = assemble_source("LOAD_I32 r0, 21").unwrap();
    let second = assemble_source("ADD_I32 r1, r0, r0\nRET r1").unwrap();
    vm.run(&first).unwrap();
    let result = vm.run(&second).unwrap();
    assert_eq!(result.and_then(|v| v.as_i32()), Some(42));
}

#[test]
fn persisted_module_runs_identically() {
    let module = assemble_source(FACTORIAL).unwrap();
    let restored = Module::from_bytes(&module.to_bytes()).unwrap();
    let result = Interpreter::default().run(&restored).unwrap();
    assert_eq!(result.and_then(|v| v.as_i32()), Some(3_628_800));
}
