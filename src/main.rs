//! Kore virtual machine CLI.
//!
//! Runs a module, or starts an interactive session when no path is given.
//!
//! # Usage
//! ```text
//! kore run <path> [--dump-registers]
//! kore
//! ```
//!
//! # Arguments
//! - `path`: binary module (`KORBC` header) or assembly source
//!
//! # Options
//! - `--dump-registers`: print the register window after the run
//! - `--version`: print the version and ISA summary
//! - `--version-only`: print the bare version
//!
//! # Environment
//! - `KORE_INSTRUCTION_BUDGET`: stop a run after this many instructions
//! - `KORE_LOG`: log level (`debug`, `info`, `warn`, `error`)

use kore::utils::log;
use kore::virtual_machine::assembler::{assemble_source_with_name, render_diagnostic};
use kore::virtual_machine::heap::Heap;
use kore::virtual_machine::isa::{Opcode, OperandKind, Slot};
use kore::virtual_machine::program::{MAGIC, Module};
use kore::virtual_machine::value::Value;
use kore::virtual_machine::vm::{Interpreter, InterpreterConfig};
use kore::{debug, error, warn};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::env;
use std::fs;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const BUDGET_VAR: &str = "KORE_INSTRUCTION_BUDGET";

fn main() {
    if let Err(raw) = log::init_from_env() {
        warn!("Ignoring unknown KORE_LOG level: {raw}");
    }

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("kore");

    let mut path: Option<&str> = None;
    let mut run_requested = false;
    let mut dump_registers = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage(program);
                process::exit(0);
            }
            "--version" => {
                print_version();
                process::exit(0);
            }
            "--version-only" => {
                println!("{VERSION}");
                process::exit(0);
            }
            "--dump-registers" => dump_registers = true,
            "run" if !run_requested => {
                run_requested = true;
                i += 1;
                match args.get(i) {
                    Some(p) if !p.starts_with('-') => path = Some(p.as_str()),
                    _ => {
                        error!("run requires a path");
                        print_usage(program);
                        process::exit(1);
                    }
                }
            }
            other => {
                error!("Unexpected argument: {other}");
                print_usage(program);
                process::exit(1);
            }
        }
        i += 1;
    }

    let config = config_from_env().unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1);
    });

    let code = match path {
        Some(path) => run_file(path, config, dump_registers),
        None => match run_repl(config) {
            Ok(()) => 0,
            Err(e) => {
                error!("{e}");
                1
            }
        },
    };
    process::exit(code);
}

/// Builds the interpreter configuration, honoring `KORE_INSTRUCTION_BUDGET`.
fn config_from_env() -> Result<InterpreterConfig, String> {
    let mut config = InterpreterConfig::default();
    if let Ok(raw) = env::var(BUDGET_VAR) {
        let budget = raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|b| *b > 0)
            .ok_or_else(|| format!("{BUDGET_VAR} must be a positive integer, got '{raw}'"))?;
        config.instruction_budget = Some(budget);
    }
    Ok(config)
}

/// Loads a binary module, or assembles the file when it has no module header.
fn load_module(path: &str) -> Result<Module, String> {
    let bytes = fs::read(path).map_err(|e| format!("Failed to read {path}: {e}"))?;
    if Module::is_module_bytes(&bytes) {
        debug!("Loading binary module {path} ({} bytes)", bytes.len());
        return Module::from_bytes(&bytes).map_err(|e| format!("Failed to load {path}: {e}"));
    }
    debug!("{path} has no module header, assembling it as source");
    let source = String::from_utf8(bytes).map_err(|_| format!("{path} is neither a module nor UTF-8 source"))?;
    assemble_source_with_name(&source, path).map_err(|e| render_diagnostic(path, &source, &e))
}

fn run_file(path: &str, config: InterpreterConfig, dump_registers: bool) -> i32 {
    let module = match load_module(path) {
        Ok(module) => module,
        Err(e) => {
            eprint!("{e}");
            if !e.ends_with('\n') {
                eprintln!();
            }
            return 1;
        }
    };

    debug!(
        "Running {path}: {} functions, entry #{}",
        module.functions().len(),
        module.entry()
    );
    let mut vm = Interpreter::new(config);
    let result = vm.run(&module);
    debug!(
        "Executed {} instructions, {} arrays still live",
        vm.executed(),
        vm.heap().live_arrays()
    );
    let code = match &result {
        Ok(Some(value)) => {
            println!("{}", vm.heap().render(value));
            0
        }
        Ok(None) => 0,
        Err(fault) => {
            error!("{fault}");
            1
        }
    };

    if dump_registers {
        let window = module
            .function(vm.entry_function())
            .map(|f| f.max_regs_used() as usize)
            .unwrap_or_default();
        print_registers(vm.entry_registers(), vm.heap(), window);
    }
    code
}

fn print_registers(registers: &[Value], heap: &Heap, window: usize) {
    for (i, value) in registers.iter().take(window).enumerate() {
        println!("r{i:<3} = {}", heap.render(value));
    }
}

/// Register written by the last instruction of a one-line program, if any.
fn destination_register(module: &Module) -> Option<u8> {
    let instruction = *module.entry_function().ok()?.instructions().last()?;
    let opcode = instruction.decode_opcode().ok()?;
    let spec = opcode.operands().first()?;
    if spec.kind != OperandKind::Reg || spec.slot != Slot::A || spec.name != "rd" {
        return None;
    }
    Some(instruction.operands(opcode.layout()).ra())
}

fn run_repl(config: InterpreterConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("kore {VERSION} REPL");
    println!("history: up/down arrows, commands: .help, .regs, .quit");
    let mut editor = DefaultEditor::new()?;
    let mut vm = Interpreter::new(config);
    let mut window = 0usize;

    loop {
        match editor.readline("kore> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                match line {
                    ".quit" | ".exit" => break,
                    ".help" => {
                        print_repl_help();
                        continue;
                    }
                    ".regs" => {
                        print_registers(vm.registers(), vm.heap(), window.max(1));
                        continue;
                    }
                    _ => {}
                }

                let module = match assemble_source_with_name(line, "<repl>") {
                    Ok(module) => module,
                    Err(e) => {
                        eprint!("{}", render_diagnostic("<repl>", line, &e));
                        continue;
                    }
                };
                if let Ok(entry) = module.entry_function() {
                    window = window.max(entry.max_regs_used() as usize);
                }

                match vm.run(&module) {
                    Ok(Some(value)) => println!("=> {}", vm.heap().render(&value)),
                    Ok(None) => {
                        if let Some(rd) = destination_register(&module) {
                            println!("r{rd} = {}", vm.heap().render(&vm.register(rd)));
                        }
                    }
                    Err(fault) => error!("{fault}"),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("bye");
                break;
            }
            Err(err) => return Err(Box::new(err)),
        }
    }
    Ok(())
}

fn print_repl_help() {
    println!("Enter one instruction per line, e.g. `LOAD_I32 r0, 5`.");
    println!("Registers, globals and the heap persist between lines.");
    println!("  .regs   show the registers used so far");
    println!("  .help   show this message");
    println!("  .quit   leave the session");
}

fn print_version() {
    println!("kore {VERSION}");
    println!(
        "isa: {} opcodes, 32-bit instruction words, module magic {}",
        Opcode::ALL.len(),
        String::from_utf8_lossy(MAGIC)
    );
}

fn print_usage(program: &str) {
    eprintln!("Usage: {program} run <path> [--dump-registers]");
    eprintln!("       {program}              (interactive session)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --dump-registers   print the register window after the run");
    eprintln!("  --version          print version and ISA summary");
    eprintln!("  --version-only     print the bare version");
    eprintln!("  -h, --help         show this message");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  {BUDGET_VAR}   stop after this many instructions");
    eprintln!("  KORE_LOG                  log level (debug, info, warn, error)");
}
