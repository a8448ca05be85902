//! Assembly to module compiler CLI.
//!
//! Reads assembly source files and writes the persisted binary module.
//!
//! # Usage
//! ```text
//! kasm <input.kasm> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `input.kasm`: Assembly source file to compile
//!
//! # Options
//! - `-o, --output <file>`: Output file path (defaults to `<input>.kbc`)
//!
//! # Examples
//! ```text
//! kasm program.kasm
//! kasm program.kasm -o program.kbc
//! ```

use kore::utils::log;
use kore::virtual_machine::assembler::{assemble_source_with_name, render_diagnostic};
use kore::{debug, error, info, warn};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    if let Err(raw) = log::init_from_env() {
        warn!("Ignoring unknown KORE_LOG level: {raw}");
    }

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--output" | "-o") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                output_path = Some(args[i].clone());
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    let source = match fs::read_to_string(input_path) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to read input file {}: {}", input_path, e);
            process::exit(1);
        }
    };

    let output_path = output_path.unwrap_or_else(|| {
        let p = Path::new(input_path);
        let stem = p.file_stem().unwrap_or_default().to_string_lossy();
        let parent = p.parent().unwrap_or(Path::new("."));
        parent
            .join(format!("{}.kbc", stem))
            .to_string_lossy()
            .into_owned()
    });

    if let Some(parent) = Path::new(&output_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        error!("Output directory does not exist: {}", parent.display());
        process::exit(1);
    }

    let module = match assemble_source_with_name(&source, input_path) {
        Ok(module) => module,
        Err(e) => {
            eprint!("{}", render_diagnostic(input_path, &source, &e));
            error!("Assembly failed");
            process::exit(1);
        }
    };

    for function in module.functions() {
        debug!(
            "{}: {} instructions, {} registers",
            function.name(),
            function.instructions().len(),
            function.max_regs_used()
        );
    }

    let bytes = module.to_bytes();
    if let Err(e) = fs::write(&output_path, &bytes) {
        error!("Failed to write output file: {}", e);
        process::exit(1);
    }

    info!(
        "Compiled {} -> {} ({} functions, {} bytes)",
        input_path,
        output_path,
        module.functions().len(),
        bytes.len()
    );
}

fn print_usage(program: &str) {
    eprintln!("Usage: {program} <input.kasm> [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o, --output <file>   output path (defaults to <input>.kbc)");
    eprintln!("  -h, --help            show this message");
}
