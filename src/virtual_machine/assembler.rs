//! Assembly language parser and module builder.
//!
//! Converts human-readable assembly into a [`Module`]. Operands are parsed
//! according to the [`OperandKind`]s recorded in the opcode table, so new
//! instructions need no assembler changes.
//!
//! # Syntax
//!
//! ```text
//! .globals 1                  # number of global slots
//! .func square 1              # function name and parameter count
//!     MULT_I32 r1, r0, r0
//!     RET r1
//! .func main
//!     LOAD_FUNCTION r1, square
//!     LOAD_I32 r2, 12
//!     CALL r0, r1, r2         # r0 = square(r2)
//!     RET r0
//! .entry main
//! ```
//!
//! - Instructions use the ISA mnemonics (e.g. `LOAD_I32`, `ADD_F64`)
//! - Registers use the `r` prefix (`r0` .. `r255`)
//! - Immediates are decimal integers (e.g. `42`, `-1`)
//! - Constant loads take a literal of the matching type, interned into the
//!   module's constant tables (`LOAD_CONST_F64 r0, 2.5`)
//! - `LOAD_NATIVE` takes a double-quoted name (`"sqrt"`)
//! - Jump targets are labels (`loop:`) or absolute pcs; labels are local to
//!   their function
//! - Comments start with `#`; commas between operands are optional
//! - Lines before the first `.func` belong to an implicit `main`

use crate::virtual_machine::compiled::{CompiledObject, CompiledObjectBuilder, SourceLocation};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Opcode, OperandKind};
use crate::virtual_machine::program::Module;
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = '#';
const LABEL_SUFFIX: char = ':';
const DIRECTIVE_PREFIX: char = '.';
const IMPLICIT_FUNCTION: &str = "main";

/// Return the line/column/message triple for assembly-related errors.
fn assembly_error_location(err: &VMError) -> Option<(usize, usize, String)> {
    match err {
        VMError::AssemblyError {
            line,
            offset,
            message,
        } => Some((*line, *offset, message.clone())),
        VMError::ParseError {
            line,
            offset,
            message,
        } => Some((*line, *offset, message.to_string())),
        _ => None,
    }
}

/// Formats a compiler-style diagnostic for assembly failures.
fn render_assembly_diagnostic(file: &str, source: &str, line: usize, offset: usize, message: &str) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{offset}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(offset.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

/// Renders `err` against `source`, pointing at the failing token when the
/// error carries a position.
pub fn render_diagnostic(file: &str, source: &str, err: &VMError) -> String {
    match assembly_error_location(err) {
        Some((line, offset, message)) => render_assembly_diagnostic(file, source, line, offset, &message),
        None => format!("error: {err}\n"),
    }
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column offset in the line.
    offset: usize,
}

/// Tokenize a single line of assembly.
///
/// Rules:
/// - `#` starts a comment
/// - commas are ignored
/// - whitespace-separated tokens
/// - double-quoted strings form one token
fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token<'_>>, VMError> {
    let mut out = Vec::with_capacity(8);

    let mut start: Option<usize> = None;
    let mut start_col: usize = 0;
    let mut in_str = false;
    let mut end = line.len();

    for (i, b) in line.bytes().enumerate() {
        // comment start
        if b == COMMENT_CHAR as u8 && !in_str {
            end = i;
            break;
        }

        match b {
            b'"' => {
                if start.is_none() {
                    start = Some(i);
                    start_col = i + 1;
                }
                in_str = !in_str;
            }
            b',' | b' ' | b'\t' | b'\r' if !in_str => {
                if let Some(s) = start.take() {
                    out.push(Token {
                        text: &line[s..i],
                        offset: start_col,
                    });
                }
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                    start_col = i + 1;
                }
            }
        }
    }

    if in_str {
        return Err(VMError::ParseError {
            line: line_no,
            offset: start_col,
            message: "unterminated string literal (missing closing quote)",
        });
    }

    if let Some(s) = start {
        out.push(Token {
            text: &line[s..end],
            offset: start_col,
        });
    }

    Ok(out)
}

/// Parse a register token like `r0`, `r15`.
pub(crate) fn parse_reg(tok: &str) -> Result<u8, VMError> {
    tok.strip_prefix('r')
        .ok_or_else(|| VMError::ExpectedRegister(tok.to_string()))?
        .parse::<u8>()
        .map_err(|_| invalid("register", tok))
}

/// Parse a boolean literal (`true` or `false`).
pub(crate) fn parse_bool(tok: &str) -> Result<bool, VMError> {
    match tok {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid("bool", tok)),
    }
}

/// Parse a signed 16-bit immediate and return its field bits.
pub(crate) fn parse_simm16(tok: &str) -> Result<u32, VMError> {
    let v = tok.parse::<i16>().map_err(|_| invalid("16-bit immediate", tok))?;
    Ok(v as u16 as u32)
}

/// Parse a double-quoted string literal.
pub(crate) fn parse_string(tok: &str) -> Result<String, VMError> {
    tok.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .map(str::to_string)
        .ok_or_else(|| invalid("string", tok))
}

fn parse_number<T: std::str::FromStr>(tok: &str, expected: &'static str) -> Result<T, VMError> {
    tok.parse::<T>().map_err(|_| invalid(expected, tok))
}

fn invalid(expected: &'static str, tok: &str) -> VMError {
    VMError::InvalidOperand {
        expected,
        token: tok.to_string(),
    }
}

/// Checks if a token is a label definition (ends with `:`)
fn is_label_def(tok: &str) -> bool {
    tok.ends_with(LABEL_SUFFIX) && tok.len() > 1
}

/// Extracts the label name from a label definition token.
fn label_name(tok: &str) -> &str {
    &tok[..tok.len() - 1]
}

/// Wraps `err` with the position of `tok`.
fn at(line: usize, tok: &Token, err: VMError) -> VMError {
    match err {
        VMError::AssemblyError { .. } | VMError::ParseError { .. } => err,
        other => VMError::AssemblyError {
            line,
            offset: tok.offset,
            message: other.to_string(),
        },
    }
}

/// One `.func` block (or the implicit `main`) after the first pass.
#[derive(Debug)]
struct FunctionSource<'a> {
    name: String,
    params: u16,
    locals: u16,
    /// Line of the `.func` directive (1 for the implicit function).
    line: usize,
    /// Label name to absolute pc within this function.
    labels: HashMap<String, usize>,
    /// Instruction lines: (line number, tokens starting at the mnemonic).
    lines: Vec<(usize, Vec<Token<'a>>)>,
}

impl<'a> FunctionSource<'a> {
    fn new(name: impl Into<String>, params: u16, line: usize) -> Self {
        Self {
            name: name.into(),
            params,
            locals: 0,
            line,
            labels: HashMap::new(),
            lines: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.labels.is_empty() && self.locals == 0
    }

    fn define_label(&mut self, name: &str) -> Result<(), VMError> {
        if self.labels.contains_key(name) {
            return Err(VMError::DuplicateLabel(name.to_string()));
        }
        self.labels.insert(name.to_string(), self.lines.len());
        Ok(())
    }
}

/// Result of the first pass over a source file.
struct SourceOutline<'a> {
    functions: Vec<FunctionSource<'a>>,
    globals: u16,
    /// `.entry` target with the position of its name token.
    entry: Option<(String, usize, usize)>,
}

fn directive_arg<'t, 'a>(args: &'t [Token<'a>], i: usize, line: usize, offset: usize) -> Result<&'t Token<'a>, VMError> {
    args.get(i).ok_or(VMError::ParseError {
        line,
        offset,
        message: "directive is missing an argument",
    })
}

/// Pass 1: split the source into functions, record labels and directives.
fn outline(source: &str) -> Result<SourceOutline<'_>, VMError> {
    let mut functions = Vec::new();
    let mut current = FunctionSource::new(IMPLICIT_FUNCTION, 0, 1);
    let mut implicit = true;
    let mut globals = 0u16;
    let mut entry = None;

    for (idx, line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let tokens = tokenize(line_no, line)?;
        let Some(first) = tokens.first() else {
            continue;
        };

        if first.text.starts_with(DIRECTIVE_PREFIX) {
            let args = &tokens[1..];
            let arg = |i: usize| directive_arg(args, i, line_no, first.offset);
            match first.text {
                ".globals" => {
                    let tok = arg(0)?;
                    globals = parse_number(tok.text, "global count").map_err(|e| at(line_no, tok, e))?;
                }
                ".locals" => {
                    let tok = arg(0)?;
                    current.locals = parse_number(tok.text, "local count").map_err(|e| at(line_no, tok, e))?;
                }
                ".entry" => {
                    let tok = arg(0)?;
                    entry = Some((tok.text.to_string(), line_no, tok.offset));
                }
                ".func" => {
                    let name = arg(0)?;
                    let params = match args.get(1) {
                        Some(tok) => parse_number(tok.text, "parameter count").map_err(|e| at(line_no, tok, e))?,
                        None => 0,
                    };
                    let next = FunctionSource::new(name.text, params, line_no);
                    let finished = std::mem::replace(&mut current, next);
                    if !(implicit && finished.is_empty()) {
                        functions.push(finished);
                    }
                    implicit = false;
                }
                _ => {
                    return Err(VMError::ParseError {
                        line: line_no,
                        offset: first.offset,
                        message: "unknown directive",
                    });
                }
            }
            if args.len() > 2 || (first.text != ".func" && args.len() > 1) {
                return Err(VMError::ParseError {
                    line: line_no,
                    offset: args[args.len() - 1].offset,
                    message: "too many directive arguments",
                });
            }
            continue;
        }

        // A label may share its line with an instruction.
        let mut rest = &tokens[..];
        if is_label_def(first.text) {
            current
                .define_label(label_name(first.text))
                .map_err(|e| at(line_no, first, e))?;
            rest = &tokens[1..];
        }
        if !rest.is_empty() {
            current.lines.push((line_no, rest.to_vec()));
        }
    }

    functions.push(current);

    Ok(SourceOutline {
        functions,
        globals,
        entry,
    })
}

/// Assembly context for constant interning and name resolution while one
/// function is compiled.
struct AsmContext<'m> {
    module: &'m mut Module,
    functions: &'m HashMap<String, u16>,
    labels: &'m HashMap<String, usize>,
}

impl AsmContext<'_> {
    /// Parses one operand into the value stored in its bit field.
    fn operand(&mut self, kind: OperandKind, tok: &str) -> Result<u32, VMError> {
        let index = match kind {
            OperandKind::Reg => return parse_reg(tok).map(u32::from),
            OperandKind::Bool => return parse_bool(tok).map(u32::from),
            OperandKind::SImm16 => return parse_simm16(tok),
            OperandKind::Slot => parse_number::<u16>(tok.strip_prefix('g').unwrap_or(tok), "global slot")?,
            OperandKind::ConstI32 => self.module.i32_constants.add(parse_number(tok, "i32 literal")?)?,
            OperandKind::ConstI64 => self.module.i64_constants.add(parse_number(tok, "i64 literal")?)?,
            OperandKind::ConstF32 => self.module.f32_constants.add(parse_number(tok, "f32 literal")?)?,
            OperandKind::ConstF64 => self.module.f64_constants.add(parse_number(tok, "f64 literal")?)?,
            OperandKind::Str => self.module.strings.add(parse_string(tok)?)?,
            OperandKind::Func => *self
                .functions
                .get(tok)
                .ok_or_else(|| VMError::UndefinedFunction(tok.to_string()))?,
            OperandKind::Label => return self.label(tok),
        };
        Ok(index as u32)
    }

    /// Resolves a jump target: an absolute pc or a label of this function.
    fn label(&self, tok: &str) -> Result<u32, VMError> {
        if let Ok(pc) = tok.parse::<u32>() {
            return Ok(pc);
        }
        let pc = self
            .labels
            .get(tok)
            .ok_or_else(|| VMError::UndefinedLabel(tok.to_string()))?;
        u32::try_from(*pc).map_err(|_| invalid("jump target", tok))
    }
}

/// Pass 2: encode one function's instructions.
fn compile_function(
    file: &str,
    func: &FunctionSource,
    module: &mut Module,
    functions: &HashMap<String, u16>,
) -> Result<CompiledObject, VMError> {
    let mut builder = CompiledObjectBuilder::new(func.name.clone(), SourceLocation::new(file, func.line as u32));
    builder.set_param_count(func.params);
    builder.set_local_count(func.locals);

    let mut ctx = AsmContext {
        module,
        functions,
        labels: &func.labels,
    };
    let mut highest_register: Option<u8> = None;

    for (line_no, tokens) in &func.lines {
        let line_no = *line_no;
        let mnemonic = &tokens[0];
        let opcode = Opcode::from_mnemonic(mnemonic.text)
            .ok_or_else(|| at(line_no, mnemonic, VMError::InvalidInstructionName(mnemonic.text.to_string())))?;

        let specs = opcode.operands();
        let args = &tokens[1..];
        if args.len() != specs.len() {
            return Err(at(
                line_no,
                mnemonic,
                VMError::OperandCount {
                    instruction: mnemonic.text.to_string(),
                    expected: specs.len(),
                    actual: args.len(),
                },
            ));
        }

        let mut values = Vec::with_capacity(specs.len());
        for (spec, tok) in specs.iter().zip(args) {
            let value = ctx.operand(spec.kind, tok.text).map_err(|e| at(line_no, tok, e))?;
            if spec.kind == OperandKind::Reg {
                highest_register = highest_register.max(Some(value as u8));
            }
            values.push(value);
        }
        builder
            .emit(opcode, &values)
            .map_err(|e| at(line_no, mnemonic, e))?;
    }

    // Record register usage through the allocator so the frame window covers
    // every register the code touches.
    if let Some(highest) = highest_register {
        for _ in 0..=highest {
            builder.allocate_register()?;
        }
        builder.free_registers(builder.live_registers())?;
    }

    Ok(builder.finalize())
}

/// Assemble a full source string into a module.
///
/// Uses two-pass assembly:
/// 1. First pass: tokenize lines, split functions, record labels and directives
/// 2. Second pass: parse operands with name resolution and encode instructions
pub fn assemble_source(source: &str) -> Result<Module, VMError> {
    assemble_source_with_name(source, "<source>")
}

/// Assembles source with an associated filename recorded in each function's
/// [`SourceLocation`].
pub fn assemble_source_with_name(source: &str, file: &str) -> Result<Module, VMError> {
    let outline = outline(source)?;

    let mut names = HashMap::new();
    for (index, func) in outline.functions.iter().enumerate() {
        let index = u16::try_from(index).map_err(|_| VMError::AssemblyError {
            line: func.line,
            offset: 1,
            message: "too many functions".to_string(),
        })?;
        if names.insert(func.name.clone(), index).is_some() {
            return Err(VMError::AssemblyError {
                line: func.line,
                offset: 1,
                message: VMError::DuplicateFunction(func.name.clone()).to_string(),
            });
        }
    }

    let mut module = Module::new();
    module.set_global_count(outline.globals);
    for func in &outline.functions {
        let compiled = compile_function(file, func, &mut module, &names)?;
        module.add_function(compiled)?;
    }

    let entry = match &outline.entry {
        Some((name, line, offset)) => *names.get(name).ok_or_else(|| VMError::AssemblyError {
            line: *line,
            offset: *offset,
            message: VMError::UndefinedFunction(name.clone()).to_string(),
        })?,
        None => names.get(IMPLICIT_FUNCTION).copied().unwrap_or(0),
    };
    module.set_entry(entry);

    Ok(module)
}

/// Convenience: assemble directly from file path
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Module, VMError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref)?;
    assemble_source_with_name(&source, &path_ref.display().to_string())
}
