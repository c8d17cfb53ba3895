//! The `luna` command line: interactive REPL, script runner, chunk compiler
//! and disassembler.

use std::path::{Path, PathBuf};

use rustyline::{error::ReadlineError, DefaultEditor};

use luna_compiler::{compile, decode_chunk, disassemble, encode_chunk, Compiler, MAGIC};
use luna_core::{LuaError, LuaValue};
use luna_parser::ast::{Block, Expr, Stmt};
use luna_parser::Parser;
use luna_vm::Vm;

// ── Shared plumbing ───────────────────────────────────────────────────────────

fn run_block(vm: &mut Vm, block: &Block) -> Result<Vec<LuaValue>, LuaError> {
    let chunk = Compiler::new("<stdin>").compile(block)?;
    let f = vm.load(&chunk);
    vm.call(f, Vec::new())
}

fn print_values(vals: &[LuaValue]) {
    if !vals.is_empty() {
        let parts: Vec<String> = vals.iter().map(|v| v.to_string()).collect();
        println!("{}", parts.join("\t"));
    }
}

/// A parse failure that ran off the end of the line means the statement is
/// unfinished, not wrong; the REPL keeps reading in that case.
fn is_incomplete(err: &LuaError) -> bool {
    match err {
        LuaError::Compile { message, .. } => message.contains("Eof"),
        _ => false,
    }
}

// ── Interactive REPL ──────────────────────────────────────────────────────────

/// Every REPL line compiles as a fresh chunk, so a true `local` would vanish
/// as soon as its chunk returned. Rewrite top-level declarations into global
/// assignments to make bindings stick across lines.
fn hoist_locals(block: &mut Block) {
    for stmt in &mut block.stmts {
        let owned = std::mem::replace(stmt, Stmt::Break(0));
        *stmt = match owned {
            Stmt::Local { names, values, line } => {
                let values = if values.is_empty() {
                    vec![Expr::Nil(line)]
                } else {
                    values
                };
                Stmt::Assign {
                    targets: names.into_iter().map(|n| Expr::Name(n, line)).collect(),
                    values,
                    line,
                }
            }
            Stmt::LocalFn { name, body, line } => Stmt::Assign {
                targets: vec![Expr::Name(name, line)],
                values: vec![Expr::FnDef(body)],
                line,
            },
            other => other,
        };
    }
}

enum Submit {
    /// The buffer was consumed, start a fresh statement.
    Done,
    /// The buffer looks unfinished, keep accumulating lines.
    More,
}

fn eval_line(vm: &mut Vm, buf: &str) -> Submit {
    // Statements first; expressions get a second chance as `return <line>`.
    let stmt_parse = Parser::new(buf).and_then(|p| p.parse());
    match stmt_parse {
        Ok(mut block) => {
            hoist_locals(&mut block);
            match run_block(vm, &block) {
                Ok(vals) => print_values(&vals),
                Err(e) => eprintln!("luna: {e}"),
            }
            Submit::Done
        }
        Err(stmt_err) if is_incomplete(&stmt_err) => Submit::More,
        Err(stmt_err) => {
            let retry = format!("return {buf}");
            match Parser::new(&retry).and_then(|p| p.parse()) {
                Ok(block) => {
                    match run_block(vm, &block) {
                        Ok(vals) => print_values(&vals),
                        Err(e) => eprintln!("luna: {e}"),
                    }
                    Submit::Done
                }
                Err(expr_err) if is_incomplete(&expr_err) => Submit::More,
                Err(_) => {
                    eprintln!("luna: {stmt_err}");
                    Submit::Done
                }
            }
        }
    }
}

fn repl() {
    println!("luna {}  (Ctrl-D to exit)", env!("CARGO_PKG_VERSION"));

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("luna: cannot initialize line editor: {e}");
            std::process::exit(1);
        }
    };
    let mut vm = Vm::new();
    let mut buf = String::new();

    loop {
        let prompt = if buf.is_empty() { "> " } else { ">> " };
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim_end();
                if buf.is_empty() {
                    if line.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(line);
                } else {
                    buf.push('\n');
                }
                buf.push_str(line);
                if let Submit::Done = eval_line(&mut vm, &buf) {
                    buf.clear();
                }
            }
            // Ctrl-C cancels whatever is being typed.
            Err(ReadlineError::Interrupted) => {
                buf.clear();
            }
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                eprintln!("luna: read error: {e}");
                break;
            }
        }
    }
}

// ── Script runner ─────────────────────────────────────────────────────────────

fn run_file(path: &str) {
    let raw = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("luna: cannot read '{path}': {e}");
            std::process::exit(1);
        }
    };

    let mut vm = Vm::new();
    let result = if raw.starts_with(MAGIC) {
        decode_chunk(&raw).and_then(|chunk| {
            let f = vm.load(&chunk);
            vm.call(f, Vec::new())
        })
    } else {
        match String::from_utf8(raw) {
            Ok(src) => vm.run_source(&src, path),
            Err(_) => {
                eprintln!("luna: '{path}' is neither UTF-8 source nor a compiled chunk");
                std::process::exit(1);
            }
        }
    };

    if let Err(e) = result {
        eprintln!("luna: {e}");
        std::process::exit(1);
    }
}

// ── Compile to a chunk file ───────────────────────────────────────────────────

fn compile_file(src_path: &str, out_path: Option<&str>) {
    let src = match std::fs::read_to_string(src_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("luna: cannot read '{src_path}': {e}");
            std::process::exit(1);
        }
    };
    let chunk = match compile(&src, src_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("luna: {e}");
            std::process::exit(1);
        }
    };
    let bytes = encode_chunk(&chunk);

    let dest: PathBuf = match out_path {
        Some(p) => p.into(),
        None => Path::new(src_path).with_extension("luac"),
    };
    if let Err(e) = std::fs::write(&dest, &bytes) {
        eprintln!("luna: cannot write '{}': {e}", dest.display());
        std::process::exit(1);
    }
    eprintln!("luna: wrote {} bytes to '{}'", bytes.len(), dest.display());
}

// ── Disassembly listing ───────────────────────────────────────────────────────

fn dump_file(path: &str) {
    let raw = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("luna: cannot read '{path}': {e}");
            std::process::exit(1);
        }
    };

    let chunk = if raw.starts_with(MAGIC) {
        decode_chunk(&raw)
    } else {
        match String::from_utf8(raw) {
            Ok(src) => compile(&src, path),
            Err(_) => {
                eprintln!("luna: '{path}' is neither UTF-8 source nor a compiled chunk");
                std::process::exit(1);
            }
        }
    };
    match chunk {
        Ok(c) => print!("{}", disassemble(&c.proto)),
        Err(e) => {
            eprintln!("luna: {e}");
            std::process::exit(1);
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn usage() -> ! {
    eprintln!("usage: luna [script.lua | script.luac]");
    eprintln!("       luna -c|--compile script.lua [out.luac]");
    eprintln!("       luna -d|--dump script.lua|script.luac");
    std::process::exit(2);
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => repl(),
        [flag, rest @ ..] if flag == "-c" || flag == "--compile" => match rest {
            [src] => compile_file(src, None),
            [src, out] => compile_file(src, Some(out)),
            _ => usage(),
        },
        [flag, path] if flag == "-d" || flag == "--dump" => dump_file(path),
        [path] if !path.starts_with('-') => run_file(path),
        _ => usage(),
    }
}
