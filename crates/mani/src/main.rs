use std::io::Read;

use mani_core::value::Value;
use mani_vm::vm::Vm;

/// Scanner, parser, or generator rejected the input.
const EXIT_DATAERR: i32 = 65;
/// The VM faulted while running the program.
const EXIT_SOFTWARE: i32 = 70;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("compile") => match args.get(2) {
            Some(path) => compile_file(path),
            None => usage_error("compile needs a file"),
        },
        Some("run") => match args.get(2) {
            Some(path) => run_file(path),
            None => usage_error("run needs a file"),
        },
        Some("-") => run_stdin(),
        Some("-h") | Some("--help") => {
            print_usage();
        }
        Some(path) => run_file(path),
        None => {
            if stdin_is_tty() {
                run_repl();
            } else {
                run_stdin();
            }
        }
    }
}

fn print_usage() {
    println!("usage: mani [compile|run] <file> | mani - | mani");
    println!("  compile <file>   disassemble the compiled chunk");
    println!("  run <file>       execute a script (plain <file> also works)");
    println!("  -                execute a script read from stdin");
    println!("  (no arguments)   interactive shell");
}

fn usage_error(message: &str) {
    eprintln!("mani: {message}");
    print_usage();
    std::process::exit(2);
}

fn read_source(path: &str) -> String {
    match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("mani: cannot open {path}: {e}");
            std::process::exit(2);
        }
    }
}

fn compile_file(path: &str) {
    let source = read_source(path);
    match mani_compiler::compile(&source) {
        Ok((chunk, strings)) => {
            print!("{}", mani_compiler::disasm::disassemble(&chunk, &strings));
        }
        Err(e) => {
            eprintln!("mani: {path}: {e}");
            std::process::exit(EXIT_DATAERR);
        }
    }
}

fn run_file(path: &str) {
    let source = read_source(path);
    run_source(&source, path);
}

fn run_stdin() {
    let mut source = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut source) {
        eprintln!("mani: cannot read stdin: {e}");
        std::process::exit(2);
    }
    run_source(&source, "stdin");
}

fn run_source(source: &str, origin: &str) {
    let (chunk, strings) = match mani_compiler::compile(source) {
        Ok(compiled) => compiled,
        Err(e) => {
            eprintln!("mani: {origin}: {e}");
            std::process::exit(EXIT_DATAERR);
        }
    };
    let mut vm = Vm::new();
    match vm.execute(&chunk, strings) {
        Ok(result) => {
            if !result.is_nil() {
                println!("{}", format_value(result, &vm));
            }
        }
        Err(e) => {
            eprintln!("mani: {origin}: {e}");
            std::process::exit(EXIT_SOFTWARE);
        }
    }
}

fn run_repl() {
    println!("Mani 0.1.0");
    let mut editor = match rustyline::DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("mani: cannot initialize shell: {e}");
            return;
        }
    };

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                // Try as an expression first, then as statements.
                let as_expr = format!("return {line}");
                if !try_line(&as_expr) {
                    try_line_or_report(line);
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => continue,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("mani: readline error: {e}");
                break;
            }
        }
    }
}

/// Evaluate one shell line. Returns false if it failed to compile (so the
/// caller can retry in statement form).
fn try_line(source: &str) -> bool {
    let (chunk, strings) = match mani_compiler::compile(source) {
        Ok(compiled) => compiled,
        Err(_) => return false,
    };
    let mut vm = Vm::new();
    match vm.execute(&chunk, strings) {
        Ok(result) => {
            if !result.is_nil() {
                println!("{}", format_value(result, &vm));
            }
        }
        Err(e) => eprintln!("{e}"),
    }
    true
}

fn try_line_or_report(source: &str) {
    match mani_compiler::compile(source) {
        Ok((chunk, strings)) => {
            let mut vm = Vm::new();
            match vm.execute(&chunk, strings) {
                Ok(result) => {
                    if !result.is_nil() {
                        println!("{}", format_value(result, &vm));
                    }
                }
                Err(e) => eprintln!("{e}"),
            }
            let _ = vm.collect_garbage();
        }
        Err(e) => eprintln!("{e}"),
    }
}

fn format_value(value: Value, vm: &Vm) -> String {
    match value {
        Value::Str(id) => vm.strings.get_lossy(id).into_owned(),
        other => format!("{other}"),
    }
}

fn stdin_is_tty() -> bool {
    #[cfg(unix)]
    {
        extern "C" {
            fn isatty(fd: i32) -> i32;
        }
        unsafe { isatty(0) != 0 }
    }
    #[cfg(not(unix))]
    {
        true
    }
}
