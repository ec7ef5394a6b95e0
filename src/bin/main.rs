use fnlang::{FnTracer, Vm, VmOptions};
use std::env;
use std::fs;
use std::io::{self, BufRead, Write};

const VERSION: &str = "fn 0.1.0 (fnlang)";

fn print_usage() {
    eprintln!("usage: fn [options] [script]");
    eprintln!("Available options are:");
    eprintln!("  -e stat   execute string 'stat'");
    eprintln!("  -i        enter interactive mode after executing 'script'");
    eprintln!("  -v        show version information");
    eprintln!("  --        stop handling options");
}

fn print_version() {
    println!("{VERSION}");
}

#[derive(Default)]
struct Options {
    execute_strings: Vec<String>,
    interactive: bool,
    script_file: Option<String>,
    show_version: bool,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    let mut opts = Options::default();
    let mut i = 1;
    let mut stop_options = false;

    while i < args.len() {
        let arg = &args[i];
        if !stop_options && arg.starts_with('-') && arg != "-" {
            match arg.as_str() {
                "-e" => {
                    i += 1;
                    if i >= args.len() {
                        return Err("'-e' needs argument".to_string());
                    }
                    opts.execute_strings.push(args[i].clone());
                }
                "-i" => opts.interactive = true,
                "-v" => opts.show_version = true,
                "--" => stop_options = true,
                _ => return Err(format!("unrecognized option '{arg}'")),
            }
        } else {
            opts.script_file = Some(arg.clone());
            break;
        }
        i += 1;
    }

    Ok(opts)
}

fn execute_file(vm: &mut Vm<FnTracer>, filename: &str) -> Result<(), String> {
    let source = fs::read_to_string(filename).map_err(|e| format!("cannot open {filename}: {e}"))?;
    vm.eval_source(&source, filename).map_err(|e| e.to_string())?;
    Ok(())
}

/// A line that fails to parse only because it ran out of input before a
/// form closed (`FnErrorKind::ParseResumable`, see spec.md §4.6) gets another
/// line appended and is retried, rather than reported as a syntax error —
/// the same resumable-EOF loop `include/scan.hpp`/`src/interpret.cpp` use.
fn run_repl(vm: &mut Vm<FnTracer>) {
    println!("{VERSION}");
    println!("Type (exit) or Ctrl+D to quit.\n");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut pending = String::new();

    loop {
        if pending.is_empty() {
            print!("fn> ");
        } else {
            print!(" .. ");
        }
        io::stdout().flush().ok();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(_)) | None => break,
        };

        if !pending.is_empty() {
            pending.push('\n');
        }
        pending.push_str(&line);

        match vm.eval_source(&pending, "<repl>") {
            Ok(v) => {
                if !v.is_nil() {
                    println!("{}", vm.display(v));
                }
                pending.clear();
            }
            Err(e) if e.is_resumable() => continue,
            Err(e) => {
                eprintln!("{e}");
                pending.clear();
            }
        }
    }
}

fn main() {
    #[cfg(feature = "cli-tracing")]
    {
        use tracing_subscriber::EnvFilter;
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .init();
    }

    let opts = match parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("fn: {e}");
            print_usage();
            std::process::exit(1);
        }
    };

    if opts.show_version {
        print_version();
        if opts.execute_strings.is_empty() && opts.script_file.is_none() {
            return;
        }
    }

    let mut vm = Vm::new(&VmOptions::default());

    for code in &opts.execute_strings {
        if let Err(e) = vm.eval_source(code, "<command-line>") {
            eprintln!("fn: {e}");
            std::process::exit(1);
        }
    }

    if let Some(filename) = &opts.script_file {
        if let Err(e) = execute_file(&mut vm, filename) {
            eprintln!("fn: {e}");
            std::process::exit(1);
        }
    }

    if opts.interactive || (opts.execute_strings.is_empty() && opts.script_file.is_none()) {
        run_repl(&mut vm);
    }
}
