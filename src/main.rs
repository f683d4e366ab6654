// File: src/main.rs
//
// Entry point for the Carblang interpreter. Running with a script path
// executes the file; running with no arguments starts the interactive
// shell. Exit codes: 64 usage error, 65 parse/compile error, 70 runtime
// error, 74 unreadable script, 0 success.

mod ast;
mod builtins;
mod bytecode;
mod compiler;
mod errors;
mod lexer;
mod parser;
mod repl;
mod value;
mod vm;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;
use colored::Colorize;

use crate::errors::CarbError;
use crate::parser::Parser;
use crate::vm::Vm;

const EXIT_USAGE: u8 = 64;
const EXIT_DATA: u8 = 65;
const EXIT_SOFTWARE: u8 = 70;
const EXIT_IO: u8 = 74;

#[derive(ClapParser)]
#[command(
    name = "carblang",
    about = "Carblang: a small dynamically-typed scripting language",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    /// Script to run; omit to start the interactive shell
    script: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            eprintln!("{}", error);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    match cli.script {
        Some(path) => run_file(&path),
        None => match repl::Repl::new() {
            Ok(mut repl) => {
                if let Err(error) = repl.run() {
                    eprintln!("{} {}", "REPL error:".bright_red(), error);
                    return ExitCode::from(EXIT_SOFTWARE);
                }
                ExitCode::SUCCESS
            }
            Err(error) => {
                eprintln!("{} {}", "Failed to start REPL:".bright_red(), error);
                ExitCode::from(EXIT_SOFTWARE)
            }
        },
    }
}

fn run_file(path: &PathBuf) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Failed to open file {}: {}", path.display(), error);
            return ExitCode::from(EXIT_IO);
        }
    };

    let (tokens, scan_errors) = lexer::scan(&source);
    let (statements, parse_errors) = Parser::new(tokens).parse();

    if !scan_errors.is_empty() || !parse_errors.is_empty() {
        for error in scan_errors.iter().chain(parse_errors.iter()) {
            eprintln!("{}", error);
        }
        return ExitCode::from(EXIT_DATA);
    }

    let chunk = match compiler::compile(&statements) {
        Ok(chunk) => chunk,
        Err(error) => {
            eprintln!("{}", error);
            return ExitCode::from(EXIT_DATA);
        }
    };

    let mut vm = Vm::new();
    match vm.interpret(chunk) {
        Ok(_) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{}", CarbError::runtime(message));
            ExitCode::from(EXIT_SOFTWARE)
        }
    }
}
