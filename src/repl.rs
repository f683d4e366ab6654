// File: src/repl.rs
//
// Interactive REPL for Carblang. Keeps one VM alive for the whole session so
// globals persist between inputs, supports multi-line entry while
// delimiters are open, and reports errors without ending the session.

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::compiler;
use crate::lexer;
use crate::parser::Parser;
use crate::vm::Vm;

pub struct Repl {
    vm: Vm,
    editor: DefaultEditor,
}

impl Repl {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let editor = DefaultEditor::new()?;
        Ok(Repl { vm: Vm::new(), editor })
    }

    fn show_banner(&self) {
        println!("{}", format!("Carblang {} interactive shell", env!("CARGO_PKG_VERSION")).bright_cyan());
        println!("Type {} for commands, {} to leave.", ":help".bright_yellow(), ":quit".bright_yellow());
        println!();
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.show_banner();

        let mut buffer = String::new();

        loop {
            let prompt = if buffer.is_empty() {
                "carb> ".bright_green().to_string()
            } else {
                "....> ".bright_blue().to_string()
            };

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());

                    if buffer.is_empty() && line.trim_start().starts_with(':') {
                        if !self.handle_command(line.trim()) {
                            break;
                        }
                        continue;
                    }

                    buffer.push_str(&line);
                    buffer.push('\n');

                    if input_complete(&buffer) {
                        self.eval(&buffer);
                        buffer.clear();
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C (input cleared, :quit to exit)".bright_yellow());
                    buffer.clear();
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "Goodbye!".bright_cyan());
                    break;
                }
                Err(err) => {
                    eprintln!("{} {}", "Error:".bright_red(), err);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Returns false when the session should end
    fn handle_command(&mut self, command: &str) -> bool {
        match command {
            ":help" | ":h" => {
                println!("  {}   show this help", ":help".bright_yellow());
                println!("  {}   leave the shell", ":quit".bright_yellow());
                println!("Anything else is evaluated as Carblang source.");
                true
            }
            ":quit" | ":q" | ":exit" => false,
            _ => {
                println!("Unknown command {} (try :help)", command.bright_yellow());
                true
            }
        }
    }

    fn eval(&mut self, source: &str) {
        let (tokens, scan_errors) = lexer::scan(source);
        let (statements, parse_errors) = Parser::new(tokens).parse();

        if !scan_errors.is_empty() || !parse_errors.is_empty() {
            for error in scan_errors.iter().chain(parse_errors.iter()) {
                eprintln!("{}", error);
            }
            return;
        }

        match compiler::compile(&statements) {
            Ok(chunk) => {
                if let Err(message) = self.vm.interpret(chunk) {
                    eprintln!("{}", message.red());
                }
            }
            Err(error) => eprintln!("{}", error),
        }
    }
}

/// A buffer is submittable once every paren, brace and bracket opened in it
/// has been closed. String contents and comments are skipped.
fn input_complete(buffer: &str) -> bool {
    let mut depth = 0i64;
    let mut in_string = false;
    let mut bytes = buffer.bytes().peekable();

    while let Some(b) = bytes.next() {
        if in_string {
            if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'/' if bytes.peek() == Some(&b'/') => {
                for rest in bytes.by_ref() {
                    if rest == b'\n' {
                        break;
                    }
                }
            }
            b'(' | b'{' | b'[' => depth += 1,
            b')' | b'}' | b']' => depth -= 1,
            _ => {}
        }
    }

    depth <= 0 && !in_string
}
