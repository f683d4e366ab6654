// File: src/errors.rs
//
// Error reporting for Carblang. One structured error type covers the three
// failure kinds (scan/parse, compile, runtime); the driver maps each kind to
// its process exit code. There is no user-level exception handling: any
// runtime error unwinds the whole VM.

use colored::Colorize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Lexical or syntax error found before execution (exit 65)
    Parse,
    /// Limit violated while emitting bytecode (exit 65)
    Compile,
    /// Error thrown while the VM is executing (exit 70)
    Runtime,
}

/// A diagnostic with optional source position. Parse errors render in the
/// classic `[line N] Error at "lexeme": message` shape; runtime errors print
/// the message first and the line, when one is known, on the next line.
#[derive(Debug, Clone)]
pub struct CarbError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: Option<usize>,
    pub lexeme: Option<String>,
}

impl CarbError {
    pub fn parse(message: impl Into<String>, line: usize, lexeme: impl Into<String>) -> Self {
        CarbError {
            kind: ErrorKind::Parse,
            message: message.into(),
            line: Some(line),
            lexeme: Some(lexeme.into()),
        }
    }

    /// A parse error reported at end of input, where no lexeme exists
    pub fn parse_at_end(message: impl Into<String>, line: usize) -> Self {
        CarbError { kind: ErrorKind::Parse, message: message.into(), line: Some(line), lexeme: None }
    }

    pub fn compile(message: impl Into<String>) -> Self {
        CarbError { kind: ErrorKind::Compile, message: message.into(), line: None, lexeme: None }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        CarbError { kind: ErrorKind::Runtime, message: message.into(), line: None, lexeme: None }
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for CarbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ErrorKind::Parse => {
                let line = self.line.unwrap_or(0);
                let text = match &self.lexeme {
                    Some(lexeme) => {
                        format!("[line {}] Error at \"{}\": {}", line, lexeme, self.message)
                    }
                    None => format!("[line {}] Error at end: {}", line, self.message),
                };
                write!(f, "{}", text.red())
            }
            ErrorKind::Compile => {
                write!(f, "{}", format!("Compile error: {}", self.message).red())
            }
            ErrorKind::Runtime => {
                write!(f, "{}", self.message.red())?;
                if let Some(line) = self.line {
                    write!(f, "\n[line {}]", line)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for CarbError {}
