//! A long‑lived evaluation session.
//!
//! One `Lox` owns one [`Interpreter`], so globals and resolved locals carry
//! over from one `run` to the next.  The REPL feeds every line through the
//! same session; a file run uses a fresh one.

use std::io::Write;

use log::info;

use crate::error::LoxError;
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::{scan_all, scan_tokens};
use crate::value::Value;

pub struct Lox {
    interpreter: Interpreter,
}

impl Lox {
    pub fn new() -> Self {
        Lox {
            interpreter: Interpreter::new(),
        }
    }

    /// A session whose `print` output goes to `out`.
    pub fn with_output(out: Box<dyn Write>) -> Self {
        Lox {
            interpreter: Interpreter::with_output(out),
        }
    }

    /// Scan, parse, resolve, then execute `source`.
    ///
    /// Lexing and syntax errors are reported together, lexing first; the
    /// resolver only sees a program that scanned and parsed cleanly.  Nothing
    /// runs unless every static phase was clean.
    pub fn run(&mut self, source: &str) -> Result<(), Vec<LoxError>> {
        let (tokens, mut errors) = scan_all(source);

        let statements = match Parser::new(tokens).parse() {
            Ok(statements) => statements,
            Err(parse_errors) => {
                errors.extend(parse_errors);
                return Err(errors);
            }
        };
        if !errors.is_empty() {
            return Err(errors);
        }

        let locals = Resolver::new().resolve(&statements)?;
        self.interpreter.note_locals(locals);

        info!("Running {} statement(s)", statements.len());
        self.interpreter.interpret(&statements).map_err(|e| vec![e])
    }

    /// Evaluate `source` as one expression against the session's globals.
    pub fn evaluate(&mut self, source: &str) -> Result<Value, Vec<LoxError>> {
        let tokens = scan_tokens(source)?;
        let expr = Parser::new(tokens).parse_expression()?;

        self.interpreter.evaluate(&expr).map_err(|e| vec![e])
    }
}

impl Default for Lox {
    fn default() -> Self {
        Self::new()
    }
}
