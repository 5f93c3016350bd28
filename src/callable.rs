use std::fmt;
use std::rc::Rc;

use chrono::Utc;

use crate::error::{LoxError, Result};
use crate::interpreter::Interpreter;
use crate::token::Token;
use crate::value::Value;

/// Anything a Lox call expression can invoke.
///
/// The interpreter checks `arity` against the argument count before `call`
/// runs, so implementations may index `arguments` freely.
pub trait Callable {
    fn arity(&self) -> usize;

    /// `paren` is the call's closing parenthesis, used to position errors.
    fn call(
        self: &Rc<Self>,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
        paren: &Token,
    ) -> Result<Value>;
}

/// A host function exposed to Lox code.
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub func: fn(&[Value]) -> std::result::Result<Value, String>,
}

impl NativeFunction {
    /// `clock()`: seconds since the Unix epoch as a fractional number.
    pub fn clock() -> Self {
        NativeFunction {
            name: "clock",
            arity: 0,
            func: clock,
        }
    }
}

fn clock(_arguments: &[Value]) -> std::result::Result<Value, String> {
    let micros: i64 = Utc::now().timestamp_micros();

    Ok(Value::Number(micros as f64 / 1_000_000.0))
}

impl Callable for NativeFunction {
    fn arity(&self) -> usize {
        self.arity
    }

    fn call(
        self: &Rc<Self>,
        _interpreter: &mut Interpreter,
        arguments: Vec<Value>,
        paren: &Token,
    ) -> Result<Value> {
        (self.func)(&arguments).map_err(|message| LoxError::runtime(paren, message))
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}
