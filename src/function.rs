use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::callable::Callable;
use crate::class::LoxInstance;
use crate::environment::Env;
use crate::error::{LoxError, Result};
use crate::interpreter::{Completion, Interpreter};
use crate::stmt::FunctionDecl;
use crate::token::Token;
use crate::value::Value;

/// A user function or method together with the environment it closes over.
pub struct LoxFunction {
    declaration: Rc<FunctionDecl>,
    closure: Env,

    /// Set for a class's `init`; calling it always yields the bound `this`.
    is_initializer: bool,
}

impl LoxFunction {
    pub fn new(declaration: Rc<FunctionDecl>, closure: Env, is_initializer: bool) -> Self {
        LoxFunction {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> &str {
        &self.declaration.name.lexeme
    }

    /// A copy of this method whose closure gains a frame binding `this` to
    /// `instance`.  The declaration itself is shared, not copied.
    pub fn bind(&self, instance: Rc<LoxInstance>) -> LoxFunction {
        let environment: Env = Env::with_enclosing(&self.closure);
        environment.define("this", Value::Instance(instance));

        LoxFunction {
            declaration: Rc::clone(&self.declaration),
            closure: environment,
            is_initializer: self.is_initializer,
        }
    }
}

impl Callable for LoxFunction {
    fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    fn call(
        self: &Rc<Self>,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
        paren: &Token,
    ) -> Result<Value> {
        debug!("Calling {} with {} argument(s)", self, arguments.len());

        let environment: Env = Env::with_enclosing(&self.closure);
        for (param, argument) in self.declaration.params.iter().zip(arguments) {
            environment.define(param.lexeme.as_str(), argument);
        }

        let completion: Completion = interpreter.execute_block(&self.declaration.body, environment)?;

        if self.is_initializer {
            return self
                .closure
                .get_at(0, "this")
                .ok_or_else(|| LoxError::runtime(paren, "Undefined variable 'this'."));
        }

        match completion {
            Completion::Return(value) => Ok(value),
            Completion::Normal => Ok(Value::Nil),
        }
    }
}

impl fmt::Display for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.name())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::parser::Parser;
    use crate::scanner::scan_tokens;
    use crate::stmt::Stmt;

    fn declaration(source: &str) -> Rc<FunctionDecl> {
        let tokens: Vec<Token> = scan_tokens(source).unwrap();
        match Parser::new(tokens).parse().unwrap().remove(0) {
            Stmt::Function(decl) => decl,
            other => panic!("expected a function declaration, got {:?}", other),
        }
    }

    #[test]
    fn unbound_initializer_reports_missing_this() {
        let paren: Token = scan_tokens(")").unwrap().remove(0);
        let init = Rc::new(LoxFunction::new(declaration("fun init() {}"), Env::new(), true));
        let mut interpreter = Interpreter::with_output(Box::new(io::sink()));

        let err = init.call(&mut interpreter, Vec::new(), &paren).unwrap_err();

        assert_eq!(err.to_string(), "Undefined variable 'this'.\n[line 1]");
    }

    #[test]
    fn bound_initializer_returns_its_instance() {
        let paren: Token = scan_tokens(")").unwrap().remove(0);
        let init = LoxFunction::new(declaration("fun init() { return; }"), Env::new(), true);
        let class = Rc::new(crate::class::LoxClass::new("Point".into(), None, Default::default()));
        let instance = Rc::new(LoxInstance::new(Rc::clone(&class)));
        let mut interpreter = Interpreter::with_output(Box::new(io::sink()));

        let bound = Rc::new(init.bind(Rc::clone(&instance)));
        let value = bound.call(&mut interpreter, Vec::new(), &paren).unwrap();

        assert_eq!(value, Value::Instance(instance));
    }
}
