use std::collections::HashMap;
use std::io::{self, Write};
use std::mem;
use std::rc::Rc;

use log::{debug, info, trace};

use crate::callable::{Callable, NativeFunction};
use crate::class::{LoxClass, LoxInstance};
use crate::environment::Env;
use crate::error::{LoxError, Result};
use crate::expr::{Expr, ExprId, LiteralValue};
use crate::function::LoxFunction;
use crate::stmt::{FunctionDecl, Stmt};
use crate::token::{Token, TokenType};
use crate::value::Value;

/// Binding distances computed by the resolver, keyed by expression identity.
/// An expression absent from the table refers to a global.
pub type Locals = HashMap<ExprId, usize>;

/// Deepest Lox call nesting before a runtime "Stack overflow." error.
pub const MAX_CALL_DEPTH: usize = 4096;

/// Free stack to keep before entering a call (100KB red zone).
const RED_ZONE: usize = 100 * 1024;

/// Stack segment to allocate when the red zone is reached (1MB).
const STACK_PER_CALL: usize = 1024 * 1024;

/// How a statement finished.  A `return` travels up through blocks and
/// loops as `Return` until the enclosing call collapses it into a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Normal,
    Return(Value),
}

pub struct Interpreter {
    globals: Env,
    environment: Env,
    locals: Locals,
    out: Box<dyn Write>,

    /// Number of Lox calls currently on the stack.
    depth: usize,
}

impl Interpreter {
    /// Creates an interpreter printing to stdout, with the native `clock`
    /// defined.
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Same as [`Interpreter::new`] but `print` writes to `out`.
    pub fn with_output(out: Box<dyn Write>) -> Self {
        info!("Initializing Interpreter");

        let globals: Env = Env::new();

        debug!("Defining native function 'clock'");
        globals.define("clock", Value::Native(Rc::new(NativeFunction::clock())));

        Self {
            environment: globals.clone(),
            globals,
            locals: Locals::new(),
            out,
            depth: 0,
        }
    }

    /// Merge a resolver table into the one already known.  Entries of earlier
    /// programs stay, since closures they created may still run.
    pub fn note_locals(&mut self, locals: Locals) {
        debug!("Recording {} resolved local(s)", locals.len());
        self.locals.extend(locals);
    }

    /// Runs a program, stopping at the first runtime error.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        debug!("Interpreting {} statements", statements.len());

        for stmt in statements {
            // A resolved program has no top-level `return`.
            self.execute(stmt)?;
        }

        self.out.flush()?;
        info!("Interpretation completed successfully");
        Ok(())
    }

    /// Executes a single statement.
    pub fn execute(&mut self, stmt: &Stmt) -> Result<Completion> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(Completion::Normal)
            }

            Stmt::Print(expr) => {
                let value: Value = self.evaluate(expr)?;
                writeln!(self.out, "{}", value)?;
                debug!("Printed value: {}", value);
                Ok(Completion::Normal)
            }

            Stmt::Var { name, initializer } => {
                let value: Value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Defining variable '{}' = {}", name.lexeme, value);
                self.environment.define(name.lexeme.as_str(), value);
                Ok(Completion::Normal)
            }

            Stmt::Block(statements) => {
                let environment: Env = Env::with_enclosing(&self.environment);
                self.execute_block(statements, environment)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(Completion::Normal)
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let Completion::Return(value) = self.execute(body)? {
                        return Ok(Completion::Return(value));
                    }
                }
                Ok(Completion::Normal)
            }

            Stmt::Function(declaration) => {
                debug!("Defining function '{}'", declaration.name.lexeme);
                let function = LoxFunction::new(
                    Rc::clone(declaration),
                    self.environment.clone(),
                    false,
                );
                self.environment.define(
                    declaration.name.lexeme.as_str(),
                    Value::Function(Rc::new(function)),
                );
                Ok(Completion::Normal)
            }

            Stmt::Return { value, .. } => {
                let value: Value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Returning value: {}", value);
                Ok(Completion::Return(value))
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                self.execute_class(name, superclass.as_ref(), methods)?;
                Ok(Completion::Normal)
            }
        }
    }

    /// Runs `statements` inside `environment`, restoring the previous
    /// environment afterwards however the block ends.
    pub fn execute_block(&mut self, statements: &[Stmt], environment: Env) -> Result<Completion> {
        trace!("Entering block with {} statements", statements.len());
        let previous: Env = mem::replace(&mut self.environment, environment);

        let mut result: Result<Completion> = Ok(Completion::Normal);
        for stmt in statements {
            match self.execute(stmt) {
                Ok(Completion::Normal) => {}
                other => {
                    result = other;
                    break;
                }
            }
        }

        self.environment = previous;
        result
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
    ) -> Result<()> {
        debug!("Defining class '{}'", name.lexeme);
        self.environment.define(name.lexeme.as_str(), Value::Nil);

        let superclass: Option<Rc<LoxClass>> = match superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(class) => Some(class),
                _ => {
                    let token: &Token = match expr {
                        Expr::Variable { name, .. } => name,
                        _ => name,
                    };
                    return Err(LoxError::runtime(token, "Superclass must be a class."));
                }
            },
            None => None,
        };

        let method_closure: Env = match &superclass {
            Some(class) => {
                let environment: Env = Env::with_enclosing(&self.environment);
                environment.define("super", Value::Class(Rc::clone(class)));
                environment
            }
            None => self.environment.clone(),
        };

        let table: HashMap<String, Rc<LoxFunction>> = methods
            .iter()
            .map(|method| {
                let function = LoxFunction::new(
                    Rc::clone(method),
                    method_closure.clone(),
                    method.name.lexeme == "init",
                );
                (method.name.lexeme.clone(), Rc::new(function))
            })
            .collect();

        let class = LoxClass::new(name.lexeme.clone(), superclass, table);
        self.environment
            .assign(name, Value::Class(Rc::new(class)))?;

        info!("Class '{}' defined with {} method(s)", name.lexeme, methods.len());
        Ok(())
    }

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        let value: Value = match expr {
            Expr::Literal(literal) => match literal {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::String(s.clone()),
                LiteralValue::True => Value::Bool(true),
                LiteralValue::False => Value::Bool(false),
                LiteralValue::Nil => Value::Nil,
            },

            Expr::Grouping(inner) => self.evaluate(inner)?,

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right)?,

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right)?,

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left: Value = self.evaluate(left)?;

                let decided: bool = if operator.token_type == TokenType::OR {
                    left.is_truthy()
                } else {
                    !left.is_truthy()
                };

                if decided {
                    left
                } else {
                    self.evaluate(right)?
                }
            }

            Expr::Variable { id, name } => self.look_up_variable(*id, name)?,

            Expr::Assign { id, name, value } => {
                let value: Value = self.evaluate(value)?;

                match self.locals.get(id) {
                    Some(&distance) => {
                        if !self.environment.assign_at(distance, &name.lexeme, value.clone()) {
                            return Err(LoxError::runtime(
                                name,
                                format!("Undefined variable '{}'.", name.lexeme),
                            ));
                        }
                    }
                    None => self.globals.assign(name, value.clone())?,
                }

                value
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee: Value = self.evaluate(callee)?;

                let mut values: Vec<Value> = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.evaluate(argument)?);
                }

                match callee {
                    Value::Native(native) => self.call(&native, values, paren)?,
                    Value::Function(function) => self.call(&function, values, paren)?,
                    Value::Class(class) => self.call(&class, values, paren)?,
                    _ => {
                        return Err(LoxError::runtime(
                            paren,
                            "Can only call functions and classes.",
                        ))
                    }
                }
            }

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => instance.get(name)?,
                _ => return Err(LoxError::runtime(name, "Only instances have properties.")),
            },

            Expr::Set {
                object,
                name,
                value,
            } => {
                let instance: Rc<LoxInstance> = match self.evaluate(object)? {
                    Value::Instance(instance) => instance,
                    _ => return Err(LoxError::runtime(name, "Only instances have fields.")),
                };

                let value: Value = self.evaluate(value)?;
                instance.set(name, value.clone());
                value
            }

            Expr::This { id, keyword } => self.look_up_variable(*id, keyword)?,

            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method)?,
        };

        trace!("Expression evaluated to: {}", value);
        Ok(value)
    }

    /// Checks arity and call depth, then invokes on a stack with room to
    /// spare.
    fn call<C: Callable>(
        &mut self,
        callee: &Rc<C>,
        arguments: Vec<Value>,
        paren: &Token,
    ) -> Result<Value> {
        if arguments.len() != callee.arity() {
            return Err(LoxError::runtime(
                paren,
                format!(
                    "Expected {} arguments but got {}.",
                    callee.arity(),
                    arguments.len()
                ),
            ));
        }

        if self.depth >= MAX_CALL_DEPTH {
            return Err(LoxError::runtime(paren, "Stack overflow."));
        }

        self.depth += 1;
        let result: Result<Value> = stacker::maybe_grow(RED_ZONE, STACK_PER_CALL, || {
            callee.call(self, arguments, paren)
        });
        self.depth -= 1;

        result
    }

    fn evaluate_unary(&mut self, operator: &Token, right: &Expr) -> Result<Value> {
        let right: Value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::MINUS => match right {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(LoxError::runtime(operator, "Operand must be a number.")),
            },
            TokenType::BANG => Ok(Value::Bool(!right.is_truthy())),
            _ => Err(LoxError::runtime(operator, "Invalid unary operator.")),
        }
    }

    fn evaluate_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Result<Value> {
        let left: Value = self.evaluate(left)?;
        let right: Value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::PLUS => match (left, right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
                _ => Err(LoxError::runtime(
                    operator,
                    "Operands must be two numbers or two strings.",
                )),
            },

            TokenType::MINUS => {
                let (a, b) = number_operands(operator, &left, &right)?;
                Ok(Value::Number(a - b))
            }
            TokenType::STAR => {
                let (a, b) = number_operands(operator, &left, &right)?;
                Ok(Value::Number(a * b))
            }
            // IEEE semantics: x / 0 is ±Infinity or NaN, not an error.
            TokenType::SLASH => {
                let (a, b) = number_operands(operator, &left, &right)?;
                Ok(Value::Number(a / b))
            }

            TokenType::GREATER => {
                let (a, b) = number_operands(operator, &left, &right)?;
                Ok(Value::Bool(a > b))
            }
            TokenType::GREATER_EQUAL => {
                let (a, b) = number_operands(operator, &left, &right)?;
                Ok(Value::Bool(a >= b))
            }
            TokenType::LESS => {
                let (a, b) = number_operands(operator, &left, &right)?;
                Ok(Value::Bool(a < b))
            }
            TokenType::LESS_EQUAL => {
                let (a, b) = number_operands(operator, &left, &right)?;
                Ok(Value::Bool(a <= b))
            }

            TokenType::EQUAL_EQUAL => Ok(Value::Bool(left == right)),
            TokenType::BANG_EQUAL => Ok(Value::Bool(left != right)),

            _ => Err(LoxError::runtime(operator, "Invalid binary operator.")),
        }
    }

    fn look_up_variable(&self, id: ExprId, name: &Token) -> Result<Value> {
        match self.locals.get(&id) {
            Some(&distance) => self
                .environment
                .get_at(distance, &name.lexeme)
                .ok_or_else(|| {
                    LoxError::runtime(name, format!("Undefined variable '{}'.", name.lexeme))
                }),
            None => self.globals.get(name),
        }
    }

    /// `super` sits one scope outside the method's `this` scope.
    fn evaluate_super(&mut self, id: ExprId, keyword: &Token, method: &Token) -> Result<Value> {
        let distance: usize = self.locals.get(&id).copied().ok_or_else(|| {
            LoxError::runtime(keyword, "Can't use 'super' outside of a class.")
        })?;

        let superclass: Rc<LoxClass> = match self.environment.get_at(distance, "super") {
            Some(Value::Class(class)) => class,
            _ => return Err(LoxError::runtime(keyword, "Superclass must be a class.")),
        };

        let instance: Rc<LoxInstance> = match distance
            .checked_sub(1)
            .and_then(|d| self.environment.get_at(d, "this"))
        {
            Some(Value::Instance(instance)) => instance,
            _ => return Err(LoxError::runtime(keyword, "Can't use 'this' outside of a class.")),
        };

        match superclass.find_method(&method.lexeme) {
            Some(found) => Ok(Value::Function(Rc::new(found.bind(instance)))),
            None => Err(LoxError::runtime(
                method,
                format!("Undefined property '{}'.", method.lexeme),
            )),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn number_operands(operator: &Token, left: &Value, right: &Value) -> Result<(f64, f64)> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        _ => Err(LoxError::runtime(operator, "Operands must be numbers.")),
    }
}
