use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::trace;

use crate::error::{LoxError, Result};
use crate::token::Token;
use crate::value::Value;

/// One scope frame: its own bindings plus a link to the frame it is nested in.
#[derive(Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Env>,
}

/// Shared handle to an [`Environment`].
///
/// A frame lives as long as any block, call or closure still points at it,
/// so cloning an `Env` shares the frame rather than copying it.
#[derive(Clone, Default)]
pub struct Env(Rc<RefCell<Environment>>);

impl Env {
    /// A fresh global frame with no parent.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh empty frame nested inside `enclosing`.
    pub fn with_enclosing(enclosing: &Env) -> Self {
        Env(Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing.clone()),
        })))
    }

    /// Bind `name` in this frame, silently replacing an earlier binding.
    pub fn define<S: Into<String>>(&self, name: S, value: Value) {
        let name: String = name.into();
        trace!("define {} = {:?}", name, value);
        self.0.borrow_mut().values.insert(name, value);
    }

    /// Dynamic lookup: this frame first, then each enclosing one.
    pub fn get(&self, name: &Token) -> Result<Value> {
        let mut env: Env = self.clone();

        loop {
            let next: Option<Env> = {
                let frame = env.0.borrow();
                if let Some(value) = frame.values.get(&name.lexeme) {
                    return Ok(value.clone());
                }
                frame.enclosing.clone()
            };

            match next {
                Some(parent) => env = parent,
                None => return Err(undefined(name)),
            }
        }
    }

    /// Dynamic assignment: overwrite the nearest frame that binds `name`.
    /// Never creates a binding.
    pub fn assign(&self, name: &Token, value: Value) -> Result<()> {
        let mut env: Env = self.clone();

        loop {
            let next: Option<Env> = {
                let mut frame = env.0.borrow_mut();
                if let Some(slot) = frame.values.get_mut(&name.lexeme) {
                    *slot = value;
                    return Ok(());
                }
                frame.enclosing.clone()
            };

            match next {
                Some(parent) => env = parent,
                None => return Err(undefined(name)),
            }
        }
    }

    /// The frame exactly `distance` links up the chain, if the chain is that long.
    pub fn ancestor(&self, distance: usize) -> Option<Env> {
        let mut env: Env = self.clone();

        for _ in 0..distance {
            let parent: Env = env.0.borrow().enclosing.clone()?;
            env = parent;
        }

        Some(env)
    }

    /// Read `name` from the frame `distance` hops out, without searching
    /// further.
    pub fn get_at(&self, distance: usize, name: &str) -> Option<Value> {
        let env: Env = self.ancestor(distance)?;
        let value: Option<Value> = env.0.borrow().values.get(name).cloned();
        value
    }

    /// Write `name` into the frame `distance` hops out.  Returns `false` when
    /// the chain is shorter than `distance`.
    pub fn assign_at(&self, distance: usize, name: &str, value: Value) -> bool {
        match self.ancestor(distance) {
            Some(env) => {
                env.0.borrow_mut().values.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn ptr_eq(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

fn undefined(name: &Token) -> LoxError {
    LoxError::runtime(name, format!("Undefined variable '{}'.", name.lexeme))
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.0.borrow();
        let mut names: Vec<&String> = frame.values.keys().collect();
        names.sort();

        f.debug_struct("Env")
            .field("names", &names)
            .field("enclosed", &frame.enclosing.is_some())
            .finish()
    }
}
