use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::scanner::Token;

use super::value::Value;

/// Shared handle to a scope. Blocks, calls and closures all hold these, so a scope
/// lives as long as the last thing referring to it.
pub type EnvRef = Rc<RefCell<Environment>>;

#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<EnvRef>,
}

impl Environment {
    pub fn new() -> EnvRef {
        Rc::new(RefCell::new(Environment::default()))
    }

    pub fn new_enclosed(enclosing: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            enclosing: Some(Rc::clone(enclosing)),
        }))
    }

    /// Bind a name in this scope, replacing any previous binding of the same name.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(value) = self.values.get(&name.lexeme) {
            return Ok(value.clone());
        }

        match &self.enclosing {
            Some(enclosing) => enclosing.borrow().get(name),
            None => Err(undefined_variable(name)),
        }
    }

    pub fn assign(&mut self, name: &Token, value: Value) -> Result<(), RuntimeError> {
        if let Some(slot) = self.values.get_mut(&name.lexeme) {
            *slot = value;
            return Ok(());
        }

        match &self.enclosing {
            Some(enclosing) => enclosing.borrow_mut().assign(name, value),
            None => Err(undefined_variable(name)),
        }
    }

    /// Read a variable exactly `distance` scopes up the chain, without searching.
    pub fn get_at(env: &EnvRef, distance: usize, name: &Token) -> Result<Value, RuntimeError> {
        let scope = Environment::ancestor(env, distance).ok_or_else(|| undefined_variable(name))?;
        let scope = scope.borrow();
        scope
            .values
            .get(&name.lexeme)
            .cloned()
            .ok_or_else(|| undefined_variable(name))
    }

    pub fn assign_at(env: &EnvRef, distance: usize, name: &Token, value: Value) -> Result<(), RuntimeError> {
        let scope = Environment::ancestor(env, distance).ok_or_else(|| undefined_variable(name))?;
        scope.borrow_mut().values.insert(name.lexeme.clone(), value);
        Ok(())
    }

    fn ancestor(env: &EnvRef, distance: usize) -> Option<EnvRef> {
        let mut scope = Rc::clone(env);
        for _ in 0..distance {
            let enclosing = scope.borrow().enclosing.clone()?;
            scope = enclosing;
        }
        Some(scope)
    }
}

fn undefined_variable(name: &Token) -> RuntimeError {
    RuntimeError::new(name, &format!("Undefined variable '{}'.", name.lexeme))
}
