use std::collections::HashMap;
use std::mem;

use tracing::trace;

use crate::error::ErrorSink;
use crate::scanner::Token;

use super::expr::{Expr, ExprId};
use super::interpreter::Interpreter;
use super::stmt::{FunctionDecl, Stmt};

#[derive(Debug, Clone, Copy, PartialEq)]
enum FunctionType {
    None,
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LoopType {
    None,
    Loop,
}

// Each frame maps a name to whether its declaration has finished (initializer resolved).
struct VarScopes<'a, 'w, 'r> {
    stack: Vec<HashMap<String, bool>>,
    function: FunctionType,
    loop_type: LoopType,
    resolved: usize,
    interpreter: &'a mut Interpreter<'w>,
    errors: &'a mut ErrorSink<'r>,
}

impl<'a, 'w, 'r> VarScopes<'a, 'w, 'r> {
    fn push(&mut self) {
        self.stack.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.stack.pop();
    }

    fn declare(&mut self, name: &Token) {
        let Some(frame) = self.stack.last_mut() else {
            // globals are looked up by name at runtime
            return;
        };

        if frame.contains_key(&name.lexeme) {
            self.errors
                .error_at(name, "Already a variable with this name in this scope.");
        }
        frame.insert(name.lexeme.clone(), false);
    }

    fn define(&mut self, name: &Token) {
        if let Some(frame) = self.stack.last_mut() {
            frame.insert(name.lexeme.clone(), true);
        }
    }

    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        let innermost = self.stack.len();
        for (i, frame) in self.stack.iter().enumerate().rev() {
            if frame.contains_key(&name.lexeme) {
                self.interpreter.resolve(id, innermost - 1 - i);
                self.resolved += 1;
                return;
            }
        }
    }
}

/// Work out the lexical distance of every local variable reference and hand it to the
/// interpreter. Misplaced `return`/`break`/`continue` and bad declarations are reported.
pub fn resolve(statements: &[Stmt], interpreter: &mut Interpreter, errors: &mut ErrorSink) {
    let mut scopes = VarScopes {
        stack: Vec::new(),
        function: FunctionType::None,
        loop_type: LoopType::None,
        resolved: 0,
        interpreter,
        errors,
    };

    for statement in statements {
        resolve_statement(statement, &mut scopes);
    }

    trace!(locals = scopes.resolved, "resolved local variables");
}

fn resolve_statement(statement: &Stmt, scope: &mut VarScopes) {
    match statement {
        Stmt::Block { statements } => block_statement(statements, scope),
        Stmt::Break { keyword } => loop_control_statement(keyword, "'break' outside loop.", scope),
        Stmt::Continue { keyword } => loop_control_statement(keyword, "'continue' outside loop.", scope),
        Stmt::Expression { expression } => resolve_expr(expression, scope),
        Stmt::Function(declaration) => function_statement(declaration, scope),
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => if_statement(condition, then_branch, else_branch, scope),
        Stmt::Print { expression } => resolve_expr(expression, scope),
        Stmt::Return { keyword, value } => return_statement(keyword, value, scope),
        Stmt::Var { name, initializer } => var_statement(name, initializer, scope),
        Stmt::While { condition, body, .. } => while_statement(condition, body, scope),
    }
}

fn block_statement(statements: &[Stmt], scope: &mut VarScopes) {
    scope.push();
    for statement in statements {
        resolve_statement(statement, scope);
    }
    scope.pop();
}

fn loop_control_statement(keyword: &Token, message: &str, scope: &mut VarScopes) {
    if scope.loop_type == LoopType::None {
        scope.errors.error_at(keyword, message);
    }
}

fn function_statement(declaration: &FunctionDecl, scope: &mut VarScopes) {
    // defined before the body so the function can refer to itself
    scope.declare(&declaration.name);
    scope.define(&declaration.name);

    let enclosing_function = mem::replace(&mut scope.function, FunctionType::Function);
    let enclosing_loop = mem::replace(&mut scope.loop_type, LoopType::None);

    scope.push();
    for param in &declaration.params {
        scope.declare(param);
        scope.define(param);
    }
    for statement in &declaration.body {
        resolve_statement(statement, scope);
    }
    scope.pop();

    scope.function = enclosing_function;
    scope.loop_type = enclosing_loop;
}

fn if_statement(condition: &Expr, then_branch: &Stmt, else_branch: &Option<Box<Stmt>>, scope: &mut VarScopes) {
    resolve_expr(condition, scope);
    resolve_statement(then_branch, scope);
    if let Some(else_statement) = else_branch {
        resolve_statement(else_statement, scope);
    }
}

fn return_statement(keyword: &Token, value: &Option<Expr>, scope: &mut VarScopes) {
    if scope.function == FunctionType::None {
        scope.errors.error_at(keyword, "Can't return from top-level code.");
    }
    if let Some(value) = value {
        resolve_expr(value, scope);
    }
}

fn var_statement(name: &Token, initializer: &Option<Expr>, scope: &mut VarScopes) {
    scope.declare(name);
    if let Some(initializer) = initializer {
        resolve_expr(initializer, scope);
    }
    scope.define(name);
}

fn while_statement(condition: &Expr, body: &Stmt, scope: &mut VarScopes) {
    resolve_expr(condition, scope);

    let enclosing_loop = mem::replace(&mut scope.loop_type, LoopType::Loop);
    resolve_statement(body, scope);
    scope.loop_type = enclosing_loop;
}

fn resolve_expr(expression: &Expr, scope: &mut VarScopes) {
    match expression {
        Expr::Assign { id, name, value } => {
            resolve_expr(value, scope);
            scope.resolve_local(*id, name);
        }
        Expr::Ternary {
            condition,
            then_branch,
            else_branch,
        } => {
            resolve_expr(condition, scope);
            resolve_expr(then_branch, scope);
            resolve_expr(else_branch, scope);
        }
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            resolve_expr(left, scope);
            resolve_expr(right, scope);
        }
        Expr::Call { callee, arguments, .. } => {
            resolve_expr(callee, scope);
            for argument in arguments {
                resolve_expr(argument, scope);
            }
        }
        Expr::Grouping { expression } => resolve_expr(expression, scope),
        Expr::Literal { .. } => {}
        Expr::Unary { right, .. } => resolve_expr(right, scope),
        Expr::Variable { id, name } => resolve_variable(*id, name, scope),
    }
}

fn resolve_variable(id: ExprId, name: &Token, scope: &mut VarScopes) {
    let in_own_initializer = scope
        .stack
        .last()
        .and_then(|frame| frame.get(&name.lexeme))
        .is_some_and(|defined| !defined);

    if in_own_initializer {
        scope
            .errors
            .error_at(name, "Can't read local variable in its own initializer.");
    }

    scope.resolve_local(id, name);
}
