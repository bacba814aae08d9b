use std::collections::HashMap;
use std::io::Write;
use std::mem;
use std::rc::Rc;

use tracing::trace;

use crate::error::RuntimeError;
use crate::scanner::{Token, TokenType};

use super::environment::{EnvRef, Environment};
use super::expr::{Expr, ExprId, ExprIds, LiteralValue};
use super::stdlib::standard_library;
use super::stmt::{FunctionDecl, Stmt};
use super::value::{Callable, Function, NativeFunction, Value};

type ValueResult = Result<Value, RuntimeError>;
type ExecResult = Result<Flow, RuntimeError>;

/// How a statement finished. Anything other than `Normal` travels up through the
/// enclosing statements until a loop or function call takes it.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

const MAX_CALL_DEPTH: usize = 256;

#[derive(Debug, Clone)]
pub struct Options {
    /// Write the value of every non-nil expression statement, as an interactive prompt does.
    pub echo_expressions: bool,
    /// Only allow `==` and `!=` between numbers.
    pub strict_equality: bool,
    /// Nested user function calls allowed before "Stack overflow." is raised.
    pub max_call_depth: usize,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            echo_expressions: false,
            strict_equality: false,
            max_call_depth: MAX_CALL_DEPTH,
        }
    }
}

impl Options {
    pub fn interactive() -> Options {
        Options {
            echo_expressions: true,
            ..Options::default()
        }
    }
}

pub struct Interpreter<'a> {
    globals: EnvRef,
    environment: EnvRef,
    locals: HashMap<ExprId, usize>,
    expr_ids: ExprIds,
    call_depth: usize,
    options: Options,
    pub output_writer: &'a mut dyn Write,
}

impl<'a> Interpreter<'a> {
    pub fn new(output_writer: &'a mut dyn Write) -> Interpreter<'a> {
        Interpreter::with_options(output_writer, Options::default())
    }

    pub fn with_options(output_writer: &'a mut dyn Write, options: Options) -> Interpreter<'a> {
        let globals = Environment::new();
        let mut interpreter = Interpreter {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            expr_ids: ExprIds::new(),
            call_depth: 0,
            options,
            output_writer,
        };

        for native in standard_library() {
            interpreter.define_native(native);
        }
        interpreter
    }

    /// Install a host function in the global scope.
    pub fn define_native(&mut self, native: NativeFunction) {
        let name = native.name.clone();
        let value = Value::Callable(Callable::Native(Rc::new(native)));
        self.globals.borrow_mut().define(&name, value);
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Id source for the parser. Shared across run units so resolutions never collide.
    pub fn expr_ids(&mut self) -> &mut ExprIds {
        &mut self.expr_ids
    }

    /// Record that the variable expression `id` lives `distance` scopes out from where it is used.
    pub fn resolve(&mut self, id: ExprId, distance: usize) {
        self.locals.insert(id, distance);
    }

    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        trace!(count = statements.len(), "interpreting statements");
        for statement in statements {
            // stray return/break/continue were rejected before execution
            execute_statement(statement, self)?;
        }
        Ok(())
    }
}

fn execute_statement(statement: &Stmt, interp: &mut Interpreter) -> ExecResult {
    match statement {
        Stmt::Block { statements } => block_statement(statements, interp),
        Stmt::Break { .. } => Ok(Flow::Break),
        Stmt::Continue { .. } => Ok(Flow::Continue),
        Stmt::Expression { expression } => expression_statement(expression, interp),
        Stmt::Function(declaration) => function_statement(declaration, interp),
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => if_statement(condition, then_branch, else_branch, interp),
        Stmt::Print { expression } => print_statement(expression, interp),
        Stmt::Return { value, .. } => return_statement(value, interp),
        Stmt::Var { name, initializer } => var_statement(name, initializer, interp),
        Stmt::While {
            condition,
            body,
            increment,
        } => while_statement(condition, body, *increment, interp),
    }
}

fn execute_all(statements: &[Stmt], interp: &mut Interpreter) -> ExecResult {
    for statement in statements {
        match execute_statement(statement, interp)? {
            Flow::Normal => {}
            signal => return Ok(signal),
        }
    }
    Ok(Flow::Normal)
}

// Swap in `environment` for the duration of `run`. The previous one comes back
// however `run` finishes.
fn with_environment<'w, T>(
    environment: EnvRef,
    interp: &mut Interpreter<'w>,
    run: impl FnOnce(&mut Interpreter<'w>) -> T,
) -> T {
    let previous = mem::replace(&mut interp.environment, environment);
    let result = run(interp);
    interp.environment = previous;
    result
}

fn execute_block(statements: &[Stmt], environment: EnvRef, interp: &mut Interpreter) -> ExecResult {
    with_environment(environment, interp, |interp| execute_all(statements, interp))
}

fn block_statement(statements: &[Stmt], interp: &mut Interpreter) -> ExecResult {
    let environment = Environment::new_enclosed(&interp.environment);
    execute_block(statements, environment, interp)
}

fn expression_statement(expression: &Expr, interp: &mut Interpreter) -> ExecResult {
    let value = evaluate(expression, interp)?;
    if interp.options.echo_expressions && !value.is_nil() {
        writeln!(interp.output_writer, "{value}").expect("Writing to program output should always succeed.");
    }
    Ok(Flow::Normal)
}

fn function_statement(declaration: &Rc<FunctionDecl>, interp: &mut Interpreter) -> ExecResult {
    let function = Function {
        declaration: Rc::clone(declaration),
        closure: Rc::clone(&interp.environment),
    };
    let value = Value::Callable(Callable::Function(Rc::new(function)));
    interp
        .environment
        .borrow_mut()
        .define(&declaration.name.lexeme, value);
    Ok(Flow::Normal)
}

fn if_statement(
    condition: &Expr,
    then_branch: &Stmt,
    else_branch: &Option<Box<Stmt>>,
    interp: &mut Interpreter,
) -> ExecResult {
    if evaluate(condition, interp)?.is_truthy() {
        execute_statement(then_branch, interp)
    } else if let Some(else_statement) = else_branch {
        execute_statement(else_statement, interp)
    } else {
        Ok(Flow::Normal)
    }
}

fn print_statement(expression: &Expr, interp: &mut Interpreter) -> ExecResult {
    let value = evaluate(expression, interp)?;
    writeln!(interp.output_writer, "{value}").expect("Writing to program output should always succeed.");
    Ok(Flow::Normal)
}

fn return_statement(value: &Option<Expr>, interp: &mut Interpreter) -> ExecResult {
    let value = match value {
        Some(expression) => evaluate(expression, interp)?,
        None => Value::Nil,
    };
    Ok(Flow::Return(value))
}

fn var_statement(name: &Token, initializer: &Option<Expr>, interp: &mut Interpreter) -> ExecResult {
    let value = match initializer {
        Some(expression) => evaluate(expression, interp)?,
        None => Value::Nil,
    };
    interp.environment.borrow_mut().define(&name.lexeme, value);
    Ok(Flow::Normal)
}

fn while_statement(condition: &Expr, body: &Stmt, increment: bool, interp: &mut Interpreter) -> ExecResult {
    while evaluate(condition, interp)?.is_truthy() {
        let flow = if increment {
            for_loop_body(body, interp)?
        } else {
            execute_statement(body, interp)?
        };

        match flow {
            Flow::Normal | Flow::Continue => {}
            Flow::Break => break,
            Flow::Return(value) => return Ok(Flow::Return(value)),
        }
    }
    Ok(Flow::Normal)
}

// A desugared `for` body is `{ body; increment; }`. The increment has to run after a
// `continue` too, so it is executed here rather than as a plain block statement.
fn for_loop_body(body: &Stmt, interp: &mut Interpreter) -> ExecResult {
    let Stmt::Block { statements } = body else {
        return execute_statement(body, interp);
    };
    let Some((increment, statements)) = statements.split_last() else {
        return Ok(Flow::Normal);
    };

    let environment = Environment::new_enclosed(&interp.environment);
    with_environment(environment, interp, |interp| match execute_all(statements, interp)? {
        Flow::Normal | Flow::Continue => execute_statement(increment, interp),
        signal => Ok(signal),
    })
}

fn evaluate(expression: &Expr, interp: &mut Interpreter) -> ValueResult {
    match expression {
        Expr::Assign { id, name, value } => evaluate_assign(*id, name, value, interp),
        Expr::Ternary {
            condition,
            then_branch,
            else_branch,
        } => evaluate_ternary(condition, then_branch, else_branch, interp),
        Expr::Binary { left, operator, right } => evaluate_binary(left, operator, right, interp),
        Expr::Call {
            callee,
            paren,
            arguments,
        } => evaluate_call(callee, paren, arguments, interp),
        Expr::Grouping { expression } => evaluate(expression, interp),
        Expr::Literal { value } => evaluate_literal(value),
        Expr::Logical { left, operator, right } => evaluate_logical(left, operator, right, interp),
        Expr::Unary { operator, right } => evaluate_unary(operator, right, interp),
        Expr::Variable { id, name } => look_up_variable(*id, name, interp),
    }
}

fn evaluate_assign(id: ExprId, name: &Token, value: &Expr, interp: &mut Interpreter) -> ValueResult {
    let value = evaluate(value, interp)?;
    match interp.locals.get(&id) {
        Some(distance) => Environment::assign_at(&interp.environment, *distance, name, value.clone())?,
        None => interp.globals.borrow_mut().assign(name, value.clone())?,
    }
    Ok(value)
}

fn evaluate_ternary(
    condition: &Expr,
    then_branch: &Expr,
    else_branch: &Expr,
    interp: &mut Interpreter,
) -> ValueResult {
    if evaluate(condition, interp)?.is_truthy() {
        evaluate(then_branch, interp)
    } else {
        evaluate(else_branch, interp)
    }
}

fn evaluate_binary(left: &Expr, operator: &Token, right: &Expr, interp: &mut Interpreter) -> ValueResult {
    let left = evaluate(left, interp)?;
    let right = evaluate(right, interp)?;

    match operator.token_type {
        TokenType::Plus => add(left, right, operator),
        TokenType::EqualEqual | TokenType::BangEqual => {
            if interp.options.strict_equality {
                number_operands(operator, &left, &right)?;
            }
            let equal = left == right;
            Ok(Value::Boolean(if operator.token_type == TokenType::EqualEqual {
                equal
            } else {
                !equal
            }))
        }
        _ => {
            let (left, right) = number_operands(operator, &left, &right)?;
            let value = match operator.token_type {
                TokenType::Minus => Value::Number(left - right),
                TokenType::Star => Value::Number(left * right),
                TokenType::Slash => {
                    if right == 0.0 {
                        return Err(RuntimeError::new(operator, "Cannot divide by zero."));
                    }
                    Value::Number(left / right)
                }
                TokenType::Greater => Value::Boolean(left > right),
                TokenType::GreaterEqual => Value::Boolean(left >= right),
                TokenType::Less => Value::Boolean(left < right),
                TokenType::LessEqual => Value::Boolean(left <= right),
                // the parser only builds binary expressions from the operators above
                _ => return Err(RuntimeError::new(operator, "Unknown binary operator.")),
            };
            Ok(value)
        }
    }
}

fn add(left: Value, right: Value, operator: &Token) -> ValueResult {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => Ok(Value::Number(left + right)),
        (Value::String(left), Value::String(right)) => Ok(Value::String(left + &right)),
        (Value::String(left), Value::Number(right)) => Ok(Value::String(format!("{left}{right}"))),
        (Value::Number(left), Value::String(right)) => Ok(Value::String(format!("{left}{right}"))),
        _ => Err(RuntimeError::new(
            operator,
            "Operands must be two numbers or two strings.",
        )),
    }
}

fn evaluate_call(callee: &Expr, paren: &Token, arguments: &[Expr], interp: &mut Interpreter) -> ValueResult {
    let callee = evaluate(callee, interp)?;

    let mut evaluated_args = Vec::with_capacity(arguments.len());
    for argument in arguments {
        evaluated_args.push(evaluate(argument, interp)?);
    }

    let Value::Callable(callable) = callee else {
        return Err(RuntimeError::new(paren, "Can only call functions and classes."));
    };

    if evaluated_args.len() != callable.arity() {
        return Err(RuntimeError::new(
            paren,
            &format!(
                "Expected {} arguments but got {}.",
                callable.arity(),
                evaluated_args.len()
            ),
        ));
    }

    trace!(callee = callable.name(), arguments = evaluated_args.len(), "call");
    match callable {
        Callable::Native(native) => (native.func)(&evaluated_args).map_err(|message| RuntimeError::new(paren, &message)),
        Callable::Function(function) => call_function(&function, evaluated_args, paren, interp),
    }
}

fn call_function(function: &Function, arguments: Vec<Value>, paren: &Token, interp: &mut Interpreter) -> ValueResult {
    if interp.call_depth >= interp.options.max_call_depth {
        return Err(RuntimeError::new(paren, "Stack overflow."));
    }

    // parameters live in a fresh scope on top of the closure, not the caller's scope
    let environment = Environment::new_enclosed(&function.closure);
    {
        let mut scope = environment.borrow_mut();
        for (param, argument) in function.declaration.params.iter().zip(arguments) {
            scope.define(&param.lexeme, argument);
        }
    }

    interp.call_depth += 1;
    let flow = execute_block(&function.declaration.body, environment, interp);
    interp.call_depth -= 1;

    match flow? {
        Flow::Return(value) => Ok(value),
        // break and continue can't reach a function boundary in a resolved program
        Flow::Normal | Flow::Break | Flow::Continue => Ok(Value::Nil),
    }
}

fn evaluate_literal(value: &LiteralValue) -> ValueResult {
    Ok(Value::from(value.clone()))
}

fn evaluate_logical(left: &Expr, operator: &Token, right: &Expr, interp: &mut Interpreter) -> ValueResult {
    let left = evaluate(left, interp)?;

    // short circuit if possible
    let short_circuit = match operator.token_type {
        TokenType::Or => left.is_truthy(),
        _ => !left.is_truthy(),
    };
    if short_circuit {
        return Ok(left);
    }

    evaluate(right, interp)
}

fn evaluate_unary(operator: &Token, right: &Expr, interp: &mut Interpreter) -> ValueResult {
    let operand = evaluate(right, interp)?;
    match operator.token_type {
        TokenType::Bang => Ok(Value::Boolean(!operand.is_truthy())),
        TokenType::Minus => match operand {
            Value::Number(value) => Ok(Value::Number(-value)),
            _ => Err(RuntimeError::new(operator, "Operand must be a number.")),
        },
        _ => Err(RuntimeError::new(operator, "Unknown unary operator.")),
    }
}

fn look_up_variable(id: ExprId, name: &Token, interp: &mut Interpreter) -> ValueResult {
    match interp.locals.get(&id) {
        Some(distance) => Environment::get_at(&interp.environment, *distance, name),
        None => interp.globals.borrow().get(name),
    }
}

fn number_operands(operator: &Token, left: &Value, right: &Value) -> Result<(f64, f64), RuntimeError> {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => Ok((*left, *right)),
        _ => Err(RuntimeError::new(operator, "Operands must be numbers.")),
    }
}
