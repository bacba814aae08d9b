pub mod environment;
pub mod expr;
pub mod interpreter;
pub mod parser;
pub mod resolver;
pub mod stdlib;
pub mod stmt;
pub mod value;

use tracing::debug;

use crate::error::{Diagnostics, ErrorSink, ExecutionError, Reporter};
use crate::scanner;

use interpreter::Interpreter;

pub type ExecutionResult = Result<(), ExecutionError>;

/// Outcome of one run unit, for hosts that pick exit codes or decide whether to keep going.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStatus {
    pub had_error: bool,
    pub had_runtime_error: bool,
}

impl RunStatus {
    pub fn is_ok(&self) -> bool {
        !self.had_error && !self.had_runtime_error
    }
}

/// Scan, parse, resolve and execute one unit of source. Every problem goes to
/// `reporter`; nothing executes if scanning, parsing or resolution reported an error.
pub fn run(code: &str, interpreter: &mut Interpreter, reporter: &mut dyn Reporter) -> RunStatus {
    let mut errors = ErrorSink::new(reporter);

    let tokens = scanner::scan_tokens(code, &mut errors);
    let statements = parser::parse(&tokens, interpreter.expr_ids(), &mut errors);
    if errors.had_error() {
        debug!("run unit rejected by the parser");
        return RunStatus {
            had_error: true,
            had_runtime_error: false,
        };
    }

    resolver::resolve(&statements, interpreter, &mut errors);
    if errors.had_error() {
        debug!("run unit rejected by the resolver");
        return RunStatus {
            had_error: true,
            had_runtime_error: false,
        };
    }

    match interpreter.interpret(&statements) {
        Ok(()) => {
            debug!("run unit finished");
            RunStatus::default()
        }
        Err(error) => {
            debug!(line = error.line(), "run unit stopped by a runtime error");
            errors.runtime_error(&error);
            RunStatus {
                had_error: false,
                had_runtime_error: true,
            }
        }
    }
}

/// Like [`run`], but collects the diagnostics into an error value.
pub fn execute(code: &str, interpreter: &mut Interpreter) -> ExecutionResult {
    let mut diagnostics = Diagnostics::new();
    run(code, interpreter, &mut diagnostics);
    diagnostics.into_result()
}
