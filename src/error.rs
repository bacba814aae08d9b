use std::fmt;
use std::result;

use thiserror::Error;
use tracing::debug;

use crate::scanner::{Token, TokenType};

pub type GenericResult<T> = result::Result<T, Box<dyn std::error::Error>>;

/// An error found before execution starts: a bad character, a syntax error or a
/// misplaced `return`/`break`/`continue`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("[line {line}] Error{location}: {message}")]
pub struct StaticError {
    pub line: u32,
    pub location: String,
    pub message: String,
}

impl StaticError {
    pub fn at_line(line: u32, message: &str) -> StaticError {
        StaticError {
            line,
            location: String::new(),
            message: message.to_string(),
        }
    }

    pub fn at_token(token: &Token, message: &str) -> StaticError {
        let location = if token.token_type == TokenType::EOF {
            " at end".to_string()
        } else {
            format!(" at '{}'", token.lexeme)
        };
        StaticError {
            line: token.line,
            location,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}\n[line {line}]", line = .token.line)]
pub struct RuntimeError {
    pub token: Token,
    pub message: String,
}

impl RuntimeError {
    pub fn new(token: &Token, message: &str) -> RuntimeError {
        RuntimeError {
            token: token.clone(),
            message: message.to_string(),
        }
    }

    pub fn line(&self) -> u32 {
        self.token.line
    }
}

/// Everything that stopped a single run unit.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{}", StaticErrors(.0))]
    Static(Vec<StaticError>),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

struct StaticErrors<'a>(&'a [StaticError]);

impl fmt::Display for StaticErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

/// Receives every diagnostic the pipeline produces. Hosts decide what to do with them.
pub trait Reporter {
    fn error(&mut self, line: u32, message: &str);
    fn error_at(&mut self, token: &Token, message: &str);
    fn runtime_error(&mut self, error: &RuntimeError);
}

/// Reporter that keeps everything it is told, for hosts that want to inspect or
/// print diagnostics after a run unit finishes.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub static_errors: Vec<StaticError>,
    pub runtime_errors: Vec<RuntimeError>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn had_error(&self) -> bool {
        !self.static_errors.is_empty()
    }

    pub fn had_runtime_error(&self) -> bool {
        !self.runtime_errors.is_empty()
    }

    pub fn clear(&mut self) {
        self.static_errors.clear();
        self.runtime_errors.clear();
    }

    pub fn into_result(mut self) -> result::Result<(), ExecutionError> {
        if !self.static_errors.is_empty() {
            Err(ExecutionError::Static(self.static_errors))
        } else if let Some(error) = self.runtime_errors.pop() {
            Err(ExecutionError::Runtime(error))
        } else {
            Ok(())
        }
    }
}

impl Reporter for Diagnostics {
    fn error(&mut self, line: u32, message: &str) {
        self.static_errors.push(StaticError::at_line(line, message));
    }

    fn error_at(&mut self, token: &Token, message: &str) {
        self.static_errors.push(StaticError::at_token(token, message));
    }

    fn runtime_error(&mut self, error: &RuntimeError) {
        self.runtime_errors.push(error.clone());
    }
}

/// Error state for one run unit. Scanner, parser and resolver report through this
/// so the caller can tell whether the unit is fit to execute.
pub struct ErrorSink<'r> {
    reporter: &'r mut dyn Reporter,
    had_error: bool,
}

impl<'r> ErrorSink<'r> {
    pub fn new(reporter: &'r mut dyn Reporter) -> ErrorSink<'r> {
        ErrorSink {
            reporter,
            had_error: false,
        }
    }

    pub fn error(&mut self, line: u32, message: &str) {
        debug!(line, error = message, "static error");
        self.had_error = true;
        self.reporter.error(line, message);
    }

    pub fn error_at(&mut self, token: &Token, message: &str) {
        debug!(line = token.line, lexeme = %token.lexeme, error = message, "static error");
        self.had_error = true;
        self.reporter.error_at(token, message);
    }

    pub fn runtime_error(&mut self, error: &RuntimeError) {
        debug!(line = error.line(), error = %error.message, "runtime error");
        self.reporter.runtime_error(error);
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }
}
