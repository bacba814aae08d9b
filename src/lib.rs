pub mod error;
pub mod scanner;
pub mod treewalk;

pub use error::{Diagnostics, ExecutionError, Reporter, RuntimeError, StaticError};
pub use treewalk::interpreter::{Interpreter, Options};
pub use treewalk::{execute, run, ExecutionResult, RunStatus};
