//! Interpreter-backed code execution for the remote runner engine.
//!
//! Provides:
//! - Command building utilities
//! - `CodeRunner` trait and the interpreter implementation

pub mod command;
pub mod runner;

pub use command::{CommandBuildError, CommandBuilder, CommandParts};
pub use runner::{CodeRunner, ExecutionOutput, InterpreterRunner, RunnerError};
