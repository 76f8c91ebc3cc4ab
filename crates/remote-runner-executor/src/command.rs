//! Command building utilities.

use std::path::PathBuf;

use thiserror::Error;

/// Default interpreter: Python reading the program from stdin.
pub const DEFAULT_INTERPRETER: &str = "python3 -";

/// Command build error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandBuildError {
    #[error("Base command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Base command is empty after parsing")]
    EmptyCommand,
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Create new command parts.
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Resolve the program to an absolute path.
    ///
    /// # Errors
    /// Returns error if executable not found.
    pub fn into_resolved(self) -> Result<(PathBuf, Vec<String>), CommandBuildError> {
        let Self { program, args } = self;
        let executable =
            which::which(&program).map_err(|_| CommandBuildError::ExecutableNotFound(program))?;
        Ok((executable, args))
    }
}

/// Interpreter command line, shell-quoted.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    pub base: String,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_INTERPRETER)
    }
}

impl CommandBuilder {
    #[must_use]
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self { base: base.into() }
    }

    /// Split the command line into program and arguments.
    ///
    /// # Errors
    /// Returns error if the base cannot be parsed or is empty.
    pub fn build(&self) -> Result<CommandParts, CommandBuildError> {
        let parts = shlex::split(&self.base)
            .ok_or_else(|| CommandBuildError::InvalidBase(self.base.clone()))?;
        let mut parts = parts.into_iter();
        let program = parts.next().ok_or(CommandBuildError::EmptyCommand)?;
        Ok(CommandParts::new(program, parts.collect()))
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_default_reads_program_from_stdin() {
        let parts = assert_ok!(CommandBuilder::default().build());
        assert_eq!(parts, CommandParts::new("python3".into(), vec!["-".into()]));
    }

    #[test]
    fn test_quoted_interpreter_path_keeps_flags() {
        let parts = assert_ok!(
            CommandBuilder::new("\"/opt/my python/bin/python3\" -u -X 'utf8' -").build()
        );
        assert_eq!(parts.program, "/opt/my python/bin/python3");
        assert_eq!(parts.args, vec!["-u", "-X", "utf8", "-"]);
    }

    #[test]
    fn test_invalid_commands() {
        assert_eq!(
            assert_err!(CommandBuilder::new("   ").build()),
            CommandBuildError::EmptyCommand
        );
        assert!(matches!(
            assert_err!(CommandBuilder::new("python3 \"unterminated").build()),
            CommandBuildError::InvalidBase(_)
        ));
    }

    #[test]
    fn test_unknown_executable() {
        let parts = CommandParts::new("definitely-not-an-interpreter-4821".into(), vec![]);
        assert!(matches!(
            parts.into_resolved(),
            Err(CommandBuildError::ExecutableNotFound(_))
        ));
    }
}
