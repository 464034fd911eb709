//! Configuration errors and collected validation problems.

use super::FieldPath;
use owo_colors::OwoColorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid TOML in config file")]
    Toml(#[from] toml::de::Error),

    // No #[from]: the problems are the message, not a source
    #[error("{0}")]
    Diagnostics(ConfigDiagnostics),
}

/// One rejected config value.
#[derive(Debug, Clone)]
pub struct ConfigProblem {
    pub field: FieldPath,
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ConfigProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " ({} {hint})", "hint:".yellow())?;
        }
        Ok(())
    }
}

/// Every problem found in one validation pass.
///
/// Errors abort loading; hints are printed and loading goes on.
#[derive(Debug, Default)]
pub struct ConfigDiagnostics {
    errors: Vec<ConfigProblem>,
    hints: Vec<(FieldPath, String)>,
}

impl ConfigDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, field: FieldPath, message: impl Into<String>) {
        self.push(field, message.into(), None);
    }

    pub fn error_with_hint(
        &mut self,
        field: FieldPath,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.push(field, message.into(), Some(hint.into()));
    }

    fn push(&mut self, field: FieldPath, message: String, hint: Option<String>) {
        self.errors.push(ConfigProblem {
            field,
            message,
            hint,
        });
    }

    pub fn hint(&mut self, field: FieldPath, message: impl Into<String>) {
        self.hints.push((field, message.into()));
    }

    pub fn print_hints(&self) {
        for (field, message) in &self.hints {
            crate::log!("hint"; "{} {}", field.as_str(), message);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ConfigProblem] {
        &self.errors
    }

    /// `Err(self)` when any error was collected.
    pub fn into_result(self) -> Result<(), Self> {
        if self.has_errors() { Err(self) } else { Ok(()) }
    }
}

impl fmt::Display for ConfigDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.errors.len();
        let noun = if count == 1 { "problem" } else { "problems" };
        write!(f, "{} ({count} {noun})", "invalid configuration".red().bold())?;
        for problem in &self.errors {
            write!(f, "\n  - {problem}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigDiagnostics {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_error_names_file() {
        let err = ConfigError::Io(
            PathBuf::from("hotrelay.toml"),
            Error::new(ErrorKind::NotFound, "file not found"),
        );
        assert_eq!(err.to_string(), "cannot read `hotrelay.toml`");
    }

    #[test]
    fn test_diagnostics_collect_all_errors() {
        owo_colors::set_override(false);
        let mut diag = ConfigDiagnostics::new();
        diag.error(FieldPath::new("hmr.path"), "must start with `/`");
        diag.error_with_hint(FieldPath::new("hmr.heartbeat"), "must be positive", "try 10000");
        diag.hint(FieldPath::new("watch.stats"), "not there yet");

        assert_eq!(diag.len(), 2);
        let err = diag.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration (2 problems)\n  \
             - `hmr.path` must start with `/`\n  \
             - `hmr.heartbeat` must be positive (hint: try 10000)"
        );
    }

    #[test]
    fn test_hints_alone_are_ok() {
        let mut diag = ConfigDiagnostics::new();
        diag.hint(FieldPath::new("watch.stats"), "not there yet");
        assert!(diag.into_result().is_ok());
    }
}
