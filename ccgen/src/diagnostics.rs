//! Error and warning accumulator.
//!
//! Analysis passes never stop at the first problem. They record it here with
//! the source position of the offending construct and keep going; the
//! pipeline calls [`Diagnostics::checkpoint`] between stages to decide
//! whether to continue.

use std::fmt;

use crate::error::GenerateError;
use crate::grammar::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One recorded problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// `None` for problems that are not tied to a grammar construct.
    pub location: Option<Location>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
        };
        match self.location {
            Some(loc) => write!(
                f,
                "{}: Line {}, Column {}: {}",
                kind, loc.line, loc.column, self.message
            ),
            None => write!(f, "{}: {}", kind, self.message),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn semantic_error(&mut self, location: Location, message: impl Into<String>) {
        self.push(Severity::Error, Some(location), message.into());
    }

    pub fn warning(&mut self, location: Location, message: impl Into<String>) {
        self.push(Severity::Warning, Some(location), message.into());
    }

    /// A warning with no source position (e.g. option interactions).
    pub fn global_warning(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, None, message.into());
    }

    fn push(&mut self, severity: Severity, location: Option<Location>, message: String) {
        let diagnostic = Diagnostic { severity, location, message };
        match severity {
            Severity::Error => {
                log::error!("{}", diagnostic);
                self.errors += 1;
            }
            Severity::Warning => {
                log::warn!("{}", diagnostic);
                self.warnings += 1;
            }
        }
        self.entries.push(diagnostic);
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Warning)
    }

    /// Fails with [`GenerateError::TooManyErrors`] once any error is recorded.
    pub fn checkpoint(&self) -> Result<(), GenerateError> {
        if self.errors > 0 {
            Err(GenerateError::TooManyErrors { errors: self.errors })
        } else {
            Ok(())
        }
    }

    /// "Detected N errors and M warnings."
    pub fn summary(&self) -> String {
        format!(
            "Detected {} errors and {} warnings.",
            self.errors, self.warnings
        )
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.errors = 0;
        self.warnings = 0;
    }
}
