//! Fatal generator errors.
//!
//! Individual grammar problems are collected by [`crate::diagnostics::Diagnostics`];
//! the variants here stop a run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerateError {
    /// Errors were accumulated by the time a checkpoint was reached.
    #[error("Detected {errors} errors; generation aborted.")]
    TooManyErrors { errors: usize },

    /// A malformed `\uXXXX` sequence in scanner input.
    #[error("Invalid escape character at line {line} column {column}.")]
    InvalidEscape { line: u32, column: u32 },

    /// The reference scanner found no token at the current position.
    #[error("Lexical error at line {line}, column {column}.  Encountered: {found}")]
    LexicalError { state: String, line: u32, column: u32, found: String },

    #[error("invalid options: {0}")]
    Config(#[from] serde_json::Error),

    #[error("lexical state \"{name}\" is not declared by the grammar")]
    UnknownLexicalState { name: String },
}
