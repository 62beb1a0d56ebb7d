//! # ccgen: generator core for JavaCC-style parsers
//!
//! Takes a grammar tree built by a front end and produces the text of a
//! table-driven token manager and a recursive-descent parser with
//! configurable lookahead, for Java or C++ hosts:
//!
//! - Numbers token kinds, resolves references and checks the grammar
//!   (left recursion, empty loops, lookahead adequacy)
//! - Builds per-lexical-state literal tables and NFA-derived DFAs
//! - Picks a decision strategy (trivial, single-token switch, speculative
//!   scan) at every choice point
//!
//! ## Architecture
//!
//! ```text
//!   Grammar (arena tree)
//!        │
//!        ▼
//!  ┌──────────────────────────────────────────────┐
//!  │ 1. Semantic analysis (semantic, lookahead)     │
//!  │    fix lookaheads → ordinals → references      │
//!  │    → empty fixed point → recursion checks      │
//!  │    → choice / repetition ambiguity checks      │
//!  │                                                │
//!  │ 2. Lexer (automata)                            │
//!  │    literals → KindInfo cascade                 │
//!  │    regexes → NFA → partition → DFA → codegen   │
//!  │                                                │
//!  │ 3. Parser (parse_engine)                       │
//!  │    phase 1 methods → jj_2 entries → jj_3 scans │
//!  └──────────────────────────────────────────────┘
//!        │
//!        ▼
//!   CodeSink (main + include channels)
//! ```
//!
//! All per-run state lives in a [`GeneratorSession`]; nothing is global.

pub mod automata;
pub mod diagnostics;
pub mod emit;
pub mod error;
pub mod grammar;
pub mod lookahead;
pub mod options;
pub mod parse_engine;
pub mod pipeline;
pub mod semantic;
pub mod session;

#[cfg(test)]
mod tests;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use emit::{BufferSink, CodeSink};
pub use error::GenerateError;
pub use grammar::{Grammar, GrammarBuilder};
pub use options::{Options, OutputLanguage};
pub use pipeline::{run_pipeline, GeneratedCode, PipelineState};
pub use session::GeneratorSession;

/// Analyze `grammar` and generate its token manager and parser routines.
pub fn generate(grammar: Grammar, options: Options) -> Result<GeneratedCode, GenerateError> {
    run_pipeline(grammar, options)
}
