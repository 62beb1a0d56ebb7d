//! Generation pipeline.
//!
//! A state machine that:
//! 1. **Analyzes** the grammar (numbering tokens, resolving references,
//!    running the sanity and lookahead checks)
//! 2. **Generates** the token manager and the parser routines
//!
//! ```text
//! Grammar ──→ Ready ──→ [semanticize] ──→ Analyzed ──→ [lexer + parser codegen] ──→ Complete
//! ```
//!
//! Each transition stops at the first checkpoint with recorded errors.

use crate::automata::codegen::generate_token_manager;
use crate::automata::lexgen::{build_lexer, LexerTables};
use crate::diagnostics::Diagnostic;
use crate::emit::BufferSink;
use crate::error::GenerateError;
use crate::grammar::Grammar;
use crate::options::Options;
use crate::parse_engine;
use crate::semantic::semanticize;
use crate::session::GeneratorSession;

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct GeneratedCode {
    /// Token manager text; `None` when the host supplies its own.
    pub token_manager: Option<BufferSink>,
    pub parser: BufferSink,
    pub lexer_tables: Option<LexerTables>,
    /// Token mask per `jj_la1` slot, 32 kinds per word.
    pub la1_masks: Vec<Vec<u32>>,
    /// Number of `jj_2` entry points, the size of the `jj_2_rtns` table.
    pub jj2_count: u32,
    pub diagnostics: Vec<Diagnostic>,
    /// "Detected N errors and M warnings."
    pub summary: String,
}

// ══════════════════════════════════════════════════════════════════════════════
// Pipeline state machine
// ══════════════════════════════════════════════════════════════════════════════

/// Pipeline state machine.
///
/// Each state holds the data needed for the next transition.
pub enum PipelineState {
    /// Grammar as the front end built it.
    Ready {
        grammar: Grammar,
        session: GeneratorSession,
    },
    /// Tokens numbered, references resolved, checks passed.
    Analyzed {
        grammar: Grammar,
        session: GeneratorSession,
    },
    /// Final output produced.
    Complete(Box<GeneratedCode>),
}

impl PipelineState {
    pub fn new(grammar: Grammar, options: Options) -> Self {
        PipelineState::Ready {
            grammar,
            session: GeneratorSession::new(options),
        }
    }

    /// Advance the pipeline to the next state.
    ///
    /// - `Ready → Analyzed`: semantic analysis
    /// - `Analyzed → Complete`: token manager (unless user supplied) and
    ///   parser routines
    /// - `Complete → Complete`: nothing left to do
    pub fn advance(self) -> Result<Self, GenerateError> {
        match self {
            PipelineState::Ready { mut grammar, mut session } => {
                log::debug!("pipeline: analyzing {} productions", grammar.productions.len());
                semanticize(&mut grammar, &mut session)?;
                Ok(PipelineState::Analyzed { grammar, session })
            }
            PipelineState::Analyzed { grammar, mut session } => {
                let (token_manager, lexer_tables) = if session.options.user_token_manager {
                    log::debug!("pipeline: user token manager, skipping lexer generation");
                    (None, None)
                } else {
                    let tables = build_lexer(&grammar, &mut session)?;
                    let mut sink = BufferSink::new();
                    generate_token_manager(&grammar, &session, &tables, &mut sink);
                    (Some(sink), Some(tables))
                };

                let mut parser = BufferSink::new();
                parse_engine::build(&grammar, &mut session, &mut parser)?;

                let summary = session.diagnostics.summary();
                log::debug!("pipeline: complete. {}", summary);
                Ok(PipelineState::Complete(Box::new(GeneratedCode {
                    token_manager,
                    parser,
                    lexer_tables,
                    la1_masks: std::mem::take(&mut session.phases.mask_vals),
                    jj2_count: session.phases.jj2_index,
                    diagnostics: session.diagnostics.entries().to_vec(),
                    summary,
                })))
            }
            complete @ PipelineState::Complete(_) => Ok(complete),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, PipelineState::Complete(_))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Entry point
// ══════════════════════════════════════════════════════════════════════════════

/// Run the full pipeline: analyze → generate.
pub fn run_pipeline(grammar: Grammar, options: Options) -> Result<GeneratedCode, GenerateError> {
    let mut state = PipelineState::new(grammar, options);
    loop {
        state = match state.advance()? {
            PipelineState::Complete(code) => return Ok(*code),
            next => next,
        };
    }
}
