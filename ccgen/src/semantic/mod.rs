//! Semantic analysis.
//!
//! Validates and annotates a grammar before any code is generated:
//!
//! 1. Rewrites explicit lookaheads at non-choice positions into singleton choices.
//! 2. Builds the production table and resolves non-terminal references.
//! 3. Checks token productions (lexical states, `<EOF>`, free-standing references,
//!    private expressions), names and numbers every token kind, and resolves
//!    `<NAME>` references.
//! 4. Computes which productions can derive the empty sequence (fixed point).
//! 5. With the sanity check on: empty repetition bodies, left recursion,
//!    regular-expression reference loops, and lookahead adequacy.
//!
//! Problems are accumulated in the session diagnostics; the run is aborted
//! at checkpoints once any error has been recorded.

pub mod empty;
pub mod fixer;
pub mod recursion;
pub mod tokens;

use crate::error::GenerateError;
use crate::grammar::{Expansion, Grammar, ProdId, ProductionKind};
use crate::lookahead::LookaheadCalc;
use crate::session::{GeneratorSession, ProductionFacts};

pub use empty::empty_expansion_exists;

/// Run every analysis pass over `grammar`.
pub fn semanticize(grammar: &mut Grammar, session: &mut GeneratorSession) -> Result<(), GenerateError> {
    let opts = session.options.clone();
    if opts.lookahead > 1 && !opts.force_la_check && opts.sanity_check {
        session.diagnostics.global_warning(
            "Lookahead adequacy checking not being performed since option LOOKAHEAD \
             is more than 1.  Set option FORCE_LA_CHECK to true to force checking.",
        );
    }

    fixer::fix_lookaheads(grammar, session);

    build_production_table(grammar, session);
    resolve_nonterminals(grammar, session);

    tokens::check_token_productions(grammar, session);
    tokens::collect_named_tokens(grammar, session);
    tokens::assign_ordinals(grammar, session);
    if opts.user_token_manager {
        tokens::number_user_token_references(grammar, session);
    } else {
        tokens::resolve_token_references(grammar, session);
    }
    log::debug!(
        "semantic: {} productions, {} token kinds",
        grammar.productions.len(),
        session.token_count
    );

    session.diagnostics.checkpoint()?;

    empty::compute_empty_possible(grammar, session);

    if opts.sanity_check && session.diagnostics.error_count() == 0 {
        empty::check_empty_repetitions(grammar, session);
        recursion::check_left_recursion(grammar, session);
        if !opts.user_token_manager {
            recursion::check_regex_loops(grammar, session);
        }
        if session.diagnostics.error_count() == 0 {
            check_lookahead_adequacy(grammar, session);
        }
    }

    session.diagnostics.checkpoint()
}

fn build_production_table(grammar: &Grammar, session: &mut GeneratorSession) {
    session.facts = ProductionFacts::with_len(grammar.productions.len());
    for (index, prod) in grammar.productions.iter().enumerate() {
        if session.production_table.contains_key(&prod.name) {
            session.diagnostics.semantic_error(
                prod.loc,
                format!("{} occurs on the left hand side of more than one production.", prod.name),
            );
        }
        session.production_table.insert(prod.name.clone(), ProdId(index as u32));
    }
}

fn resolve_nonterminals(grammar: &Grammar, session: &mut GeneratorSession) {
    for prod in &grammar.productions {
        let Some(body) = prod.body() else { continue };
        for id in grammar.pre_order(body, &|_| true) {
            if let Expansion::NonTerminal { name, .. } = grammar.kind(id) {
                match session.lookup_production(name) {
                    Some(target) => session.facts.parents[target.index()].push(id),
                    None => session.diagnostics.semantic_error(
                        grammar.exp(id).loc,
                        format!("Non-terminal {} has not been defined.", name),
                    ),
                }
            }
        }
    }
}

/// Repetition bodies without an explicit lookahead of their own.
fn implicit_lookahead(grammar: &Grammar, nested: crate::grammar::ExpId) -> bool {
    grammar.sequence_lookahead(nested).map_or(true, |la| !la.explicit)
}

fn check_lookahead_adequacy(grammar: &Grammar, session: &mut GeneratorSession) {
    let opts = session.options.clone();
    let bodies: Vec<_> = grammar
        .productions
        .iter()
        .filter_map(|p| match p.kind {
            ProductionKind::Bnf { expansion, .. } => Some(expansion),
            ProductionKind::Code { .. } => None,
        })
        .collect();
    for body in bodies {
        let nodes = grammar.pre_order(body, &|e| !matches!(e, Expansion::Lookahead(_)));
        for id in nodes {
            match grammar.kind(id) {
                Expansion::Choice(_) => {
                    if opts.lookahead == 1 || opts.force_la_check {
                        LookaheadCalc::new(grammar, session).choice_calc(id);
                    }
                }
                Expansion::OneOrMore(nested)
                | Expansion::ZeroOrMore(nested)
                | Expansion::ZeroOrOne(nested) => {
                    let nested = *nested;
                    if opts.force_la_check
                        || (implicit_lookahead(grammar, nested) && opts.lookahead == 1)
                    {
                        LookaheadCalc::new(grammar, session).ebnf_calc(id, nested);
                    }
                }
                _ => {}
            }
        }
    }
}
