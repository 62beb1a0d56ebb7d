//! Empty-derivation analysis.

use crate::grammar::{ExpId, Expansion, Grammar, ProductionKind};
use crate::session::GeneratorSession;

/// Whether `exp` can match the empty token sequence, given the current
/// per-production flags.
pub fn empty_expansion_exists(grammar: &Grammar, session: &GeneratorSession, exp: ExpId) -> bool {
    match grammar.kind(exp) {
        Expansion::NonTerminal { name, .. } => session
            .lookup_production(name)
            .map_or(false, |p| session.facts.empty_possible.get(p.index()).copied().unwrap_or(false)),
        Expansion::Action(_) | Expansion::Lookahead(_) => true,
        Expansion::Terminal { .. } => false,
        Expansion::OneOrMore(nested) => empty_expansion_exists(grammar, session, *nested),
        Expansion::ZeroOrMore(_) | Expansion::ZeroOrOne(_) => true,
        Expansion::Choice(alts) => alts
            .iter()
            .any(|a| empty_expansion_exists(grammar, session, *a)),
        Expansion::Sequence(units) => units
            .iter()
            .all(|u| empty_expansion_exists(grammar, session, *u)),
        Expansion::TryBlock { body, .. } => empty_expansion_exists(grammar, session, *body),
    }
}

/// Flip `empty_possible` flags until a full pass changes nothing.
///
/// Returns the number of passes taken (always at most productions + 1).
pub fn compute_empty_possible(grammar: &Grammar, session: &mut GeneratorSession) -> usize {
    let mut passes = 0;
    loop {
        passes += 1;
        let mut changed = false;
        for (index, prod) in grammar.productions.iter().enumerate() {
            let ProductionKind::Bnf { expansion, .. } = prod.kind else { continue };
            if !session.facts.empty_possible[index]
                && empty_expansion_exists(grammar, session, expansion)
            {
                session.facts.empty_possible[index] = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    log::trace!("empty-possible fixed point reached after {} passes", passes);
    passes
}

/// Repetition bodies must consume at least one token.
pub fn check_empty_repetitions(grammar: &Grammar, session: &mut GeneratorSession) {
    let bodies: Vec<_> = grammar.productions.iter().filter_map(|p| p.body()).collect();
    for body in bodies {
        for id in grammar.pre_order(body, &|_| true) {
            let (nested, image) = match grammar.kind(id) {
                Expansion::OneOrMore(n) => (*n, "(...)+"),
                Expansion::ZeroOrMore(n) => (*n, "(...)*"),
                Expansion::ZeroOrOne(n) => (*n, "(...)?"),
                _ => continue,
            };
            if empty_expansion_exists(grammar, session, nested) {
                session.diagnostics.semantic_error(
                    grammar.exp(id).loc,
                    format!("Expansion within \"{}\" can be matched by empty string.", image),
                );
            }
        }
    }
}
