//! Lookahead adequacy analysis.
//!
//! [`LookaheadWalk`] enumerates bounded token prefixes: the first `k` tokens
//! an expansion can start with, and the first `k` tokens that can follow it.
//! [`LookaheadCalc`] raises `k` step by step at every choice point and
//! repetition until the competing prefix sets stop overlapping, and warns
//! when the lookahead the grammar gives is not enough.

use std::collections::HashMap;

use crate::emit::add_escapes;
use crate::grammar::{ExpId, Expansion, Grammar, Parent, ProductionKind, Regex};
use crate::semantic::empty_expansion_exists;
use crate::session::GeneratorSession;

// ══════════════════════════════════════════════════════════════════════════════
// Partial matches
// ══════════════════════════════════════════════════════════════════════════════

/// A token prefix under construction.
///
/// Copies of a match keep its `id`; extending it by a token yields a new one.
/// Follow-set computation uses the ids to tell which matches were carried
/// through an expansion untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchInfo {
    id: u32,
    pub tokens: Vec<u32>,
}

impl MatchInfo {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Walk
// ══════════════════════════════════════════════════════════════════════════════

pub struct LookaheadWalk<'a> {
    grammar: &'a Grammar,
    session: &'a GeneratorSession,
    /// Matches are complete once they hold this many tokens.
    pub la_limit: usize,
    /// Treat a semantic lookahead as blocking the walk.
    pub consider_semantic_la: bool,
    /// Matches that reached `la_limit`.
    pub size_limited: Vec<MatchInfo>,
    next_id: u32,
    generations: HashMap<ExpId, u64>,
    next_generation: u64,
}

impl<'a> LookaheadWalk<'a> {
    pub fn new(grammar: &'a Grammar, session: &'a GeneratorSession, la_limit: usize) -> Self {
        LookaheadWalk {
            grammar,
            session,
            la_limit,
            consider_semantic_la: false,
            size_limited: Vec::new(),
            next_id: 0,
            generations: HashMap::new(),
            next_generation: 1,
        }
    }

    /// A single empty match, the usual starting point.
    pub fn empty_match(&mut self) -> Vec<MatchInfo> {
        vec![self.fresh(Vec::new())]
    }

    fn fresh(&mut self, tokens: Vec<u32>) -> MatchInfo {
        self.next_id += 1;
        MatchInfo { id: self.next_id, tokens }
    }

    pub fn new_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    /// Extend every partial match by what `exp` can start with. Matches
    /// reaching the limit move to [`LookaheadWalk::size_limited`]; the rest
    /// are returned.
    pub fn gen_first_set(&mut self, partials: &[MatchInfo], exp: ExpId) -> Vec<MatchInfo> {
        let grammar = self.grammar;
        match grammar.kind(exp) {
            Expansion::Terminal { rexp, .. } => {
                let ordinal = grammar.rexp(*rexp).ordinal;
                let mut out = Vec::new();
                for m in partials {
                    let mut tokens = m.tokens.clone();
                    tokens.push(ordinal);
                    let extended = self.fresh(tokens);
                    if extended.len() >= self.la_limit {
                        self.size_limited.push(extended);
                    } else {
                        out.push(extended);
                    }
                }
                out
            }
            Expansion::NonTerminal { name, .. } => {
                let Some(prod) = self.session.lookup_production(name) else {
                    return Vec::new();
                };
                match &grammar.prod(prod).kind {
                    ProductionKind::Bnf { expansion, .. } => self.gen_first_set(partials, *expansion),
                    // Hand-written code consumes an unknown amount of input:
                    // whatever was matched so far is as far as analysis gets.
                    ProductionKind::Code { .. } => {
                        self.size_limited.extend(partials.iter().cloned());
                        Vec::new()
                    }
                }
            }
            Expansion::Choice(alts) => {
                let mut out = Vec::new();
                for alt in alts {
                    out.extend(self.gen_first_set(partials, *alt));
                }
                out
            }
            Expansion::Sequence(units) => {
                let mut current = partials.to_vec();
                for unit in units {
                    current = self.gen_first_set(&current, *unit);
                    if current.is_empty() {
                        break;
                    }
                }
                current
            }
            Expansion::OneOrMore(nested) => {
                let mut out = Vec::new();
                self.repeat_into(&mut out, partials.to_vec(), *nested);
                out
            }
            Expansion::ZeroOrMore(nested) => {
                let mut out = partials.to_vec();
                self.repeat_into(&mut out, partials.to_vec(), *nested);
                out
            }
            Expansion::ZeroOrOne(nested) => {
                let mut out = partials.to_vec();
                out.extend(self.gen_first_set(partials, *nested));
                out
            }
            Expansion::TryBlock { body, .. } => self.gen_first_set(partials, *body),
            Expansion::Lookahead(la) if self.consider_semantic_la && la.semantic.is_some() => {
                Vec::new()
            }
            Expansion::Lookahead(_) | Expansion::Action(_) => partials.to_vec(),
        }
    }

    /// Apply `nested` repeatedly, collecting every round into `out`.
    fn repeat_into(&mut self, out: &mut Vec<MatchInfo>, start: Vec<MatchInfo>, nested: ExpId) {
        let mut current = start;
        loop {
            let next = self.gen_first_set(&current, nested);
            if next.is_empty() || same_matches(&next, &current) {
                break;
            }
            out.extend(next.iter().cloned());
            current = next;
        }
    }

    /// Extend every partial match by what can follow `exp`.
    pub fn gen_follow_set(&mut self, partials: &[MatchInfo], exp: ExpId, generation: u64) -> Vec<MatchInfo> {
        if self.generations.get(&exp) == Some(&generation) {
            return Vec::new();
        }
        self.generations.insert(exp, generation);

        let grammar = self.grammar;
        match grammar.parent(exp) {
            None => partials.to_vec(),
            Some(Parent::Production(prod)) => {
                let callers = self
                    .session
                    .facts
                    .parents
                    .get(prod.index())
                    .cloned()
                    .unwrap_or_default();
                let mut out = Vec::new();
                for caller in callers {
                    out.extend(self.gen_follow_set(partials, caller, generation));
                }
                out
            }
            Some(Parent::Expansion(parent)) => match grammar.kind(parent) {
                Expansion::Sequence(units) => {
                    let position = units.iter().position(|u| *u == exp).unwrap_or(units.len());
                    let mut current = partials.to_vec();
                    for unit in units.iter().skip(position + 1) {
                        current = self.gen_first_set(&current, *unit);
                        if current.is_empty() {
                            return current;
                        }
                    }
                    self.split_and_follow(current, partials, parent, generation)
                }
                Expansion::OneOrMore(_) | Expansion::ZeroOrMore(_) => {
                    let mut more = partials.to_vec();
                    self.repeat_into(&mut more, partials.to_vec(), exp);
                    self.split_and_follow(more, partials, parent, generation)
                }
                _ => self.gen_follow_set(partials, parent, generation),
            },
        }
    }

    /// Matches that passed through unchanged continue in the current
    /// generation; extended ones start a new one.
    fn split_and_follow(
        &mut self,
        matches: Vec<MatchInfo>,
        original: &[MatchInfo],
        parent: ExpId,
        generation: u64,
    ) -> Vec<MatchInfo> {
        let (unchanged, extended): (Vec<_>, Vec<_>) = matches
            .into_iter()
            .partition(|m| original.iter().any(|o| o.id == m.id));
        let mut out = Vec::new();
        if !extended.is_empty() {
            let fresh = self.new_generation();
            out = self.gen_follow_set(&extended, parent, fresh);
        }
        if !unchanged.is_empty() {
            out.extend(self.gen_follow_set(&unchanged, parent, generation));
        }
        out
    }
}

fn same_matches(a: &[MatchInfo], b: &[MatchInfo]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.id == y.id)
}

// ══════════════════════════════════════════════════════════════════════════════
// Adequacy checks
// ══════════════════════════════════════════════════════════════════════════════

pub struct LookaheadCalc<'a> {
    grammar: &'a Grammar,
    session: &'a mut GeneratorSession,
}

impl<'a> LookaheadCalc<'a> {
    pub fn new(grammar: &'a Grammar, session: &'a mut GeneratorSession) -> Self {
        LookaheadCalc { grammar, session }
    }

    fn explicit_lookahead(&self, alt: ExpId) -> bool {
        self.grammar.sequence_lookahead(alt).map_or(false, |la| la.explicit)
    }

    /// Index of the first alternative whose lookahead has to be checked.
    fn first_checked(&self, alts: &[ExpId]) -> usize {
        if self.session.options.force_la_check {
            return 0;
        }
        alts.iter()
            .position(|a| !self.explicit_lookahead(*a))
            .unwrap_or(alts.len())
    }

    /// Find, for every alternative, the smallest lookahead separating it
    /// from the alternatives after it.
    pub fn choice_calc(&mut self, choice: ExpId) {
        let grammar = self.grammar;
        let Expansion::Choice(alts) = grammar.kind(choice) else { return };
        let n = alts.len();
        if n < 2 {
            return;
        }
        let first = self.first_checked(alts);
        let force = self.session.options.force_la_check;
        let max_la = self.session.options.choice_ambiguity_check;

        let mut min_la = vec![0u32; n - 1];
        let mut overlap_info: Vec<Option<MatchInfo>> = vec![None; n - 1];
        let mut other = vec![0usize; n - 1];

        for la in 1..=max_la {
            let mut dbl: Vec<Vec<MatchInfo>> = vec![Vec::new(); n];
            let mut dbr: Vec<Vec<MatchInfo>> = vec![Vec::new(); n];
            {
                let mut walk = LookaheadWalk::new(grammar, self.session, la as usize);
                walk.consider_semantic_la = !force;
                for i in first..n - 1 {
                    walk.size_limited.clear();
                    let start = walk.empty_match();
                    walk.gen_first_set(&start, alts[i]);
                    dbl[i] = std::mem::take(&mut walk.size_limited);
                }
                walk.consider_semantic_la = false;
                for i in (first + 1)..n {
                    let start = walk.empty_match();
                    walk.gen_first_set(&start, alts[i]);
                    dbr[i] = std::mem::take(&mut walk.size_limited);
                }
            }

            if la == 1 {
                for i in first..n - 1 {
                    let alt = alts[i];
                    if empty_expansion_exists(grammar, self.session, alt) {
                        self.session.diagnostics.warning(
                            grammar.exp(alt).loc,
                            "This choice can expand to the empty token sequence and will \
                             therefore always be taken in favor of the choices after it.",
                        );
                        return;
                    }
                    if dbl[i].iter().any(MatchInfo::is_empty) {
                        self.session.diagnostics.warning(
                            grammar.exp(alt).loc,
                            "JAVACODE non-terminal will force this choice to be taken in \
                             favor of the choices after it.",
                        );
                        return;
                    }
                }
            }

            let mut overlap_detected = false;
            for i in first..n - 1 {
                for j in (i + 1)..n {
                    if let Some(m) = overlap(&dbl[i], &dbr[j]) {
                        min_la[i] = la + 1;
                        overlap_info[i] = Some(m);
                        other[i] = j;
                        overlap_detected = true;
                        break;
                    }
                }
            }
            if !overlap_detected {
                break;
            }
        }

        for i in first..n - 1 {
            if self.explicit_lookahead(alts[i]) && !force {
                continue;
            }
            if min_la[i] <= 1 {
                continue;
            }
            let or_more = if min_la[i] > max_la { " or more" } else { "" };
            let here = grammar.exp(alts[i]).loc;
            let there = grammar.exp(alts[other[i]]).loc;
            let prefix = overlap_info[i]
                .as_ref()
                .map(|m| self.image(m))
                .unwrap_or_default();
            self.session.diagnostics.warning(
                here,
                format!(
                    "Choice conflict involving two expansions at line {}, column {} and line {}, \
                     column {} respectively.\n         A common prefix is: {}\n         \
                     Consider using a lookahead of {}{} for earlier expansion.",
                    here.line, here.column, there.line, there.column, prefix, min_la[i], or_more
                ),
            );
        }
    }

    /// Check a repetition or option body against what follows the construct.
    pub fn ebnf_calc(&mut self, exp: ExpId, nested: ExpId) {
        let grammar = self.grammar;
        let force = self.session.options.force_la_check;
        let max_la = self.session.options.other_ambiguity_check;
        let construct = match grammar.kind(exp) {
            Expansion::OneOrMore(_) => "(...)+",
            Expansion::ZeroOrMore(_) => "(...)*",
            _ => "[...]",
        };

        let mut last_overlap: Option<MatchInfo> = None;
        let mut la = 1;
        while la <= max_la {
            let (first, follow) = {
                let mut walk = LookaheadWalk::new(grammar, self.session, la as usize);
                walk.consider_semantic_la = !force;
                let start = walk.empty_match();
                walk.gen_first_set(&start, nested);
                let first = std::mem::take(&mut walk.size_limited);
                walk.consider_semantic_la = false;
                let generation = walk.new_generation();
                walk.gen_follow_set(&start, exp, generation);
                (first, std::mem::take(&mut walk.size_limited))
            };
            if la == 1 && first.iter().any(MatchInfo::is_empty) {
                self.session.diagnostics.warning(
                    grammar.exp(nested).loc,
                    format!(
                        "JAVACODE non-terminal within {} construct will force this construct \
                         to be entered in favor of expansions occurring after construct.",
                        construct
                    ),
                );
            }
            match overlap(&first, &follow) {
                Some(m) => last_overlap = Some(m),
                None => break,
            }
            la += 1;
        }

        if la <= 1 {
            return;
        }
        let loc = grammar.exp(exp).loc;
        let or_more = if la > max_la { " or more" } else { "" };
        let prefix = last_overlap.as_ref().map(|m| self.image(m)).unwrap_or_default();
        self.session.diagnostics.warning(
            loc,
            format!(
                "Choice conflict in {} construct at line {}, column {}.\n         \
                 Expansion nested within construct and expansion following construct\n         \
                 have common prefixes, one of which is: {}\n         \
                 Consider using a lookahead of {}{} for nested expansion.",
                construct, loc.line, loc.column, prefix, la, or_more
            ),
        );
    }

    /// Space-separated rendering of a token prefix.
    pub fn image(&self, m: &MatchInfo) -> String {
        let parts: Vec<String> = m
            .tokens
            .iter()
            .map(|&ordinal| {
                if ordinal == 0 {
                    return "<EOF>".to_string();
                }
                let Some(&rexp) = self.session.rexps_of_tokens.get(&ordinal) else {
                    return format!("<token of kind {}>", ordinal);
                };
                let node = self.grammar.rexp(rexp);
                match &node.kind {
                    Regex::StringLiteral(image) => format!("\"{}\"", add_escapes(image)),
                    _ if !node.label.is_empty() => format!("<{}>", node.label),
                    _ => format!("<token of kind {}>", ordinal),
                }
            })
            .collect();
        parts.join(" ")
    }
}

/// First pair of matches sharing a common prefix; the shorter one is
/// returned. Any empty match ends the search with no result.
pub fn overlap(left: &[MatchInfo], right: &[MatchInfo]) -> Option<MatchInfo> {
    for m1 in left {
        for m2 in right {
            let size = m1.len().min(m2.len());
            if size == 0 {
                return None;
            }
            if m1.tokens[..size] == m2.tokens[..size] {
                return Some(if m1.len() <= m2.len() { m1.clone() } else { m2.clone() });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: u32, tokens: &[u32]) -> MatchInfo {
        MatchInfo { id, tokens: tokens.to_vec() }
    }

    #[test]
    fn test_overlap_returns_shorter_match() {
        let left = vec![info(1, &[3, 4])];
        let right = vec![info(2, &[5]), info(3, &[3])];
        assert_eq!(overlap(&left, &right), Some(info(3, &[3])));
    }

    #[test]
    fn test_overlap_disjoint() {
        let left = vec![info(1, &[3, 4])];
        let right = vec![info(2, &[3, 5])];
        assert_eq!(overlap(&left, &right), None);
    }

    #[test]
    fn test_overlap_empty_match_ends_search() {
        let left = vec![info(1, &[]), info(2, &[7])];
        let right = vec![info(3, &[7])];
        assert_eq!(overlap(&left, &right), None);
    }
}
