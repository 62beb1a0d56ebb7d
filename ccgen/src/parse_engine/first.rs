//! First sets and minimum derivation sizes.

use super::{ParseEngine, INFINITE_SIZE};
use crate::grammar::{ExpId, Expansion, ProductionKind};
use crate::semantic::empty_expansion_exists;

impl<'a> ParseEngine<'a> {
    pub(super) fn reset_first_set(&mut self) {
        self.first_set = vec![false; self.token_count()];
        self.jj2_la = false;
    }

    /// Whether `exp` can run into a code production before consuming a
    /// token or passing an explicit lookahead.
    pub(super) fn java_code_check(&self, exp: ExpId) -> bool {
        let grammar = self.grammar;
        match grammar.kind(exp) {
            Expansion::NonTerminal { name, .. } => match self.production(name) {
                Some(prod) => match prod.kind {
                    ProductionKind::Code { .. } => true,
                    ProductionKind::Bnf { expansion, .. } => self.java_code_check(expansion),
                },
                None => false,
            },
            Expansion::Choice(alts) => alts.iter().any(|&alt| self.java_code_check(alt)),
            Expansion::Sequence(units) => {
                for &unit in units {
                    if let Expansion::Lookahead(la) = grammar.kind(unit) {
                        if la.explicit {
                            return false;
                        }
                    }
                    if self.java_code_check(unit) {
                        return true;
                    }
                    if !empty_expansion_exists(grammar, self.session, unit) {
                        return false;
                    }
                }
                false
            }
            Expansion::OneOrMore(nested) | Expansion::ZeroOrMore(nested) | Expansion::ZeroOrOne(nested) => {
                self.java_code_check(*nested)
            }
            Expansion::TryBlock { body, .. } => self.java_code_check(*body),
            Expansion::Terminal { .. } | Expansion::Action(_) | Expansion::Lookahead(_) => false,
        }
    }

    /// Mark every token `exp` can start with in `first_set`.
    pub(super) fn gen_first_set(&mut self, exp: ExpId) {
        let grammar = self.grammar;
        match grammar.kind(exp) {
            Expansion::Terminal { rexp, .. } => {
                let ordinal = grammar.rexp(*rexp).ordinal as usize;
                if let Some(slot) = self.first_set.get_mut(ordinal) {
                    *slot = true;
                }
            }
            Expansion::NonTerminal { name, .. } => {
                if let Some(ProductionKind::Bnf { expansion, .. }) = self.production(name).map(|p| &p.kind) {
                    self.gen_first_set(*expansion);
                }
            }
            Expansion::Choice(alts) => {
                for &alt in alts {
                    self.gen_first_set(alt);
                }
            }
            Expansion::Sequence(units) => {
                if grammar.sequence_lookahead(exp).is_some_and(|la| la.semantic.is_some()) {
                    self.jj2_la = true;
                }
                for (i, &unit) in units.iter().enumerate() {
                    if self.is_code_nonterminal(unit) {
                        // A code production is opaque: its first set is
                        // whatever the lookahead in front of it scans.
                        if let Some(Expansion::Lookahead(la)) = i.checked_sub(1).map(|p| grammar.kind(units[p])) {
                            if let Some(scan) = la.expansion.filter(|&scan| scan != exp) {
                                self.gen_first_set(scan);
                            }
                        }
                    } else {
                        self.gen_first_set(unit);
                    }
                    if !empty_expansion_exists(grammar, self.session, unit) {
                        break;
                    }
                }
            }
            Expansion::OneOrMore(nested) | Expansion::ZeroOrMore(nested) | Expansion::ZeroOrOne(nested) => {
                self.gen_first_set(*nested);
            }
            Expansion::TryBlock { body, .. } => self.gen_first_set(*body),
            Expansion::Action(_) | Expansion::Lookahead(_) => {}
        }
    }

    pub(super) fn minimum_size(&mut self, exp: ExpId) -> u32 {
        self.minimum_size_below(exp, INFINITE_SIZE)
    }

    /// Minimum size of `exp`, giving up once it is known to exceed
    /// `old_min`.
    fn minimum_size_below(&mut self, exp: ExpId, old_min: u32) -> u32 {
        let top_level = old_min == INFINITE_SIZE && self.session.phases.in_minimum_size.is_empty();
        if top_level {
            if let Some(&size) = self.session.phases.min_size_memo.get(&exp) {
                return size;
            }
        }
        if !self.session.phases.in_minimum_size.insert(exp) {
            return INFINITE_SIZE;
        }

        let grammar = self.grammar;
        let size = match grammar.kind(exp) {
            Expansion::Terminal { .. } => 1,
            Expansion::NonTerminal { name, .. } => match self.production(name).map(|p| &p.kind) {
                Some(ProductionKind::Bnf { expansion, .. }) => self.minimum_size_below(*expansion, INFINITE_SIZE),
                _ => INFINITE_SIZE,
            },
            Expansion::Choice(alts) => {
                let mut min = old_min;
                for &alt in alts {
                    if min <= 1 {
                        break;
                    }
                    min = min.min(self.minimum_size_below(alt, min));
                }
                min
            }
            Expansion::Sequence(units) => {
                let mut min = 0u32;
                for &unit in units.iter().skip(1) {
                    let unit_min = self.minimum_size_below(unit, INFINITE_SIZE);
                    if min == INFINITE_SIZE || unit_min == INFINITE_SIZE {
                        min = INFINITE_SIZE;
                    } else {
                        min = min.saturating_add(unit_min);
                        if min > old_min {
                            break;
                        }
                    }
                }
                min
            }
            Expansion::TryBlock { body, .. } => self.minimum_size_below(*body, INFINITE_SIZE),
            Expansion::OneOrMore(nested) => self.minimum_size_below(*nested, INFINITE_SIZE),
            Expansion::ZeroOrMore(_)
            | Expansion::ZeroOrOne(_)
            | Expansion::Action(_)
            | Expansion::Lookahead(_) => 0,
        };

        self.session.phases.in_minimum_size.remove(&exp);
        if top_level {
            self.session.phases.min_size_memo.insert(exp, size);
        }
        size
    }
}
