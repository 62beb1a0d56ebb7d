//! NFA construction from token regular expressions.
//!
//! Thompson construction over the regex arena. Every kind active in a
//! lexical state contributes one fragment whose accept state carries the
//! kind's ordinal; all fragments hang off a shared start state by epsilon.
//! `<NAME>` references are expanded in place.

use super::{case_variants, literal::utf16, CharClass, Nfa, NfaFragment, NfaState, StateId, MAX_CHAR};
use crate::grammar::{CharItem, Grammar, Regex, RexpId};

pub struct NfaBuilder<'g> {
    grammar: &'g Grammar,
    pub nfa: Nfa,
    /// References being expanded, to cut reference loops.
    expanding: Vec<RexpId>,
}

impl<'g> NfaBuilder<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        NfaBuilder {
            grammar,
            nfa: Nfa::new(),
            expanding: Vec::new(),
        }
    }

    /// Add `rexp` as an alternative accepting `kind`.
    pub fn add_kind(&mut self, rexp: RexpId, kind: u32, ignore_case: bool) {
        let frag = self.fragment(rexp, ignore_case);
        let accept = &mut self.nfa.states[frag.accept as usize].accept;
        *accept = Some(accept.map_or(kind, |k| k.min(kind)));
        let start = self.nfa.start;
        self.nfa.add_epsilon(start, frag.start);
    }

    pub fn finish(self) -> Nfa {
        self.nfa
    }

    fn pair(&mut self) -> NfaFragment {
        let start = self.nfa.add_state(NfaState::new());
        let accept = self.nfa.add_state(NfaState::new());
        NfaFragment { start, accept }
    }

    fn fragment(&mut self, rexp: RexpId, ignore_case: bool) -> NfaFragment {
        let grammar = self.grammar;
        match &grammar.rexp(rexp).kind {
            Regex::StringLiteral(image) => self.literal_fragment(image, ignore_case),
            Regex::CharacterList { negated, items } => {
                let ranges = char_list_ranges(*negated, items, ignore_case);
                let frag = self.pair();
                for (lo, hi) in ranges {
                    let class = if lo == hi { CharClass::Single(lo) } else { CharClass::Range(lo, hi) };
                    self.nfa.add_transition(frag.start, frag.accept, class);
                }
                frag
            }
            Regex::JustName { target: Some(target), .. } => {
                let target = *target;
                if self.expanding.contains(&target) {
                    return self.pair();
                }
                self.expanding.push(target);
                let frag = self.fragment(target, ignore_case);
                self.expanding.pop();
                frag
            }
            Regex::JustName { target: None, .. } | Regex::EndOfFile => self.pair(),
            Regex::Sequence(units) => {
                let frag = self.pair();
                let mut current = frag.start;
                for unit in units.clone() {
                    let inner = self.fragment(unit, ignore_case);
                    self.nfa.add_epsilon(current, inner.start);
                    current = inner.accept;
                }
                self.nfa.add_epsilon(current, frag.accept);
                frag
            }
            Regex::Choice(alts) => {
                let frag = self.pair();
                for alt in alts.clone() {
                    let inner = self.fragment(alt, ignore_case);
                    self.nfa.add_epsilon(frag.start, inner.start);
                    self.nfa.add_epsilon(inner.accept, frag.accept);
                }
                frag
            }
            Regex::OneOrMore(body) => self.repeat(*body, ignore_case, false, true),
            Regex::ZeroOrMore(body) => self.repeat(*body, ignore_case, true, true),
            Regex::ZeroOrOne(body) => self.repeat(*body, ignore_case, true, false),
            Regex::Repetition { body, min, max } => {
                let (body, min, max) = (*body, *min, *max);
                let frag = self.pair();
                let mut current = frag.start;
                for _ in 0..min {
                    let inner = self.fragment(body, ignore_case);
                    self.nfa.add_epsilon(current, inner.start);
                    current = inner.accept;
                }
                match max {
                    None => {
                        let tail = self.repeat(body, ignore_case, true, true);
                        self.nfa.add_epsilon(current, tail.start);
                        current = tail.accept;
                    }
                    Some(max) => {
                        for _ in min..max {
                            let tail = self.repeat(body, ignore_case, true, false);
                            self.nfa.add_epsilon(current, tail.start);
                            current = tail.accept;
                        }
                    }
                }
                self.nfa.add_epsilon(current, frag.accept);
                frag
            }
        }
    }

    fn repeat(&mut self, body: RexpId, ignore_case: bool, optional: bool, looping: bool) -> NfaFragment {
        let frag = self.pair();
        let inner = self.fragment(body, ignore_case);
        self.nfa.add_epsilon(frag.start, inner.start);
        self.nfa.add_epsilon(inner.accept, frag.accept);
        if looping {
            self.nfa.add_epsilon(inner.accept, inner.start);
        }
        if optional {
            self.nfa.add_epsilon(frag.start, frag.accept);
        }
        frag
    }

    fn literal_fragment(&mut self, image: &str, ignore_case: bool) -> NfaFragment {
        let start = self.nfa.add_state(NfaState::new());
        let mut current = start;
        for c in utf16(image) {
            let next = self.nfa.add_state(NfaState::new());
            let variants = if ignore_case { case_variants(c) } else { vec![c] };
            for v in variants {
                self.nfa.add_transition(current, next, CharClass::Single(v));
            }
            current = next;
        }
        if current == start {
            let accept = self.nfa.add_state(NfaState::new());
            self.nfa.add_epsilon(start, accept);
            current = accept;
        }
        NfaFragment { start, accept: current }
    }
}

/// Sorted, merged inclusive ranges matched by a character list.
pub fn char_list_ranges(negated: bool, items: &[CharItem], ignore_case: bool) -> Vec<(u32, u32)> {
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for item in items {
        let (lo, hi) = match *item {
            CharItem::Single(c) => (c as u32, c as u32),
            CharItem::Range(lo, hi) => (lo as u32, hi as u32),
        };
        ranges.push((lo, hi.min(MAX_CHAR)));
        if ignore_case {
            for c in lo..=hi.min(MAX_CHAR) {
                for v in case_variants(c).into_iter().skip(1) {
                    ranges.push((v, v));
                }
            }
        }
    }
    let merged = merge_ranges(ranges);
    if negated {
        complement(&merged)
    } else {
        merged
    }
}

fn merge_ranges(mut ranges: Vec<(u32, u32)>) -> Vec<(u32, u32)> {
    ranges.retain(|(lo, hi)| lo <= hi);
    ranges.sort_unstable();
    let mut out: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
    for (lo, hi) in ranges {
        match out.last_mut() {
            Some(last) if lo <= last.1.saturating_add(1) => last.1 = last.1.max(hi),
            _ => out.push((lo, hi)),
        }
    }
    out
}

fn complement(ranges: &[(u32, u32)]) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    let mut next = 0u32;
    for &(lo, hi) in ranges {
        if lo > next {
            out.push((next, lo - 1));
        }
        next = hi + 1;
    }
    if next <= MAX_CHAR {
        out.push((next, MAX_CHAR));
    }
    out
}

/// Compute the epsilon closure of a set of NFA states.
///
/// Returns all states reachable from `states` via zero or more epsilon
/// transitions, sorted and deduplicated.
pub fn epsilon_closure(nfa: &Nfa, states: &[StateId]) -> Vec<StateId> {
    let mut closure: Vec<StateId> = states.to_vec();
    let mut stack: Vec<StateId> = states.to_vec();
    let mut visited = vec![false; nfa.states.len()];

    for &s in states {
        visited[s as usize] = true;
    }

    while let Some(state) = stack.pop() {
        for &target in &nfa.states[state as usize].epsilon {
            if !visited[target as usize] {
                visited[target as usize] = true;
                closure.push(target);
                stack.push(target);
            }
        }
    }

    closure.sort_unstable();
    closure.dedup();
    closure
}

/// Lowest ordinal accepted by any state in the set.
pub fn set_accept(nfa: &Nfa, states: &[StateId]) -> Option<u32> {
    states
        .iter()
        .filter_map(|&s| nfa.states[s as usize].accept)
        .min()
}
