//! String literal front end of a lexical state.
//!
//! String literal tokens are matched by a per-position cascade before the
//! general automaton gets a look. For every position `i` and character `c`
//! a [`KindInfo`] records which literal kinds are still alive after reading
//! `c` at `i` (`valid_kinds`) and which end exactly there (`final_kinds`).
//!
//! When the cascade fails part way through a literal, the automaton built
//! from the remaining token regexes has to resume as if it had read the same
//! prefix. [`LiteralDfa::generate_start_states`] precomputes, for each
//! literal prefix, the automaton state reached and the best non-literal
//! match seen so far; prefixes that agree on all three share one entry.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use indexmap::IndexMap;

use super::{partition::AlphabetPartition, to_lower, to_upper, Dfa, StateId, DEAD_STATE, NO_KIND};

pub fn has_bit(words: &[u64], kind: u32) -> bool {
    words
        .get((kind / 64) as usize)
        .is_some_and(|w| w & (1u64 << (kind % 64)) != 0)
}

pub fn set_bit(words: &mut [u64], kind: u32) {
    words[(kind / 64) as usize] |= 1u64 << (kind % 64);
}

/// Kinds set in a bit vector, ascending.
pub fn bits(words: &[u64]) -> impl Iterator<Item = u32> + '_ {
    words.iter().enumerate().flat_map(|(j, &w)| {
        (0..64u32)
            .filter(move |&k| w & (1u64 << k) != 0)
            .map(move |k| j as u32 * 64 + k)
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindInfo {
    pub valid_kinds: Vec<u64>,
    pub final_kinds: Vec<u64>,
    pub valid_count: u32,
    pub final_count: u32,
}

impl KindInfo {
    pub fn new(words: usize) -> Self {
        KindInfo {
            valid_kinds: vec![0; words],
            final_kinds: vec![0; words],
            valid_count: 0,
            final_count: 0,
        }
    }

    pub fn insert_valid(&mut self, kind: u32) {
        if !has_bit(&self.valid_kinds, kind) {
            set_bit(&mut self.valid_kinds, kind);
            self.valid_count += 1;
        }
    }

    pub fn insert_final(&mut self, kind: u32) {
        if !has_bit(&self.final_kinds, kind) {
            set_bit(&mut self.final_kinds, kind);
            self.final_count += 1;
        }
    }
}

/// A string literal token active in the lexical state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralToken {
    pub kind: u32,
    /// UTF-16 code units.
    pub image: Vec<u32>,
    /// `IGNORE_CASE` on the owning token production.
    pub ignore_case: bool,
}

/// Key of a [`LiteralDfa::states_for_pos`] bucket: best kind matched so far
/// (or [`NO_KIND`]), the position it was matched at, and the automaton state
/// after the prefix (or [`DEAD_STATE`]).
pub type StartKey = (u32, usize, StateId);

#[derive(Debug, Clone, Default)]
pub struct LiteralDfa {
    /// 64-bit words in every active-kind vector.
    pub words: usize,
    pub char_pos_kind: Vec<BTreeMap<u32, KindInfo>>,
    pub max_len: usize,
    /// Per active word: longest literal in that word, minus one.
    pub max_len_for_active: Vec<usize>,
    /// One past the largest literal kind.
    pub max_str_kind: u32,
    pub literals: Vec<LiteralToken>,
    /// Literals that are a prefix of another literal in the state.
    pub sub_string: BTreeSet<u32>,
    pub sub_string_at_pos: Vec<bool>,
    pub intermediate_kinds: HashMap<u32, Vec<u32>>,
    pub intermediate_pos: HashMap<u32, Vec<usize>>,
    pub states_for_pos: Vec<IndexMap<StartKey, Vec<u64>>>,
    ignore_case: bool,
}

impl LiteralDfa {
    /// Index `literals` (non-empty images) and work out substring relations.
    /// In a mixed-case state every literal counts as a substring.
    pub fn build(mut literals: Vec<LiteralToken>, ignore_case: bool, mixed: bool) -> Self {
        literals.retain(|l| !l.image.is_empty());
        literals.sort_by_key(|l| l.kind);
        let max_str_kind = literals.last().map_or(0, |l| l.kind + 1);
        let words = (max_str_kind / 64 + 1) as usize;

        let mut dfa = LiteralDfa {
            words,
            max_len_for_active: vec![0; words],
            max_str_kind,
            ignore_case,
            ..Default::default()
        };
        for lit in &literals {
            dfa.generate_dfa(lit);
        }
        dfa.literals = literals;
        dfa.fill_sub_string(mixed);
        dfa
    }

    fn generate_dfa(&mut self, lit: &LiteralToken) {
        let len = lit.image.len();
        self.max_len = self.max_len.max(len);
        for (i, &c) in lit.image.iter().enumerate() {
            if i >= self.char_pos_kind.len() {
                self.char_pos_kind.push(BTreeMap::new());
            }
            let key = if self.ignore_case { to_lower(c) } else { c };
            let mut keys = vec![key];
            if !self.ignore_case && lit.ignore_case {
                for variant in [to_lower(c), to_upper(c)] {
                    if variant != c && !keys.contains(&variant) {
                        keys.push(variant);
                    }
                }
            }
            let words = self.words;
            for key in keys {
                let info = self.char_pos_kind[i]
                    .entry(key)
                    .or_insert_with(|| KindInfo::new(words));
                if i + 1 == len {
                    info.insert_final(lit.kind);
                } else {
                    info.insert_valid(lit.kind);
                }
            }
        }
        let word = (lit.kind / 64) as usize;
        self.max_len_for_active[word] = self.max_len_for_active[word].max(len - 1);
    }

    fn fill_sub_string(&mut self, mixed: bool) {
        self.sub_string_at_pos = vec![false; self.max_len];
        for lit in &self.literals {
            let is_sub = mixed
                || self.literals.iter().any(|other| {
                    other.kind != lit.kind
                        && (other.image.starts_with(&lit.image)
                            || (self.ignore_case && starts_with_ignore_case(&other.image, &lit.image)))
                });
            if is_sub {
                self.sub_string.insert(lit.kind);
                self.sub_string_at_pos[lit.image.len() - 1] = true;
            }
        }
    }

    /// Kind of the literal whose image is exactly `image`, or [`NO_KIND`].
    pub fn str_kind(&self, image: &[u32]) -> u32 {
        self.literals
            .iter()
            .find(|l| l.image == image)
            .map_or(NO_KIND, |l| l.kind)
    }

    pub fn is_sub_string(&self, kind: u32) -> bool {
        self.sub_string.contains(&kind)
    }

    /// Run every literal prefix through the automaton of the non-literal
    /// kinds and bucket the outcomes per position.
    pub fn generate_start_states(&mut self, dfa: &Dfa, partition: &AlphabetPartition, any_char: Option<u32>) {
        self.states_for_pos = vec![IndexMap::new(); self.max_len];
        let words = self.words;

        for lit in &self.literals {
            let len = lit.image.len();
            let mut kinds = vec![NO_KIND; len];
            let mut positions = vec![0usize; len];
            let mut state = dfa.start;
            let mut kind;
            let mut matched_pos = 0usize;

            for j in 0..len {
                if state == DEAD_STATE {
                    kind = kinds[j - 1];
                    kinds[j] = kind;
                    matched_pos = positions[j - 1];
                    positions[j] = matched_pos;
                } else {
                    let next = dfa.transition(state, partition.classify(lit.image[j]));
                    kind = dfa.accept(next).unwrap_or(NO_KIND);
                    if j == 0 && kind != NO_KIND {
                        if let Some(any) = any_char.filter(|&any| any < kind) {
                            kind = any;
                        }
                    }

                    if self.str_kind(&lit.image[..=j]) < kind {
                        kind = NO_KIND;
                        kinds[j] = NO_KIND;
                        matched_pos = 0;
                    } else if kind != NO_KIND {
                        kinds[j] = kind;
                        matched_pos = j;
                        positions[j] = j;
                    } else if j == 0 {
                        kinds[j] = NO_KIND;
                    } else {
                        kind = kinds[j - 1];
                        kinds[j] = kind;
                        matched_pos = positions[j - 1];
                        positions[j] = matched_pos;
                    }
                    state = next;
                }

                if kind == NO_KIND && state == DEAD_STATE {
                    continue;
                }
                let actives = self.states_for_pos[j]
                    .entry((kind, matched_pos, state))
                    .or_insert_with(|| vec![0; words]);
                set_bit(actives, lit.kind);
            }

            self.intermediate_kinds.insert(lit.kind, kinds);
            self.intermediate_pos.insert(lit.kind, positions);
        }
    }

    /// Automaton state to resume from after `kind` matched through `pos`.
    pub fn state_for_kind(&self, pos: usize, kind: u32) -> Option<StateId> {
        self.states_for_pos.get(pos)?.iter().find_map(|(&(_, _, state), actives)| {
            (state != DEAD_STATE && has_bit(actives, kind)).then_some(state)
        })
    }

    /// A smaller non-literal kind matching the same text as literal `kind`
    /// ending at `pos`.
    pub fn intermediate(&self, kind: u32, pos: usize) -> Option<u32> {
        let kinds = self.intermediate_kinds.get(&kind)?;
        let positions = self.intermediate_pos.get(&kind)?;
        let ik = *kinds.get(pos)?;
        (ik < kind && positions.get(pos) == Some(&pos)).then_some(ik)
    }

    /// Kind actually reported when literal `kind` ends at `pos`. A shadowing
    /// non-literal match takes precedence over a wildcard token, and the
    /// wildcard only competes for single-character literals.
    pub fn kind_to_print(&self, pos: usize, kind: u32, any_char: Option<u32>) -> u32 {
        if let Some(ik) = self.intermediate(kind, pos) {
            return ik;
        }
        match any_char {
            Some(any) if pos == 0 && any < kind => any,
            _ => kind,
        }
    }

    /// Table entry matching character `c` at `pos`.
    pub fn kind_info(&self, pos: usize, c: u32) -> Option<(u32, &KindInfo)> {
        let table = self.char_pos_kind.get(pos)?;
        if let Some(info) = table.get(&c) {
            return Some((c, info));
        }
        if self.ignore_case {
            for key in [to_lower(c), to_upper(c)] {
                if let Some(info) = table.get(&key) {
                    if to_upper(key) == c || to_lower(key) == c {
                        return Some((key, info));
                    }
                }
            }
        }
        None
    }

    /// Case labels of the switch for key `key`.
    pub fn case_labels(&self, key: u32) -> Vec<u32> {
        let mut labels = Vec::new();
        if self.ignore_case {
            if to_upper(key) != key {
                labels.push(to_upper(key));
            }
            if to_lower(key) != key {
                labels.push(to_lower(key));
            }
        }
        labels.push(key);
        labels
    }
}

fn starts_with_ignore_case(s1: &[u32], s2: &[u32]) -> bool {
    if s1.len() < s2.len() {
        return false;
    }
    s1.iter()
        .zip(s2)
        .all(|(&c1, &c2)| c1 == c2 || to_lower(c2) == c1 || to_upper(c2) == c1)
}

pub fn utf16(s: &str) -> Vec<u32> {
    s.encode_utf16().map(u32::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::nfa::NfaBuilder;
    use crate::automata::partition::compute_equivalence_classes;
    use crate::automata::subset::subset_construction;
    use crate::grammar::GrammarBuilder;

    fn lit(kind: u32, image: &str) -> LiteralToken {
        LiteralToken { kind, image: utf16(image), ignore_case: false }
    }

    #[test]
    fn test_valid_and_final_kinds() {
        let dfa = LiteralDfa::build(vec![lit(1, "="), lit(2, "=="), lit(3, "!=")], false, false);
        assert_eq!(dfa.max_len, 2);
        assert_eq!(dfa.max_str_kind, 4);

        let (_, eq0) = dfa.kind_info(0, '=' as u32).expect("'=' at 0");
        assert!(has_bit(&eq0.final_kinds, 1));
        assert!(has_bit(&eq0.valid_kinds, 2));
        assert!(!has_bit(&eq0.final_kinds, 2));

        let (_, eq1) = dfa.kind_info(1, '=' as u32).expect("'=' at 1");
        assert!(has_bit(&eq1.final_kinds, 2));
        assert!(has_bit(&eq1.final_kinds, 3));
        assert_eq!(eq1.final_count, 2);
    }

    #[test]
    fn test_substring_marks() {
        let dfa = LiteralDfa::build(vec![lit(1, "="), lit(2, "=="), lit(3, "in")], false, false);
        assert!(dfa.is_sub_string(1));
        assert!(!dfa.is_sub_string(2));
        assert!(!dfa.is_sub_string(3));
        assert_eq!(dfa.sub_string_at_pos, vec![true, false]);
    }

    #[test]
    fn test_ignore_case_keys() {
        let mut token = lit(1, "if");
        token.ignore_case = true;
        let dfa = LiteralDfa::build(vec![token], false, false);
        assert!(dfa.kind_info(0, 'I' as u32).is_some());
        assert!(dfa.kind_info(0, 'i' as u32).is_some());

        let global = LiteralDfa::build(vec![lit(1, "If")], true, false);
        assert_eq!(global.char_pos_kind[0].keys().copied().collect::<Vec<_>>(), vec!['i' as u32]);
        assert_eq!(global.kind_info(0, 'I' as u32).map(|(k, _)| k), Some('i' as u32));
        assert_eq!(global.case_labels('i' as u32), vec!['I' as u32, 'i' as u32]);
    }

    #[test]
    fn test_literal_shadowed_by_identifier_prefix() {
        // "in" (kind 1) and an identifier (kind 2) over [a-z]+.
        let mut b = GrammarBuilder::new();
        let letters = b.rx_range('a', 'z');
        let ident = b.rx_plus(letters);
        let grammar = b.finish();
        let mut nfa = NfaBuilder::new(&grammar);
        nfa.add_kind(ident, 2, false);
        let nfa = nfa.finish();
        let partition = compute_equivalence_classes(&nfa);
        let regex = subset_construction(&nfa, &partition);

        let mut dfa = LiteralDfa::build(vec![lit(1, "in")], false, false);
        dfa.generate_start_states(&regex, &partition, None);

        // After "i" the identifier has matched; after "in" the literal wins.
        assert_eq!(dfa.intermediate_kinds[&1], vec![2, NO_KIND]);
        assert!(dfa.state_for_kind(1, 1).is_some());
        assert_eq!(dfa.kind_to_print(1, 1, None), 1);
    }

    #[test]
    fn test_wildcard_only_at_first_position() {
        let dfa = LiteralDfa::build(vec![lit(5, "a"), lit(6, "bc")], false, false);
        assert_eq!(dfa.kind_to_print(0, 5, Some(3)), 3);
        assert_eq!(dfa.kind_to_print(1, 6, Some(3)), 6);
        assert_eq!(dfa.kind_to_print(0, 5, None), 5);
    }
}
