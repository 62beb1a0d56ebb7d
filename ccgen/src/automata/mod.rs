//! Automata infrastructure for lexer generation.
//!
//! Per lexical state:
//! `token regexes -> NFA -> alphabet partition -> DFA` for the non-literal
//! kinds, and `string literals -> KindInfo tables` for the literal front end.
//! [`lexgen`] ties the two together, [`codegen`] emits them, and
//! [`scanner`] interprets them directly.

pub mod charstream;
pub mod codegen;
pub mod lexgen;
pub mod literal;
pub mod nfa;
pub mod partition;
pub mod scanner;
pub mod subset;

/// Identifier for an automaton state.
pub type StateId = u32;

/// Identifier for an equivalence class of characters.
pub type ClassId = u32;

/// A sentinel value representing a non-existent / dead state.
pub const DEAD_STATE: StateId = u32::MAX;

/// Largest character value the generated scanners see (UTF-16 code unit).
pub const MAX_CHAR: u32 = 0xffff;

/// Token kind with no match.
pub const NO_KIND: u32 = i32::MAX as u32;

/// A character class for NFA transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharClass {
    Single(u32),
    /// Inclusive range.
    Range(u32, u32),
}

impl CharClass {
    pub fn contains(&self, c: u32) -> bool {
        match *self {
            CharClass::Single(x) => x == c,
            CharClass::Range(lo, hi) => lo <= c && c <= hi,
        }
    }

    /// Inclusive bounds.
    pub fn bounds(&self) -> (u32, u32) {
        match *self {
            CharClass::Single(x) => (x, x),
            CharClass::Range(lo, hi) => (lo, hi),
        }
    }
}

/// NFA state with labeled and epsilon transitions.
#[derive(Debug, Clone, Default)]
pub struct NfaState {
    pub transitions: Vec<(CharClass, StateId)>,
    pub epsilon: Vec<StateId>,
    /// Token ordinal accepted here.
    pub accept: Option<u32>,
}

impl NfaState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepting(kind: u32) -> Self {
        NfaState {
            accept: Some(kind),
            ..Self::default()
        }
    }
}

/// A complete NFA (collection of states with a designated start state).
#[derive(Debug, Clone)]
pub struct Nfa {
    pub states: Vec<NfaState>,
    pub start: StateId,
}

impl Nfa {
    /// Create a new NFA with a single non-accepting start state.
    pub fn new() -> Self {
        Nfa { states: vec![NfaState::new()], start: 0 }
    }

    pub fn add_state(&mut self, state: NfaState) -> StateId {
        let id = self.states.len() as StateId;
        self.states.push(state);
        id
    }

    pub fn add_epsilon(&mut self, from: StateId, to: StateId) {
        self.states[from as usize].epsilon.push(to);
    }

    pub fn add_transition(&mut self, from: StateId, to: StateId, class: CharClass) {
        self.states[from as usize].transitions.push((class, to));
    }

    /// Whether any state other than the start consumes input.
    pub fn has_transitions(&self) -> bool {
        self.states.iter().any(|s| !s.transitions.is_empty())
    }
}

impl Default for Nfa {
    fn default() -> Self {
        Self::new()
    }
}

/// DFA state with deterministic transitions.
#[derive(Debug, Clone)]
pub struct DfaState {
    /// `transitions[class_id]`, or [`DEAD_STATE`].
    pub transitions: Vec<StateId>,
    /// Lowest token ordinal accepted by any NFA state in the set.
    pub accept: Option<u32>,
}

impl DfaState {
    pub fn with_classes(num_classes: usize) -> Self {
        DfaState {
            transitions: vec![DEAD_STATE; num_classes],
            accept: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dfa {
    pub states: Vec<DfaState>,
    pub start: StateId,
    pub num_classes: usize,
}

impl Dfa {
    pub fn new(num_classes: usize) -> Self {
        Dfa {
            states: vec![DfaState::with_classes(num_classes)],
            start: 0,
            num_classes,
        }
    }

    pub fn add_state(&mut self, state: DfaState) -> StateId {
        let id = self.states.len() as StateId;
        self.states.push(state);
        id
    }

    #[inline]
    pub fn transition(&self, state: StateId, class: ClassId) -> StateId {
        self.states[state as usize].transitions[class as usize]
    }

    #[inline]
    pub fn set_transition(&mut self, state: StateId, class: ClassId, target: StateId) {
        self.states[state as usize].transitions[class as usize] = target;
    }

    pub fn accept(&self, state: StateId) -> Option<u32> {
        self.states.get(state as usize).and_then(|s| s.accept)
    }
}

/// An NFA fragment with a designated start and accept state.
#[derive(Debug, Clone, Copy)]
pub struct NfaFragment {
    pub start: StateId,
    pub accept: StateId,
}

/// The character itself plus its single-character lower and upper case
/// forms, as the generated scanner compares them.
pub fn case_variants(c: u32) -> Vec<u32> {
    let mut out = vec![c];
    for mapped in [to_lower(c), to_upper(c)] {
        if !out.contains(&mapped) {
            out.push(mapped);
        }
    }
    out
}

/// Single-character lower case mapping; characters whose mapping expands or
/// leaves the 16-bit range map to themselves.
pub fn to_lower(c: u32) -> u32 {
    map_case(c, |ch| single(ch.to_lowercase()))
}

pub fn to_upper(c: u32) -> u32 {
    map_case(c, |ch| single(ch.to_uppercase()))
}

fn map_case(c: u32, f: impl Fn(char) -> Option<char>) -> u32 {
    char::from_u32(c)
        .and_then(f)
        .map(|m| m as u32)
        .filter(|&m| m <= MAX_CHAR)
        .unwrap_or(c)
}

fn single(mut it: impl Iterator<Item = char>) -> Option<char> {
    let first = it.next()?;
    match it.next() {
        Some(_) => None,
        None => Some(first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_class_contains() {
        assert!(CharClass::Single('a' as u32).contains('a' as u32));
        assert!(CharClass::Range('a' as u32, 'z' as u32).contains('q' as u32));
        assert!(!CharClass::Range('a' as u32, 'z' as u32).contains('A' as u32));
    }

    #[test]
    fn test_case_variants() {
        let v = case_variants('a' as u32);
        assert!(v.contains(&('a' as u32)));
        assert!(v.contains(&('A' as u32)));
        assert_eq!(case_variants('1' as u32), vec!['1' as u32]);
        assert_eq!(to_upper('q' as u32), 'Q' as u32);
        assert_eq!(to_lower(0xdf), 0xdf);
    }
}
