//! Per-lexical-state lexer construction.
//!
//! Collects the kinds active in each lexical state and splits them between
//! the string literal cascade and the regex automaton, then computes the
//! state-wide facts the emitted token manager and the reference scanner
//! both depend on: the empty-string match, the `~[]` wildcard kind, the
//! mixed-case flag and the single-character skip set.

use std::collections::{BTreeMap, BTreeSet};

use super::{
    literal::{bits, utf16, LiteralDfa, LiteralToken},
    nfa::{char_list_ranges, NfaBuilder},
    partition::{compute_equivalence_classes, AlphabetPartition},
    subset::subset_construction,
    to_lower, to_upper, Dfa, DEAD_STATE,
};
use crate::emit::add_escapes;
use crate::error::GenerateError;
use crate::grammar::{Grammar, Location, Regex, RegexNode, RexpId, TokenProductionKind, TpId};
use crate::session::GeneratorSession;

/// What the token manager does with a matched kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindAttrs {
    pub class: TokenProductionKind,
    pub action: Option<String>,
    /// Index of the lexical state to switch to.
    pub next_state: Option<usize>,
    pub rexp: RexpId,
    pub ignore_case: bool,
}

#[derive(Debug, Clone)]
pub struct LexState {
    pub name: String,
    pub index: usize,
    /// Every kind active in the state, ascending.
    pub kinds: Vec<u32>,
    pub literals: LiteralDfa,
    pub partition: AlphabetPartition,
    /// Automaton over the non-literal kinds (and all literals in a mixed state).
    pub dfa: Dfa,
    pub has_nfa: bool,
    /// Kind matched by the empty string.
    pub init_match: Option<u32>,
    /// Smallest `~[]` kind.
    pub can_match_any_char: Option<u32>,
    /// Literals disagree on case sensitivity; the literal cascade is skipped.
    pub mixed: bool,
    /// Characters consumed before every token, with the SKIP kind they stand for.
    pub skip_chars: BTreeMap<u32, u32>,
    /// Position-0 switch keys replaced by the skip set.
    pub skip_keys: BTreeSet<u32>,
    /// Some MORE kind leads into this state.
    pub can_reach_on_more: bool,
}

impl LexState {
    /// Whether the automaton can consume `c` as a first character.
    pub fn can_start_nfa(&self, c: u32) -> bool {
        self.has_nfa && self.dfa.transition(self.dfa.start, self.partition.classify(c)) != DEAD_STATE
    }
}

#[derive(Debug, Clone)]
pub struct LexerTables {
    pub states: Vec<LexState>,
    /// Indexed by ordinal; `None` for end of file and for kinds that never
    /// reach the token manager.
    pub kinds: Vec<Option<KindAttrs>>,
    /// State to switch to at end of file.
    pub eof_next_state: Option<usize>,
    /// Global `IGNORE_CASE`.
    pub ignore_case: bool,
}

impl LexerTables {
    pub fn state(&self, name: &str) -> Result<&LexState, GenerateError> {
        self.states
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| GenerateError::UnknownLexicalState { name: name.to_string() })
    }

    pub fn attrs(&self, kind: u32) -> Option<&KindAttrs> {
        self.kinds.get(kind as usize).and_then(Option::as_ref)
    }

    pub fn class_of(&self, kind: u32) -> Option<TokenProductionKind> {
        if kind == 0 {
            return Some(TokenProductionKind::Token);
        }
        self.attrs(kind).map(|a| a.class)
    }

    /// Fixed image of `kind` as listed in `jjstrLiteralImages`, if it has one.
    pub fn literal_image(&self, grammar: &Grammar, kind: u32) -> Option<String> {
        if kind == 0 {
            return Some(String::new());
        }
        let attrs = self.attrs(kind)?;
        let image = grammar.rexp(attrs.rexp).literal_image()?;
        if attrs.class != TokenProductionKind::Token {
            return None;
        }
        let reach_on_more = self
            .states
            .iter()
            .any(|s| s.can_reach_on_more && s.kinds.contains(&kind));
        let caseless = image.to_lowercase() == image && image.to_uppercase() == image;
        let ignore_case = attrs.ignore_case || self.ignore_case;
        if reach_on_more || (ignore_case && !caseless) {
            return None;
        }
        Some(image.to_string())
    }
}

/// Build the lexer for every declared lexical state.
pub fn build_lexer(grammar: &Grammar, session: &mut GeneratorSession) -> Result<LexerTables, GenerateError> {
    let opts = session.options.clone();
    let token_kinds = session.token_kinds();
    let mut kinds: Vec<Option<KindAttrs>> = vec![None; token_kinds];
    // Per state: (kind, rexp, ignore_case) in declaration order.
    let mut per_state: Vec<Vec<(u32, RexpId, bool)>> = vec![Vec::new(); grammar.lexical_states.len()];

    for (tp_index, tp) in grammar.token_productions.iter().enumerate() {
        let states = grammar.states_of(TpId(tp_index as u32));
        for res in &tp.respecs {
            let node = grammar.rexp(res.rexp);
            if node.private || matches!(node.kind, Regex::EndOfFile | Regex::JustName { .. }) {
                continue;
            }
            let kind = node.ordinal;
            if kind == 0 || kind as usize >= token_kinds {
                continue;
            }
            let next_state = match &res.next_state {
                Some(name) => Some(
                    grammar
                        .state_index(name)
                        .ok_or_else(|| GenerateError::UnknownLexicalState { name: name.clone() })?,
                ),
                None => None,
            };
            kinds[kind as usize] = Some(KindAttrs {
                class: tp.kind,
                action: res.action.clone(),
                next_state,
                rexp: res.rexp,
                ignore_case: tp.ignore_case,
            });
            for state in &states {
                let index = grammar
                    .state_index(state)
                    .ok_or_else(|| GenerateError::UnknownLexicalState { name: state.clone() })?;
                if !per_state[index].iter().any(|&(k, _, _)| k == kind) {
                    per_state[index].push((kind, res.rexp, tp.ignore_case));
                }
            }
        }
    }

    let eof_next_state = match session.eof.as_ref().and_then(|e| e.next_state.clone()) {
        Some(name) => Some(
            grammar
                .state_index(&name)
                .ok_or(GenerateError::UnknownLexicalState { name })?,
        ),
        None => None,
    };

    let mut unicode_warning_given = false;
    let mut states = Vec::with_capacity(per_state.len());
    for (index, entries) in per_state.into_iter().enumerate() {
        let name = grammar.lexical_states[index].clone();
        let state = build_state(
            grammar,
            session,
            &kinds,
            index,
            name,
            entries,
            &mut unicode_warning_given,
        );
        states.push(state);
    }

    // MORE kinds make their target state accumulate images.
    let mut reach_on_more = vec![false; states.len()];
    for state in &states {
        for &kind in &state.kinds {
            if let Some(attrs) = kinds[kind as usize].as_ref() {
                if attrs.class == TokenProductionKind::More {
                    reach_on_more[attrs.next_state.unwrap_or(state.index)] = true;
                }
            }
        }
    }
    for (state, reach) in states.iter_mut().zip(reach_on_more) {
        state.can_reach_on_more = reach;
    }

    Ok(LexerTables {
        states,
        kinds,
        eof_next_state,
        ignore_case: opts.ignore_case,
    })
}

fn build_state(
    grammar: &Grammar,
    session: &mut GeneratorSession,
    attrs: &[Option<KindAttrs>],
    index: usize,
    name: String,
    entries: Vec<(u32, RexpId, bool)>,
    unicode_warning_given: &mut bool,
) -> LexState {
    let opts = session.options.clone();
    let mut kinds: Vec<u32> = entries.iter().map(|&(k, _, _)| k).collect();
    kinds.sort_unstable();

    let mut literal_tokens = Vec::new();
    let mut any_char: Option<u32> = None;
    let mut mixed = false;
    let mut last_ignore: Option<bool> = None;

    for &(kind, rexp, ignore) in &entries {
        let node = grammar.rexp(rexp);
        if !*unicode_warning_given && !opts.java_unicode_escape && !opts.user_char_stream && uses_non_ascii(grammar, rexp) {
            *unicode_warning_given = true;
            session.diagnostics.warning(
                node.loc,
                "Non-ASCII characters used in regular expression.Please make sure you use the correct \
                 Reader when you create the parser, one that can handle your character set.",
            );
        }
        match node.literal_image() {
            Some(image) if !image.is_empty() => {
                if last_ignore.is_some_and(|last| last != ignore) {
                    mixed = true;
                }
                last_ignore = Some(ignore);
                literal_tokens.push(LiteralToken { kind, image: utf16(image), ignore_case: ignore });
            }
            _ if node.matches_any_char() => {
                any_char = Some(any_char.map_or(kind, |k| k.min(kind)));
            }
            _ => {}
        }
    }

    let mut builder = NfaBuilder::new(grammar);
    for &(kind, rexp, ignore) in &entries {
        let node = grammar.rexp(rexp);
        let is_literal = node.literal_image().is_some_and(|i| !i.is_empty());
        if node.matches_any_char() || (is_literal && !mixed) {
            continue;
        }
        builder.add_kind(rexp, kind, ignore || opts.ignore_case);
    }
    let nfa = builder.finish();
    let has_nfa = nfa.has_transitions();
    let partition = compute_equivalence_classes(&nfa);
    let dfa = subset_construction(&nfa, &partition);

    let literal_input = if mixed { Vec::new() } else { literal_tokens };
    let mut literals = LiteralDfa::build(literal_input, opts.ignore_case, mixed);
    if has_nfa && !mixed {
        literals.generate_start_states(&dfa, &partition, any_char);
    }

    let init_match = dfa.accept(dfa.start).filter(|&k| k != 0);
    if let Some(kind) = init_match {
        let node = rexp_for_kind(grammar, session, kind);
        let (loc, label) = node.map_or((Location::default(), String::new()), |n| (n.loc, n.label.clone()));
        let for_label = if label.is_empty() { String::new() } else { format!(" for {}", label) };
        session.diagnostics.warning(
            loc,
            format!(
                "Regular expression{} can be matched by the empty string (\"\") in lexical state {}. \
                 This can result in an endless loop of empty string matches.",
                for_label, name
            ),
        );
    }

    let mut state = LexState {
        name,
        index,
        kinds,
        literals,
        partition,
        dfa,
        has_nfa,
        init_match,
        can_match_any_char: any_char,
        mixed,
        skip_chars: BTreeMap::new(),
        skip_keys: BTreeSet::new(),
        can_reach_on_more: false,
    };
    report_shadowed_literals(grammar, session, &state);
    find_skip_chars(&mut state, attrs, opts.ignore_case);

    log::debug!(
        "lexical state {}: {} kinds, {} literals (max length {}), {} NFA states, {} DFA states, {} classes{}",
        state.name,
        state.kinds.len(),
        state.literals.literals.len(),
        state.literals.max_len,
        nfa.states.len(),
        state.dfa.states.len(),
        state.partition.num_classes,
        if state.mixed { ", mixed case" } else { "" }
    );
    state
}

fn uses_non_ascii(grammar: &Grammar, rexp: RexpId) -> bool {
    grammar.regex_pre_order(rexp).into_iter().any(|id| match &grammar.rexp(id).kind {
        Regex::StringLiteral(image) => image.chars().any(|c| c as u32 > 0xff),
        Regex::CharacterList { items, .. } => char_list_ranges(false, items, false)
            .iter()
            .any(|&(_, hi)| hi > 0xff),
        _ => false,
    })
}

/// Warn about literals reported under another kind.
fn report_shadowed_literals(grammar: &Grammar, session: &mut GeneratorSession, state: &LexState) {
    let literals = &state.literals;
    for lit in &literals.literals {
        let pos = lit.image.len() - 1;
        let printed = literals.kind_to_print(pos, lit.kind, state.can_match_any_char);
        if printed == lit.kind {
            continue;
        }
        let Some(node) = rexp_for_kind(grammar, session, lit.kind) else { continue };
        let image = node.literal_image().unwrap_or_default();
        let label = kind_label(grammar, session, printed);
        session.diagnostics.global_warning(format!(
            " \"{}\" cannot be matched as a string literal token at line {}, column {}. It will be matched as {}.",
            add_escapes(image),
            node.loc.line,
            node.loc.column,
            label
        ));
    }
}

/// How diagnostics name a token kind.
pub fn kind_label(grammar: &Grammar, session: &GeneratorSession, kind: u32) -> String {
    match rexp_for_kind(grammar, session, kind) {
        Some(node) => match node.literal_image() {
            Some(image) => format!(" \"{}\"", add_escapes(image)),
            None if !node.label.is_empty() => format!(" <{}>", node.label),
            None => format!(" <token of kind {}>", kind),
        },
        None => format!(" <token of kind {}>", kind),
    }
}

/// Single-character SKIP literals with no action, no state change and no
/// competing match become a skip set consumed ahead of the cascade.
fn find_skip_chars(state: &mut LexState, attrs: &[Option<KindAttrs>], ignore_case: bool) {
    let Some(table) = state.literals.char_pos_kind.first() else { return };
    let mut skips = Vec::new();
    'keys: for (&c, info) in table {
        if c >= 128 || info.final_count == 0 || state.can_start_nfa(c) {
            continue;
        }
        let Some(word) = info.final_kinds.iter().position(|&w| w != 0) else { continue };
        for kind in bits(&info.final_kinds[word..=word]).map(|k| k + word as u32 * 64) {
            if state.literals.is_sub_string(kind) {
                continue;
            }
            if state.literals.kind_to_print(0, kind, state.can_match_any_char) != kind {
                break;
            }
            let plain_skip = attrs
                .get(kind as usize)
                .and_then(Option::as_ref)
                .is_some_and(|a| a.class == TokenProductionKind::Skip && a.action.is_none() && a.next_state.is_none());
            if plain_skip {
                skips.push((c, kind));
                continue 'keys;
            }
        }
    }
    for (c, kind) in skips {
        state.skip_keys.insert(c);
        state.skip_chars.insert(c, kind);
        if ignore_case {
            state.skip_chars.entry(to_upper(c)).or_insert(kind);
            state.skip_chars.entry(to_lower(c)).or_insert(kind);
        }
    }
}

/// Defining expression of a token kind.
pub fn rexp_for_kind<'g>(grammar: &'g Grammar, session: &GeneratorSession, kind: u32) -> Option<&'g RegexNode> {
    session.rexps_of_tokens.get(&kind).map(|&id| grammar.rexp(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{GrammarBuilder, DEFAULT_STATE};
    use crate::options::Options;
    use crate::semantic::semanticize;

    fn lexer_for(build: impl FnOnce(&mut GrammarBuilder)) -> (Grammar, GeneratorSession, LexerTables) {
        let mut b = GrammarBuilder::new();
        build(&mut b);
        let mut grammar = b.finish();
        let mut session = GeneratorSession::new(Options::default());
        semanticize(&mut grammar, &mut session).expect("grammar is valid");
        let tables = build_lexer(&grammar, &mut session).expect("lexer builds");
        (grammar, session, tables)
    }

    #[test]
    fn test_literals_and_regexes_split() {
        let (_, _, tables) = lexer_for(|b| {
            let tp = b.token_production(None, TokenProductionKind::Token, false);
            let eq = b.rx_literal("==");
            b.respec(tp, eq, None, None);
            let letters = b.rx_range('a', 'z');
            let ident = b.rx_plus(letters);
            let ident = b.label(ident, "ID");
            b.respec(tp, ident, None, None);
        });
        let state = tables.state(DEFAULT_STATE).expect("default state");
        assert_eq!(state.kinds, vec![1, 2]);
        assert_eq!(state.literals.literals.len(), 1);
        assert!(state.has_nfa);
        assert!(!state.mixed);
        assert_eq!(state.init_match, None);
        assert_eq!(state.dfa.accept(state.dfa.start), None);
    }

    #[test]
    fn test_skip_chars_for_whitespace() {
        let (_, _, tables) = lexer_for(|b| {
            let skip = b.token_production(None, TokenProductionKind::Skip, false);
            for ws in [" ", "\t", "\n"] {
                let lit = b.rx_literal(ws);
                b.respec(skip, lit, None, None);
            }
            let tp = b.token_production(None, TokenProductionKind::Token, false);
            let plus = b.rx_literal("+");
            b.respec(tp, plus, None, None);
        });
        let state = tables.state(DEFAULT_STATE).expect("default state");
        assert_eq!(state.skip_chars.keys().copied().collect::<Vec<_>>(), vec![9, 10, 32]);
        assert!(!state.skip_keys.contains(&('+' as u32)));
    }

    #[test]
    fn test_wildcard_kind_and_mixed_state() {
        let (_, _, tables) = lexer_for(|b| {
            let tp = b.token_production(None, TokenProductionKind::Token, false);
            let any = b.rx_any();
            b.respec(tp, any, None, None);
            let a = b.rx_literal("a");
            b.respec(tp, a, None, None);
            let ic = b.token_production(None, TokenProductionKind::Token, true);
            let kw = b.rx_literal("begin");
            b.respec(ic, kw, None, None);
        });
        let state = tables.state(DEFAULT_STATE).expect("default state");
        assert_eq!(state.can_match_any_char, Some(1));
        assert!(state.mixed);
        assert_eq!(state.literals.max_len, 0);
    }

    fn warning_messages(session: &GeneratorSession) -> Vec<String> {
        session.diagnostics.warnings().map(|d| d.message.clone()).collect()
    }

    #[test]
    fn test_literal_after_identifier_reported_as_identifier() {
        let (grammar, session, _) = lexer_for(|b| {
            let tp = b.token_production(None, TokenProductionKind::Token, false);
            let letters = b.rx_range('a', 'z');
            let ident = b.rx_plus(letters);
            let ident = b.label(ident, "ID");
            b.respec(tp, ident, None, None);
            let kw = b.rx_literal("in");
            b.respec(tp, kw, None, None);
        });
        let kw = rexp_for_kind(&grammar, &session, 2).expect("literal kind");
        assert_eq!(
            warning_messages(&session),
            vec![format!(
                " \"in\" cannot be matched as a string literal token at line {}, column {}. \
                 It will be matched as  <ID>.",
                kw.loc.line, kw.loc.column
            )]
        );
    }

    #[test]
    fn test_single_char_literal_after_wildcard_reported_as_wildcard() {
        let (_, session, tables) = lexer_for(|b| {
            let tp = b.token_production(None, TokenProductionKind::Token, false);
            let any = b.rx_any();
            b.respec(tp, any, None, None);
            let plus = b.rx_literal("+");
            b.respec(tp, plus, None, None);
            let arrow = b.rx_literal("->");
            b.respec(tp, arrow, None, None);
        });
        let state = tables.state(DEFAULT_STATE).expect("default state");
        assert_eq!(state.can_match_any_char, Some(1));

        // "->" is longer than the wildcard match and stays reachable.
        let warnings = warning_messages(&session);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with(" \"+\" cannot be matched as a string literal token"));
        assert!(warnings[0].ends_with("It will be matched as  <token of kind 1>."));
    }

    #[test]
    fn test_unknown_state_is_an_error() {
        let (_, _, tables) = lexer_for(|_| {});
        assert!(matches!(
            tables.state("COMMENT"),
            Err(GenerateError::UnknownLexicalState { .. })
        ));
    }
}
