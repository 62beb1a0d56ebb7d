//! Reference scanner.
//!
//! Runs [`LexerTables`] directly, following the same control flow as the
//! emitted token manager routines: the per-position literal cascade
//! (`jjMoveStringLiteralDfa<i>`), the fall back into the regex automaton
//! (`jjStopStringLiteralDfa` / `jjStartNfa`), `jjStopAtPos`,
//! `jjStartNfaWithStates` and `jjMoveNfa`. Each routine returns the number
//! of characters read for the current match; the token is the first
//! `matched_pos + 1` of them and the rest are pushed back.

use super::{
    charstream::CharStream,
    lexgen::{LexState, LexerTables},
    literal::{bits, has_bit},
    StateId, DEAD_STATE, NO_KIND,
};
use crate::emit::add_escapes;
use crate::error::GenerateError;
use crate::grammar::TokenProductionKind;
use crate::options::Options;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: u32,
    pub image: String,
    pub begin_line: u32,
    pub begin_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    /// SPECIAL tokens matched since the previous regular token.
    pub special_tokens: Vec<Token>,
}

pub struct Scanner<'t> {
    tables: &'t LexerTables,
    input: CharStream,
    state: usize,
    cur_char: u32,
    matched_kind: u32,
    matched_pos: isize,
    specials: Vec<Token>,
    /// Offset and state of the last empty match.
    last_empty: Option<(usize, usize)>,
}

impl<'t> Scanner<'t> {
    pub fn new(tables: &'t LexerTables, text: &str, options: &Options) -> Result<Self, GenerateError> {
        Ok(Scanner {
            tables,
            input: CharStream::new(text, options.tab_size, options.java_unicode_escape)?,
            state: 0,
            cur_char: 0,
            matched_kind: NO_KIND,
            matched_pos: 0,
            specials: Vec::new(),
            last_empty: None,
        })
    }

    pub fn lexical_state(&self) -> &str {
        &self.tables.states[self.state].name
    }

    pub fn switch_to(&mut self, name: &str) -> Result<(), GenerateError> {
        self.state = self.tables.state(name)?.index;
        Ok(())
    }

    /// Scan up to and including the end-of-file token.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, GenerateError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == 0;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, GenerateError> {
        let tables = self.tables;
        'token: loop {
            match self.input.begin_token() {
                Some(c) => self.cur_char = c,
                None => return Ok(self.eof_token()),
            }

            loop {
                let st = &tables.states[self.state];
                while st.skip_chars.contains_key(&self.cur_char) {
                    match self.input.begin_token() {
                        Some(c) => self.cur_char = c,
                        None => continue 'token,
                    }
                }

                let match_start = self.input.offset() - 1;
                match st.init_match {
                    Some(kind) => {
                        self.matched_kind = kind;
                        self.matched_pos = -1;
                    }
                    None => {
                        self.matched_kind = NO_KIND;
                        self.matched_pos = 0;
                    }
                }
                let cur_pos = self.move_string_literal_dfa0(st);
                if let Some(any) = st.can_match_any_char {
                    if self.matched_pos < 0 || (self.matched_pos == 0 && self.matched_kind > any) {
                        self.matched_kind = any;
                        self.matched_pos = 0;
                    }
                }

                if self.matched_kind == NO_KIND {
                    return Err(self.lexical_error(st, cur_pos));
                }
                let extra = cur_pos as isize - self.matched_pos - 1;
                if extra > 0 {
                    self.input.backup(extra as usize);
                }
                let kind = self.matched_kind;
                log::trace!("matched kind {} in {} at offset {}", kind, st.name, match_start);

                if self.matched_pos < 0 {
                    if self.last_empty == Some((match_start, self.state)) {
                        return Err(self.lexical_error(st, cur_pos));
                    }
                    self.last_empty = Some((match_start, self.state));
                }

                let attrs = tables.attrs(kind);
                let class = attrs.map_or(TokenProductionKind::Token, |a| a.class);
                let next_state = attrs.and_then(|a| a.next_state);
                match class {
                    TokenProductionKind::Token => {
                        let mut token = self.fill_token(kind);
                        token.special_tokens = std::mem::take(&mut self.specials);
                        self.switch_state(next_state);
                        return Ok(token);
                    }
                    TokenProductionKind::Special => {
                        let token = self.fill_token(kind);
                        self.specials.push(token);
                        self.switch_state(next_state);
                        continue 'token;
                    }
                    TokenProductionKind::Skip => {
                        self.switch_state(next_state);
                        continue 'token;
                    }
                    TokenProductionKind::More => {
                        self.switch_state(next_state);
                        match self.input.read_char() {
                            Some(c) => self.cur_char = c,
                            None => {
                                let st = &tables.states[self.state];
                                return Err(self.lexical_error(st, 0));
                            }
                        }
                    }
                }
            }
        }
    }

    fn switch_state(&mut self, next_state: Option<usize>) {
        if let Some(next) = next_state {
            self.state = next;
        }
    }

    fn eof_token(&mut self) -> Token {
        self.switch_state(self.tables.eof_next_state);
        let mut token = self.fill_token(0);
        token.special_tokens = std::mem::take(&mut self.specials);
        token
    }

    fn fill_token(&self, kind: u32) -> Token {
        let (begin_line, begin_column) = self.input.begin();
        let (end_line, end_column) = self.input.end();
        Token {
            kind,
            image: String::from_utf16_lossy(&to_units(&self.input.image())),
            begin_line,
            begin_column,
            end_line,
            end_column,
            special_tokens: Vec::new(),
        }
    }

    fn lexical_error(&self, st: &LexState, cur_pos: usize) -> GenerateError {
        let (mut line, mut column) = self.input.end();
        let mut image = to_units(&self.input.image());
        let found = if self.input.at_end() {
            if self.cur_char == '\n' as u32 || self.cur_char == '\r' as u32 {
                line += 1;
                column = 0;
            } else {
                column += 1;
            }
            if cur_pos <= 1 {
                image.clear();
            }
            format!("<EOF> after : \"{}\"", add_escapes(&String::from_utf16_lossy(&image)))
        } else {
            image.pop();
            if cur_pos <= 1 {
                image.clear();
            }
            let current = String::from_utf16_lossy(&to_units(&[self.cur_char]));
            format!(
                "\"{}\" ({}), after : \"{}\"",
                add_escapes(&current),
                self.cur_char,
                add_escapes(&String::from_utf16_lossy(&image))
            )
        };
        GenerateError::LexicalError { state: st.name.clone(), line, column, found }
    }

    fn read(&mut self) -> bool {
        match self.input.read_char() {
            Some(c) => {
                self.cur_char = c;
                true
            }
            None => false,
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Literal cascade
    // ══════════════════════════════════════════════════════════════════════

    fn default_at_start(&mut self, st: &LexState) -> usize {
        if st.has_nfa {
            self.move_nfa(st, st.dfa.start, 0)
        } else {
            1
        }
    }

    fn move_string_literal_dfa0(&mut self, st: &LexState) -> usize {
        let literals = &st.literals;
        if literals.max_len == 0 || st.skip_keys.contains(&self.cur_char) {
            return self.default_at_start(st);
        }
        let Some((_, info)) = literals.kind_info(0, self.cur_char) else {
            return self.default_at_start(st);
        };

        if let Some(kind) = bits(&info.final_kinds).next() {
            let printed = literals.kind_to_print(0, kind, st.can_match_any_char);
            if !literals.is_sub_string(kind) {
                return match literals.state_for_kind(0, kind) {
                    Some(state) => self.start_nfa_with_states(st, 0, printed, state),
                    None => self.stop_at_pos(0, printed),
                };
            }
            self.matched_kind = printed;
            if st.init_match.is_some() {
                self.matched_pos = 0;
            }
        }
        if info.valid_count > 0 {
            let valid = info.valid_kinds.clone();
            return self.move_string_literal_dfa(st, 1, None, valid);
        }
        self.default_at_start(st)
    }

    fn move_string_literal_dfa(&mut self, st: &LexState, i: usize, old: Option<&[u64]>, mut active: Vec<u64>) -> usize {
        let literals = &st.literals;
        if let Some(old) = old {
            for (a, o) in active.iter_mut().zip(old) {
                *a &= *o;
            }
            if active.iter().all(|&w| w == 0) {
                return if st.has_nfa && !st.mixed { self.start_nfa(st, i - 2, old) } else { i };
            }
        }

        if !self.read() {
            if st.has_nfa {
                self.stop_string_literal_dfa(st, i - 1, &active);
            }
            return i;
        }

        if let Some((_, info)) = literals.kind_info(i, self.cur_char) {
            for kind in bits(&info.final_kinds) {
                if !has_bit(&active, kind) {
                    continue;
                }
                let printed = literals.kind_to_print(i, kind, st.can_match_any_char);
                if !literals.is_sub_string(kind) {
                    return match literals.state_for_kind(i, kind) {
                        Some(state) => self.start_nfa_with_states(st, i, printed, state),
                        None => self.stop_at_pos(i, printed),
                    };
                }
                self.matched_kind = printed;
                self.matched_pos = i as isize;
                break;
            }
            if info.valid_count > 0 {
                let valid = info.valid_kinds.clone();
                return self.move_string_literal_dfa(st, i + 1, Some(&active), valid);
            }
        }

        if st.has_nfa {
            self.start_nfa(st, i - 1, &active)
        } else {
            i + 1
        }
    }

    fn stop_at_pos(&mut self, pos: usize, kind: u32) -> usize {
        self.matched_kind = kind;
        self.matched_pos = pos as isize;
        pos + 1
    }

    fn start_nfa_with_states(&mut self, st: &LexState, pos: usize, kind: u32, state: StateId) -> usize {
        self.matched_kind = kind;
        self.matched_pos = pos as isize;
        if !self.read() {
            return pos + 1;
        }
        self.move_nfa(st, state, pos + 1)
    }

    /// Automaton state standing for the literal prefix `0..=pos` among
    /// `active`, recording the best non-literal match on that prefix.
    fn stop_string_literal_dfa(&mut self, st: &LexState, pos: usize, active: &[u64]) -> StateId {
        let literals = &st.literals;
        if pos + 1 >= literals.max_len {
            return DEAD_STATE;
        }
        let Some(entries) = literals.states_for_pos.get(pos) else { return DEAD_STATE };
        for (&(kind, matched_pos, state), actives) in entries {
            if !actives.iter().zip(active).any(|(a, b)| a & b != 0) {
                continue;
            }
            if kind != NO_KIND {
                let update = if pos == 0 {
                    true
                } else if pos == matched_pos {
                    !literals.sub_string_at_pos[pos] || self.matched_pos != pos as isize
                } else if matched_pos > 0 {
                    self.matched_pos < matched_pos as isize
                } else {
                    self.matched_pos == 0
                };
                if update {
                    self.matched_kind = kind;
                    if pos != 0 || st.init_match.is_some() {
                        self.matched_pos = matched_pos as isize;
                    }
                }
            }
            return state;
        }
        DEAD_STATE
    }

    fn start_nfa(&mut self, st: &LexState, pos: usize, active: &[u64]) -> usize {
        let state = if st.mixed { st.dfa.start } else { self.stop_string_literal_dfa(st, pos, active) };
        self.move_nfa(st, state, pos + 1)
    }

    fn move_nfa(&mut self, st: &LexState, start: StateId, mut cur_pos: usize) -> usize {
        if start == DEAD_STATE {
            return cur_pos + 1;
        }
        let mut state = start;
        loop {
            state = st.dfa.transition(state, st.partition.classify(self.cur_char));
            if let Some(kind) = st.dfa.accept(state) {
                self.matched_kind = kind;
                self.matched_pos = cur_pos as isize;
            }
            cur_pos += 1;
            if state == DEAD_STATE || !self.read() {
                return cur_pos;
            }
        }
    }
}

fn to_units(units: &[u32]) -> Vec<u16> {
    units.iter().map(|&u| u as u16).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::lexgen::build_lexer;
    use crate::grammar::{CharItem, Grammar, GrammarBuilder};
    use crate::semantic::semanticize;
    use crate::session::GeneratorSession;
    use pretty_assertions::assert_eq;

    fn tables_for(build: impl FnOnce(&mut GrammarBuilder)) -> (Grammar, LexerTables) {
        let mut b = GrammarBuilder::new();
        build(&mut b);
        let mut grammar = b.finish();
        let mut session = GeneratorSession::new(Options::default());
        semanticize(&mut grammar, &mut session).expect("grammar is valid");
        let tables = build_lexer(&grammar, &mut session).expect("lexer builds");
        (grammar, tables)
    }

    fn scan(tables: &LexerTables, text: &str) -> Result<Vec<(u32, String)>, GenerateError> {
        let mut scanner = Scanner::new(tables, text, &Options::default())?;
        Ok(scanner
            .tokenize()?
            .into_iter()
            .map(|t| (t.kind, t.image))
            .collect())
    }

    fn whitespace(b: &mut GrammarBuilder) {
        let skip = b.token_production(None, TokenProductionKind::Skip, false);
        for ws in [" ", "\n"] {
            let lit = b.rx_literal(ws);
            b.respec(skip, lit, None, None);
        }
    }

    fn tok(kind: u32, image: &str) -> (u32, String) {
        (kind, image.to_string())
    }

    #[test]
    fn test_longest_literal_wins() {
        let (_, tables) = tables_for(|b| {
            let tp = b.token_production(None, TokenProductionKind::Token, false);
            let eq = b.rx_literal("=");
            b.respec(tp, eq, None, None);
            let eqeq = b.rx_literal("==");
            b.respec(tp, eqeq, None, None);
        });
        assert_eq!(scan(&tables, "==").expect("scans"), vec![tok(2, "=="), tok(0, "")]);
        assert_eq!(
            scan(&tables, "===").expect("scans"),
            vec![tok(2, "=="), tok(1, "="), tok(0, "")]
        );
    }

    #[test]
    fn test_identifier_beats_literal_prefix() {
        let (_, tables) = tables_for(|b| {
            whitespace(b);
            let tp = b.token_production(None, TokenProductionKind::Token, false);
            for kw in ["if", "in"] {
                let lit = b.rx_literal(kw);
                b.respec(tp, lit, None, None);
            }
            let letters = b.rx_range('a', 'z');
            let ident = b.rx_plus(letters);
            let ident = b.label(ident, "ID");
            b.respec(tp, ident, None, None);
        });
        // Ordinals: " " 1, "\n" 2, "if" 3, "in" 4, ID 5.
        assert_eq!(scan(&tables, "int").expect("scans"), vec![tok(5, "int"), tok(0, "")]);
        assert_eq!(
            scan(&tables, "in if i\nifx").expect("scans"),
            vec![tok(4, "in"), tok(3, "if"), tok(5, "i"), tok(5, "ifx"), tok(0, "")]
        );
    }

    #[test]
    fn test_positions_and_specials() {
        let (_, tables) = tables_for(|b| {
            whitespace(b);
            let special = b.token_production(None, TokenProductionKind::Special, false);
            let hash = b.rx_literal("#");
            let not_nl = b.rx_chars(true, vec![CharItem::Single('\n')]);
            let rest = b.rx_star(not_nl);
            let comment = b.rx_seq(vec![hash, rest]);
            b.respec(special, comment, None, None);
            let tp = b.token_production(None, TokenProductionKind::Token, false);
            let plus = b.rx_literal("+");
            b.respec(tp, plus, None, None);
        });
        let mut scanner = Scanner::new(&tables, "# note\n  +", &Options::default()).expect("input");
        let plus = scanner.next_token().expect("plus");
        assert_eq!(plus.image, "+");
        assert_eq!((plus.begin_line, plus.begin_column), (2, 3));
        assert_eq!(plus.special_tokens.len(), 1);
        assert_eq!(plus.special_tokens[0].image, "# note");
        assert_eq!(scanner.next_token().expect("eof").kind, 0);
    }

    #[test]
    fn test_more_and_state_switch() {
        let (_, tables) = tables_for(|b| {
            let more = b.token_production(Some(&["DEFAULT"][..]), TokenProductionKind::More, false);
            let open = b.rx_literal("\"");
            b.respec(more, open, None, Some("STRING"));
            let body = b.token_production(Some(&["STRING"][..]), TokenProductionKind::More, false);
            let not_quote = b.rx_chars(true, vec![CharItem::Single('"')]);
            b.respec(body, not_quote, None, None);
            let close = b.token_production(Some(&["STRING"][..]), TokenProductionKind::Token, false);
            let end = b.rx_literal("\"");
            let end = b.label(end, "STRING_LITERAL");
            b.respec(close, end, None, Some("DEFAULT"));
        });
        let mut scanner = Scanner::new(&tables, "\"ab\"", &Options::default()).expect("input");
        let token = scanner.next_token().expect("string");
        assert_eq!(token.image, "\"ab\"");
        assert_eq!(scanner.lexical_state(), "DEFAULT");

        let mut scanner = Scanner::new(&tables, "\"ab", &Options::default()).expect("input");
        assert!(matches!(
            scanner.next_token(),
            Err(GenerateError::LexicalError { .. })
        ));
    }

    #[test]
    fn test_lexical_error_message() {
        let (_, tables) = tables_for(|b| {
            let tp = b.token_production(None, TokenProductionKind::Token, false);
            let plus = b.rx_literal("+");
            b.respec(tp, plus, None, None);
        });
        let err = scan(&tables, "+-+").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Lexical error at line 1, column 2.  Encountered: \"-\" (45), after : \"\""
        );
    }

    #[test]
    fn test_wildcard_matches_single_char() {
        let (_, tables) = tables_for(|b| {
            let tp = b.token_production(None, TokenProductionKind::Token, false);
            let ab = b.rx_literal("ab");
            b.respec(tp, ab, None, None);
            let any = b.rx_any();
            b.respec(tp, any, None, None);
        });
        assert_eq!(
            scan(&tables, "abac").expect("scans"),
            vec![tok(1, "ab"), tok(2, "a"), tok(2, "c"), tok(0, "")]
        );
    }

    #[test]
    fn test_unknown_state_switch() {
        let (_, tables) = tables_for(whitespace);
        let mut scanner = Scanner::new(&tables, "", &Options::default()).expect("input");
        assert!(scanner.switch_to("NOPE").is_err());
        assert_eq!(scanner.next_token().expect("eof").kind, 0);
    }
}
