//! Token manager code generation.
//!
//! Emits, per lexical state, the string literal cascade
//! (`jjMoveStringLiteralDfa<i>_<state>`), the routines that hand a failed
//! literal prefix over to the regex automaton (`jjStopStringLiteralDfa`,
//! `jjStartNfa`, `jjStartNfaWithStates`) and the automaton itself
//! (`jjMoveNfa`), followed by the tables and the `getNextToken` driver.
//!
//! The automaton is emitted over the alphabet partition. Two strategies are
//! available for its transitions:
//! - **Direct-coded** (≤30 DFA states): nested `switch` on state and class
//! - **Table-driven** (>30 states): one flat `states × classes` array

use std::collections::BTreeMap;

use super::{
    lexgen::{LexState, LexerTables},
    literal::bits,
    DEAD_STATE, NO_KIND,
};
use crate::emit::CodeSink;
use crate::grammar::{Grammar, TokenProductionKind};
use crate::options::Options;
use crate::session::GeneratorSession;

/// Threshold: use direct-coded for small DFAs, table-driven for larger ones.
const DIRECT_CODED_THRESHOLD: usize = 30;

/// Emit the complete token manager body for `tables`.
pub fn generate_token_manager(
    grammar: &Grammar,
    session: &GeneratorSession,
    tables: &LexerTables,
    sink: &mut dyn CodeSink,
) {
    let mut gen = LexerGen {
        grammar,
        session,
        tables,
        opts: &session.options,
        out: sink,
    };
    gen.generate();
}

struct LexerGen<'a> {
    grammar: &'a Grammar,
    session: &'a GeneratorSession,
    tables: &'a LexerTables,
    opts: &'a Options,
    out: &'a mut dyn CodeSink,
}

impl<'a> LexerGen<'a> {
    fn generate(&mut self) {
        let tables = self.tables;
        log::debug!("emitting token manager for {} lexical states", tables.states.len());

        self.dump_fields();
        self.dump_literal_images();
        self.dump_state_names();
        self.dump_kind_masks();

        if tables.states.iter().any(|s| s.literals.max_len > 0) {
            self.dump_stop_at_pos();
        }
        for st in &tables.states {
            if st.literals.max_len > 0 && st.has_nfa {
                self.dump_start_with_states(st);
            }
            self.dump_dfa_code(st);
            if st.has_nfa {
                if st.literals.max_len > 0 {
                    self.dump_start_nfa_with_states(st);
                }
                self.dump_move_nfa(st);
            }
        }

        self.dump_fill_token();
        self.dump_get_next_token();
        self.dump_lexical_actions();
        self.dump_switch_to();
    }

    // ══════════════════════════════════════════════════════════════════════
    // Output helpers
    // ══════════════════════════════════════════════════════════════════════

    fn line(&mut self, text: impl AsRef<str>) {
        self.out.gen_code_line(text.as_ref());
    }

    fn text(&mut self, text: impl AsRef<str>) {
        self.out.gen_code(text.as_ref());
    }

    fn cpp(&self) -> bool {
        self.opts.is_cpp()
    }

    fn static_kw(&self) -> &'static str {
        if self.opts.is_static {
            " static"
        } else {
            ""
        }
    }

    fn hex(&self, word: u64) -> String {
        format!("0x{:x}{}", word, self.opts.long_suffix())
    }

    fn stream(&self) -> &'static str {
        if self.cpp() {
            "input_stream->"
        } else {
            "input_stream."
        }
    }

    /// Private routine header followed by the opening brace.
    fn method(&mut self, is_final: bool, return_type: &str, name_and_params: &str) {
        if self.cpp() {
            let class_name = self.opts.token_manager_name();
            self.out.method_def_header(return_type, &class_name, name_and_params);
            self.line("");
        } else {
            let fin = if is_final { " final" } else { "" };
            let header = format!("private{}{} {} {}", self.static_kw(), fin, return_type, name_and_params);
            self.line(header);
        }
        self.line("{");
    }

    /// `curChar = readChar()` guarded against end of input; `on_eof` lines
    /// run when the input is exhausted.
    fn read_char(&mut self, indent: &str, on_eof: &[String]) {
        if self.cpp() {
            self.line(format!("{}if (input_stream->endOfInput()) {{", indent));
            for l in on_eof {
                self.line(format!("{}   {}", indent, l));
            }
            self.line(format!("{}}}", indent));
            self.line(format!("{}curChar = input_stream->readChar();", indent));
        } else {
            self.line(format!("{}try {{ curChar = input_stream.readChar(); }}", indent));
            self.line(format!("{}catch(java.io.IOException e) {{", indent));
            for l in on_eof {
                self.line(format!("{}   {}", indent, l));
            }
            self.line(format!("{}}}", indent));
        }
    }

    fn int_array(&mut self, name: &str, values: &[i64]) {
        if self.cpp() {
            self.text(format!("static const int {}[] = {{", name));
        } else {
            self.text(format!("static final int[] {} = {{", name));
        }
        for (i, v) in values.iter().enumerate() {
            if i % 16 == 0 {
                self.text("\n   ");
            }
            self.text(format!("{}, ", v));
        }
        self.line("\n};");
    }

    fn long_array(&mut self, name: &str, words: &[u64]) {
        if self.cpp() {
            self.text(format!("static const unsigned long long {}[] = {{", name));
        } else {
            self.text(format!("static final long[] {} = {{", name));
        }
        for (i, &w) in words.iter().enumerate() {
            if i % 4 == 0 {
                self.text("\n   ");
            }
            let hex = self.hex(w);
            self.text(format!("{}, ", hex));
        }
        self.line("\n};");
    }

    // ══════════════════════════════════════════════════════════════════════
    // Fields and tables
    // ══════════════════════════════════════════════════════════════════════

    fn has_class(&self, class: TokenProductionKind) -> bool {
        self.tables.kinds.iter().flatten().any(|a| a.class == class)
    }

    fn has_actions(&self) -> bool {
        self.tables.kinds.iter().flatten().any(|a| a.action.is_some())
            || self.session.eof.as_ref().is_some_and(|e| e.action.is_some())
    }

    fn dump_fields(&mut self) {
        let statik = if self.opts.is_static { "static " } else { "" };
        let needs_image = self.has_actions() || self.has_class(TokenProductionKind::More);
        if self.cpp() {
            self.out.switch_to_include();
            self.line("  int curLexState = 0;");
            self.line("  int defaultLexState = 0;");
            self.line("  int jjmatchedPos;");
            self.line("  int jjmatchedKind;");
            self.line("  JJChar curChar;");
            if needs_image {
                self.line("  JJString jjimage;");
                self.line("  JJString image;");
                self.line("  int jjimageLen;");
                self.line("  int lengthOfMatch;");
            }
            self.out.switch_to_main();
        } else {
            self.line(format!("{}int curLexState = 0;", statik));
            self.line(format!("{}int defaultLexState = 0;", statik));
            self.line(format!("{}int jjmatchedPos;", statik));
            self.line(format!("{}int jjmatchedKind;", statik));
            self.line(format!("{}protected char curChar;", statik));
            if needs_image {
                self.line(format!("{}StringBuilder jjimage = new StringBuilder();", statik));
                self.line(format!("{}StringBuilder image = jjimage;", statik));
                self.line(format!("{}int jjimageLen;", statik));
                self.line(format!("{}int lengthOfMatch;", statik));
            }
        }
    }

    fn literal_images(&self) -> Vec<Option<Vec<u16>>> {
        (0..self.session.token_kinds() as u32)
            .map(|kind| {
                self.tables
                    .literal_image(self.grammar, kind)
                    .map(|image| image.encode_utf16().collect())
            })
            .collect()
    }

    fn dump_literal_images(&mut self) {
        let images = self.literal_images();
        if self.cpp() {
            self.out.switch_to_include();
            self.line("");
            self.line("/** Token literal values. */");
            for (kind, image) in images.iter().enumerate() {
                let mut chars: Vec<String> = image
                    .iter()
                    .flatten()
                    .map(|&c| format!("0x{:x}", c))
                    .collect();
                chars.push("0".to_string());
                self.line(format!(
                    "static JJChar jjstrLiteralChars_{}[] = {{{}}};",
                    kind,
                    chars.join(", ")
                ));
            }
            self.line("");
            self.text("static const JJString jjstrLiteralImages[] = {");
            let mut char_cnt = 0;
            for kind in 0..images.len() {
                let entry = format!("jjstrLiteralChars_{}, ", kind);
                char_cnt += entry.len();
                if char_cnt >= 80 {
                    self.line("");
                    char_cnt = 0;
                }
                self.text(entry);
            }
            self.line("};");
            self.out.switch_to_main();
            return;
        }

        self.line("");
        self.line("/** Token literal values. */");
        self.text("public static final String[] jjstrLiteralImages = {");
        let mut char_cnt = 0;
        for image in &images {
            let entry = match image {
                None => "null, ".to_string(),
                Some(units) => {
                    let mut s = String::from("\"");
                    for &c in units {
                        if c <= 0xff {
                            s.push_str(&format!("\\{:o}", c));
                        } else {
                            s.push_str(&format!("\\u{:04x}", c));
                        }
                    }
                    s.push_str("\", ");
                    s
                }
            };
            char_cnt += entry.len();
            if char_cnt >= 80 {
                self.line("");
                char_cnt = 0;
            }
            self.text(entry);
        }
        self.line("};");
    }

    fn dump_state_names(&mut self) {
        let names: Vec<String> = self.tables.states.iter().map(|s| s.name.clone()).collect();
        self.line("");
        self.line("/** Lexer state names. */");
        if self.cpp() {
            for (i, name) in names.iter().enumerate() {
                let mut chars: Vec<String> = name.encode_utf16().map(|c| format!("0x{:x}", c)).collect();
                chars.push("0".to_string());
                self.line(format!("static const JJChar lexStateNames_arr_{}[] = {{{}}};", i, chars.join(", ")));
            }
            self.line("static const JJString lexStateNames[] = {");
            for i in 0..names.len() {
                self.line(format!("   lexStateNames_arr_{}, ", i));
            }
            self.line("};");
        } else {
            self.line("public static final String[] lexStateNames = {");
            for name in &names {
                self.line(format!("   \"{}\",", name));
            }
            self.line("};");
        }

        let has_switch = self.tables.kinds.iter().flatten().any(|a| a.next_state.is_some())
            || self.tables.eof_next_state.is_some();
        if !has_switch {
            return;
        }
        let mut next: Vec<i64> = (0..self.session.token_kinds())
            .map(|k| {
                self.tables.kinds[k]
                    .as_ref()
                    .and_then(|a| a.next_state)
                    .map_or(-1, |s| s as i64)
            })
            .collect();
        if let (Some(first), Some(eof)) = (next.first_mut(), self.tables.eof_next_state) {
            *first = eof as i64;
        }
        self.line("");
        self.line("/** Lex State array. */");
        if self.cpp() {
            self.text("static const int jjnewLexState[] = {");
        } else {
            self.text("public static final int[] jjnewLexState = {");
        }
        for (i, s) in next.iter().enumerate() {
            if i % 25 == 0 {
                self.text("\n   ");
            }
            self.text(format!("{}, ", s));
        }
        self.line("\n};");
    }

    fn kind_mask(&self, class: TokenProductionKind) -> Vec<u64> {
        let kinds = self.session.token_kinds();
        let mut words = vec![0u64; kinds / 64 + 1];
        for kind in 0..kinds {
            let matches = match self.tables.class_of(kind as u32) {
                Some(c) if c == class => true,
                // SPECIAL tokens are skipped as far as the parser is concerned.
                Some(TokenProductionKind::Special) => class == TokenProductionKind::Skip,
                _ => false,
            };
            if matches {
                words[kind / 64] |= 1u64 << (kind % 64);
            }
        }
        words
    }

    fn dump_kind_masks(&mut self) {
        let token = self.kind_mask(TokenProductionKind::Token);
        self.long_array("jjtoToken", &token);
        let skip = self.kind_mask(TokenProductionKind::Skip);
        self.long_array("jjtoSkip", &skip);
        if self.has_class(TokenProductionKind::Special) {
            let special = self.kind_mask(TokenProductionKind::Special);
            self.long_array("jjtoSpecial", &special);
        }
        if self.has_class(TokenProductionKind::More) {
            let more = self.kind_mask(TokenProductionKind::More);
            self.long_array("jjtoMore", &more);
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Literal cascade
    // ══════════════════════════════════════════════════════════════════════

    fn dump_stop_at_pos(&mut self) {
        self.method(false, "int", "jjStopAtPos(int pos, int kind)");
        self.line("   jjmatchedKind = kind;");
        self.line("   jjmatchedPos = pos;");
        self.line("   return pos + 1;");
        self.line("}");
    }

    fn dump_start_nfa_with_states(&mut self, st: &LexState) {
        let n = st.index;
        self.method(false, "int", &format!("jjStartNfaWithStates_{}(int pos, int kind, int state)", n));
        self.line("   jjmatchedKind = kind;");
        self.line("   jjmatchedPos = pos;");
        if self.cpp() {
            self.line("   if (input_stream->endOfInput()) { return pos + 1; }");
            self.line("   curChar = input_stream->readChar();");
        } else {
            self.line("   try { curChar = input_stream.readChar(); }");
            self.line("   catch(java.io.IOException e) { return pos + 1; }");
        }
        self.line(format!("   return jjMoveNfa_{}(state, pos + 1);", n));
        self.line("}");
    }

    /// `activeJ` for words live at `level`, `0L` otherwise.
    fn actives_or_zero(&self, st: &LexState, level: usize, name: &str) -> String {
        (0..st.literals.words)
            .map(|j| {
                if level <= st.literals.max_len_for_active[j] {
                    format!("{}{}", name, j)
                } else {
                    "0L".to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn dump_dfa_code(&mut self, st: &LexState) {
        let lits = &st.literals;
        let n = st.index;
        let long = self.opts.long_type();

        if lits.max_len == 0 {
            self.method(false, "int", &format!("jjMoveStringLiteralDfa0_{}()", n));
            if st.has_nfa {
                self.line(format!("   return jjMoveNfa_{}(0, 0);", n));
            } else {
                self.line("   return 1;");
            }
            self.line("}");
            return;
        }

        let mlfa = &lits.max_len_for_active;
        for i in 0..lits.max_len {
            let params: Vec<String> = match i {
                0 => Vec::new(),
                1 => (0..lits.words)
                    .filter(|&j| i <= mlfa[j])
                    .map(|j| format!("{} active{}", long, j))
                    .collect(),
                _ => (0..lits.words)
                    .filter(|&j| i <= mlfa[j] + 1)
                    .map(|j| format!("{} old{}, {} active{}", long, j, long, j))
                    .collect(),
            };
            self.method(false, "int", &format!("jjMoveStringLiteralDfa{}_{}({})", i, n, params.join(", ")));

            if i > 1 {
                let checks: Vec<String> = (0..lits.words)
                    .filter(|&j| i <= mlfa[j] + 1)
                    .map(|j| format!("(active{} &= old{})", j, j))
                    .collect();
                self.line(format!("   if (({}) == 0L)", checks.join(" | ")));
                if st.has_nfa && !st.mixed {
                    let olds: Vec<String> = (0..lits.words)
                        .map(|j| if i <= mlfa[j] + 1 { format!("old{}", j) } else { "0L".to_string() })
                        .collect();
                    self.line(format!("      return jjStartNfa_{}({}, {});", n, i - 2, olds.join(", ")));
                } else {
                    self.line(format!("      return {};", i));
                }
            }

            if i != 0 {
                let mut on_eof = Vec::new();
                if st.has_nfa && !st.mixed {
                    on_eof.push(format!(
                        "jjStopStringLiteralDfa_{}({}, {});",
                        n,
                        i - 1,
                        self.actives_or_zero(st, i, "active")
                    ));
                }
                on_eof.push(format!("return {};", i));
                self.read_char("   ", &on_eof);
            }

            self.line("   switch(curChar)");
            self.line("   {");
            let mut start_nfa_needed = false;
            for (&key, info) in &lits.char_pos_kind[i] {
                if i == 0 && st.skip_keys.contains(&key) {
                    continue;
                }
                for label in lits.case_labels(key) {
                    self.line(format!("      case {}:", label));
                }

                let prefix = if i == 0 { "         " } else { "            " };
                let mut if_generated = false;
                for kind in bits(&info.final_kinds) {
                    if i == 0 && if_generated {
                        break;
                    }
                    if i != 0 {
                        let word = (kind / 64) as usize;
                        let test = format!("((active{} & {}) != 0L)", word, self.hex(1u64 << (kind % 64)));
                        let head = if if_generated { "         else if " } else { "         if " };
                        self.line(format!("{}{}", head, test));
                    }
                    if_generated = true;

                    let printed = lits.kind_to_print(i, kind, st.can_match_any_char);
                    if !lits.is_sub_string(kind) {
                        match lits.state_for_kind(i, kind) {
                            Some(state) => self.line(format!(
                                "{}return jjStartNfaWithStates_{}({}, {}, {});",
                                prefix, n, i, printed, state
                            )),
                            None => self.line(format!("{}return jjStopAtPos({}, {});", prefix, i, printed)),
                        }
                    } else if st.init_match.is_some() || i != 0 {
                        self.line("         {");
                        self.line(format!("{}jjmatchedKind = {};", prefix, printed));
                        self.line(format!("{}jjmatchedPos = {};", prefix, i));
                        self.line("         }");
                    } else {
                        self.line(format!("{}jjmatchedKind = {};", prefix, printed));
                    }
                }

                if info.valid_count > 0 {
                    let args: Vec<String> = if i == 0 {
                        (0..lits.words)
                            .filter(|&j| 1 <= mlfa[j])
                            .map(|j| self.hex(info.valid_kinds[j]))
                            .collect()
                    } else {
                        (0..lits.words)
                            .filter(|&j| i <= mlfa[j])
                            .map(|j| {
                                let valid = info.valid_kinds[j];
                                let word = if valid != 0 { self.hex(valid) } else { "0L".to_string() };
                                format!("active{}, {}", j, word)
                            })
                            .collect()
                    };
                    self.line(format!(
                        "         return jjMoveStringLiteralDfa{}_{}({});",
                        i + 1,
                        n,
                        args.join(", ")
                    ));
                } else if i == 0 {
                    if st.has_nfa {
                        self.line(format!("         return jjMoveNfa_{}(0, 0);", n));
                    } else {
                        self.line("         return 1;");
                    }
                } else {
                    self.line("         break;");
                    start_nfa_needed = true;
                }
            }

            self.line("      default :");
            if st.has_nfa {
                if i == 0 {
                    self.line(format!("         return jjMoveNfa_{}(0, 0);", n));
                } else {
                    self.line("         break;");
                    start_nfa_needed = true;
                }
            } else {
                self.line(format!("         return {};", i + 1));
            }
            self.line("   }");

            if i != 0 && start_nfa_needed {
                if st.has_nfa {
                    self.line(format!(
                        "   return jjStartNfa_{}({}, {});",
                        n,
                        i - 1,
                        self.actives_or_zero(st, i, "active")
                    ));
                } else {
                    self.line(format!("   return {};", i + 1));
                }
            }
            self.line("}");
        }
    }

    fn dump_start_with_states(&mut self, st: &LexState) {
        let lits = &st.literals;
        let n = st.index;
        let long = self.opts.long_type();
        let params: Vec<String> = (0..lits.words).map(|j| format!("{} active{}", long, j)).collect();
        let params = params.join(", ");

        self.method(true, "int", &format!("jjStopStringLiteralDfa_{}(int pos, {})", n, params));
        self.line("   switch (pos)");
        self.line("   {");
        for i in 0..lits.max_len.saturating_sub(1) {
            let Some(entries) = lits.states_for_pos.get(i) else { continue };
            if entries.is_empty() {
                continue;
            }
            self.line(format!("      case {}:", i));
            for (&(kind, matched_pos, state), actives) in entries {
                let tests: Vec<String> = actives
                    .iter()
                    .enumerate()
                    .filter(|(_, &w)| w != 0)
                    .map(|(j, &w)| format!("(active{} & {}) != 0L", j, self.hex(w)))
                    .collect();
                self.line(format!("         if ({})", tests.join(" || ")));
                if kind != NO_KIND {
                    self.line("         {");
                    if i == 0 {
                        self.line(format!("            jjmatchedKind = {};", kind));
                        if st.init_match.is_some() {
                            self.line("            jjmatchedPos = 0;");
                        }
                    } else if i == matched_pos {
                        if lits.sub_string_at_pos[i] {
                            self.line(format!("            if (jjmatchedPos != {})", i));
                            self.line("            {");
                            self.line(format!("               jjmatchedKind = {};", kind));
                            self.line(format!("               jjmatchedPos = {};", i));
                            self.line("            }");
                        } else {
                            self.line(format!("            jjmatchedKind = {};", kind));
                            self.line(format!("            jjmatchedPos = {};", i));
                        }
                    } else {
                        if matched_pos > 0 {
                            self.line(format!("            if (jjmatchedPos < {})", matched_pos));
                        } else {
                            self.line("            if (jjmatchedPos == 0)");
                        }
                        self.line("            {");
                        self.line(format!("               jjmatchedKind = {};", kind));
                        self.line(format!("               jjmatchedPos = {};", matched_pos));
                        self.line("            }");
                    }
                }
                if state == DEAD_STATE {
                    self.line("            return -1;");
                } else {
                    self.line(format!("            return {};", state));
                }
                if kind != NO_KIND {
                    self.line("         }");
                }
            }
            self.line("         return -1;");
        }
        self.line("      default :");
        self.line("         return -1;");
        self.line("   }");
        self.line("}");

        self.method(true, "int", &format!("jjStartNfa_{}(int pos, {})", n, params));
        if st.mixed {
            self.line(format!("   return jjMoveNfa_{}(0, pos + 1);", n));
        } else {
            let args: Vec<String> = (0..lits.words).map(|j| format!("active{}", j)).collect();
            self.line(format!(
                "   return jjMoveNfa_{}(jjStopStringLiteralDfa_{}(pos, {}), pos + 1);",
                n,
                n,
                args.join(", ")
            ));
        }
        self.line("}");
    }

    // ══════════════════════════════════════════════════════════════════════
    // Regex automaton
    // ══════════════════════════════════════════════════════════════════════

    fn dump_move_nfa(&mut self, st: &LexState) {
        let n = st.index;
        let dfa = &st.dfa;
        let partition = &st.partition;

        let intervals = partition.intervals();
        let starts: Vec<i64> = intervals.iter().map(|&(lo, _, _)| lo as i64).collect();
        let classes: Vec<i64> = intervals.iter().map(|&(_, _, c)| c as i64).collect();
        let accepts: Vec<i64> = dfa
            .states
            .iter()
            .map(|s| s.accept.map_or(NO_KIND as i64, |k| k as i64))
            .collect();
        self.int_array(&format!("jjClassStart_{}", n), &starts);
        self.int_array(&format!("jjClassOf_{}", n), &classes);
        self.int_array(&format!("jjAccept_{}", n), &accepts);

        let direct = dfa.states.len() <= DIRECT_CODED_THRESHOLD;
        if !direct {
            let next: Vec<i64> = dfa
                .states
                .iter()
                .flat_map(|s| s.transitions.iter())
                .map(|&t| if t == DEAD_STATE { -1 } else { t as i64 })
                .collect();
            self.int_array(&format!("jjNextState_{}", n), &next);
        }

        // Class lookup: binary search over interval starts.
        if self.cpp() {
            self.line(format!("static int jjCharClass_{}(int c)", n));
        } else {
            self.line(format!("private static int jjCharClass_{}(int c)", n));
        }
        self.line("{");
        self.line("   int lo = 0;");
        if self.cpp() {
            self.line(format!("   int hi = {};", starts.len().saturating_sub(1)));
        } else {
            self.line(format!("   int hi = jjClassStart_{}.length - 1;", n));
        }
        self.line("   while (lo < hi)");
        self.line("   {");
        if self.cpp() {
            self.line("      int mid = (lo + hi + 1) / 2;");
        } else {
            self.line("      int mid = (lo + hi + 1) >>> 1;");
        }
        self.line(format!("      if (jjClassStart_{}[mid] <= c)", n));
        self.line("         lo = mid;");
        self.line("      else");
        self.line("         hi = mid - 1;");
        self.line("   }");
        self.line(format!("   return jjClassOf_{}[lo];", n));
        self.line("}");

        self.method(false, "int", &format!("jjMoveNfa_{}(int startState, int curPos)", n));
        self.line("   if (startState < 0)");
        self.line("      return curPos + 1;");
        self.line("   int state = startState;");
        self.line("   for (;;)");
        self.line("   {");
        self.line(format!("      int cls = jjCharClass_{}(curChar);", n));
        if direct {
            self.dump_direct_transitions(st);
        } else {
            self.line(format!("      state = jjNextState_{}[state * {} + cls];", n, dfa.num_classes));
        }
        self.line(format!("      if (state >= 0 && jjAccept_{}[state] != {})", n, NO_KIND));
        self.line("      {");
        self.line(format!("         jjmatchedKind = jjAccept_{}[state];", n));
        self.line("         jjmatchedPos = curPos;");
        self.line("      }");
        self.line("      ++curPos;");
        self.line("      if (state < 0)");
        self.line("         return curPos;");
        if self.cpp() {
            self.line("      if (input_stream->endOfInput()) { return curPos; }");
            self.line("      curChar = input_stream->readChar();");
        } else {
            self.line("      try { curChar = input_stream.readChar(); }");
            self.line("      catch(java.io.IOException e) { return curPos; }");
        }
        self.line("   }");
        self.line("}");
    }

    fn dump_direct_transitions(&mut self, st: &LexState) {
        self.line("      switch (state)");
        self.line("      {");
        for (id, state) in st.dfa.states.iter().enumerate() {
            let mut by_target: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
            for (class, &target) in state.transitions.iter().enumerate() {
                if target != DEAD_STATE {
                    by_target.entry(target).or_default().push(class);
                }
            }
            if by_target.is_empty() {
                continue;
            }
            self.line(format!("         case {}:", id));
            self.line("            switch (cls)");
            self.line("            {");
            for (target, classes) in by_target {
                let labels: Vec<String> = classes.iter().map(|c| format!("case {}:", c)).collect();
                self.line(format!("               {}", labels.join(" ")));
                self.line(format!("                  state = {};", target));
                self.line("                  break;");
            }
            self.line("               default:");
            self.line("                  state = -1;");
            self.line("                  break;");
            self.line("            }");
            self.line("            break;");
        }
        self.line("         default:");
        self.line("            state = -1;");
        self.line("            break;");
        self.line("      }");
    }

    // ══════════════════════════════════════════════════════════════════════
    // Driver
    // ══════════════════════════════════════════════════════════════════════

    fn dump_fill_token(&mut self) {
        let s = self.stream();
        if self.cpp() {
            let class_name = self.opts.token_manager_name();
            self.out.method_def_header("Token *", &class_name, "jjFillToken()");
            self.line("");
            self.line("{");
            self.line("   Token *t;");
            self.line("   JJString curTokenImage;");
            self.line("   JJString im = jjstrLiteralImages[jjmatchedKind];");
            self.line(format!("   curTokenImage = (im.length() == 0) ? {}GetImage() : im;", s));
            self.line("   t = Token::newToken(jjmatchedKind, curTokenImage);");
            self.line("   t->specialToken = nullptr;");
            self.line("   t->next = nullptr;");
        } else {
            let statik = if self.opts.is_static { "static " } else { "" };
            self.line(format!("protected {}Token jjFillToken()", statik));
            self.line("{");
            self.line("   final Token t;");
            self.line("   final String curTokenImage;");
            self.line("   String im = jjstrLiteralImages[jjmatchedKind];");
            self.line(format!("   curTokenImage = (im == null) ? {}GetImage() : im;", s));
            self.line("   t = Token.newToken(jjmatchedKind, curTokenImage);");
        }
        let arrow = if self.cpp() { "->" } else { "." };
        for field in ["beginLine", "endLine", "beginColumn", "endColumn"] {
            let getter = format!("get{}{}", field[..1].to_uppercase(), &field[1..]);
            self.line(format!("   t{}{} = {}{}();", arrow, field, s, getter));
        }
        self.line("   return t;");
        self.line("}");
    }

    fn skip_condition(&self, st: &LexState) -> Option<String> {
        let mut low = 0u64;
        let mut high = 0u64;
        for &c in st.skip_chars.keys() {
            match c {
                0..=63 => low |= 1u64 << c,
                64..=127 => high |= 1u64 << (c - 64),
                _ => {}
            }
        }
        let one = if self.cpp() { "1ULL" } else { "1L" };
        let mut parts = Vec::new();
        if low != 0 {
            parts.push(format!("curChar <= 63 && ({} & ({} << curChar)) != 0L", self.hex(low), one));
        }
        if high != 0 {
            parts.push(format!(
                "curChar > 63 && curChar < 128 && ({} & ({} << (curChar & 077))) != 0L",
                self.hex(high),
                one
            ));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" || "))
        }
    }

    fn mask_test(&self, table: &str) -> String {
        let one = if self.cpp() { "1ULL" } else { "1L" };
        format!("({}[jjmatchedKind >> 6] & ({} << (jjmatchedKind & 077))) != 0L", table, one)
    }

    fn dump_state_match(&mut self, st: &LexState, indent: &str) {
        let cpp = self.cpp();
        let n = st.index;
        if let Some(cond) = self.skip_condition(st) {
            if cpp {
                self.line(format!("{}input_stream->backup(0);", indent));
                self.line(format!("{}while ({})", indent, cond));
                self.line(format!("{}{{", indent));
                self.line(format!("{}   if (input_stream->endOfInput()) goto EOFLoop;", indent));
                self.line(format!("{}   curChar = input_stream->BeginToken();", indent));
                self.line(format!("{}}}", indent));
            } else {
                self.line(format!("{}try {{ input_stream.backup(0);", indent));
                self.line(format!("{}   while ({})", indent, cond));
                self.line(format!("{}      curChar = input_stream.BeginToken();", indent));
                self.line(format!("{}}}", indent));
                self.line(format!("{}catch (java.io.IOException e1) {{ continue EOFLoop; }}", indent));
            }
        }
        match st.init_match {
            Some(kind) => {
                self.line(format!("{}jjmatchedKind = {};", indent, kind));
                self.line(format!("{}jjmatchedPos = -1;", indent));
                self.line(format!("{}curPos = 0;", indent));
            }
            None => {
                self.line(format!("{}jjmatchedKind = {};", indent, NO_KIND));
                self.line(format!("{}jjmatchedPos = 0;", indent));
            }
        }
        self.line(format!("{}curPos = jjMoveStringLiteralDfa0_{}();", indent, n));
        if let Some(any) = st.can_match_any_char {
            if st.init_match.is_some() {
                self.line(format!(
                    "{}if (jjmatchedPos < 0 || (jjmatchedPos == 0 && jjmatchedKind > {}))",
                    indent, any
                ));
            } else {
                self.line(format!("{}if (jjmatchedPos == 0 && jjmatchedKind > {})", indent, any));
            }
            self.line(format!("{}{{", indent));
            self.line(format!("{}   jjmatchedKind = {};", indent, any));
            if st.init_match.is_some() {
                self.line(format!("{}   jjmatchedPos = 0;", indent));
            }
            self.line(format!("{}}}", indent));
        }
    }

    fn dump_get_next_token(&mut self) {
        let tables = self.tables;
        let cpp = self.cpp();
        let s = self.stream();
        let arrow = if cpp { "->" } else { "." };
        let null = if cpp { "nullptr" } else { "null" };
        let has_special = self.has_class(TokenProductionKind::Special);
        let has_more = self.has_class(TokenProductionKind::More);
        let has_skip = self.has_class(TokenProductionKind::Skip) || has_special;
        let has_actions = self.has_actions();
        let kind_has_action = |class: TokenProductionKind| {
            tables.kinds.iter().flatten().any(|a| a.class == class && a.action.is_some())
        };
        let token_actions = kind_has_action(TokenProductionKind::Token)
            || self.session.eof.as_ref().is_some_and(|e| e.action.is_some());
        let skip_actions = kind_has_action(TokenProductionKind::Skip) || kind_has_action(TokenProductionKind::Special);
        let more_actions = kind_has_action(TokenProductionKind::More);
        let has_switch = tables.kinds.iter().flatten().any(|a| a.next_state.is_some());

        self.line("");
        if cpp {
            let class_name = self.opts.token_manager_name();
            self.out.method_def_header("Token *", &class_name, "getNextToken()");
            self.line("");
            self.line("{");
            if has_special {
                self.line("  Token *specialToken = nullptr;");
            }
            self.line("  Token *matchedToken = nullptr;");
        } else {
            let statik = if self.opts.is_static { "static " } else { "" };
            self.line("/** Get the next Token. */");
            self.line(format!("public {}Token getNextToken()", statik));
            self.line("{");
            if has_special {
                self.line("  Token specialToken = null;");
            }
            self.line("  Token matchedToken;");
        }
        self.line("  int curPos = 0;");
        self.line("");
        self.line("  EOFLoop :");
        self.line("  for (;;)");
        self.line("  {");

        // End of input.
        let eof_lines = {
            let mut lines = vec![
                "jjmatchedKind = 0;".to_string(),
                "jjmatchedPos = -1;".to_string(),
                "matchedToken = jjFillToken();".to_string(),
            ];
            if has_special {
                lines.push(format!("matchedToken{}specialToken = specialToken;", arrow));
            }
            if self.session.eof.as_ref().is_some_and(|e| e.action.is_some()) {
                lines.push("TokenLexicalActions(matchedToken);".to_string());
            }
            if let Some(state) = tables.eof_next_state {
                lines.push(format!("curLexState = {};", state));
            }
            lines.push("return matchedToken;".to_string());
            lines
        };
        if cpp {
            self.line("   if (input_stream->endOfInput())");
            self.line("   {");
            for l in &eof_lines {
                self.line(format!("      {}", l));
            }
            self.line("   }");
            self.line("   curChar = input_stream->BeginToken();");
        } else {
            self.line("   try");
            self.line("   {");
            self.line("      curChar = input_stream.BeginToken();");
            self.line("   }");
            self.line("   catch(Exception e)");
            self.line("   {");
            for l in &eof_lines {
                self.line(format!("      {}", l));
            }
            self.line("   }");
        }
        if has_more || has_actions {
            if cpp {
                self.line("   image = jjimage;");
                self.line("   image.clear();");
            } else {
                self.line("   image = jjimage;");
                self.line("   image.setLength(0);");
            }
            self.line("   jjimageLen = 0;");
        }
        if has_more {
            self.line("");
            self.line("   for (;;)");
            self.line("   {");
        }

        if tables.states.len() > 1 {
            self.line("   switch(curLexState)");
            self.line("   {");
            for st in &tables.states {
                self.line(format!("     case {}:", st.index));
                self.dump_state_match(st, "       ");
                self.line("       break;");
            }
            self.line("   }");
        } else if let Some(st) = tables.states.first() {
            self.dump_state_match(st, "   ");
        }

        self.line(format!("     if (jjmatchedKind != {})", NO_KIND));
        self.line("     {");
        self.line("        if (jjmatchedPos + 1 < curPos)");
        self.line(format!("           {}backup(curPos - jjmatchedPos - 1);", s));
        if self.opts.debug_token_manager && !cpp {
            self.line("        debugStream.println(\"****** FOUND A \" + tokenImage[jjmatchedKind] + \" MATCH (\" + TokenMgrError.addEscapes(new String(input_stream.GetSuffix(jjmatchedPos + 1))) + \") ******\\n\");");
        }
        let new_state = "if (jjnewLexState[jjmatchedKind] != -1) curLexState = jjnewLexState[jjmatchedKind];";

        self.line(format!("        if ({})", self.mask_test("jjtoToken")));
        self.line("        {");
        self.line("           matchedToken = jjFillToken();");
        if has_special {
            self.line(format!("           matchedToken{}specialToken = specialToken;", arrow));
        }
        if token_actions {
            self.line("           TokenLexicalActions(matchedToken);");
        }
        if has_switch {
            self.line(format!("           {}", new_state));
        }
        self.line("           return matchedToken;");
        self.line("        }");

        let continue_eof = if cpp { "goto EOFLoop;" } else { "continue EOFLoop;" };
        if has_skip {
            self.line(format!("        else if ({})", self.mask_test("jjtoSkip")));
            self.line("        {");
            if has_special {
                self.line(format!("           if ({})", self.mask_test("jjtoSpecial")));
                self.line("           {");
                self.line("              matchedToken = jjFillToken();");
                self.line(format!("              if (specialToken == {})", null));
                self.line("                 specialToken = matchedToken;");
                self.line("              else");
                self.line("              {");
                self.line(format!("                 matchedToken{}specialToken = specialToken;", arrow));
                self.line(format!("                 specialToken = (specialToken{}next = matchedToken);", arrow));
                self.line("              }");
                if skip_actions {
                    self.line("              SkipLexicalActions(matchedToken);");
                }
                self.line("           }");
                if skip_actions {
                    self.line("           else");
                    self.line(format!("              SkipLexicalActions({});", null));
                }
            } else if skip_actions {
                self.line(format!("           SkipLexicalActions({});", null));
            }
            if has_switch {
                self.line(format!("           {}", new_state));
            }
            self.line(format!("           {}", continue_eof));
            self.line("        }");
        }
        if has_more {
            if more_actions {
                self.line("        MoreLexicalActions();");
            } else if skip_actions || token_actions {
                self.line("        jjimageLen += jjmatchedPos + 1;");
            }
            if has_switch {
                self.line(format!("        {}", new_state));
            }
            self.line("        curPos = 0;");
            self.line(format!("        jjmatchedKind = {};", NO_KIND));
            if cpp {
                self.line("        if (!input_stream->endOfInput()) {");
                self.line("           curChar = input_stream->readChar();");
                self.line("           continue;");
                self.line("        }");
            } else {
                self.line("        try {");
                self.line("           curChar = input_stream.readChar();");
                self.line("           continue;");
                self.line("        }");
                self.line("        catch (java.io.IOException e1) { }");
            }
        }
        self.line("     }");

        // Lexical error.
        self.line(format!("     int error_line = {}getEndLine();", s));
        self.line(format!("     int error_column = {}getEndColumn();", s));
        if cpp {
            self.line("     JJString error_after;");
            self.line("     bool EOFSeen = false;");
            self.line("     if (input_stream->endOfInput()) {");
        } else {
            self.line("     String error_after = null;");
            self.line("     boolean EOFSeen = false;");
            self.line("     try { input_stream.readChar(); input_stream.backup(1); }");
            self.line("     catch (java.io.IOException e1) {");
        }
        self.line("        EOFSeen = true;");
        self.line(format!("        error_after = curPos <= 1 ? {} : {}GetImage();", if cpp { "JJString()" } else { "\"\"" }, s));
        self.line("        if (curChar == '\\n' || curChar == '\\r') {");
        self.line("           error_line++;");
        self.line("           error_column = 0;");
        self.line("        }");
        self.line("        else");
        self.line("           error_column++;");
        self.line("     }");
        self.line("     if (!EOFSeen) {");
        self.line(format!("        {}backup(1);", s));
        self.line(format!("        error_after = curPos <= 1 ? {} : {}GetImage();", if cpp { "JJString()" } else { "\"\"" }, s));
        self.line("     }");
        if cpp {
            self.line("     errorHandler->lexicalError(EOFSeen, curLexState, error_line, error_column, error_after, curChar, this);");
            if has_more {
                self.line("     return nullptr;");
            }
        } else {
            self.line("     throw new TokenMgrError(EOFSeen, curLexState, error_line, error_column, error_after, curChar, TokenMgrError.LEXICAL_ERROR);");
        }
        if has_more {
            self.line("   }");
        }
        self.line("  }");
        if cpp && !has_more {
            self.line("  return nullptr;");
        }
        self.line("}");
    }

    fn dump_lexical_actions(&mut self) {
        let tables = self.tables;
        let session = self.session;
        let s = self.stream();
        let null_kind_param = if self.cpp() { "Token *matchedToken" } else { "Token matchedToken" };

        for (class, name) in [
            (TokenProductionKind::Skip, "SkipLexicalActions"),
            (TokenProductionKind::More, "MoreLexicalActions"),
            (TokenProductionKind::Token, "TokenLexicalActions"),
        ] {
            let mut cases: Vec<(u32, &str)> = tables
                .kinds
                .iter()
                .enumerate()
                .filter_map(|(kind, attrs)| {
                    let attrs = attrs.as_ref()?;
                    let same = attrs.class == class
                        || (class == TokenProductionKind::Skip && attrs.class == TokenProductionKind::Special);
                    let action = attrs.action.as_deref()?;
                    same.then_some((kind as u32, action))
                })
                .collect();
            if class == TokenProductionKind::Token {
                if let Some(action) = session.eof.as_ref().and_then(|e| e.action.as_deref()) {
                    cases.insert(0, (0, action));
                }
            }
            if cases.is_empty() {
                continue;
            }

            let params = if class == TokenProductionKind::More { "" } else { null_kind_param };
            self.line("");
            if self.cpp() {
                let class_name = self.opts.token_manager_name();
                self.out.method_def_header("void", &class_name, &format!("{}({})", name, params));
                self.line("");
            } else {
                let statik = if self.opts.is_static { "static " } else { "" };
                self.line(format!("{}void {}({})", statik, name, params));
            }
            self.line("{");
            if class == TokenProductionKind::More {
                self.line("   jjimageLen += (lengthOfMatch = jjmatchedPos + 1);");
            }
            self.line("   switch(jjmatchedKind)");
            self.line("   {");
            for (kind, action) in cases {
                self.line(format!("      case {} :", kind));
                match class {
                    TokenProductionKind::More => {
                        self.line(format!("         image.append({}GetSuffix(jjimageLen));", s));
                        self.line("         jjimageLen = 0;");
                    }
                    _ if kind != 0 => {
                        self.line(format!(
                            "         image.append({}GetSuffix(jjimageLen + (lengthOfMatch = jjmatchedPos + 1)));",
                            s
                        ));
                    }
                    _ => {}
                }
                for action_line in action.lines() {
                    self.line(format!("         {}", action_line.trim_end()));
                }
                self.line("         break;");
            }
            self.line("      default :");
            self.line("         break;");
            self.line("   }");
            self.line("}");
        }
    }

    fn dump_switch_to(&mut self) {
        let count = self.tables.states.len();
        self.line("");
        if self.cpp() {
            let class_name = self.opts.token_manager_name();
            self.out.method_def_header("void", &class_name, "SwitchTo(int lexState)");
            self.line("");
            self.line("{");
            self.line(format!("  if (lexState >= {} || lexState < 0) {{", count));
            self.line("    JJString message;");
            self.line("    message += JJWIDE(Error: Ignoring invalid lexical state : );");
            self.line("    message += lexState; message += JJWIDE(. State unchanged.);");
            self.line("    errorHandler->lexicalError(message, this);");
            self.line("  }");
            self.line("  else");
            self.line("    curLexState = lexState;");
            self.line("}");
        } else {
            let statik = if self.opts.is_static { "static " } else { "" };
            self.line("/** Switch to specified lex state. */");
            self.line(format!("public {}void SwitchTo(int lexState)", statik));
            self.line("{");
            self.line(format!("  if (lexState >= {} || lexState < 0)", count));
            self.line("    throw new TokenMgrError(\"Error: Ignoring invalid lexical state : \" + lexState + \". State unchanged.\", TokenMgrError.INVALID_LEXICAL_STATE);");
            self.line("  else");
            self.line("    curLexState = lexState;");
            self.line("}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::lexgen::build_lexer;
    use crate::emit::BufferSink;
    use crate::grammar::GrammarBuilder;
    use crate::options::OutputLanguage;
    use crate::semantic::semanticize;

    fn emit(options: Options, build: impl FnOnce(&mut GrammarBuilder)) -> BufferSink {
        let mut b = GrammarBuilder::new();
        build(&mut b);
        let mut grammar = b.finish();
        let mut session = GeneratorSession::new(options);
        semanticize(&mut grammar, &mut session).expect("grammar is valid");
        let tables = build_lexer(&grammar, &mut session).expect("lexer builds");
        let mut sink = BufferSink::new();
        generate_token_manager(&grammar, &session, &tables, &mut sink);
        sink
    }

    fn equals_tokens(b: &mut GrammarBuilder) {
        let tp = b.token_production(None, TokenProductionKind::Token, false);
        let eq = b.rx_literal("=");
        b.respec(tp, eq, None, None);
        let eqeq = b.rx_literal("==");
        b.respec(tp, eqeq, None, None);
    }

    #[test]
    fn test_literal_cascade_java() {
        let sink = emit(Options::default(), equals_tokens);
        let main = &sink.main;
        let expected_level0 = "\
private int jjMoveStringLiteralDfa0_0()
{
   switch(curChar)
   {
      case 61:
         jjmatchedKind = 1;
         return jjMoveStringLiteralDfa1_0(0x4L);
      default :
         return 1;
   }
}
";
        assert!(main.contains(expected_level0), "{}", main);
        assert!(main.contains("private int jjMoveStringLiteralDfa1_0(long active0)"));
        assert!(main.contains("         if ((active0 & 0x4L) != 0L)\n            return jjStopAtPos(1, 2);"));
        assert!(main.contains("   return 2;\n}"));
        // No regex kinds: no automaton routines.
        assert!(!main.contains("jjMoveNfa_0"));
        assert!(main.contains("public static final String[] jjstrLiteralImages = {\"\", \"\\75\", \"\\75\\75\", };"));
    }

    #[test]
    fn test_start_states_and_nfa_java() {
        let sink = emit(Options::default(), |b| {
            let tp = b.token_production(None, TokenProductionKind::Token, false);
            let kw = b.rx_literal("in");
            b.respec(tp, kw, None, None);
            let letters = b.rx_range('a', 'z');
            let ident = b.rx_plus(letters);
            let ident = b.label(ident, "ID");
            b.respec(tp, ident, None, None);
        });
        let main = &sink.main;
        assert!(main.contains("private final int jjStopStringLiteralDfa_0(int pos, long active0)"));
        assert!(main.contains("         if ((active0 & 0x2L) != 0L)\n         {\n            jjmatchedKind = 2;"));
        assert!(main.contains("   return jjMoveNfa_0(jjStopStringLiteralDfa_0(pos, active0), pos + 1);"));
        assert!(main.contains("return jjStartNfaWithStates_0(1, 1, "));
        assert!(main.contains("private int jjMoveNfa_0(int startState, int curPos)"));
        assert!(main.contains("private static int jjCharClass_0(int c)"));
        assert!(main.contains("      switch (state)"));
        assert!(main.contains("   return jjStartNfa_0(0, active0);"));
    }

    #[test]
    fn test_skip_mask_and_driver() {
        let sink = emit(Options::default(), |b| {
            let skip = b.token_production(None, TokenProductionKind::Skip, false);
            for ws in [" ", "\t"] {
                let lit = b.rx_literal(ws);
                b.respec(skip, lit, None, None);
            }
            let tp = b.token_production(None, TokenProductionKind::Token, false);
            let plus = b.rx_literal("+");
            b.respec(tp, plus, None, None);
        });
        let main = &sink.main;
        assert!(main.contains("while (curChar <= 63 && (0x100000200L & (1L << curChar)) != 0L)"));
        assert!(main.contains("public Token getNextToken()"));
        assert!(main.contains("static final long[] jjtoToken = {\n   0x9L, \n};"));
        assert!(main.contains("static final long[] jjtoSkip = {\n   0x6L, \n};"));
        assert!(main.contains("continue EOFLoop;"));
        // Skip characters never reach the cascade.
        assert!(!main.contains("      case 32:"));
    }

    #[test]
    fn test_cpp_headers_go_to_include() {
        let options = Options {
            output_language: OutputLanguage::Cpp,
            ..Options::default()
        };
        let sink = emit(options, equals_tokens);
        assert!(sink.include.contains("  int jjMoveStringLiteralDfa1_0(unsigned long long active0);"));
        assert!(sink.include.contains("static JJChar jjstrLiteralChars_2[] = {0x3d, 0x3d, 0};"));
        assert!(sink.main.contains("int ParserTokenManager::jjMoveStringLiteralDfa0_0()"));
        assert!(sink.main.contains("   if (input_stream->endOfInput()) {"));
        assert!(sink.main.contains("if ((active0 & 0x4ULL) != 0L)"));
    }

    #[test]
    fn test_table_driven_for_large_automata() {
        let sink = emit(Options::default(), |b| {
            let tp = b.token_production(None, TokenProductionKind::Token, false);
            // A 40 character fixed pattern built from single-character lists
            // gives more states than the direct-coded threshold.
            let units: Vec<_> = (0..40).map(|i| b.rx_range('a', (b'a' + (i % 26) as u8) as char)).collect();
            let long = b.rx_seq(units);
            b.respec(tp, long, None, None);
        });
        assert!(sink.main.contains("static final int[] jjNextState_0 = {"));
        assert!(!sink.main.contains("      switch (state)"));
    }
}
