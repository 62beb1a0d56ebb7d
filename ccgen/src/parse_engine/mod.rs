//! Parser code generation.
//!
//! Every BNF production becomes a recursive-descent method (phase 1). At
//! each choice point and repetition the engine picks one of three decision
//! strategies per alternative:
//!
//! 1. **Trivial**: lookahead 0, an alternative that can match nothing, or one
//!    that runs straight into a code production. Only a semantic guard, if
//!    any, is tested.
//! 2. **Switch**: lookahead 1 with no semantic guard. One `case` per token
//!    in the alternative's first set; the first alternative to claim a
//!    token keeps it.
//! 3. **Speculative**: anything else. A `jj_2_N(amount)` call (phase 2)
//!    scans ahead through `jj_3...` routines (phase 3) whose bodies are cut
//!    off once the token budget is used up.
//!
//! Phase 1 text is assembled as [`Fragment`]s so nested constructs can be
//! built inside out and indented when written.

mod first;
mod phase1;
mod phase3;

use crate::emit::{add_unicode_escapes, CodeSink};
use crate::error::GenerateError;
use crate::grammar::{
    CodeLanguage, ExpId, Expansion, Grammar, NormalProduction, Parent, ProductionKind, RexpId,
    INFINITE_LOOKAHEAD,
};
use crate::options::Options;
use crate::session::{GeneratorSession, PhaseTables};

/// Size reported for expansions without a finite minimum.
pub const INFINITE_SIZE: u32 = u32::MAX;

// ══════════════════════════════════════════════════════════════════════════════
// Fragments
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Newline,
    Indent,
    Dedent,
    /// Newlines until the matching `RawEnd` are not indented.
    RawStart,
    RawEnd,
}

/// Generated text with deferred indentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pieces: Vec<Piece>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text`; line breaks in it become indentation points.
    pub fn push(&mut self, text: &str) -> &mut Self {
        let mut rest = text;
        while let Some(at) = rest.find(['\n', '\r']) {
            if at > 0 {
                self.pieces.push(Piece::Text(rest[..at].to_string()));
            }
            self.pieces.push(Piece::Newline);
            let skip = if rest[at..].starts_with("\r\n") { 2 } else { 1 };
            rest = &rest[at + skip..];
        }
        if !rest.is_empty() {
            self.pieces.push(Piece::Text(rest.to_string()));
        }
        self
    }

    pub fn indent(&mut self) -> &mut Self {
        self.pieces.push(Piece::Indent);
        self
    }

    pub fn dedent(&mut self) -> &mut Self {
        self.pieces.push(Piece::Dedent);
        self
    }

    /// Host code copied as written: a fresh line, then `code` unindented.
    pub fn raw(&mut self, code: &str) -> &mut Self {
        self.pieces.push(Piece::RawStart);
        self.push("\n");
        self.push(code);
        self.pieces.push(Piece::RawEnd);
        self
    }

    pub fn append(&mut self, other: Fragment) -> &mut Self {
        self.pieces.extend(other.pieces);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Write to `out`, starting `indent` columns in. Each indentation step
    /// is two columns.
    pub fn dump(&self, indent: &mut usize, out: &mut dyn CodeSink) {
        let mut indent_on = true;
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => out.gen_code(text),
                Piece::Newline => {
                    out.gen_code_line("");
                    if indent_on {
                        out.gen_code(&" ".repeat(*indent));
                    }
                }
                Piece::Indent => *indent += 2,
                Piece::Dedent => *indent = indent.saturating_sub(2),
                Piece::RawStart => indent_on = false,
                Piece::RawEnd => indent_on = true,
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Engine
// ══════════════════════════════════════════════════════════════════════════════

/// A decision to make at a choice point: the lookahead of one alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Cond {
    amount: u32,
    semantic: Option<String>,
    /// Expansion scanned to decide.
    expansion: ExpId,
}

pub(crate) struct ParseEngine<'a> {
    grammar: &'a Grammar,
    session: &'a mut GeneratorSession,
    opts: Options,
    first_set: Vec<bool>,
    /// Set by first-set computation when a semantic lookahead was passed.
    jj2_la: bool,
    xsp_declared: bool,
    /// Phase 3 routine being traced, when it is a production body.
    jj3_expansion: Option<ExpId>,
}

/// Emit parser routines for every production of an analyzed grammar.
///
/// Phase 1 methods go to the main channel, phase 2 and 3 routines to the
/// include channel. Fails if a production cannot be generated for the
/// chosen output language.
pub fn build(grammar: &Grammar, session: &mut GeneratorSession, out: &mut dyn CodeSink) -> Result<(), GenerateError> {
    session.phases = PhaseTables::default();
    let mut engine = ParseEngine::new(grammar, session);

    for prod in &grammar.productions {
        match &prod.kind {
            ProductionKind::Code { language: CodeLanguage::Cpp, code } => {
                engine.build_cpp_code_production(prod, code, out);
            }
            ProductionKind::Code { language: CodeLanguage::Java, code } => {
                if engine.opts.is_cpp() {
                    engine
                        .session
                        .diagnostics
                        .semantic_error(prod.loc, "Cannot use JAVACODE productions with C++ output (yet).");
                    continue;
                }
                engine.build_java_code_production(prod, code, out);
            }
            ProductionKind::Bnf { expansion, declarations } => {
                engine.build_phase1_routine(prod, *expansion, declarations, out);
            }
        }
    }

    out.switch_to_include();
    let phase2 = engine.session.phases.phase2_list.clone();
    for entry in phase2 {
        engine.build_phase2_routine(entry, out);
    }

    let mut index = 0;
    while index < engine.session.phases.phase3_list.len() {
        let inf = engine.session.phases.phase3_list[index];
        engine.setup_phase3_builds(inf);
        index += 1;
    }
    let routines: Vec<_> = engine.session.phases.phase3_table.values().copied().collect();
    for inf in routines {
        engine.build_phase3_routine(inf, false, out);
    }
    out.switch_to_main();

    let phases = &engine.session.phases;
    log::debug!(
        "parse engine: {} productions, {} jj_2 routines, {} jj_3 routines, {} jj_la1 slots",
        grammar.productions.len(),
        phases.phase2_list.len(),
        phases.phase3_table.len(),
        phases.mask_index
    );
    engine.session.diagnostics.checkpoint()
}

/// Fewest tokens any derivation of `exp` consumes ([`INFINITE_SIZE`] when
/// it runs into a code production or back into itself).
pub fn minimum_size(grammar: &Grammar, session: &mut GeneratorSession, exp: ExpId) -> u32 {
    ParseEngine::new(grammar, session).minimum_size(exp)
}

/// Token kinds `exp` can start with, and whether a semantic lookahead was
/// passed on the way.
pub fn first_set(grammar: &Grammar, session: &mut GeneratorSession, exp: ExpId) -> (Vec<u32>, bool) {
    let mut engine = ParseEngine::new(grammar, session);
    engine.reset_first_set();
    engine.gen_first_set(exp);
    let kinds = engine
        .first_set
        .iter()
        .enumerate()
        .filter(|(_, &set)| set)
        .map(|(kind, _)| kind as u32)
        .collect();
    (kinds, engine.jj2_la)
}

impl<'a> ParseEngine<'a> {
    pub(crate) fn new(grammar: &'a Grammar, session: &'a mut GeneratorSession) -> Self {
        let opts = session.options.clone();
        ParseEngine {
            grammar,
            session,
            opts,
            first_set: Vec::new(),
            jj2_la: false,
            xsp_declared: false,
            jj3_expansion: None,
        }
    }

    fn token_count(&self) -> usize {
        self.session.token_kinds()
    }

    fn static_opt(&self) -> &'static str {
        if self.opts.is_static {
            "static "
        } else {
            ""
        }
    }

    fn production(&self, name: &str) -> Option<&'a NormalProduction> {
        let grammar = self.grammar;
        self.session.lookup_production(name).map(|id| grammar.prod(id))
    }

    /// Whether `exp` is a reference to a code production.
    fn is_code_nonterminal(&self, exp: ExpId) -> bool {
        match self.grammar.kind(exp) {
            Expansion::NonTerminal { name, .. } => self
                .production(name)
                .is_some_and(|p| matches!(p.kind, ProductionKind::Code { .. })),
            _ => false,
        }
    }

    fn production_name(&self, exp: ExpId) -> String {
        self.grammar
            .production_of(exp)
            .map(|p| self.grammar.prod(p).name.clone())
            .unwrap_or_default()
    }

    /// How generated code names a token kind.
    fn token_label(&self, rexp: RexpId) -> String {
        let node = self.grammar.rexp(rexp);
        if !node.label.is_empty() {
            return node.label.clone();
        }
        match self.session.names_of_tokens.get(&node.ordinal) {
            Some(name) => name.clone(),
            None => node.ordinal.to_string(),
        }
    }

    fn amount_text(amount: u32) -> String {
        if amount == INFINITE_LOOKAHEAD {
            i32::MAX.to_string()
        } else {
            amount.to_string()
        }
    }

    /// Lookahead of a choice alternative.
    fn cond_of_sequence(&self, seq: ExpId) -> Cond {
        match self.grammar.sequence_lookahead(seq) {
            Some(la) => Cond {
                amount: la.amount,
                semantic: la.semantic.clone(),
                expansion: la.expansion.unwrap_or(seq),
            },
            None => Cond {
                amount: self.opts.lookahead,
                semantic: None,
                expansion: seq,
            },
        }
    }

    /// Lookahead deciding whether to enter a repetition body.
    fn cond_of_nested(&self, nested: ExpId) -> Cond {
        match self.grammar.kind(nested) {
            Expansion::Sequence(_) => self.cond_of_sequence(nested),
            _ => Cond {
                amount: self.opts.lookahead,
                semantic: None,
                expansion: nested,
            },
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Method scaffolding
    // ══════════════════════════════════════════════════════════════════════

    fn gen_stack_check(&self, void_return: bool, out: &mut dyn CodeSink) {
        let limit = self.opts.depth_limit;
        if limit == 0 {
            return;
        }
        if !self.opts.is_cpp() {
            out.gen_code_line(&format!("if(++jj_depth > {}) {{", limit));
            out.gen_code_line("  jj_consume_token(-1);");
            out.gen_code_line("  throw new ParseException();");
            out.gen_code_line("}");
            out.gen_code_line("try {");
            return;
        }
        let ret = if void_return { "return;" } else { "return __ERROR_RET__;" };
        out.gen_code_line(&format!("if(jj_depth_error){{ {} }}", ret));
        out.gen_code_line("__jj_depth_inc __jj_depth_counter(this);");
        out.gen_code_line(&format!("if(jj_depth > {}) {{", limit));
        out.gen_code_line("  jj_depth_error = true;");
        out.gen_code_line("  jj_consume_token(-1);");
        out.gen_code_line("  errorHandler->handleParseError(token, getToken(1), __FUNCTION__, this), hasError = true;");
        out.gen_code_line(&format!("  {}", ret));
        out.gen_code_line("}");
    }

    fn gen_stack_check_end(&self, out: &mut dyn CodeSink) {
        if self.opts.depth_limit > 0 && !self.opts.is_cpp() {
            out.gen_code_line(" } finally {");
            out.gen_code_line("   --jj_depth;");
            out.gen_code_line(" }");
        }
    }

    /// C++ definition header of a BNF production. Returns the
    /// `__ERROR_RET__` preamble for its body.
    fn cpp_method_header(&self, prod: &NormalProduction, out: &mut dyn CodeSink) -> String {
        let ret = prod.return_type.trim();
        out.method_def_header(ret, &self.opts.parser_name, &format!("{}({})", prod.name, prod.params));
        let default_return = if ret.contains('*') {
            "NULL"
        } else if ret == "void" {
            ""
        } else {
            "0"
        };
        format!(
            "\n#if !defined ERROR_RET_{name}\n#define ERROR_RET_{name} {default}\n#endif\n#define __ERROR_RET__ ERROR_RET_{name}\n",
            name = prod.name,
            default = default_return
        )
    }

    fn build_cpp_code_production(&mut self, prod: &NormalProduction, code: &str, out: &mut dyn CodeSink) {
        let name = add_unicode_escapes(&prod.name);
        out.method_def_header(
            prod.return_type.trim(),
            &self.opts.parser_name,
            &format!("{}({})", prod.name, prod.params),
        );
        out.gen_code_line(" {");
        if self.opts.debug_parser {
            out.gen_code_line("");
            out.gen_code_line(&format!(
                "    JJEnter<std::function<void()>> jjenter([this]() {{trace_call  (\"{}\"); }});",
                name
            ));
            out.gen_code_line(&format!(
                "    JJExit <std::function<void()>> jjexit ([this]() {{trace_return(\"{}\"); }});",
                name
            ));
            out.gen_code_line("    try {");
        }
        out.gen_code(code);
        out.gen_code_line("");
        if self.opts.debug_parser {
            out.gen_code_line("    } catch(...) { }");
        }
        out.gen_code_line("  }");
        out.gen_code_line("");
    }

    fn build_java_code_production(&mut self, prod: &NormalProduction, code: &str, out: &mut dyn CodeSink) {
        let access = prod.access.as_deref().map(|a| format!("{} ", a)).unwrap_or_default();
        out.gen_code(&format!(
            "  {}{}{} {}({}) throws ParseException",
            self.static_opt(),
            access,
            prod.return_type.trim(),
            prod.name,
            prod.params
        ));
        for throws in &prod.throws {
            out.gen_code(&format!(", {}", throws));
        }
        out.gen_code(" {");
        let name = add_unicode_escapes(&prod.name);
        if self.opts.debug_parser {
            out.gen_code_line("");
            out.gen_code_line(&format!("    trace_call(\"{}\");", name));
            out.gen_code("    try {");
        }
        out.gen_code_line("");
        out.gen_code(code);
        out.gen_code_line("");
        if self.opts.debug_parser {
            out.gen_code_line("    } finally {");
            out.gen_code_line(&format!("      trace_return(\"{}\");", name));
            out.gen_code_line("    }");
        }
        out.gen_code_line("  }");
        out.gen_code_line("");
    }

    fn parent_is_production(&self, exp: ExpId) -> bool {
        matches!(self.grammar.parent(exp), Some(Parent::Production(_)))
    }
}
