//! Programmatic grammar construction.
//!
//! Mirrors what a grammar front end produces: every sequence gets a leading
//! lookahead node, every choice alternative is a sequence, and every regular
//! expression used inline in a BNF production is registered as an implicit
//! `TOKEN` production in the `DEFAULT` state, in the order it is written.

use super::{
    Catch, CharItem, CodeLanguage, ExpId, Expansion, Grammar, Location, Lookahead,
    NormalProduction, Parent, ProdId, ProductionKind, Regex, RegexSpec, RexpId,
    TokenProduction, TokenProductionKind, TpId, INFINITE_LOOKAHEAD,
};

pub const DEFAULT_STATE: &str = "DEFAULT";

pub struct GrammarBuilder {
    grammar: Grammar,
    default_lookahead: u32,
    /// Position stamped on the next node; advanced per node so diagnostics
    /// stay distinguishable.
    next_loc: Location,
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarBuilder {
    pub fn new() -> Self {
        GrammarBuilder {
            grammar: Grammar {
                lexical_states: vec![DEFAULT_STATE.to_string()],
                ..Grammar::default()
            },
            default_lookahead: 1,
            next_loc: Location::new(1, 1),
        }
    }

    /// Amount given to implicit lookaheads (the `LOOKAHEAD` option).
    pub fn with_default_lookahead(mut self, amount: u32) -> Self {
        self.default_lookahead = amount;
        self
    }

    /// Place subsequent nodes at `line`, starting from column 1.
    pub fn at_line(&mut self, line: u32) -> &mut Self {
        self.next_loc = Location::new(line, 1);
        self
    }

    fn loc(&mut self) -> Location {
        let loc = self.next_loc;
        self.next_loc.column += 1;
        loc
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn finish(self) -> Grammar {
        self.grammar
    }

    fn adopt(&mut self, parent: ExpId, children: &[ExpId]) {
        for &child in children {
            self.grammar.exp_mut(child).parent = Some(Parent::Expansion(parent));
        }
    }

    fn declare_state(&mut self, name: &str) {
        if !self.grammar.lexical_states.iter().any(|s| s == name) {
            self.grammar.lexical_states.push(name.to_string());
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Regular expressions
    // ══════════════════════════════════════════════════════════════════════

    pub fn rx_literal(&mut self, image: &str) -> RexpId {
        let loc = self.loc();
        self.grammar.add_regex(Regex::StringLiteral(image.to_string()), loc)
    }

    pub fn rx_chars(&mut self, negated: bool, items: Vec<CharItem>) -> RexpId {
        let loc = self.loc();
        self.grammar.add_regex(Regex::CharacterList { negated, items }, loc)
    }

    /// `["a"-"z"]`
    pub fn rx_range(&mut self, lo: char, hi: char) -> RexpId {
        self.rx_chars(false, vec![CharItem::Range(lo, hi)])
    }

    /// `~[]`
    pub fn rx_any(&mut self) -> RexpId {
        self.rx_chars(true, Vec::new())
    }

    pub fn rx_ref(&mut self, name: &str) -> RexpId {
        let loc = self.loc();
        self.grammar.add_regex(
            Regex::JustName { name: name.to_string(), target: None },
            loc,
        )
    }

    pub fn rx_seq(&mut self, units: Vec<RexpId>) -> RexpId {
        let loc = self.loc();
        self.grammar.add_regex(Regex::Sequence(units), loc)
    }

    pub fn rx_choice(&mut self, alts: Vec<RexpId>) -> RexpId {
        let loc = self.loc();
        self.grammar.add_regex(Regex::Choice(alts), loc)
    }

    pub fn rx_plus(&mut self, inner: RexpId) -> RexpId {
        let loc = self.loc();
        self.grammar.add_regex(Regex::OneOrMore(inner), loc)
    }

    pub fn rx_star(&mut self, inner: RexpId) -> RexpId {
        let loc = self.loc();
        self.grammar.add_regex(Regex::ZeroOrMore(inner), loc)
    }

    pub fn rx_opt(&mut self, inner: RexpId) -> RexpId {
        let loc = self.loc();
        self.grammar.add_regex(Regex::ZeroOrOne(inner), loc)
    }

    pub fn rx_repeat(&mut self, body: RexpId, min: u32, max: Option<u32>) -> RexpId {
        let loc = self.loc();
        self.grammar.add_regex(Regex::Repetition { body, min, max }, loc)
    }

    pub fn rx_eof(&mut self) -> RexpId {
        let loc = self.loc();
        self.grammar.add_regex(Regex::EndOfFile, loc)
    }

    /// `< LABEL: r >`
    pub fn label(&mut self, rexp: RexpId, label: &str) -> RexpId {
        self.grammar.rexp_mut(rexp).label = label.to_string();
        rexp
    }

    /// `< #LABEL: r >`
    pub fn private_label(&mut self, rexp: RexpId, label: &str) -> RexpId {
        let node = self.grammar.rexp_mut(rexp);
        node.label = label.to_string();
        node.private = true;
        rexp
    }

    // ══════════════════════════════════════════════════════════════════════
    // Token productions
    // ══════════════════════════════════════════════════════════════════════

    /// An explicit `<states> KIND [IGNORE_CASE] : { ... }` section.
    /// `states: None` is `<*>`.
    pub fn token_production(
        &mut self,
        states: Option<&[&str]>,
        kind: TokenProductionKind,
        ignore_case: bool,
    ) -> TpId {
        let lex_states = states.map(|names| {
            for name in names {
                self.declare_state(name);
            }
            names.iter().map(|s| s.to_string()).collect()
        });
        let loc = self.loc();
        let id = TpId(self.grammar.token_productions.len() as u32);
        self.grammar.token_productions.push(TokenProduction {
            lex_states,
            kind,
            ignore_case,
            explicit: true,
            respecs: Vec::new(),
            loc,
        });
        id
    }

    /// Append `rexp [action] [: next_state]` to a token production.
    pub fn respec(
        &mut self,
        tp: TpId,
        rexp: RexpId,
        action: Option<&str>,
        next_state: Option<&str>,
    ) -> &mut Self {
        let next_state_loc = self.loc();
        self.grammar.rexp_mut(rexp).tp = Some(tp);
        self.grammar.token_productions[tp.index()].respecs.push(RegexSpec {
            rexp,
            action: action.map(str::to_string),
            next_state: next_state.map(str::to_string),
            next_state_loc,
        });
        self
    }

    /// Shorthand for a `TOKEN` entry in the `DEFAULT` state.
    pub fn token(&mut self, label: &str, rexp: RexpId) -> RexpId {
        let tp = self.token_production(Some(&[DEFAULT_STATE]), TokenProductionKind::Token, false);
        self.label(rexp, label);
        self.respec(tp, rexp, None, None);
        rexp
    }

    fn implicit_token(&mut self, rexp: RexpId) {
        if matches!(self.grammar.rexp(rexp).kind, Regex::EndOfFile) {
            return;
        }
        let loc = self.grammar.rexp(rexp).loc;
        let id = TpId(self.grammar.token_productions.len() as u32);
        self.grammar.token_productions.push(TokenProduction {
            lex_states: Some(vec![DEFAULT_STATE.to_string()]),
            kind: TokenProductionKind::Token,
            ignore_case: false,
            explicit: false,
            respecs: Vec::new(),
            loc,
        });
        self.grammar.rexp_mut(rexp).tp = Some(id);
        self.grammar.token_productions[id.index()].respecs.push(RegexSpec {
            rexp,
            action: None,
            next_state: None,
            next_state_loc: loc,
        });
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expansions
    // ══════════════════════════════════════════════════════════════════════

    /// A regular expression used inside a BNF production.
    pub fn terminal(&mut self, rexp: RexpId) -> ExpId {
        self.implicit_token(rexp);
        let loc = self.grammar.rexp(rexp).loc;
        self.grammar
            .add_expansion(Expansion::Terminal { rexp, lhs: None, rhs: None }, loc)
    }

    /// `"image"` inside a BNF production.
    pub fn literal(&mut self, image: &str) -> ExpId {
        let rexp = self.rx_literal(image);
        self.terminal(rexp)
    }

    /// `<NAME>` inside a BNF production.
    pub fn token_ref(&mut self, name: &str) -> ExpId {
        let rexp = self.rx_ref(name);
        self.terminal(rexp)
    }

    /// `<EOF>` inside a BNF production.
    pub fn eof(&mut self) -> ExpId {
        let rexp = self.rx_eof();
        self.terminal(rexp)
    }

    /// `lhs = terminal.rhs`
    pub fn assign(&mut self, exp: ExpId, lhs: &str, rhs: Option<&str>) -> ExpId {
        match &mut self.grammar.exp_mut(exp).kind {
            Expansion::Terminal { lhs: l, rhs: r, .. } => {
                *l = Some(lhs.to_string());
                *r = rhs.map(str::to_string);
            }
            Expansion::NonTerminal { lhs: l, .. } => *l = Some(lhs.to_string()),
            _ => {}
        }
        exp
    }

    pub fn nonterminal(&mut self, name: &str) -> ExpId {
        self.nonterminal_with_args(name, "")
    }

    pub fn nonterminal_with_args(&mut self, name: &str, args: &str) -> ExpId {
        let loc = self.loc();
        self.grammar.add_expansion(
            Expansion::NonTerminal {
                name: name.to_string(),
                lhs: None,
                args: args.to_string(),
            },
            loc,
        )
    }

    pub fn action(&mut self, code: &str) -> ExpId {
        let loc = self.loc();
        self.grammar.add_expansion(Expansion::Action(code.to_string()), loc)
    }

    /// A sequence headed by an implicit lookahead of the default amount.
    pub fn seq(&mut self, units: Vec<ExpId>) -> ExpId {
        let amount = self.default_lookahead;
        self.seq_headed(amount, false, None, None, units)
    }

    /// `LOOKAHEAD(amount, scan, { semantic }) units...`
    ///
    /// Without an amount, the lookahead is unbounded when `scan` is given,
    /// zero when only a semantic predicate is given, and the default amount
    /// otherwise.
    pub fn lookahead_seq(
        &mut self,
        amount: Option<u32>,
        scan: Option<ExpId>,
        semantic: Option<&str>,
        units: Vec<ExpId>,
    ) -> ExpId {
        let amount = match (amount, scan, semantic) {
            (Some(n), _, _) => n,
            (None, Some(_), _) => INFINITE_LOOKAHEAD,
            (None, None, Some(_)) => 0,
            (None, None, None) => self.default_lookahead,
        };
        self.seq_headed(amount, true, semantic, scan, units)
    }

    fn seq_headed(
        &mut self,
        amount: u32,
        explicit: bool,
        semantic: Option<&str>,
        scan: Option<ExpId>,
        units: Vec<ExpId>,
    ) -> ExpId {
        let loc = self.loc();
        let la = self.grammar.add_expansion(
            Expansion::Lookahead(Lookahead {
                amount,
                explicit,
                semantic: semantic.map(str::to_string),
                expansion: None,
            }),
            loc,
        );
        let mut all = Vec::with_capacity(units.len() + 1);
        all.push(la);
        all.extend(units);
        let seq = self.grammar.add_expansion(Expansion::Sequence(all.clone()), loc);
        self.adopt(seq, &all);
        if let Expansion::Lookahead(spec) = &mut self.grammar.exp_mut(la).kind {
            spec.expansion = Some(scan.unwrap_or(seq));
        }
        if let Some(scan) = scan {
            self.adopt(la, &[scan]);
        }
        seq
    }

    fn as_sequence(&mut self, exp: ExpId) -> ExpId {
        if matches!(self.grammar.kind(exp), Expansion::Sequence(_)) {
            exp
        } else {
            self.seq(vec![exp])
        }
    }

    /// `( a | b | ... )`. Non-sequence alternatives are wrapped.
    pub fn choice(&mut self, alts: Vec<ExpId>) -> ExpId {
        let alts: Vec<ExpId> = alts.into_iter().map(|a| self.as_sequence(a)).collect();
        let loc = match alts.first() {
            Some(first) => self.grammar.exp(*first).loc,
            None => self.loc(),
        };
        let choice = self.grammar.add_expansion(Expansion::Choice(alts.clone()), loc);
        self.adopt(choice, &alts);
        choice
    }

    fn repetition_body(&mut self, inner: ExpId) -> ExpId {
        match self.grammar.kind(inner) {
            Expansion::Sequence(_) | Expansion::Choice(_) => inner,
            _ => self.seq(vec![inner]),
        }
    }

    pub fn one_or_more(&mut self, inner: ExpId) -> ExpId {
        let inner = self.repetition_body(inner);
        let loc = self.loc();
        let id = self.grammar.add_expansion(Expansion::OneOrMore(inner), loc);
        self.adopt(id, &[inner]);
        id
    }

    pub fn zero_or_more(&mut self, inner: ExpId) -> ExpId {
        let inner = self.repetition_body(inner);
        let loc = self.loc();
        let id = self.grammar.add_expansion(Expansion::ZeroOrMore(inner), loc);
        self.adopt(id, &[inner]);
        id
    }

    pub fn zero_or_one(&mut self, inner: ExpId) -> ExpId {
        let inner = self.repetition_body(inner);
        let loc = self.loc();
        let id = self.grammar.add_expansion(Expansion::ZeroOrOne(inner), loc);
        self.adopt(id, &[inner]);
        id
    }

    pub fn try_block(&mut self, body: ExpId, catches: Vec<Catch>, finally: Option<&str>) -> ExpId {
        let body = self.as_sequence(body);
        let loc = self.loc();
        let id = self.grammar.add_expansion(
            Expansion::TryBlock {
                body,
                catches,
                finally: finally.map(str::to_string),
            },
            loc,
        );
        self.adopt(id, &[body]);
        id
    }

    // ══════════════════════════════════════════════════════════════════════
    // Productions
    // ══════════════════════════════════════════════════════════════════════

    /// `void name() : {} { body }`
    pub fn bnf(&mut self, name: &str, body: ExpId) -> ProdId {
        self.bnf_with(name, "void", "", body)
    }

    pub fn bnf_with(&mut self, name: &str, return_type: &str, params: &str, body: ExpId) -> ProdId {
        let body = self.as_sequence(body);
        let id = ProdId(self.grammar.productions.len() as u32);
        let loc = self.grammar.exp(body).loc;
        self.grammar.productions.push(NormalProduction {
            name: name.to_string(),
            loc,
            kind: ProductionKind::Bnf {
                expansion: body,
                declarations: String::new(),
            },
            return_type: return_type.to_string(),
            params: params.to_string(),
            access: None,
            throws: Vec::new(),
            jump_patched: false,
        });
        self.grammar.exp_mut(body).parent = Some(Parent::Production(id));
        id
    }

    pub fn code_production(
        &mut self,
        name: &str,
        language: CodeLanguage,
        return_type: &str,
        code: &str,
    ) -> ProdId {
        let loc = self.loc();
        let id = ProdId(self.grammar.productions.len() as u32);
        self.grammar.productions.push(NormalProduction {
            name: name.to_string(),
            loc,
            kind: ProductionKind::Code {
                language,
                code: code.to_string(),
            },
            return_type: return_type.to_string(),
            params: String::new(),
            access: None,
            throws: Vec::new(),
            jump_patched: false,
        });
        id
    }

    pub fn production_mut(&mut self, id: ProdId) -> &mut NormalProduction {
        &mut self.grammar.productions[id.index()]
    }
}
