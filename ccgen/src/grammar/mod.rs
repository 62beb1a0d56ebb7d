//! In-memory grammar model.
//!
//! Everything lives in flat arenas inside [`Grammar`]: expansion nodes,
//! regular-expression nodes, BNF productions and token productions. Nodes
//! refer to each other by index. Parent links are plain indices and are only
//! consulted for context questions ("is my parent a Choice?", follow sets);
//! traversal always goes downwards through the owning variant.
//!
//! The front end that turns grammar text into this model is not part of this
//! crate; [`builder::GrammarBuilder`] is the programmatic way in.

pub mod builder;

pub use builder::{GrammarBuilder, DEFAULT_STATE};

// ══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ══════════════════════════════════════════════════════════════════════════════

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Index of an [`ExpansionNode`] in [`Grammar::expansions`].
    ExpId
);
arena_id!(
    /// Index of a [`NormalProduction`] in [`Grammar::productions`].
    ProdId
);
arena_id!(
    /// Index of a [`RegexNode`] in [`Grammar::regexes`].
    RexpId
);
arena_id!(
    /// Index of a [`TokenProduction`] in [`Grammar::token_productions`].
    TpId
);

/// Source position of a grammar construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Location { line, column }
    }
}

/// Lookahead amount meaning "as many tokens as it takes".
pub const INFINITE_LOOKAHEAD: u32 = u32::MAX;

// ══════════════════════════════════════════════════════════════════════════════
// Expansions
// ══════════════════════════════════════════════════════════════════════════════

/// Owner of an expansion node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    Expansion(ExpId),
    Production(ProdId),
}

/// Syntactic and/or semantic lookahead attached to the front of a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookahead {
    /// Number of tokens to scan. [`INFINITE_LOOKAHEAD`] when only an
    /// expansion to scan was given.
    pub amount: u32,
    /// Written by the grammar author rather than implied.
    pub explicit: bool,
    /// Host-language boolean expression guarding the alternative.
    pub semantic: Option<String>,
    /// Expansion scanned during lookahead. Usually the enclosing sequence;
    /// `None` only for placeholders left behind by lookahead fixing.
    pub expansion: Option<ExpId>,
}

/// A `catch` clause of a try block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catch {
    pub exception_type: String,
    pub name: String,
    pub code: String,
}

/// The closed set of expansion variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// Reference to a token regular expression.
    Terminal {
        rexp: RexpId,
        /// Variable receiving the matched token.
        lhs: Option<String>,
        /// Member access applied to the token (`t.image`).
        rhs: Option<String>,
    },
    NonTerminal {
        name: String,
        lhs: Option<String>,
        args: String,
    },
    /// `units[0]` is always a [`Expansion::Lookahead`].
    Sequence(Vec<ExpId>),
    /// Every alternative is a [`Expansion::Sequence`].
    Choice(Vec<ExpId>),
    OneOrMore(ExpId),
    ZeroOrMore(ExpId),
    ZeroOrOne(ExpId),
    TryBlock {
        body: ExpId,
        catches: Vec<Catch>,
        finally: Option<String>,
    },
    /// Host-language code block.
    Action(String),
    Lookahead(Lookahead),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionNode {
    pub kind: Expansion,
    pub parent: Option<Parent>,
    pub loc: Location,
}

// ══════════════════════════════════════════════════════════════════════════════
// Regular expressions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharItem {
    Single(char),
    Range(char, char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Regex {
    StringLiteral(String),
    CharacterList { negated: bool, items: Vec<CharItem> },
    /// `<NAME>` reference, resolved by semantic analysis.
    JustName { name: String, target: Option<RexpId> },
    Sequence(Vec<RexpId>),
    Choice(Vec<RexpId>),
    OneOrMore(RexpId),
    ZeroOrMore(RexpId),
    ZeroOrOne(RexpId),
    /// `(r){min}` or `(r){min, max}`; `max: None` means unbounded.
    Repetition { body: RexpId, min: u32, max: Option<u32> },
    EndOfFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexNode {
    pub kind: Regex,
    /// Empty for unlabeled expressions.
    pub label: String,
    /// Token kind. 0 is end of file; assigned by semantic analysis.
    pub ordinal: u32,
    /// `#NAME`: usable only inside other token definitions.
    pub private: bool,
    /// Owning token production, if the expression is a top-level token.
    pub tp: Option<TpId>,
    pub loc: Location,
}

impl RegexNode {
    /// Whether this is a `~[]` expression that matches any single character.
    pub fn matches_any_char(&self) -> bool {
        matches!(&self.kind, Regex::CharacterList { negated: true, items } if items.is_empty())
    }

    pub fn literal_image(&self) -> Option<&str> {
        match &self.kind {
            Regex::StringLiteral(image) => Some(image),
            _ => None,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Token productions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenProductionKind {
    Token,
    Skip,
    More,
    Special,
}

impl TokenProductionKind {
    pub fn image(self) -> &'static str {
        match self {
            TokenProductionKind::Token => "TOKEN",
            TokenProductionKind::Skip => "SKIP",
            TokenProductionKind::More => "MORE",
            TokenProductionKind::Special => "SPECIAL",
        }
    }
}

/// One `regex [action] [: NEXT_STATE]` entry of a token production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexSpec {
    pub rexp: RexpId,
    pub action: Option<String>,
    pub next_state: Option<String>,
    pub next_state_loc: Location,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenProduction {
    /// `None` for `<*>`; filled with every state by semantic analysis.
    pub lex_states: Option<Vec<String>>,
    pub kind: TokenProductionKind,
    pub ignore_case: bool,
    /// Written as a `TOKEN:` section rather than implied by a BNF literal.
    pub explicit: bool,
    pub respecs: Vec<RegexSpec>,
    pub loc: Location,
}

// ══════════════════════════════════════════════════════════════════════════════
// Productions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeLanguage {
    Java,
    Cpp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductionKind {
    Bnf {
        expansion: ExpId,
        /// Local declarations emitted before the body.
        declarations: String,
    },
    /// `JAVACODE` / `CPPCODE` production: a hand-written method.
    Code { language: CodeLanguage, code: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalProduction {
    pub name: String,
    pub loc: Location,
    pub kind: ProductionKind,
    pub return_type: String,
    pub params: String,
    pub access: Option<String>,
    pub throws: Vec<String>,
    /// Actions contain `return` statements hidden from the host compiler,
    /// so the method needs an unreachable trailer.
    pub jump_patched: bool,
}

impl NormalProduction {
    pub fn body(&self) -> Option<ExpId> {
        match self.kind {
            ProductionKind::Bnf { expansion, .. } => Some(expansion),
            ProductionKind::Code { .. } => None,
        }
    }

    pub fn is_void(&self) -> bool {
        self.return_type.trim() == "void"
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Grammar
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct Grammar {
    pub expansions: Vec<ExpansionNode>,
    pub regexes: Vec<RegexNode>,
    pub productions: Vec<NormalProduction>,
    pub token_productions: Vec<TokenProduction>,
    /// Declared lexical states; `DEFAULT` is always first.
    pub lexical_states: Vec<String>,
}

impl Grammar {
    pub fn exp(&self, id: ExpId) -> &ExpansionNode {
        &self.expansions[id.index()]
    }

    pub fn exp_mut(&mut self, id: ExpId) -> &mut ExpansionNode {
        &mut self.expansions[id.index()]
    }

    pub fn kind(&self, id: ExpId) -> &Expansion {
        &self.expansions[id.index()].kind
    }

    pub fn rexp(&self, id: RexpId) -> &RegexNode {
        &self.regexes[id.index()]
    }

    pub fn rexp_mut(&mut self, id: RexpId) -> &mut RegexNode {
        &mut self.regexes[id.index()]
    }

    pub fn prod(&self, id: ProdId) -> &NormalProduction {
        &self.productions[id.index()]
    }

    pub fn tp(&self, id: TpId) -> &TokenProduction {
        &self.token_productions[id.index()]
    }

    pub fn add_expansion(&mut self, kind: Expansion, loc: Location) -> ExpId {
        let id = ExpId(self.expansions.len() as u32);
        self.expansions.push(ExpansionNode { kind, parent: None, loc });
        id
    }

    pub fn add_regex(&mut self, kind: Regex, loc: Location) -> RexpId {
        let id = RexpId(self.regexes.len() as u32);
        self.regexes.push(RegexNode {
            kind,
            label: String::new(),
            ordinal: 0,
            private: false,
            tp: None,
            loc,
        });
        id
    }

    pub fn parent(&self, id: ExpId) -> Option<Parent> {
        self.exp(id).parent
    }

    /// Parent expansion, if the parent is not a production.
    pub fn parent_exp(&self, id: ExpId) -> Option<ExpId> {
        match self.exp(id).parent {
            Some(Parent::Expansion(p)) => Some(p),
            _ => None,
        }
    }

    /// Production whose body contains `id`.
    pub fn production_of(&self, id: ExpId) -> Option<ProdId> {
        let mut current = id;
        loop {
            match self.exp(current).parent? {
                Parent::Production(prod) => return Some(prod),
                Parent::Expansion(up) => current = up,
            }
        }
    }

    /// Direct children in source order.
    pub fn children(&self, id: ExpId) -> Vec<ExpId> {
        match self.kind(id) {
            Expansion::Sequence(units) | Expansion::Choice(units) => units.clone(),
            Expansion::OneOrMore(e) | Expansion::ZeroOrMore(e) | Expansion::ZeroOrOne(e) => {
                vec![*e]
            }
            Expansion::TryBlock { body, .. } => vec![*body],
            Expansion::Lookahead(la) => match la.expansion {
                // The implicit lookahead of a sequence points back at it.
                Some(e) if !self.is_leading_lookahead_of(id, e) => vec![e],
                _ => Vec::new(),
            },
            Expansion::Terminal { .. } | Expansion::NonTerminal { .. } | Expansion::Action(_) => {
                Vec::new()
            }
        }
    }

    fn is_leading_lookahead_of(&self, la: ExpId, seq: ExpId) -> bool {
        matches!(self.kind(seq), Expansion::Sequence(units) if units.first() == Some(&la))
    }

    /// The lookahead heading a sequence.
    pub fn sequence_lookahead(&self, seq: ExpId) -> Option<&Lookahead> {
        match self.kind(seq) {
            Expansion::Sequence(units) => match units.first().map(|u| self.kind(*u)) {
                Some(Expansion::Lookahead(la)) => Some(la),
                _ => None,
            },
            _ => None,
        }
    }

    /// Pre-order walk. `descend` decides whether a node's children are visited.
    pub fn pre_order(&self, root: ExpId, descend: &dyn Fn(&Expansion) -> bool) -> Vec<ExpId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            if descend(self.kind(id)) {
                for child in self.children(id).into_iter().rev() {
                    stack.push(child);
                }
            }
        }
        out
    }

    /// Post-order walk over every node below (and including) `root`.
    pub fn post_order(&self, root: ExpId) -> Vec<ExpId> {
        let mut out = Vec::new();
        self.post_order_into(root, &mut out);
        out
    }

    fn post_order_into(&self, id: ExpId, out: &mut Vec<ExpId>) {
        for child in self.children(id) {
            self.post_order_into(child, out);
        }
        out.push(id);
    }

    /// Direct sub-expressions of a regular expression.
    pub fn regex_children(&self, id: RexpId) -> Vec<RexpId> {
        match &self.rexp(id).kind {
            Regex::Sequence(units) | Regex::Choice(units) => units.clone(),
            Regex::OneOrMore(r) | Regex::ZeroOrMore(r) | Regex::ZeroOrOne(r) => vec![*r],
            Regex::Repetition { body, .. } => vec![*body],
            Regex::StringLiteral(_)
            | Regex::CharacterList { .. }
            | Regex::JustName { .. }
            | Regex::EndOfFile => Vec::new(),
        }
    }

    /// Pre-order walk over a regular expression tree. References are not
    /// followed.
    pub fn regex_pre_order(&self, root: RexpId) -> Vec<RexpId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            for child in self.regex_children(id).into_iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Lexical states a token production applies to, after `<*>` expansion.
    pub fn states_of(&self, tp: TpId) -> Vec<String> {
        match &self.tp(tp).lex_states {
            Some(states) => states.clone(),
            None => self.lexical_states.clone(),
        }
    }

    pub fn state_index(&self, name: &str) -> Option<usize> {
        self.lexical_states.iter().position(|s| s == name)
    }
}
