//! Per-run generator state.
//!
//! Every table that semantic analysis, lexer generation and the parse
//! engine share lives on [`GeneratorSession`]. A session is created per
//! grammar compilation; [`GeneratorSession::reset`] returns it to the
//! freshly-constructed state so a long-lived host can reuse it.

use std::collections::{BTreeMap, HashMap, HashSet};

use indexmap::IndexMap;

use crate::diagnostics::Diagnostics;
use crate::grammar::{ExpId, Location, ProdId, RexpId};
use crate::options::Options;

/// Left-recursion walk status of a production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkStatus {
    #[default]
    Unvisited,
    /// On the walk stack.
    OnStack,
    /// On the walk stack, and a cycle through it was already reported.
    OnStackReported,
    Done,
}

/// Analysis results kept beside the productions rather than on them.
#[derive(Debug, Clone, Default)]
pub struct ProductionFacts {
    /// Indexed by `ProdId`. Only ever flips from `false` to `true`.
    pub empty_possible: Vec<bool>,
    /// Productions reachable without consuming a token.
    pub left_expansions: Vec<Vec<ProdId>>,
    pub walk_status: Vec<WalkStatus>,
    /// Non-terminal expansions referring to each production.
    pub parents: Vec<Vec<ExpId>>,
}

impl ProductionFacts {
    pub fn with_len(n: usize) -> Self {
        ProductionFacts {
            empty_possible: vec![false; n],
            left_expansions: vec![Vec::new(); n],
            walk_status: vec![WalkStatus::Unvisited; n],
            parents: vec![Vec::new(); n],
        }
    }
}

/// End-of-file action and state change taken from `<*> TOKEN : { <EOF> ... }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EofSpec {
    pub action: Option<String>,
    pub next_state: Option<String>,
    pub loc: Location,
}

/// A speculative-match request: scan `exp` consuming at most `count` tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase3Data {
    pub exp: ExpId,
    pub count: u32,
}

/// Parse engine side tables.
#[derive(Debug, Clone, Default)]
pub struct PhaseTables {
    pub gensym_index: u32,
    pub jj2_index: u32,
    pub mask_index: u32,
    /// One 32-bit-word token mask per `jj_la1` slot.
    pub mask_vals: Vec<Vec<u32>>,
    /// Set once any phase 3 routine evaluates semantic lookahead.
    pub lookahead_needed: bool,
    /// `_N` for phase 2 entry points, `R_...` for phase 3 routines,
    /// `jj_scan_token(k)` for expansions that reduce to a single token.
    pub internal_names: HashMap<ExpId, String>,
    pub internal_index: HashMap<ExpId, u32>,
    /// Lookahead expansions needing a `jj_2` routine, with their amounts.
    pub phase2_list: Vec<Phase3Data>,
    pub phase3_list: Vec<Phase3Data>,
    /// Largest budget requested per expansion, in first-request order.
    pub phase3_table: IndexMap<ExpId, Phase3Data>,
    pub min_size_memo: HashMap<ExpId, u32>,
    pub in_minimum_size: HashSet<ExpId>,
}

#[derive(Debug, Clone)]
pub struct GeneratorSession {
    pub options: Options,
    pub diagnostics: Diagnostics,
    pub production_table: IndexMap<String, ProdId>,
    /// Labeled token expressions, in declaration order.
    pub named_tokens: IndexMap<String, RexpId>,
    /// Ordinal to label for labeled tokens.
    pub names_of_tokens: BTreeMap<u32, String>,
    /// Ordinal to defining expression.
    pub rexps_of_tokens: BTreeMap<u32, RexpId>,
    /// Next ordinal to hand out; 0 is end of file.
    pub token_count: u32,
    /// Per lexical state: upper-cased image to (exact image to expression).
    pub simple_tokens_table: IndexMap<String, IndexMap<String, IndexMap<String, RexpId>>>,
    pub eof: Option<EofSpec>,
    pub facts: ProductionFacts,
    pub phases: PhaseTables,
}

impl GeneratorSession {
    pub fn new(options: Options) -> Self {
        GeneratorSession {
            options,
            diagnostics: Diagnostics::new(),
            production_table: IndexMap::new(),
            named_tokens: IndexMap::new(),
            names_of_tokens: BTreeMap::new(),
            rexps_of_tokens: BTreeMap::new(),
            token_count: 1,
            simple_tokens_table: IndexMap::new(),
            eof: None,
            facts: ProductionFacts::default(),
            phases: PhaseTables::default(),
        }
    }

    /// Drop everything computed for the previous grammar. Options are kept.
    pub fn reset(&mut self) {
        let options = std::mem::take(&mut self.options);
        *self = GeneratorSession::new(options);
        log::debug!("generator session reset");
    }

    pub fn lookup_production(&self, name: &str) -> Option<ProdId> {
        self.production_table.get(name).copied()
    }

    /// Number of token kinds, including end of file.
    pub fn token_kinds(&self) -> usize {
        self.token_count as usize
    }
}
