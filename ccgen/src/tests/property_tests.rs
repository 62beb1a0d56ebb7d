//! Randomized checks: token numbering, longest-match scanning, the
//! empty-derivation fixed point and minimum expansion sizes.

use std::collections::BTreeSet;

use proptest::prelude::*;

use crate::automata::lexgen::build_lexer;
use crate::automata::scanner::Scanner;
use crate::grammar::{Expansion, GrammarBuilder, TokenProductionKind};
use crate::options::Options;
use crate::parse_engine::minimum_size;
use crate::semantic::empty::compute_empty_possible;
use crate::semantic::semanticize;
use crate::session::GeneratorSession;

fn arb_keywords() -> BoxedStrategy<Vec<String>> {
    prop::collection::btree_set("[a-z]{1,4}", 1..8)
        .prop_map(|set: BTreeSet<String>| set.into_iter().collect())
        .boxed()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Declared literals get ordinals 1..=n with no gaps.
    #[test]
    fn ordinals_are_dense(keywords in arb_keywords()) {
        let mut b = GrammarBuilder::new();
        let tp = b.token_production(None, TokenProductionKind::Token, false);
        let ids: Vec<_> = keywords
            .iter()
            .map(|kw| {
                let rexp = b.rx_literal(kw);
                b.respec(tp, rexp, None, None);
                rexp
            })
            .collect();
        let mut grammar = b.finish();
        let mut session = GeneratorSession::new(Options::default());
        prop_assert!(semanticize(&mut grammar, &mut session).is_ok());

        let ordinals: Vec<u32> = ids.iter().map(|&id| grammar.rexp(id).ordinal).collect();
        let expected: Vec<u32> = (1..=keywords.len() as u32).collect();
        prop_assert_eq!(ordinals, expected);
        prop_assert_eq!(session.token_count as usize, keywords.len() + 1);
    }

    /// A word scans as one token: the keyword when it is one, the
    /// identifier otherwise.
    #[test]
    fn words_scan_whole(keywords in arb_keywords(), word in "[a-z]{1,6}") {
        let mut b = GrammarBuilder::new();
        let tp = b.token_production(None, TokenProductionKind::Token, false);
        for kw in &keywords {
            let rexp = b.rx_literal(kw);
            b.respec(tp, rexp, None, None);
        }
        let letters = b.rx_range('a', 'z');
        let ident = b.rx_plus(letters);
        let ident = b.label(ident, "ID");
        b.respec(tp, ident, None, None);
        let mut grammar = b.finish();
        let mut session = GeneratorSession::new(Options::default());
        prop_assert!(semanticize(&mut grammar, &mut session).is_ok());
        let tables = build_lexer(&grammar, &mut session).expect("lexer builds");

        let mut scanner = Scanner::new(&tables, &word, &Options::default()).expect("plain input");
        let tokens = scanner.tokenize().expect("letters always scan");
        prop_assert_eq!(tokens.len(), 2);
        prop_assert_eq!(&tokens[0].image, &word);
        let expected = keywords
            .iter()
            .position(|kw| kw == &word)
            .map_or(keywords.len() as u32 + 1, |i| i as u32 + 1);
        prop_assert_eq!(tokens[0].kind, expected);
    }

    /// Required units count once each; optional ones not at all. Repeated
    /// queries agree.
    #[test]
    fn minimum_size_counts_required_units(required in 0usize..6, optional in 0usize..4) {
        let mut b = GrammarBuilder::new();
        let mut units = Vec::new();
        for i in 0..required {
            units.push(b.literal(&format!("r{}", i)));
        }
        for i in 0..optional {
            let lit = b.literal(&format!("o{}", i));
            units.push(b.zero_or_more(lit));
        }
        if units.is_empty() {
            units.push(b.action(""));
        }
        let body = b.seq(units);
        b.bnf("Start", body);
        let mut grammar = b.finish();
        let mut session = GeneratorSession::new(Options::default());
        prop_assert!(semanticize(&mut grammar, &mut session).is_ok());

        let Some(body) = grammar.productions[0].body() else { panic!("BNF body") };
        prop_assert!(matches!(grammar.kind(body), Expansion::Sequence(_)));
        let first = minimum_size(&grammar, &mut session, body);
        let again = minimum_size(&grammar, &mut session, body);
        prop_assert_eq!(first, required as u32);
        prop_assert_eq!(again, first);
    }

    /// `P0 -> P1 -> ... -> Pk-1 -> tail`: every production is nullable
    /// exactly when the tail is, and the fixed point needs at most one pass
    /// per production plus a final quiet one.
    #[test]
    fn empty_flags_reach_fixed_point(k in 1usize..12, nullable_tail in any::<bool>()) {
        let mut b = GrammarBuilder::new();
        for i in 0..k - 1 {
            let next = b.nonterminal(&format!("P{}", i + 1));
            b.bnf(&format!("P{}", i), next);
        }
        let x = b.literal("x");
        let tail = if nullable_tail { b.zero_or_one(x) } else { x };
        b.bnf(&format!("P{}", k - 1), tail);
        let mut grammar = b.finish();
        let mut session = GeneratorSession::new(Options::default());
        prop_assert!(semanticize(&mut grammar, &mut session).is_ok());
        prop_assert!(session.facts.empty_possible.iter().all(|&e| e == nullable_tail));

        // Already at the fixed point: one pass, nothing flips back.
        prop_assert_eq!(compute_empty_possible(&grammar, &mut session), 1);
        prop_assert!(session.facts.empty_possible.iter().all(|&e| e == nullable_tail));

        session.facts.empty_possible = vec![false; k];
        let passes = compute_empty_possible(&grammar, &mut session);
        prop_assert!(passes <= k + 1);
        prop_assert!(session.facts.empty_possible.iter().all(|&e| e == nullable_tail));
    }
}
