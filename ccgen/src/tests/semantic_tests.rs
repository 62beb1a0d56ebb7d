//! Semantic analysis: token numbering, reference resolution and the
//! grammar sanity checks.

use pretty_assertions::assert_eq;

use crate::error::GenerateError;
use crate::grammar::{Expansion, Grammar, GrammarBuilder, TokenProductionKind};
use crate::options::Options;
use crate::semantic::semanticize;
use crate::session::GeneratorSession;

struct Analyzed {
    grammar: Grammar,
    session: GeneratorSession,
    result: Result<(), GenerateError>,
}

fn analyze_with(options: Options, build: impl FnOnce(&mut GrammarBuilder)) -> Analyzed {
    let mut b = GrammarBuilder::new();
    build(&mut b);
    let mut grammar = b.finish();
    let mut session = GeneratorSession::new(options);
    let result = semanticize(&mut grammar, &mut session);
    Analyzed { grammar, session, result }
}

fn analyze(build: impl FnOnce(&mut GrammarBuilder)) -> Analyzed {
    analyze_with(Options::default(), build)
}

fn error_messages(session: &GeneratorSession) -> Vec<String> {
    session.diagnostics.errors().map(|d| d.message.clone()).collect()
}

fn warning_messages(session: &GeneratorSession) -> Vec<String> {
    session.diagnostics.warnings().map(|d| d.message.clone()).collect()
}

// ══════════════════════════════════════════════════════════════════════════════
// Token numbering
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_ordinals_are_contiguous() {
    let out = analyze(|b| {
        let letters = b.rx_range('a', 'z');
        let ident = b.rx_plus(letters);
        b.token("ID", ident);
        let kw_if = b.literal("if");
        let id = b.token_ref("ID");
        let kw_then = b.literal("then");
        let again = b.literal("if");
        let body = b.seq(vec![kw_if, id, kw_then, again]);
        b.bnf("Stmt", body);
    });
    out.result.expect("grammar is valid");

    // ID 1, "if" 2, "then" 3; the second "if" reuses 2.
    assert_eq!(out.session.token_count, 4);
    let ordinals: Vec<u32> = out.session.rexps_of_tokens.keys().copied().collect();
    assert_eq!(ordinals, vec![1, 2, 3]);
    assert_eq!(out.session.names_of_tokens.get(&1).map(String::as_str), Some("ID"));

    let Some(body) = out.grammar.productions[0].body() else { panic!("BNF body") };
    let Expansion::Sequence(units) = out.grammar.kind(body) else { panic!("sequence") };
    let used: Vec<u32> = units
        .iter()
        .filter_map(|&u| match out.grammar.kind(u) {
            Expansion::Terminal { rexp, .. } => Some(out.grammar.rexp(*rexp).ordinal),
            _ => None,
        })
        .collect();
    assert_eq!(used, vec![2, 1, 3, 2]);
}

#[test]
fn test_duplicate_string_token() {
    let out = analyze(|b| {
        let tp = b.token_production(None, TokenProductionKind::Token, false);
        let first = b.rx_literal("x");
        b.respec(tp, first, None, None);
        let second = b.rx_literal("x");
        b.respec(tp, second, None, None);
    });
    assert!(matches!(out.result, Err(GenerateError::TooManyErrors { errors: 1 })));
    assert_eq!(
        error_messages(&out.session),
        vec!["Duplicate definition of string token \"x\".".to_string()]
    );
}

#[test]
fn test_undefined_token_name() {
    let out = analyze(|b| {
        let missing = b.token_ref("NUMBER");
        b.bnf("Start", missing);
    });
    assert!(out.result.is_err());
    assert_eq!(
        error_messages(&out.session),
        vec!["Undefined lexical token name \"NUMBER\".".to_string()]
    );
}

#[test]
fn test_user_token_manager_numbers_references() {
    let options = Options {
        user_token_manager: true,
        ..Options::default()
    };
    let out = analyze_with(options, |b| {
        let number = b.token_ref("NUMBER");
        let plus = b.token_ref("PLUS");
        let again = b.token_ref("NUMBER");
        let body = b.seq(vec![number, plus, again]);
        b.bnf("Sum", body);
    });
    out.result.expect("references are numbered");
    assert_eq!(out.session.token_count, 3);
    assert_eq!(out.session.names_of_tokens.get(&1).map(String::as_str), Some("NUMBER"));
    assert_eq!(out.session.names_of_tokens.get(&2).map(String::as_str), Some("PLUS"));
    assert_eq!(out.session.diagnostics.warning_count(), 0);
}

#[test]
fn test_ignore_case_string_partially_superseded() {
    let out = analyze(|b| {
        b.at_line(3);
        let tp = b.token_production(None, TokenProductionKind::Token, false);
        let exact = b.rx_literal("if");
        b.respec(tp, exact, None, None);
        b.at_line(7);
        let ic = b.token_production(None, TokenProductionKind::Token, true);
        let loose = b.rx_literal("IF");
        b.respec(ic, loose, None, None);
    });
    out.result.expect("a warning only");
    assert_eq!(
        warning_messages(&out.session),
        vec!["String with IGNORE_CASE is partially superseded by string at line 3.".to_string()]
    );
    // Both spellings keep their own kind.
    assert_eq!(out.session.token_count, 3);
}

#[test]
fn test_explicit_string_behind_ignore_case_never_matches() {
    let out = analyze(|b| {
        b.at_line(3);
        let ic = b.token_production(None, TokenProductionKind::Token, true);
        let loose = b.rx_literal("if");
        b.respec(ic, loose, None, None);
        b.at_line(7);
        let tp = b.token_production(None, TokenProductionKind::Token, false);
        let exact = b.rx_literal("IF");
        b.respec(tp, exact, None, None);
    });
    assert!(matches!(out.result, Err(GenerateError::TooManyErrors { errors: 1 })));
    assert_eq!(
        error_messages(&out.session),
        vec!["Duplicate definition of string token \"IF\" can never be matched.".to_string()]
    );
}

#[test]
fn test_inline_string_behind_ignore_case_never_matches() {
    let mut loose_id = None;
    let out = analyze(|b| {
        b.at_line(3);
        let ic = b.token_production(None, TokenProductionKind::Token, true);
        let loose = b.rx_literal("if");
        b.respec(ic, loose, None, None);
        loose_id = Some(loose);
        b.at_line(9);
        let kw = b.literal("IF");
        b.bnf("Cond", kw);
    });
    let Some(loose) = loose_id else { panic!("token declared") };
    let loc = out.grammar.rexp(loose).loc;
    assert_eq!(loc.line, 3);
    assert!(out.result.is_err());
    assert_eq!(
        error_messages(&out.session),
        vec![format!(
            "String \"IF\" can never be matched due to presence of more general \
             (IGNORE_CASE) regular expression at line 3, column {}.",
            loc.column
        )]
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Productions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_undefined_nonterminal() {
    let out = analyze(|b| {
        let missing = b.nonterminal("Missing");
        b.bnf("Start", missing);
    });
    assert!(matches!(out.result, Err(GenerateError::TooManyErrors { errors: 1 })));
    assert_eq!(
        error_messages(&out.session),
        vec!["Non-terminal Missing has not been defined.".to_string()]
    );
}

#[test]
fn test_production_defined_twice() {
    let out = analyze(|b| {
        let a = b.literal("a");
        b.bnf("Start", a);
        let c = b.literal("c");
        b.bnf("Start", c);
    });
    assert!(out.result.is_err());
    assert_eq!(
        error_messages(&out.session),
        vec!["Start occurs on the left hand side of more than one production.".to_string()]
    );
}

#[test]
fn test_mutual_left_recursion_reported_once() {
    let out = analyze(|b| {
        let to_b = b.nonterminal("B");
        let a = b.literal("a");
        let body_a = b.seq(vec![to_b, a]);
        b.bnf("A", body_a);
        let to_a = b.nonterminal("A");
        b.bnf("B", to_a);
    });
    assert!(matches!(out.result, Err(GenerateError::TooManyErrors { errors: 1 })));
    assert_eq!(
        error_messages(&out.session),
        vec!["Left recursion detected: \"A... --> B... --> A...\"".to_string()]
    );
}

#[test]
fn test_left_recursion_through_nullable_prefix() {
    let out = analyze(|b| {
        let x = b.literal("x");
        let maybe = b.zero_or_one(x);
        let again = b.nonterminal("List");
        let y = b.literal("y");
        let body = b.seq(vec![maybe, again, y]);
        b.bnf("List", body);
    });
    assert_eq!(
        error_messages(&out.session),
        vec!["Left recursion detected: \"List... --> List...\"".to_string()]
    );
}

#[test]
fn test_right_recursion_is_fine() {
    let out = analyze(|b| {
        let x = b.literal("x");
        let rest = b.nonterminal("List");
        let more = b.seq(vec![x, rest]);
        let done = b.literal("y");
        let body = b.choice(vec![more, done]);
        b.bnf("List", body);
    });
    out.result.expect("right recursion is accepted");
}

#[test]
fn test_empty_repetition_body() {
    let out = analyze(|b| {
        let x = b.literal("x");
        let maybe = b.zero_or_one(x);
        let loop_ = b.zero_or_more(maybe);
        let end = b.literal("end");
        let body = b.seq(vec![loop_, end]);
        b.bnf("Start", body);
    });
    assert_eq!(
        error_messages(&out.session),
        vec!["Expansion within \"(...)*\" can be matched by empty string.".to_string()]
    );
}

#[test]
fn test_regex_reference_loop() {
    let out = analyze(|b| {
        let to_b = b.rx_ref("B");
        let x = b.rx_literal("x");
        let a = b.rx_seq(vec![x, to_b]);
        let a = b.private_label(a, "A");
        let to_a = b.rx_ref("A");
        let y = b.rx_literal("y");
        let b_exp = b.rx_choice(vec![to_a, y]);
        let b_exp = b.private_label(b_exp, "B");
        let tp = b.token_production(None, TokenProductionKind::Token, false);
        b.respec(tp, a, None, None);
        b.respec(tp, b_exp, None, None);
    });
    let errors = error_messages(&out.session);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Loop in regular expression detected: \""), "{}", errors[0]);
}

#[test]
fn test_sanity_check_off_skips_recursion_checks() {
    let options = Options {
        sanity_check: false,
        ..Options::default()
    };
    let out = analyze_with(options, |b| {
        let again = b.nonterminal("List");
        let x = b.literal("x");
        let body = b.seq(vec![again, x]);
        b.bnf("List", body);
    });
    out.result.expect("checks are disabled");
    assert_eq!(out.session.diagnostics.entries().len(), 0);
}

// ══════════════════════════════════════════════════════════════════════════════
// Lookahead rewriting and adequacy
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_lookahead_at_non_choice_location() {
    let out = analyze(|b| {
        let a = b.literal("a");
        let body = b.lookahead_seq(Some(2), None, None, vec![a]);
        b.bnf("Start", body);
    });
    out.result.expect("only a warning");
    assert_eq!(
        warning_messages(&out.session),
        vec!["Encountered LOOKAHEAD(...) at a non-choice location.  This will be ignored.".to_string()]
    );

    // The lookahead now guards a one-alternative choice after the head.
    let Some(body) = out.grammar.productions[0].body() else { panic!("BNF body") };
    let Expansion::Sequence(units) = out.grammar.kind(body) else { panic!("sequence") };
    assert_eq!(units.len(), 3);
    let Expansion::Choice(alts) = out.grammar.kind(units[1]) else { panic!("inserted choice") };
    assert_eq!(alts.len(), 1);
    let moved = out.grammar.sequence_lookahead(alts[0]).expect("moved lookahead");
    assert_eq!(moved.amount, 0);
    assert!(moved.expansion.is_none());
}

#[test]
fn test_semantic_lookahead_at_non_choice_location() {
    let out = analyze(|b| {
        let a = b.literal("a");
        let body = b.lookahead_seq(Some(1), None, Some("ready()"), vec![a]);
        b.bnf("Start", body);
    });
    out.result.expect("only a warning");
    assert_eq!(
        warning_messages(&out.session),
        vec![
            "Encountered LOOKAHEAD(...) at a non-choice location.  \
             Only semantic lookahead will be considered here."
                .to_string()
        ]
    );
}

#[test]
fn test_choice_conflict_warning() {
    let out = analyze(|b| {
        let a1 = b.literal("a");
        let x = b.literal("b");
        let first = b.seq(vec![a1, x]);
        let a2 = b.literal("a");
        let y = b.literal("c");
        let second = b.seq(vec![a2, y]);
        let body = b.choice(vec![first, second]);
        b.bnf("Start", body);
    });
    out.result.expect("conflicts are warnings");
    let warnings = warning_messages(&out.session);
    assert_eq!(warnings.len(), 1);
    assert!(
        warnings[0].starts_with("Choice conflict involving two expansions at line"),
        "{}",
        warnings[0]
    );
    assert!(warnings[0].contains("Consider using a lookahead of 2 for earlier expansion."));
}

#[test]
fn test_explicit_lookahead_silences_conflict() {
    let out = analyze(|b| {
        let a1 = b.literal("a");
        let x = b.literal("b");
        let first = b.lookahead_seq(Some(2), None, None, vec![a1, x]);
        let a2 = b.literal("a");
        let y = b.literal("c");
        let second = b.seq(vec![a2, y]);
        let body = b.choice(vec![first, second]);
        b.bnf("Start", body);
    });
    out.result.expect("grammar is valid");
    assert_eq!(out.session.diagnostics.warning_count(), 0);
}

#[test]
fn test_empty_alternative_warning() {
    let out = analyze(|b| {
        let x = b.literal("x");
        let maybe = b.zero_or_one(x);
        let y = b.literal("y");
        let body = b.choice(vec![maybe, y]);
        b.bnf("Start", body);
    });
    out.result.expect("only a warning");
    assert_eq!(
        warning_messages(&out.session),
        vec![
            "This choice can expand to the empty token sequence and will \
             therefore always be taken in favor of the choices after it."
                .to_string()
        ]
    );
}

#[test]
fn test_large_global_lookahead_skips_checks() {
    let options = Options {
        lookahead: 2,
        ..Options::default()
    };
    let out = analyze_with(options, |b| {
        let a = b.literal("a");
        b.bnf("Start", a);
    });
    out.result.expect("grammar is valid");
    let warnings: Vec<_> = out.session.diagnostics.warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].location.is_none());
    assert!(warnings[0]
        .message
        .starts_with("Lookahead adequacy checking not being performed"));
}

#[test]
fn test_summary_counts() {
    let out = analyze(|b| {
        let missing = b.nonterminal("Missing");
        let other = b.nonterminal("Other");
        let body = b.seq(vec![missing, other]);
        b.bnf("Start", body);
    });
    assert_eq!(out.session.diagnostics.summary(), "Detected 2 errors and 0 warnings.");
    let first = out.session.diagnostics.errors().next().expect("an error").to_string();
    assert!(first.starts_with("Error: Line "), "{}", first);
}
