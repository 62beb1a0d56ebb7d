//! End-to-end runs: grammar in, token manager and parser text out, with the
//! reference scanner run over the produced tables.

use pretty_assertions::assert_eq;

use crate::automata::scanner::Scanner;
use crate::error::GenerateError;
use crate::grammar::{GrammarBuilder, TokenProductionKind};
use crate::options::{Options, OutputLanguage};
use crate::pipeline::{run_pipeline, PipelineState};
use crate::Grammar;

/// ```text
/// SKIP : { " " }
/// TOKEN : { <ID: (["a"-"z"])+> }
/// void Stmt() : {} { <ID> ( "=" | "==" ) <ID> }
/// ```
///
/// Ordinals: " " 1, ID 2, "=" 3, "==" 4.
fn assignment_grammar() -> Grammar {
    let mut b = GrammarBuilder::new();
    let skip = b.token_production(None, TokenProductionKind::Skip, false);
    let space = b.rx_literal(" ");
    b.respec(skip, space, None, None);
    let letters = b.rx_range('a', 'z');
    let ident = b.rx_plus(letters);
    b.token("ID", ident);

    let lhs = b.token_ref("ID");
    let assign = b.literal("=");
    let compare = b.literal("==");
    let operator = b.choice(vec![assign, compare]);
    let rhs = b.token_ref("ID");
    let body = b.seq(vec![lhs, operator, rhs]);
    b.bnf("Stmt", body);
    b.finish()
}

fn kinds(code: &crate::GeneratedCode, text: &str) -> Vec<(u32, String)> {
    let tables = code.lexer_tables.as_ref().expect("lexer tables");
    let mut scanner = Scanner::new(tables, text, &Options::default()).expect("valid input");
    scanner
        .tokenize()
        .expect("scans")
        .into_iter()
        .map(|t| (t.kind, t.image))
        .collect()
}

fn tok(kind: u32, image: &str) -> (u32, String) {
    (kind, image.to_string())
}

#[test]
fn test_pipeline_produces_lexer_and_parser() {
    let code = run_pipeline(assignment_grammar(), Options::default()).expect("pipeline succeeds");

    let token_manager = code.token_manager.as_ref().expect("token manager text");
    assert!(token_manager.main.contains("jjMoveStringLiteralDfa0_0"));
    assert!(token_manager.main.contains("jjstrLiteralImages"));
    assert!(code.parser.main.contains("final public void Stmt() throws ParseException {"));

    assert_eq!(code.la1_masks, vec![vec![0b11000]]);
    assert_eq!(code.jj2_count, 0);
    assert_eq!(code.summary, "Detected 0 errors and 0 warnings.");
    assert!(code.diagnostics.is_empty());
}

#[test]
fn test_longest_operator_scans_as_one_token() {
    let code = run_pipeline(assignment_grammar(), Options::default()).expect("pipeline succeeds");
    assert_eq!(
        kinds(&code, "a == b"),
        vec![tok(2, "a"), tok(4, "=="), tok(2, "b"), tok(0, "")]
    );
    assert_eq!(
        kinds(&code, "x=y"),
        vec![tok(2, "x"), tok(3, "="), tok(2, "y"), tok(0, "")]
    );
}

#[test]
fn test_identifier_is_not_split_at_keyword() {
    let mut b = GrammarBuilder::new();
    let kw = b.literal("in");
    let letters = b.rx_range('a', 'z');
    let ident = b.rx_plus(letters);
    b.token("ID", ident);
    let id = b.token_ref("ID");
    let body = b.seq(vec![kw, id]);
    b.bnf("Loop", body);

    // "in" 1, ID 2. Equal-length matches go to the smaller ordinal.
    let code = run_pipeline(b.finish(), Options::default()).expect("pipeline succeeds");
    assert_eq!(kinds(&code, "int"), vec![tok(2, "int"), tok(0, "")]);
    assert_eq!(kinds(&code, "in"), vec![tok(1, "in"), tok(0, "")]);
}

#[test]
fn test_user_token_manager_skips_lexer() {
    let mut b = GrammarBuilder::new();
    let number = b.token_ref("NUMBER");
    b.bnf("Value", number);
    let options = Options {
        user_token_manager: true,
        ..Options::default()
    };
    let code = run_pipeline(b.finish(), options).expect("pipeline succeeds");
    assert!(code.token_manager.is_none());
    assert!(code.lexer_tables.is_none());
    assert!(code.parser.main.contains("jj_consume_token(NUMBER);"));
}

#[test]
fn test_pipeline_stops_on_semantic_errors() {
    let mut b = GrammarBuilder::new();
    let missing = b.nonterminal("Missing");
    b.bnf("Start", missing);
    let result = run_pipeline(b.finish(), Options::default());
    assert!(matches!(result, Err(GenerateError::TooManyErrors { errors: 1 })));
}

#[test]
fn test_pipeline_states_advance_in_order() {
    let state = PipelineState::new(assignment_grammar(), Options::default());
    assert!(matches!(state, PipelineState::Ready { .. }));

    let state = state.advance().expect("analysis succeeds");
    assert!(matches!(state, PipelineState::Analyzed { .. }));
    assert!(!state.is_complete());

    let state = state.advance().expect("generation succeeds");
    assert!(state.is_complete());

    let state = state.advance().expect("complete is terminal");
    assert!(state.is_complete());
}

#[test]
fn test_cpp_pipeline_splits_channels() {
    let options = Options {
        output_language: OutputLanguage::Cpp,
        ..Options::default()
    };
    let code = run_pipeline(assignment_grammar(), options).expect("pipeline succeeds");
    assert!(code.parser.main.contains("void Parser::Stmt()"), "{}", code.parser.main);
    assert!(!code.parser.include.is_empty());
}

#[test]
fn test_options_from_json() {
    let options = Options::from_json(r#"{"lookahead": 2, "output_language": "cpp", "static": true}"#)
        .expect("valid options");
    assert_eq!(options.lookahead, 2);
    assert_eq!(options.output_language, OutputLanguage::Cpp);
    assert!(options.is_static);
    assert!(options.sanity_check);
    assert_eq!(options.parser_name, "Parser");

    assert!(matches!(
        Options::from_json(r#"{"lookahead": "two"}"#),
        Err(GenerateError::Config(_))
    ));
}
