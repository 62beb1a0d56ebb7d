//! Generator benchmarks over synthetic grammars of growing size.
//!
//! 1. Semantic analysis alone
//! 2. Lexer tables (literal cascade + NFA/DFA)
//! 3. Full pipeline (analysis, token manager and parser text)

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use ccgen::automata::lexgen::build_lexer;
use ccgen::grammar::{Grammar, GrammarBuilder, TokenProductionKind};
use ccgen::semantic::semanticize;
use ccgen::{run_pipeline, GeneratorSession, Options};

/// `n` statement kinds, each introduced by its own keyword:
///
/// ```text
/// SKIP : { " " | "\n" }
/// TOKEN : { <NUMBER: (["0"-"9"])+> | <ID: ["a"-"z"] (["a"-"z","0"-"9"])*> }
/// void Program() : {} { ( Stmt0() | ... | Stmt{n-1}() )* <EOF> }
/// void Stmt{i}() : {} { "kw{i}" Tail() ";" }
/// void Tail() : {} { LOOKAHEAD(2) <ID> "=" <NUMBER> | <ID> "(" [ <ID> ] ")" }
/// ```
fn synthetic_grammar(n: usize) -> Grammar {
    let mut b = GrammarBuilder::new();
    let skip = b.token_production(None, TokenProductionKind::Skip, false);
    for ws in [" ", "\n"] {
        let lit = b.rx_literal(ws);
        b.respec(skip, lit, None, None);
    }
    let digit = b.rx_range('0', '9');
    let number = b.rx_plus(digit);
    b.token("NUMBER", number);
    let head = b.rx_range('a', 'z');
    let rest_alpha = b.rx_range('a', 'z');
    let rest_digit = b.rx_range('0', '9');
    let rest = b.rx_choice(vec![rest_alpha, rest_digit]);
    let rest = b.rx_star(rest);
    let ident = b.rx_seq(vec![head, rest]);
    b.token("ID", ident);

    let stmts: Vec<_> = (0..n).map(|i| b.nonterminal(&format!("Stmt{}", i))).collect();
    let any_stmt = b.choice(stmts);
    let program = b.zero_or_more(any_stmt);
    let eof = b.eof();
    let body = b.seq(vec![program, eof]);
    b.bnf("Program", body);

    for i in 0..n {
        let kw = b.literal(&format!("kw{}", i));
        let tail = b.nonterminal("Tail");
        let semi = b.literal(";");
        let body = b.seq(vec![kw, tail, semi]);
        b.bnf(&format!("Stmt{}", i), body);
    }

    let id = b.token_ref("ID");
    let eq = b.literal("=");
    let value = b.token_ref("NUMBER");
    let assign = b.lookahead_seq(Some(2), None, None, vec![id, eq, value]);
    let callee = b.token_ref("ID");
    let open = b.literal("(");
    let arg = b.token_ref("ID");
    let arg = b.zero_or_one(arg);
    let close = b.literal(")");
    let call = b.seq(vec![callee, open, arg, close]);
    let tail = b.choice(vec![assign, call]);
    b.bnf("Tail", tail);

    b.finish()
}

const SIZES: [usize; 4] = [4, 16, 64, 256];

fn bench_semanticize(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate/semanticize");
    group.warm_up_time(Duration::from_secs(3));
    group.measurement_time(Duration::from_secs(5));

    for n in SIZES {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || (synthetic_grammar(n), GeneratorSession::new(Options::default())),
                |(mut grammar, mut session)| semanticize(&mut grammar, &mut session),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_lexer(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate/lexer");
    group.warm_up_time(Duration::from_secs(3));
    group.measurement_time(Duration::from_secs(5));

    for n in SIZES {
        let mut grammar = synthetic_grammar(n);
        let mut session = GeneratorSession::new(Options::default());
        if semanticize(&mut grammar, &mut session).is_err() {
            panic!("synthetic grammar of size {} is invalid", n);
        }
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &grammar, |b, grammar| {
            b.iter_batched(
                || session.clone(),
                |mut session| build_lexer(grammar, &mut session),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate/full_pipeline");
    group.warm_up_time(Duration::from_secs(3));
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(50);

    for n in SIZES {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || synthetic_grammar(n),
                |grammar| run_pipeline(grammar, Options::default()),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_semanticize, bench_lexer, bench_full_pipeline);
criterion_main!(benches);
