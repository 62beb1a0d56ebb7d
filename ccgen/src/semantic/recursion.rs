//! Left-recursion and regular-expression loop detection.
//!
//! Both walks use the same four-state marking: a node is unvisited, on the
//! walk stack, on the stack with its cycle already reported, or done. When a
//! walk reaches a node that is on the stack, the cycle is unwound back to
//! that node and reported once there.

use std::collections::HashMap;

use super::empty::empty_expansion_exists;
use crate::grammar::{ExpId, Expansion, Grammar, ProdId, Regex, RexpId};
use crate::session::{GeneratorSession, WalkStatus};

// ══════════════════════════════════════════════════════════════════════════════
// Productions
// ══════════════════════════════════════════════════════════════════════════════

pub fn check_left_recursion(grammar: &Grammar, session: &mut GeneratorSession) {
    for (index, prod) in grammar.productions.iter().enumerate() {
        if let Some(body) = prod.body() {
            add_left_most(grammar, session, ProdId(index as u32), body);
        }
    }
    let mut loop_string = String::new();
    for index in 0..grammar.productions.len() {
        if session.facts.walk_status[index] == WalkStatus::Unvisited {
            prod_walk(grammar, session, ProdId(index as u32), &mut loop_string);
        }
    }
}

/// Record every production `exp` can start with before consuming a token.
fn add_left_most(grammar: &Grammar, session: &mut GeneratorSession, prod: ProdId, exp: ExpId) {
    match grammar.kind(exp) {
        Expansion::NonTerminal { name, .. } => {
            let Some(target) = session.lookup_production(name) else { return };
            let left = &mut session.facts.left_expansions[prod.index()];
            if !left.contains(&target) {
                left.push(target);
            }
        }
        Expansion::OneOrMore(nested) | Expansion::ZeroOrMore(nested) | Expansion::ZeroOrOne(nested) => {
            add_left_most(grammar, session, prod, *nested);
        }
        Expansion::Choice(alts) => {
            for alt in alts {
                add_left_most(grammar, session, prod, *alt);
            }
        }
        Expansion::Sequence(units) => {
            for unit in units {
                add_left_most(grammar, session, prod, *unit);
                if !empty_expansion_exists(grammar, session, *unit) {
                    break;
                }
            }
        }
        Expansion::TryBlock { body, .. } => add_left_most(grammar, session, prod, *body),
        Expansion::Terminal { .. } | Expansion::Action(_) | Expansion::Lookahead(_) => {}
    }
}

/// Returns `true` while unwinding a cycle that has not been reported yet.
fn prod_walk(
    grammar: &Grammar,
    session: &mut GeneratorSession,
    prod: ProdId,
    loop_string: &mut String,
) -> bool {
    let status = |s: &GeneratorSession, p: ProdId| s.facts.walk_status[p.index()];
    session.facts.walk_status[prod.index()] = WalkStatus::OnStack;
    let name = &grammar.prod(prod).name;
    let left = session.facts.left_expansions[prod.index()].clone();
    for next in left {
        match status(session, next) {
            WalkStatus::OnStack => {
                session.facts.walk_status[next.index()] = WalkStatus::OnStackReported;
                *loop_string = format!("{}... --> {}...", name, grammar.prod(next).name);
                return finish_unwind(grammar, session, prod, loop_string);
            }
            WalkStatus::Unvisited => {
                if prod_walk(grammar, session, next, loop_string) {
                    *loop_string = format!("{}... --> {}", name, loop_string);
                    return finish_unwind(grammar, session, prod, loop_string);
                }
            }
            WalkStatus::OnStackReported | WalkStatus::Done => {}
        }
    }
    session.facts.walk_status[prod.index()] = WalkStatus::Done;
    false
}

fn finish_unwind(
    grammar: &Grammar,
    session: &mut GeneratorSession,
    prod: ProdId,
    loop_string: &str,
) -> bool {
    let reported_here = session.facts.walk_status[prod.index()] == WalkStatus::OnStackReported;
    session.facts.walk_status[prod.index()] = WalkStatus::Done;
    if reported_here {
        session.diagnostics.semantic_error(
            grammar.prod(prod).loc,
            format!("Left recursion detected: \"{}\"", loop_string),
        );
        false
    } else {
        true
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Regular expressions
// ══════════════════════════════════════════════════════════════════════════════

struct RexpWalker<'a> {
    grammar: &'a Grammar,
    status: HashMap<RexpId, WalkStatus>,
    loop_string: String,
}

impl RexpWalker<'_> {
    fn status(&self, id: RexpId) -> WalkStatus {
        self.status.get(&id).copied().unwrap_or_default()
    }

    fn walk(&mut self, session: &mut GeneratorSession, rexp: RexpId) -> bool {
        let grammar = self.grammar;
        match &grammar.rexp(rexp).kind {
            Regex::JustName { target: Some(target), .. } => {
                let target = *target;
                let label = &grammar.rexp(target).label;
                match self.status(target) {
                    WalkStatus::OnStack => {
                        self.status.insert(target, WalkStatus::OnStackReported);
                        self.loop_string = format!("...{}...", label);
                        true
                    }
                    WalkStatus::Unvisited => {
                        self.status.insert(target, WalkStatus::OnStack);
                        if self.walk(session, target) {
                            self.loop_string = format!("...{}... --> {}", label, self.loop_string);
                            let reported_here = self.status(target) == WalkStatus::OnStackReported;
                            self.status.insert(target, WalkStatus::Done);
                            if reported_here {
                                session.diagnostics.semantic_error(
                                    grammar.rexp(target).loc,
                                    format!(
                                        "Loop in regular expression detected: \"{}\"",
                                        self.loop_string
                                    ),
                                );
                                false
                            } else {
                                true
                            }
                        } else {
                            self.status.insert(target, WalkStatus::Done);
                            false
                        }
                    }
                    WalkStatus::OnStackReported | WalkStatus::Done => false,
                }
            }
            Regex::JustName { target: None, .. } => false,
            _ => {
                for child in grammar.regex_children(rexp) {
                    if self.walk(session, child) {
                        return true;
                    }
                }
                false
            }
        }
    }
}

pub fn check_regex_loops(grammar: &Grammar, session: &mut GeneratorSession) {
    let mut walker = RexpWalker {
        grammar,
        status: HashMap::new(),
        loop_string: String::new(),
    };
    for tp in &grammar.token_productions {
        for respec in &tp.respecs {
            let rexp = respec.rexp;
            if walker.status(rexp) != WalkStatus::Unvisited {
                continue;
            }
            walker.status.insert(rexp, WalkStatus::OnStack);
            if walker.walk(session, rexp) {
                let label = &grammar.rexp(rexp).label;
                walker.loop_string = format!("...{}... --> {}", label, walker.loop_string);
                session.diagnostics.semantic_error(
                    grammar.rexp(rexp).loc,
                    format!("Loop in regular expression detected: \"{}\"", walker.loop_string),
                );
            }
            walker.status.insert(rexp, WalkStatus::Done);
        }
    }
}
