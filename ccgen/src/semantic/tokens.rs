//! Token production checks, token naming and ordinal assignment.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::grammar::{Grammar, Regex, RexpId, TokenProductionKind, TpId};
use crate::session::{EofSpec, GeneratorSession};

/// Drop the marked `(token production, respec)` entries.
fn remove_marked(grammar: &mut Grammar, marked: &BTreeSet<(usize, usize)>) {
    for (tp_index, tp) in grammar.token_productions.iter_mut().enumerate() {
        let mut index = 0;
        tp.respecs.retain(|_| {
            let keep = !marked.contains(&(tp_index, index));
            index += 1;
            keep
        });
    }
}

/// Lexical state references, `<EOF>` rules, free-standing references and
/// private expressions used inline.
pub fn check_token_productions(grammar: &mut Grammar, session: &mut GeneratorSession) {
    let mut marked = BTreeSet::new();
    for (tp_index, tp) in grammar.token_productions.iter().enumerate() {
        for (res_index, res) in tp.respecs.iter().enumerate() {
            if let Some(next) = &res.next_state {
                if grammar.state_index(next).is_none() {
                    session.diagnostics.semantic_error(
                        res.next_state_loc,
                        format!("Lexical state \"{}\" has not been defined.", next),
                    );
                }
            }
            let rexp = grammar.rexp(res.rexp);
            if matches!(rexp.kind, Regex::EndOfFile) {
                if tp.lex_states.is_some() {
                    session.diagnostics.semantic_error(
                        rexp.loc,
                        "EOF action/state change must be specified for all states, i.e., <*>TOKEN:.",
                    );
                }
                if tp.kind != TokenProductionKind::Token {
                    session.diagnostics.semantic_error(
                        rexp.loc,
                        "EOF action/state change can be specified only in a TOKEN specification.",
                    );
                }
                if session.eof.is_some() {
                    session.diagnostics.semantic_error(
                        rexp.loc,
                        "Duplicate action/state change specification for <EOF>.",
                    );
                }
                session.eof = Some(EofSpec {
                    action: res.action.clone(),
                    next_state: res.next_state.clone(),
                    loc: rexp.loc,
                });
                marked.insert((tp_index, res_index));
            } else if tp.explicit && session.options.user_token_manager {
                session.diagnostics.warning(
                    rexp.loc,
                    "Ignoring regular expression specification since option \
                     USER_TOKEN_MANAGER has been set to true.",
                );
            } else if let (true, Regex::JustName { name, .. }) = (tp.explicit, &rexp.kind) {
                session.diagnostics.warning(
                    rexp.loc,
                    format!(
                        "Ignoring free-standing regular expression reference.  \
                         If you really want this, you must give it a different label as <NEWLABEL:<{}>>.",
                        name
                    ),
                );
                marked.insert((tp_index, res_index));
            } else if !tp.explicit && rexp.private {
                session.diagnostics.semantic_error(
                    rexp.loc,
                    "Private (#) regular expression cannot be defined within grammar productions.",
                );
            }
        }
    }
    remove_marked(grammar, &marked);
}

/// Register every labeled top-level expression.
pub fn collect_named_tokens(grammar: &Grammar, session: &mut GeneratorSession) {
    for tp in &grammar.token_productions {
        for res in &tp.respecs {
            let rexp = grammar.rexp(res.rexp);
            if matches!(rexp.kind, Regex::JustName { .. }) || rexp.label.is_empty() {
                continue;
            }
            let label = &rexp.label;
            if session.named_tokens.contains_key(label) {
                session.diagnostics.semantic_error(
                    rexp.loc,
                    format!("Multiply defined lexical token name \"{}\".", label),
                );
            } else {
                session.named_tokens.insert(label.clone(), res.rexp);
            }
            if grammar.state_index(label).is_some() {
                session.diagnostics.semantic_error(
                    rexp.loc,
                    format!(
                        "Lexical token name \"{}\" is the same as that of a lexical state.",
                        label
                    ),
                );
            }
        }
    }
}

/// Returns the ignore-case entry superseding `image`, if any.
///
/// An exact, case-sensitive entry for `image` shadows nothing.
fn ignore_case_entry(
    grammar: &Grammar,
    variants: &IndexMap<String, RexpId>,
    image: &str,
) -> Option<RexpId> {
    let is_ignore_case = |r: RexpId| {
        grammar
            .rexp(r)
            .tp
            .map_or(false, |tp| grammar.tp(tp).ignore_case)
    };
    if let Some(&exact) = variants.get(image) {
        if !is_ignore_case(exact) {
            return None;
        }
    }
    variants.values().copied().find(|&r| is_ignore_case(r))
}

/// Number every token kind, merging repeated string literals.
pub fn assign_ordinals(grammar: &mut Grammar, session: &mut GeneratorSession) {
    session.token_count = 1;
    for state in grammar.lexical_states.clone() {
        session.simple_tokens_table.entry(state).or_default();
    }
    let mut marked = BTreeSet::new();

    for tp_index in 0..grammar.token_productions.len() {
        if grammar.token_productions[tp_index].lex_states.is_none() {
            grammar.token_productions[tp_index].lex_states = Some(grammar.lexical_states.clone());
        }
        let tp = grammar.token_productions[tp_index].clone();
        let states = tp.lex_states.clone().unwrap_or_default();

        for (res_index, res) in tp.respecs.iter().enumerate() {
            let rexp_id = res.rexp;
            let kind = grammar.rexp(rexp_id).kind.clone();
            match &kind {
                Regex::StringLiteral(image) => {
                    let upper = image.to_uppercase();
                    for state in &states {
                        let table = session.simple_tokens_table.entry(state.clone()).or_default();
                        let Some(variants) = table.get(&upper).cloned() else {
                            if grammar.rexp(rexp_id).ordinal == 0 {
                                grammar.rexp_mut(rexp_id).ordinal = session.token_count;
                                session.token_count += 1;
                            }
                            let mut variants = IndexMap::new();
                            variants.insert(image.clone(), rexp_id);
                            table.insert(upper.clone(), variants);
                            continue;
                        };
                        let loc = grammar.rexp(rexp_id).loc;
                        if let Some(other) = ignore_case_entry(grammar, &variants, image) {
                            let other_loc = grammar.rexp(other).loc;
                            let message = if !tp.explicit {
                                format!(
                                    "String \"{}\" can never be matched due to presence of more \
                                     general (IGNORE_CASE) regular expression at line {}, column {}.",
                                    image, other_loc.line, other_loc.column
                                )
                            } else {
                                format!(
                                    "Duplicate definition of string token \"{}\" can never be matched.",
                                    image
                                )
                            };
                            session.diagnostics.semantic_error(loc, message);
                        } else if tp.ignore_case {
                            let lines: Vec<String> = variants
                                .values()
                                .map(|r| format!(" line {}", grammar.rexp(*r).loc.line))
                                .collect();
                            let noun = if lines.len() == 1 { "string" } else { "strings" };
                            session.diagnostics.warning(
                                loc,
                                format!(
                                    "String with IGNORE_CASE is partially superseded by {} at{}.",
                                    noun,
                                    lines.join(",")
                                ),
                            );
                            if grammar.rexp(rexp_id).ordinal == 0 {
                                grammar.rexp_mut(rexp_id).ordinal = session.token_count;
                                session.token_count += 1;
                            }
                            insert_variant(session, state, &upper, image, rexp_id);
                        } else if let Some(&existing) = variants.get(image) {
                            let existing_node = grammar.rexp(existing);
                            let existing_kind = existing_node
                                .tp
                                .map_or(TokenProductionKind::Token, |t| grammar.tp(t).kind);
                            if tp.explicit {
                                let message = if state == "DEFAULT" {
                                    format!("Duplicate definition of string token \"{}\".", image)
                                } else {
                                    format!(
                                        "Duplicate definition of string token \"{}\" in lexical state \"{}\".",
                                        image, state
                                    )
                                };
                                session.diagnostics.semantic_error(loc, message);
                            } else if existing_kind != TokenProductionKind::Token {
                                session.diagnostics.semantic_error(
                                    loc,
                                    format!(
                                        "String token \"{}\" has been defined as a \"{}\" token.",
                                        image,
                                        existing_kind.image()
                                    ),
                                );
                            } else if existing_node.private {
                                session.diagnostics.semantic_error(
                                    loc,
                                    format!(
                                        "String token \"{}\" has been defined as a private regular expression.",
                                        image
                                    ),
                                );
                            } else {
                                // A BNF use of an already declared string.
                                let ordinal = existing_node.ordinal;
                                grammar.rexp_mut(rexp_id).ordinal = ordinal;
                                marked.insert((tp_index, res_index));
                            }
                        } else {
                            if grammar.rexp(rexp_id).ordinal == 0 {
                                grammar.rexp_mut(rexp_id).ordinal = session.token_count;
                                session.token_count += 1;
                            }
                            insert_variant(session, state, &upper, image, rexp_id);
                        }
                    }
                }
                Regex::JustName { .. } => {}
                _ => {
                    grammar.rexp_mut(rexp_id).ordinal = session.token_count;
                    session.token_count += 1;
                }
            }

            if !matches!(kind, Regex::JustName { .. }) {
                let node = grammar.rexp(rexp_id);
                if !node.label.is_empty() {
                    session.names_of_tokens.insert(node.ordinal, node.label.clone());
                }
                session.rexps_of_tokens.entry(node.ordinal).or_insert(rexp_id);
            }
        }
    }
    remove_marked(grammar, &marked);
    log::trace!("assigned ordinals 1..{}", session.token_count);
}

fn insert_variant(session: &mut GeneratorSession, state: &str, upper: &str, image: &str, rexp: RexpId) {
    if let Some(variants) = session
        .simple_tokens_table
        .get_mut(state)
        .and_then(|t| t.get_mut(upper))
    {
        variants.insert(image.to_string(), rexp);
    }
}

/// Resolve `<NAME>` references against the named tokens and drop top-level
/// references from the token productions.
pub fn resolve_token_references(grammar: &mut Grammar, session: &mut GeneratorSession) {
    let mut marked = BTreeSet::new();
    for tp_index in 0..grammar.token_productions.len() {
        let tp_explicit = grammar.token_productions[tp_index].explicit;
        let roots: Vec<RexpId> = grammar.token_productions[tp_index]
            .respecs
            .iter()
            .map(|r| r.rexp)
            .collect();
        for (res_index, root) in roots.into_iter().enumerate() {
            for id in grammar.regex_pre_order(root) {
                let Regex::JustName { name, .. } = grammar.rexp(id).kind.clone() else { continue };
                let loc = grammar.rexp(id).loc;
                let Some(&target) = session.named_tokens.get(&name) else {
                    session.diagnostics.semantic_error(
                        loc,
                        format!("Undefined lexical token name \"{}\".", name),
                    );
                    continue;
                };
                let target_node = grammar.rexp(target);
                let target_kind = target_node
                    .tp
                    .map_or(TokenProductionKind::Token, |t: TpId| grammar.tp(t).kind);
                if id == root && !tp_explicit && target_node.private {
                    session.diagnostics.semantic_error(
                        loc,
                        format!(
                            "Token name \"{}\" refers to a private (with a #) regular expression.",
                            name
                        ),
                    );
                } else if id == root && !tp_explicit && target_kind != TokenProductionKind::Token {
                    session.diagnostics.semantic_error(
                        loc,
                        format!(
                            "Token name \"{}\" refers to a non-token (SKIP, MORE, IGNORE_IN_BNF) regular expression.",
                            name
                        ),
                    );
                } else {
                    let ordinal = target_node.ordinal;
                    let node = grammar.rexp_mut(id);
                    node.ordinal = ordinal;
                    node.kind = Regex::JustName { name, target: Some(target) };
                }
            }
            if matches!(grammar.rexp(root).kind, Regex::JustName { .. }) {
                marked.insert((tp_index, res_index));
            }
        }
    }
    remove_marked(grammar, &marked);
}

/// With a user-supplied token manager, `<NAME>` references need no
/// definition: undefined names get fresh ordinals.
pub fn number_user_token_references(grammar: &mut Grammar, session: &mut GeneratorSession) {
    let mut marked = BTreeSet::new();
    for tp_index in 0..grammar.token_productions.len() {
        let roots: Vec<RexpId> = grammar.token_productions[tp_index]
            .respecs
            .iter()
            .map(|r| r.rexp)
            .collect();
        for (res_index, root) in roots.into_iter().enumerate() {
            let Regex::JustName { name, .. } = grammar.rexp(root).kind.clone() else { continue };
            match session.named_tokens.get(&name).copied() {
                None => {
                    let ordinal = session.token_count;
                    session.token_count += 1;
                    grammar.rexp_mut(root).ordinal = ordinal;
                    session.named_tokens.insert(name.clone(), root);
                    session.names_of_tokens.insert(ordinal, name);
                }
                Some(target) => {
                    let ordinal = grammar.rexp(target).ordinal;
                    let node = grammar.rexp_mut(root);
                    node.ordinal = ordinal;
                    node.kind = Regex::JustName { name, target: Some(target) };
                    marked.insert((tp_index, res_index));
                }
            }
        }
    }
    remove_marked(grammar, &marked);

    for tp in &grammar.token_productions {
        for res in &tp.respecs {
            let node = grammar.rexp(res.rexp);
            if !session.names_of_tokens.contains_key(&node.ordinal) {
                session.diagnostics.warning(
                    node.loc,
                    "Unlabeled regular expression cannot be referred to by user generated token manager.",
                );
            }
        }
    }
}
