//! Lookahead fixing.
//!
//! An explicit `LOOKAHEAD(...)` heading a sequence that is not a choice
//! alternative or repetition body is moved into a new one-alternative choice
//! inserted right after it, so its semantic part is evaluated like any other
//! choice guard. The syntactic amount cannot be honored there and is dropped.

use crate::grammar::{Expansion, Grammar, Lookahead, Parent};
use crate::session::GeneratorSession;

pub fn fix_lookaheads(grammar: &mut Grammar, session: &mut GeneratorSession) {
    let bodies: Vec<_> = grammar.productions.iter().filter_map(|p| p.body()).collect();
    for body in bodies {
        for id in grammar.post_order(body) {
            if !matches!(grammar.kind(id), Expansion::Sequence(_)) {
                continue;
            }
            if let Some(Parent::Expansion(parent)) = grammar.parent(id) {
                if matches!(
                    grammar.kind(parent),
                    Expansion::Choice(_)
                        | Expansion::ZeroOrMore(_)
                        | Expansion::OneOrMore(_)
                        | Expansion::ZeroOrOne(_)
                ) {
                    continue;
                }
            }
            let Expansion::Sequence(units) = grammar.kind(id).clone() else { continue };
            let la_id = units[0];
            let Expansion::Lookahead(la) = grammar.kind(la_id).clone() else { continue };
            if !la.explicit {
                continue;
            }
            let loc = grammar.exp(la_id).loc;

            if la.amount != 0 {
                let message = if la.semantic.is_some() {
                    "Encountered LOOKAHEAD(...) at a non-choice location.  \
                     Only semantic lookahead will be considered here."
                } else {
                    "Encountered LOOKAHEAD(...) at a non-choice location.  This will be ignored."
                };
                session.diagnostics.warning(loc, message);
            }

            let action = grammar.add_expansion(Expansion::Action(String::new()), loc);
            let alternative =
                grammar.add_expansion(Expansion::Sequence(vec![la_id, action]), loc);
            let choice = grammar.add_expansion(Expansion::Choice(vec![alternative]), loc);
            grammar.exp_mut(la_id).parent = Some(Parent::Expansion(alternative));
            grammar.exp_mut(action).parent = Some(Parent::Expansion(alternative));
            grammar.exp_mut(alternative).parent = Some(Parent::Expansion(choice));
            grammar.exp_mut(choice).parent = Some(Parent::Expansion(id));
            grammar.exp_mut(la_id).kind = Expansion::Lookahead(Lookahead {
                amount: 0,
                explicit: true,
                semantic: la.semantic.clone(),
                expansion: None,
            });

            let placeholder = grammar.add_expansion(
                Expansion::Lookahead(Lookahead {
                    amount: la.amount,
                    explicit: false,
                    semantic: None,
                    expansion: None,
                }),
                loc,
            );
            grammar.exp_mut(placeholder).parent = Some(Parent::Expansion(id));

            let mut rewritten = units;
            rewritten[0] = placeholder;
            rewritten.insert(1, choice);
            grammar.exp_mut(id).kind = Expansion::Sequence(rewritten);
        }
    }
}
