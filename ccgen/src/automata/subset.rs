//! Subset construction: NFA → DFA conversion.
//!
//! DFA states are identified by the sorted list of NFA state ids they
//! stand for, so two paths that reach the same NFA state set share one DFA
//! state. A DFA state accepts the lowest ordinal among its NFA states.

use std::collections::HashMap;

use super::{
    nfa::{epsilon_closure, set_accept},
    partition::AlphabetPartition,
    ClassId, Dfa, DfaState, Nfa, StateId, DEAD_STATE,
};

/// Convert an NFA to a DFA over the partition's equivalence classes.
pub fn subset_construction(nfa: &Nfa, partition: &AlphabetPartition) -> Dfa {
    let num_classes = partition.num_classes;
    let mut dfa = Dfa::new(num_classes);

    let mut state_map: HashMap<Vec<StateId>, StateId> = HashMap::new();
    // Worklist entries carry their own DFA id.
    let mut worklist: Vec<(Vec<StateId>, StateId)> = Vec::new();

    let start_set = epsilon_closure(nfa, &[nfa.start]);
    dfa.states[0].accept = set_accept(nfa, &start_set);
    state_map.insert(start_set.clone(), 0);
    worklist.push((start_set, 0));

    while let Some((current_set, current_dfa_state)) = worklist.pop() {
        for class_id in 0..num_classes as ClassId {
            let rep = partition.class_representatives[class_id as usize];

            let mut target_set: Vec<StateId> = Vec::new();
            for &nfa_state in &current_set {
                for (char_class, target) in &nfa.states[nfa_state as usize].transitions {
                    if char_class.contains(rep) {
                        target_set.push(*target);
                    }
                }
            }
            if target_set.is_empty() {
                continue;
            }
            let target_set = epsilon_closure(nfa, &target_set);

            let target_dfa_state = match state_map.get(&target_set) {
                Some(&existing) => existing,
                None => {
                    let new_state = dfa.add_state(DfaState {
                        transitions: vec![DEAD_STATE; num_classes],
                        accept: set_accept(nfa, &target_set),
                    });
                    state_map.insert(target_set.clone(), new_state);
                    worklist.push((target_set, new_state));
                    new_state
                }
            };
            dfa.set_transition(current_dfa_state, class_id, target_dfa_state);
        }
    }

    dfa
}

/// Run `dfa` from `from` over `input`; returns the last state reached
/// (possibly [`DEAD_STATE`]).
pub fn run(dfa: &Dfa, partition: &AlphabetPartition, from: StateId, input: &[u32]) -> StateId {
    let mut state = from;
    for &c in input {
        if state == DEAD_STATE {
            break;
        }
        state = dfa.transition(state, partition.classify(c));
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::nfa::NfaBuilder;
    use crate::automata::partition::compute_equivalence_classes;
    use crate::grammar::GrammarBuilder;

    #[test]
    fn test_keyword_priority_by_ordinal() {
        let mut b = GrammarBuilder::new();
        let kw = b.rx_literal("error");
        let letters = b.rx_range('a', 'z');
        let ident = b.rx_plus(letters);
        let grammar = b.finish();

        let mut builder = NfaBuilder::new(&grammar);
        builder.add_kind(kw, 1, false);
        builder.add_kind(ident, 2, false);
        let nfa = builder.finish();
        let partition = compute_equivalence_classes(&nfa);
        let dfa = subset_construction(&nfa, &partition);

        let chars: Vec<u32> = "error".chars().map(|c| c as u32).collect();
        let state = run(&dfa, &partition, dfa.start, &chars);
        assert_ne!(state, DEAD_STATE);
        assert_eq!(dfa.accept(state), Some(1));

        let chars: Vec<u32> = "errors".chars().map(|c| c as u32).collect();
        let state = run(&dfa, &partition, dfa.start, &chars);
        assert_eq!(dfa.accept(state), Some(2));
    }

    #[test]
    fn test_converging_paths_share_state() {
        // ("a"|"c") "b": after the shared tail both paths hold the same
        // NFA set and so the same DFA state.
        let mut b = GrammarBuilder::new();
        let a = b.rx_literal("a");
        let c = b.rx_literal("c");
        let head = b.rx_choice(vec![a, c]);
        let tail = b.rx_literal("b");
        let both = b.rx_seq(vec![head, tail]);
        let grammar = b.finish();

        let mut builder = NfaBuilder::new(&grammar);
        builder.add_kind(both, 1, false);
        let nfa = builder.finish();
        let partition = compute_equivalence_classes(&nfa);
        let dfa = subset_construction(&nfa, &partition);

        let after_a = run(&dfa, &partition, dfa.start, &['a' as u32]);
        let after_c = run(&dfa, &partition, dfa.start, &['c' as u32]);
        assert_ne!(after_a, DEAD_STATE);
        assert_ne!(after_c, DEAD_STATE);
        assert_eq!(dfa.accept(after_a), None);

        let after_ab = run(&dfa, &partition, dfa.start, &['a' as u32, 'b' as u32]);
        let after_cb = run(&dfa, &partition, dfa.start, &['c' as u32, 'b' as u32]);
        assert_ne!(after_ab, DEAD_STATE);
        assert_eq!(after_ab, after_cb);
        assert_eq!(dfa.accept(after_ab), Some(1));
    }

    #[test]
    fn test_shared_literal_prefix_shares_state() {
        let mut b = GrammarBuilder::new();
        let ab = b.rx_literal("ab");
        let ac = b.rx_literal("ac");
        let grammar = b.finish();

        let mut builder = NfaBuilder::new(&grammar);
        builder.add_kind(ab, 1, false);
        builder.add_kind(ac, 2, false);
        let nfa = builder.finish();
        let partition = compute_equivalence_classes(&nfa);
        let dfa = subset_construction(&nfa, &partition);

        let after_a = run(&dfa, &partition, dfa.start, &['a' as u32]);
        assert_ne!(after_a, DEAD_STATE);
        assert_eq!(dfa.accept(run(&dfa, &partition, after_a, &['b' as u32])), Some(1));
        assert_eq!(dfa.accept(run(&dfa, &partition, after_a, &['c' as u32])), Some(2));
        assert_eq!(dfa.states.len(), 4);
    }
}
