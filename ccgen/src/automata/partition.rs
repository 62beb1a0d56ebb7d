//! Alphabet equivalence class partitioning.
//!
//! Splits the character range `0..=MAX_CHAR` into intervals at every
//! transition boundary, then merges intervals that behave identically
//! across all NFA states. The DFA's transition rows are indexed by the
//! resulting class ids, which keeps tables small even for grammars that use
//! wide Unicode ranges.

use super::{ClassId, Nfa, MAX_CHAR};

/// Mapping from character to equivalence class.
#[derive(Debug, Clone)]
pub struct AlphabetPartition {
    /// Sorted interval start points; `interval_starts[0]` is always 0.
    pub interval_starts: Vec<u32>,
    /// Class of each interval.
    pub interval_class: Vec<ClassId>,
    pub num_classes: usize,
    /// A character from each class.
    pub class_representatives: Vec<u32>,
}

impl AlphabetPartition {
    /// Look up the equivalence class for a character.
    pub fn classify(&self, c: u32) -> ClassId {
        let c = c.min(MAX_CHAR);
        let index = match self.interval_starts.binary_search(&c) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        self.interval_class[index]
    }

    /// Inclusive `(lo, hi, class)` intervals covering the whole alphabet.
    pub fn intervals(&self) -> Vec<(u32, u32, ClassId)> {
        let n = self.interval_starts.len();
        (0..n)
            .map(|i| {
                let hi = if i + 1 < n { self.interval_starts[i + 1] - 1 } else { MAX_CHAR };
                (self.interval_starts[i], hi, self.interval_class[i])
            })
            .collect()
    }
}

/// Compute equivalence classes from an NFA.
///
/// Two characters are equivalent if and only if they trigger the same
/// transitions in every NFA state.
pub fn compute_equivalence_classes(nfa: &Nfa) -> AlphabetPartition {
    let mut cuts: Vec<u32> = vec![0];
    for state in &nfa.states {
        for (class, _) in &state.transitions {
            let (lo, hi) = class.bounds();
            cuts.push(lo);
            if hi < MAX_CHAR {
                cuts.push(hi + 1);
            }
        }
    }
    cuts.sort_unstable();
    cuts.dedup();

    // Signature: (state, sorted targets) for every state with a move on the
    // interval's representative.
    type Signature = Vec<(u32, Vec<u32>)>;
    let mut targets_buf: Vec<u32> = Vec::new();
    let mut sig_to_class: Vec<(Signature, ClassId)> = Vec::new();
    let mut interval_class = Vec::with_capacity(cuts.len());
    let mut class_representatives = Vec::new();

    for &rep in &cuts {
        let mut sig: Signature = Vec::new();
        for (state_idx, state) in nfa.states.iter().enumerate() {
            targets_buf.clear();
            for (class, target) in &state.transitions {
                if class.contains(rep) {
                    targets_buf.push(*target);
                }
            }
            if !targets_buf.is_empty() {
                targets_buf.sort_unstable();
                targets_buf.dedup();
                sig.push((state_idx as u32, targets_buf.clone()));
            }
        }
        let class = match sig_to_class.iter().find(|(s, _)| *s == sig) {
            Some((_, existing)) => *existing,
            None => {
                let new_class = sig_to_class.len() as ClassId;
                sig_to_class.push((sig, new_class));
                class_representatives.push(rep);
                new_class
            }
        };
        interval_class.push(class);
    }

    AlphabetPartition {
        interval_starts: cuts,
        interval_class,
        num_classes: sig_to_class.len(),
        class_representatives,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::{CharClass, NfaState};

    #[test]
    fn test_equivalence_classes_simple() {
        let mut nfa = Nfa::new();
        let ident = nfa.add_state(NfaState::accepting(1));
        let plus = nfa.add_state(NfaState::accepting(2));
        nfa.add_transition(0, ident, CharClass::Range('a' as u32, 'z' as u32));
        nfa.add_transition(ident, ident, CharClass::Range('a' as u32, 'z' as u32));
        nfa.add_transition(ident, ident, CharClass::Range('0' as u32, '9' as u32));
        nfa.add_transition(0, plus, CharClass::Single('+' as u32));

        let partition = compute_equivalence_classes(&nfa);

        assert_ne!(partition.classify('+' as u32), partition.classify('*' as u32));
        assert_eq!(partition.classify('a' as u32), partition.classify('q' as u32));
        assert_eq!(partition.classify('0' as u32), partition.classify('9' as u32));
        assert_ne!(partition.classify('a' as u32), partition.classify('0' as u32));
        // Everything unused shares one class.
        assert_eq!(partition.classify('*' as u32), partition.classify(0x4e00));
        assert_eq!(partition.num_classes, 4);
    }

    #[test]
    fn test_intervals_cover_alphabet() {
        let mut nfa = Nfa::new();
        let s = nfa.add_state(NfaState::accepting(1));
        nfa.add_transition(0, s, CharClass::Range(10, 20));
        let partition = compute_equivalence_classes(&nfa);
        let intervals = partition.intervals();
        assert_eq!(intervals.first().map(|i| i.0), Some(0));
        assert_eq!(intervals.last().map(|i| i.1), Some(MAX_CHAR));
        for pair in intervals.windows(2) {
            assert_eq!(pair[0].1 + 1, pair[1].0);
        }
    }
}
