//! The character-level acceptance automaton and its construction machinery.
//!
//! Compilation builds a Thompson NFA from schema fragments, then subset
//! construction produces the deterministic automaton sessions step through.

use std::collections::HashMap;

/// Index of a state in the deterministic automaton.
///
/// Sessions store this single integer as their whole constraint state.
pub type StateId = u32;

/// An inclusive range of Unicode scalar values labelling an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CharRange {
    pub lo: u32,
    pub hi: u32,
}

impl CharRange {
    pub(crate) fn single(c: char) -> Self {
        Self {
            lo: c as u32,
            hi: c as u32,
        }
    }

    pub(crate) fn new(lo: char, hi: char) -> Self {
        Self {
            lo: lo as u32,
            hi: hi as u32,
        }
    }

    fn contains(&self, c: u32) -> bool {
        self.lo <= c && c <= self.hi
    }
}

/// Nondeterministic automaton under construction.
#[derive(Default)]
pub(crate) struct Nfa {
    states: Vec<NfaState>,
}

#[derive(Default)]
struct NfaState {
    eps: Vec<usize>,
    edges: Vec<(CharRange, usize)>,
}

/// A sub-automaton with one entry and one exit state.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frag {
    pub start: usize,
    pub end: usize,
}

impl Nfa {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&mut self) -> usize {
        self.states.push(NfaState::default());
        self.states.len() - 1
    }

    pub fn eps(&mut self, from: usize, to: usize) {
        self.states[from].eps.push(to);
    }

    pub fn edge(&mut self, from: usize, range: CharRange, to: usize) {
        self.states[from].edges.push((range, to));
    }

    /// A fragment matching the literal string exactly.
    pub fn lit(&mut self, text: &str) -> Frag {
        let start = self.state();
        let mut cur = start;
        for c in text.chars() {
            let next = self.state();
            self.edge(cur, CharRange::single(c), next);
            cur = next;
        }
        Frag { start, end: cur }
    }

    /// A fragment matching exactly one character from the given ranges.
    pub fn class(&mut self, ranges: &[CharRange]) -> Frag {
        let start = self.state();
        let end = self.state();
        for range in ranges {
            self.edge(start, *range, end);
        }
        Frag { start, end }
    }

    /// Concatenation: `a` then `b`.
    pub fn seq(&mut self, a: Frag, b: Frag) -> Frag {
        self.eps(a.end, b.start);
        Frag {
            start: a.start,
            end: b.end,
        }
    }

    /// Alternation over the given fragments.
    pub fn alt(&mut self, options: &[Frag]) -> Frag {
        let start = self.state();
        let end = self.state();
        for opt in options {
            self.eps(start, opt.start);
            self.eps(opt.end, end);
        }
        Frag { start, end }
    }

    /// Zero-or-one occurrence.
    pub fn opt(&mut self, inner: Frag) -> Frag {
        let start = self.state();
        let end = self.state();
        self.eps(start, inner.start);
        self.eps(start, end);
        self.eps(inner.end, end);
        Frag { start, end }
    }

    /// Zero-or-more occurrences.
    pub fn star(&mut self, inner: Frag) -> Frag {
        let start = self.state();
        let end = self.state();
        self.eps(start, inner.start);
        self.eps(start, end);
        self.eps(inner.end, inner.start);
        self.eps(inner.end, end);
        Frag { start, end }
    }

    /// One-or-more occurrences.
    pub fn plus(&mut self, inner: Frag) -> Frag {
        let start = self.state();
        let end = self.state();
        self.eps(start, inner.start);
        self.eps(inner.end, end);
        self.eps(inner.end, inner.start);
        Frag { start, end }
    }

    fn closure(&self, seed: &[usize]) -> Vec<usize> {
        let mut stack: Vec<usize> = seed.to_vec();
        let mut seen: Vec<usize> = seed.to_vec();
        while let Some(s) = stack.pop() {
            for &t in &self.states[s].eps {
                if !seen.contains(&t) {
                    seen.push(t);
                    stack.push(t);
                }
            }
        }
        seen.sort_unstable();
        seen.dedup();
        seen
    }
}

#[derive(Debug)]
struct DfaState {
    /// Sorted, disjoint outgoing edges.
    edges: Vec<(CharRange, StateId)>,
    accepting: bool,
}

/// Outcome of advancing the automaton over a piece of generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// All characters consumed; the document is not yet complete.
    Advanced(StateId),
    /// The document completed after `consumed` bytes of the input; any
    /// remainder must be discarded by the caller.
    Complete {
        /// State reached at the completion point.
        state: StateId,
        /// Byte offset into the input at which the document completed.
        consumed: usize,
    },
    /// The text cannot extend any schema-valid output from this state.
    Rejected,
}

/// Deterministic character-level acceptor derived from a JSON Schema.
///
/// Read-only after construction; share via `Arc` across sessions.
#[derive(Debug)]
pub struct ConstraintAutomaton {
    states: Vec<DfaState>,
}

impl ConstraintAutomaton {
    /// The initial state for a fresh session.
    #[must_use]
    pub fn start_state(&self) -> StateId {
        0
    }

    /// Returns `true` if a document ending in this state is schema-valid.
    #[must_use]
    pub fn is_accepting(&self, state: StateId) -> bool {
        self.states[state as usize].accepting
    }

    /// Returns `true` if any continuation exists from this state.
    #[must_use]
    pub fn has_transitions(&self, state: StateId) -> bool {
        !self.states[state as usize].edges.is_empty()
    }

    /// Number of deterministic states (diagnostics and tests).
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    fn step_char(&self, state: StateId, c: char) -> Option<StateId> {
        let code = c as u32;
        self.states[state as usize]
            .edges
            .iter()
            .find(|(range, _)| range.contains(code))
            .map(|&(_, target)| target)
    }

    /// Advances the automaton over `text`, consuming characters greedily.
    ///
    /// Mid-text dead ends are a completion when the current state accepts
    /// (the caller truncates the delta there) and a rejection otherwise.
    #[must_use]
    pub fn advance(&self, state: StateId, text: &str) -> Step {
        let mut current = state;
        for (idx, c) in text.char_indices() {
            match self.step_char(current, c) {
                Some(next) => current = next,
                None => {
                    if self.is_accepting(current) {
                        return Step::Complete {
                            state: current,
                            consumed: idx,
                        };
                    }
                    return Step::Rejected;
                }
            }
        }
        if self.is_accepting(current) && !self.has_transitions(current) {
            Step::Complete {
                state: current,
                consumed: text.len(),
            }
        } else {
            Step::Advanced(current)
        }
    }

    /// Returns `true` if `text` is admissible from `state` (used as the
    /// backend token-mask predicate).
    #[must_use]
    pub fn admits(&self, state: StateId, text: &str) -> bool {
        !matches!(self.advance(state, text), Step::Rejected)
    }

    /// Subset construction from an NFA fragment.
    pub(crate) fn determinize(nfa: &Nfa, start: usize, accept: usize) -> Self {
        let mut states: Vec<DfaState> = Vec::new();
        let mut ids: HashMap<Vec<usize>, StateId> = HashMap::new();
        let mut worklist: Vec<Vec<usize>> = Vec::new();

        let initial = nfa.closure(&[start]);
        ids.insert(initial.clone(), 0);
        states.push(DfaState {
            edges: Vec::new(),
            accepting: initial.contains(&accept),
        });
        worklist.push(initial);

        while let Some(set) = worklist.pop() {
            let id = ids[&set];

            // Collect outgoing labelled edges of every member state and
            // split them into atomic intervals at range boundaries.
            let mut edges: Vec<(CharRange, usize)> = Vec::new();
            for &s in &set {
                edges.extend(nfa.states[s].edges.iter().copied());
            }
            if edges.is_empty() {
                continue;
            }

            let mut bounds: Vec<u32> = Vec::with_capacity(edges.len() * 2);
            for (range, _) in &edges {
                bounds.push(range.lo);
                bounds.push(range.hi + 1);
            }
            bounds.sort_unstable();
            bounds.dedup();

            let mut out: Vec<(CharRange, StateId)> = Vec::new();
            for pair in bounds.windows(2) {
                let (lo, hi) = (pair[0], pair[1] - 1);
                let mut targets: Vec<usize> = edges
                    .iter()
                    .filter(|(range, _)| range.lo <= lo && hi <= range.hi)
                    .map(|&(_, t)| t)
                    .collect();
                if targets.is_empty() {
                    continue;
                }
                targets.sort_unstable();
                targets.dedup();
                let closed = nfa.closure(&targets);

                let target_id = match ids.get(&closed) {
                    Some(&existing) => existing,
                    None => {
                        let new_id = states.len() as StateId;
                        ids.insert(closed.clone(), new_id);
                        states.push(DfaState {
                            edges: Vec::new(),
                            accepting: closed.contains(&accept),
                        });
                        worklist.push(closed);
                        new_id
                    }
                };

                // Merge with the previous interval when contiguous and
                // pointing at the same state.
                if let Some(last) = out.last_mut() {
                    if last.1 == target_id && last.0.hi + 1 == lo {
                        last.0.hi = hi;
                        continue;
                    }
                }
                out.push((CharRange { lo, hi }, target_id));
            }

            states[id as usize].edges = out;
        }

        tracing::debug!(states = states.len(), "Compiled constraint automaton");
        Self { states }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal_automaton(text: &str) -> ConstraintAutomaton {
        let mut nfa = Nfa::new();
        let frag = nfa.lit(text);
        ConstraintAutomaton::determinize(&nfa, frag.start, frag.end)
    }

    #[test]
    fn literal_accepts_exactly_itself() {
        let dfa = literal_automaton("null");
        let s = dfa.start_state();
        assert!(matches!(
            dfa.advance(s, "null"),
            Step::Complete { consumed: 4, .. }
        ));
        assert!(matches!(dfa.advance(s, "nul"), Step::Advanced(_)));
        assert!(matches!(dfa.advance(s, "nil"), Step::Rejected));
    }

    #[test]
    fn alternation_and_star() {
        // (ab)* over a two-char alphabet.
        let mut nfa = Nfa::new();
        let ab = nfa.lit("ab");
        let frag = nfa.star(ab);
        let dfa = ConstraintAutomaton::determinize(&nfa, frag.start, frag.end);
        let s = dfa.start_state();

        // Empty input is already accepting but can continue.
        assert!(dfa.is_accepting(s));
        match dfa.advance(s, "abab") {
            Step::Advanced(state) => assert!(dfa.is_accepting(state)),
            other => panic!("unexpected step: {other:?}"),
        }
        assert!(matches!(dfa.advance(s, "aba"), Step::Advanced(_)));
        assert!(matches!(dfa.advance(s, "ba"), Step::Rejected));
    }

    #[test]
    fn mid_text_completion_truncates() {
        let dfa = literal_automaton("true");
        let s = dfa.start_state();
        match dfa.advance(s, "true}") {
            Step::Complete { consumed, .. } => assert_eq!(consumed, 4),
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn char_class_ranges() {
        let mut nfa = Nfa::new();
        let digit = nfa.class(&[CharRange::new('0', '9')]);
        let frag = nfa.plus(digit);
        let dfa = ConstraintAutomaton::determinize(&nfa, frag.start, frag.end);
        let s = dfa.start_state();
        assert!(matches!(dfa.advance(s, "123"), Step::Advanced(_)));
        assert!(matches!(dfa.advance(s, "x"), Step::Rejected));
    }
}
