//! Bidirectional dependency graph between cells.
//!
//! For every key the graph holds the set of precedents (cells its
//! formula reads) and dependents (cells that read it), with the
//! symmetry invariant `b ∈ precedents(a) ⇔ a ∈ dependents(b)` kept on
//! every mutation. The graph drives recalculation ordering and is the
//! authoritative cycle detector.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::engine::CellKey;

#[derive(Default, Debug)]
struct DependencyEntry {
    precedents: FxHashSet<CellKey>,
    dependents: FxHashSet<CellKey>,
}

impl DependencyEntry {
    fn is_isolated(&self) -> bool {
        self.precedents.is_empty() && self.dependents.is_empty()
    }
}

#[derive(Default, Debug)]
pub struct DependencyGraph {
    entries: FxHashMap<CellKey, DependencyEntry>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph::default()
    }

    /// Replace the precedent set of `key`.
    ///
    /// The old edges are removed symmetrically first, so calling with
    /// an empty iterator is how a formula cell becomes a literal.
    pub fn update_dependencies<I>(&mut self, key: CellKey, precedents: I)
    where
        I: IntoIterator<Item = CellKey>,
    {
        self.clear_precedents(key);

        // Self-edges are recorded like any other so cycle detection
        // sees direct self-references.
        let mut added = 0usize;
        for prec in precedents {
            let inserted = self.entries.entry(key).or_default().precedents.insert(prec);
            if inserted {
                self.entries.entry(prec).or_default().dependents.insert(key);
                added += 1;
            }
        }
        self.drop_if_isolated(key);
        trace!(key = key.as_u64(), added, "dependencies updated");
    }

    fn clear_precedents(&mut self, key: CellKey) {
        let old: Vec<CellKey> = match self.entries.get_mut(&key) {
            Some(entry) => entry.precedents.drain().collect(),
            None => return,
        };
        for prec in old {
            if let Some(entry) = self.entries.get_mut(&prec) {
                entry.dependents.remove(&key);
                if entry.is_isolated() {
                    self.entries.remove(&prec);
                }
            }
        }
    }

    fn drop_if_isolated(&mut self, key: CellKey) {
        if self.entries.get(&key).is_some_and(|e| e.is_isolated()) {
            self.entries.remove(&key);
        }
    }

    /// Delete `key` from both sides of every edge, then delete its entry.
    pub fn remove_cell(&mut self, key: CellKey) {
        let Some(entry) = self.entries.remove(&key) else {
            return;
        };
        for prec in entry.precedents {
            if let Some(e) = self.entries.get_mut(&prec) {
                e.dependents.remove(&key);
                if e.is_isolated() {
                    self.entries.remove(&prec);
                }
            }
        }
        for dep in entry.dependents {
            if let Some(e) = self.entries.get_mut(&dep) {
                e.precedents.remove(&key);
                if e.is_isolated() {
                    self.entries.remove(&dep);
                }
            }
        }
        debug!(key = key.as_u64(), "cell removed from graph");
    }

    /// Cells whose formulas read `key`, in key order.
    pub fn dependents(&self, key: CellKey) -> Vec<CellKey> {
        self.sorted(self.entries.get(&key).map(|e| &e.dependents))
    }

    /// Cells read by `key`'s formula, in key order.
    pub fn precedents(&self, key: CellKey) -> Vec<CellKey> {
        self.sorted(self.entries.get(&key).map(|e| &e.precedents))
    }

    fn sorted(&self, set: Option<&FxHashSet<CellKey>>) -> Vec<CellKey> {
        let mut out: Vec<CellKey> = set.map(|s| s.iter().copied().collect()).unwrap_or_default();
        out.sort_unstable();
        out
    }

    /// Topologically ordered transitive dependent closure of the
    /// changed set.
    ///
    /// BFS collects the closure, then Kahn's algorithm runs restricted
    /// to edges whose endpoints are both inside it; ready-queue ties
    /// break by closure insertion order. Cells on a cycle cannot reach
    /// indegree zero and are appended afterwards in closure order so
    /// the caller still visits them (their evaluation surfaces
    /// `#CIRCULAR!`).
    pub fn recalculation_order(&self, changed: &[CellKey]) -> Vec<CellKey> {
        let mut closure: Vec<CellKey> = Vec::new();
        let mut in_closure: FxHashSet<CellKey> = FxHashSet::default();
        let mut queue: VecDeque<CellKey> = VecDeque::new();

        for &key in changed {
            if in_closure.insert(key) {
                closure.push(key);
                queue.push_back(key);
            }
        }
        while let Some(key) = queue.pop_front() {
            for dep in self.dependents(key) {
                if in_closure.insert(dep) {
                    closure.push(dep);
                    queue.push_back(dep);
                }
            }
        }

        let mut indegree: FxHashMap<CellKey, usize> = FxHashMap::default();
        for &key in &closure {
            let within = self
                .entries
                .get(&key)
                .map(|e| {
                    e.precedents
                        .iter()
                        .filter(|p| in_closure.contains(p))
                        .count()
                })
                .unwrap_or(0);
            indegree.insert(key, within);
        }

        let mut ready: VecDeque<CellKey> = closure
            .iter()
            .copied()
            .filter(|k| indegree[k] == 0)
            .collect();
        let mut order: Vec<CellKey> = Vec::with_capacity(closure.len());
        let mut emitted: FxHashSet<CellKey> = FxHashSet::default();

        while let Some(key) = ready.pop_front() {
            order.push(key);
            emitted.insert(key);
            for dep in self.dependents(key) {
                if let Some(count) = indegree.get_mut(&dep) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(dep);
                    }
                }
            }
        }

        if order.len() < closure.len() {
            let stragglers = closure.len() - order.len();
            debug!(stragglers, "recalculation closure contains a cycle");
            order.extend(closure.iter().copied().filter(|k| !emitted.contains(k)));
        }
        order
    }

    /// DFS over precedents with white/gray/black coloring; a gray
    /// revisit is a cycle. The stack is explicit so adversarial chains
    /// cannot exhaust the call stack.
    pub fn has_circular_reference(&self, start: CellKey) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            Gray,
            Black,
        }
        enum Step {
            Enter(CellKey),
            Exit(CellKey),
        }

        let mut color: FxHashMap<CellKey, Color> = FxHashMap::default();
        let mut stack = vec![Step::Enter(start)];

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(key) => match color.get(&key).copied() {
                    Some(Color::Gray) => return true,
                    Some(Color::Black) => {}
                    None => {
                        color.insert(key, Color::Gray);
                        stack.push(Step::Exit(key));
                        for prec in self.precedents(key) {
                            match color.get(&prec).copied() {
                                Some(Color::Gray) => return true,
                                Some(Color::Black) => {}
                                None => stack.push(Step::Enter(prec)),
                            }
                        }
                    }
                },
                Step::Exit(key) => {
                    color.insert(key, Color::Black);
                }
            }
        }
        false
    }

    /// The same DFS with the path recorded; when a cell on the current
    /// path is revisited, the slice from its first occurrence to the
    /// top is the cycle. Empty when no cycle is reachable.
    pub fn circular_reference_cells(&self, start: CellKey) -> Vec<CellKey> {
        let mut path: Vec<CellKey> = vec![start];
        let mut on_path: FxHashSet<CellKey> = FxHashSet::default();
        let mut done: FxHashSet<CellKey> = FxHashSet::default();
        let mut stack: Vec<(CellKey, Vec<CellKey>, usize)> =
            vec![(start, self.precedents(start), 0)];
        on_path.insert(start);

        loop {
            // Pull the next unexplored precedent of the stack top, or
            // retreat when the top is exhausted.
            let next = match stack.last_mut() {
                None => return Vec::new(),
                Some((_, precs, idx)) if *idx < precs.len() => {
                    let next = precs[*idx];
                    *idx += 1;
                    Some(next)
                }
                Some(_) => None,
            };

            match next {
                Some(next) => {
                    if on_path.contains(&next) {
                        let pos = path.iter().position(|&k| k == next).unwrap_or(0);
                        return path[pos..].to_vec();
                    }
                    if !done.contains(&next) {
                        let next_precs = self.precedents(next);
                        stack.push((next, next_precs, 0));
                        path.push(next);
                        on_path.insert(next);
                    }
                }
                None => {
                    if let Some((key, _, _)) = stack.pop() {
                        done.insert(key);
                        on_path.remove(&key);
                        path.pop();
                    }
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cells with at least one edge.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Debug-only check of the bidirectional symmetry invariant.
    #[cfg(test)]
    fn assert_symmetric(&self) {
        for (&key, entry) in &self.entries {
            for prec in &entry.precedents {
                assert!(
                    self.entries[prec].dependents.contains(&key),
                    "asymmetric edge {key:?} -> {prec:?}"
                );
            }
            for dep in &entry.dependents {
                assert!(
                    self.entries[dep].precedents.contains(&key),
                    "asymmetric edge {dep:?} -> {key:?}"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(row: u32, col: u32) -> CellKey {
        CellKey::new(0, row, col)
    }

    #[test]
    fn edges_are_symmetric() {
        let mut g = DependencyGraph::new();
        // B1 = A1 + A2
        g.update_dependencies(key(0, 1), [key(0, 0), key(1, 0)]);
        assert_eq!(g.precedents(key(0, 1)), vec![key(0, 0), key(1, 0)]);
        assert_eq!(g.dependents(key(0, 0)), vec![key(0, 1)]);
        assert_eq!(g.dependents(key(1, 0)), vec![key(0, 1)]);
        g.assert_symmetric();
    }

    #[test]
    fn update_replaces_old_edges() {
        let mut g = DependencyGraph::new();
        g.update_dependencies(key(0, 1), [key(0, 0)]);
        g.update_dependencies(key(0, 1), [key(1, 0)]);
        assert_eq!(g.precedents(key(0, 1)), vec![key(1, 0)]);
        assert!(g.dependents(key(0, 0)).is_empty());
        g.assert_symmetric();

        // Clearing to no precedents drops the entry entirely.
        g.update_dependencies(key(0, 1), []);
        assert!(g.is_empty());
    }

    #[test]
    fn remove_cell_deletes_both_sides() {
        let mut g = DependencyGraph::new();
        g.update_dependencies(key(0, 1), [key(0, 0)]);
        g.update_dependencies(key(0, 2), [key(0, 1)]);
        g.remove_cell(key(0, 1));
        assert!(g.dependents(key(0, 0)).is_empty());
        assert!(g.precedents(key(0, 2)).is_empty());
        g.assert_symmetric();
    }

    #[test]
    fn recalculation_order_respects_edges() {
        let mut g = DependencyGraph::new();
        // C1 = B1, B1 = A1
        g.update_dependencies(key(0, 1), [key(0, 0)]);
        g.update_dependencies(key(0, 2), [key(0, 1)]);

        let order = g.recalculation_order(&[key(0, 0)]);
        assert_eq!(order, vec![key(0, 0), key(0, 1), key(0, 2)]);
    }

    #[test]
    fn recalculation_order_is_a_closure_permutation() {
        let mut g = DependencyGraph::new();
        // D1 = B1 + C1; B1 = A1; C1 = A1
        g.update_dependencies(key(0, 1), [key(0, 0)]);
        g.update_dependencies(key(0, 2), [key(0, 0)]);
        g.update_dependencies(key(0, 3), [key(0, 1), key(0, 2)]);

        let order = g.recalculation_order(&[key(0, 0)]);
        assert_eq!(order.len(), 4);
        let pos = |k: CellKey| order.iter().position(|&x| x == k).unwrap();
        assert!(pos(key(0, 0)) < pos(key(0, 1)));
        assert!(pos(key(0, 0)) < pos(key(0, 2)));
        assert!(pos(key(0, 1)) < pos(key(0, 3)));
        assert!(pos(key(0, 2)) < pos(key(0, 3)));
    }

    #[test]
    fn recalculation_order_ignores_edges_outside_closure() {
        let mut g = DependencyGraph::new();
        // B1 = A1 + Z9; changing A1 must not wait on Z9.
        g.update_dependencies(key(0, 1), [key(0, 0), key(8, 25)]);
        let order = g.recalculation_order(&[key(0, 0)]);
        assert_eq!(order, vec![key(0, 0), key(0, 1)]);
    }

    #[test]
    fn cycle_cells_still_appear_in_order() {
        let mut g = DependencyGraph::new();
        g.update_dependencies(key(0, 0), [key(0, 1)]);
        g.update_dependencies(key(0, 1), [key(0, 0)]);
        let order = g.recalculation_order(&[key(0, 0)]);
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn detects_three_cell_cycle() {
        let mut g = DependencyGraph::new();
        // A1 = B1, B1 = C1, C1 = A1
        g.update_dependencies(key(0, 0), [key(0, 1)]);
        g.update_dependencies(key(0, 1), [key(0, 2)]);
        g.update_dependencies(key(0, 2), [key(0, 0)]);

        assert!(g.has_circular_reference(key(0, 0)));
        let cycle = g.circular_reference_cells(key(0, 0));
        assert_eq!(cycle.len(), 3);
        // The recorded cycle must close through precedents.
        let first = cycle[0];
        let last = *cycle.last().unwrap();
        assert!(g.precedents(last).contains(&first));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let mut g = DependencyGraph::new();
        g.update_dependencies(key(0, 0), [key(0, 0)]);
        assert!(g.has_circular_reference(key(0, 0)));
        assert_eq!(g.circular_reference_cells(key(0, 0)), vec![key(0, 0)]);
    }

    #[test]
    fn acyclic_chain_has_no_cycle() {
        let mut g = DependencyGraph::new();
        g.update_dependencies(key(0, 1), [key(0, 0)]);
        g.update_dependencies(key(0, 2), [key(0, 1)]);
        assert!(!g.has_circular_reference(key(0, 2)));
        assert!(g.circular_reference_cells(key(0, 2)).is_empty());
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let mut g = DependencyGraph::new();
        // D = B + C, B = A, C = A: A visited twice but never gray.
        g.update_dependencies(key(0, 1), [key(0, 0)]);
        g.update_dependencies(key(0, 2), [key(0, 0)]);
        g.update_dependencies(key(0, 3), [key(0, 1), key(0, 2)]);
        assert!(!g.has_circular_reference(key(0, 3)));
    }

    #[test]
    fn clear_and_len() {
        let mut g = DependencyGraph::new();
        g.update_dependencies(key(0, 1), [key(0, 0)]);
        assert_eq!(g.len(), 2);
        g.clear();
        assert!(g.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        proptest! {
            #[test]
            fn random_graphs_stay_symmetric(
                edges in proptest::collection::vec((0u32..8, 0u32..8), 0..32)
            ) {
                let mut by_src: BTreeMap<u32, Vec<CellKey>> = BTreeMap::new();
                for &(src, dst) in &edges {
                    by_src.entry(src).or_default().push(key(dst, 0));
                }
                let mut g = DependencyGraph::new();
                for (src, precs) in by_src {
                    g.update_dependencies(key(src, 0), precs);
                }
                g.assert_symmetric();

                // The recalculation order never emits a key twice and
                // always covers the whole closure.
                let order = g.recalculation_order(&[key(0, 0)]);
                let unique: FxHashSet<CellKey> = order.iter().copied().collect();
                prop_assert_eq!(unique.len(), order.len());
                prop_assert!(order.contains(&key(0, 0)));
            }
        }
    }
}
