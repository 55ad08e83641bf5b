//! Object Reference Graph for iWork Documents
//!
//! Every `MessageInfo` lists the identifiers its payload refers to. Collecting
//! those lists gives a graph of the document without decoding a single payload,
//! which is how objects whose schema is unknown still show up as referrers.
//!
//! The graph is informational: decoding never consults it.

use std::collections::{HashMap, HashSet, VecDeque};

use smallvec::SmallVec;

/// Edge list for one object; most objects reference only a handful of others
type Edges = SmallVec<[u64; 4]>;

/// Bidirectional graph of object references
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    /// Object ID to the objects it references
    outgoing: HashMap<u64, Edges>,
    /// Object ID to the objects referencing it
    incoming: HashMap<u64, Edges>,
    edge_count: usize,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `source` references `target`. Duplicate edges are ignored.
    pub fn add_reference(&mut self, source: u64, target: u64) {
        let outgoing = self.outgoing.entry(source).or_default();
        if outgoing.contains(&target) {
            return;
        }
        outgoing.push(target);
        self.incoming.entry(target).or_default().push(source);
        self.edge_count += 1;
    }

    /// Record every reference listed for `source`
    pub fn add_references(&mut self, source: u64, targets: &[u64]) {
        for &target in targets {
            self.add_reference(source, target);
        }
    }

    /// Objects referenced by `id`, in first-seen order
    pub fn outgoing(&self, id: u64) -> &[u64] {
        self.outgoing.get(&id).map_or(&[], |edges| edges.as_slice())
    }

    /// Objects that reference `id`, in first-seen order
    pub fn incoming(&self, id: u64) -> &[u64] {
        self.incoming.get(&id).map_or(&[], |edges| edges.as_slice())
    }

    /// Iterate over every `(source, target)` edge
    pub fn edges(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.outgoing
            .iter()
            .flat_map(|(&source, targets)| targets.iter().map(move |&target| (source, target)))
    }

    /// Every object reachable from `start` (breadth-first, `start` first)
    pub fn reachable_from(&self, start: u64) -> Vec<u64> {
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut order = Vec::new();

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &next in self.outgoing(node) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        order
    }

    /// Whether a reference cycle is reachable from `start`.
    ///
    /// Iterative depth-first search, so deep chains cannot overflow the stack.
    pub fn has_cycle_from(&self, start: u64) -> bool {
        let mut finished = HashSet::new();
        let mut on_path = HashSet::from([start]);
        // (node, index of the next edge to follow)
        let mut stack = vec![(start, 0usize)];

        while let Some(top) = stack.last_mut() {
            let (node, edge_index) = *top;
            top.1 += 1;

            if let Some(&child) = self.outgoing(node).get(edge_index) {
                if on_path.contains(&child) {
                    return true;
                }
                if !finished.contains(&child) {
                    on_path.insert(child);
                    stack.push((child, 0));
                }
            } else {
                on_path.remove(&node);
                finished.insert(node);
                stack.pop();
            }
        }

        false
    }

    /// Append another graph's edges after this one's
    pub fn merge(&mut self, other: ReferenceGraph) {
        for (source, targets) in other.outgoing {
            self.add_references(source, &targets);
        }
    }

    /// Number of distinct edges
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count == 0
    }
}
