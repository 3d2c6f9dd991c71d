//! Dependency graph over work items, with cycle detection and leveling

use crate::model::{ItemId, WorkItem};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Supplies "depends-on" pairs `(from, to)` for a set of items.
///
/// Implementations do the static analysis (imports, includes, ...); the graph
/// only consumes identifier pairs.
pub trait CrossReferenceExtractor: Send + Sync {
    fn extract(&self, items: &[WorkItem]) -> Vec<(ItemId, ItemId)>;
}

/// Directed graph where an edge `a -> b` means "a depends on b".
///
/// Nodes live in an index arena; every algorithm below walks it with explicit
/// stacks so deep dependency chains cannot overflow the call stack.
pub struct DependencyGraph {
    inner: DiGraph<ItemId, ()>,
    index: HashMap<ItemId, NodeIndex>,
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("item_count", &self.inner.node_count())
            .field("dependency_count", &self.inner.edge_count())
            .finish()
    }
}

/// Summary numbers for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyStats {
    pub items: usize,
    pub dependencies: usize,
    pub items_with_dependencies: usize,
}

/// One DFS frame: a node, its dependency list and how far we got through it.
struct Frame {
    node: NodeIndex,
    deps: Vec<NodeIndex>,
    next: usize,
    deepest: Option<u32>,
}

impl Frame {
    fn raise(&mut self, level: u32) {
        self.deepest = Some(self.deepest.map_or(level, |d| d.max(level)));
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph {
            inner: DiGraph::new(),
            index: HashMap::new(),
        }
    }

    /// Build the graph for `items`. Pairs naming unknown items are dropped, as
    /// are self-edges and duplicates.
    pub fn build(items: &[WorkItem], pairs: impl IntoIterator<Item = (ItemId, ItemId)>) -> Self {
        Self::from_ids(items.iter().map(|item| item.id.clone()), pairs)
    }

    /// Same as [`DependencyGraph::build`] but from bare identifiers.
    pub fn from_ids(
        ids: impl IntoIterator<Item = ItemId>,
        pairs: impl IntoIterator<Item = (ItemId, ItemId)>,
    ) -> Self {
        let mut graph = DependencyGraph::new();
        for id in ids {
            graph.add_item(id);
        }
        for (from, to) in pairs {
            graph.add_dependency(&from, &to);
        }
        graph
    }

    /// Add an item. Returns its existing index if already present.
    pub fn add_item(&mut self, id: ItemId) -> NodeIndex {
        if let Some(&idx) = self.index.get(&id) {
            return idx;
        }
        let idx = self.inner.add_node(id.clone());
        self.index.insert(id, idx);
        idx
    }

    /// Record that `from` depends on `to`. Returns false if the edge was dropped.
    pub fn add_dependency(&mut self, from: &ItemId, to: &ItemId) -> bool {
        if from == to {
            return false;
        }
        let (Some(&a), Some(&b)) = (self.index.get(from), self.index.get(to)) else {
            tracing::debug!("Dropping dependency {} -> {}: unknown item", from, to);
            return false;
        };
        self.inner.update_edge(a, b, ());
        true
    }

    pub fn item_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.index.contains_key(id)
    }

    /// Direct dependencies of an item, sorted.
    pub fn dependencies(&self, id: &ItemId) -> Vec<ItemId> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut deps: Vec<ItemId> = self
            .inner
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.inner[n].clone())
            .collect();
        deps.sort();
        deps
    }

    pub fn stats(&self) -> DependencyStats {
        let items_with_dependencies = self
            .inner
            .node_indices()
            .filter(|&n| self.inner.neighbors_directed(n, Direction::Outgoing).next().is_some())
            .count();
        DependencyStats {
            items: self.item_count(),
            dependencies: self.dependency_count(),
            items_with_dependencies,
        }
    }

    fn deps_of(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self
            .inner
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        deps.sort_by(|a, b| self.inner[*a].cmp(&self.inner[*b]));
        deps
    }

    /// Nodes in id order, so every traversal is deterministic.
    fn ordered_nodes(&self) -> Vec<NodeIndex> {
        let mut nodes: Vec<NodeIndex> = self.inner.node_indices().collect();
        nodes.sort_by(|a, b| self.inner[*a].cmp(&self.inner[*b]));
        nodes
    }

    /// Find dependency cycles. Each cycle is reported as the path from its
    /// entry point back to itself, e.g. `[a, b, a]`.
    pub fn detect_cycles(&self) -> Vec<Vec<ItemId>> {
        let n = self.inner.node_count();
        let mut visited = vec![false; n];
        let mut on_stack = vec![false; n];
        let mut cycles = Vec::new();

        for start in self.ordered_nodes() {
            if visited[start.index()] {
                continue;
            }
            visited[start.index()] = true;
            on_stack[start.index()] = true;
            let mut stack = vec![Frame {
                node: start,
                deps: self.deps_of(start),
                next: 0,
                deepest: None,
            }];

            loop {
                let Some(frame) = stack.last_mut() else { break };
                if frame.next < frame.deps.len() {
                    let dep = frame.deps[frame.next];
                    frame.next += 1;
                    if !visited[dep.index()] {
                        visited[dep.index()] = true;
                        on_stack[dep.index()] = true;
                        stack.push(Frame {
                            node: dep,
                            deps: self.deps_of(dep),
                            next: 0,
                            deepest: None,
                        });
                    } else if on_stack[dep.index()] {
                        let entry = stack.iter().position(|f| f.node == dep).unwrap_or(0);
                        let mut cycle: Vec<ItemId> = stack[entry..]
                            .iter()
                            .map(|f| self.inner[f.node].clone())
                            .collect();
                        cycle.push(self.inner[dep].clone());
                        cycles.push(cycle);
                    }
                } else {
                    on_stack[frame.node.index()] = false;
                    stack.pop();
                }
            }
        }

        for cycle in &cycles {
            let names: Vec<&str> = cycle.iter().map(ItemId::as_str).collect();
            tracing::warn!("Dependency cycle: {}", names.join(" -> "));
        }
        cycles
    }

    /// Assign a level to every item: 0 without dependencies, otherwise one more
    /// than the deepest dependency.
    ///
    /// Exact on acyclic parts of the graph. When the walk re-enters a node that
    /// is still on the current path it stops there and uses one more than the
    /// highest level assigned so far, which breaks the cycle deterministically.
    pub fn levels(&self) -> HashMap<ItemId, u32> {
        let n = self.inner.node_count();
        let mut level: Vec<Option<u32>> = vec![None; n];
        let mut on_stack = vec![false; n];
        let mut max_assigned: Option<u32> = None;

        for start in self.ordered_nodes() {
            if level[start.index()].is_some() {
                continue;
            }
            on_stack[start.index()] = true;
            let mut stack = vec![Frame {
                node: start,
                deps: self.deps_of(start),
                next: 0,
                deepest: None,
            }];

            loop {
                let Some(frame) = stack.last_mut() else { break };
                if frame.next < frame.deps.len() {
                    let dep = frame.deps[frame.next];
                    frame.next += 1;

                    if let Some(known) = level[dep.index()] {
                        frame.raise(known);
                        continue;
                    }
                    if on_stack[dep.index()] {
                        let broken = max_assigned.map_or(0, |m| m + 1);
                        tracing::warn!(
                            "Cycle through {} while leveling {}; using level {}",
                            self.inner[dep],
                            self.inner[frame.node],
                            broken
                        );
                        frame.raise(broken);
                        continue;
                    }

                    on_stack[dep.index()] = true;
                    stack.push(Frame {
                        node: dep,
                        deps: self.deps_of(dep),
                        next: 0,
                        deepest: None,
                    });
                } else {
                    let node = frame.node;
                    let assigned = frame.deepest.map_or(0, |d| d + 1);
                    stack.pop();
                    on_stack[node.index()] = false;
                    level[node.index()] = Some(assigned);
                    max_assigned = Some(max_assigned.map_or(assigned, |m| m.max(assigned)));
                    if let Some(parent) = stack.last_mut() {
                        parent.raise(assigned);
                    }
                }
            }
        }

        self.inner
            .node_indices()
            .map(|idx| (self.inner[idx].clone(), level[idx.index()].unwrap_or(0)))
            .collect()
    }

    /// Items grouped by level, lowest level first. Each group is sorted.
    pub fn level_groups(&self) -> Vec<Vec<ItemId>> {
        let mut grouped: BTreeMap<u32, Vec<ItemId>> = BTreeMap::new();
        for (id, level) in self.levels() {
            grouped.entry(level).or_default().push(id);
        }
        grouped
            .into_values()
            .map(|mut group| {
                group.sort();
                group
            })
            .collect()
    }

    /// Linear order with dependencies before dependents. Items caught in
    /// cycles cannot be ordered and are appended at the end, sorted.
    pub fn topological_order(&self) -> Vec<ItemId> {
        let n = self.inner.node_count();
        let mut pending: Vec<usize> = self
            .inner
            .node_indices()
            .map(|idx| self.inner.neighbors_directed(idx, Direction::Outgoing).count())
            .collect();

        let mut queue: VecDeque<NodeIndex> = self
            .ordered_nodes()
            .into_iter()
            .filter(|idx| pending[idx.index()] == 0)
            .collect();
        let mut emitted = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while let Some(idx) = queue.pop_front() {
            emitted[idx.index()] = true;
            order.push(self.inner[idx].clone());

            let mut dependents: Vec<NodeIndex> = self
                .inner
                .neighbors_directed(idx, Direction::Incoming)
                .collect();
            dependents.sort_by(|a, b| self.inner[*a].cmp(&self.inner[*b]));
            for dependent in dependents {
                pending[dependent.index()] -= 1;
                if pending[dependent.index()] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        let mut remaining: Vec<ItemId> = self
            .inner
            .node_indices()
            .filter(|idx| !emitted[idx.index()])
            .map(|idx| self.inner[idx].clone())
            .collect();
        if !remaining.is_empty() {
            tracing::warn!("{} items are in dependency cycles, ordering them last", remaining.len());
            remaining.sort();
            order.extend(remaining);
        }
        order
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
