//! Transform graph
//!
//! Owned by exactly one scene instance and mutated from that instance's own
//! worker only. Handles live in two overlapping sets:
//!
//! - the *working set*: created and not yet released by the client
//! - the *live set*: reachable from the previous traversal; a released
//!   handle stays live while any surviving handle still points at it
//!
//! Edges come in two classes. Normal edges are insertion-ordered and
//! unlimited; each parent may additionally carry one priority edge, which is
//! always visited first. Edge sources must be in the working set at insertion
//! time - that is a checked contract, not an assumption.

use crate::topology::{TopologyData, TopologyEntry};
use std::collections::{HashMap, HashSet};
use strata_core::{InstanceId, TransformHandle};

/// Per-instance handle allocation and child-edge bookkeeping
///
/// All mutations panic if the graph was invalidated by a traversal that ran
/// out of budget; callers must [`reset_graph`](Self::reset_graph) first.
/// That is a caller bug, never a runtime condition.
pub struct TransformGraph {
    /// Namespace stamped onto every handle this graph issues
    instance: InstanceId,
    /// Next instance-local id; never reused for this graph's lifetime
    next_transform_id: u64,
    /// Handles created and not yet released
    working_set: HashSet<TransformHandle>,
    /// Handles reachable as of the last traversal
    live_set: HashSet<TransformHandle>,
    /// Normal child edges, insertion-ordered per parent
    children: HashMap<TransformHandle, Vec<TransformHandle>>,
    /// At most one priority child per parent, visited before normal children
    priority_children: HashMap<TransformHandle, TransformHandle>,
    /// Cleared when a traversal exhausts its iteration budget
    is_valid: bool,
}

/// DFS stack frame: one node and a cursor over its outgoing edges
struct Frame {
    handle: TransformHandle,
    /// Index of this node's entry in the sorted output (0 when not recording)
    sorted_index: usize,
    /// 0 addresses the priority edge when present, then normal edges in order
    cursor: usize,
}

impl TransformGraph {
    /// Create a graph for one instance namespace
    pub fn new(instance: InstanceId) -> Self {
        Self {
            instance,
            next_transform_id: 0,
            working_set: HashSet::new(),
            live_set: HashSet::new(),
            children: HashMap::new(),
            priority_children: HashMap::new(),
            is_valid: true,
        }
    }

    /// The namespace this graph issues handles in
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Whether the graph is usable (not invalidated by a budget overrun)
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Number of handles currently in the working set
    pub fn working_count(&self) -> usize {
        self.working_set.len()
    }

    /// Allocate a fresh handle, inserted into the working and live sets
    pub fn create_transform(&mut self) -> TransformHandle {
        assert!(self.is_valid, "graph must be reset after a budget overrun");

        let handle = TransformHandle::new(self.instance, self.next_transform_id);
        self.next_transform_id += 1;
        self.working_set.insert(handle);
        self.live_set.insert(handle);
        handle
    }

    /// Remove a handle from the working set
    ///
    /// Returns `false` if the handle is not working (already released, or
    /// foreign). Edges referencing the handle are untouched until the next
    /// [`compute_and_cleanup`](Self::compute_and_cleanup) finds it dead.
    pub fn release_transform(&mut self, handle: TransformHandle) -> bool {
        assert!(self.is_valid, "graph must be reset after a budget overrun");
        self.working_set.remove(&handle)
    }

    /// Insert a normal child edge
    ///
    /// Returns `false` if the edge already exists. Panics if `parent` is not
    /// in the working set: released handles may keep their old edges, but
    /// may not grow new ones.
    pub fn add_child(&mut self, parent: TransformHandle, child: TransformHandle) -> bool {
        assert!(self.is_valid, "graph must be reset after a budget overrun");
        assert!(
            self.working_set.contains(&parent),
            "edge source {parent:?} is not in the working set"
        );

        let children = self.children.entry(parent).or_default();
        if children.contains(&child) {
            return false;
        }
        children.push(child);
        true
    }

    /// Remove a normal child edge; `false` if the edge does not exist
    pub fn remove_child(&mut self, parent: TransformHandle, child: TransformHandle) -> bool {
        assert!(self.is_valid, "graph must be reset after a budget overrun");

        match self.children.get_mut(&parent) {
            Some(children) => match children.iter().position(|&c| c == child) {
                Some(index) => {
                    children.remove(index);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Remove all normal child edges from `parent`
    ///
    /// The priority child, if any, is untouched.
    pub fn clear_children(&mut self, parent: TransformHandle) {
        assert!(self.is_valid, "graph must be reset after a budget overrun");
        self.children.remove(&parent);
    }

    /// Set the priority child, replacing any previous one
    pub fn set_priority_child(&mut self, parent: TransformHandle, child: TransformHandle) {
        assert!(self.is_valid, "graph must be reset after a budget overrun");
        assert!(
            self.working_set.contains(&parent),
            "edge source {parent:?} is not in the working set"
        );
        self.priority_children.insert(parent, child);
    }

    /// Remove the priority child, if any
    pub fn clear_priority_child(&mut self, parent: TransformHandle) {
        assert!(self.is_valid, "graph must be reset after a budget overrun");
        self.priority_children.remove(&parent);
    }

    /// Clear all state except one retained handle
    ///
    /// The working set becomes `{exception}`; the live set and every edge are
    /// dropped without being reported dead. Also restores validity after a
    /// budget overrun.
    pub fn reset_graph(&mut self, exception: TransformHandle) {
        self.working_set.clear();
        self.working_set.insert(exception);
        self.live_set.clear();
        self.children.clear();
        self.priority_children.clear();
        self.is_valid = true;
    }

    /// Topologically sort from `start` and sweep for dead handles
    ///
    /// Depth-first, priority edge first, then normal edges in insertion
    /// order. An edge whose target is an ancestor on the current DFS path is
    /// reported in `cyclical_edges` and not traversed. The iteration budget
    /// is shared across this sort and the liveness sweep that follows; if it
    /// runs out the graph is invalidated and the partial data returned.
    ///
    /// The sweep traverses every working-set handle the sort did not reach: a
    /// handle may be unreachable from `start` yet kept alive by some other
    /// still-working handle. Previously-live handles reached by neither pass
    /// are reported in `dead_transforms` and their edge bookkeeping dropped.
    pub fn compute_and_cleanup(
        &mut self,
        start: TransformHandle,
        max_iterations: u64,
    ) -> TopologyData {
        assert!(self.is_valid, "graph must be reset after a budget overrun");

        let mut data = TopologyData::default();
        let mut reached = HashSet::new();

        let mut completed = self.traverse(start, max_iterations, &mut data, &mut reached, true);

        if completed {
            let mut pending: Vec<TransformHandle> = self
                .working_set
                .iter()
                .filter(|h| !reached.contains(*h))
                .copied()
                .collect();
            pending.sort();

            for handle in pending {
                if reached.contains(&handle) {
                    continue;
                }
                if !self.traverse(handle, max_iterations, &mut data, &mut reached, false) {
                    completed = false;
                    break;
                }
            }
        }

        if completed {
            let mut dead: Vec<TransformHandle> =
                self.live_set.difference(&reached).copied().collect();
            dead.sort();

            for handle in &dead {
                self.children.remove(handle);
                self.priority_children.remove(handle);
            }

            data.dead_transforms = dead;
            self.live_set = reached;
        }

        data
    }

    /// One bounded DFS; returns `false` if the budget ran out
    fn traverse(
        &mut self,
        start: TransformHandle,
        max_iterations: u64,
        data: &mut TopologyData,
        reached: &mut HashSet<TransformHandle>,
        record: bool,
    ) -> bool {
        if data.iterations >= max_iterations {
            self.invalidate(start, data.iterations);
            return false;
        }
        data.iterations += 1;
        reached.insert(start);

        let root_index = if record {
            data.sorted.push(TopologyEntry::new(start, 0));
            data.sorted.len() - 1
        } else {
            0
        };

        // Explicit cursor stack: local topology depth is client-controlled,
        // so recursion is off the table.
        let mut stack = vec![Frame {
            handle: start,
            sorted_index: root_index,
            cursor: 0,
        }];
        let mut on_path = HashSet::new();
        on_path.insert(start);

        while let Some(top) = stack.last_mut() {
            let node = top.handle;
            let parent_sorted = top.sorted_index;
            let cursor = top.cursor;
            top.cursor += 1;

            let child = match self.child_at(node, cursor) {
                Some(child) => child,
                None => {
                    on_path.remove(&node);
                    stack.pop();
                    continue;
                }
            };

            if on_path.contains(&child) {
                // The edge closes a cycle; cut it here and keep sorting.
                data.cyclical_edges.push((node, child));
                continue;
            }

            if data.iterations >= max_iterations {
                self.invalidate(start, data.iterations);
                return false;
            }
            data.iterations += 1;
            reached.insert(child);

            let sorted_index = if record {
                data.sorted.push(TopologyEntry::new(child, parent_sorted));
                data.sorted.len() - 1
            } else {
                0
            };

            stack.push(Frame {
                handle: child,
                sorted_index,
                cursor: 0,
            });
            on_path.insert(child);
        }

        true
    }

    fn invalidate(&mut self, start: TransformHandle, iterations: u64) {
        log::warn!(
            "transform graph {} exhausted its {iterations}-iteration budget traversing {start:?}; \
             graph invalidated until reset",
            self.instance
        );
        self.is_valid = false;
    }

    /// The `cursor`-th outgoing edge of `node`: priority first, then normal
    fn child_at(&self, node: TransformHandle, cursor: usize) -> Option<TransformHandle> {
        match self.priority_children.get(&node) {
            Some(&priority) => {
                if cursor == 0 {
                    Some(priority)
                } else {
                    self.normal_child_at(node, cursor - 1)
                }
            }
            None => self.normal_child_at(node, cursor),
        }
    }

    fn normal_child_at(&self, node: TransformHandle, index: usize) -> Option<TransformHandle> {
        self.children.get(&node).and_then(|c| c.get(index)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> TransformGraph {
        TransformGraph::new(InstanceId::from_raw(1))
    }

    fn handles(data: &TopologyData) -> Vec<TransformHandle> {
        data.sorted.iter().map(|e| e.handle).collect()
    }

    #[test]
    fn test_created_handles_are_unique() {
        let mut g = graph();
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(g.create_transform()));
        }
    }

    #[test]
    fn test_release_fails_twice() {
        let mut g = graph();
        let t = g.create_transform();
        assert!(g.release_transform(t));
        assert!(!g.release_transform(t));
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let mut g = graph();
        let parent = g.create_transform();
        let child = g.create_transform();

        assert!(g.add_child(parent, child));
        assert!(!g.add_child(parent, child));
    }

    #[test]
    fn test_remove_missing_edge_fails() {
        let mut g = graph();
        let parent = g.create_transform();
        let child = g.create_transform();

        assert!(!g.remove_child(parent, child));
        g.add_child(parent, child);
        assert!(g.remove_child(parent, child));
        assert!(!g.remove_child(parent, child));
    }

    #[test]
    #[should_panic(expected = "working set")]
    fn test_add_child_requires_working_parent() {
        let mut g = graph();
        let parent = g.create_transform();
        let child = g.create_transform();
        g.release_transform(parent);
        g.add_child(parent, child);
    }

    #[test]
    fn test_sort_order_children_in_insertion_order() {
        let mut g = graph();
        let root = g.create_transform();
        let a = g.create_transform();
        let b = g.create_transform();
        let c = g.create_transform();
        g.add_child(root, b);
        g.add_child(root, a);
        g.add_child(a, c);

        let data = g.compute_and_cleanup(root, 1000);
        assert_eq!(handles(&data), vec![root, b, a, c]);
        assert_eq!(
            data.sorted.iter().map(|e| e.parent_index).collect::<Vec<_>>(),
            vec![0, 0, 0, 2]
        );
    }

    #[test]
    fn test_priority_child_visited_first() {
        let mut g = graph();
        let root = g.create_transform();
        let a = g.create_transform();
        let b = g.create_transform();
        g.add_child(root, a);
        g.set_priority_child(root, b);

        let data = g.compute_and_cleanup(root, 1000);
        assert_eq!(handles(&data), vec![root, b, a]);

        // Replacing the priority child drops the old one entirely.
        let c = g.create_transform();
        g.set_priority_child(root, c);
        let data = g.compute_and_cleanup(root, 1000);
        assert_eq!(handles(&data), vec![root, c, a]);
    }

    #[test]
    fn test_clear_children_leaves_priority_edge() {
        let mut g = graph();
        let root = g.create_transform();
        let a = g.create_transform();
        let b = g.create_transform();
        g.add_child(root, a);
        g.set_priority_child(root, b);

        g.clear_children(root);
        let data = g.compute_and_cleanup(root, 1000);
        assert_eq!(handles(&data), vec![root, b]);
    }

    #[test]
    fn test_compute_is_idempotent_without_mutation() {
        let mut g = graph();
        let root = g.create_transform();
        let a = g.create_transform();
        let b = g.create_transform();
        g.add_child(root, a);
        g.add_child(a, b);
        g.add_child(root, b);

        let first = g.compute_and_cleanup(root, 1000);
        let second = g.compute_and_cleanup(root, 1000);
        assert_eq!(first.sorted, second.sorted);
    }

    #[test]
    fn test_multi_parent_node_appears_per_path() {
        let mut g = graph();
        let root = g.create_transform();
        let a = g.create_transform();
        let b = g.create_transform();
        let shared = g.create_transform();
        g.add_child(root, a);
        g.add_child(root, b);
        g.add_child(a, shared);
        g.add_child(b, shared);

        let data = g.compute_and_cleanup(root, 1000);
        let occurrences: Vec<usize> = data
            .sorted
            .iter()
            .enumerate()
            .filter(|(_, e)| e.handle == shared)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(occurrences.len(), 2);

        let parents: Vec<TransformHandle> = occurrences
            .iter()
            .map(|&i| data.sorted[data.sorted[i].parent_index].handle)
            .collect();
        assert_eq!(parents, vec![a, b]);
    }

    #[test]
    fn test_cycle_reported_and_cut() {
        let mut g = graph();
        let root = g.create_transform();
        let a = g.create_transform();
        let b = g.create_transform();
        g.add_child(root, a);
        g.add_child(a, b);
        g.add_child(b, root);

        let data = g.compute_and_cleanup(root, 1000);
        assert!(g.is_valid(), "a cut cycle is not a failure");
        assert_eq!(handles(&data), vec![root, a, b]);
        assert_eq!(data.cyclical_edges, vec![(b, root)]);

        // The reported edge's target is an ancestor of its source in the sort.
        let (source, target) = data.cyclical_edges[0];
        let source_pos = handles(&data).iter().position(|&h| h == source).unwrap();
        let target_pos = handles(&data).iter().position(|&h| h == target).unwrap();
        assert!(target_pos < source_pos);
    }

    #[test]
    fn test_self_edge_is_a_cycle() {
        let mut g = graph();
        let root = g.create_transform();
        g.add_child(root, root);

        let data = g.compute_and_cleanup(root, 1000);
        assert_eq!(handles(&data), vec![root]);
        assert_eq!(data.cyclical_edges, vec![(root, root)]);
    }

    #[test]
    fn test_budget_overrun_invalidates() {
        let mut g = graph();
        let root = g.create_transform();
        let mut parent = root;
        for _ in 0..10 {
            let child = g.create_transform();
            g.add_child(parent, child);
            parent = child;
        }

        let data = g.compute_and_cleanup(root, 5);
        assert_eq!(data.iterations, 5);
        assert!(!g.is_valid());

        // A reset restores the graph to a usable single-handle state.
        g.reset_graph(root);
        assert!(g.is_valid());
        let data = g.compute_and_cleanup(root, 5);
        assert_eq!(handles(&data), vec![root]);
        assert!(data.dead_transforms.is_empty());
    }

    #[test]
    #[should_panic(expected = "reset")]
    fn test_mutation_after_overrun_panics() {
        let mut g = graph();
        let root = g.create_transform();
        let child = g.create_transform();
        g.add_child(root, child);
        g.add_child(child, root);

        let _ = g.compute_and_cleanup(root, 1);
        g.create_transform();
    }

    #[test]
    fn test_released_handle_kept_alive_by_edge() {
        let mut g = graph();
        let root = g.create_transform();
        let child = g.create_transform();
        g.add_child(root, child);
        g.release_transform(child);

        // Still referenced: live, not dead.
        let data = g.compute_and_cleanup(root, 1000);
        assert!(data.dead_transforms.is_empty());
        assert!(handles(&data).contains(&child));

        // Sole referencing edge removed: dead on the next compute.
        g.remove_child(root, child);
        let data = g.compute_and_cleanup(root, 1000);
        assert_eq!(data.dead_transforms, vec![child]);

        // And only reported once.
        let data = g.compute_and_cleanup(root, 1000);
        assert!(data.dead_transforms.is_empty());
    }

    #[test]
    fn test_working_handle_unreachable_from_start_stays_alive() {
        let mut g = graph();
        let root = g.create_transform();
        let island = g.create_transform();
        let passenger = g.create_transform();
        g.add_child(island, passenger);
        g.release_transform(passenger);

        // Neither is reachable from root, but `island` is working and keeps
        // `passenger` alive through its edge.
        let data = g.compute_and_cleanup(root, 1000);
        assert!(data.dead_transforms.is_empty());
        assert_eq!(handles(&data), vec![root]);

        // Releasing the island orphans both.
        g.release_transform(island);
        let data = g.compute_and_cleanup(root, 1000);
        let mut expected = vec![island, passenger];
        expected.sort();
        assert_eq!(data.dead_transforms, expected);
    }

    #[test]
    fn test_reset_reports_nothing_dead() {
        let mut g = graph();
        let root = g.create_transform();
        let a = g.create_transform();
        let b = g.create_transform();
        g.add_child(root, a);
        g.add_child(a, b);

        g.reset_graph(root);
        let data = g.compute_and_cleanup(root, 1000);
        assert!(data.dead_transforms.is_empty());
        assert_eq!(handles(&data), vec![root]);
        assert_eq!(g.working_count(), 1);
    }
}
