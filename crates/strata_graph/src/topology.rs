//! Topology types
//!
//! The output vocabulary of a graph traversal: sorted entries, the edges
//! that had to be cut to keep the sort acyclic, and the handles that died.

use serde::Deserialize;
use strata_core::TransformHandle;

/// One element of a topologically-sorted sequence
///
/// `parent_index` is the index, earlier in the same sequence, of this entry's
/// parent. The first entry is its own parent (index 0).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopologyEntry {
    /// The node at this position
    pub handle: TransformHandle,
    /// Index of the parent entry in the same sequence
    pub parent_index: usize,
}

impl TopologyEntry {
    /// Create an entry
    pub fn new(handle: TransformHandle, parent_index: usize) -> Self {
        Self {
            handle,
            parent_index,
        }
    }
}

/// Result of [`TransformGraph::compute_and_cleanup`](crate::TransformGraph::compute_and_cleanup)
#[derive(Clone, Debug, Default)]
pub struct TopologyData {
    /// Depth-first, priority-edge-first topological sort from the start handle
    pub sorted: Vec<TopologyEntry>,
    /// Edges skipped because their target was an ancestor on the DFS path
    pub cyclical_edges: Vec<(TransformHandle, TransformHandle)>,
    /// Previously-live handles reached by neither traversal this call
    pub dead_transforms: Vec<TransformHandle>,
    /// Node visits consumed, bounded by the caller's budget
    pub iterations: u64,
}

/// Traversal configuration
///
/// `max_iterations` bounds one `compute_and_cleanup` call across both the
/// sorting pass and the working-set sweep. It is a budget against runaway
/// client trees, not a tuning constant; exceeding it invalidates the graph.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct GraphConfig {
    /// Maximum node visits per traversal
    pub max_iterations: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1 << 16,
        }
    }
}
