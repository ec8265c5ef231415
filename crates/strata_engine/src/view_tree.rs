//! View tree snapshots
//!
//! Views are the unit the input and accessibility layers reason about: each
//! instance may publish one view identity on its local root, and the global
//! topology embeds those roots wherever links graft them in. This module
//! collapses one resolved topology into a rooted tree of views plus a hit
//! tester.
//!
//! Everything here is copied out of the topology and snapshots at build
//! time. The tree and its hit tester stay valid - and side-effect-free - no
//! matter what the live scene does afterwards.

use crate::global::GlobalTopology;
use glam::{Mat3, Vec2};
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::{InstanceId, TransformHandle};
use strata_scene::{HitInteraction, HitRegion, SceneSnapshot, ViewId};

/// One view in the tree
#[derive(Clone, Debug)]
pub struct ViewNode {
    /// This view's identity
    pub view: ViewId,
    /// Nearest ancestor view, `None` for the tree root
    pub parent: Option<ViewId>,
    /// The topology handle that carried the view
    pub root_handle: TransformHandle,
    /// Debug name the owning instance published, if any
    pub debug_name: String,
}

/// A rooted snapshot of the view hierarchy for one frame
#[derive(Clone, Debug)]
pub struct ViewTree {
    /// The first view encountered in topology order, if any view exists
    pub root: Option<ViewId>,
    /// Every view reachable this frame
    pub nodes: HashMap<ViewId, ViewNode>,
    /// Hit testing over data copied at build time
    pub hit_tester: HitTester,
}

impl ViewTree {
    /// Collapse a resolved topology into its view tree
    ///
    /// `matrices` is the matrix accumulation for the same topology. Entries
    /// between two views inherit the nearer ancestor view, so hit regions
    /// anywhere in a view's subtree report that view.
    pub fn build(
        topology: &GlobalTopology,
        snapshots: &HashMap<InstanceId, Arc<SceneSnapshot>>,
        matrices: &[Mat3],
    ) -> Self {
        debug_assert_eq!(topology.len(), matrices.len());

        // Own view per entry (local roots only), then inherited view per
        // entry for region ownership.
        let own_views: Vec<Option<ViewId>> = topology
            .topology
            .iter()
            .map(|e| topology.views.get(&e.handle).copied())
            .collect();
        let mut entry_views: Vec<Option<ViewId>> = Vec::with_capacity(topology.len());
        for (index, own) in own_views.iter().enumerate() {
            match own {
                Some(view) => entry_views.push(Some(*view)),
                None if index == 0 => entry_views.push(None),
                None => entry_views.push(entry_views[topology.parent_indices[index]]),
            }
        }

        let root = own_views.iter().flatten().next().copied();

        let mut nodes: HashMap<ViewId, ViewNode> = HashMap::new();
        for (index, own) in own_views.iter().enumerate() {
            let Some(view) = own else { continue };
            if nodes.contains_key(view) {
                // A view grafted through several paths keeps its first
                // placement in the tree.
                continue;
            }

            let handle = topology.topology[index].handle;
            let parent = ancestor_view(&own_views, &topology.parent_indices, index);
            nodes.insert(
                *view,
                ViewNode {
                    view: *view,
                    parent,
                    root_handle: handle,
                    debug_name: topology
                        .debug_names
                        .get(&handle)
                        .cloned()
                        .unwrap_or_default(),
                },
            );
        }

        let hit_tester = HitTester::build(topology, snapshots, matrices, &entry_views);

        Self {
            root,
            nodes,
            hit_tester,
        }
    }
}

/// Nearest ancestor of `index` that carries its own view
fn ancestor_view(
    own_views: &[Option<ViewId>],
    parent_indices: &[usize],
    index: usize,
) -> Option<ViewId> {
    let mut current = parent_indices[index];
    loop {
        if current == index {
            // Entry 0 is its own parent; nothing above it.
            return None;
        }
        if let Some(view) = own_views[current] {
            return Some(view);
        }
        if current == 0 {
            return None;
        }
        current = parent_indices[current];
    }
}

/// Per-entry hit data copied out of the scene
#[derive(Clone, Debug)]
struct HitEntry {
    /// World -> local mapping; `None` when the global matrix is singular
    inverse: Option<Mat3>,
    regions: Vec<HitRegion>,
    view: Option<ViewId>,
}

/// Pure hit testing over one frame's copied scene data
#[derive(Clone, Debug)]
pub struct HitTester {
    entries: Vec<HitEntry>,
}

impl HitTester {
    fn build(
        topology: &GlobalTopology,
        snapshots: &HashMap<InstanceId, Arc<SceneSnapshot>>,
        matrices: &[Mat3],
        entry_views: &[Option<ViewId>],
    ) -> Self {
        let entries = topology
            .topology
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let regions = snapshots
                    .get(&entry.handle.instance())
                    .and_then(|s| s.hit_regions.get(&entry.handle))
                    .cloned()
                    .unwrap_or_default();
                let inverse = (matrices[index].determinant().abs() > f32::EPSILON)
                    .then(|| matrices[index].inverse());
                HitEntry {
                    inverse,
                    regions,
                    view: entry_views[index],
                }
            })
            .collect();
        Self { entries }
    }

    /// Views under a world-space point, topmost first
    ///
    /// Walks entries back-to-front (reverse painting order), maps the point
    /// into each entry's local space, and reports the owning view of every
    /// hit region. Consecutive duplicates collapse; semantically-invisible
    /// regions participate only when `include_invisible` is set.
    pub fn test(&self, point: Vec2, include_invisible: bool) -> Vec<ViewId> {
        let mut hits: Vec<ViewId> = Vec::new();

        for entry in self.entries.iter().rev() {
            let Some(view) = entry.view else { continue };
            let Some(inverse) = entry.inverse else { continue };
            if entry.regions.is_empty() {
                continue;
            }

            let local = inverse.transform_point2(point);
            let hit = entry.regions.iter().any(|region| {
                (include_invisible || region.interaction == HitInteraction::Default)
                    && region.contains(local.x, local.y)
            });
            if hit && hits.last() != Some(&view) {
                hits.push(view);
            }
        }

        hits
    }
}
