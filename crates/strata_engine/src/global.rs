//! Global topology resolution
//!
//! Stitches every instance's local topology into one globally ordered,
//! cycle-free scene description. Placeholder handles mark where another
//! instance's tree grafts in; the resolved-link map says which one. Link
//! failures of any kind - no pairing, no snapshot yet, a stale pairing whose
//! target is no longer that instance's root - are expected runtime
//! conditions: the branch simply contributes nothing. Malformed snapshots,
//! by contrast, are producer bugs and fail hard.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use strata_core::{InstanceId, TransformHandle};
use strata_graph::TopologyEntry;
use strata_scene::{ClipRegion, SceneSnapshot, ViewId};

/// One frame's merged, cross-instance scene topology
///
/// `topology`, `parent_indices`, and `child_counts` are parallel vectors. A
/// handle reachable through more than one attachment path appears once per
/// path, each occurrence with its own independently-computed parent index -
/// that is what lets two projections of the same content inherit different
/// scale and clip ancestry. Placeholder handles never appear.
#[derive(Clone, Debug, Default)]
pub struct GlobalTopology {
    /// Globally ordered entries; each entry's parent index is global
    pub topology: Vec<TopologyEntry>,
    /// Direct children per entry, after link resolution
    pub child_counts: Vec<u64>,
    /// Global parent index per entry (entry 0 is its own parent)
    pub parent_indices: Vec<usize>,
    /// Every handle that appears in `topology`
    pub live_handles: HashSet<TransformHandle>,
    /// View identity per appended local root that published one
    pub views: HashMap<TransformHandle, ViewId>,
    /// Debug name per appended local root that published one
    pub debug_names: HashMap<TransformHandle, String>,
    /// Clip region declared on each appended local root
    pub clip_regions: HashMap<TransformHandle, ClipRegion>,
}

/// One local topology being walked, with its cursor and the global indices
/// of the entries it has placed so far
struct VectorFrame<'a> {
    instance: InstanceId,
    topology: &'a [TopologyEntry],
    cursor: usize,
    /// Local index -> global index, filled as the cursor advances
    global_indices: Vec<usize>,
}

impl GlobalTopology {
    /// Merge the aggregated snapshot map across resolved links
    ///
    /// `link_instance` is the reserved placeholder namespace; `root` is the
    /// display's root transform. Returns an empty topology if the root's
    /// owner has published nothing yet. Panics on malformed snapshots (empty
    /// local topology, or the root owner's topology not starting at `root`).
    pub fn compute(
        snapshots: &HashMap<InstanceId, Arc<SceneSnapshot>>,
        links: &HashMap<TransformHandle, TransformHandle>,
        link_instance: InstanceId,
        root: TransformHandle,
    ) -> Self {
        let mut result = Self::default();

        let Some(root_snapshot) = snapshots.get(&root.instance()) else {
            return result;
        };
        assert!(
            !root_snapshot.local_topology.is_empty(),
            "instance {} published an empty local topology",
            root.instance()
        );
        assert_eq!(
            root_snapshot.local_topology[0].handle, root,
            "root owner's topology must start at the requested root"
        );

        // Child counts seeded from each local topology, computed once per
        // instance per call. The placeholder entries are counted here and
        // individually un-counted when their link fails to contribute.
        let mut local_counts: HashMap<InstanceId, Vec<u64>> = HashMap::new();
        let root_count = local_child_count(&mut local_counts, root.instance(), root_snapshot, 0);

        result.append(root, 0, root_count);
        result.record_root(root, root_snapshot);

        let mut stack = vec![VectorFrame {
            instance: root.instance(),
            topology: &root_snapshot.local_topology,
            cursor: 1,
            global_indices: first_index_zero(root_snapshot.local_topology.len()),
        }];
        // Instances currently on the stack; a link back into one of them
        // would cycle forever, so it degrades like an unresolved link.
        let mut on_stack: Vec<InstanceId> = vec![root.instance()];

        while let Some(frame) = stack.last_mut() {
            if frame.cursor >= frame.topology.len() {
                on_stack.pop();
                stack.pop();
                continue;
            }

            let local_index = frame.cursor;
            let entry = frame.topology[local_index];
            let parent_global = frame.global_indices[entry.parent_index];
            frame.cursor += 1;

            if entry.handle.instance() != link_instance {
                let count = local_child_count(
                    &mut local_counts,
                    frame.instance,
                    &snapshots[&frame.instance],
                    local_index,
                );
                let global_index = result.append(entry.handle, parent_global, count);
                frame.global_indices[local_index] = global_index;
                continue;
            }

            // A placeholder consumes its slot in the parent's child count
            // until the link proves it contributes a subtree.
            frame.global_indices[local_index] = parent_global;
            result.child_counts[parent_global] -= 1;

            let Some(&child_root) = links.get(&entry.handle) else {
                log::debug!("link {:?} unresolved; branch absent", entry.handle);
                continue;
            };
            let child_instance = child_root.instance();
            let Some(child_snapshot) = snapshots.get(&child_instance) else {
                log::debug!("link {:?} target {child_instance} has no snapshot", entry.handle);
                continue;
            };
            assert!(
                !child_snapshot.local_topology.is_empty(),
                "instance {child_instance} published an empty local topology"
            );
            if child_snapshot.local_topology[0].handle != child_root {
                // Stale pairing: the instance re-rooted since the link
                // resolved. Indistinguishable from unresolved on purpose.
                log::debug!("link {:?} is stale; branch absent", entry.handle);
                continue;
            }
            if on_stack.contains(&child_instance) {
                log::warn!(
                    "link {:?} closes a cross-instance cycle through {child_instance}; branch absent",
                    entry.handle
                );
                continue;
            }

            // The link holds: restore the parent's child count and graft the
            // child topology. Its root is appended here, parented at the
            // placeholder's parent, and the frame starts past it at cursor 1.
            result.child_counts[parent_global] += 1;
            let count = local_child_count(&mut local_counts, child_instance, child_snapshot, 0);
            let global_index = result.append(child_root, parent_global, count);
            result.record_root(child_root, child_snapshot);

            let mut global_indices = first_index_zero(child_snapshot.local_topology.len());
            global_indices[0] = global_index;
            stack.push(VectorFrame {
                instance: child_instance,
                topology: &child_snapshot.local_topology,
                cursor: 1,
                global_indices,
            });
            on_stack.push(child_instance);
        }

        result
    }

    /// Append one resolved entry; returns its global index
    fn append(&mut self, handle: TransformHandle, parent_index: usize, child_count: u64) -> usize {
        let global_index = self.topology.len();
        self.topology.push(TopologyEntry::new(handle, parent_index));
        self.parent_indices.push(parent_index);
        self.child_counts.push(child_count);
        self.live_handles.insert(handle);
        global_index
    }

    /// Record the metadata an instance publishes on its local root
    fn record_root(&mut self, handle: TransformHandle, snapshot: &SceneSnapshot) {
        if let Some(view) = snapshot.view {
            self.views.insert(handle, view);
        }
        if !snapshot.debug_name.is_empty() {
            self.debug_names
                .insert(handle, snapshot.debug_name.clone());
        }
        if let Some(&clip) = snapshot.clip_regions.get(&handle) {
            self.clip_regions.insert(handle, clip);
        }
    }

    /// Number of entries in the merged topology
    pub fn len(&self) -> usize {
        self.topology.len()
    }

    /// Whether the topology is empty (root owner unpublished)
    pub fn is_empty(&self) -> bool {
        self.topology.is_empty()
    }
}

fn first_index_zero(len: usize) -> Vec<usize> {
    vec![0; len]
}

/// Child count of `local_index` within its own local topology, cached per
/// instance for the duration of one compute call
fn local_child_count(
    cache: &mut HashMap<InstanceId, Vec<u64>>,
    instance: InstanceId,
    snapshot: &SceneSnapshot,
    local_index: usize,
) -> u64 {
    let counts = cache.entry(instance).or_insert_with(|| {
        let topology = &snapshot.local_topology;
        let mut counts = vec![0u64; topology.len()];
        for entry in topology.iter().skip(1) {
            counts[entry.parent_index] += 1;
        }
        counts
    });
    counts[local_index]
}
