//! Per-frame scene composition
//!
//! The single consumer of everything the instances publish. Once per frame
//! it commits each instance's queue to the present id the frame scheduler
//! chose, reads back one coherent snapshot map, and resolves it into the
//! immutable [`FrameScene`] the rendering and input layers consume.
//!
//! The compositor owns no scene state of its own - it is a pump between the
//! shared aggregation structures and the pure resolution functions.

use crate::draw::{collect_draw_entries, DrawEntry};
use crate::global::GlobalTopology;
use crate::matrices::{compute_global_matrices, compute_global_opacities};
use crate::view_tree::ViewTree;
use glam::Mat3;
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::{InstanceId, TransformHandle};
use strata_scene::{LinkRegistry, SnapshotStore};

/// One frame's fully resolved scene
#[derive(Clone, Debug)]
pub struct FrameScene {
    /// Frame number, monotonically increasing per compositor
    pub frame: u64,
    /// The merged topology
    pub topology: GlobalTopology,
    /// World-space matrix per topology entry
    pub matrices: Vec<Mat3>,
    /// Accumulated opacity per topology entry
    pub opacities: Vec<f32>,
    /// Image draws in painting order
    pub draws: Vec<DrawEntry>,
    /// Rooted view hierarchy with hit testing
    pub view_tree: ViewTree,
}

/// The render-loop consumer
pub struct Compositor {
    store: Arc<SnapshotStore>,
    links: LinkRegistry,
    /// The display's root transform
    root: TransformHandle,
    /// Reserved namespace of attachment placeholders
    link_instance: InstanceId,
    frame_number: u64,
}

impl Compositor {
    /// Create a compositor over the shared aggregation state
    pub fn new(store: Arc<SnapshotStore>, links: LinkRegistry, root: TransformHandle) -> Self {
        Self {
            store,
            links,
            root,
            link_instance: InstanceId::LINK,
            frame_number: 0,
        }
    }

    /// The display's root transform
    pub fn root(&self) -> TransformHandle {
        self.root
    }

    /// Commit, aggregate, and resolve one frame
    ///
    /// Must only be called from the one consumer thread; `commit` is the
    /// serialization point across instances.
    pub fn compose_frame(&mut self, targets: &HashMap<InstanceId, u64>) -> FrameScene {
        self.store.commit(targets);
        let snapshots = self.store.snapshots();
        let links = self.links.resolved_links();

        let topology =
            GlobalTopology::compute(&snapshots, &links, self.link_instance, self.root);
        let matrices = compute_global_matrices(&topology, &snapshots);
        let opacities = compute_global_opacities(&topology, &snapshots);
        let draws = collect_draw_entries(&topology, &snapshots, &matrices, &opacities);
        let view_tree = ViewTree::build(&topology, &snapshots, &matrices);

        self.frame_number += 1;
        log::trace!(
            "frame {}: {} entries, {} draws, {} views",
            self.frame_number,
            topology.len(),
            draws.len(),
            view_tree.nodes.len()
        );

        FrameScene {
            frame: self.frame_number,
            topology,
            matrices,
            opacities,
            draws,
            view_tree,
        }
    }

    /// Flush every pending snapshot unconditionally (shutdown/idle)
    pub fn flush_pending(&self) {
        self.store.force_commit_all();
    }
}
