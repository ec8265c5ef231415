//! Draw-list extraction
//!
//! The hand-off from scene aggregation to whatever renders it: every
//! image-carrying entry of the resolved topology, in painting order
//! (topology order - parents under children, earlier siblings under later
//! ones), with its accumulated matrix and opacity. The renderer consumes
//! this list without ever looking at the graph.

use crate::global::GlobalTopology;
use glam::Mat3;
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::{InstanceId, TransformHandle};
use strata_scene::{ImageMetadata, SceneSnapshot};

/// One renderable rectangle, ready for submission
#[derive(Clone, Copy, Debug)]
pub struct DrawEntry {
    /// Topology entry this draw came from (for debugging)
    pub handle: TransformHandle,
    /// The image to sample
    pub image: ImageMetadata,
    /// World-space transform of the image's unit rectangle
    pub transform: Mat3,
    /// Accumulated opacity
    pub opacity: f32,
}

/// Collect draws in painting order
///
/// `matrices` and `opacities` are the accumulation results for the same
/// topology; entries without an image contribute nothing. An image grafted
/// in through two paths is emitted once per path, with per-path transforms.
pub fn collect_draw_entries(
    topology: &GlobalTopology,
    snapshots: &HashMap<InstanceId, Arc<SceneSnapshot>>,
    matrices: &[Mat3],
    opacities: &[f32],
) -> Vec<DrawEntry> {
    debug_assert_eq!(topology.len(), matrices.len());
    debug_assert_eq!(topology.len(), opacities.len());

    let mut draws = Vec::new();
    for (index, entry) in topology.topology.iter().enumerate() {
        let Some(snapshot) = snapshots.get(&entry.handle.instance()) else {
            continue;
        };
        let Some(&image) = snapshot.images.get(&entry.handle) else {
            continue;
        };
        draws.push(DrawEntry {
            handle: entry.handle,
            image,
            transform: matrices[index],
            opacity: opacities[index],
        });
    }
    draws
}
