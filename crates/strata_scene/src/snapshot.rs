//! Published scene snapshots
//!
//! A snapshot is everything one instance has to say about its own tree for
//! one present: the sorted local topology plus independent side tables keyed
//! by handle. Snapshots are plain values - no references into live graph
//! state - which is what makes cross-thread aggregation safe without
//! per-edge locking. They are built once, wrapped in an `Arc`, and never
//! touched again.

use glam::Mat3;
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::TransformHandle;
use strata_graph::TopologyEntry;

/// View identity published by an instance for its local root
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(pub u64);

/// Identity and extent of client-imported pixel content
///
/// Import itself happens elsewhere; the scene core only carries the metadata
/// the renderer needs to look the image up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Renderer-side identifier of the imported image
    pub image_id: u64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Axis-aligned clip rectangle in a transform's local space
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClipRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// How a hit region participates in hit testing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitInteraction {
    /// Normal interactive region
    Default,
    /// Region hit-tests only when a query explicitly asks for invisible
    /// targets (accessibility, diagnostics)
    SemanticallyInvisible,
}

/// One hit-testable rectangle in a transform's local space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub interaction: HitInteraction,
}

impl HitRegion {
    /// A default-interaction region
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            interaction: HitInteraction::Default,
        }
    }

    /// Containment test in local coordinates
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// One instance's immutable published state for a single present
///
/// Every side table is keyed by handles the instance itself owns; handles in
/// the link namespace mark attachment points in `local_topology` and never
/// appear in any side table.
#[derive(Clone, Debug, Default)]
pub struct SceneSnapshot {
    /// The instance's own topologically-sorted tree
    pub local_topology: Vec<TopologyEntry>,
    /// Local transform matrix per handle (identity when absent)
    pub matrices: HashMap<TransformHandle, Mat3>,
    /// Image content attached to handles
    pub images: HashMap<TransformHandle, ImageMetadata>,
    /// Clip rectangles declared on handles
    pub clip_regions: HashMap<TransformHandle, ClipRegion>,
    /// Hit-testable regions per handle
    pub hit_regions: HashMap<TransformHandle, Vec<HitRegion>>,
    /// Per-handle opacity (1.0 when absent)
    pub opacities: HashMap<TransformHandle, f32>,
    /// View identity of this instance's root, if it published one
    pub view: Option<ViewId>,
    /// Client-provided name for diagnostics
    pub debug_name: String,
}

impl SceneSnapshot {
    /// Create a snapshot around a sorted local topology
    pub fn new(local_topology: Vec<TopologyEntry>) -> Self {
        Self {
            local_topology,
            ..Self::default()
        }
    }

    /// The root handle of the local topology, if the snapshot has one
    pub fn local_root(&self) -> Option<TransformHandle> {
        self.local_topology.first().map(|e| e.handle)
    }

    /// Freeze into the shared form that crosses thread boundaries
    pub fn publish(self) -> Arc<Self> {
        Arc::new(self)
    }
}
