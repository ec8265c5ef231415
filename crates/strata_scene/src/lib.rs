//! # strata_scene - Snapshot Publication and Link Resolution
//!
//! The aggregation half of the scene-graph core:
//!
//! - [`SceneSnapshot`] - one instance's immutable published state: its sorted
//!   local topology plus per-handle side tables (matrices, images, clip and
//!   hit regions, opacity, view identity, debug name)
//! - [`SnapshotStore`] - process-wide aggregator: per-instance FIFO queues of
//!   pending snapshots and the committed map the render consumer reads
//! - [`LinkRegistry`] - two-sided attachment handshake pairing a child
//!   instance's root with a parent instance's placeholder handle
//!
//! ## Data flow
//!
//! ```text
//! instance worker ──enqueue──► SnapshotStore ──commit──► committed map
//!                                                            │
//! link handshake  ──────────► LinkRegistry ──resolved──►  consumer
//! ```
//!
//! Only immutable `Arc<SceneSnapshot>` values ever cross a thread boundary;
//! both shared registries guard their state with a single internal lock.

pub mod link;
pub mod snapshot;
pub mod store;

pub use link::{ExportBinding, ImportBinding, LinkError, LinkRegistry, LinkToken};
pub use snapshot::{
    ClipRegion, HitInteraction, HitRegion, ImageMetadata, SceneSnapshot, ViewId,
};
pub use store::SnapshotStore;
