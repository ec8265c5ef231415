//! # strata_engine - Global Scene Resolution
//!
//! The consumer half of the scene-graph core. Once per frame the compositor
//! commits pending snapshots, reads the aggregated map, and stitches every
//! instance's local topology together across resolved attachment links:
//!
//! ```text
//! commit(targets) ──► snapshots() ──► GlobalTopology ──► matrices/opacity
//!                                          │                   │
//!                                      view tree           draw list
//! ```
//!
//! [`GlobalTopology::compute`] is a pure function over the aggregated
//! snapshot map and the resolved-link map; everything downstream (matrix
//! accumulation, draw-list extraction, the hit-testable view tree) works on
//! its ordered, cycle-free output.

pub mod compositor;
pub mod draw;
pub mod global;
pub mod matrices;
pub mod view_tree;

pub use compositor::{Compositor, FrameScene};
pub use draw::{collect_draw_entries, DrawEntry};
pub use global::GlobalTopology;
pub use matrices::{compute_global_matrices, compute_global_opacities};
pub use view_tree::{HitTester, ViewNode, ViewTree};
