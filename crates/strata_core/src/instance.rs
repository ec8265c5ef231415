//! Scene-instance namespaces
//!
//! Every client scene instance owns a namespace for the transforms it
//! creates. One namespace is reserved for attachment placeholders: handles
//! in the link namespace mark the spot where another instance's tree is
//! grafted in, and never carry content of their own.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a scene instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(u64);

impl InstanceId {
    /// The link namespace (ID 0) - reserved for attachment placeholders
    pub const LINK: Self = Self(0);

    /// Get the raw ID value
    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Create from a raw u64 value
    ///
    /// Note: real instance IDs come from [`InstanceIdAllocator`]; this exists
    /// for reconstructing an ID from serialized or test data.
    #[inline]
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Check if this is the reserved link namespace
    #[inline]
    pub fn is_link(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_link() {
            write!(f, "link")
        } else {
            write!(f, "inst:{}", self.0)
        }
    }
}

/// Thread-safe allocator for instance IDs
///
/// Never hands out the reserved link namespace. One allocator exists per
/// process, owned by the snapshot aggregation layer.
pub struct InstanceIdAllocator {
    next: AtomicU64,
}

impl InstanceIdAllocator {
    /// Create a new allocator
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next unique instance ID
    pub fn allocate(&self) -> InstanceId {
        InstanceId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for InstanceIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
