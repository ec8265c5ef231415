//! Transform handles
//!
//! A handle names one node in one instance's scene tree. Handles are issued
//! by the instance's own graph and are unique for the lifetime of that graph;
//! the pair `(instance, transform)` is therefore globally unique.

use crate::instance::InstanceId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of a scene-tree node
///
/// A pure value type: structural equality, total order (instance first, then
/// local id), hashable. Handles carry no liveness information - whether the
/// node behind a handle still exists is the owning graph's business.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransformHandle {
    instance: InstanceId,
    transform: u64,
}

impl TransformHandle {
    /// Create a handle from its parts
    #[inline]
    pub const fn new(instance: InstanceId, transform: u64) -> Self {
        Self {
            instance,
            transform,
        }
    }

    /// The owning instance namespace
    #[inline]
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// The instance-local transform id
    #[inline]
    pub fn transform(&self) -> u64 {
        self.transform
    }

    /// Check if this handle lives in the reserved link namespace
    #[inline]
    pub fn is_placeholder(&self) -> bool {
        self.instance.is_link()
    }

    /// Pack into raw bits for compact serialization
    #[inline]
    pub fn to_bits(&self) -> (u64, u64) {
        (self.instance.raw(), self.transform)
    }

    /// Reconstruct from raw bits
    #[inline]
    pub fn from_bits(instance: u64, transform: u64) -> Self {
        Self {
            instance: InstanceId::from_raw(instance),
            transform,
        }
    }
}

impl fmt::Debug for TransformHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.instance, self.transform)
    }
}

impl fmt::Display for TransformHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.instance, self.transform)
    }
}
