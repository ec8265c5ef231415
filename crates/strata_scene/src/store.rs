//! Snapshot store - queued publication, frame-boundary commit
//!
//! Instance workers enqueue versioned snapshots at their own pace; the single
//! render consumer commits each instance's queue up to a chosen present id at
//! the frame boundary and reads back one coherent aggregated map. One mutex
//! guards both the queue map and the committed map, so a reader can never
//! observe a commit halfway through.

use crate::snapshot::SceneSnapshot;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use strata_core::{InstanceId, InstanceIdAllocator};

struct PendingSnapshot {
    present_id: u64,
    snapshot: Arc<SceneSnapshot>,
}

struct CommittedSnapshot {
    present_id: u64,
    snapshot: Arc<SceneSnapshot>,
}

#[derive(Default)]
struct StoreInner {
    /// FIFO of not-yet-committed snapshots per registered instance
    pending: HashMap<InstanceId, VecDeque<PendingSnapshot>>,
    /// The snapshot the consumer currently sees per instance
    committed: HashMap<InstanceId, CommittedSnapshot>,
}

/// Process-wide snapshot aggregator
///
/// Constructed once at process start and shared by `Arc`; never an ambient
/// singleton. Present ids are a per-instance contract: strictly increasing on
/// enqueue, and only ids that were actually enqueued may be committed -
/// violations panic, they are caller bugs rather than runtime conditions.
/// An instance disappearing between enqueue and commit is an expected
/// lifecycle race and is skipped silently.
pub struct SnapshotStore {
    allocator: InstanceIdAllocator,
    inner: Mutex<StoreInner>,
}

impl SnapshotStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            allocator: InstanceIdAllocator::new(),
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Allocate a process-wide unique instance id (thread-safe, lock-free)
    pub fn allocate_instance_id(&self) -> InstanceId {
        self.allocator.allocate()
    }

    /// Allocate the pending queue for an instance
    ///
    /// Must happen before the instance's first `enqueue`.
    pub fn register_instance(&self, id: InstanceId) {
        let mut inner = self.inner.lock();
        inner.pending.entry(id).or_default();
    }

    /// Append a snapshot to an instance's pending queue
    ///
    /// Panics if the instance is unregistered or `present_id` does not
    /// strictly increase - both are producer bugs.
    pub fn enqueue(&self, id: InstanceId, present_id: u64, snapshot: Arc<SceneSnapshot>) {
        let mut inner = self.inner.lock();
        let queue = inner
            .pending
            .get_mut(&id)
            .unwrap_or_else(|| panic!("enqueue for unregistered instance {id}"));

        if let Some(tail) = queue.back() {
            assert!(
                present_id > tail.present_id,
                "present id {present_id} for {id} does not increase past {}",
                tail.present_id
            );
        }

        queue.push_back(PendingSnapshot {
            present_id,
            snapshot,
        });
    }

    /// Commit each targeted instance's queue up to its target present id
    ///
    /// Entries below the target are discarded, the exact-target entry becomes
    /// the committed snapshot, and entries above it stay queued for a later
    /// commit. A target at or below an instance's already-committed id is a
    /// no-op; a target that was never enqueued panics. Instances missing from
    /// the store (removed concurrently) are skipped.
    ///
    /// Single serialization point: called from the one consumer thread only.
    pub fn commit(&self, targets: &HashMap<InstanceId, u64>) {
        let mut inner = self.inner.lock();

        for (&id, &target) in targets {
            if let Some(committed) = inner.committed.get(&id) {
                if target <= committed.present_id {
                    continue;
                }
            }

            let Some(queue) = inner.pending.get_mut(&id) else {
                continue;
            };

            let mut installed = None;
            while let Some(entry) = queue.pop_front() {
                if entry.present_id < target {
                    log::debug!(
                        "discarding stale snapshot {} < {target} for {id}",
                        entry.present_id
                    );
                    continue;
                }
                if entry.present_id == target {
                    installed = Some(entry);
                } else {
                    // Ran past the target without finding it; the entry
                    // belongs to a future commit.
                    queue.push_front(entry);
                }
                break;
            }

            let entry = installed
                .unwrap_or_else(|| panic!("commit target {target} for {id} was never enqueued"));
            inner.committed.insert(
                id,
                CommittedSnapshot {
                    present_id: entry.present_id,
                    snapshot: entry.snapshot,
                },
            );
        }
    }

    /// Drain every queue to its newest entry unconditionally
    ///
    /// Shutdown/idle flush: no targets, no contract checks.
    pub fn force_commit_all(&self) {
        let mut inner = self.inner.lock();
        let mut newest = Vec::new();

        for (&id, queue) in inner.pending.iter_mut() {
            if let Some(entry) = queue.drain(..).last() {
                newest.push((id, entry));
            }
        }
        for (id, entry) in newest {
            inner.committed.insert(
                id,
                CommittedSnapshot {
                    present_id: entry.present_id,
                    snapshot: entry.snapshot,
                },
            );
        }
    }

    /// A consistent point-in-time copy of the committed map
    pub fn snapshots(&self) -> HashMap<InstanceId, Arc<SceneSnapshot>> {
        let inner = self.inner.lock();
        inner
            .committed
            .iter()
            .map(|(&id, c)| (id, Arc::clone(&c.snapshot)))
            .collect()
    }

    /// Drop an instance's queue and committed entry (terminal)
    pub fn remove_instance(&self, id: InstanceId) {
        let mut inner = self.inner.lock();
        inner.pending.remove(&id);
        inner.committed.remove(&id);
    }

    /// Number of registered instances
    pub fn instance_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Number of snapshots waiting in one instance's queue
    pub fn pending_count(&self, id: InstanceId) -> usize {
        self.inner.lock().pending.get(&id).map_or(0, |q| q.len())
    }

    /// Number of instances with a committed snapshot
    pub fn committed_count(&self) -> usize {
        self.inner.lock().committed.len()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
