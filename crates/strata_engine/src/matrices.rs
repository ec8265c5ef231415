//! Global matrix and opacity accumulation
//!
//! Entries in a resolved topology always follow their parent, so one forward
//! pass accumulates world-space state: each entry composes its local matrix
//! onto its parent's global matrix, and opacity multiplies down the chain.
//! Because a multi-parent handle appears once per path, each occurrence picks
//! up its own ancestry - two grafts of the same content under different
//! scales come out with different global matrices, which is the point.

use crate::global::GlobalTopology;
use glam::Mat3;
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::InstanceId;
use strata_scene::SceneSnapshot;

/// World-space matrix per topology entry
///
/// Entry 0 contributes its own local matrix; handles with no published
/// matrix are identity.
pub fn compute_global_matrices(
    topology: &GlobalTopology,
    snapshots: &HashMap<InstanceId, Arc<SceneSnapshot>>,
) -> Vec<Mat3> {
    let mut matrices: Vec<Mat3> = Vec::with_capacity(topology.len());

    for (index, entry) in topology.topology.iter().enumerate() {
        let local = snapshots
            .get(&entry.handle.instance())
            .and_then(|s| s.matrices.get(&entry.handle))
            .copied()
            .unwrap_or(Mat3::IDENTITY);

        if index == 0 {
            matrices.push(local);
        } else {
            matrices.push(matrices[topology.parent_indices[index]] * local);
        }
    }

    matrices
}

/// Accumulated opacity per topology entry (product down the parent chain)
pub fn compute_global_opacities(
    topology: &GlobalTopology,
    snapshots: &HashMap<InstanceId, Arc<SceneSnapshot>>,
) -> Vec<f32> {
    let mut opacities: Vec<f32> = Vec::with_capacity(topology.len());

    for (index, entry) in topology.topology.iter().enumerate() {
        let local = snapshots
            .get(&entry.handle.instance())
            .and_then(|s| s.opacities.get(&entry.handle))
            .copied()
            .unwrap_or(1.0);

        if index == 0 {
            opacities.push(local);
        } else {
            opacities.push(opacities[topology.parent_indices[index]] * local);
        }
    }

    opacities
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use strata_core::TransformHandle;
    use strata_graph::TopologyEntry;

    fn handle(instance: u64, transform: u64) -> TransformHandle {
        TransformHandle::new(InstanceId::from_raw(instance), transform)
    }

    fn placeholder(transform: u64) -> TransformHandle {
        TransformHandle::new(InstanceId::LINK, transform)
    }

    #[test]
    fn test_matrix_accumulation_follows_parents() {
        let root = handle(1, 0);
        let child = handle(1, 1);
        let mut snapshot = SceneSnapshot::new(vec![
            TopologyEntry::new(root, 0),
            TopologyEntry::new(child, 0),
        ]);
        snapshot
            .matrices
            .insert(root, Mat3::from_translation(Vec2::new(10.0, 0.0)));
        snapshot
            .matrices
            .insert(child, Mat3::from_translation(Vec2::new(5.0, 0.0)));
        let snapshots = HashMap::from([(root.instance(), snapshot.publish())]);

        let topology =
            GlobalTopology::compute(&snapshots, &HashMap::new(), InstanceId::LINK, root);
        let matrices = compute_global_matrices(&topology, &snapshots);

        let p = matrices[1].transform_point2(Vec2::ZERO);
        assert!((p.x - 15.0).abs() < 1e-6);
    }

    #[test]
    fn test_per_path_matrices_differ() {
        // The same child content grafted under two differently-scaled
        // ancestors picks up two different global matrices.
        let p_root = handle(1, 0);
        let scaled = handle(1, 1);
        let plain = handle(1, 2);
        let c_root = handle(2, 0);

        let mut parent = SceneSnapshot::new(vec![
            TopologyEntry::new(p_root, 0),
            TopologyEntry::new(scaled, 0),
            TopologyEntry::new(placeholder(1), 1),
            TopologyEntry::new(plain, 0),
            TopologyEntry::new(placeholder(2), 3),
        ]);
        parent
            .matrices
            .insert(scaled, Mat3::from_scale(Vec2::splat(2.0)));

        let child = SceneSnapshot::new(vec![TopologyEntry::new(c_root, 0)]);

        let snapshots = HashMap::from([
            (p_root.instance(), parent.publish()),
            (c_root.instance(), child.publish()),
        ]);
        let links = HashMap::from([
            (placeholder(1), c_root),
            (placeholder(2), c_root),
        ]);

        let topology = GlobalTopology::compute(&snapshots, &links, InstanceId::LINK, p_root);
        let matrices = compute_global_matrices(&topology, &snapshots);

        let occurrences: Vec<usize> = topology
            .topology
            .iter()
            .enumerate()
            .filter(|(_, e)| e.handle == c_root)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(occurrences.len(), 2);

        let unit = Vec2::new(1.0, 1.0);
        let through_scaled = matrices[occurrences[0]].transform_point2(unit);
        let through_plain = matrices[occurrences[1]].transform_point2(unit);
        assert!((through_scaled.x - 2.0).abs() < 1e-6);
        assert!((through_plain.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_opacity_multiplies_down_the_chain() {
        let root = handle(1, 0);
        let child = handle(1, 1);
        let leaf = handle(1, 2);
        let mut snapshot = SceneSnapshot::new(vec![
            TopologyEntry::new(root, 0),
            TopologyEntry::new(child, 0),
            TopologyEntry::new(leaf, 1),
        ]);
        snapshot.opacities.insert(child, 0.5);
        snapshot.opacities.insert(leaf, 0.5);
        let snapshots = HashMap::from([(root.instance(), snapshot.publish())]);

        let topology =
            GlobalTopology::compute(&snapshots, &HashMap::new(), InstanceId::LINK, root);
        let opacities = compute_global_opacities(&topology, &snapshots);

        assert_eq!(opacities, vec![1.0, 0.5, 0.25]);
    }
}
