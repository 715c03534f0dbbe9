//! Chain decomposition of the active skeleton.
//!
//! Every solve partitions the joints touched by the current targets into
//! linear chains. A chain is stored outer end first: `chain[0]` is a
//! targeted joint or a sub-base, and the last entry is the root, a sub-base,
//! a sub-root, or an ancestor that carries its own position target.
//!
//! ```text
//!              8           [11]
//!             /             /
//!            7---14--[15]  10
//!           /             /
//!          6---12---13   9
//!         /             /
//!   0----1----2----3----4---[5]--16---17--[18]
//!              \
//!               19
//!                \
//!                [20]
//! ```
//!
//! With targets on `[5, 11, 15, 18, 20]` the walk yields chains
//! `5:[5,4,3,2]`, `11:[11,10,9,5]`, `15:[15,14,7]`, `18:[18,17,16,5]`,
//! `20:[20,19,2]` and sub-base chains `2:[2,1,0]`, `6:[6,2]`, `7:[7,6]`.
//! Joints 6 and 7 have only one active child, so their chains are folded
//! into `15:[15,14,7,6,2]`.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::Vector3;
use tracing::trace;

use crate::joint::{JointConfig, JointId};
use crate::math::normalize_or;
use crate::skeleton::Skeleton;

/// Joint roles that shape how chains are cut.
#[derive(Debug, Clone, Default)]
pub(crate) struct Topology {
    pub root_id: Option<JointId>,
    /// When non-empty, only these joints are sub-bases.
    pub sub_base_ids: BTreeSet<JointId>,
    /// Chains stop at these joints.
    pub sub_root_ids: BTreeSet<JointId>,
}

impl Topology {
    fn is_sub_base(&self, id: JointId) -> bool {
        self.sub_base_ids.contains(&id)
    }

    fn is_sub_root(&self, id: JointId) -> bool {
        self.sub_root_ids.contains(&id)
    }
}

/// Chains, active roots and active joints for one solve. Entries are arena
/// indices into the [`Skeleton`].
#[derive(Debug, Default)]
pub(crate) struct Chains {
    /// Outer-end id -> chain (outer end first).
    chains: BTreeMap<JointId, Vec<usize>>,
    /// Inner ends whose parent is missing or inactive, in id order.
    active_roots: Vec<usize>,
    /// Every active joint, in id order.
    active_joints: Vec<usize>,
}

impl Chains {
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &[usize]> + '_ {
        self.chains.values().map(Vec::as_slice)
    }

    pub fn active_roots(&self) -> &[usize] {
        &self.active_roots
    }

    pub fn active_joints(&self) -> &[usize] {
        &self.active_joints
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Chains as joint ids, keyed by outer end.
    pub fn layout(&self, skeleton: &Skeleton) -> Vec<(JointId, Vec<JointId>)> {
        self.chains
            .iter()
            .map(|(&id, chain)| {
                let ids = chain.iter().map(|&idx| skeleton.joint(idx).id()).collect();
                (id, ids)
            })
            .collect()
    }

    /// Recompute joint flags and chains from this frame's configs.
    ///
    /// Configs are visited in ascending id order. Each joint gets its own copy
    /// of its config, so target adjustments made here last for one solve only.
    pub fn rebuild(
        &mut self,
        skeleton: &mut Skeleton,
        configs: &BTreeMap<JointId, JointConfig>,
        topology: &Topology,
    ) {
        for idx in 0..skeleton.len() {
            skeleton.joint_mut(idx).reset_flags();
        }
        self.chains.clear();
        self.active_roots.clear();
        self.active_joints.clear();

        let mut roots = BTreeSet::new();
        let mut sub_bases = BTreeSet::new();
        for (&id, config) in configs {
            let Some(idx) = skeleton.index_of(id) else {
                continue;
            };
            skeleton.joint_mut(idx).set_config(config.clone());

            if Some(id) == topology.root_id {
                // Root world frame is its local frame
                let joint = skeleton.joint_mut(idx);
                if let Some(rot) = config.local_rot.or(config.target_rot) {
                    joint.lock_local_rot(rot);
                    roots.insert(id);
                }
                if let Some(pos) = config.local_pos.or(config.target_pos) {
                    joint.set_local_pos(&pos);
                    joint.activate();
                }
                if let Some(scale) = config.local_scale {
                    joint.set_local_scale(&scale);
                }
                continue;
            }

            if let Some(rot) = config.local_rot {
                skeleton.joint_mut(idx).lock_local_rot(rot);
            }
            if let Some(target_pos) = config.target_pos {
                let chain = Self::build_chain(skeleton, idx, topology, &mut sub_bases);
                self.chains.insert(id, chain);
                snap_sequential_target(skeleton, idx, target_pos);
            } else if let Some(pos) = config.local_pos {
                let joint = skeleton.joint_mut(idx);
                joint.set_local_pos(&pos);
                joint.activate();
            }
            if let Some(scale) = config.local_scale {
                let joint = skeleton.joint_mut(idx);
                joint.set_local_scale(&scale);
                joint.activate();
            }
        }

        // Each sub-base gets its own chain
        while !sub_bases.is_empty() {
            let mut next = BTreeSet::new();
            for id in std::mem::take(&mut sub_bases) {
                if self.chains.contains_key(&id) {
                    continue;
                }
                let Some(idx) = skeleton.index_of(id) else {
                    continue;
                };
                let chain = Self::build_chain(skeleton, idx, topology, &mut next);
                self.chains.insert(id, chain);
            }
            sub_bases = next;
        }

        self.condense(skeleton, topology);

        for chain in self.chains.values() {
            let Some(&inner_end) = chain.last() else {
                continue;
            };
            let joint = skeleton.joint(inner_end);
            let parent_active = joint
                .parent
                .is_some_and(|p| skeleton.joint(p).is_active());
            if !parent_active {
                roots.insert(joint.id());
            }
        }
        self.active_roots = roots
            .into_iter()
            .filter_map(|id| skeleton.index_of(id))
            .collect();
        self.active_joints = skeleton
            .indices()
            .filter(|&idx| skeleton.joint(idx).is_active())
            .collect();

        trace!(
            chains = self.chains.len(),
            active_roots = self.active_roots.len(),
            active_joints = self.active_joints.len(),
            "rebuilt chains"
        );
    }

    /// Walk from `start` toward the root, activating every joint on the way.
    ///
    /// The walk stops after adding a sub-root, the root, a joint with a
    /// position target, or a sub-base. Sub-bases are recorded in `sub_bases`.
    fn build_chain(
        skeleton: &mut Skeleton,
        start: usize,
        topology: &Topology,
        sub_bases: &mut BTreeSet<JointId>,
    ) -> Vec<usize> {
        let mut chain = vec![start];
        skeleton.joint_mut(start).activate();

        let mut next = skeleton.joint(start).parent;
        while let Some(idx) = next {
            chain.push(idx);
            let joint = skeleton.joint_mut(idx);
            joint.activate();
            let id = joint.id();
            if topology.is_sub_root(id) || Some(id) == topology.root_id || joint.has_pos_target() {
                break;
            }
            if (topology.sub_base_ids.is_empty() && joint.num_children() > 1)
                || topology.is_sub_base(id)
            {
                sub_bases.insert(id);
                break;
            }
            next = joint.parent;
        }
        trace!(start = %skeleton.joint(start).id(), len = chain.len(), "built chain");
        chain
    }

    /// Fold the chains of "false" sub-bases into the chain that ends at them.
    ///
    /// A false sub-base has no position target, is not whitelisted, and has
    /// only one active child.
    fn condense(&mut self, skeleton: &Skeleton, topology: &Topology) {
        let joins: Vec<JointId> = self
            .chains
            .iter()
            .filter(|&(&id, chain)| {
                let outer_end = chain[0];
                let joint = skeleton.joint(outer_end);
                !joint.has_pos_target()
                    && !topology.is_sub_base(id)
                    && skeleton.single_active_child(outer_end).is_some()
            })
            .map(|(&id, _)| id)
            .collect();

        for id in joins {
            let Some(&outer_end) = self.chains.get(&id).and_then(|donor| donor.first()) else {
                continue;
            };
            let recipient = self
                .chains
                .iter()
                .find(|&(&key, chain)| key != id && chain.last() == Some(&outer_end))
                .map(|(&key, _)| key);
            let Some(recipient) = recipient else {
                continue;
            };
            if let Some(donor) = self.chains.remove(&id) {
                if let Some(chain) = self.chains.get_mut(&recipient) {
                    chain.extend_from_slice(&donor[1..]);
                    trace!(donor = %id, recipient = %recipient, "joined chains");
                }
            }
        }
    }
}

/// When a joint and its parent both carry position targets, move the
/// parent's target to exactly one offset length from the child's target,
/// keeping the direction from the child's target toward the parent's.
fn snap_sequential_target(skeleton: &mut Skeleton, idx: usize, child_target: Vector3<f32>) {
    let joint = skeleton.joint(idx);
    let Some(parent) = joint.parent else {
        return;
    };
    let Some(parent_target) = skeleton.joint(parent).target_pos() else {
        return;
    };
    let length = joint.local_pos_length();
    let direction = normalize_or(&(parent_target - child_target), Vector3::zeros());
    let snapped = child_target + direction * length;
    trace!(
        joint = %joint.id(),
        parent = %skeleton.joint(parent).id(),
        "snapped sequential target"
    );
    skeleton.joint_mut(parent).set_target_pos(snapped);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
