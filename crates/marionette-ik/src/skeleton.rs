//! Joint arena.
//!
//! Joints live in a `Vec` and refer to each other by index. The id index is
//! a `BTreeMap` so every walk in id order is deterministic.

use std::collections::BTreeMap;
use std::sync::Arc;

use nalgebra::{UnitQuaternion, Vector3};

use crate::constraint::Constraint;
use crate::error::SkeletonError;
use crate::joint::{Joint, JointId, JointInfo, TargetPoint, WorldFrame};

#[derive(Debug, Default)]
pub(crate) struct Skeleton {
    joints: Vec<Joint>,
    index: BTreeMap<JointId, usize>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn index_of(&self, id: JointId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn get(&self, id: JointId) -> Option<&Joint> {
        self.index_of(id).map(|idx| &self.joints[idx])
    }

    pub fn joint(&self, idx: usize) -> &Joint {
        &self.joints[idx]
    }

    pub fn joint_mut(&mut self, idx: usize) -> &mut Joint {
        &mut self.joints[idx]
    }

    /// Arena indices in ascending id order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.index.values().copied()
    }

    /// Joints in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Joint> + '_ {
        self.indices().map(|idx| &self.joints[idx])
    }

    pub fn insert(
        &mut self,
        id: JointId,
        parent_id: Option<JointId>,
        info: JointInfo,
        constraint: Option<Arc<Constraint>>,
    ) -> Result<usize, SkeletonError> {
        if !id.is_valid() {
            return Err(SkeletonError::InvalidJointId(id));
        }
        if self.index.contains_key(&id) {
            return Err(SkeletonError::DuplicateJoint(id));
        }
        let parent = match parent_id {
            Some(parent_id) => Some(self.index_of(parent_id).ok_or(SkeletonError::MissingParent {
                joint: id,
                parent: parent_id,
            })?),
            None => None,
        };

        let parent_frame = parent.map(|p| self.joints[p].world_frame());
        let idx = self.joints.len();
        self.joints
            .push(Joint::new(id, info, constraint, parent, parent_frame.as_ref()));
        if let Some(p) = parent {
            self.joints[p].children.push(idx);
        }
        self.index.insert(id, idx);
        Ok(idx)
    }

    pub fn parent_frame(&self, idx: usize) -> Option<WorldFrame> {
        self.joints[idx].parent.map(|p| self.joints[p].world_frame())
    }

    fn parent_is_active(&self, idx: usize) -> bool {
        self.joints[idx]
            .parent
            .is_some_and(|p| self.joints[p].is_active())
    }

    /// Points the joint's bone should reach: its own position target, or
    /// the tips of its active children.
    pub fn target_points(&self, idx: usize) -> Vec<TargetPoint> {
        let joint = &self.joints[idx];
        if let Some(target_pos) = joint.target_pos() {
            return vec![TargetPoint {
                local: *joint.bone(),
                world: target_pos,
            }];
        }
        joint
            .children
            .iter()
            .map(|&c| &self.joints[c])
            .filter(|child| child.is_active())
            .map(|child| TargetPoint {
                local: *child.local_pos(),
                world: *child.world_pos(),
            })
            .collect()
    }

    /// The only active child, or `None` when there are zero or several.
    pub fn single_active_child(&self, idx: usize) -> Option<usize> {
        let mut active = self.joints[idx]
            .children
            .iter()
            .copied()
            .filter(|&c| self.joints[c].is_active());
        match (active.next(), active.next()) {
            (Some(child), None) => Some(child),
            _ => None,
        }
    }

    // ---- Recursive walks ----

    pub fn reset_recursively(&mut self, idx: usize) {
        let parent = self.parent_frame(idx);
        self.joints[idx].reset(parent.as_ref());
        for k in 0..self.joints[idx].children.len() {
            let child = self.joints[idx].children[k];
            self.reset_recursively(child);
        }
    }

    pub fn relax_rotations_recursively(&mut self, idx: usize, blend_factor: f32) {
        let blend_factor = blend_factor.clamp(0.0, 1.0);
        let parent = self.parent_frame(idx);
        self.joints[idx].relax_rot(blend_factor, parent.as_ref());
        for k in 0..self.joints[idx].children.len() {
            let child = self.joints[idx].children[k];
            if self.joints[child].is_active() {
                self.relax_rotations_recursively(child, blend_factor);
            }
        }
    }

    /// Longest tip-to-end distance from `idx` down to any leaf, plus
    /// `length` already accumulated above it.
    pub fn longest_chain_length(&self, idx: usize, length: f32) -> f32 {
        let joint = &self.joints[idx];
        let length = length + joint.local_pos_length();
        if joint.children.is_empty() {
            return length + joint.bone().norm();
        }
        joint
            .children
            .iter()
            .map(|&c| self.longest_chain_length(c, length))
            .fold(length, f32::max)
    }

    // ---- Per-joint steps with the parent frame supplied ----

    pub fn update_local_rot(&mut self, idx: usize) {
        let parent = self.parent_frame(idx);
        self.joints[idx].update_local_rot(parent.as_ref());
    }

    pub fn update_child_local_rots(&mut self, idx: usize) {
        let frame = self.joints[idx].world_frame();
        for k in 0..self.joints[idx].children.len() {
            let child = self.joints[idx].children[k];
            if self.joints[child].is_active() {
                self.joints[child].update_local_rot(Some(&frame));
            }
        }
    }

    pub fn update_pos_and_rot_from_parent(&mut self, idx: usize) {
        let parent = self.parent_frame(idx);
        self.joints[idx].update_pos_and_rot_from_parent(parent.as_ref());
    }

    pub fn update_end_inward(&mut self, idx: usize) {
        let targets = self.target_points(idx);
        let parent_active = self.parent_is_active(idx);
        self.joints[idx].update_end_inward(&targets, parent_active);
        self.update_child_local_rots(idx);
    }

    pub fn update_end_outward(&mut self, idx: usize) {
        let Some(parent) = self.parent_frame(idx) else {
            return;
        };
        let targets = self.target_points(idx);
        self.joints[idx].update_end_outward(&parent, &targets);
    }

    pub fn update_inward(&mut self, idx: usize, child: usize) {
        let child_pos = *self.joints[child].world_pos();
        let child_local_pos = *self.joints[child].local_pos();
        self.joints[idx].update_inward(&child_pos, &child_local_pos);
        let frame = self.joints[idx].world_frame();
        self.joints[child].update_local_rot(Some(&frame));
    }

    pub fn update_outward(&mut self, idx: usize) {
        if let Some(parent) = self.parent_frame(idx) {
            self.joints[idx].update_outward(&parent);
        }
    }

    /// Enforce the joint's constraint and refresh its world rotation if needed.
    pub fn enforce_constraint(&mut self, idx: usize) {
        if self.joints[idx].enforce_constraint() {
            let parent = self.parent_frame(idx);
            self.joints[idx].apply_local_rot(parent.as_ref());
        }
    }

    pub fn adjust_world_rot(&mut self, idx: usize, adjustment: &UnitQuaternion<f32>) {
        let parent = self.parent_frame(idx);
        self.joints[idx].adjust_world_rot(adjustment, parent.as_ref());
    }

    /// Untwist one joint, counter-rotating an unlocked parent when needed.
    pub fn untwist(&mut self, idx: usize) {
        let Some(p) = self.joints[idx].parent else {
            return;
        };
        let parent = &self.joints[p];
        let parent_frame = parent.world_frame();
        let parent_bone = (!parent.is_local_rot_locked()).then(|| parent.world_rot() * parent.bone());

        if let Some(parent_rot) = self.joints[idx].untwist(&parent_frame, parent_bone) {
            self.joints[p].set_world_rot(parent_rot);
            self.update_local_rot(p);
        }
    }

    pub fn swing_toward_targets(&mut self, idx: usize, targets: &[TargetPoint]) -> bool {
        let Some(parent) = self.parent_frame(idx) else {
            return false;
        };
        self.joints[idx].swing_toward_targets(targets, &parent)
    }

    pub fn transform_targets_to_parent_local(&self, idx: usize, targets: &mut [TargetPoint]) {
        let parent = self.parent_frame(idx);
        self.joints[idx].transform_targets_to_parent_local(targets, parent.as_ref());
    }

    pub fn world_tip_offset(&self, idx: usize) -> Vector3<f32> {
        let parent = self.parent_frame(idx);
        self.joints[idx].world_tip_offset(parent.as_ref())
    }

    /// World position of the joint's tip.
    pub fn world_tip_pos(&self, idx: usize) -> Vector3<f32> {
        *self.joints[idx].world_pos()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
