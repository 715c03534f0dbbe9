//! FABRIK solver over an articulated skeleton.
//!
//! Each [`Solver::solve`] rebuilds the chains for the current targets,
//! relaxes the active joints toward their rest pose, then iterates:
//!
//! 1. FABRIK pass (inward over chains in reverse id order, outward in
//!    forward order; constraints ignored)
//! 2. elbow drop for every registered wrist
//! 3. outward constraint enforcement
//! 4. untwist, followed by one more FABRIK pass
//!
//! until the largest end-effector error falls under the tolerance or the
//! iteration cap is reached. [`Algorithm::Ccd`] replaces the FABRIK steps
//! with damped coordinate-descent swings.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use nalgebra::{UnitQuaternion, Vector3};
use tracing::{debug, warn};

use crate::chain::{Chains, Topology};
use crate::config::{Algorithm, SolverConfig};
use crate::constraint::Constraint;
use crate::error::SkeletonError;
use crate::joint::{JointConfig, JointId, JointInfo};
use crate::math::{almost_equal, normalize_or, shortest_arc};
use crate::skeleton::Skeleton;

/// Solved local transform of one active joint, ready to hand back to the
/// animation side.
#[derive(Debug, Clone, PartialEq)]
pub struct JointPose {
    pub id: JointId,
    /// Tip position in the parent frame with the skeleton scale removed.
    /// Present when the frame config positioned the joint.
    pub local_pos: Option<Vector3<f32>>,
    pub local_rot: UnitQuaternion<f32>,
    /// Present when the frame config scaled the joint.
    pub local_scale: Option<Vector3<f32>>,
    pub constraint_disabled: bool,
}

/// Owns the skeleton and solves it toward per-frame joint configs.
#[derive(Debug)]
pub struct Solver {
    config: SolverConfig,
    skeleton: Skeleton,
    topology: Topology,
    wrist_ids: BTreeSet<JointId>,
    joint_configs: BTreeMap<JointId, JointConfig>,
    chains: Chains,
    last_error: f32,
    last_iterations: u32,
}

impl Default for Solver {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Solver {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            skeleton: Skeleton::new(),
            topology: Topology::default(),
            wrist_ids: BTreeSet::new(),
            joint_configs: BTreeMap::new(),
            chains: Chains::default(),
            last_error: 0.0,
            last_iterations: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SolverConfig::default())
    }

    pub const fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }

    pub const fn acceptable_error(&self) -> f32 {
        self.config.acceptable_error
    }

    // ---- Skeleton setup ----

    /// Register a joint. Parents must be added before their children.
    ///
    /// The first joint added without a parent becomes the root unless
    /// [`set_root_id`](Self::set_root_id) already chose one.
    pub fn add_joint(
        &mut self,
        id: JointId,
        parent: Option<JointId>,
        info: JointInfo,
        constraint: Option<Arc<Constraint>>,
    ) -> Result<(), SkeletonError> {
        if let Err(e) = self.skeleton.insert(id, parent, info, constraint) {
            warn!(joint = %id, error = %e, "failed to add joint");
            return Err(e);
        }
        if parent.is_none() && self.topology.root_id.is_none() {
            self.topology.root_id = Some(id);
        }
        Ok(())
    }

    pub fn set_root_id(&mut self, id: JointId) {
        self.topology.root_id = Some(id);
    }

    pub const fn root_id(&self) -> Option<JointId> {
        self.topology.root_id
    }

    /// Mark a joint as a wrist: its grandparent (the shoulder) is rotated
    /// each iteration so the elbow hangs down.
    pub fn add_wrist_id(&mut self, id: JointId) -> Result<(), SkeletonError> {
        if self.skeleton.get(id).is_none() {
            warn!(joint = %id, "cannot register unknown wrist");
            return Err(SkeletonError::UnknownJoint(id));
        }
        self.wrist_ids.insert(id);
        Ok(())
    }

    /// Restrict sub-bases to these joints. An empty set restores the
    /// default: every joint with more than one child.
    pub fn set_sub_base_ids(&mut self, ids: impl IntoIterator<Item = JointId>) {
        self.topology.sub_base_ids = ids.into_iter().collect();
    }

    /// Chains never extend past these joints.
    pub fn set_sub_root_ids(&mut self, ids: impl IntoIterator<Item = JointId>) {
        self.topology.sub_root_ids = ids.into_iter().collect();
    }

    pub fn num_joints(&self) -> usize {
        self.skeleton.len()
    }

    /// Registered joint ids in ascending order.
    pub fn joint_ids(&self) -> Vec<JointId> {
        self.skeleton.iter().map(|joint| joint.id()).collect()
    }

    /// Every joint back to bind pose.
    pub fn reset_skeleton(&mut self) {
        let roots: Vec<usize> = self
            .skeleton
            .indices()
            .filter(|&idx| self.skeleton.joint(idx).parent.is_none())
            .collect();
        for idx in roots {
            self.skeleton.reset_recursively(idx);
        }
    }

    /// Reload bind-pose geometry for one joint and swap its constraint.
    ///
    /// Used after the skeleton is rescaled. Reach values computed earlier
    /// with [`compute_reach`](Self::compute_reach) are stale afterwards.
    pub fn reset_joint_geometry(
        &mut self,
        id: JointId,
        constraint: Option<Arc<Constraint>>,
    ) -> Result<(), SkeletonError> {
        let Some(idx) = self.skeleton.index_of(id) else {
            warn!(joint = %id, "cannot reset geometry of unknown joint");
            return Err(SkeletonError::UnknownJoint(id));
        };
        let joint = self.skeleton.joint_mut(idx);
        joint.reset_from_info();
        joint.set_constraint(constraint);
        Ok(())
    }

    /// Offset from the tip of the ancestor to the end of the descendant.
    ///
    /// Order of the arguments does not matter for which joint is the
    /// ancestor, but the result is negated when `from_id > to_id`. Zero when
    /// the joints are not on one limb.
    pub fn compute_reach(&self, to_id: JointId, from_id: JointId) -> Vector3<f32> {
        let (ancestor, descendant, swapped) = if from_id > to_id {
            (to_id, from_id, true)
        } else {
            (from_id, to_id, false)
        };
        let mut reach = Vector3::zeros();
        if let Some(start) = self.skeleton.index_of(descendant) {
            let mut joint = self.skeleton.joint(start);
            let mut chain_reach = *joint.bone();
            loop {
                chain_reach += joint.local_pos();
                let Some(parent) = joint.parent else {
                    break;
                };
                joint = self.skeleton.joint(parent);
                if joint.id() == ancestor {
                    reach = chain_reach;
                    break;
                }
            }
        }
        if swapped {
            -reach
        } else {
            reach
        }
    }

    /// Longest path from the joint's tip to the end of any descendant bone.
    pub fn longest_chain_length(&self, id: JointId) -> Option<f32> {
        let idx = self.skeleton.index_of(id)?;
        let joint = self.skeleton.joint(idx);
        // The walk counts the joint's own offset; only the part below the tip matters
        Some(self.skeleton.longest_chain_length(idx, 0.0) - joint.local_pos_length())
    }

    // ---- Per-frame input ----

    /// Replace this frame's configs. Returns false, keeping the previous
    /// map, when nothing moved beyond tolerance.
    pub fn update_joint_configs(&mut self, configs: BTreeMap<JointId, JointConfig>) -> bool {
        let tolerance = self.config.acceptable_error;
        let changed = configs.len() != self.joint_configs.len()
            || self.joint_configs.iter().any(|(id, old)| {
                configs
                    .get(id)
                    .map_or(true, |new| config_changed(old, new, tolerance))
            });
        if changed {
            self.joint_configs = configs;
        }
        changed
    }

    pub const fn joint_configs(&self) -> &BTreeMap<JointId, JointConfig> {
        &self.joint_configs
    }

    // ---- Solve ----

    /// Solve toward the current configs. Returns the largest distance
    /// between a targeted joint's bone end and its target.
    pub fn solve(&mut self) -> f32 {
        self.chains
            .rebuild(&mut self.skeleton, &self.joint_configs, &self.topology);

        for &root in self.chains.active_roots() {
            self.skeleton
                .relax_rotations_recursively(root, self.config.relaxation_factor);
        }

        let mut max_error = f32::MAX;
        let mut iterations = 0;
        while iterations < self.config.min_iterations
            || (iterations < self.config.max_iterations && max_error > self.config.acceptable_error)
        {
            max_error = self.solve_once();
            iterations += 1;
        }
        self.last_error = max_error;
        self.last_iterations = iterations;

        debug!(
            algorithm = ?self.config.algorithm,
            chains = self.chains.len(),
            active_joints = self.chains.active_joints().len(),
            iterations,
            max_error,
            "solve finished"
        );
        max_error
    }

    /// Error measured at the end of the last [`solve`](Self::solve).
    pub const fn last_error(&self) -> f32 {
        self.last_error
    }

    /// Iterations run by the last [`solve`](Self::solve).
    pub const fn last_iterations(&self) -> u32 {
        self.last_iterations
    }

    fn solve_once(&mut self) -> f32 {
        match self.config.algorithm {
            Algorithm::Fabrik => self.execute_fabrik(),
            Algorithm::Ccd => {
                ccd_pass(&mut self.skeleton, &self.chains, self.config.acceptable_error);
                if self.config.drop_elbows {
                    self.drop_elbows();
                }
            }
        }
        self.measure_max_error()
    }

    fn execute_fabrik(&mut self) {
        fabrik_pass(&mut self.skeleton, &self.chains);
        if self.config.drop_elbows {
            self.drop_elbows();
        }
        if !self.config.enforce_constraints {
            return;
        }
        enforce_constraints_outward(&mut self.skeleton, &self.chains);
        if !self.config.untwist {
            return;
        }
        for chain in self.chains.iter() {
            untwist_chain(&mut self.skeleton, chain);
        }
        // Constraints are not re-enforced after this pass
        fabrik_pass(&mut self.skeleton, &self.chains);
    }

    fn drop_elbows(&mut self) {
        for &id in &self.wrist_ids {
            if let Some(wrist) = self.skeleton.index_of(id) {
                drop_elbow(&mut self.skeleton, wrist);
            }
        }
    }

    fn measure_max_error(&self) -> f32 {
        self.joint_configs
            .iter()
            .filter(|&(&id, config)| Some(id) != self.topology.root_id && config.has_target_pos())
            .filter_map(|(&id, _)| self.skeleton.get(id))
            .filter_map(|joint| {
                // The joint's copy carries any sequential-target snap
                joint
                    .target_pos()
                    .map(|target| (joint.world_end_pos() - target).norm())
            })
            .fold(0.0, f32::max)
    }

    // ---- Output ----

    pub fn joint_local_pos(&self, id: JointId) -> Option<Vector3<f32>> {
        self.skeleton.get(id).map(|joint| *joint.local_pos())
    }

    pub fn joint_local_rot(&self, id: JointId) -> Option<UnitQuaternion<f32>> {
        self.skeleton.get(id).map(|joint| *joint.local_rot())
    }

    pub fn joint_local_transform(&self, id: JointId) -> Option<(Vector3<f32>, UnitQuaternion<f32>)> {
        self.skeleton
            .get(id)
            .map(|joint| (*joint.local_pos(), *joint.local_rot()))
    }

    pub fn joint_world_pos(&self, id: JointId) -> Option<Vector3<f32>> {
        self.skeleton.get(id).map(|joint| *joint.world_pos())
    }

    pub fn joint_world_end_pos(&self, id: JointId) -> Option<Vector3<f32>> {
        self.skeleton.get(id).map(|joint| joint.world_end_pos())
    }

    pub fn joint_world_rot(&self, id: JointId) -> Option<UnitQuaternion<f32>> {
        self.skeleton.get(id).map(|joint| *joint.world_rot())
    }

    pub fn is_joint_active(&self, id: JointId) -> bool {
        self.skeleton.get(id).is_some_and(|joint| joint.is_active())
    }

    /// Joints touched by the last solve, in id order.
    pub fn active_joint_ids(&self) -> Vec<JointId> {
        self.chains
            .active_joints()
            .iter()
            .map(|&idx| self.skeleton.joint(idx).id())
            .collect()
    }

    /// Local transforms of every joint touched by the last solve.
    pub fn harvest(&self) -> Vec<JointPose> {
        self.chains
            .active_joints()
            .iter()
            .map(|&idx| {
                let joint = self.skeleton.joint(idx);
                let config = joint.config();
                let is_root = Some(joint.id()) == self.topology.root_id;
                let positioned = config.is_some_and(|c| {
                    c.has_local_pos() || (is_root && c.has_target_pos())
                });
                JointPose {
                    id: joint.id(),
                    local_pos: positioned.then(|| joint.pre_scaled_local_pos()),
                    local_rot: *joint.local_rot(),
                    local_scale: config
                        .filter(|c| c.has_local_scale())
                        .map(|_| *joint.local_scale()),
                    constraint_disabled: joint.has_disabled_constraint(),
                }
            })
            .collect()
    }

    /// Current chains as `(outer end, joints outer end first)`, by id.
    pub fn chain_layout(&self) -> Vec<(JointId, Vec<JointId>)> {
        self.chains.layout(&self.skeleton)
    }
}

fn config_changed(old: &JointConfig, new: &JointConfig, tolerance: f32) -> bool {
    !old.same_fields(new)
        || vector_moved(old.target_pos, new.target_pos, tolerance)
        || vector_moved(old.local_pos, new.local_pos, tolerance)
        || vector_moved(old.local_scale, new.local_scale, tolerance)
        || rotation_moved(old.target_rot, new.target_rot)
        || rotation_moved(old.local_rot, new.local_rot)
}

fn vector_moved(old: Option<Vector3<f32>>, new: Option<Vector3<f32>>, tolerance: f32) -> bool {
    match (old, new) {
        (Some(old), Some(new)) => (old - new).norm() > tolerance,
        (None, None) => false,
        _ => true,
    }
}

fn rotation_moved(old: Option<UnitQuaternion<f32>>, new: Option<UnitQuaternion<f32>>) -> bool {
    match (old, new) {
        (Some(old), Some(new)) => !almost_equal(&old, &new),
        (None, None) => false,
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// FABRIK
// ---------------------------------------------------------------------------

fn fabrik_pass(skeleton: &mut Skeleton, chains: &Chains) {
    // A sub-base needs every child chain resolved before it takes their
    // centroid, and chains are sorted by outer-end id
    for chain in chains.iter().rev() {
        fabrik_inward(skeleton, chain);
    }
    // The inward steps leave the inner ends' children untouched
    for &root in chains.active_roots() {
        skeleton.update_child_local_rots(root);
    }
    for chain in chains.iter() {
        fabrik_outward(skeleton, chain);
    }
}

fn fabrik_inward(skeleton: &mut Skeleton, chain: &[usize]) {
    skeleton.update_end_inward(chain[0]);
    // The inner end belongs to another chain or is an active root
    let last = chain.len() - 1;
    for i in 1..last {
        skeleton.update_inward(chain[i], chain[i - 1]);
    }
}

fn fabrik_outward(skeleton: &mut Skeleton, chain: &[usize]) {
    let last = chain.len() - 1;
    for i in (1..last).rev() {
        skeleton.update_outward(chain[i]);
    }
    skeleton.update_end_outward(chain[0]);
}

fn enforce_constraints_outward(skeleton: &mut Skeleton, chains: &Chains) {
    for chain in chains.iter() {
        let last = chain.len() - 1;
        for i in (0..last).rev() {
            skeleton.update_pos_and_rot_from_parent(chain[i]);
            skeleton.enforce_constraint(chain[i]);
        }
        skeleton.update_child_local_rots(chain[0]);
    }
}

fn untwist_chain(skeleton: &mut Skeleton, chain: &[usize]) {
    // Untwisting may counter-rotate the parent, so the inner end is left to
    // the chain that owns it
    let last = chain.len() - 1;
    for i in (0..last).rev() {
        skeleton.untwist(chain[i]);
    }
    skeleton.update_child_local_rots(chain[0]);
}

/// Rotate the shoulder about the shoulder-to-wrist axis so the elbow points
/// toward world down. A shoulder with its own position target, or one the
/// current solve does not touch, is left alone.
fn drop_elbow(skeleton: &mut Skeleton, wrist: usize) {
    let Some(elbow) = skeleton.joint(wrist).parent else {
        return;
    };
    let Some(shoulder) = skeleton.joint(elbow).parent else {
        return;
    };
    let shoulder_joint = skeleton.joint(shoulder);
    if shoulder_joint.has_pos_target() || !shoulder_joint.is_active() {
        return;
    }

    let shoulder_tip = skeleton.world_tip_pos(shoulder);
    let elbow_tip = skeleton.world_tip_pos(elbow);
    let elbow_end = skeleton.joint(elbow).world_end_pos();
    let axis = normalize_or(&(elbow_end - shoulder_tip), Vector3::zeros());

    let down = Vector3::z().cross(&axis).cross(&axis);
    let shoulder_bone = elbow_tip - shoulder_tip;
    let projection = shoulder_bone - shoulder_bone.dot(&axis) * axis;
    let adjustment = shortest_arc(&projection, &down);

    skeleton.adjust_world_rot(shoulder, &adjustment);
    // The elbow keeps its local rotation
    skeleton.update_pos_and_rot_from_parent(elbow);
    if skeleton.joint(wrist).is_active() {
        skeleton.update_local_rot(wrist);
    }
}

// ---------------------------------------------------------------------------
// CCD
// ---------------------------------------------------------------------------

fn ccd_pass(skeleton: &mut Skeleton, chains: &Chains, acceptable_error: f32) {
    for chain in chains.iter().rev() {
        ccd_inward(skeleton, chain);
    }
    // Inner-end children were not moved with their chains
    for chain in chains.iter() {
        shift_chain_to_base(skeleton, chain, acceptable_error);
    }
}

fn ccd_inward(skeleton: &mut Skeleton, chain: &[usize]) {
    let outer_end = chain[0];
    let mut targets = skeleton.target_points(outer_end);
    if !skeleton.swing_toward_targets(outer_end, &targets) {
        return;
    }

    let last = chain.len() - 1;
    let mut last_swung = 0;
    for i in 1..last {
        skeleton.transform_targets_to_parent_local(chain[i - 1], &mut targets);
        if !skeleton.swing_toward_targets(chain[i], &targets) {
            break;
        }
        last_swung = i;
    }

    for i in (0..last_swung).rev() {
        skeleton.update_pos_and_rot_from_parent(chain[i]);
    }
    skeleton.update_child_local_rots(outer_end);
}

fn shift_chain_to_base(skeleton: &mut Skeleton, chain: &[usize], acceptable_error: f32) {
    if chain.len() < 2 {
        return;
    }
    let last = chain.len() - 1;
    let offset = skeleton.world_tip_offset(chain[last - 1]);
    if offset.norm_squared() > acceptable_error * acceptable_error {
        for &idx in &chain[..last] {
            skeleton.joint_mut(idx).shift_pos(&-offset);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_z() -> JointInfo {
        JointInfo::new(Vector3::z(), Vector3::z())
    }

    /// root(0) -> 1 -> 2, each offset and bone one unit along z.
    fn straight_chain() -> Solver {
        let mut solver = Solver::with_defaults();
        solver
            .add_joint(JointId(0), None, JointInfo::new(Vector3::zeros(), Vector3::z()), None)
            .unwrap();
        solver.add_joint(JointId(1), Some(JointId(0)), unit_z(), None).unwrap();
        solver.add_joint(JointId(2), Some(JointId(1)), unit_z(), None).unwrap();
        solver
    }

    fn target(id: i16, pos: Vector3<f32>) -> BTreeMap<JointId, JointConfig> {
        [(JointId(id), JointConfig::new().with_target_pos(pos))].into()
    }

    const SHOULDER: JointId = JointId(1);
    const ELBOW: JointId = JointId(2);
    const WRIST: JointId = JointId(3);

    /// Locked collar(0) ending at (0.2, 0, 1), then shoulder, elbow and wrist
    /// laid out along +x at height 1.
    fn level_arm(drop_elbows: bool) -> Solver {
        let mut solver = Solver::new(SolverConfig {
            drop_elbows,
            ..SolverConfig::default()
        });
        let along_x = |x: f32| Vector3::new(x, 0.0, 0.0);
        solver
            .add_joint(JointId(0), None, JointInfo::new(Vector3::z(), along_x(0.2)), None)
            .unwrap();
        solver
            .add_joint(SHOULDER, Some(JointId(0)), JointInfo::new(along_x(0.2), along_x(0.4)), None)
            .unwrap();
        solver
            .add_joint(ELBOW, Some(SHOULDER), JointInfo::new(along_x(0.4), along_x(0.4)), None)
            .unwrap();
        solver
            .add_joint(WRIST, Some(ELBOW), JointInfo::new(along_x(0.4), along_x(0.1)), None)
            .unwrap();
        solver.add_wrist_id(WRIST).unwrap();
        solver
    }

    #[test]
    fn first_parentless_joint_is_root() {
        let solver = straight_chain();
        assert_eq!(solver.root_id(), Some(JointId(0)));
        assert_eq!(solver.num_joints(), 3);
        assert_eq!(solver.joint_ids(), [JointId(0), JointId(1), JointId(2)]);
    }

    #[test]
    fn add_joint_errors_leave_skeleton_unchanged() {
        let mut solver = straight_chain();
        let err = solver
            .add_joint(JointId(7), Some(JointId(6)), unit_z(), None)
            .unwrap_err();
        assert_eq!(
            err,
            SkeletonError::MissingParent {
                joint: JointId(7),
                parent: JointId(6)
            }
        );
        assert_eq!(solver.num_joints(), 3);
        assert!(solver.joint_local_pos(JointId(7)).is_none());
    }

    #[test]
    fn unknown_wrist_is_rejected() {
        let mut solver = straight_chain();
        assert_eq!(
            solver.add_wrist_id(JointId(9)),
            Err(SkeletonError::UnknownJoint(JointId(9)))
        );
        assert!(solver.add_wrist_id(JointId(2)).is_ok());
    }

    #[test]
    fn solve_reaches_off_axis_target() {
        let mut solver = straight_chain();
        let goal = Vector3::new(0.0, 0.5, 2.7);
        assert!(solver.update_joint_configs(target(2, goal)));
        let error = solver.solve();
        assert!(error <= solver.acceptable_error(), "error {error}");
        assert_relative_eq!(solver.last_error(), error);
        let end = solver.joint_world_end_pos(JointId(2)).unwrap();
        assert_relative_eq!(end, goal, epsilon = 1e-2);
    }

    #[test]
    fn drop_elbows_lowers_the_elbow() {
        // Wrist target in the arm's horizontal plane: plain FABRIK keeps the
        // bend in that plane
        let goal = Vector3::new(0.5, 0.2, 1.0);
        let elbow_height = |drop_elbows: bool| {
            let mut solver = level_arm(drop_elbows);
            solver.update_joint_configs(target(WRIST.0, goal));
            solver.solve();
            assert!(solver.is_joint_active(SHOULDER));
            solver.joint_world_pos(ELBOW).unwrap().z
        };

        let level = elbow_height(false);
        let dropped = elbow_height(true);
        assert_relative_eq!(level, 1.0, epsilon = 1e-3);
        assert!(dropped < level - 0.05, "elbow at z={dropped}, level at z={level}");
    }

    #[test]
    fn drop_elbows_leaves_targeted_shoulder_alone() {
        let mut configs = target(WRIST.0, Vector3::new(0.5, 0.2, 1.0));
        configs.insert(
            SHOULDER,
            JointConfig::new().with_target_pos(Vector3::new(0.55, 0.1, 1.1)),
        );
        let solve = |drop_elbows: bool| {
            let mut solver = level_arm(drop_elbows);
            solver.update_joint_configs(configs.clone());
            solver.solve();
            (
                solver.joint_world_pos(ELBOW).unwrap(),
                solver.joint_world_end_pos(WRIST).unwrap(),
            )
        };

        let (elbow_plain, wrist_plain) = solve(false);
        let (elbow, wrist) = solve(true);
        // The elbow stays where the shoulder target put it
        assert!(elbow.z > 1.0, "elbow pulled down to z={}", elbow.z);
        assert_relative_eq!(elbow, elbow_plain, epsilon = 1e-6);
        assert_relative_eq!(wrist, wrist_plain, epsilon = 1e-6);
    }

    #[test]
    fn update_joint_configs_ignores_small_moves() {
        let mut solver = straight_chain();
        let goal = Vector3::new(0.0, 0.5, 2.7);
        assert!(solver.update_joint_configs(target(2, goal)));
        assert!(!solver.update_joint_configs(target(2, goal + Vector3::repeat(1.0e-5))));
        assert!(solver.update_joint_configs(target(2, goal + Vector3::new(0.1, 0.0, 0.0))));

        // Same position, extra field
        let mut configs = target(2, goal);
        configs.insert(JointId(1), JointConfig::new().with_local_rot(UnitQuaternion::identity()));
        assert!(solver.update_joint_configs(configs.clone()));
        assert!(!solver.update_joint_configs(configs));

        // Same keys and fields, rotation moved
        let mut rotated = target(2, goal);
        rotated.insert(
            JointId(1),
            JointConfig::new().with_local_rot(UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.3)),
        );
        assert!(solver.update_joint_configs(rotated));
    }

    #[test]
    fn compute_reach_sums_offsets_and_bone() {
        let solver = straight_chain();
        // From the root's tip: offsets of 1 and 2, plus 2's bone
        assert_relative_eq!(solver.compute_reach(JointId(2), JointId(0)), Vector3::new(0.0, 0.0, 3.0));
        assert_relative_eq!(solver.compute_reach(JointId(0), JointId(2)), Vector3::new(0.0, 0.0, -3.0));
        assert_relative_eq!(solver.compute_reach(JointId(2), JointId(1)), Vector3::new(0.0, 0.0, 2.0));
        assert_relative_eq!(solver.compute_reach(JointId(2), JointId(5)), Vector3::zeros());
    }

    #[test]
    fn longest_chain_length_below_joint() {
        let solver = straight_chain();
        assert_relative_eq!(solver.longest_chain_length(JointId(0)).unwrap(), 3.0);
        assert_relative_eq!(solver.longest_chain_length(JointId(2)).unwrap(), 1.0);
        assert!(solver.longest_chain_length(JointId(4)).is_none());
    }

    #[test]
    fn reset_skeleton_restores_bind_pose() {
        let mut solver = straight_chain();
        solver.update_joint_configs(target(2, Vector3::new(1.5, 0.0, 1.5)));
        solver.solve();
        assert!(solver.joint_world_end_pos(JointId(2)).unwrap().x > 0.5);

        solver.reset_skeleton();
        assert_relative_eq!(
            solver.joint_world_end_pos(JointId(2)).unwrap(),
            Vector3::new(0.0, 0.0, 3.0),
            epsilon = 1e-6
        );
        assert_relative_eq!(solver.joint_local_rot(JointId(1)).unwrap().angle(), 0.0);
    }

    #[test]
    fn reset_joint_geometry_requires_known_joint() {
        let mut solver = straight_chain();
        assert!(solver.reset_joint_geometry(JointId(1), None).is_ok());
        assert_eq!(
            solver.reset_joint_geometry(JointId(12), None),
            Err(SkeletonError::UnknownJoint(JointId(12)))
        );
    }

    #[test]
    fn solve_without_configs_is_a_no_op() {
        let mut solver = straight_chain();
        assert_relative_eq!(solver.solve(), 0.0);
        assert!(solver.active_joint_ids().is_empty());
        assert!(solver.chain_layout().is_empty());
        assert_relative_eq!(
            solver.joint_world_end_pos(JointId(2)).unwrap(),
            Vector3::new(0.0, 0.0, 3.0)
        );
    }

    #[test]
    fn harvest_reports_active_joints() {
        let mut solver = straight_chain();
        let mut configs = target(2, Vector3::new(0.0, 0.5, 2.7));
        configs.insert(
            JointId(1),
            JointConfig::new()
                .with_local_scale(Vector3::repeat(1.0))
                .with_disabled_constraint(),
        );
        solver.update_joint_configs(configs);
        solver.solve();

        let poses = solver.harvest();
        let ids: Vec<_> = poses.iter().map(|p| p.id).collect();
        assert_eq!(ids, [JointId(0), JointId(1), JointId(2)]);
        assert_eq!(solver.active_joint_ids(), ids);

        let mid = &poses[1];
        assert!(mid.constraint_disabled);
        assert!(mid.local_pos.is_none());
        assert_relative_eq!(mid.local_scale.unwrap(), Vector3::repeat(1.0));
        assert_eq!(mid.local_rot, solver.joint_local_rot(JointId(1)).unwrap());
        assert!(poses[2].local_scale.is_none());
        assert!(!poses[2].constraint_disabled);
    }
}
