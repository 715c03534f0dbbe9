//! Skeleton nodes and the per-joint steps of FABRIK and CCD.
//!
//! A [`Joint`] never reaches into its parent. Every operation that needs the
//! parent's pose takes it as a [`WorldFrame`] argument, and the skeleton
//! arena supplies it while walking the tree.

use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use nalgebra::{UnitQuaternion, Vector3};
use tracing::debug;

use crate::constraint::Constraint;
use crate::math::{almost_equal_within, blend, mean_rotation, normalize_or, shortest_arc};

/// Blend applied when a new local rotation is written through
/// [`Joint::set_local_rot`].
const LOCAL_ROT_BLEND: f32 = 0.25;

/// Backpressure toward a world-rotation target.
const ROT_TARGET_BACKPRESSURE: f32 = 0.5;

/// Fraction of the full swing applied per CCD step.
const SWING_FACTOR: f32 = 0.25;

/// CCD swings smaller than this are considered aligned.
const MIN_SWING_ANGLE: f32 = 0.001 * PI;

const UNTWIST_BLEND: f32 = 0.25;

/// Bone displacement (relative to bone length) that triggers a parent
/// counter-rotation during untwist.
const MIN_UNTWIST_DELTA: f32 = 0.01;

const MIN_SWING_AXIS_LENGTH: f32 = 1.0e-3;

const MIN_INVERTIBLE_SCALE: f32 = 1.0e-15;

// ---------------------------------------------------------------------------
// Identity and definitions
// ---------------------------------------------------------------------------

/// Skeleton joint identifier. Negative ids are invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JointId(pub i16);

impl JointId {
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl From<i16> for JointId {
    fn from(id: i16) -> Self {
        Self(id)
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bind-pose geometry of one joint, supplied by the skeleton definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointInfo {
    /// Tip of this joint in the parent's frame (unscaled).
    pub position: Vector3<f32>,
    /// End of the bone in this joint's frame (unscaled).
    pub end: Vector3<f32>,
    /// Skeleton scale baked into position and end.
    pub scale: Vector3<f32>,
}

impl JointInfo {
    pub fn new(position: Vector3<f32>, end: Vector3<f32>) -> Self {
        Self {
            position,
            end,
            scale: Vector3::repeat(1.0),
        }
    }

    pub fn with_scale(mut self, scale: Vector3<f32>) -> Self {
        self.scale = scale;
        self
    }
}

/// Per-frame request for one joint.
///
/// Each field is optional so a target at the origin is distinct from no
/// target at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointConfig {
    /// World-frame position for the end of the bone.
    pub target_pos: Option<Vector3<f32>>,
    /// World-frame orientation of the joint.
    pub target_rot: Option<UnitQuaternion<f32>>,
    /// Forced tip position in the parent's frame.
    pub local_pos: Option<Vector3<f32>>,
    /// Forced rotation relative to the parent. Locks the joint.
    pub local_rot: Option<UnitQuaternion<f32>>,
    /// Scale applied on top of the skeleton scale.
    pub local_scale: Option<Vector3<f32>>,
    /// Skip this joint's constraint for the frame.
    pub disable_constraint: bool,
}

impl JointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_pos(mut self, pos: Vector3<f32>) -> Self {
        self.target_pos = Some(pos);
        self
    }

    pub fn with_target_rot(mut self, rot: UnitQuaternion<f32>) -> Self {
        self.target_rot = Some(rot);
        self
    }

    pub fn with_local_pos(mut self, pos: Vector3<f32>) -> Self {
        self.local_pos = Some(pos);
        self
    }

    pub fn with_local_rot(mut self, rot: UnitQuaternion<f32>) -> Self {
        self.local_rot = Some(rot);
        self
    }

    pub fn with_local_scale(mut self, scale: Vector3<f32>) -> Self {
        self.local_scale = Some(scale);
        self
    }

    pub fn with_disabled_constraint(mut self) -> Self {
        self.disable_constraint = true;
        self
    }

    pub const fn has_target_pos(&self) -> bool {
        self.target_pos.is_some()
    }

    pub const fn has_target_rot(&self) -> bool {
        self.target_rot.is_some()
    }

    pub const fn has_local_pos(&self) -> bool {
        self.local_pos.is_some()
    }

    pub const fn has_local_rot(&self) -> bool {
        self.local_rot.is_some()
    }

    pub const fn has_local_scale(&self) -> bool {
        self.local_scale.is_some()
    }

    /// Whether any rotation (local or world) is requested.
    pub const fn has_rot(&self) -> bool {
        self.has_local_rot() || self.has_target_rot()
    }

    /// Whether any position (local or world) is requested.
    pub const fn has_pos(&self) -> bool {
        self.has_local_pos() || self.has_target_pos()
    }

    /// Whether two configs request the same set of fields.
    pub const fn same_fields(&self, other: &Self) -> bool {
        self.has_target_pos() == other.has_target_pos()
            && self.has_target_rot() == other.has_target_rot()
            && self.has_local_pos() == other.has_local_pos()
            && self.has_local_rot() == other.has_local_rot()
            && self.has_local_scale() == other.has_local_scale()
            && self.disable_constraint == other.disable_constraint
    }

    /// Merge every field present in `other` into `self`.
    pub fn update_from(&mut self, other: &Self) {
        if self.same_fields(other) {
            *self = other.clone();
            return;
        }
        if other.local_pos.is_some() {
            self.local_pos = other.local_pos;
        }
        if other.local_rot.is_some() {
            self.local_rot = other.local_rot;
        }
        if other.target_pos.is_some() {
            self.target_pos = other.target_pos;
        }
        if other.target_rot.is_some() {
            self.target_rot = other.target_rot;
        }
        if other.local_scale.is_some() {
            self.local_scale = other.local_scale;
        }
        if other.disable_constraint {
            self.disable_constraint = true;
        }
    }
}

/// World-frame pose of a joint's tip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldFrame {
    pub pos: Vector3<f32>,
    pub rot: UnitQuaternion<f32>,
}

impl WorldFrame {
    /// Position of a point given in this frame.
    pub fn transform_point(&self, local: &Vector3<f32>) -> Vector3<f32> {
        self.pos + self.rot * local
    }
}

/// A point tracked by a joint: where it sits in the joint's frame and where
/// it should be in the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetPoint {
    pub local: Vector3<f32>,
    pub world: Vector3<f32>,
}

// ---------------------------------------------------------------------------
// Joint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Joint {
    id: JointId,
    info: JointInfo,
    constraint: Option<Arc<Constraint>>,
    config: Option<JointConfig>,

    // Arena indices
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,

    local_pos: Vector3<f32>,
    bone: Vector3<f32>,
    local_pos_length: f32,
    local_scale: Vector3<f32>,
    local_rot: UnitQuaternion<f32>,

    pos: Vector3<f32>,
    rot: UnitQuaternion<f32>,

    active: bool,
    local_rot_locked: bool,
}

impl Joint {
    pub(crate) fn new(
        id: JointId,
        info: JointInfo,
        constraint: Option<Arc<Constraint>>,
        parent: Option<usize>,
        parent_frame: Option<&WorldFrame>,
    ) -> Self {
        let mut joint = Self {
            id,
            info,
            constraint,
            config: None,
            parent,
            children: Vec::new(),
            local_pos: Vector3::zeros(),
            bone: Vector3::zeros(),
            local_pos_length: 0.0,
            local_scale: Vector3::repeat(1.0),
            local_rot: UnitQuaternion::identity(),
            pos: Vector3::zeros(),
            rot: UnitQuaternion::identity(),
            active: false,
            // The root keeps whatever orientation it starts the solve with
            local_rot_locked: parent.is_none(),
        };
        joint.reset(parent_frame);
        joint
    }

    // ---- Accessors ----

    pub const fn id(&self) -> JointId {
        self.id
    }

    pub const fn info(&self) -> &JointInfo {
        &self.info
    }

    pub fn constraint(&self) -> Option<&Arc<Constraint>> {
        self.constraint.as_ref()
    }

    pub const fn config(&self) -> Option<&JointConfig> {
        self.config.as_ref()
    }

    pub const fn local_pos(&self) -> &Vector3<f32> {
        &self.local_pos
    }

    pub const fn bone(&self) -> &Vector3<f32> {
        &self.bone
    }

    pub const fn local_pos_length(&self) -> f32 {
        self.local_pos_length
    }

    pub const fn local_scale(&self) -> &Vector3<f32> {
        &self.local_scale
    }

    pub const fn local_rot(&self) -> &UnitQuaternion<f32> {
        &self.local_rot
    }

    /// World position of the joint's tip.
    pub const fn world_pos(&self) -> &Vector3<f32> {
        &self.pos
    }

    pub const fn world_rot(&self) -> &UnitQuaternion<f32> {
        &self.rot
    }

    pub fn world_frame(&self) -> WorldFrame {
        WorldFrame {
            pos: self.pos,
            rot: self.rot,
        }
    }

    pub fn world_end_pos(&self) -> Vector3<f32> {
        self.pos + self.rot * self.bone
    }

    pub const fn is_active(&self) -> bool {
        self.active
    }

    pub const fn is_local_rot_locked(&self) -> bool {
        self.local_rot_locked
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    pub fn target_pos(&self) -> Option<Vector3<f32>> {
        self.config.as_ref().and_then(|c| c.target_pos)
    }

    pub fn target_rot(&self) -> Option<UnitQuaternion<f32>> {
        self.config.as_ref().and_then(|c| c.target_rot)
    }

    pub fn has_pos_target(&self) -> bool {
        self.target_pos().is_some()
    }

    pub fn has_disabled_constraint(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.disable_constraint)
    }

    /// The constraint in effect this frame, if any.
    fn active_constraint(&self) -> Option<&Constraint> {
        if self.has_disabled_constraint() {
            return None;
        }
        self.constraint.as_deref()
    }

    // ---- Setup and per-solve state ----

    pub(crate) fn set_constraint(&mut self, constraint: Option<Arc<Constraint>>) {
        self.constraint = constraint;
    }

    /// Restore geometry from the bind-pose definition.
    pub(crate) fn reset_from_info(&mut self) {
        let scale = self.info.scale;
        self.local_pos = self.info.position.component_mul(&scale);
        self.bone = self.info.end.component_mul(&scale);
        self.local_pos_length = self.local_pos.norm();
        // Only the per-frame tweak lives here; the info scale is already baked in
        self.local_scale = Vector3::repeat(1.0);
    }

    /// Back to bind pose relative to `parent`. Outside solve iterations only.
    pub(crate) fn reset(&mut self, parent: Option<&WorldFrame>) {
        self.reset_from_info();
        self.local_rot = UnitQuaternion::identity();
        match parent {
            Some(parent) => {
                self.pos = parent.transform_point(&self.local_pos);
                self.rot = parent.rot;
            }
            None => {
                self.pos = self.local_pos;
                self.rot = self.local_rot;
            }
        }
    }

    /// Clear per-solve flags and the remembered config.
    pub(crate) fn reset_flags(&mut self) {
        self.config = None;
        self.active = false;
        self.local_rot_locked = self.parent.is_none();
    }

    pub(crate) fn set_config(&mut self, config: JointConfig) {
        self.config = Some(config);
    }

    /// Move this solve's position target. No-op without one.
    pub(crate) fn set_target_pos(&mut self, pos: Vector3<f32>) {
        if let Some(config) = self.config.as_mut().filter(|c| c.has_target_pos()) {
            config.target_pos = Some(pos);
        }
    }

    pub(crate) fn activate(&mut self) {
        self.active = true;
    }

    pub(crate) fn lock_local_rot(&mut self, local_rot: UnitQuaternion<f32>) {
        self.local_rot = local_rot;
        self.local_rot_locked = true;
        self.activate();
        if self.parent.is_none() {
            self.rot = local_rot;
        }
    }

    /// Override the tip position in the parent frame, scaled by the current
    /// local scale.
    pub(crate) fn set_local_pos(&mut self, pos: &Vector3<f32>) {
        self.local_pos = pos.component_mul(&self.local_scale);
        self.local_pos_length = self.local_pos.norm();
        if self.parent.is_none() {
            self.pos = self.local_pos;
        }
    }

    /// Apply a per-frame scale relative to the previously applied one.
    pub(crate) fn set_local_scale(&mut self, scale: &Vector3<f32>) {
        let re_scale = scale.zip_map(&self.local_scale, |new, old| {
            if old > MIN_INVERTIBLE_SCALE {
                new / old
            } else {
                0.0
            }
        });
        self.local_scale = *scale;
        self.bone.component_mul_assign(&re_scale);
        self.local_pos.component_mul_assign(&re_scale);
        self.local_pos_length = self.local_pos.norm();
    }

    /// `local_pos` with the skeleton scale removed.
    pub fn pre_scaled_local_pos(&self) -> Vector3<f32> {
        self.local_pos.zip_map(&self.info.scale, |p, s| {
            if s > MIN_INVERTIBLE_SCALE {
                p / s
            } else {
                0.0
            }
        })
    }

    /// Blend the local rotation toward `new_local_rot` unless locked.
    pub fn set_local_rot(&mut self, new_local_rot: UnitQuaternion<f32>) {
        if !self.local_rot_locked {
            self.local_rot = blend(&self.local_rot, &new_local_rot, LOCAL_ROT_BLEND);
        }
    }

    pub(crate) fn set_world_rot(&mut self, rot: UnitQuaternion<f32>) {
        self.rot = rot;
    }

    pub(crate) fn shift_pos(&mut self, shift: &Vector3<f32>) {
        self.pos += shift;
    }

    // ---- Transform bookkeeping ----

    /// Blend toward the rest rotation, then re-derive the world pose.
    pub(crate) fn relax_rot(&mut self, blend_factor: f32, parent: Option<&WorldFrame>) {
        if !self.local_rot_locked {
            self.local_rot = blend(&self.local_rot, &UnitQuaternion::identity(), blend_factor);
        }
        match parent {
            Some(parent) => {
                self.rot = parent.rot * self.local_rot;
                self.rot.renormalize();
                self.pos = parent.transform_point(&self.local_pos);
            }
            None => {
                self.rot = self.local_rot;
                self.pos = self.local_pos;
            }
        }
    }

    pub(crate) fn update_pos_and_rot_from_parent(&mut self, parent: Option<&WorldFrame>) {
        if let Some(parent) = parent {
            self.pos = parent.transform_point(&self.local_pos);
            self.rot = parent.rot * self.local_rot;
            self.rot.renormalize();
        }
    }

    /// Re-derive the local rotation from the world rotations.
    pub(crate) fn update_local_rot(&mut self, parent: Option<&WorldFrame>) {
        if self.local_rot_locked {
            return;
        }
        if let Some(parent) = parent {
            self.local_rot = parent.rot.inverse() * self.rot;
            self.local_rot.renormalize();
        }
    }

    /// Re-derive the world rotation from the local rotation, pulled halfway
    /// toward a world-rotation target when there is one.
    pub(crate) fn apply_local_rot(&mut self, parent: Option<&WorldFrame>) {
        let Some(parent) = parent else {
            return;
        };
        let new_rot = parent.rot * self.local_rot;
        match self.target_rot() {
            Some(target_rot) => {
                self.rot = blend(&target_rot, &new_rot, ROT_TARGET_BACKPRESSURE);
                self.local_rot = parent.rot.inverse() * self.rot;
                self.local_rot.renormalize();
            }
            None => {
                self.rot = new_rot;
                self.rot.renormalize();
            }
        }
    }

    /// Offset between the current tip and where the parent says it should be.
    pub(crate) fn world_tip_offset(&self, parent: Option<&WorldFrame>) -> Vector3<f32> {
        match parent {
            Some(parent) => self.pos - parent.transform_point(&self.local_pos),
            None => self.pos,
        }
    }

    /// Project the local rotation into the constraint.
    ///
    /// Returns true when the world rotation needs refreshing: the constraint
    /// moved the local rotation, or the local rotation is locked.
    pub(crate) fn enforce_constraint(&mut self) -> bool {
        if self.local_rot_locked {
            return true;
        }
        let adjusted = self
            .active_constraint()
            .and_then(|c| c.enforce(&self.local_rot));
        match adjusted {
            Some(adjusted) => {
                self.set_local_rot(adjusted);
                true
            }
            None => false,
        }
    }

    /// Apply a world-frame correction and re-enforce the constraint.
    pub(crate) fn adjust_world_rot(&mut self, adjustment: &UnitQuaternion<f32>, parent: Option<&WorldFrame>) {
        if self.local_rot_locked {
            return;
        }
        self.rot = adjustment * self.rot;
        self.update_local_rot(parent);
        if self.enforce_constraint() {
            self.apply_local_rot(parent);
        }
    }

    // ---- FABRIK primitives (constraints are not enforced here) ----

    /// Inward step for the outer end of a chain: move the tip so the bone
    /// reaches its target(s).
    pub(crate) fn update_end_inward(&mut self, targets: &[TargetPoint], parent_active: bool) {
        if let Some(target_rot) = self.target_rot() {
            self.rot = target_rot;
            if let Some(target_pos) = self.target_pos() {
                self.pos = target_pos - self.rot * self.bone;
            }
            return;
        }
        match targets {
            [] => debug!(joint = %self.id, "outer end has no targets"),
            [target] => {
                let current_dir = self.rot * target.local;
                let bone_dir = normalize_or(&(target.world - self.pos), normalize_or(&current_dir, Vector3::z()));
                self.pos = target.world - target.local.norm() * bone_dir;
                self.rot = shortest_arc(&current_dir, &bone_dir) * self.rot;
                self.rot.renormalize();
            }
            _ => {
                let mut new_pos = Vector3::zeros();
                let adjustments: Vec<_> = targets
                    .iter()
                    .map(|target| {
                        let new_bone = normalize_or(&(target.world - self.pos), Vector3::zeros())
                            * target.local.norm();
                        new_pos += target.world - new_bone;
                        shortest_arc(&(self.rot * target.local), &new_bone)
                    })
                    .collect();
                if parent_active {
                    self.pos = new_pos / targets.len() as f32;
                }
                self.rot = mean_rotation(adjustments) * self.rot;
                self.rot.renormalize();
            }
        }
    }

    /// Outward step for the outer end of a chain: reattach to the parent and
    /// swing toward the target(s).
    pub(crate) fn update_end_outward(&mut self, parent: &WorldFrame, targets: &[TargetPoint]) {
        self.pos = parent.transform_point(&self.local_pos);
        if self.local_rot_locked {
            self.rot = parent.rot * self.local_rot;
            return;
        }
        if let Some(target_rot) = self.target_rot() {
            self.rot = target_rot;
            if let Some(target_pos) = self.target_pos() {
                self.pos = target_pos - self.rot * self.bone;
            }
        } else {
            let adjustment = match targets {
                [] => UnitQuaternion::identity(),
                [target] => shortest_arc(&(self.rot * target.local), &(target.world - self.pos)),
                _ => mean_rotation(
                    targets
                        .iter()
                        .map(|t| shortest_arc(&(self.rot * t.local), &(t.world - self.pos))),
                ),
            };
            self.rot = adjustment * self.rot;
            self.rot.renormalize();
        }
        self.update_local_rot(Some(parent));
    }

    /// Inward step for an interior joint: place the tip one child-offset
    /// away from the child's new position.
    ///
    /// The child's local rotation must be refreshed by the caller.
    pub(crate) fn update_inward(&mut self, child_pos: &Vector3<f32>, child_local_pos: &Vector3<f32>) {
        let old_bone = self.rot * child_local_pos;
        let bone_dir = normalize_or(&(child_pos - self.pos), normalize_or(&old_bone, Vector3::z()));
        self.pos = child_pos - child_local_pos.norm() * bone_dir;
        self.rot = shortest_arc(&old_bone, &bone_dir) * self.rot;
        self.rot.renormalize();
    }

    /// Outward step for an interior joint: reattach to the parent while
    /// keeping the bone pointed at its previous end.
    pub(crate) fn update_outward(&mut self, parent: &WorldFrame) {
        let old_end_pos = self.world_end_pos();
        self.pos = parent.transform_point(&self.local_pos);
        let old_bone = self.rot * self.bone;
        let new_bone = old_end_pos - self.pos;
        self.rot = shortest_arc(&old_bone, &new_bone) * self.rot;
        self.rot.renormalize();
        self.update_local_rot(Some(parent));
    }

    // ---- CCD ----

    /// Re-express targets tracked in this joint's frame in the parent's frame.
    pub(crate) fn transform_targets_to_parent_local(&self, targets: &mut [TargetPoint], parent: Option<&WorldFrame>) {
        let Some(parent) = parent else {
            return;
        };
        let world_to_parent = parent.rot.inverse();
        for target in targets {
            let world_point = self.pos + self.rot * target.local - parent.pos;
            target.local = world_to_parent * world_point;
        }
    }

    /// Swing a damped step toward the targets, then re-enforce the
    /// constraint. Returns false when already aligned.
    pub(crate) fn swing_toward_targets(&mut self, targets: &[TargetPoint], parent: &WorldFrame) -> bool {
        if self.local_rot_locked {
            // Nothing to swing, but the targets are not known to be aligned
            return true;
        }

        let mut changed = false;
        if let Some(target_rot) = self.target_rot() {
            self.rot = target_rot;
            changed = true;
        } else {
            let adjustment = match targets {
                [target] => shortest_arc(&(self.rot * target.local), &(target.world - self.pos)),
                _ => mean_rotation(
                    targets
                        .iter()
                        .map(|t| shortest_arc(&(self.rot * t.local), &(t.world - self.pos))),
                ),
            };
            if !almost_equal_within(&adjustment, &UnitQuaternion::identity(), MIN_SWING_ANGLE) {
                // Partial swing spreads the motion along the chain
                let adjustment = blend(&UnitQuaternion::identity(), &adjustment, SWING_FACTOR);
                self.rot = adjustment * self.rot;
                self.rot.renormalize();
                changed = true;
            }
        }

        if changed {
            self.local_rot = parent.rot.inverse() * self.rot;
            self.local_rot.renormalize();
            if self.enforce_constraint() {
                self.apply_local_rot(Some(parent));
            }
        }
        changed
    }

    // ---- Untwist ----

    /// Blend a quarter of the way toward the least-twisted rotation with the
    /// same swing.
    ///
    /// `parent_bone` is the parent's world-frame bone when the parent may be
    /// counter-rotated. If removing twist would move this bone noticeably,
    /// the parent is rotated about its own bone to compensate and the new
    /// parent world rotation is returned for the caller to apply.
    pub(crate) fn untwist(
        &mut self,
        parent: &WorldFrame,
        parent_bone: Option<Vector3<f32>>,
    ) -> Option<UnitQuaternion<f32>> {
        if let Some(target_rot) = self.target_rot() {
            self.rot = target_rot;
            self.update_local_rot(Some(parent));
            return None;
        }
        if self.local_rot_locked {
            return None;
        }

        let new_local_rot = match self.active_constraint() {
            Some(constraint) => constraint.minimize_twist(&self.local_rot),
            None => {
                let bone = normalize_or(&self.bone, Vector3::zeros());
                let new_bone = self.local_rot * bone;
                if bone.cross(&new_bone).norm() > MIN_SWING_AXIS_LENGTH {
                    shortest_arc(&bone, &new_bone)
                } else {
                    UnitQuaternion::identity()
                }
            }
        };
        self.local_rot = blend(&self.local_rot, &new_local_rot, UNTWIST_BLEND);

        let mut new_rot = parent.rot * self.local_rot;
        let mut new_parent_rot = None;
        if let Some(parent_bone) = parent_bone {
            let old_bone = self.rot * self.bone;
            let new_bone = new_rot * self.bone;
            if (new_bone - old_bone).norm() > MIN_UNTWIST_DELTA * self.bone.norm() {
                // Counter-rotate the parent about its bone to undo the swing
                let axis = normalize_or(&parent_bone, Vector3::zeros());
                let old_proj = old_bone - old_bone.dot(&axis) * axis;
                let new_proj = new_bone - new_bone.dot(&axis) * axis;
                let mut parent_rot = shortest_arc(&new_proj, &old_proj) * parent.rot;
                parent_rot.renormalize();
                new_rot = parent_rot * self.local_rot;
                new_parent_rot = Some(parent_rot);
            }
        }
        self.rot = new_rot;
        self.rot.renormalize();
        new_parent_rot
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
