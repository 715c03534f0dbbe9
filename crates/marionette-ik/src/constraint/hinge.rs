//! Hinge-like constraints: rotation mostly confined to a plane.

use std::f32::consts::FRAC_PI_2;
use std::hash::{Hash, Hasher};

use nalgebra::{UnitQuaternion, Vector3};

use super::{axis_array, hash_f32, hash_vector, ConstraintDef};
use crate::math::{
    any_perpendicular, axis_angle, compute_angle_limits, compute_clamped_angle, normalize_or,
    remove_multiples_of_two_pi, shortest_arc, MIN_VECTOR_LENGTH,
};

/// Rebuild threshold for the double hinge: forward drift below this is noise.
const HINGE_REBUILD_DISTANCE: f32 = 1.0e-3;

/// Orthonormal hinge frame: `forward`, `pivot` perpendicular to it, and
/// `left = pivot x forward`.
fn hinge_frame(forward_axis: &Vector3<f32>, pivot_axis: &Vector3<f32>) -> [Vector3<f32>; 3] {
    let forward = normalize_or(forward_axis, Vector3::z());
    let pivot = normalize_or(
        &forward.cross(&pivot_axis.cross(&forward)),
        any_perpendicular(&forward).into_inner(),
    );
    let left = pivot.cross(&forward);
    [forward, pivot, left]
}

/// Signed bend of `direction` about the pivot, measured from `forward`
/// toward `left`.
fn bend_angle(forward: &Vector3<f32>, left: &Vector3<f32>, direction: &Vector3<f32>) -> f32 {
    direction.dot(left).atan2(direction.dot(forward))
}

/// Bend angle for twist minimization.
///
/// Uses the full swing magnitude (including any out-of-plane part) signed by
/// the side of the hinge plane the bone is on. When the bone is on neither
/// side the sign that lands closer to the middle of the range wins.
fn centered_bend(
    forward: &Vector3<f32>,
    left: &Vector3<f32>,
    min_bend: f32,
    max_bend: f32,
    joint_forward: &Vector3<f32>,
) -> f32 {
    let swing = joint_forward.angle(forward);
    let side = joint_forward.dot(left);
    if side.abs() > MIN_VECTOR_LENGTH {
        return swing.copysign(side);
    }
    if (min_bend..=max_bend).contains(&swing) {
        return swing;
    }
    let mid = 0.5 * (min_bend + max_bend);
    if (-swing - mid).abs() < (swing - mid).abs() {
        -swing
    } else {
        swing
    }
}

// ---------------------------------------------------------------------------
// ElbowConstraint
// ---------------------------------------------------------------------------

/// Hinge about `pivot` with a bend range and a twist range about the bone.
#[derive(Debug, Clone, PartialEq)]
pub struct ElbowConstraint {
    pub(crate) forward: Vector3<f32>,
    pivot: Vector3<f32>,
    left: Vector3<f32>,
    min_bend: f32,
    max_bend: f32,
    min_twist: f32,
    max_twist: f32,
}

impl ElbowConstraint {
    /// Angles in radians. `pivot_axis` is made perpendicular to `forward_axis`.
    pub fn new(
        forward_axis: Vector3<f32>,
        pivot_axis: Vector3<f32>,
        min_bend: f32,
        max_bend: f32,
        min_twist: f32,
        max_twist: f32,
    ) -> Self {
        let [forward, pivot, left] = hinge_frame(&forward_axis, &pivot_axis);
        let (min_bend, max_bend) = compute_angle_limits(min_bend, max_bend);
        let (min_twist, max_twist) = compute_angle_limits(min_twist, max_twist);
        Self {
            forward,
            pivot,
            left,
            min_bend,
            max_bend,
            min_twist,
            max_twist,
        }
    }

    pub const fn bend_limits(&self) -> (f32, f32) {
        (self.min_bend, self.max_bend)
    }

    pub fn pivot_axis(&self) -> &Vector3<f32> {
        &self.pivot
    }

    /// Bend of `local_rot`'s forward axis about the pivot.
    pub fn bend(&self, local_rot: &UnitQuaternion<f32>) -> f32 {
        bend_angle(&self.forward, &self.left, &(local_rot * self.forward))
    }

    /// Twist of `local_rot` about its bone, measured on the pivot axis.
    pub fn twist(&self, local_rot: &UnitQuaternion<f32>) -> f32 {
        let joint_left = local_rot * self.left;
        let joint_pivot = local_rot * self.pivot;
        joint_left.dot(&self.pivot).atan2(joint_pivot.dot(&self.pivot))
    }

    pub fn adjusted_local_rot(&self, local_rot: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        // Swing the forward axis into the hinge plane
        let joint_forward = local_rot * self.forward;
        let in_plane = joint_forward - joint_forward.dot(&self.pivot) * self.pivot;
        let in_plane = normalize_or(&in_plane, self.forward);
        let mut adjusted = shortest_arc(&joint_forward, &in_plane) * local_rot;

        let twist = self.twist(&adjusted);
        if twist > self.max_twist || twist < self.min_twist {
            let clamped = compute_clamped_angle(twist, self.min_twist, self.max_twist);
            adjusted = axis_angle(&(adjusted * self.forward), clamped - twist) * adjusted;
        }

        let bend = self.bend(&adjusted);
        if bend > self.max_bend || bend < self.min_bend {
            let clamped = compute_clamped_angle(bend, self.min_bend, self.max_bend);
            adjusted = axis_angle(&self.pivot, clamped - bend) * adjusted;
        }
        adjusted
    }

    /// Bend about the pivot with the twist centered in its range.
    pub fn minimize_twist(&self, local_rot: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        let bend = centered_bend(
            &self.forward,
            &self.left,
            self.min_bend,
            self.max_bend,
            &(local_rot * self.forward),
        );
        let mid_twist = 0.5 * (self.min_twist + self.max_twist);
        axis_angle(&self.pivot, bend) * axis_angle(&self.forward, mid_twist)
    }

    pub(crate) fn to_def(&self) -> ConstraintDef {
        ConstraintDef::Elbow {
            forward_axis: axis_array(&self.forward),
            pivot_axis: axis_array(&self.pivot),
            min_bend: self.min_bend.to_degrees(),
            max_bend: self.max_bend.to_degrees(),
            min_twist: self.min_twist.to_degrees(),
            max_twist: self.max_twist.to_degrees(),
        }
    }
}

impl Hash for ElbowConstraint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_vector(&self.forward, state);
        hash_vector(&self.pivot, state);
        hash_f32(self.min_bend, state);
        hash_f32(self.max_bend, state);
        hash_f32(self.min_twist, state);
        hash_f32(self.max_twist, state);
    }
}

// ---------------------------------------------------------------------------
// KneeConstraint
// ---------------------------------------------------------------------------

/// Pure hinge about `pivot` with a bend range. No twist is allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct KneeConstraint {
    pub(crate) forward: Vector3<f32>,
    pivot: Vector3<f32>,
    left: Vector3<f32>,
    min_bend: f32,
    max_bend: f32,
}

impl KneeConstraint {
    pub fn new(
        forward_axis: Vector3<f32>,
        pivot_axis: Vector3<f32>,
        min_bend: f32,
        max_bend: f32,
    ) -> Self {
        let [forward, pivot, left] = hinge_frame(&forward_axis, &pivot_axis);
        let (min_bend, max_bend) = compute_angle_limits(min_bend, max_bend);
        Self {
            forward,
            pivot,
            left,
            min_bend,
            max_bend,
        }
    }

    pub const fn bend_limits(&self) -> (f32, f32) {
        (self.min_bend, self.max_bend)
    }

    pub fn bend(&self, local_rot: &UnitQuaternion<f32>) -> f32 {
        bend_angle(&self.forward, &self.left, &(local_rot * self.forward))
    }

    pub fn adjusted_local_rot(&self, local_rot: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        // Put the joint's pivot back on the hinge axis; what remains is bend
        let joint_pivot = local_rot * self.pivot;
        let aligned = shortest_arc(&joint_pivot, &self.pivot) * local_rot;

        let bend = self.bend(&aligned);
        if bend > self.max_bend || bend < self.min_bend {
            let clamped = compute_clamped_angle(bend, self.min_bend, self.max_bend);
            return axis_angle(&self.pivot, clamped - bend) * aligned;
        }
        aligned
    }

    pub fn minimize_twist(&self, local_rot: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        let bend = centered_bend(
            &self.forward,
            &self.left,
            self.min_bend,
            self.max_bend,
            &(local_rot * self.forward),
        );
        axis_angle(&self.pivot, bend)
    }

    pub(crate) fn to_def(&self) -> ConstraintDef {
        ConstraintDef::Knee {
            forward_axis: axis_array(&self.forward),
            pivot_axis: axis_array(&self.pivot),
            min_bend: self.min_bend.to_degrees(),
            max_bend: self.max_bend.to_degrees(),
        }
    }
}

impl Hash for KneeConstraint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_vector(&self.forward, state);
        hash_vector(&self.pivot, state);
        hash_f32(self.min_bend, state);
        hash_f32(self.max_bend, state);
    }
}

// ---------------------------------------------------------------------------
// DoubleLimitedHinge
// ---------------------------------------------------------------------------

/// Yaw about `up`, then pitch about the yawed left axis. No twist.
///
/// Pitch is limited to `[-π/2, π/2]`; positive pitch drops the forward axis
/// toward `-up`.
#[derive(Debug, Clone, PartialEq)]
pub struct DoubleLimitedHinge {
    pub(crate) forward: Vector3<f32>,
    up: Vector3<f32>,
    left: Vector3<f32>,
    min_yaw: f32,
    max_yaw: f32,
    min_pitch: f32,
    max_pitch: f32,
}

impl DoubleLimitedHinge {
    pub fn new(
        forward_axis: Vector3<f32>,
        up_axis: Vector3<f32>,
        min_yaw: f32,
        max_yaw: f32,
        min_pitch: f32,
        max_pitch: f32,
    ) -> Self {
        let [forward, up, left] = hinge_frame(&forward_axis, &up_axis);
        let (min_yaw, max_yaw) = compute_angle_limits(min_yaw, max_yaw);

        let clamp_pitch = |pitch: f32| remove_multiples_of_two_pi(pitch).clamp(-FRAC_PI_2, FRAC_PI_2);
        let (mut min_pitch, mut max_pitch) = (clamp_pitch(min_pitch), clamp_pitch(max_pitch));
        if min_pitch > max_pitch {
            std::mem::swap(&mut min_pitch, &mut max_pitch);
        }

        Self {
            forward,
            up,
            left,
            min_yaw,
            max_yaw,
            min_pitch,
            max_pitch,
        }
    }

    pub const fn yaw_limits(&self) -> (f32, f32) {
        (self.min_yaw, self.max_yaw)
    }

    pub const fn pitch_limits(&self) -> (f32, f32) {
        (self.min_pitch, self.max_pitch)
    }

    /// `(yaw, pitch)` of `local_rot`'s forward axis.
    pub fn yaw_pitch(&self, local_rot: &UnitQuaternion<f32>) -> (f32, f32) {
        let joint_forward = local_rot * self.forward;
        let up_component = joint_forward.dot(&self.up).clamp(-1.0, 1.0);
        let horizontal = joint_forward - up_component * self.up;
        let yaw = horizontal.dot(&self.left).atan2(horizontal.dot(&self.forward));
        let pitch = (-up_component).atan2((1.0 - up_component * up_component).max(0.0).sqrt());
        (yaw, pitch)
    }

    /// Swing the joint's left axis back into the horizontal plane.
    fn remove_twist(&self, local_rot: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        let joint_left = local_rot * self.left;
        let horizontal = joint_left - joint_left.dot(&self.up) * self.up;
        if horizontal.norm() < MIN_VECTOR_LENGTH {
            return *local_rot;
        }
        shortest_arc(&joint_left, &horizontal) * local_rot
    }

    pub fn adjusted_local_rot(&self, local_rot: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        let untwisted = self.remove_twist(local_rot);
        let (yaw, pitch) = self.yaw_pitch(&untwisted);

        let yaw = if yaw > self.max_yaw || yaw < self.min_yaw {
            compute_clamped_angle(yaw, self.min_yaw, self.max_yaw)
        } else {
            yaw
        };
        let pitch = pitch.clamp(self.min_pitch, self.max_pitch);

        let rebuilt = axis_angle(&self.up, yaw) * axis_angle(&self.left, pitch);
        let drift = (rebuilt * self.forward - untwisted * self.forward).norm();
        if drift > HINGE_REBUILD_DISTANCE {
            rebuilt
        } else {
            untwisted
        }
    }

    pub fn minimize_twist(&self, local_rot: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        self.remove_twist(local_rot)
    }

    pub(crate) fn to_def(&self) -> ConstraintDef {
        ConstraintDef::DoubleLimitedHinge {
            forward_axis: axis_array(&self.forward),
            up_axis: axis_array(&self.up),
            min_yaw: self.min_yaw.to_degrees(),
            max_yaw: self.max_yaw.to_degrees(),
            min_pitch: self.min_pitch.to_degrees(),
            max_pitch: self.max_pitch.to_degrees(),
        }
    }
}

impl Hash for DoubleLimitedHinge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_vector(&self.forward, state);
        hash_vector(&self.up, state);
        hash_f32(self.min_yaw, state);
        hash_f32(self.max_yaw, state);
        hash_f32(self.min_pitch, state);
        hash_f32(self.max_pitch, state);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
