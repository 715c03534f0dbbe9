//! Cone-shaped constraints: the forward axis must stay inside a circular or
//! elliptical cone around the reference direction.

use std::f32::consts::PI;
use std::hash::{Hash, Hasher};

use nalgebra::{UnitQuaternion, Vector3};

use super::{axis_array, hash_f32, hash_vector, ConstraintDef};
use crate::math::{
    any_perpendicular, axis_angle, compute_angle_limits, compute_clamped_angle, normalize_or,
    shortest_arc, MIN_VECTOR_LENGTH,
};

/// Below this the swing axis is too short to define a twist reference.
const MIN_PERP_LENGTH: f32 = 1.0e-3;

/// Smallest ellipse radius relative to the forward extent.
const MIN_RADIUS_RATIO: f32 = 1.0e-3;

/// Project `local_rot` so its forward axis lies inside the circular cone of
/// the given half-angle around `forward`.
fn project_onto_cone(
    forward: &Vector3<f32>,
    cos_cone_angle: f32,
    sin_cone_angle: f32,
    local_rot: &UnitQuaternion<f32>,
) -> UnitQuaternion<f32> {
    let joint_forward = local_rot * forward;
    let forward_component = joint_forward.dot(forward);
    if forward_component >= cos_cone_angle {
        return *local_rot;
    }
    // Projection = forward part + orthogonal part on the cone surface
    let perp = normalize_or(
        &(joint_forward - forward_component * forward),
        any_perpendicular(forward).into_inner(),
    );
    let new_forward = cos_cone_angle * forward + sin_cone_angle * perp;
    shortest_arc(&joint_forward, &new_forward) * local_rot
}

// ---------------------------------------------------------------------------
// NullConstraint
// ---------------------------------------------------------------------------

/// Accepts every rotation. Carries a forward axis for twist minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct NullConstraint {
    pub(crate) forward: Vector3<f32>,
}

impl NullConstraint {
    pub fn new(forward_axis: Vector3<f32>) -> Self {
        Self {
            forward: normalize_or(&forward_axis, Vector3::z()),
        }
    }

    pub(crate) fn to_def(&self) -> ConstraintDef {
        ConstraintDef::NullConstraint {
            forward_axis: axis_array(&self.forward),
        }
    }
}

impl Hash for NullConstraint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_vector(&self.forward, state);
    }
}

// ---------------------------------------------------------------------------
// SimpleCone
// ---------------------------------------------------------------------------

/// Keeps the forward axis within `max_angle` of the reference direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleCone {
    pub(crate) forward: Vector3<f32>,
    max_angle: f32,
    cos_cone_angle: f32,
    sin_cone_angle: f32,
}

impl SimpleCone {
    /// `max_angle` is the cone half-angle in radians; its sign is ignored.
    pub fn new(forward_axis: Vector3<f32>, max_angle: f32) -> Self {
        let max_angle = max_angle.abs().min(PI);
        Self {
            forward: normalize_or(&forward_axis, Vector3::z()),
            max_angle,
            cos_cone_angle: max_angle.cos(),
            sin_cone_angle: max_angle.sin(),
        }
    }

    pub const fn max_angle(&self) -> f32 {
        self.max_angle
    }

    pub fn adjusted_local_rot(&self, local_rot: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        project_onto_cone(&self.forward, self.cos_cone_angle, self.sin_cone_angle, local_rot)
    }

    pub(crate) fn to_def(&self) -> ConstraintDef {
        ConstraintDef::SimpleCone {
            forward_axis: axis_array(&self.forward),
            max_angle: self.max_angle.to_degrees(),
        }
    }
}

impl Hash for SimpleCone {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_vector(&self.forward, state);
        hash_f32(self.max_angle, state);
    }
}

// ---------------------------------------------------------------------------
// TwistLimitedCone
// ---------------------------------------------------------------------------

/// A circular cone plus an independent twist range about the forward axis.
#[derive(Debug, Clone, PartialEq)]
pub struct TwistLimitedCone {
    pub(crate) forward: Vector3<f32>,
    cone_angle: f32,
    cos_cone_angle: f32,
    sin_cone_angle: f32,
    min_twist: f32,
    max_twist: f32,
}

impl TwistLimitedCone {
    /// All angles in radians. Twist limits are normalized into `[-π, π]`.
    pub fn new(forward_axis: Vector3<f32>, cone_angle: f32, min_twist: f32, max_twist: f32) -> Self {
        let cone_angle = cone_angle.abs().min(PI);
        let (min_twist, max_twist) = compute_angle_limits(min_twist, max_twist);
        Self {
            forward: normalize_or(&forward_axis, Vector3::z()),
            cone_angle,
            cos_cone_angle: cone_angle.cos(),
            sin_cone_angle: cone_angle.sin(),
            min_twist,
            max_twist,
        }
    }

    pub const fn twist_limits(&self) -> (f32, f32) {
        (self.min_twist, self.max_twist)
    }

    /// Two unit axes perpendicular to `joint_forward` used to measure twist.
    ///
    /// `perp_x` is the swing axis, so a pure swing has zero twist.
    fn twist_basis(&self, joint_forward: &Vector3<f32>) -> (Vector3<f32>, Vector3<f32>) {
        let mut perp_x = self.forward.cross(joint_forward);
        if perp_x.norm() < MIN_PERP_LENGTH {
            perp_x = Vector3::y().cross(&self.forward);
            if perp_x.norm() < MIN_PERP_LENGTH {
                perp_x = self.forward.cross(&Vector3::x());
            }
        }
        let perp_x = perp_x.normalize();
        let perp_y = joint_forward.cross(&perp_x);
        (perp_x, perp_y)
    }

    /// Twist of `local_rot` about its own forward axis, in `[-π, π]`.
    pub fn twist_angle(&self, local_rot: &UnitQuaternion<f32>) -> f32 {
        let joint_forward = local_rot * self.forward;
        let (perp_x, perp_y) = self.twist_basis(&joint_forward);
        let joint_perp = local_rot * perp_x;
        joint_perp.dot(&perp_y).atan2(joint_perp.dot(&perp_x))
    }

    pub fn adjusted_local_rot(&self, local_rot: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        let adjusted =
            project_onto_cone(&self.forward, self.cos_cone_angle, self.sin_cone_angle, local_rot);

        let twist = self.twist_angle(&adjusted);
        if twist > self.max_twist || twist < self.min_twist {
            let clamped = compute_clamped_angle(twist, self.min_twist, self.max_twist);
            let joint_forward = adjusted * self.forward;
            return axis_angle(&joint_forward, clamped - twist) * adjusted;
        }
        adjusted
    }

    /// Same swing, twist centered in the allowed range.
    pub fn minimize_twist(&self, local_rot: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        let mid_twist = axis_angle(&self.forward, 0.5 * (self.min_twist + self.max_twist));
        let swing = shortest_arc(&self.forward, &(local_rot * self.forward));
        swing * mid_twist
    }

    pub(crate) fn to_def(&self) -> ConstraintDef {
        ConstraintDef::TwistLimitedCone {
            forward_axis: axis_array(&self.forward),
            cone_angle: self.cone_angle.to_degrees(),
            min_twist: self.min_twist.to_degrees(),
            max_twist: self.max_twist.to_degrees(),
        }
    }
}

impl Hash for TwistLimitedCone {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_vector(&self.forward, state);
        hash_f32(self.cone_angle, state);
        hash_f32(self.min_twist, state);
        hash_f32(self.max_twist, state);
    }
}

// ---------------------------------------------------------------------------
// AcuteEllipsoidalCone
// ---------------------------------------------------------------------------

/// An asymmetric cone with independent up/down/left/right extents.
///
/// Extents are lengths measured at `forward` distance along the reference
/// axis, so `up / forward` is the tangent of the upward half-angle. Looking
/// along the forward axis the quadrants are indexed:
///
/// ```text
///          up
///           |
///       1   |   0
///           |
///  left ---(x)--- right
///           |
///       2   |   3
///           |
///         down
/// ```
///
/// Each quadrant stretches its lateral component so the ellipse becomes a
/// circle, then tests against a single cone angle.
#[derive(Debug, Clone, PartialEq)]
pub struct AcuteEllipsoidalCone {
    pub(crate) forward: Vector3<f32>,
    up: Vector3<f32>,
    left: Vector3<f32>,
    extent_forward: f32,
    extent_up: f32,
    extent_down: f32,
    extent_left: f32,
    extent_right: f32,
    quadrant_scales: [f32; 4],
    quadrant_cos_angles: [f32; 4],
    quadrant_cot_angles: [f32; 4],
}

impl AcuteEllipsoidalCone {
    /// `forward_axis` is made perpendicular to `up_axis`. Extents are
    /// unitless lengths; only their ratios to `forward` matter.
    pub fn new(
        forward_axis: Vector3<f32>,
        up_axis: Vector3<f32>,
        forward: f32,
        up: f32,
        down: f32,
        left: f32,
        right: f32,
    ) -> Self {
        let up_dir = normalize_or(&up_axis, Vector3::y());
        let forward_dir = normalize_or(
            &up_dir.cross(&forward_axis).cross(&up_dir),
            any_perpendicular(&up_dir).into_inner(),
        );
        let left_dir = up_dir.cross(&forward_dir);

        let forward_extent = if forward.abs() > MIN_VECTOR_LENGTH {
            forward.abs()
        } else {
            1.0
        };
        let ratio = |extent: f32| (extent / forward_extent).abs().max(MIN_RADIUS_RATIO);
        let (r_up, r_down, r_left, r_right) = (ratio(up), ratio(down), ratio(left), ratio(right));

        let cos_up = 1.0 / (r_up * r_up + 1.0).sqrt();
        let cos_down = 1.0 / (r_down * r_down + 1.0).sqrt();

        Self {
            forward: forward_dir,
            up: up_dir,
            left: left_dir,
            extent_forward: forward,
            extent_up: up,
            extent_down: down,
            extent_left: left,
            extent_right: right,
            quadrant_scales: [r_up / r_right, r_up / r_left, r_down / r_left, r_down / r_right],
            quadrant_cos_angles: [cos_up, cos_up, cos_down, cos_down],
            quadrant_cot_angles: [1.0 / r_up, 1.0 / r_up, 1.0 / r_down, 1.0 / r_down],
        }
    }

    const fn quadrant(up_component: f32, left_component: f32) -> usize {
        match (up_component >= 0.0, left_component >= 0.0) {
            (true, false) => 0,
            (true, true) => 1,
            (false, true) => 2,
            (false, false) => 3,
        }
    }

    /// Whether `direction` (unit, joint parent frame) lies inside the cone.
    pub fn contains(&self, direction: &Vector3<f32>, tolerance: f32) -> bool {
        let up_component = direction.dot(&self.up);
        let left_component = direction.dot(&self.left);
        let forward_component = direction.dot(&self.forward);
        let q = Self::quadrant(up_component, left_component);
        let scaled_left = left_component * self.quadrant_scales[q];
        let scaled_length = (forward_component * forward_component
            + up_component * up_component
            + scaled_left * scaled_left)
            .sqrt();
        scaled_length < MIN_VECTOR_LENGTH
            || forward_component / scaled_length >= self.quadrant_cos_angles[q] - tolerance
    }

    pub fn adjusted_local_rot(&self, local_rot: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        let joint_forward = local_rot * self.forward;
        if self.contains(&joint_forward, 0.0) {
            return *local_rot;
        }

        let up_component = joint_forward.dot(&self.up);
        let left_component = joint_forward.dot(&self.left);
        let q = Self::quadrant(up_component, left_component);
        let scaled_left = left_component * self.quadrant_scales[q];

        // Keep the orthogonal components and solve for the forward leg on
        // the scaled cone: adjacent = opposite * cot(angle)
        let orthogonal = (scaled_left * scaled_left + up_component * up_component).sqrt();
        let new_forward = if orthogonal > MIN_VECTOR_LENGTH {
            orthogonal * self.quadrant_cot_angles[q] * self.forward
                + up_component * self.up
                + left_component * self.left
        } else {
            // Pointing straight back: no preferred side, use the top of the rim
            self.quadrant_cot_angles[0] * self.forward + self.up
        };
        shortest_arc(&joint_forward, &new_forward) * local_rot
    }

    pub(crate) fn to_def(&self) -> ConstraintDef {
        ConstraintDef::AcuteEllipsoidalCone {
            forward_axis: axis_array(&self.forward),
            up_axis: axis_array(&self.up),
            forward: self.extent_forward,
            up: self.extent_up,
            down: self.extent_down,
            left: self.extent_left,
            right: self.extent_right,
        }
    }
}

impl Hash for AcuteEllipsoidalCone {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_vector(&self.forward, state);
        hash_vector(&self.up, state);
        hash_f32(self.extent_forward, state);
        hash_f32(self.extent_up, state);
        hash_f32(self.extent_down, state);
        hash_f32(self.extent_left, state);
        hash_f32(self.extent_right, state);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::tests::sample_rotations;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_4;

    fn angle_from_axis(forward: &Vector3<f32>, rot: &UnitQuaternion<f32>) -> f32 {
        (rot * forward).angle(forward)
    }

    #[test]
    fn simple_cone_leaves_inside_rotations() {
        let cone = SimpleCone::new(Vector3::z(), FRAC_PI_4);
        let inside = axis_angle(&Vector3::x(), 0.3);
        assert_eq!(cone.adjusted_local_rot(&inside), inside);
    }

    #[test]
    fn simple_cone_projects_onto_surface() {
        let cone = SimpleCone::new(Vector3::z(), FRAC_PI_4);
        let outside = axis_angle(&Vector3::x(), 1.2);
        let adjusted = cone.adjusted_local_rot(&outside);
        assert_relative_eq!(angle_from_axis(&Vector3::z(), &adjusted), FRAC_PI_4, epsilon = 1e-4);

        // Stays on the same side of the cone
        let before = outside * Vector3::z();
        let after = adjusted * Vector3::z();
        assert!(before.y * after.y > 0.0);
    }

    #[test]
    fn simple_cone_contains_every_projection() {
        let cone = SimpleCone::new(Vector3::new(0.0, 1.0, 1.0), 0.6);
        for rot in sample_rotations() {
            let adjusted = cone.adjusted_local_rot(&rot);
            assert!(angle_from_axis(&cone.forward, &adjusted) <= 0.6 + 1e-3);
        }
    }

    #[test]
    fn simple_cone_handles_reversed_forward() {
        let cone = SimpleCone::new(Vector3::z(), 0.5);
        let reversed = axis_angle(&Vector3::y(), PI);
        let adjusted = cone.adjusted_local_rot(&reversed);
        assert!(adjusted.coords.iter().all(|c| c.is_finite()));
        assert_relative_eq!(angle_from_axis(&Vector3::z(), &adjusted), 0.5, epsilon = 1e-3);
    }

    #[test]
    fn twist_limited_cone_clamps_twist() {
        let cone = TwistLimitedCone::new(Vector3::z(), FRAC_PI_4, -0.2, 0.3);
        let twisted = axis_angle(&Vector3::z(), 0.8);
        assert_relative_eq!(cone.twist_angle(&twisted), 0.8, epsilon = 1e-5);

        let adjusted = cone.adjusted_local_rot(&twisted);
        assert_relative_eq!(cone.twist_angle(&adjusted), 0.3, epsilon = 1e-4);

        let twisted_back = axis_angle(&Vector3::z(), -0.9);
        let adjusted = cone.adjusted_local_rot(&twisted_back);
        assert_relative_eq!(cone.twist_angle(&adjusted), -0.2, epsilon = 1e-4);
    }

    #[test]
    fn twist_limited_cone_contains_every_projection() {
        let cone = TwistLimitedCone::new(Vector3::x(), 0.7, -0.4, 0.5);
        for rot in sample_rotations() {
            let adjusted = cone.adjusted_local_rot(&rot);
            assert!(angle_from_axis(&cone.forward, &adjusted) <= 0.7 + 1e-3);
            let twist = cone.twist_angle(&adjusted);
            assert!((-0.4 - 1e-3..=0.5 + 1e-3).contains(&twist), "twist {twist}");
        }
    }

    #[test]
    fn twist_limited_cone_minimize_twist_centers_range() {
        let cone = TwistLimitedCone::new(Vector3::z(), FRAC_PI_4, -0.2, 0.6);
        let rot = axis_angle(&Vector3::x(), 0.4) * axis_angle(&Vector3::z(), 0.5);
        let centered = cone.minimize_twist(&rot);
        assert_relative_eq!(cone.twist_angle(&centered), 0.2, epsilon = 1e-4);
        let swing_before = rot * Vector3::z();
        let swing_after = centered * Vector3::z();
        assert_relative_eq!((swing_before - swing_after).norm(), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn ellipsoidal_cone_uses_each_quadrant_radius() {
        // forward = 1, so each extent is the tangent of its half-angle
        let cone = AcuteEllipsoidalCone::new(Vector3::z(), Vector3::y(), 1.0, 1.0, 0.25, 0.5, 0.75);
        let inside = |direction: Vector3<f32>| cone.contains(&direction.normalize(), 0.0);

        // Up extent 1.0
        assert!(inside(Vector3::new(0.0, 0.9, 1.0)));
        assert!(!inside(Vector3::new(0.0, 1.1, 1.0)));
        // Down extent 0.25
        assert!(inside(Vector3::new(0.0, -0.2, 1.0)));
        assert!(!inside(Vector3::new(0.0, -0.3, 1.0)));
        // Left (+X when up is +Y and forward is +Z) extent 0.5
        assert!(inside(Vector3::new(0.45, 0.0, 1.0)));
        assert!(!inside(Vector3::new(0.55, 0.0, 1.0)));
        // Right extent 0.75
        assert!(inside(Vector3::new(-0.7, 0.0, 1.0)));
        assert!(!inside(Vector3::new(-0.8, 0.0, 1.0)));
    }

    #[test]
    fn ellipsoidal_cone_contains_every_projection() {
        let cone = AcuteEllipsoidalCone::new(Vector3::z(), Vector3::y(), 2.0, 1.5, 0.5, 1.0, 0.8);
        for rot in sample_rotations() {
            let adjusted = cone.adjusted_local_rot(&rot);
            let direction = adjusted * cone.forward;
            assert!(cone.contains(&direction, 1e-3), "{direction:?} escaped the cone");
        }
    }

    #[test]
    fn ellipsoidal_cone_projection_keeps_quadrant() {
        let cone = AcuteEllipsoidalCone::new(Vector3::z(), Vector3::y(), 1.0, 0.5, 0.5, 0.5, 0.5);
        let rot = shortest_arc(&Vector3::z(), &Vector3::new(0.8, -0.9, 0.3));
        let adjusted = cone.adjusted_local_rot(&rot);
        let direction = adjusted * Vector3::z();
        assert!(direction.x > 0.0);
        assert!(direction.y < 0.0);
    }

    #[test]
    fn ellipsoidal_cone_orthogonalizes_forward() {
        let cone = AcuteEllipsoidalCone::new(
            Vector3::new(0.0, 0.3, 1.0),
            Vector3::y(),
            1.0,
            1.0,
            1.0,
            1.0,
            1.0,
        );
        assert_relative_eq!(cone.forward.dot(&Vector3::y()), 0.0, epsilon = 1e-6);
        assert_relative_eq!(cone.forward.z, 1.0, epsilon = 1e-6);
    }
}
