//! Per-joint rotation constraints.
//!
//! A constraint maps an arbitrary candidate local rotation onto the nearest
//! rotation inside its allowed region, and supplies a twist-minimizing
//! "center" rotation with the same swing. Constraints are immutable after
//! construction and shared between joints through the
//! [`ConstraintFactory`](crate::factory::ConstraintFactory).
//!
//! # Variants
//!
//! ```text
//! Null                  accepts everything
//! SimpleCone            forward axis within a circular cone
//! TwistLimitedCone      circular cone + twist range
//! Elbow                 hinge plane + bend range + twist range
//! Knee                  hinge plane + bend range, no twist
//! AcuteEllipsoidalCone  four-radius elliptical cone
//! DoubleLimitedHinge    yaw range, then pitch range, no twist
//! ```

mod cone;
mod def;
mod hinge;

use std::hash::{Hash, Hasher};

use nalgebra::{UnitQuaternion, Vector3};

use crate::math::{almost_equal, shortest_arc};

pub use cone::{AcuteEllipsoidalCone, NullConstraint, SimpleCone, TwistLimitedCone};
pub use def::ConstraintDef;
pub use hinge::{DoubleLimitedHinge, ElbowConstraint, KneeConstraint};

/// Discriminant of a [`Constraint`], with the type names used in
/// constraint definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Null,
    SimpleCone,
    TwistLimitedCone,
    Elbow,
    Knee,
    AcuteEllipsoidalCone,
    DoubleLimitedHinge,
}

impl ConstraintKind {
    /// The `type` string recognized in constraint definitions.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "NULL_CONSTRAINT",
            Self::SimpleCone => "SIMPLE_CONE",
            Self::TwistLimitedCone => "TWIST_LIMITED_CONE",
            Self::Elbow => "ELBOW",
            Self::Knee => "KNEE",
            Self::AcuteEllipsoidalCone => "ACUTE_ELLIPSOIDAL_CONE",
            Self::DoubleLimitedHinge => "DOUBLE_LIMITED_HINGE",
        }
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A joint rotation constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Null(NullConstraint),
    SimpleCone(SimpleCone),
    TwistLimitedCone(TwistLimitedCone),
    Elbow(ElbowConstraint),
    Knee(KneeConstraint),
    AcuteEllipsoidalCone(AcuteEllipsoidalCone),
    DoubleLimitedHinge(DoubleLimitedHinge),
}

impl Constraint {
    pub const fn kind(&self) -> ConstraintKind {
        match self {
            Self::Null(_) => ConstraintKind::Null,
            Self::SimpleCone(_) => ConstraintKind::SimpleCone,
            Self::TwistLimitedCone(_) => ConstraintKind::TwistLimitedCone,
            Self::Elbow(_) => ConstraintKind::Elbow,
            Self::Knee(_) => ConstraintKind::Knee,
            Self::AcuteEllipsoidalCone(_) => ConstraintKind::AcuteEllipsoidalCone,
            Self::DoubleLimitedHinge(_) => ConstraintKind::DoubleLimitedHinge,
        }
    }

    pub const fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Reference forward direction in the joint's unrotated frame.
    pub fn forward_axis(&self) -> &Vector3<f32> {
        match self {
            Self::Null(c) => &c.forward,
            Self::SimpleCone(c) => &c.forward,
            Self::TwistLimitedCone(c) => &c.forward,
            Self::Elbow(c) => &c.forward,
            Self::Knee(c) => &c.forward,
            Self::AcuteEllipsoidalCone(c) => &c.forward,
            Self::DoubleLimitedHinge(c) => &c.forward,
        }
    }

    /// Whether the constraint leaves any freedom about the forward axis.
    pub const fn allows_twist(&self) -> bool {
        !matches!(self, Self::Knee(_) | Self::DoubleLimitedHinge(_))
    }

    /// Project `local_rot` onto the allowed region. Rotations already inside
    /// are returned unchanged.
    pub fn adjusted_local_rot(&self, local_rot: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        let mut adjusted = match self {
            Self::Null(_) => return *local_rot,
            Self::SimpleCone(c) => c.adjusted_local_rot(local_rot),
            Self::TwistLimitedCone(c) => c.adjusted_local_rot(local_rot),
            Self::Elbow(c) => c.adjusted_local_rot(local_rot),
            Self::Knee(c) => c.adjusted_local_rot(local_rot),
            Self::AcuteEllipsoidalCone(c) => c.adjusted_local_rot(local_rot),
            Self::DoubleLimitedHinge(c) => c.adjusted_local_rot(local_rot),
        };
        adjusted.renormalize();
        adjusted
    }

    /// The adjusted rotation if it differs noticeably from `local_rot`,
    /// otherwise `None`.
    pub fn enforce(&self, local_rot: &UnitQuaternion<f32>) -> Option<UnitQuaternion<f32>> {
        let adjusted = self.adjusted_local_rot(local_rot);
        (!almost_equal(&adjusted, local_rot)).then_some(adjusted)
    }

    /// A rotation with the same swing as `local_rot` and the constraint's
    /// preferred twist: zero, or the middle of the twist range.
    pub fn minimize_twist(&self, local_rot: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        match self {
            Self::TwistLimitedCone(c) => c.minimize_twist(local_rot),
            Self::Elbow(c) => c.minimize_twist(local_rot),
            Self::Knee(c) => c.minimize_twist(local_rot),
            Self::DoubleLimitedHinge(c) => c.minimize_twist(local_rot),
            Self::Null(_) | Self::SimpleCone(_) | Self::AcuteEllipsoidalCone(_) => {
                swing_only(self.forward_axis(), local_rot)
            }
        }
    }

    /// Content hash over the defining parameters, used for deduplication.
    ///
    /// Equal definitions hash equal regardless of how many joints share the
    /// instance.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = ContentHasher::default();
        hasher.write(self.type_name().as_bytes());
        match self {
            Self::Null(c) => c.hash(&mut hasher),
            Self::SimpleCone(c) => c.hash(&mut hasher),
            Self::TwistLimitedCone(c) => c.hash(&mut hasher),
            Self::Elbow(c) => c.hash(&mut hasher),
            Self::Knee(c) => c.hash(&mut hasher),
            Self::AcuteEllipsoidalCone(c) => c.hash(&mut hasher),
            Self::DoubleLimitedHinge(c) => c.hash(&mut hasher),
        }
        hasher.finish()
    }

    /// Convert back to a definition with angles in degrees.
    pub fn to_def(&self) -> ConstraintDef {
        match self {
            Self::Null(c) => c.to_def(),
            Self::SimpleCone(c) => c.to_def(),
            Self::TwistLimitedCone(c) => c.to_def(),
            Self::Elbow(c) => c.to_def(),
            Self::Knee(c) => c.to_def(),
            Self::AcuteEllipsoidalCone(c) => c.to_def(),
            Self::DoubleLimitedHinge(c) => c.to_def(),
        }
    }
}

/// The shortest rotation producing the same forward direction as `local_rot`.
fn swing_only(forward: &Vector3<f32>, local_rot: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
    shortest_arc(forward, &(local_rot * forward))
}

/// blake3-backed [`Hasher`] with little-endian integer encoding, so content
/// hashes are the same on every platform and toolchain.
#[derive(Default)]
pub(crate) struct ContentHasher(blake3::Hasher);

impl Hasher for ContentHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn write_u8(&mut self, i: u8) {
        self.write(&[i]);
    }

    fn write_u16(&mut self, i: u16) {
        self.write(&i.to_le_bytes());
    }

    fn write_u32(&mut self, i: u32) {
        self.write(&i.to_le_bytes());
    }

    fn write_u64(&mut self, i: u64) {
        self.write(&i.to_le_bytes());
    }

    fn write_usize(&mut self, i: usize) {
        self.write_u64(i as u64);
    }

    fn write_isize(&mut self, i: isize) {
        self.write_u64(i as u64);
    }

    fn finish(&self) -> u64 {
        let digest = self.0.finalize();
        let mut head = [0; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }
}

pub(crate) fn hash_f32<H: Hasher>(value: f32, state: &mut H) {
    // -0.0 and 0.0 describe the same constraint
    let value = if value == 0.0 { 0.0 } else { value };
    value.to_bits().hash(state);
}

pub(crate) fn hash_vector<H: Hasher>(v: &Vector3<f32>, state: &mut H) {
    for &component in v.iter() {
        hash_f32(component, state);
    }
}

pub(crate) fn axis_array(v: &Vector3<f32>) -> [f32; 3] {
    [v.x, v.y, v.z]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::math::almost_equal_within;
    use std::f32::consts::PI;

    /// A deterministic spread of rotations covering every octant.
    pub(crate) fn sample_rotations() -> Vec<UnitQuaternion<f32>> {
        let axes = [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(-1.0, 0.5, 0.3),
            Vector3::new(0.2, -1.0, 0.7),
            Vector3::new(-0.4, -0.4, -1.0),
        ];
        let angles = [0.1, 0.5, 1.0, 1.6, 2.4, 3.0];
        let mut rotations = vec![UnitQuaternion::identity()];
        for axis in &axes {
            for &angle in &angles {
                rotations.push(crate::math::axis_angle(axis, angle));
            }
        }
        rotations
    }

    pub(crate) fn all_variants() -> Vec<Constraint> {
        let z = Vector3::z();
        let y = Vector3::y();
        vec![
            Constraint::Null(NullConstraint::new(z)),
            Constraint::SimpleCone(SimpleCone::new(z, PI / 4.0)),
            Constraint::TwistLimitedCone(TwistLimitedCone::new(z, PI / 3.0, -PI / 6.0, PI / 4.0)),
            Constraint::Elbow(ElbowConstraint::new(z, y, 0.0, 2.5, -PI / 4.0, PI / 4.0)),
            Constraint::Knee(KneeConstraint::new(z, y, -2.4, 0.0)),
            Constraint::AcuteEllipsoidalCone(AcuteEllipsoidalCone::new(
                z, y, 1.0, 0.8, 0.3, 0.6, 0.4,
            )),
            Constraint::DoubleLimitedHinge(DoubleLimitedHinge::new(
                z,
                y,
                -PI / 3.0,
                PI / 2.0,
                -PI / 6.0,
                PI / 4.0,
            )),
        ]
    }

    #[test]
    fn projection_is_idempotent() {
        for constraint in all_variants() {
            for rot in sample_rotations() {
                let once = constraint.adjusted_local_rot(&rot);
                let twice = constraint.adjusted_local_rot(&once);
                assert!(
                    almost_equal_within(&once, &twice, 2.0e-3),
                    "{} not idempotent: {} vs {}",
                    constraint.type_name(),
                    once.angle_to(&twice),
                    rot
                );
            }
        }
    }

    #[test]
    fn enforce_reports_changes_only() {
        for constraint in all_variants() {
            for rot in sample_rotations() {
                let adjusted = constraint.adjusted_local_rot(&rot);
                if let Some(again) = constraint.enforce(&adjusted) {
                    assert!(
                        almost_equal_within(&again, &adjusted, 2.0e-3),
                        "{} re-enforce moved an adjusted rotation",
                        constraint.type_name()
                    );
                }
            }
        }
    }

    #[test]
    fn null_accepts_everything() {
        let constraint = Constraint::Null(NullConstraint::new(Vector3::z()));
        for rot in sample_rotations() {
            assert!(constraint.enforce(&rot).is_none());
        }
    }

    #[test]
    fn minimize_twist_preserves_swing_for_twisting_variants() {
        for constraint in all_variants().into_iter().filter(|c| {
            matches!(
                c.kind(),
                ConstraintKind::Null | ConstraintKind::SimpleCone | ConstraintKind::TwistLimitedCone
            )
        }) {
            let forward = *constraint.forward_axis();
            for rot in sample_rotations() {
                let centered = constraint.minimize_twist(&rot);
                let before = rot * forward;
                let after = centered * forward;
                assert!(
                    (before - after).norm() < 1.0e-3,
                    "{} changed swing",
                    constraint.type_name()
                );
            }
        }
    }

    #[test]
    fn twist_permission_by_kind() {
        for constraint in all_variants() {
            let expected = !matches!(
                constraint.kind(),
                ConstraintKind::Knee | ConstraintKind::DoubleLimitedHinge
            );
            assert_eq!(constraint.allows_twist(), expected);
        }
    }

    #[test]
    fn content_hash_distinguishes_parameters() {
        let a = Constraint::SimpleCone(SimpleCone::new(Vector3::z(), 0.5));
        let b = Constraint::SimpleCone(SimpleCone::new(Vector3::z(), 0.5));
        let c = Constraint::SimpleCone(SimpleCone::new(Vector3::z(), 0.6));
        let d = Constraint::Null(NullConstraint::new(Vector3::z()));
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
        assert_ne!(a.content_hash(), d.content_hash());
    }

    #[test]
    fn content_hash_is_blake3_of_fields() {
        let cone = Constraint::SimpleCone(SimpleCone::new(Vector3::z(), 0.5));
        let mut expected = blake3::Hasher::new();
        expected.update(b"SIMPLE_CONE");
        for value in [0.0_f32, 0.0, 1.0, 0.5] {
            expected.update(&value.to_bits().to_le_bytes());
        }
        let digest = expected.finalize();
        let head: [u8; 8] = digest.as_bytes()[..8].try_into().unwrap();
        assert_eq!(cone.content_hash(), u64::from_le_bytes(head));
    }

    #[test]
    fn content_hasher_encodes_integers_little_endian() {
        let mut typed = ContentHasher::default();
        typed.write_u32(0x0102_0304);
        typed.write_usize(7);
        let mut raw = ContentHasher::default();
        raw.write(&[4, 3, 2, 1]);
        raw.write(&7_u64.to_le_bytes());
        assert_eq!(typed.finish(), raw.finish());
    }

    #[test]
    fn content_hash_ignores_sign_of_zero() {
        let a = Constraint::Null(NullConstraint::new(Vector3::new(0.0, 0.0, 1.0)));
        let b = Constraint::Null(NullConstraint::new(Vector3::new(-0.0, 0.0, 1.0)));
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn type_names_match_definitions() {
        let names: Vec<_> = all_variants().iter().map(Constraint::type_name).collect();
        assert_eq!(
            names,
            [
                "NULL_CONSTRAINT",
                "SIMPLE_CONE",
                "TWIST_LIMITED_CONE",
                "ELBOW",
                "KNEE",
                "ACUTE_ELLIPSOIDAL_CONE",
                "DOUBLE_LIMITED_HINGE",
            ]
        );
    }
}
