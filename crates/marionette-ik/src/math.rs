//! Rotation and angle helpers shared by constraints, joints and the solver.
//!
//! Every helper here is total: degenerate inputs (zero-length vectors,
//! antiparallel directions) map to a documented fallback instead of NaN.

use std::f32::consts::{PI, TAU};

use nalgebra::{Quaternion, Unit, UnitQuaternion, Vector3, Vector4};

/// Vectors shorter than this are treated as zero before normalizing.
pub const MIN_VECTOR_LENGTH: f32 = 1.0e-5;

/// Default angular tolerance (radians) for [`almost_equal`].
pub const ROTATION_TOLERANCE: f32 = 1.0e-3;

/// Squared sine of the smallest angle [`shortest_arc`] resolves.
const MIN_ARC_SIN_SQUARED: f32 = 1.0e-12;

/// Normalize `v`, or return `fallback` if `v` is too short.
pub fn normalize_or(v: &Vector3<f32>, fallback: Vector3<f32>) -> Vector3<f32> {
    v.try_normalize(MIN_VECTOR_LENGTH).unwrap_or(fallback)
}

/// An arbitrary unit vector perpendicular to `v`.
///
/// Returns +Z for a zero-length input.
pub fn any_perpendicular(v: &Vector3<f32>) -> Unit<Vector3<f32>> {
    let other = if v.x.abs() < 0.9 * v.norm() {
        Vector3::x()
    } else {
        Vector3::y()
    };
    Unit::try_new(v.cross(&other), MIN_VECTOR_LENGTH).unwrap_or_else(Vector3::z_axis)
}

/// The minimal rotation taking direction `from` onto direction `to`.
///
/// Inputs need not be normalized. Near-zero inputs yield identity; exactly
/// opposite inputs yield a half turn about an arbitrary perpendicular axis.
pub fn shortest_arc(from: &Vector3<f32>, to: &Vector3<f32>) -> UnitQuaternion<f32> {
    let scale = from.norm_squared() * to.norm_squared();
    if scale < MIN_VECTOR_LENGTH * MIN_VECTOR_LENGTH * MIN_VECTOR_LENGTH * MIN_VECTOR_LENGTH {
        return UnitQuaternion::identity();
    }
    let ab = from.dot(to);
    let c = from.cross(to);
    let cc = c.norm_squared();
    if cc > MIN_ARC_SIN_SQUARED * scale {
        // (|a||b| + a.b, a x b) is the half-angle quaternion up to scale
        let s = (ab * ab + cc).sqrt() + ab;
        UnitQuaternion::from_quaternion(Quaternion::new(s, c.x, c.y, c.z))
    } else if ab < 0.0 {
        UnitQuaternion::from_axis_angle(&any_perpendicular(from), PI)
    } else {
        UnitQuaternion::identity()
    }
}

/// Rotation of `angle` radians about `axis`, identity if `axis` is degenerate.
pub fn axis_angle(axis: &Vector3<f32>, angle: f32) -> UnitQuaternion<f32> {
    Unit::try_new(*axis, MIN_VECTOR_LENGTH).map_or_else(UnitQuaternion::identity, |axis| {
        UnitQuaternion::from_axis_angle(&axis, angle)
    })
}

/// Normalized linear blend from `from` toward `to` by `t` in `[0, 1]`.
///
/// `to` is flipped onto the hemisphere of `from` first so the blend never
/// takes the long way around.
pub fn blend(from: &UnitQuaternion<f32>, to: &UnitQuaternion<f32>, t: f32) -> UnitQuaternion<f32> {
    let t = t.clamp(0.0, 1.0);
    let a = from.coords;
    let mut b = to.coords;
    if a.dot(&b) < 0.0 {
        b = -b;
    }
    UnitQuaternion::from_quaternion(Quaternion::from_vector(a * (1.0 - t) + b * t))
}

/// Whether two rotations differ by less than `tolerance` radians.
pub fn almost_equal_within(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>, tolerance: f32) -> bool {
    // 1 - |cos(theta / 2)| ~= theta^2 / 8 for small theta
    8.0 * (1.0 - a.coords.dot(&b.coords).abs()).abs() < tolerance * tolerance
}

/// [`almost_equal_within`] at [`ROTATION_TOLERANCE`].
pub fn almost_equal(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>) -> bool {
    almost_equal_within(a, b, ROTATION_TOLERANCE)
}

/// Average of several rotations by summing their quaternions on one
/// hemisphere and normalizing. Identity when the sum vanishes.
pub fn mean_rotation<I>(rotations: I) -> UnitQuaternion<f32>
where
    I: IntoIterator<Item = UnitQuaternion<f32>>,
{
    let sum = rotations.into_iter().fold(Vector4::zeros(), |acc, q| {
        if q.w < 0.0 {
            acc - q.coords
        } else {
            acc + q.coords
        }
    });
    UnitQuaternion::try_new(Quaternion::from_vector(sum), MIN_VECTOR_LENGTH)
        .unwrap_or_else(UnitQuaternion::identity)
}

// ---------------------------------------------------------------------------
// Angles
// ---------------------------------------------------------------------------

/// Remove whole turns, truncating toward zero. Result is in `(-2π, 2π)`.
pub fn remove_multiples_of_two_pi(angle: f32) -> f32 {
    angle - TAU * (angle / TAU).trunc()
}

/// Wrap an angle into `[-π, π]`.
pub fn wrap_angle(angle: f32) -> f32 {
    let angle = remove_multiples_of_two_pi(angle);
    if angle > PI {
        angle - TAU
    } else if angle < -PI {
        angle + TAU
    } else {
        angle
    }
}

/// Normalize a pair of angle limits into `[-π, π]` with `min <= max`.
///
/// π itself is kept, so a -180..180 degree range stays a full circle.
pub fn compute_angle_limits(min_angle: f32, max_angle: f32) -> (f32, f32) {
    let min_angle = wrap_angle(min_angle);
    let max_angle = wrap_angle(max_angle);
    if min_angle > max_angle {
        (max_angle, min_angle)
    } else {
        (min_angle, max_angle)
    }
}

/// Clamp an out-of-range angle onto the nearer of two limits.
///
/// The invalid zone between `max_angle` and `min_angle + 2π` is split at its
/// midpoint (the invalid bisector): angles on the `max` side clamp to `max`,
/// the rest clamp to `min`. Expects `angle` and the limits in `[-π, π]`.
pub fn compute_clamped_angle(angle: f32, min_angle: f32, max_angle: f32) -> f32 {
    let invalid_bisector = max_angle + 0.5 * (TAU - (max_angle - min_angle));
    if (angle > max_angle && angle < invalid_bisector) || angle < invalid_bisector - TAU {
        max_angle
    } else {
        min_angle
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn shortest_arc_maps_from_onto_to() {
        let from = Vector3::new(1.0, 0.0, 0.0);
        let to = Vector3::new(0.0, 2.0, 2.0);
        let q = shortest_arc(&from, &to);
        let mapped = q * from;
        let expected = to.normalize();
        assert_relative_eq!(mapped.x, expected.x, epsilon = 1e-5);
        assert_relative_eq!(mapped.y, expected.y, epsilon = 1e-5);
        assert_relative_eq!(mapped.z, expected.z, epsilon = 1e-5);
        assert_relative_eq!(q.angle(), FRAC_PI_2, epsilon = 1e-5);
    }

    #[test]
    fn shortest_arc_antiparallel_is_half_turn() {
        let from = Vector3::new(0.0, 0.0, 1.0);
        let q = shortest_arc(&from, &-from);
        assert_relative_eq!(q.angle(), PI, epsilon = 1e-5);
        let mapped = q * from;
        assert_relative_eq!(mapped.z, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn shortest_arc_degenerate_is_identity() {
        let q = shortest_arc(&Vector3::zeros(), &Vector3::x());
        assert_relative_eq!(q.angle(), 0.0);
        let q = shortest_arc(&Vector3::x(), &(Vector3::x() * 3.0));
        assert_relative_eq!(q.angle(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn any_perpendicular_is_orthogonal() {
        for v in [Vector3::x(), Vector3::y(), Vector3::new(1.0, 2.0, 3.0)] {
            let p = any_perpendicular(&v);
            assert_relative_eq!(p.dot(&v), 0.0, epsilon = 1e-6);
            assert_relative_eq!(p.norm(), 1.0, epsilon = 1e-6);
        }
        assert_eq!(any_perpendicular(&Vector3::zeros()), Vector3::z_axis());
    }

    #[test]
    fn blend_stays_on_short_path() {
        let a = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.2);
        let b = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.6);
        // Same rotation as b, opposite hemisphere
        let b_flipped = UnitQuaternion::new_unchecked(-b.into_inner());
        let half = blend(&a, &b_flipped, 0.5);
        assert_relative_eq!(half.angle(), 0.4, epsilon = 1e-4);
        assert!(almost_equal(&blend(&a, &b, 1.0), &b));
        assert!(almost_equal(&blend(&a, &b, 0.0), &a));
    }

    #[test]
    fn almost_equal_respects_tolerance() {
        let a = UnitQuaternion::identity();
        let small = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 5.0e-4);
        let large = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 5.0e-3);
        assert!(almost_equal(&a, &small));
        assert!(!almost_equal(&a, &large));
        assert!(almost_equal_within(&a, &large, 1.0e-2));
    }

    #[test]
    fn mean_rotation_of_opposite_hemispheres() {
        let q = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.3);
        let flipped = UnitQuaternion::new_unchecked(-q.into_inner());
        let mean = mean_rotation([q, flipped]);
        assert!(almost_equal(&mean, &q));
        assert_eq!(
            mean_rotation(std::iter::empty::<UnitQuaternion<f32>>()),
            UnitQuaternion::identity()
        );
    }

    // ---- Angles ----

    #[test]
    fn remove_multiples_truncates_toward_zero() {
        assert_relative_eq!(remove_multiples_of_two_pi(TAU + 0.5), 0.5, epsilon = 1e-5);
        assert_relative_eq!(remove_multiples_of_two_pi(-TAU - 0.5), -0.5, epsilon = 1e-5);
        assert_relative_eq!(remove_multiples_of_two_pi(1.0), 1.0);
    }

    #[test]
    fn angle_limits_are_ordered_and_wrapped() {
        let samples = [-12.0_f32, -7.0, -4.0, -3.2, -1.0, 0.0, 0.5, 3.0, 3.3, 6.5, 9.9, 20.0];
        for &a in &samples {
            for &b in &samples {
                let (min, max) = compute_angle_limits(a, b);
                assert!(min <= max, "min {min} > max {max} for ({a}, {b})");
                assert!((-PI..=PI).contains(&min), "min {min} out of range for ({a}, {b})");
                assert!((-PI..=PI).contains(&max), "max {max} out of range for ({a}, {b})");
            }
        }
    }

    #[test]
    fn angle_limits_keep_full_circle() {
        let (min, max) = compute_angle_limits(-PI, PI);
        assert_relative_eq!(min, -PI);
        assert_relative_eq!(max, PI);
    }

    #[test]
    fn angle_limits_swap_reversed_input() {
        let (min, max) = compute_angle_limits(1.0, -0.5);
        assert_relative_eq!(min, -0.5);
        assert_relative_eq!(max, 1.0);
    }

    #[test]
    fn clamped_angle_picks_nearer_limit() {
        let (min, max) = (-0.5, 1.0);
        // Just past max
        assert_relative_eq!(compute_clamped_angle(1.2, min, max), max);
        // Just below min
        assert_relative_eq!(compute_clamped_angle(-0.7, min, max), min);
        // Bisector sits at 1.0 + 0.5 * (2π - 1.5) ~= 3.39, i.e. -2.89
        assert_relative_eq!(compute_clamped_angle(3.0, min, max), max);
        assert_relative_eq!(compute_clamped_angle(-3.0, min, max), max);
        assert_relative_eq!(compute_clamped_angle(-2.5, min, max), min);
    }
}
