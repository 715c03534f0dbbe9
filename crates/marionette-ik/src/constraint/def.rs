//! Serializable constraint definitions.
//!
//! Angles are in degrees, axes are `[x, y, z]` arrays. The `type` field
//! selects the variant:
//!
//! ```toml
//! [Elbow]
//! type = "ELBOW"
//! forward_axis = [1.0, 0.0, 0.0]
//! pivot_axis = [0.0, 0.0, 1.0]
//! min_bend = 0.0
//! max_bend = 145.0
//! min_twist = -45.0
//! max_twist = 45.0
//! ```

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::{
    AcuteEllipsoidalCone, Constraint, ConstraintKind, DoubleLimitedHinge, ElbowConstraint,
    KneeConstraint, NullConstraint, SimpleCone, TwistLimitedCone,
};
use crate::error::ConstraintError;
use crate::math::MIN_VECTOR_LENGTH;

/// Axes closer than this (as the sine of the angle between them) count as
/// parallel.
const MIN_AXIS_SEPARATION: f32 = 1.0e-3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintDef {
    NullConstraint {
        forward_axis: [f32; 3],
    },
    SimpleCone {
        forward_axis: [f32; 3],
        max_angle: f32,
    },
    TwistLimitedCone {
        forward_axis: [f32; 3],
        cone_angle: f32,
        min_twist: f32,
        max_twist: f32,
    },
    Elbow {
        forward_axis: [f32; 3],
        pivot_axis: [f32; 3],
        min_bend: f32,
        max_bend: f32,
        min_twist: f32,
        max_twist: f32,
    },
    Knee {
        forward_axis: [f32; 3],
        pivot_axis: [f32; 3],
        min_bend: f32,
        max_bend: f32,
    },
    AcuteEllipsoidalCone {
        forward_axis: [f32; 3],
        up_axis: [f32; 3],
        forward: f32,
        up: f32,
        down: f32,
        left: f32,
        right: f32,
    },
    DoubleLimitedHinge {
        forward_axis: [f32; 3],
        up_axis: [f32; 3],
        min_yaw: f32,
        max_yaw: f32,
        min_pitch: f32,
        max_pitch: f32,
    },
}

impl ConstraintDef {
    pub const fn kind(&self) -> ConstraintKind {
        match self {
            Self::NullConstraint { .. } => ConstraintKind::Null,
            Self::SimpleCone { .. } => ConstraintKind::SimpleCone,
            Self::TwistLimitedCone { .. } => ConstraintKind::TwistLimitedCone,
            Self::Elbow { .. } => ConstraintKind::Elbow,
            Self::Knee { .. } => ConstraintKind::Knee,
            Self::AcuteEllipsoidalCone { .. } => ConstraintKind::AcuteEllipsoidalCone,
            Self::DoubleLimitedHinge { .. } => ConstraintKind::DoubleLimitedHinge,
        }
    }

    /// Validate the definition and build the constraint it describes.
    pub fn build(&self) -> Result<Constraint, ConstraintError> {
        let kind = self.kind().name();
        let angle = |value: f32, field: &'static str| finite(value, kind, field).map(f32::to_radians);

        let constraint = match *self {
            Self::NullConstraint { forward_axis } => {
                Constraint::Null(NullConstraint::new(checked_axis(forward_axis, kind, "forward_axis")?))
            }
            Self::SimpleCone {
                forward_axis,
                max_angle,
            } => Constraint::SimpleCone(SimpleCone::new(
                checked_axis(forward_axis, kind, "forward_axis")?,
                angle(max_angle, "max_angle")?,
            )),
            Self::TwistLimitedCone {
                forward_axis,
                cone_angle,
                min_twist,
                max_twist,
            } => Constraint::TwistLimitedCone(TwistLimitedCone::new(
                checked_axis(forward_axis, kind, "forward_axis")?,
                angle(cone_angle, "cone_angle")?,
                angle(min_twist, "min_twist")?,
                angle(max_twist, "max_twist")?,
            )),
            Self::Elbow {
                forward_axis,
                pivot_axis,
                min_bend,
                max_bend,
                min_twist,
                max_twist,
            } => {
                let forward = checked_axis(forward_axis, kind, "forward_axis")?;
                let pivot = checked_lateral_axis(&forward, pivot_axis, kind, "pivot_axis")?;
                Constraint::Elbow(ElbowConstraint::new(
                    forward,
                    pivot,
                    angle(min_bend, "min_bend")?,
                    angle(max_bend, "max_bend")?,
                    angle(min_twist, "min_twist")?,
                    angle(max_twist, "max_twist")?,
                ))
            }
            Self::Knee {
                forward_axis,
                pivot_axis,
                min_bend,
                max_bend,
            } => {
                let forward = checked_axis(forward_axis, kind, "forward_axis")?;
                let pivot = checked_lateral_axis(&forward, pivot_axis, kind, "pivot_axis")?;
                Constraint::Knee(KneeConstraint::new(
                    forward,
                    pivot,
                    angle(min_bend, "min_bend")?,
                    angle(max_bend, "max_bend")?,
                ))
            }
            Self::AcuteEllipsoidalCone {
                forward_axis,
                up_axis,
                forward,
                up,
                down,
                left,
                right,
            } => {
                let forward_dir = checked_axis(forward_axis, kind, "forward_axis")?;
                let up_dir = checked_lateral_axis(&forward_dir, up_axis, kind, "up_axis")?;
                if finite(forward, kind, "forward")?.abs() < MIN_VECTOR_LENGTH {
                    return Err(ConstraintError::InvalidParameter {
                        kind,
                        field: "forward",
                        message: "forward extent must be non-zero".into(),
                    });
                }
                Constraint::AcuteEllipsoidalCone(AcuteEllipsoidalCone::new(
                    forward_dir,
                    up_dir,
                    forward,
                    finite(up, kind, "up")?,
                    finite(down, kind, "down")?,
                    finite(left, kind, "left")?,
                    finite(right, kind, "right")?,
                ))
            }
            Self::DoubleLimitedHinge {
                forward_axis,
                up_axis,
                min_yaw,
                max_yaw,
                min_pitch,
                max_pitch,
            } => {
                let forward = checked_axis(forward_axis, kind, "forward_axis")?;
                let up = checked_lateral_axis(&forward, up_axis, kind, "up_axis")?;
                Constraint::DoubleLimitedHinge(DoubleLimitedHinge::new(
                    forward,
                    up,
                    angle(min_yaw, "min_yaw")?,
                    angle(max_yaw, "max_yaw")?,
                    angle(min_pitch, "min_pitch")?,
                    angle(max_pitch, "max_pitch")?,
                ))
            }
        };
        Ok(constraint)
    }
}

fn finite(value: f32, kind: &'static str, field: &'static str) -> Result<f32, ConstraintError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConstraintError::InvalidParameter {
            kind,
            field,
            message: format!("{value} is not a finite number"),
        })
    }
}

fn checked_axis(
    axis: [f32; 3],
    kind: &'static str,
    name: &'static str,
) -> Result<Vector3<f32>, ConstraintError> {
    let v = Vector3::from(axis);
    if v.iter().all(|c| c.is_finite()) && v.norm() >= MIN_VECTOR_LENGTH {
        Ok(v)
    } else {
        Err(ConstraintError::DegenerateAxis { kind, axis: name })
    }
}

/// An axis that must not be parallel to `forward`.
fn checked_lateral_axis(
    forward: &Vector3<f32>,
    axis: [f32; 3],
    kind: &'static str,
    name: &'static str,
) -> Result<Vector3<f32>, ConstraintError> {
    let v = checked_axis(axis, kind, name)?;
    if forward.normalize().cross(&v.normalize()).norm() < MIN_AXIS_SEPARATION {
        return Err(ConstraintError::DegenerateAxis { kind, axis: name });
    }
    Ok(v)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn parses_tagged_toml() {
        let def: ConstraintDef = toml::from_str(
            r#"
            type = "TWIST_LIMITED_CONE"
            forward_axis = [0.0, 0.0, 1.0]
            cone_angle = 45.0
            min_twist = -30.0
            max_twist = 60.0
            "#,
        )
        .unwrap();
        assert_eq!(def.kind(), ConstraintKind::TwistLimitedCone);

        let Constraint::TwistLimitedCone(cone) = def.build().unwrap() else {
            panic!("wrong variant");
        };
        let (min, max) = cone.twist_limits();
        assert_relative_eq!(min, -30f32.to_radians(), epsilon = 1e-6);
        assert_relative_eq!(max, 60f32.to_radians(), epsilon = 1e-6);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result: Result<ConstraintDef, _> = toml::from_str(
            r#"
            type = "BALL_AND_SOCKET"
            forward_axis = [0.0, 0.0, 1.0]
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn zero_axis_is_degenerate() {
        let def = ConstraintDef::SimpleCone {
            forward_axis: [0.0, 0.0, 0.0],
            max_angle: 30.0,
        };
        let err = def.build().unwrap_err();
        assert!(matches!(
            err,
            ConstraintError::DegenerateAxis {
                axis: "forward_axis",
                ..
            }
        ));
    }

    #[test]
    fn parallel_pivot_is_degenerate() {
        let def = ConstraintDef::Knee {
            forward_axis: [1.0, 0.0, 0.0],
            pivot_axis: [2.0, 0.0, 0.0],
            min_bend: -120.0,
            max_bend: 0.0,
        };
        assert!(matches!(
            def.build(),
            Err(ConstraintError::DegenerateAxis {
                axis: "pivot_axis",
                ..
            })
        ));
    }

    #[test]
    fn zero_ellipse_forward_is_invalid() {
        let def = ConstraintDef::AcuteEllipsoidalCone {
            forward_axis: [1.0, 0.0, 0.0],
            up_axis: [0.0, 0.0, 1.0],
            forward: 0.0,
            up: 1.0,
            down: 1.0,
            left: 1.0,
            right: 1.0,
        };
        let err = def.build().unwrap_err();
        assert!(err.to_string().contains("forward"));
    }

    #[test]
    fn non_finite_angle_is_invalid() {
        let def = ConstraintDef::SimpleCone {
            forward_axis: [1.0, 0.0, 0.0],
            max_angle: f32::NAN,
        };
        assert!(matches!(
            def.build(),
            Err(ConstraintError::InvalidParameter {
                field: "max_angle",
                ..
            })
        ));
    }

    #[test]
    fn built_constraint_converts_back_to_definition() {
        let def = ConstraintDef::Elbow {
            forward_axis: [1.0, 0.0, 0.0],
            pivot_axis: [0.0, 0.0, 1.0],
            min_bend: 0.0,
            max_bend: 145.0,
            min_twist: -45.0,
            max_twist: 45.0,
        };
        let rebuilt = def.build().unwrap().to_def();
        let ConstraintDef::Elbow {
            max_bend,
            min_twist,
            pivot_axis,
            ..
        } = rebuilt
        else {
            panic!("wrong variant");
        };
        assert_relative_eq!(max_bend, 145.0, epsilon = 1e-3);
        assert_relative_eq!(min_twist, -45.0, epsilon = 1e-3);
        assert_relative_eq!(pivot_axis[2], 1.0, epsilon = 1e-6);
    }
}
