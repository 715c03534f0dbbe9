//! Shared fixtures for the marionette demos.
//!
//! The upper-body skeleton below is a small humanoid: pelvis, torso, head
//! and two arms held out along ±x in the bind pose. Joint names follow the
//! keys used in `data/arm_constraints.toml`.

use marionette_ik::{ConstraintFactory, IkError, JointId, JointInfo, Solver, SolverConfig};
use nalgebra::Vector3;
use tracing::{debug, warn};

/// Constraint set shipped with the demos.
pub const DEFAULT_CONSTRAINTS: &str = include_str!("../data/arm_constraints.toml");

/// One row of the skeleton table.
#[derive(Debug, Clone, Copy)]
pub struct BodyJoint {
    pub name: &'static str,
    pub id: JointId,
    pub parent: Option<JointId>,
    /// Tip in the parent's frame.
    pub position: [f32; 3],
    /// Bone end in this joint's frame.
    pub end: [f32; 3],
}

const fn joint(
    name: &'static str,
    id: i16,
    parent: Option<i16>,
    position: [f32; 3],
    end: [f32; 3],
) -> BodyJoint {
    let parent = match parent {
        Some(p) => Some(JointId(p)),
        None => None,
    };
    BodyJoint {
        name,
        id: JointId(id),
        parent,
        position,
        end,
    }
}

/// Parents precede children.
pub const UPPER_BODY: &[BodyJoint] = &[
    joint("mPelvis", 0, None, [0.0, 0.0, 1.0], [0.0, 0.0, 0.2]),
    joint("mTorso", 1, Some(0), [0.0, 0.0, 0.2], [0.0, 0.0, 0.2]),
    joint("mCollarLeft", 2, Some(1), [0.0, 0.0, 0.2], [0.2, 0.0, 0.0]),
    joint("mShoulderLeft", 3, Some(2), [0.2, 0.0, 0.0], [0.3, 0.0, 0.0]),
    joint("mElbowLeft", 4, Some(3), [0.3, 0.0, 0.0], [0.25, 0.0, 0.0]),
    joint("mWristLeft", 5, Some(4), [0.25, 0.0, 0.0], [0.1, 0.0, 0.0]),
    joint("mCollarRight", 6, Some(1), [0.0, 0.0, 0.2], [-0.2, 0.0, 0.0]),
    joint("mShoulderRight", 7, Some(6), [-0.2, 0.0, 0.0], [-0.3, 0.0, 0.0]),
    joint("mElbowRight", 8, Some(7), [-0.3, 0.0, 0.0], [-0.25, 0.0, 0.0]),
    joint("mWristRight", 9, Some(8), [-0.25, 0.0, 0.0], [-0.1, 0.0, 0.0]),
    joint("mHead", 10, Some(1), [0.0, 0.0, 0.2], [0.0, 0.0, 0.25]),
];

pub const LEFT_WRIST: JointId = JointId(5);
pub const RIGHT_WRIST: JointId = JointId(9);

pub fn joint_name(id: JointId) -> Option<&'static str> {
    UPPER_BODY.iter().find(|j| j.id == id).map(|j| j.name)
}

pub fn joint_id(name: &str) -> Option<JointId> {
    UPPER_BODY.iter().find(|j| j.name == name).map(|j| j.id)
}

/// Register [`UPPER_BODY`] with a new solver, attaching whatever
/// constraints `factory` maps to each joint name.
pub fn build_upper_body(
    factory: &ConstraintFactory,
    config: SolverConfig,
) -> Result<Solver, IkError> {
    config.validate()?;
    let mut solver = Solver::new(config);
    for body_joint in UPPER_BODY {
        let constraint = factory.constraint_for_joint(body_joint.name);
        if constraint.is_none() {
            debug!(joint = body_joint.name, "no constraint mapped");
        }
        let info = JointInfo::new(
            Vector3::from(body_joint.position),
            Vector3::from(body_joint.end),
        );
        solver.add_joint(body_joint.id, body_joint.parent, info, constraint)?;
    }
    for wrist in [LEFT_WRIST, RIGHT_WRIST] {
        solver.add_wrist_id(wrist)?;
    }

    let unused: Vec<_> = factory
        .joint_names()
        .into_iter()
        .filter(|name| joint_id(name).is_none())
        .collect();
    if !unused.is_empty() {
        warn!(?unused, "constraints mapped to joints missing from the skeleton");
    }
    Ok(solver)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
