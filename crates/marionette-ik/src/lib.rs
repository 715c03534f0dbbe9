//! Constraint-based inverse kinematics for articulated skeletons.
//!
//! Implements FABRIK (Forward And Backward Reaching IK) over an arbitrary
//! joint tree, with per-joint rotation limits (cones, hinges, elbows, knees,
//! elliptical cones) and a cyclic coordinate descent alternative.
//!
//! # Architecture
//!
//! ```text
//! ConstraintDef ──► ConstraintFactory ──► Arc<Constraint> ─┐
//!                                                          ▼
//! JointInfo ──► Solver::add_joint ──► Skeleton (joint arena)
//!                                                          │
//! JointConfig map ──► Solver::update_joint_configs         │
//!                                │                         ▼
//!                                └──► Solver::solve ──► Chains ──► JointPose
//! ```
//!
//! The caller registers joints once, parents before children, then each
//! frame supplies a map of [`JointConfig`] targets and calls
//! [`Solver::solve`]. Solved local rotations are read back with
//! [`Solver::harvest`] or the per-joint accessors.
//!
//! ```
//! use std::collections::BTreeMap;
//! use marionette_ik::{JointConfig, JointId, JointInfo, Solver};
//! use nalgebra::Vector3;
//!
//! let mut solver = Solver::with_defaults();
//! let link = JointInfo::new(Vector3::z(), Vector3::z());
//! solver.add_joint(JointId(0), None, JointInfo::new(Vector3::zeros(), Vector3::z()), None).unwrap();
//! solver.add_joint(JointId(1), Some(JointId(0)), link, None).unwrap();
//! solver.add_joint(JointId(2), Some(JointId(1)), link, None).unwrap();
//!
//! let goal = Vector3::new(0.0, 0.5, 2.7);
//! let configs = BTreeMap::from([(JointId(2), JointConfig::new().with_target_pos(goal))]);
//! solver.update_joint_configs(configs);
//! let error = solver.solve();
//! assert!(error < 0.01);
//! ```

mod chain;
pub mod config;
pub mod constraint;
pub mod error;
pub mod factory;
pub mod joint;
pub mod math;
mod skeleton;
pub mod solver;

pub use config::{Algorithm, SolverConfig};
pub use constraint::{Constraint, ConstraintDef, ConstraintKind};
pub use error::{ConfigError, ConstraintError, IkError, SkeletonError};
pub use factory::ConstraintFactory;
pub use joint::{Joint, JointConfig, JointId, JointInfo};
pub use solver::{JointPose, Solver};
