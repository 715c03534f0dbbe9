use thiserror::Error;

use crate::joint::JointId;

/// Top-level error type for marionette-ik.
#[derive(Debug, Error)]
pub enum IkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Skeleton error: {0}")]
    Skeleton(#[from] SkeletonError),

    #[error("Constraint error: {0}")]
    Constraint(#[from] ConstraintError),
}

/// Solver configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Skeleton setup errors.
///
/// Copy + static messages so setup code can log and keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SkeletonError {
    #[error("Invalid joint id: {0}")]
    InvalidJointId(JointId),

    #[error("Joint {0} already exists")]
    DuplicateJoint(JointId),

    #[error("Cannot add joint {joint}: parent {parent} is not registered")]
    MissingParent { joint: JointId, parent: JointId },

    #[error("Unknown joint: {0}")]
    UnknownJoint(JointId),
}

/// Constraint definition errors.
#[derive(Debug, Error)]
pub enum ConstraintError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Degenerate {axis} in {kind} constraint")]
    DegenerateAxis {
        kind: &'static str,
        axis: &'static str,
    },

    #[error("Invalid {field} in {kind} constraint: {message}")]
    InvalidParameter {
        kind: &'static str,
        field: &'static str,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ik_error_from_config_error() {
        let err = ConfigError::InvalidValue {
            field: "max_iterations".into(),
            message: "must be > 0".into(),
        };
        let ik_err: IkError = err.into();
        assert!(matches!(ik_err, IkError::Config(_)));
        assert!(ik_err.to_string().contains("max_iterations"));
    }

    #[test]
    fn ik_error_from_skeleton_error() {
        let err = SkeletonError::MissingParent {
            joint: JointId(4),
            parent: JointId(3),
        };
        let ik_err: IkError = err.into();
        assert!(matches!(ik_err, IkError::Skeleton(_)));
        assert!(ik_err.to_string().contains("parent 3"));
    }

    #[test]
    fn ik_error_from_constraint_error() {
        let err = ConstraintError::DegenerateAxis {
            kind: "ELBOW",
            axis: "pivot_axis",
        };
        let ik_err: IkError = err.into();
        assert!(matches!(ik_err, IkError::Constraint(_)));
        assert!(ik_err.to_string().contains("pivot_axis"));
    }

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::Io(_)));
    }

    #[test]
    fn skeleton_error_is_copy() {
        let err = SkeletonError::DuplicateJoint(JointId(2));
        let copy = err;
        assert_eq!(err, copy);
        assert!(copy.to_string().contains("already exists"));
    }
}
