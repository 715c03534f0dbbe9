use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_acceptable_error() -> f32 {
    5.0e-4
}
const fn default_min_iterations() -> u32 {
    4
}
const fn default_max_iterations() -> u32 {
    16
}
const fn default_relaxation_factor() -> f32 {
    0.25
}
const fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Algorithm
// ---------------------------------------------------------------------------

/// Iterative scheme used by [`Solver::solve`](crate::Solver::solve).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Forward-and-backward reaching passes over the chains.
    #[default]
    Fabrik,
    /// Cyclic coordinate descent: damped swings from the outer end inward.
    Ccd,
}

// ---------------------------------------------------------------------------
// SolverConfig
// ---------------------------------------------------------------------------

/// Solver tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Convergence threshold on the largest end-effector distance
    /// (default: 5e-4). Also the position tolerance used when comparing
    /// frame configs.
    #[serde(default = "default_acceptable_error")]
    pub acceptable_error: f32,

    /// Iterations always run, converged or not (default: 4).
    #[serde(default = "default_min_iterations")]
    pub min_iterations: u32,

    /// Hard iteration cap (default: 16).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Blend toward the rest pose before each solve, in `[0, 1]`
    /// (default: 0.25).
    #[serde(default = "default_relaxation_factor")]
    pub relaxation_factor: f32,

    #[serde(default)]
    pub algorithm: Algorithm,

    /// Project joints back into their constraints after each pass.
    #[serde(default = "default_true")]
    pub enforce_constraints: bool,

    /// Rotate shoulders so elbows hang toward world down.
    #[serde(default = "default_true")]
    pub drop_elbows: bool,

    /// Bleed off twist that no target asks for. Only runs when constraints
    /// are enforced.
    #[serde(default = "default_true")]
    pub untwist: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            acceptable_error: default_acceptable_error(),
            min_iterations: default_min_iterations(),
            max_iterations: default_max_iterations(),
            relaxation_factor: default_relaxation_factor(),
            algorithm: Algorithm::default(),
            enforce_constraints: true,
            drop_elbows: true,
            untwist: true,
        }
    }
}

impl SolverConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.acceptable_error.is_finite() || self.acceptable_error <= 0.0 {
            return Err(invalid(
                "acceptable_error",
                format!("must be a positive number, got {}", self.acceptable_error),
            ));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be > 0".into()));
        }
        if self.min_iterations > self.max_iterations {
            return Err(invalid(
                "min_iterations",
                format!(
                    "{} exceeds max_iterations {}",
                    self.min_iterations, self.max_iterations
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.relaxation_factor) {
            return Err(invalid(
                "relaxation_factor",
                format!("must be in [0, 1], got {}", self.relaxation_factor),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        message,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
