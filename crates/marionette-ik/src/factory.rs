//! Shared, deduplicated constraint instances.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::constraint::{Constraint, ConstraintDef};
use crate::error::ConstraintError;

/// Builds constraints from definitions and hands out shared handles.
///
/// Identical definitions resolve to the same `Arc`, so a skeleton with
/// mirrored limbs holds one instance per distinct constraint.
#[derive(Debug, Default)]
pub struct ConstraintFactory {
    constraints: HashMap<u64, Arc<Constraint>>,
    joint_mapping: HashMap<String, Arc<Constraint>>,
}

impl ConstraintFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a constraint set from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConstraintError> {
        let mut factory = Self::new();
        factory.load_file(path)?;
        Ok(factory)
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize, ConstraintError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        self.load_str(&contents)
    }

    /// Load a TOML table mapping joint names to constraint definitions.
    ///
    /// Entries that fail to parse or build are logged and skipped. Returns
    /// the number of joints mapped.
    pub fn load_str(&mut self, toml_str: &str) -> Result<usize, ConstraintError> {
        let table: toml::Table = toml_str.parse()?;
        let mut loaded = 0;
        for (joint_name, value) in table {
            let toml::Value::Table(mut entry) = value else {
                warn!(joint = %joint_name, "constraint entry is not a table, skipping");
                continue;
            };
            // Type names are matched case-insensitively
            if let Some(toml::Value::String(type_name)) = entry.get_mut("type") {
                *type_name = type_name.to_uppercase();
            }
            let def = match toml::Value::Table(entry).try_into::<ConstraintDef>() {
                Ok(def) => def,
                Err(e) => {
                    warn!(joint = %joint_name, error = %e, "malformed constraint, skipping");
                    continue;
                }
            };
            match self.get_constraint(&def) {
                Ok(constraint) => {
                    self.joint_mapping.insert(joint_name, constraint);
                    loaded += 1;
                }
                Err(e) => warn!(joint = %joint_name, error = %e, "invalid constraint, skipping"),
            }
        }
        debug!(
            joints = loaded,
            unique = self.constraints.len(),
            "loaded constraint set"
        );
        Ok(loaded)
    }

    /// Build the constraint for `def`, reusing an existing instance with
    /// identical content.
    pub fn get_constraint(&mut self, def: &ConstraintDef) -> Result<Arc<Constraint>, ConstraintError> {
        Ok(self.insert(def.build()?))
    }

    /// Register an already-built constraint, returning the shared instance.
    pub fn insert(&mut self, constraint: Constraint) -> Arc<Constraint> {
        Arc::clone(
            self.constraints
                .entry(constraint.content_hash())
                .or_insert_with(|| Arc::new(constraint)),
        )
    }

    pub fn constraint_for_joint(&self, joint_name: &str) -> Option<Arc<Constraint>> {
        self.joint_mapping.get(joint_name).cloned()
    }

    /// Names of every joint with a mapped constraint, sorted.
    pub fn joint_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.joint_mapping.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of unique constraint instances.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
