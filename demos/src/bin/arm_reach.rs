//! Reach the demo upper body's hands toward world-space targets and print
//! the solved pose.
//!
//! ```text
//! arm_reach --left 0.5 0.3 1.25 --right -0.5 0.3 1.25 --frames 3
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use marionette_demos::{build_upper_body, joint_name, LEFT_WRIST, RIGHT_WRIST};
use marionette_ik::{Algorithm, ConstraintFactory, IkError, JointConfig, SolverConfig};
use nalgebra::Vector3;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Solve hand targets on a constrained humanoid upper body.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Constraint set (TOML). Defaults to the bundled arm limits.
    #[arg(short, long)]
    constraints: Option<PathBuf>,

    /// Solver tuning (TOML). Defaults to built-in settings.
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Left hand target in world space.
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
    left: Option<Vec<f32>>,

    /// Right hand target in world space.
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
    right: Option<Vec<f32>>,

    /// Override the configured algorithm.
    #[arg(short, long, value_enum)]
    algorithm: Option<AlgorithmArg>,

    /// Solve the same targets this many times, warm-starting each frame.
    #[arg(short, long, default_value_t = 1)]
    frames: u32,
}

#[derive(Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    Fabrik,
    Ccd,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Fabrik => Self::Fabrik,
            AlgorithmArg::Ccd => Self::Ccd,
        }
    }
}

fn to_point(coords: &[f32]) -> Option<Vector3<f32>> {
    match *coords {
        [x, y, z] => Some(Vector3::new(x, y, z)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn run(cli: &Cli) -> Result<(), IkError> {
    let factory = match &cli.constraints {
        Some(path) => ConstraintFactory::from_file(path)?,
        None => {
            let mut factory = ConstraintFactory::new();
            factory.load_str(marionette_demos::DEFAULT_CONSTRAINTS)?;
            factory
        }
    };
    let mut config = match &cli.config {
        Some(path) => SolverConfig::from_file(path)?,
        None => SolverConfig::default(),
    };
    if let Some(algorithm) = cli.algorithm {
        config.algorithm = algorithm.into();
    }
    info!(constraints = factory.len(), algorithm = ?config.algorithm, "setting up solver");

    let mut solver = build_upper_body(&factory, config)?;

    let mut configs = BTreeMap::new();
    for (wrist, target) in [(LEFT_WRIST, &cli.left), (RIGHT_WRIST, &cli.right)] {
        if let Some(point) = target.as_deref().and_then(to_point) {
            configs.insert(wrist, JointConfig::new().with_target_pos(point));
        }
    }
    if configs.is_empty() {
        println!("no targets given, nothing to solve (see --left / --right)");
        return Ok(());
    }
    solver.update_joint_configs(configs);

    for frame in 0..cli.frames {
        let error = solver.solve();
        println!("frame {}: error={error:.5}", frame + 1);
    }

    println!("\nchains (outer end first):");
    for (end, chain) in solver.chain_layout() {
        let names: Vec<_> = chain
            .iter()
            .map(|&id| joint_name(id).unwrap_or("?"))
            .collect();
        println!("  {:<14} {}", joint_name(end).unwrap_or("?"), names.join(" -> "));
    }

    println!("\nposes (local rotation as roll/pitch/yaw, degrees):");
    for pose in solver.harvest() {
        let (roll, pitch, yaw) = pose.local_rot.euler_angles();
        let end = solver.joint_world_end_pos(pose.id).unwrap_or_else(Vector3::zeros);
        println!(
            "  {:<14} rot=({:7.2}, {:7.2}, {:7.2})  end=({:6.3}, {:6.3}, {:6.3}){}",
            joint_name(pose.id).unwrap_or("?"),
            roll.to_degrees(),
            pitch.to_degrees(),
            yaw.to_degrees(),
            end.x,
            end.y,
            end.z,
            if pose.constraint_disabled { "  [unconstrained]" } else { "" },
        );
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("arm_reach: {e}");
        std::process::exit(1);
    }
}
