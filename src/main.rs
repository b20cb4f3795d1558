use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mobile_diff_ik::executor::{ManualClock, PathExecutor};
use mobile_diff_ik::geometry::{transform_between_links, transform_to_pose};
use mobile_diff_ik::kinematic_traits::KinematicModel;
use mobile_diff_ik::parameters::Parameters;
use mobile_diff_ik::path::retarget;
use mobile_diff_ik::patterns::zigzag_pattern;
use mobile_diff_ik::simulated::{PlotRecorder, SimulatedActuator, SimulatedRobot};
use mobile_diff_ik::utils::{dump_joints, dump_pose};

/// Follows a zig-zag pattern with the gripper of the simulated Fetch robot.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML file with drive and control parameters (Fetch defaults if not given)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of waypoints the pattern is discretized into
    #[arg(long, default_value_t = 500)]
    resolution: usize,

    /// Poses per zig-zag half
    #[arg(long, default_value_t = 200)]
    length: usize,

    /// Number of zig-zag halves
    #[arg(long, default_value_t = 4)]
    repeats: usize,

    /// Print the effective parameters and the robot joints, then exit
    #[arg(long)]
    dump_config: bool,
}

fn main() -> Result<()> {
    // Set RUST_LOG=debug to see the limit avoidance passes
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let parameters = match &args.config {
        Some(path) => Parameters::from_yaml_file(path)
            .with_context(|| format!("Failed to load parameters from {}", path.display()))?,
        None => Parameters::fetch(),
    };

    let robot = SimulatedRobot::fetch();
    if args.dump_config {
        print!("{}", parameters.to_yaml());
        print!("{}", robot.describe());
        return Ok(());
    }

    println!("Initial joints:");
    dump_joints(&robot.active_joint_values());

    // The pattern is drawn by the gripper, the solver tracks the wrist (end effector)
    let gripper_link = robot
        .link_transform("gripper_link")
        .context("Robot has no gripper_link")?;
    let gripper = transform_to_pose(&gripper_link);
    let pattern = zigzag_pattern(&gripper, args.length, args.repeats);
    let offset = transform_between_links(&robot, "wrist_roll_link", "gripper_link")?;
    let path = retarget(&pattern, &offset);

    let plot = PlotRecorder::new();
    let actuator = SimulatedActuator::new(robot.clone())
        .with_base_scale(1.0 / parameters.control.base_command_gain);
    let mut executor = PathExecutor::new(robot.clone(), actuator, ManualClock::new(), parameters)
        .with_plot(Box::new(plot.clone()));

    let trace = executor.execute_path(&path, args.resolution)?;

    println!("Executed {} steps over {} waypoints, {} markers plotted",
             trace.steps.len(), trace.waypoints.len(), plot.points().len());
    let limited = trace.steps.iter().filter(|s| !s.eliminated.is_empty()).count();
    println!("Limit avoidance engaged in {} steps", limited);
    if let (Some(last), Some(goal)) = (trace.steps.last(), trace.waypoints.last()) {
        println!("Final end effector pose:");
        dump_pose(&last.end_effector);
        println!("Final waypoint:");
        dump_pose(goal);
    }
    println!("Final joints:");
    dump_joints(&robot.active_joint_values());
    Ok(())
}
