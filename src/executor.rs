//! Drives the end effector along a path, one waypoint per control step.
//!
//! Every step computes the velocity command for the next waypoint, integrates it into
//! the goal configuration, dispatches the goal to the actuator and polls until the
//! actuator reports completion. Steps are strictly sequential; the next step starts
//! only after the previous command is confirmed complete.
//!
//! ```text
//! Idle -> ComputingStep -> Dispatching -> WaitingForCompletion -> ComputingStep | Done
//!                  any state -> Failed
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::base::BaseMapper;
use crate::control_error::ControlError;
use crate::geometry::transform_to_pose;
use crate::kinematic_traits::{Actuator, Color, JointCommand, KinematicModel, PlotSink, Pose, Transform};
use crate::parameters::Parameters;
use crate::path::{discretize, poses_from_transforms};
use crate::solver::{bound_joint_limits, DifferentialIk, Solution};
use crate::utils::format_pose;

/// Source of time for the completion polling.
pub trait Clock {
    /// Time elapsed since some fixed origin
    fn now(&self) -> Duration;

    fn sleep(&mut self, duration: Duration);
}

/// Wall clock time, sleeping the thread.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only advances when slept on. Used in tests and fast simulation.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    elapsed: Duration,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.elapsed
    }

    fn sleep(&mut self, duration: Duration) {
        self.elapsed += duration;
    }
}

/// Shared flag to stop the execution. Checked on every completion poll.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    ComputingStep { step: usize },
    Dispatching { step: usize },
    WaitingForCompletion { step: usize, polls: usize },
    Done,
    Failed { step: usize },
}

/// What happened in one executed step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step: usize,
    pub target: Pose,
    pub command: JointCommand,
    /// Arm joints the limit avoidance removed from the solution
    pub eliminated: Vec<usize>,
    /// End effector pose after the actuator completed
    pub end_effector: Pose,
    /// Base pose after the actuator completed
    pub base: Pose,
}

/// Result of executing a path.
#[derive(Debug, Clone, Default)]
pub struct ExecutionTrace {
    /// The discretized path
    pub waypoints: Vec<Pose>,
    pub steps: Vec<StepRecord>,
}

impl ExecutionTrace {
    pub fn end_effector_poses(&self) -> Vec<Pose> {
        self.steps.iter().map(|s| s.end_effector).collect()
    }

    pub fn base_poses(&self) -> Vec<Pose> {
        self.steps.iter().map(|s| s.base).collect()
    }
}

/// Executes paths on the robot described by the kinematic model through the actuator.
pub struct PathExecutor<M: KinematicModel, A: Actuator, C: Clock = SystemClock> {
    model: M,
    actuator: A,
    clock: C,
    parameters: Parameters,
    solver: DifferentialIk,
    base_mapper: BaseMapper,
    plot: Option<Box<dyn PlotSink>>,
    cancellation: CancellationToken,
    state: ExecutorState,
}

impl<M: KinematicModel, A: Actuator, C: Clock> PathExecutor<M, A, C> {
    pub fn new(model: M, actuator: A, clock: C, parameters: Parameters) -> Self {
        PathExecutor {
            model,
            actuator,
            clock,
            solver: DifferentialIk::new(&parameters),
            base_mapper: BaseMapper::new(parameters.drive),
            parameters,
            plot: None,
            cancellation: CancellationToken::new(),
            state: ExecutorState::Idle,
        }
    }

    /// Send waypoints and reached poses to this plot sink.
    pub fn with_plot(mut self, plot: Box<dyn PlotSink>) -> Self {
        self.plot = Some(plot);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn state(&self) -> &ExecutorState {
        &self.state
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Discretize the path and execute it. The first waypoint is where the path starts,
    /// steps target the waypoints that follow it. On error, the state becomes
    /// [ExecutorState::Failed] and the error carries the failing step index.
    pub fn execute_path(&mut self, path: &[Pose], resolution: usize) -> Result<ExecutionTrace, ControlError> {
        self.state = ExecutorState::Idle;
        let waypoints = discretize(path, resolution)
            .inspect_err(|_| self.state = ExecutorState::Failed { step: 0 })?;
        info!("Executing path of {} poses as {} waypoints", path.len(), waypoints.len());
        self.plot_points(&waypoints, 0.005, Color::PINK);

        let mut trace = ExecutionTrace { waypoints, steps: Vec::new() };
        for step in 1..trace.waypoints.len() {
            let target = trace.waypoints[step];
            match self.step(step, &target) {
                Ok(record) => trace.steps.push(record),
                Err(error) => {
                    warn!("Step {} failed: {}", step, error);
                    self.plot_point(&target, 0.01, Color::RED);
                    return Err(ControlError::StepFailed { step, source: Box::new(error) });
                }
            }
        }
        self.state = ExecutorState::Done;
        Ok(trace)
    }

    /// Same as [PathExecutor::execute_path] for the path given as transforms.
    pub fn execute_transforms(&mut self, transforms: &[Transform], resolution: usize)
                              -> Result<ExecutionTrace, ControlError> {
        self.execute_path(&poses_from_transforms(transforms), resolution)
    }

    /// One complete control step towards `target`: compute, dispatch, wait.
    /// On error, the state becomes [ExecutorState::Failed].
    pub fn step(&mut self, step: usize, target: &Pose) -> Result<StepRecord, ControlError> {
        let result = self.run_step(step, target);
        if result.is_err() {
            self.state = ExecutorState::Failed { step };
        }
        result
    }

    fn run_step(&mut self, step: usize, target: &Pose) -> Result<StepRecord, ControlError> {
        self.state = ExecutorState::ComputingStep { step };
        let (command, solution) = self.compute_command(target)?;

        self.state = ExecutorState::Dispatching { step };
        if self.actuator.is_busy() {
            warn!("Actuator is still busy with the previous command, dispatching step {} anyway", step);
        }
        let handle = self
            .actuator
            .dispatch(&command)
            .map_err(|source| ControlError::ActuatorFailure { step, source })?;

        self.wait_for_completion(step, &handle, &command)?;

        let end_effector = transform_to_pose(&self.model.end_effector_transform());
        let base = transform_to_pose(&self.model.base_transform());
        info!("Step {} reached {}, target {}", step, format_pose(&end_effector), format_pose(target));
        self.plot_point(&base, 0.01, Color::YELLOW);
        self.plot_point(&end_effector, 0.01, Color::BLUE);

        Ok(StepRecord {
            step,
            target: *target,
            command,
            eliminated: solution.eliminated,
            end_effector,
            base,
        })
    }

    /// Goal configuration for the next waypoint: the damped arm velocities integrated over
    /// the unit time and clamped into the joint limits, plus the scaled base motion.
    pub fn compute_command(&self, target: &Pose) -> Result<(JointCommand, Solution), ControlError> {
        let control = &self.parameters.control;
        let velocity_limits = control
            .enforce_velocity_limits
            .then(|| self.model.velocity_limits());
        let solution = self.solver.solve_for(&self.model, target, velocity_limits.as_ref())?;

        let current = self.model.active_joint_values();
        let arm_rate = &solution.command.arm * control.arm_damping;
        let goal = &current + arm_rate * control.unit_time;
        let goal = bound_joint_limits(&goal, &self.model.joint_limits());

        let base_motion = solution.command.base * control.unit_time;
        let base_goal = self.base_mapper.goal_cartesian(&base_motion, &self.model.base_transform());

        let command = JointCommand {
            arm: goal,
            base_forward: base_goal.forward * control.base_command_gain,
            base_yaw: base_goal.yaw * control.base_command_gain,
        };
        debug!(?command, passes = solution.passes, "computed step command");
        Ok((command, solution))
    }

    /// Poll the actuator until it reports the command done, the timeout expires or the
    /// execution is cancelled.
    fn wait_for_completion(&mut self, step: usize, handle: &A::Handle, command: &JointCommand)
                           -> Result<(), ControlError> {
        let control = self.parameters.control;
        let started = self.clock.now();
        let mut polls = 0;
        loop {
            self.state = ExecutorState::WaitingForCompletion { step, polls };
            if self.cancellation.is_cancelled() {
                return Err(ControlError::Cancelled { step });
            }
            let done = self
                .actuator
                .is_done(handle)
                .map_err(|source| ControlError::ActuatorFailure { step, source })?;
            if done {
                return Ok(());
            }
            let waited = self.clock.now().saturating_sub(started);
            if waited >= control.completion_timeout {
                return Err(ControlError::ActuatorTimeout { step, command: command.clone(), waited });
            }
            self.clock.sleep(control.poll_interval);
            polls += 1;
        }
    }

    fn plot_point(&mut self, pose: &Pose, size: f64, color: Color) {
        if let Some(plot) = self.plot.as_mut() {
            if let Err(e) = plot.plot_point(pose, size, color) {
                warn!("Plotting failed: {}", e);
            }
        }
    }

    fn plot_points(&mut self, poses: &[Pose], size: f64, color: Color) {
        if let Some(plot) = self.plot.as_mut() {
            if let Err(e) = plot.plot_points(poses, size, color) {
                warn!("Plotting failed: {}", e);
            }
        }
    }
}
