//! Sequential sinusoid planner
//!
//! Steers a bicycle-model robot to a full pose with four open-loop
//! maneuvers, each nulling one chained coordinate:
//!
//! 1. `steer_y`: constant `v1`
//! 2. `steer_phi`: constant `v2`
//! 3. `steer_alpha`: `v1 = a1 sin(wt)`, `v2 = a2 cos(wt)`, `a1` from the
//!    steering commutator integral
//! 4. `steer_x`: `v1 = a1 sin(wt)`, `v2 = a2 cos(2wt)`, amplitudes found by
//!    shooting
//!
//! Reference: R. M. Murray and S. S. Sastry, "Nonholonomic motion planning:
//! steering using sinusoids", IEEE TAC, 1993.

use std::f64::consts::{FRAC_PI_2, PI};
use std::time::Instant;

use nalgebra::{Vector2, Vector4};
use tracing::{debug, info, warn};

use crate::common::{
    BicycleState, ConfigurationSpace, ControlInput, PosePlanner, RoboticsError, RoboticsResult,
};

use super::config::{PlannerConfig, SingularityPolicy};
use super::context::PlanContext;
use super::integrator::{adaptive_simpson, integrate_euler, Derivative, Integration};
use super::motion_model::BicycleModel;
use super::root_finder::LevenbergMarquardt;
use super::trajectory::Trajectory;

/// `|sin(theta)|` under which the shooting rollout is treated as diverged
const SINGULAR_SIN: f64 = 1e-9;

/// Commutator integral magnitude below which `steer_alpha` has no authority
const MIN_COMMUTATOR: f64 = 1e-8;

/// Virtual velocity sample in chained coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualInput {
    pub t: f64,
    pub v1: f64,
    pub v2: f64,
}

impl VirtualInput {
    pub fn new(t: f64, v1: f64, v2: f64) -> Self {
        Self { t, v1, v2 }
    }
}

/// Output of `v_path_to_u_path`
#[derive(Debug, Clone)]
pub struct Conversion {
    pub trajectory: Trajectory,
    /// Some command or steering angle left the configured bounds
    pub limit_exceeded: bool,
}

/// Statistics of the shooting stage
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShootingReport {
    pub a1: f64,
    pub a2: f64,
    /// Residual of the shooting equation at `(a1, a2)`
    pub residual: f64,
    /// Root-finder runs across all rounds
    pub root_attempts: usize,
    /// Times the amplitude bounds were shrunk
    pub shrink_rounds: usize,
}

/// Result of one planning call
#[derive(Debug, Clone)]
pub struct SinusoidPlan {
    /// The four stages chained together
    pub trajectory: Trajectory,
    /// `steer_y`, `steer_phi`, `steer_alpha`, `steer_x` in order
    pub segments: Vec<Trajectory>,
    /// Largest steering excursion allowed around the goal steering angle
    pub phi_dist: f64,
    pub shooting: ShootingReport,
    /// World-frame rotation used while planning (non-zero only with
    /// `SingularityPolicy::Rotate`)
    pub frame_rotation: f64,
    /// Largest component error between the final pose and the goal, heading
    /// wrapped to `[-pi, pi]`
    pub terminal_error: f64,
}

/// Sinusoid steering planner
#[derive(Debug, Clone)]
pub struct SinusoidPlanner {
    model: BicycleModel,
    max_phi: f64,
    max_u1: f64,
    max_u2: f64,
    config: PlannerConfig,
    solver: LevenbergMarquardt,
}

impl SinusoidPlanner {
    /// Create a planner reading limits from `space`
    pub fn new<C: ConfigurationSpace + ?Sized>(space: &C) -> RoboticsResult<Self> {
        Self::with_config(space, PlannerConfig::default())
    }

    pub fn with_config<C: ConfigurationSpace + ?Sized>(
        space: &C,
        config: PlannerConfig,
    ) -> RoboticsResult<Self> {
        config.validate()?;

        let length = space.robot_length();
        let max_phi = space.max_steering_angle();
        let [max_u1, max_u2] = space.input_limits();
        for (name, value) in [
            ("robot length", length),
            ("steering angle bound", max_phi),
            ("velocity bound", max_u1),
            ("steering rate bound", max_u2),
        ]
        .iter()
        {
            if !(value.is_finite() && *value > 0.0) {
                return Err(RoboticsError::InvalidParameter(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if max_phi >= FRAC_PI_2 {
            return Err(RoboticsError::InvalidParameter(format!(
                "steering angle bound {} must stay below pi/2",
                max_phi
            )));
        }

        let solver = LevenbergMarquardt::new(config.solver.clone());
        Ok(Self {
            model: BicycleModel::new(length),
            max_phi,
            max_u1,
            max_u2,
            config,
            solver,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn model(&self) -> &BicycleModel {
        &self.model
    }

    pub fn max_steering_angle(&self) -> f64 {
        self.max_phi
    }

    /// Input bounds `[u1, u2]`
    pub fn input_limits(&self) -> [f64; 2] {
        [self.max_u1, self.max_u2]
    }

    // ========================================================================
    // Top-level planning
    // ========================================================================

    /// Plan with a fresh context: entropy-seeded restarts, unbounded retries
    pub fn plan_to_pose(
        &self,
        start: BicycleState,
        goal: BicycleState,
        dt: f64,
        delta_t: f64,
    ) -> RoboticsResult<Trajectory> {
        let mut ctx = PlanContext::new();
        self.plan_to_pose_with(start, goal, dt, delta_t, &mut ctx)
            .map(|plan| plan.trajectory)
    }

    /// Plan from `start` to `goal`
    ///
    /// # Arguments
    /// * `start`, `goal` - Poses `(x, y, theta, phi)`
    /// * `dt` - Simulation step [s]
    /// * `delta_t` - Duration of each of the four maneuvers [s]
    /// * `ctx` - Cancellation, retry bounds and RNG for this call
    pub fn plan_to_pose_with(
        &self,
        start: BicycleState,
        goal: BicycleState,
        dt: f64,
        delta_t: f64,
        ctx: &mut PlanContext,
    ) -> RoboticsResult<SinusoidPlan> {
        check_timing(dt, delta_t)?;
        self.check_preconditions(&start, &goal)?;

        let phi_dist = self.phi_distance(&goal);
        let rotation = self.frame_rotation(&start, &goal)?;
        let start_f = rotate_state(&start, -rotation);
        let goal_f = rotate_state(&goal, -rotation);

        info!(
            dt = dt,
            delta_t = delta_t,
            phi_dist = phi_dist,
            rotation = rotation,
            "Planning with sinusoid planner"
        );

        ctx.check_cancelled()?;
        let y_path = self.steer_y(&start_f, &goal_f, dt, delta_t);

        ctx.check_cancelled()?;
        let phi_path = self.steer_phi(&end_of(&y_path)?, &goal_f, dt, delta_t);

        ctx.check_cancelled()?;
        let alpha_path = self.steer_alpha(&end_of(&phi_path)?, &goal_f, phi_dist, dt, delta_t)?;

        ctx.check_cancelled()?;
        let (x_path, shooting) = self.steer_x(&end_of(&alpha_path)?, &goal_f, dt, delta_t, ctx)?;

        let segments: Vec<Trajectory> = [y_path, phi_path, alpha_path, x_path]
            .iter()
            .map(|segment| rotate_trajectory(segment, rotation))
            .collect();
        let trajectory = Trajectory::chain(&segments);

        let end = end_of(&trajectory)?;
        let terminal_error = terminal_error(&end, &goal);
        debug!(
            "Plan ends at ({:.4}, {:.4}, {:.4}, {:.4}), goal ({:.4}, {:.4}, {:.4}, {:.4})",
            end.x, end.y, end.theta, end.phi, goal.x, goal.y, goal.theta, goal.phi
        );
        if terminal_error > self.config.goal_tolerance {
            warn!(
                terminal_error = terminal_error,
                tolerance = self.config.goal_tolerance,
                "Plan ends away from the goal"
            );
        }

        Ok(SinusoidPlan {
            trajectory,
            segments,
            phi_dist,
            shooting,
            frame_rotation: rotation,
            terminal_error,
        })
    }

    /// Check the start/goal pair before planning
    pub fn check_preconditions(&self, start: &BicycleState, goal: &BicycleState) -> RoboticsResult<()> {
        if !start.is_finite() || !goal.is_finite() {
            return Err(RoboticsError::InvalidParameter(
                "start and goal must be finite".to_string(),
            ));
        }

        let max_abs_angle = start.theta.abs().max(goal.theta.abs());
        let min_abs_angle = start.theta.abs().min(goal.theta.abs());
        if max_abs_angle > FRAC_PI_2 && min_abs_angle < FRAC_PI_2 {
            return Err(RoboticsError::Singularity(format!(
                "headings {:.4} and {:.4} straddle +-pi/2",
                start.theta, goal.theta
            )));
        }

        for phi in [start.phi, goal.phi].iter() {
            if phi.abs() > self.max_phi {
                return Err(RoboticsError::SteeringOutOfBounds {
                    phi: *phi,
                    max_phi: self.max_phi,
                });
            }
        }

        if self.config.singularity_policy == SingularityPolicy::Reject {
            let tol = self.config.singularity_tolerance;
            let (sin_s, sin_g) = (start.theta.sin(), goal.theta.sin());
            if sin_s.abs() < tol || sin_g.abs() < tol {
                return Err(RoboticsError::Singularity(format!(
                    "heading {:.4} or {:.4} is within {} of sin(theta) = 0",
                    start.theta, goal.theta, tol
                )));
            }
            if sin_s.signum() != sin_g.signum() {
                return Err(RoboticsError::Singularity(format!(
                    "headings {:.4} and {:.4} lie on opposite sides of sin(theta) = 0",
                    start.theta, goal.theta
                )));
            }
        }

        Ok(())
    }

    /// Largest steering excursion around the goal steering angle
    pub fn phi_distance(&self, goal: &BicycleState) -> f64 {
        (goal.phi - self.max_phi).abs().min((goal.phi + self.max_phi).abs())
    }

    /// Rotation applied to the world frame before planning
    fn frame_rotation(&self, start: &BicycleState, goal: &BicycleState) -> RoboticsResult<f64> {
        if self.config.singularity_policy != SingularityPolicy::Rotate {
            return Ok(0.0);
        }

        let s = start.theta.sin() + goal.theta.sin();
        let c = start.theta.cos() + goal.theta.cos();
        if s.hypot(c) < 1e-9 {
            return Err(RoboticsError::Singularity(format!(
                "headings {:.4} and {:.4} are opposite; no frame keeps both regular",
                start.theta, goal.theta
            )));
        }

        // Mid heading maps to pi/2
        let rotation = s.atan2(c) - FRAC_PI_2;
        let tol = self.config.singularity_tolerance;
        let min_sin = (start.theta - rotation).sin().min((goal.theta - rotation).sin());
        if min_sin < tol.max(f64::EPSILON) {
            return Err(RoboticsError::Singularity(format!(
                "headings {:.4} and {:.4} are too far apart to share a regular frame",
                start.theta, goal.theta
            )));
        }
        Ok(rotation)
    }

    // ========================================================================
    // Stages
    // ========================================================================

    /// Null the `y` error with a constant `v1`
    pub fn steer_y(&self, start: &BicycleState, goal: &BicycleState, dt: f64, delta_t: f64) -> Trajectory {
        let start_v = self.model.to_v_state(start);
        let goal_v = self.model.to_v_state(goal);
        let delta_y = goal_v.y - start_v.y;
        let v1 = delta_y / delta_t;

        debug!("steer_y: delta_y = {:.6}", delta_y);
        let path = virtual_profile(dt, delta_t, |_| (v1, 0.0));
        self.convert_stage("steer_y", &path, start, dt)
    }

    /// Null the steering angle error with a constant `v2`
    pub fn steer_phi(&self, start: &BicycleState, goal: &BicycleState, dt: f64, delta_t: f64) -> Trajectory {
        let start_v = self.model.to_v_state(start);
        let goal_v = self.model.to_v_state(goal);
        let delta_phi = goal_v.phi - start_v.phi;
        let v2 = delta_phi / delta_t;

        debug!("steer_phi: delta_phi = {:.6}", delta_phi);
        let path = virtual_profile(dt, delta_t, |_| (0.0, v2));
        self.convert_stage("steer_phi", &path, start, dt)
    }

    /// Null the `alpha = cos(theta)` error with a matched pair of sinusoids
    ///
    /// Steering oscillates with amplitude bounded by `phi_dist`; the drive
    /// amplitude comes from the commutator integral
    /// `beta1 = w/pi * int_0^T f(phi(t)) sin(wt) dt`, `f(phi) = -tan(phi)/l`.
    pub fn steer_alpha(
        &self,
        start: &BicycleState,
        goal: &BicycleState,
        phi_dist: f64,
        dt: f64,
        delta_t: f64,
    ) -> RoboticsResult<Trajectory> {
        let start_v = self.model.to_v_state(start);
        let goal_v = self.model.to_v_state(goal);
        let delta_alpha = goal_v.alpha - start_v.alpha;

        if delta_alpha.abs() <= self.config.steer_tolerance {
            debug!("steer_alpha: nothing to steer");
            let path = virtual_profile(dt, delta_t, |_| (0.0, 0.0));
            return Ok(self.convert_stage("steer_alpha", &path, start, dt));
        }

        let omega = 2.0 * PI / delta_t;
        let a2 = (phi_dist * omega).min(1.0);
        let phi0 = start_v.phi;

        let integrand = |t: f64| {
            let phi = (a2 / omega) * (omega * t).sin() + phi0;
            self.model.alpha_rate(phi) * (omega * t).sin()
        };
        let beta1 = (omega / PI)
            * adaptive_simpson(integrand, 0.0, delta_t, self.config.quadrature_tolerance, 50);

        if !beta1.is_finite() || beta1.abs() < MIN_COMMUTATOR {
            return Err(RoboticsError::NumericalError(format!(
                "commutator integral vanished (beta1 = {:e}); steering has no room around phi = {:.4}",
                beta1, phi0
            )));
        }

        let a1 = (delta_alpha * omega) / (PI * beta1);
        debug!(
            "steer_alpha: delta_alpha = {:.6}, beta1 = {:.6}, a1 = {:.6}, a2 = {:.6}",
            delta_alpha, beta1, a1, a2
        );

        let path = virtual_profile(dt, delta_t, |t| {
            (a1 * (omega * t).sin(), a2 * (omega * t).cos())
        });
        Ok(self.convert_stage("steer_alpha", &path, start, dt))
    }

    /// Null the `x` error by shooting on `v1 = a1 sin(wt)`, `v2 = a2 cos(2wt)`
    ///
    /// Retries with random initial guesses while the root search fails, and
    /// shrinks the amplitude bounds while the generated commands violate the
    /// configured limits. Both loops stop on cancellation or when the
    /// context's retry policy is exhausted.
    pub fn steer_x(
        &self,
        start: &BicycleState,
        goal: &BicycleState,
        dt: f64,
        delta_t: f64,
        ctx: &mut PlanContext,
    ) -> RoboticsResult<(Trajectory, ShootingReport)> {
        let start_v = self.model.to_v_state(start);
        let goal_v = self.model.to_v_state(goal);
        let delta_x = goal_v.x - start_v.x;
        let omega = 2.0 * PI / delta_t;

        if delta_x.abs() <= self.config.steer_tolerance {
            debug!("steer_x: nothing to steer");
            let path = virtual_profile(dt, delta_t, |_| (0.0, 0.0));
            return Ok((self.v_path_to_u_path(&path, start, dt).trajectory, ShootingReport::default()));
        }

        let deadline = ctx.deadline();
        let mut max_a1 = self.max_u1;
        let mut max_a2 = self.max_u2;
        let mut report = ShootingReport::default();

        loop {
            ctx.check_cancelled()?;
            check_deadline(deadline)?;
            if let Some(max_rounds) = ctx.retry.max_shrink_rounds {
                if report.shrink_rounds > max_rounds {
                    return Err(RoboticsError::RetriesExhausted(format!(
                        "no in-bounds x maneuver after {} amplitude reductions",
                        max_rounds
                    )));
                }
            }

            let amplitudes = self.find_amplitudes(
                start,
                goal_v.x,
                delta_x,
                [max_a1, max_a2],
                dt,
                delta_t,
                deadline,
                ctx,
                &mut report,
            )?;
            let (a1, a2) = (amplitudes[0], amplitudes[1]);
            debug!("steer_x: a1 = {:.6}, a2 = {:.6}, delta_x = {:.6}", a1, a2, delta_x);

            let path = virtual_profile(dt, delta_t, |t| x_maneuver(a1, a2, omega, t));
            let conversion = self.v_path_to_u_path(&path, start, dt);

            if !conversion.limit_exceeded {
                report.a1 = a1;
                report.a2 = a2;
                return Ok((conversion.trajectory, report));
            }

            warn!(
                "Generated x path reached the limit, reducing max a1 {:.4} a2 {:.4} and trying again",
                max_a1, max_a2
            );
            max_a1 *= self.config.amplitude_decay;
            max_a2 *= self.config.amplitude_decay;
            report.shrink_rounds += 1;
        }
    }

    /// Root search with randomized restarts inside `[-max_a, max_a]`
    #[allow(clippy::too_many_arguments)]
    fn find_amplitudes(
        &self,
        start: &BicycleState,
        goal_x: f64,
        delta_x: f64,
        max_a: [f64; 2],
        dt: f64,
        delta_t: f64,
        deadline: Option<Instant>,
        ctx: &mut PlanContext,
        report: &mut ShootingReport,
    ) -> RoboticsResult<Vector2<f64>> {
        let [max_a1, max_a2] = max_a;
        let mut guess = Vector2::new(
            (2.0 * delta_x).max(-max_a1).min(max_a1),
            (2.0 * delta_x).max(-max_a2).min(max_a2),
        );
        let mut attempts = 0;

        loop {
            ctx.check_cancelled()?;
            check_deadline(deadline)?;
            if let Some(max_attempts) = ctx.retry.max_root_attempts {
                if attempts >= max_attempts {
                    return Err(RoboticsError::RetriesExhausted(format!(
                        "root search failed {} times within amplitude bounds ({:.4}, {:.4})",
                        attempts, max_a1, max_a2
                    )));
                }
            }
            attempts += 1;
            report.root_attempts += 1;

            let sol = self.solver.solve(
                |a: &Vector2<f64>| self.shooting_residual(start, goal_x, a, dt, delta_t),
                guess,
            );
            let in_bounds = sol.x[0].abs() <= max_a1 && sol.x[1].abs() <= max_a2;
            if sol.success && in_bounds {
                report.residual = sol.residual.norm();
                return Ok(sol.x);
            }

            let reason = if sol.success {
                format!("root ({:.4}, {:.4}) lies outside the amplitude bounds", sol.x[0], sol.x[1])
            } else {
                sol.message
            };
            guess = Vector2::new(ctx.sample_symmetric(max_a1), ctx.sample_symmetric(max_a2));
            warn!("Find root failed, because {}", reason);
            warn!(
                "Change initial guess to ({:.4}, {:.4}) and try again...",
                guess[0], guess[1]
            );
        }
    }

    /// Shooting residual `[x(T) - goal_x, 0]` for amplitudes `(a1, a2)`
    ///
    /// Rolls out the same forward Euler steps `v_path_to_u_path` emits, with
    /// `u1 = a1 sin(wt) / sin(theta)` and `u2 = a2 cos(2wt)` held over each
    /// step. Returns `None` when the rollout diverges or the heading reaches
    /// `sin(theta) = 0`.
    pub fn shooting_residual(
        &self,
        start: &BicycleState,
        goal_x: f64,
        amplitudes: &Vector2<f64>,
        dt: f64,
        delta_t: f64,
    ) -> Option<Vector2<f64>> {
        let omega = 2.0 * PI / delta_t;
        let (a1, a2) = (amplitudes[0], amplitudes[1]);
        let start_sin = start.theta.sin();
        let start_side = if start_sin > 0.0 {
            1.0
        } else if start_sin < 0.0 {
            -1.0
        } else {
            0.0
        };

        let rhs = |t: f64, z: &Vector4<f64>| {
            let state = BicycleState::from(*z);
            if !state.is_finite() {
                return Derivative::Diverged;
            }
            let (v1, v2) = x_maneuver(a1, a2, omega, t);
            let sin_theta = state.theta.sin();
            if v1 != 0.0 && (sin_theta.abs() < SINGULAR_SIN || sin_theta * start_side < 0.0) {
                return Derivative::Diverged;
            }
            let control = self.model.virtual_to_control(v1, v2, &state);
            Derivative::Finite(self.model.derivative(&state, &control))
        };

        match integrate_euler(rhs, start.to_vector(), 0.0, dt, sample_count(dt, delta_t)) {
            Integration::Completed(z) => Some(Vector2::new(z[0] - goal_x, 0.0)),
            Integration::Diverged { t } => {
                debug!("Shooting candidate ({:.4}, {:.4}) diverged at t = {:.4}", a1, a2, t);
                None
            }
        }
    }

    // ========================================================================
    // Virtual to actuator conversion
    // ========================================================================

    /// Simulate a virtual-velocity profile into a trajectory
    ///
    /// Each sample records the command applied from the current pose, then
    /// the pose is advanced by one Euler step. A terminal sample holds the
    /// final pose with a zero command.
    pub fn v_path_to_u_path(&self, path: &[VirtualInput], start: &BicycleState, dt: f64) -> Conversion {
        let mut trajectory = Trajectory::new(dt);
        let mut limit_exceeded = false;
        let mut state = *start;

        for input in path {
            let control = self.model.virtual_to_control(input.v1, input.v2, &state);
            if !limit_exceeded && self.exceeds_limits(&control, &state) {
                debug!(
                    "The limit is reached at t = {:.3}: u1 {:.4} u2 {:.4} phi {:.4}",
                    input.t, control.v, control.steering_rate, state.phi
                );
                limit_exceeded = true;
            }
            trajectory.push(input.t, state, control);
            state = self.model.step(&state, &control, dt);
        }

        if !limit_exceeded && (state.phi.abs() > self.max_phi || !state.is_finite()) {
            debug!("The limit is reached at the end: phi {:.4}", state.phi);
            limit_exceeded = true;
        }
        let t_end = path.last().map_or(0.0, |input| input.t + dt);
        trajectory.push(t_end, state, ControlInput::zero());

        Conversion {
            trajectory,
            limit_exceeded,
        }
    }

    /// Convert a closed-form stage; bound violations are reported, not retried
    fn convert_stage(&self, stage: &str, path: &[VirtualInput], start: &BicycleState, dt: f64) -> Trajectory {
        let conversion = self.v_path_to_u_path(path, start, dt);
        if conversion.limit_exceeded {
            warn!("{} commands leave the configured bounds", stage);
        }
        conversion.trajectory
    }

    fn exceeds_limits(&self, control: &ControlInput, state: &BicycleState) -> bool {
        !control.is_finite()
            || control.v.abs() > self.max_u1
            || control.steering_rate.abs() > self.max_u2
            || state.phi.abs() > self.max_phi
    }
}

impl PosePlanner for SinusoidPlanner {
    fn plan_to_pose(
        &self,
        start: BicycleState,
        goal: BicycleState,
        dt: f64,
        delta_t: f64,
    ) -> RoboticsResult<Trajectory> {
        SinusoidPlanner::plan_to_pose(self, start, goal, dt, delta_t)
    }
}

/// Virtual inputs of the `x` maneuver at time `t`
fn x_maneuver(a1: f64, a2: f64, omega: f64, t: f64) -> (f64, f64) {
    (a1 * (omega * t).sin(), a2 * (2.0 * omega * t).cos())
}

/// Largest component error to `goal`, heading difference wrapped
fn terminal_error(end: &BicycleState, goal: &BicycleState) -> f64 {
    let d_theta = end.theta - goal.theta;
    (end.x - goal.x)
        .abs()
        .max((end.y - goal.y).abs())
        .max(d_theta.sin().atan2(d_theta.cos()).abs())
        .max((end.phi - goal.phi).abs())
}

/// Number of commanded samples in one maneuver
pub fn sample_count(dt: f64, delta_t: f64) -> usize {
    ((delta_t / dt) - 1e-9).ceil().max(1.0) as usize
}

/// Sample `(v1, v2) = profile(t)` at `t = k * dt` over one maneuver
pub fn virtual_profile<F>(dt: f64, delta_t: f64, profile: F) -> Vec<VirtualInput>
where
    F: Fn(f64) -> (f64, f64),
{
    (0..sample_count(dt, delta_t))
        .map(|k| {
            let t = k as f64 * dt;
            let (v1, v2) = profile(t);
            VirtualInput::new(t, v1, v2)
        })
        .collect()
}

fn check_timing(dt: f64, delta_t: f64) -> RoboticsResult<()> {
    if !(dt.is_finite() && dt > 0.0) {
        return Err(RoboticsError::InvalidParameter(format!(
            "step size must be positive, got {}",
            dt
        )));
    }
    if !(delta_t.is_finite() && delta_t > 0.0) {
        return Err(RoboticsError::InvalidParameter(format!(
            "maneuver duration must be positive, got {}",
            delta_t
        )));
    }
    if dt > delta_t {
        return Err(RoboticsError::InvalidParameter(format!(
            "step size {} exceeds maneuver duration {}",
            dt, delta_t
        )));
    }
    Ok(())
}

fn check_deadline(deadline: Option<Instant>) -> RoboticsResult<()> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(RoboticsError::RetriesExhausted(
            "shooting stage timed out".to_string(),
        )),
        _ => Ok(()),
    }
}

fn end_of(trajectory: &Trajectory) -> RoboticsResult<BicycleState> {
    trajectory
        .end_position()
        .ok_or_else(|| RoboticsError::NumericalError("stage produced an empty trajectory".to_string()))
}

/// Rotate a state about the origin by `angle` (counter-clockwise)
fn rotate_state(state: &BicycleState, angle: f64) -> BicycleState {
    if angle == 0.0 {
        return *state;
    }
    let (s, c) = angle.sin_cos();
    BicycleState {
        x: c * state.x - s * state.y,
        y: s * state.x + c * state.y,
        theta: state.theta + angle,
        phi: state.phi,
    }
}

fn rotate_trajectory(trajectory: &Trajectory, angle: f64) -> Trajectory {
    if angle == 0.0 {
        return trajectory.clone();
    }
    let mut rotated = Trajectory::new(trajectory.dt());
    for sample in trajectory.samples() {
        rotated.push(sample.t, rotate_state(&sample.state, angle), sample.input);
    }
    rotated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_planning::sinusoid::config::{BicycleConfigurationSpace, RetryPolicy};
    use crate::path_planning::sinusoid::context::CancellationToken;
    use itertools::iproduct;
    use std::f64::consts::FRAC_PI_4;

    const DT: f64 = 0.01;
    const DELTA_T: f64 = 2.0;

    fn create_planner() -> SinusoidPlanner {
        SinusoidPlanner::new(&BicycleConfigurationSpace::default()).unwrap()
    }

    fn create_rotating_planner() -> SinusoidPlanner {
        let config = PlannerConfig::default().with_singularity_policy(SingularityPolicy::Rotate);
        SinusoidPlanner::with_config(&BicycleConfigurationSpace::default(), config).unwrap()
    }

    fn test_context() -> PlanContext {
        PlanContext::with_seed(7).with_retry_policy(RetryPolicy::bounded(200, 500))
    }

    #[test]
    fn test_planner_reads_configuration() {
        let planner = create_planner();
        assert_eq!(planner.model().length(), 0.15);
        assert_eq!(planner.max_steering_angle(), 0.6);
        assert_eq!(planner.input_limits(), [2.0, 3.0]);
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        let mut space = BicycleConfigurationSpace::default();
        space.robot_length = -1.0;
        assert!(matches!(
            SinusoidPlanner::new(&space),
            Err(RoboticsError::InvalidParameter(_))
        ));
    }

    struct WideSteering;

    impl ConfigurationSpace for WideSteering {
        fn robot_length(&self) -> f64 {
            0.15
        }

        fn max_steering_angle(&self) -> f64 {
            1.6
        }

        fn input_limits(&self) -> [f64; 2] {
            [2.0, 3.0]
        }
    }

    #[test]
    fn test_steering_bound_at_right_angle_rejected() {
        // tan(phi) is singular at pi/2, so no provider may allow it
        assert!(matches!(
            SinusoidPlanner::new(&WideSteering),
            Err(RoboticsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_invalid_timing_rejected() {
        let planner = create_planner();
        let pose = BicycleState::new(1.0, 1.0, FRAC_PI_4, 0.0);
        let mut ctx = test_context();

        for (dt, delta_t) in [(0.0, 2.0), (0.01, -1.0), (3.0, 2.0), (f64::NAN, 2.0)].iter() {
            let result = planner.plan_to_pose_with(pose, pose, *dt, *delta_t, &mut ctx);
            assert!(matches!(result, Err(RoboticsError::InvalidParameter(_))));
        }
    }

    #[test]
    fn test_straddle_detection() {
        let planner = create_planner();
        let headings = [-2.5, -2.0, -1.6, -1.0, -0.3, 0.3, 1.0, 1.5, 1.7, 2.4, 3.0];

        for (&ts, &tg) in iproduct!(headings.iter(), headings.iter()) {
            let start = BicycleState::new(0.0, 0.0, ts, 0.0);
            let goal = BicycleState::new(1.0, 1.0, tg, 0.0);
            let straddles = (ts.abs() > FRAC_PI_2) != (tg.abs() > FRAC_PI_2);

            let result = planner.check_preconditions(&start, &goal);
            if straddles {
                assert!(
                    matches!(result, Err(RoboticsError::Singularity(_))),
                    "expected singularity for {} -> {}",
                    ts,
                    tg
                );
            } else {
                assert!(result.is_ok(), "unexpected failure for {} -> {}", ts, tg);
            }
        }
    }

    #[test]
    fn test_steering_bound_precondition() {
        let planner = create_planner();
        let ok = BicycleState::new(0.0, 0.0, FRAC_PI_4, 0.1);
        let bad = BicycleState::new(0.0, 0.0, FRAC_PI_4, 0.7);

        assert!(matches!(
            planner.check_preconditions(&ok, &bad),
            Err(RoboticsError::SteeringOutOfBounds { .. })
        ));
        assert!(matches!(
            planner.check_preconditions(&bad, &ok),
            Err(RoboticsError::SteeringOutOfBounds { .. })
        ));
        assert!(planner.check_preconditions(&ok, &ok).is_ok());
    }

    #[test]
    fn test_reject_policy_flags_singular_headings() {
        let config = PlannerConfig::default().with_singularity_policy(SingularityPolicy::Reject);
        let planner = SinusoidPlanner::with_config(&BicycleConfigurationSpace::default(), config).unwrap();

        let start = BicycleState::new(1.0, 1.0, FRAC_PI_2, 0.0);
        let goal = BicycleState::new(1.0, 1.0, 0.0, 0.0);
        assert!(matches!(
            planner.check_preconditions(&start, &goal),
            Err(RoboticsError::Singularity(_))
        ));

        // Opposite sides of the singular line
        let goal = BicycleState::new(1.0, 1.0, -0.5, 0.0);
        assert!(planner.check_preconditions(&start, &goal).is_err());

        // Default policy accepts the same pair
        assert!(create_planner().check_preconditions(&start, &goal).is_ok());
    }

    #[test]
    fn test_phi_distance() {
        let planner = create_planner();
        let goal = BicycleState::new(0.0, 0.0, 1.0, 0.2);
        assert!((planner.phi_distance(&goal) - 0.4).abs() < 1e-12);

        let goal = BicycleState::new(0.0, 0.0, 1.0, 0.0);
        assert!((planner.phi_distance(&goal) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_sample_count() {
        assert_eq!(sample_count(0.01, 2.0), 200);
        assert_eq!(sample_count(0.5, 2.0), 4);
        assert_eq!(sample_count(0.3, 1.0), 4);
    }

    #[test]
    fn test_zero_virtual_path_does_not_move() {
        let planner = create_planner();
        let start = BicycleState::new(1.0, 2.0, 0.0, 0.3);
        let path = virtual_profile(DT, DELTA_T, |_| (0.0, 0.0));

        let conversion = planner.v_path_to_u_path(&path, &start, DT);
        assert!(!conversion.limit_exceeded);
        assert_eq!(conversion.trajectory.len(), path.len() + 1);
        for sample in conversion.trajectory.samples() {
            assert_eq!(sample.state, start);
            assert_eq!(sample.input, ControlInput::zero());
        }
    }

    #[test]
    fn test_conversion_records_command_before_step() {
        let planner = create_planner();
        let start = BicycleState::new(0.0, 0.0, FRAC_PI_2, 0.0);
        let path = vec![VirtualInput::new(0.0, 1.0, 0.0), VirtualInput::new(0.1, 1.0, 0.0)];

        let traj = planner.v_path_to_u_path(&path, &start, 0.1).trajectory;
        let samples = traj.samples();
        assert_eq!(samples[0].state, start);
        assert!((samples[0].input.v - 1.0).abs() < 1e-12);
        assert!((samples[1].state.y - 0.1).abs() < 1e-12);
        assert!((samples[2].state.y - 0.2).abs() < 1e-12);
        assert!((traj.end_time() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_conversion_flags_limits() {
        let planner = create_planner();
        let start = BicycleState::new(0.0, 0.0, FRAC_PI_2, 0.0);

        let fast = vec![VirtualInput::new(0.0, 2.5, 0.0)];
        assert!(planner.v_path_to_u_path(&fast, &start, DT).limit_exceeded);

        let steer_rate = vec![VirtualInput::new(0.0, 0.0, -3.5)];
        assert!(planner.v_path_to_u_path(&steer_rate, &start, DT).limit_exceeded);

        // Steering angle pushed past its bound by the last step
        let over = BicycleState::new(0.0, 0.0, FRAC_PI_2, 0.59);
        let steer = vec![VirtualInput::new(0.0, 0.0, 2.0)];
        assert!(planner.v_path_to_u_path(&steer, &over, DT).limit_exceeded);

        let gentle = vec![VirtualInput::new(0.0, 0.5, 0.5)];
        assert!(!planner.v_path_to_u_path(&gentle, &start, DT).limit_exceeded);
    }

    #[test]
    fn test_conversion_flags_singular_heading() {
        let planner = create_planner();
        let start = BicycleState::new(0.0, 0.0, 0.0, 0.0);
        let path = vec![VirtualInput::new(0.0, 0.5, 0.0)];
        assert!(planner.v_path_to_u_path(&path, &start, DT).limit_exceeded);
    }

    #[test]
    fn test_steer_y_drives_y_linearly() {
        let planner = create_planner();
        let start = BicycleState::new(1.0, 1.0, FRAC_PI_4, 0.0);
        let goal = BicycleState::new(1.0, 1.5, FRAC_PI_4, 0.0);

        let traj = planner.steer_y(&start, &goal, DT, DELTA_T);
        let n = traj.len() - 1;
        for (k, sample) in traj.samples().iter().enumerate() {
            let expected_y = 1.0 + 0.5 * k as f64 / n as f64;
            assert!((sample.state.y - expected_y).abs() < 1e-9);
            assert!((sample.state.phi - start.phi).abs() < 1e-12);
            assert!((sample.state.theta.cos() - start.theta.cos()).abs() < 1e-12);
        }
        assert_eq!(traj.end_position().unwrap().y, traj.samples()[n].state.y);
    }

    #[test]
    fn test_steer_phi_reaches_goal_without_moving() {
        let planner = create_planner();
        let start = BicycleState::new(1.0, 1.0, FRAC_PI_4, 0.0);
        let goal = BicycleState::new(1.0, 1.0, FRAC_PI_4, -0.3);

        let traj = planner.steer_phi(&start, &goal, DT, DELTA_T);
        let end = traj.end_position().unwrap();
        assert!((end.phi + 0.3).abs() < 1e-9);
        assert_eq!(end.x, start.x);
        assert_eq!(end.y, start.y);
        assert_eq!(end.theta, start.theta);
    }

    #[test]
    fn test_steer_alpha_reaches_goal_heading() {
        let planner = create_planner();
        let start = BicycleState::new(0.0, 0.0, 1.2, 0.0);
        let goal = BicycleState::new(0.0, 0.0, 1.6, 0.0);
        let phi_dist = planner.phi_distance(&goal);

        let traj = planner.steer_alpha(&start, &goal, phi_dist, DT, DELTA_T).unwrap();
        let end = traj.end_position().unwrap();
        assert!((end.theta.cos() - goal.theta.cos()).abs() < 5e-3);
        // y and phi come back after one full period
        assert!((end.y - start.y).abs() < 1e-9);
        assert!((end.phi - start.phi).abs() < 1e-9);
        // Steering never leaves its bound
        assert!(traj.samples().iter().all(|s| s.state.phi.abs() <= 0.6));
    }

    #[test]
    fn test_steer_alpha_degenerate_integral() {
        let planner = create_planner();
        let start = BicycleState::new(0.0, 0.0, 1.2, 0.6);
        let goal = BicycleState::new(0.0, 0.0, 1.6, 0.6);

        // Goal steering sits on the bound, leaving no room to oscillate
        let result = planner.steer_alpha(&start, &goal, planner.phi_distance(&goal), DT, DELTA_T);
        assert!(matches!(result, Err(RoboticsError::NumericalError(_))));
    }

    #[test]
    fn test_shooting_residual_at_zero_amplitude() {
        let planner = create_planner();
        let start = BicycleState::new(0.5, 0.0, 1.0, 0.0);

        let residual = planner
            .shooting_residual(&start, 0.8, &Vector2::zeros(), DT, DELTA_T)
            .unwrap();
        assert!((residual[0] + 0.3).abs() < 1e-12);
        assert_eq!(residual[1], 0.0);
    }

    #[test]
    fn test_shooting_residual_diverges_at_singular_heading() {
        let planner = create_planner();
        let start = BicycleState::new(0.0, 0.0, 0.0, 0.0);
        let residual = planner.shooting_residual(&start, 0.1, &Vector2::new(0.5, 0.5), DT, DELTA_T);
        assert!(residual.is_none());
    }

    #[test]
    fn test_steer_x_residual_within_tolerance() {
        let planner = create_planner();
        let start = BicycleState::new(1.0, 1.0, 1.2, 0.0);
        let goal = BicycleState::new(1.1, 1.0, 1.2, 0.0);
        let mut ctx = test_context();

        let (traj, report) = planner.steer_x(&start, &goal, DT, DELTA_T, &mut ctx).unwrap();
        let amplitudes = Vector2::new(report.a1, report.a2);
        let residual = planner
            .shooting_residual(&start, goal.x, &amplitudes, DT, DELTA_T)
            .unwrap();

        let tolerance = planner.config().solver.tolerance;
        assert!(residual.norm() <= tolerance);
        assert!(report.root_attempts >= 1);
        // The emitted rollout is the one the residual was solved on
        let end = traj.end_position().unwrap();
        assert!((end.x - goal.x).abs() <= tolerance);
        assert!(((end.x - goal.x).abs() - report.residual).abs() < 1e-15);
        assert!((end.y - start.y).abs() < 1e-9);
        // Commands respect the configured bounds
        let peak = traj.max_abs_input();
        assert!(peak.v <= 2.0 && peak.steering_rate <= 3.0);
    }

    #[test]
    fn test_steer_x_lands_on_goal_x() {
        let planner = create_planner();
        let start = BicycleState::new(1.0, 1.0, 1.2, 0.0);
        let goal = BicycleState::new(1.4, 1.0, 1.2, 0.0);
        let mut ctx = test_context();

        let (traj, report) = planner.steer_x(&start, &goal, DT, DELTA_T, &mut ctx).unwrap();
        let end = traj.end_position().unwrap();
        assert!(report.residual <= planner.config().solver.tolerance);
        assert!((end.x - goal.x).abs() <= planner.config().solver.tolerance);
    }

    #[test]
    fn test_mirrored_heading_reports_terminal_error() {
        // cos(theta) cannot tell 1.0 from -1.0, so nothing steers the heading
        let start = BicycleState::new(1.0, 1.0, 1.0, 0.0);
        let goal = BicycleState::new(1.0, 1.0, -1.0, 0.0);

        let plan = create_planner()
            .plan_to_pose_with(start, goal, DT, DELTA_T, &mut test_context())
            .unwrap();
        assert!((plan.terminal_error - 2.0).abs() < 1e-9);
        assert!(plan.terminal_error > PlannerConfig::default().goal_tolerance);

        let config = PlannerConfig::default().with_singularity_policy(SingularityPolicy::Reject);
        let rejecting = SinusoidPlanner::with_config(&BicycleConfigurationSpace::default(), config).unwrap();
        let result = rejecting.plan_to_pose_with(start, goal, DT, DELTA_T, &mut test_context());
        assert!(matches!(result, Err(RoboticsError::Singularity(_))));
    }

    #[test]
    fn test_terminal_error_wraps_heading() {
        let end = BicycleState::new(0.0, 0.0, PI - 0.01, 0.0);
        let goal = BicycleState::new(0.0, 0.0, -PI + 0.01, 0.0);
        assert!((terminal_error(&end, &goal) - 0.02).abs() < 1e-9);

        let off = BicycleState::new(0.3, 0.0, -PI + 0.01, 0.0);
        assert!((terminal_error(&off, &goal) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_start_equals_goal_is_stationary() {
        let planner = create_planner();
        let poses = [
            BicycleState::new(1.0, 1.0, FRAC_PI_4, 0.0),
            BicycleState::new(2.0, 3.0, 1.3, 0.2),
            BicycleState::new(0.0, 0.0, 0.0, -0.1),
        ];

        for pose in poses.iter() {
            let mut ctx = test_context();
            let plan = planner.plan_to_pose_with(*pose, *pose, DT, DELTA_T, &mut ctx).unwrap();

            assert_eq!(plan.segments.len(), 4);
            let end = plan.trajectory.end_position().unwrap();
            assert!(end.max_abs_diff(pose) < 1e-12);
            assert!(plan.terminal_error < 1e-12);

            let peak = plan.trajectory.max_abs_input();
            assert!(peak.v < 1e-12 && peak.steering_rate < 1e-12);
            assert_eq!(plan.shooting.root_attempts, 0);
        }
    }

    #[test]
    fn test_stage_endpoints_are_handed_over() {
        let planner = create_planner();
        let start = BicycleState::new(1.0, 1.0, 1.2, 0.0);
        let goal = BicycleState::new(1.05, 1.2, 1.3, 0.0);
        let mut ctx = test_context();

        let plan = planner.plan_to_pose_with(start, goal, DT, DELTA_T, &mut ctx).unwrap();
        for pair in plan.segments.windows(2) {
            assert_eq!(pair[0].end_position(), pair[1].start_position());
        }
        assert_eq!(plan.trajectory.start_position(), Some(start));
        assert_eq!(plan.trajectory.end_position(), plan.segments[3].end_position());
        assert!((plan.trajectory.duration() - 4.0 * DELTA_T).abs() < 1e-9);
        assert!(plan.trajectory.is_time_ordered());
    }

    #[test]
    fn test_plan_reaches_goal() {
        let planner = create_planner();
        let start = BicycleState::new(1.0, 1.0, 1.2, 0.0);
        let goal = BicycleState::new(1.05, 1.2, 1.3, 0.0);
        let mut ctx = test_context();

        let plan = planner.plan_to_pose_with(start, goal, DT, DELTA_T, &mut ctx).unwrap();
        let end = plan.trajectory.end_position().unwrap();

        assert!((end.x - goal.x).abs() < 1e-6);
        assert!((end.y - goal.y).abs() < 1e-6);
        assert!((end.theta - goal.theta).abs() < 0.03);
        assert!((end.phi - goal.phi).abs() < 1e-6);
        assert!(plan.terminal_error < planner.config().goal_tolerance);
    }

    #[test]
    fn test_quarter_turn_with_rotated_frame() {
        let planner = create_rotating_planner();
        let start = BicycleState::new(1.0, 1.0, FRAC_PI_2, 0.0);
        let goal = BicycleState::new(1.0, 1.0, 0.0, 0.0);
        let mut ctx = test_context();

        let plan = planner.plan_to_pose_with(start, goal, DT, DELTA_T, &mut ctx).unwrap();
        assert!((plan.frame_rotation + FRAC_PI_4).abs() < 1e-12);
        assert_eq!(plan.segments.len(), 4);
        assert!(plan.shooting.root_attempts >= 1);

        let end = plan.trajectory.end_position().unwrap();
        // Position is solved exactly; only the heading carries Euler error
        assert!(end.position().distance(&goal.position()) < 1e-6);
        assert!((end.theta - goal.theta).abs() < 0.05);
        assert!((end.phi - goal.phi).abs() < 1e-6);
        assert!(plan.terminal_error < planner.config().goal_tolerance);

        let peak = plan.segments[3].max_abs_input();
        assert!(peak.v <= 2.0 && peak.steering_rate <= 3.0);
    }

    #[test]
    fn test_rotate_policy_rejects_opposite_headings() {
        let planner = create_rotating_planner();
        let start = BicycleState::new(0.0, 0.0, 0.5, 0.0);
        let goal = BicycleState::new(0.0, 0.0, 0.5 - PI, 0.0);
        let mut ctx = test_context();

        let result = planner.plan_to_pose_with(start, goal, DT, DELTA_T, &mut ctx);
        assert!(matches!(result, Err(RoboticsError::Singularity(_))));
    }

    #[test]
    fn test_same_seed_same_plan() {
        let planner = create_planner();
        let start = BicycleState::new(1.0, 1.0, 1.2, 0.0);
        let goal = BicycleState::new(1.05, 1.2, 1.3, 0.0);

        let a = planner
            .plan_to_pose_with(start, goal, DT, DELTA_T, &mut test_context())
            .unwrap();
        let b = planner
            .plan_to_pose_with(start, goal, DT, DELTA_T, &mut test_context())
            .unwrap();
        assert_eq!(a.trajectory, b.trajectory);
        assert_eq!(a.shooting, b.shooting);
    }

    #[test]
    fn test_cancelled_before_planning() {
        let planner = create_planner();
        let token = CancellationToken::new();
        token.cancel();
        let mut ctx = test_context().with_cancellation(token);

        let start = BicycleState::new(1.0, 1.0, 1.2, 0.0);
        let goal = BicycleState::new(1.05, 1.2, 1.3, 0.0);
        let result = planner.plan_to_pose_with(start, goal, DT, DELTA_T, &mut ctx);
        assert!(matches!(result, Err(RoboticsError::Cancelled)));
    }

    #[test]
    fn test_bounded_retries_give_up() {
        // Amplitude bounds far too small to cover the requested x change
        let space = BicycleConfigurationSpace::new(
            [0.0, 0.0, -1000.0, -0.6],
            [5.0, 5.0, 1000.0, 0.6],
            [-0.01, -0.01],
            [0.01, 0.01],
            0.15,
        );
        let planner = SinusoidPlanner::new(&space).unwrap();
        let start = BicycleState::new(0.0, 0.0, 1.2, 0.0);
        let goal = BicycleState::new(2.0, 0.0, 1.2, 0.0);
        let mut ctx = PlanContext::with_seed(3).with_retry_policy(RetryPolicy::bounded(3, 2));

        let result = planner.steer_x(&start, &goal, DT, DELTA_T, &mut ctx);
        assert!(matches!(result, Err(RoboticsError::RetriesExhausted(_))));
    }

    #[test]
    fn test_planner_trait_object() {
        let planner = create_planner();
        let pose = BicycleState::new(1.0, 1.0, 1.0, 0.0);
        let dyn_planner: &dyn PosePlanner = &planner;

        let traj = dyn_planner.plan_to_pose(pose, pose, DT, DELTA_T).unwrap();
        assert!(!traj.is_empty());
    }

    #[test]
    fn test_rotate_state_roundtrip() {
        let state = BicycleState::new(1.0, 2.0, 0.3, 0.1);
        let back = rotate_state(&rotate_state(&state, 0.7), -0.7);
        assert!(back.max_abs_diff(&state) < 1e-12);
    }
}
