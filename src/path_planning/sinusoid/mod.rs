//! Sinusoid Steering Planner Module
//!
//! Steers a kinematic bicycle between two poses `(x, y, theta, phi)` with
//! four open-loop maneuvers in chained coordinates: constant inputs null the
//! `y` and steering errors, and sinusoidal inputs null the heading and `x`
//! errors. The last maneuver's amplitudes are found by shooting with a
//! Levenberg-Marquardt root finder.
//!
//! # Components
//!
//! - `motion_model`: Bicycle kinematics and chained coordinates
//! - `integrator`: Euler integration and adaptive Simpson quadrature
//! - `root_finder`: Levenberg-Marquardt solver for the shooting equation
//! - `trajectory`: Time-stamped states and commands
//! - `config`: Configuration space, planner tuning, retry bounds
//! - `context`: Cancellation and reproducible randomness per call
//! - `sinusoid_planner`: The four maneuvers and their composition
//!
//! # Example
//!
//! ```no_run
//! use sinusoid_steering::common::BicycleState;
//! use sinusoid_steering::path_planning::sinusoid::{
//!     BicycleConfigurationSpace, PlanContext, RetryPolicy, SinusoidPlanner,
//! };
//!
//! let planner = SinusoidPlanner::new(&BicycleConfigurationSpace::default()).unwrap();
//! let start = BicycleState::new(1.0, 1.0, 1.2, 0.0);
//! let goal = BicycleState::new(1.05, 1.2, 1.3, 0.0);
//!
//! let mut ctx = PlanContext::with_seed(0).with_retry_policy(RetryPolicy::bounded(50, 100));
//! let plan = planner.plan_to_pose_with(start, goal, 0.01, 2.0, &mut ctx).unwrap();
//! println!("{} samples", plan.trajectory.len());
//! ```
//!
//! # References
//!
//! - R. M. Murray and S. S. Sastry, "Nonholonomic motion planning: steering
//!   using sinusoids", IEEE Transactions on Automatic Control, 1993

pub mod config;
pub mod context;
pub mod integrator;
pub mod motion_model;
pub mod root_finder;
pub mod sinusoid_planner;
pub mod trajectory;

// Re-exports
pub use config::{BicycleConfigurationSpace, PlannerConfig, RetryPolicy, SingularityPolicy};
pub use context::{CancellationToken, PlanContext};
pub use integrator::{adaptive_simpson, integrate_euler, Derivative, Integration};
pub use motion_model::{BicycleModel, VState};
pub use root_finder::{LevenbergMarquardt, LevenbergMarquardtConfig, RootSolution};
pub use sinusoid_planner::{
    Conversion, ShootingReport, SinusoidPlan, SinusoidPlanner, VirtualInput,
};
pub use trajectory::{Trajectory, TrajectorySample};
