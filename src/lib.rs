//! Sinusoid steering - open-loop pose-to-pose planning for a kinematic bicycle
//!
//! This crate steers a bicycle-model robot between full poses using
//! sinusoidal inputs in chained coordinates, with plotting helpers for the
//! resulting trajectories.

// Core modules
pub mod common;
pub mod utils;

// Algorithm modules
pub mod path_planning;

// Re-export common types for convenience
pub use common::{BicycleState, ControlInput, Path2D, Point2D};
pub use common::{ConfigurationSpace, MotionModel, PosePlanner};
pub use common::{RoboticsError, RoboticsResult};
pub use path_planning::sinusoid::{PlanContext, SinusoidPlan, SinusoidPlanner, Trajectory};
