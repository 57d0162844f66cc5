//! Common traits defining interfaces for the planner and its collaborators

use crate::common::error::RoboticsResult;
use crate::common::types::*;
use crate::path_planning::sinusoid::Trajectory;

/// Source of the robot's kinematic limits
///
/// The planner reads these once at construction.
pub trait ConfigurationSpace {
    /// Wheelbase length [m]
    fn robot_length(&self) -> f64;

    /// Symmetric steering angle bound [rad]
    fn max_steering_angle(&self) -> f64;

    /// Input magnitude bounds `[linear velocity, steering rate]`
    fn input_limits(&self) -> [f64; 2];
}

/// Trait for planners that steer to a full pose
pub trait PosePlanner {
    /// Plan from `start` to `goal` with step `dt`, each maneuver lasting `delta_t`
    fn plan_to_pose(
        &self,
        start: BicycleState,
        goal: BicycleState,
        dt: f64,
        delta_t: f64,
    ) -> RoboticsResult<Trajectory>;
}

/// Trait for vehicle/robot motion models
pub trait MotionModel {
    /// State type
    type State;
    /// Control type
    type Control;

    /// Propagate state forward in time
    fn propagate(&self, state: &Self::State, control: &Self::Control, dt: f64) -> Self::State;
}
