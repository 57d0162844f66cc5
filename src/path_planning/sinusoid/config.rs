//! Configuration for the sinusoid planner

use std::time::Duration;

use crate::common::{ConfigurationSpace, RoboticsError, RoboticsResult};

use super::root_finder::LevenbergMarquardtConfig;

/// Bicycle configuration space: state and input limits plus wheelbase
///
/// States are `[x, y, theta, phi]`, inputs `[u1, u2]`.
#[derive(Debug, Clone)]
pub struct BicycleConfigurationSpace {
    pub low_lims: [f64; 4],
    pub high_lims: [f64; 4],
    pub input_low_lims: [f64; 2],
    pub input_high_lims: [f64; 2],
    /// Wheelbase length [m]
    pub robot_length: f64,
}

impl BicycleConfigurationSpace {
    pub fn new(
        low_lims: [f64; 4],
        high_lims: [f64; 4],
        input_low_lims: [f64; 2],
        input_high_lims: [f64; 2],
        robot_length: f64,
    ) -> Self {
        Self {
            low_lims,
            high_lims,
            input_low_lims,
            input_high_lims,
            robot_length,
        }
    }

    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Check that every limit the planner reads is usable
    pub fn validate(&self) -> RoboticsResult<()> {
        if !(self.robot_length.is_finite() && self.robot_length > 0.0) {
            return Err(RoboticsError::InvalidParameter(format!(
                "robot length must be positive, got {}",
                self.robot_length
            )));
        }
        let max_phi = self.high_lims[3];
        if !(max_phi.is_finite() && max_phi > 0.0) {
            return Err(RoboticsError::InvalidParameter(format!(
                "steering angle bound must be positive, got {}",
                max_phi
            )));
        }
        if max_phi >= std::f64::consts::FRAC_PI_2 {
            return Err(RoboticsError::InvalidParameter(format!(
                "steering angle bound {} must stay below pi/2",
                max_phi
            )));
        }
        for (i, &limit) in self.input_high_lims.iter().enumerate() {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(RoboticsError::InvalidParameter(format!(
                    "input bound {} must be positive, got {}",
                    i, limit
                )));
            }
        }
        Ok(())
    }
}

impl Default for BicycleConfigurationSpace {
    fn default() -> Self {
        let phi_max = 0.6;
        let u1_max = 2.0;
        let u2_max = 3.0;
        Self {
            low_lims: [0.0, 0.0, -1000.0, -phi_max],
            high_lims: [5.0, 5.0, 1000.0, phi_max],
            input_low_lims: [-u1_max, -u2_max],
            input_high_lims: [u1_max, u2_max],
            robot_length: 0.15,
        }
    }
}

impl ConfigurationSpace for BicycleConfigurationSpace {
    fn robot_length(&self) -> f64 {
        self.robot_length
    }

    fn max_steering_angle(&self) -> f64 {
        self.high_lims[3]
    }

    fn input_limits(&self) -> [f64; 2] {
        self.input_high_lims
    }
}

/// What to do with start/goal headings where `sin(theta)` vanishes
///
/// The virtual-to-actuator map divides by `sin(theta)`, so headings 0 and pi
/// are singular.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingularityPolicy {
    /// No check; singular headings are planned as-is. Default.
    Allow,
    /// Reject start/goal pairs with a near-singular heading, or whose
    /// headings sit on opposite sides of the singular line.
    Reject,
    /// Plan in a world frame rotated so both headings sit symmetrically
    /// around pi/2, then rotate the result back. Actuator commands are
    /// invariant under the rotation.
    Rotate,
}

impl Default for SingularityPolicy {
    fn default() -> Self {
        SingularityPolicy::Allow
    }
}

/// Bounds on the shooting stage's retry loops
///
/// `None` everywhere means retry until success or cancellation.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    /// Root-finder attempts per amplitude round
    pub max_root_attempts: Option<usize>,
    /// Amplitude-shrink rounds
    pub max_shrink_rounds: Option<usize>,
    /// Wall-clock budget for the whole shooting stage
    pub timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(max_root_attempts: usize, max_shrink_rounds: usize) -> Self {
        Self {
            max_root_attempts: Some(max_root_attempts),
            max_shrink_rounds: Some(max_shrink_rounds),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Planner tuning
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Handling of the `sin(theta) = 0` conversion singularity
    pub singularity_policy: SingularityPolicy,
    /// `|sin(theta)|` below which a heading counts as singular
    pub singularity_tolerance: f64,
    /// Factor applied to both amplitude bounds after a bound violation
    pub amplitude_decay: f64,
    /// Coordinate error below which a sinusoid stage is skipped
    pub steer_tolerance: f64,
    /// Absolute tolerance of the commutator quadrature
    pub quadrature_tolerance: f64,
    /// Terminal pose error above which a finished plan is reported with a warning
    pub goal_tolerance: f64,
    /// Root finder settings for the shooting stage
    pub solver: LevenbergMarquardtConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            singularity_policy: SingularityPolicy::Allow,
            singularity_tolerance: 1e-3,
            amplitude_decay: 0.99,
            steer_tolerance: 1e-9,
            quadrature_tolerance: 1e-10,
            goal_tolerance: 0.05,
            solver: LevenbergMarquardtConfig::default(),
        }
    }
}

impl PlannerConfig {
    pub fn with_singularity_policy(mut self, policy: SingularityPolicy) -> Self {
        self.singularity_policy = policy;
        self
    }

    pub fn validate(&self) -> RoboticsResult<()> {
        if !(self.amplitude_decay > 0.0 && self.amplitude_decay < 1.0) {
            return Err(RoboticsError::InvalidParameter(format!(
                "amplitude decay must lie in (0, 1), got {}",
                self.amplitude_decay
            )));
        }
        if !(self.singularity_tolerance >= 0.0
            && self.steer_tolerance >= 0.0
            && self.goal_tolerance >= 0.0)
        {
            return Err(RoboticsError::InvalidParameter(
                "tolerances must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
