//! Bicycle kinematic model and its chained ("v-state") coordinates
//!
//! Kinematics, heading measured from the +x axis:
//!
//! ```text
//! x'     = cos(theta) * u1
//! y'     = sin(theta) * u1
//! theta' = tan(phi) / l * u1
//! phi'   = u2
//! ```
//!
//! With `u1 = v1 / sin(theta)` and `u2 = v2` the coordinates
//! `(y, phi, cos(theta), x)` obey
//!
//! ```text
//! y'     = v1
//! phi'   = v2
//! alpha' = -tan(phi) / l * v1        (alpha = cos(theta))
//! x'     = cot(theta) * v1
//! ```
//!
//! so `y` and `phi` are steered directly and `alpha`, `x` by sinusoids.

use nalgebra::Vector4;

use crate::common::{BicycleState, ControlInput, MotionModel};

/// State expressed in chained coordinates `(y, phi, alpha = cos(theta), x)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VState {
    pub y: f64,
    pub phi: f64,
    pub alpha: f64,
    pub x: f64,
}

impl From<&BicycleState> for VState {
    fn from(state: &BicycleState) -> Self {
        Self {
            y: state.y,
            phi: state.phi,
            alpha: state.theta.cos(),
            x: state.x,
        }
    }
}

/// Bicycle kinematic motion model
#[derive(Debug, Clone)]
pub struct BicycleModel {
    length: f64,
}

impl BicycleModel {
    pub fn new(length: f64) -> Self {
        Self { length }
    }

    /// Get wheelbase
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Convert a state into chained coordinates
    pub fn to_v_state(&self, state: &BicycleState) -> VState {
        VState::from(state)
    }

    /// Map virtual velocities to actuator commands at `state`
    ///
    /// `u1 = v1 / sin(theta)` is singular at headings 0 and pi; no guard is
    /// applied here. A zero `v1` always yields a zero speed.
    pub fn virtual_to_control(&self, v1: f64, v2: f64, state: &BicycleState) -> ControlInput {
        let u1 = if v1 == 0.0 { 0.0 } else { v1 / state.theta.sin() };
        ControlInput::new(u1, v2)
    }

    /// Rate of change of `alpha = cos(theta)` per unit `v1`
    pub fn alpha_rate(&self, phi: f64) -> f64 {
        -phi.tan() / self.length
    }

    /// Time derivative of `[x, y, theta, phi]` under `control`
    pub fn derivative(&self, state: &BicycleState, control: &ControlInput) -> Vector4<f64> {
        let u1 = control.v;
        Vector4::new(
            state.theta.cos() * u1,
            state.theta.sin() * u1,
            state.phi.tan() / self.length * u1,
            control.steering_rate,
        )
    }

    /// One forward Euler step
    ///
    /// # Arguments
    /// * `state` - Current state
    /// * `control` - Command applied from `state`
    /// * `dt` - Time step [s]
    pub fn step(&self, state: &BicycleState, control: &ControlInput, dt: f64) -> BicycleState {
        let mut z = state.to_vector();
        z += self.derivative(state, control) * dt;
        BicycleState::from(z)
    }
}

impl MotionModel for BicycleModel {
    type State = BicycleState;
    type Control = ControlInput;

    fn propagate(&self, state: &BicycleState, control: &ControlInput, dt: f64) -> BicycleState {
        self.step(state, control, dt)
    }
}
