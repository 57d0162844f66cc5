//! Common types used throughout sinusoid_steering

use nalgebra::Vector4;

/// 2D point representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Bicycle-model configuration: position, heading and steering angle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BicycleState {
    pub x: f64,
    pub y: f64,
    /// Heading [rad], measured from the +x axis
    pub theta: f64,
    /// Front wheel steering angle [rad]
    pub phi: f64,
}

impl BicycleState {
    pub fn new(x: f64, y: f64, theta: f64, phi: f64) -> Self {
        Self { x, y, theta, phi }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0, theta: 0.0, phi: 0.0 }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    pub fn to_vector(&self) -> Vector4<f64> {
        Vector4::new(self.x, self.y, self.theta, self.phi)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.theta.is_finite() && self.phi.is_finite()
    }

    /// Largest absolute component difference to another state
    pub fn max_abs_diff(&self, other: &BicycleState) -> f64 {
        (self.to_vector() - other.to_vector()).amax()
    }
}

impl From<Vector4<f64>> for BicycleState {
    fn from(v: Vector4<f64>) -> Self {
        Self { x: v[0], y: v[1], theta: v[2], phi: v[3] }
    }
}

/// Actuator command for a bicycle-model robot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlInput {
    pub v: f64,             // linear velocity
    pub steering_rate: f64, // steering angle rate
}

impl ControlInput {
    pub fn new(v: f64, steering_rate: f64) -> Self {
        Self { v, steering_rate }
    }

    pub fn zero() -> Self {
        Self { v: 0.0, steering_rate: 0.0 }
    }

    pub fn is_finite(&self) -> bool {
        self.v.is_finite() && self.steering_rate.is_finite()
    }
}

/// Path represented as a sequence of 2D points
#[derive(Debug, Clone)]
pub struct Path2D {
    pub points: Vec<Point2D>,
}

impl Path2D {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn from_points(points: Vec<Point2D>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn x_coords(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    pub fn y_coords(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }

    pub fn total_length(&self) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        self.points.windows(2)
            .map(|w| w[0].distance(&w[1]))
            .sum()
    }
}

impl Default for Path2D {
    fn default() -> Self {
        Self::new()
    }
}
