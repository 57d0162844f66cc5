//! Error types for sinusoid_steering

use thiserror::Error;

/// Main error type for the planner
#[derive(Debug, Error)]
pub enum RoboticsError {
    /// Invalid parameter (step size, duration, configuration, non-finite pose)
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Start/goal pair touches a heading the sinusoidal decoupling cannot cross
    #[error("Singularity: {0}")]
    Singularity(String),

    /// Steering angle of the start or goal pose exceeds the configured bound
    #[error("Steering angle {phi} exceeds bound {max_phi}")]
    SteeringOutOfBounds { phi: f64, max_phi: f64 },

    /// Numerical computation failed (degenerate integral, etc.)
    #[error("Numerical error: {0}")]
    NumericalError(String),

    /// Planning was cancelled through the caller's cancellation token
    #[error("Planning cancelled")]
    Cancelled,

    /// A bounded retry policy ran out of attempts or time
    #[error("Retries exhausted: {0}")]
    RetriesExhausted(String),

    /// Visualization error
    #[error("Visualization error: {0}")]
    VisualizationError(String),
}

/// Result type alias for planner operations
pub type RoboticsResult<T> = Result<T, RoboticsError>;
