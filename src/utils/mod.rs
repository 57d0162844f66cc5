//! Utility modules for sinusoid_steering

pub mod visualization;

pub use visualization::{colors, trajectory_plot, PathStyle, PointStyle, Visualizer};
