//! Common types, traits, and error definitions for sinusoid_steering
//!
//! Poses, commands, and the interfaces shared by the planner, its motion
//! model and the plotting utilities.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
