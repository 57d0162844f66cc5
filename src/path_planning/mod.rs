// Path Planning algorithms module

pub mod sinusoid;

pub use sinusoid::*;
