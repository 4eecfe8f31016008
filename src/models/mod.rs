//! Core data models for nlsgen.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): Concrete types with compile-time guarantees
//! - B_i (Beliefs): Wrapped in Result/Option
//! - I^R (Resolvable): Config parameters
//! - I^B (Bounded): Error variants with fallback strategies

mod config;
mod equation;
mod error;
mod sample;

pub use config::*;
pub use equation::*;
pub use error::*;
pub use sample::*;
