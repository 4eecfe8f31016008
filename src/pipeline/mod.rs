//! Pipeline module - the generation coordinator.

mod generate;

pub use generate::*;
