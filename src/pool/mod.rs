//! Pool module - batch workers and the pool that schedules them.

mod scheduler;
mod worker;

pub use scheduler::*;
pub use worker::*;
