//! Equation evaluation interface of exported simulation components.
//!
//! Epistemic foundation:
//! - K_i: A component exposes named real variables and can solve one
//!   equation in isolation from its current variable state
//! - B_i: The solve converges (might not) → `EvalStatus`
//! - I^B: Instantiation of the external component may fail → Result
//!
//! Components are not thread-safe. A worker owns its instance exclusively
//! through [`ScopedComponent`] for the lifetime of one batch.

mod registry;
mod simple_loop;

pub use registry::*;
pub use simple_loop::*;

use crate::models::{ComponentError, EquationSpec};
use std::ops::{Deref, DerefMut};
use tracing::debug;

/// Status returned by a single equation evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalStatus {
    /// Solved; outputs may be read
    Ok,
    /// Solver ran out of iterations
    NonConvergent,
    /// Numerical or internal error inside the component
    Error,
}

/// A compiled model component with an equation evaluation entry point.
///
/// Inputs are written by name before [`evaluate`](Self::evaluate), outputs
/// read by name after an `Ok`. Writing an output variable before evaluating
/// sets the solver's initial guess.
pub trait EquationComponent: Send {
    fn set_real(&mut self, name: &str, value: f64) -> Result<(), ComponentError>;

    fn get_real(&self, name: &str) -> Result<f64, ComponentError>;

    fn evaluate(&mut self, equation_id: u64) -> EvalStatus;

    /// Release the instance. Called exactly once, at batch end.
    fn terminate(&mut self) {}
}

/// Creates fresh component instances, one per batch.
pub trait ComponentFactory: Send + Sync {
    fn instantiate(
        &self,
        equation: &EquationSpec,
    ) -> Result<Box<dyn EquationComponent>, ComponentError>;
}

/// Exclusively owned component, terminated when dropped.
pub struct ScopedComponent {
    inner: Box<dyn EquationComponent>,
}

impl ScopedComponent {
    /// Acquire a new instance from `factory`.
    pub fn acquire(
        factory: &dyn ComponentFactory,
        equation: &EquationSpec,
    ) -> Result<Self, ComponentError> {
        let inner = factory.instantiate(equation)?;
        debug!(equation_id = equation.id, "Component instantiated");
        Ok(Self { inner })
    }
}

impl Deref for ScopedComponent {
    type Target = dyn EquationComponent;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for ScopedComponent {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for ScopedComponent {
    fn drop(&mut self) {
        self.inner.terminate();
        debug!("Component terminated");
    }
}
