//! Reference component: equation 14 of the `simpleLoop` model.
//!
//! ```text
//! r² = x² + y²      (circle)
//! r·s = x + y       (line, torn: x = r·s − y)
//! ```
//!
//! Iteration variable `y`, inputs `s` and `r`. For every `s` in `[0, 0.95]`
//! the line cuts the circle twice, so the system has two roots
//! `y = (r·s ± r·√(2 − s²)) / 2`. Newton's method lands on whichever root the
//! current value of `y` is closer to in its basin, which is what makes this
//! model the fixture for branch-consistent sampling.

use super::{ComponentFactory, EquationComponent, EvalStatus};
use crate::models::{ComponentError, EquationSpec, VariableBound};

/// Equation id of the non-linear loop.
pub const SIMPLE_LOOP_EQUATION: u64 = 14;

/// In-process solver for the simple loop.
#[derive(Debug, Clone)]
pub struct SimpleLoop {
    s: f64,
    r: f64,
    x: f64,
    y: f64,
    max_iterations: u32,
    tolerance: f64,
}

impl Default for SimpleLoop {
    fn default() -> Self {
        Self {
            s: 0.0,
            r: 1.5,
            x: 0.0,
            y: 1.0,
            max_iterations: 50,
            tolerance: 1e-12,
        }
    }
}

impl SimpleLoop {
    /// Profiling result for the loop with its documented bounds.
    pub fn equation_spec() -> EquationSpec {
        EquationSpec::new(
            SIMPLE_LOOP_EQUATION,
            vec![
                VariableBound::new("s", 0.0, 0.95),
                VariableBound::new("r", 1.5, 3.15),
            ],
            vec!["y".to_string()],
        )
    }

    /// Residual `x² + y² − r²` with `x` eliminated, and its derivative.
    fn residual(&self, y: f64) -> (f64, f64) {
        let rs = self.r * self.s;
        let x = rs - y;
        (x * x + y * y - self.r * self.r, 4.0 * y - 2.0 * rs)
    }

    fn solve(&mut self) -> EvalStatus {
        let mut y = self.y;
        let scale = 1.0 + self.r * self.r;

        for _ in 0..self.max_iterations {
            let (f, df) = self.residual(y);
            if !f.is_finite() || !df.is_finite() {
                return EvalStatus::Error;
            }
            if f.abs() <= self.tolerance * scale {
                self.y = y;
                self.x = self.r * self.s - y;
                return EvalStatus::Ok;
            }
            if df == 0.0 {
                return EvalStatus::NonConvergent;
            }
            y -= f / df;
        }

        EvalStatus::NonConvergent
    }
}

impl EquationComponent for SimpleLoop {
    fn set_real(&mut self, name: &str, value: f64) -> Result<(), ComponentError> {
        match name {
            "s" => self.s = value,
            "r" => self.r = value,
            "x" => self.x = value,
            "y" => self.y = value,
            _ => return Err(ComponentError::UnknownVariable(name.to_string())),
        }
        Ok(())
    }

    fn get_real(&self, name: &str) -> Result<f64, ComponentError> {
        match name {
            "s" => Ok(self.s),
            "r" => Ok(self.r),
            "x" => Ok(self.x),
            "y" => Ok(self.y),
            _ => Err(ComponentError::UnknownVariable(name.to_string())),
        }
    }

    fn evaluate(&mut self, equation_id: u64) -> EvalStatus {
        if equation_id != SIMPLE_LOOP_EQUATION {
            return EvalStatus::Error;
        }
        self.solve()
    }
}

/// Factory handing out fresh `SimpleLoop` instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleLoopFactory;

impl ComponentFactory for SimpleLoopFactory {
    fn instantiate(
        &self,
        _equation: &EquationSpec,
    ) -> Result<Box<dyn EquationComponent>, ComponentError> {
        Ok(Box::new(SimpleLoop::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots(s: f64, r: f64) -> (f64, f64) {
        let d = r * (2.0 - s * s).sqrt();
        ((r * s - d) / 2.0, (r * s + d) / 2.0)
    }

    fn solve_from(s: f64, r: f64, guess: f64) -> f64 {
        let mut c = SimpleLoop::default();
        c.set_real("s", s).unwrap();
        c.set_real("r", r).unwrap();
        c.set_real("y", guess).unwrap();
        assert_eq!(c.evaluate(SIMPLE_LOOP_EQUATION), EvalStatus::Ok);
        c.get_real("y").unwrap()
    }

    #[test]
    fn test_initial_guess_selects_branch() {
        let (s, r) = (0.5, 2.0);
        let (low, high) = roots(s, r);

        assert!((solve_from(s, r, high + 0.1) - high).abs() < 1e-9);
        assert!((solve_from(s, r, low - 0.1) - low).abs() < 1e-9);
    }

    #[test]
    fn test_solution_satisfies_both_equations() {
        let mut c = SimpleLoop::default();
        c.set_real("s", 0.95).unwrap();
        c.set_real("r", 3.15).unwrap();
        assert_eq!(c.evaluate(SIMPLE_LOOP_EQUATION), EvalStatus::Ok);

        let x = c.get_real("x").unwrap();
        let y = c.get_real("y").unwrap();
        assert!((x + y - 3.15 * 0.95).abs() < 1e-9);
        assert!((x * x + y * y - 3.15 * 3.15).abs() < 1e-9);
    }

    #[test]
    fn test_guess_on_vertex_does_not_converge() {
        let (s, r) = (0.5, 2.0);
        let mut c = SimpleLoop::default();
        c.set_real("s", s).unwrap();
        c.set_real("r", r).unwrap();
        c.set_real("y", r * s / 2.0).unwrap();
        assert_eq!(c.evaluate(SIMPLE_LOOP_EQUATION), EvalStatus::NonConvergent);
    }

    #[test]
    fn test_unknown_equation_and_variable() {
        let mut c = SimpleLoop::default();
        assert_eq!(c.evaluate(7), EvalStatus::Error);
        assert!(matches!(
            c.set_real("z", 1.0),
            Err(ComponentError::UnknownVariable(_))
        ));
    }
}
