//! Branch-aware random walk sampling.
//!
//! Uniform sampling of a non-uniquely solvable system mixes roots: the same
//! input gets different outputs depending on where the solver starts. The
//! walk takes small steps from the last accepted sample and hands the last
//! accepted outputs to the solver as initial guess, so consecutive solves
//! stay in one basin.

use super::draw_uniform;
use crate::models::{
    ConfigError, SampleRequest, SampleResult, StepDistribution, VariableBound, WalkState,
};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::sync::Arc;

/// Step sampler for a configured distribution.
#[derive(Debug, Clone, Copy)]
enum Step {
    Uniform,
    Gaussian(Normal<f64>),
}

/// Random walk through the input space.
///
/// K_i: Every step is within `[-delta, delta]` per input before clamping,
/// and every candidate is within bounds after clamping.
#[derive(Debug, Clone)]
pub struct RandomWalkMethod {
    bounds: Arc<[VariableBound]>,
    rng: ChaCha8Rng,
    delta: f64,
    step: Step,
    state: Option<WalkState>,
}

impl RandomWalkMethod {
    /// Create a walk; `resume` continues from a previous run's last row.
    pub fn new(
        bounds: Arc<[VariableBound]>,
        rng: ChaCha8Rng,
        delta: f64,
        distribution: StepDistribution,
        resume: Option<WalkState>,
    ) -> Result<Self, ConfigError> {
        if !(delta.is_finite() && delta > 0.0) {
            return Err(ConfigError::InvalidDelta(delta));
        }

        let step = match distribution {
            StepDistribution::Uniform => Step::Uniform,
            StepDistribution::Gaussian => Step::Gaussian(
                Normal::new(0.0, delta / 3.0).map_err(|_| ConfigError::InvalidDelta(delta))?,
            ),
        };

        // A resumed row may predate narrower bounds.
        let state = resume
            .filter(|s| s.last_accepted_inputs.len() == bounds.len())
            .map(|mut s| {
                for (value, bound) in s.last_accepted_inputs.iter_mut().zip(bounds.iter()) {
                    *value = bound.clamp(*value);
                }
                s
            });

        Ok(Self {
            bounds,
            rng,
            delta,
            step,
            state,
        })
    }

    fn draw_step(&mut self) -> f64 {
        match self.step {
            Step::Uniform => self.rng.random_range(-self.delta..=self.delta),
            Step::Gaussian(normal) => normal.sample(&mut self.rng).clamp(-self.delta, self.delta),
        }
    }

    /// Next candidate: a uniform draw until the first accepted sample, a
    /// clamped step from the last accepted inputs afterwards.
    pub fn next(&mut self) -> SampleRequest {
        let Some(last) = self.state.as_ref().map(|s| s.last_accepted_inputs.clone()) else {
            let inputs = self
                .bounds
                .iter()
                .map(|bound| draw_uniform(&mut self.rng, bound))
                .collect();
            return SampleRequest::new(inputs);
        };

        let bounds = Arc::clone(&self.bounds);
        let inputs = last
            .iter()
            .zip(bounds.iter())
            .map(|(value, bound)| bound.clamp(value + self.draw_step()))
            .collect();
        SampleRequest::new(inputs)
    }

    /// Move the walk to `result` if it was accepted.
    pub fn update(&mut self, result: &SampleResult) {
        if result.accepted {
            self.state = Some(WalkState {
                last_accepted_inputs: result.inputs.clone(),
                last_accepted_outputs: result.outputs.clone(),
            });
        }
    }

    pub fn initial_guess(&self) -> Option<&[f64]> {
        self.state.as_ref().map(|s| s.last_accepted_outputs.as_slice())
    }

    pub fn state(&self) -> Option<&WalkState> {
        self.state.as_ref()
    }
}
