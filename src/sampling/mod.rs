//! Sampling strategies producing candidate inputs.
//!
//! - `RandomMethod`: independent uniform draws within the bounds
//! - `RandomWalkMethod`: bounded steps from the last accepted sample
//!
//! Every batch draws from its own ChaCha stream of the run seed, so batches
//! are reproducible and never share a sequence.

mod random;
mod random_walk;

pub use random::*;
pub use random_walk::*;

use crate::models::{ConfigError, Method, SampleRequest, SampleResult, VariableBound, WalkState};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// Sampling policy of one batch, selected once per run from the method.
#[derive(Debug, Clone)]
pub enum Sampler {
    Random(RandomMethod),
    RandomWalk(RandomWalkMethod),
}

impl Sampler {
    /// Build the sampler for batch `batch` of a run seeded with `seed`.
    ///
    /// `resume` seeds the walk from an existing dataset; it is ignored by
    /// the random method.
    pub fn for_batch(
        method: &Method,
        bounds: Arc<[VariableBound]>,
        seed: u64,
        batch: usize,
        resume: Option<WalkState>,
    ) -> Result<Self, ConfigError> {
        let rng = batch_rng(seed, batch);
        Ok(match *method {
            Method::Random => Self::Random(RandomMethod::new(bounds, rng)),
            Method::RandomWalk { delta, step } => Self::RandomWalk(RandomWalkMethod::new(
                bounds, rng, delta, step, resume,
            )?),
        })
    }

    /// Next candidate input vector.
    pub fn next(&mut self) -> SampleRequest {
        match self {
            Self::Random(m) => m.next(),
            Self::RandomWalk(m) => m.next(),
        }
    }

    /// Advance internal state after an evaluation.
    pub fn update(&mut self, result: &SampleResult) {
        match self {
            Self::Random(_) => {}
            Self::RandomWalk(m) => m.update(result),
        }
    }

    /// Outputs to preset in the component before evaluating, if any.
    pub fn initial_guess(&self) -> Option<&[f64]> {
        match self {
            Self::Random(_) => None,
            Self::RandomWalk(m) => m.initial_guess(),
        }
    }
}

/// Generator for one batch: the run seed, stream = batch index.
pub fn batch_rng(seed: u64, batch: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(batch as u64);
    rng
}

/// Uniform draw in `[min, max]`.
pub(crate) fn draw_uniform(rng: &mut impl Rng, bound: &VariableBound) -> f64 {
    if bound.min == bound.max {
        return bound.min;
    }
    // inclusive float ranges may round one ulp past `max`
    bound.clamp(rng.random_range(bound.min..=bound.max))
}
