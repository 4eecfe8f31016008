//! Uniform random sampling.

use super::draw_uniform;
use crate::models::{SampleRequest, VariableBound};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// Draws every input independently and uniformly from its bounds.
///
/// K_i: Stateless across samples; only the generator advances.
#[derive(Debug, Clone)]
pub struct RandomMethod {
    bounds: Arc<[VariableBound]>,
    rng: ChaCha8Rng,
}

impl RandomMethod {
    pub fn new(bounds: Arc<[VariableBound]>, rng: ChaCha8Rng) -> Self {
        Self { bounds, rng }
    }

    pub fn next(&mut self) -> SampleRequest {
        let inputs = self
            .bounds
            .iter()
            .map(|bound| draw_uniform(&mut self.rng, bound))
            .collect();
        SampleRequest::new(inputs)
    }
}
