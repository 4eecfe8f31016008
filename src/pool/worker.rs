//! Batch worker: evaluates one batch's samples into one shard.
//!
//! Epistemic foundation:
//! - K_i: A worker owns its component instance exclusively for the batch
//! - K_i: Only accepted samples reach the shard
//! - B_i: Each evaluation may not converge → retried with a fresh candidate
//! - I^B: Component setup may fail → fatal for the run

use crate::component::{ComponentFactory, EvalStatus, ScopedComponent};
use crate::models::{
    BatchSummary, ComponentError, EquationSpec, Method, NlsgenError, Result, SampleRequest,
    SampleResult, VariableBound, WalkState,
};
use crate::sampling::Sampler;
use crate::shard::{CommittedShard, ShardWriter};
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// One unit of work handed to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchJob {
    pub index: usize,
    pub count: usize,
}

/// Everything a batch needs, shared by all batches of a run.
#[derive(Clone)]
pub struct BatchWorker {
    pub factory: Arc<dyn ComponentFactory>,
    pub equation: Arc<EquationSpec>,
    pub bounds: Arc<[VariableBound]>,
    pub method: Method,
    pub seed: u64,
    pub max_retries: u32,
    pub resume: Option<WalkState>,
    pub shard_dir: PathBuf,
    pub run_id: String,
    pub progress: ProgressBar,
}

impl BatchWorker {
    /// Run one batch to a committed shard.
    ///
    /// Returns `Ok(None)` if `abort` was raised while the batch ran; its
    /// partial shard is discarded.
    pub fn run(
        &self,
        job: BatchJob,
        abort: &AtomicBool,
    ) -> Result<Option<(CommittedShard, BatchSummary)>> {
        let equation_id = self.equation.id;
        let mut component =
            ScopedComponent::acquire(self.factory.as_ref(), &self.equation).map_err(|source| {
                NlsgenError::ComponentInit {
                    equation_id,
                    batch: job.index,
                    source,
                }
            })?;

        let mut sampler = Sampler::for_batch(
            &self.method,
            Arc::clone(&self.bounds),
            self.seed,
            job.index,
            self.resume.clone(),
        )?;

        let mut shard = ShardWriter::create(
            &self.shard_dir,
            &self.run_id,
            job.index,
            &self.equation.columns(),
        )?;

        let mut summary = BatchSummary {
            index: job.index,
            requested: job.count,
            ..Default::default()
        };

        for _ in 0..job.count {
            if abort.load(Ordering::Relaxed) {
                debug!(batch = job.index, "Batch cancelled");
                shard.abort()?;
                return Ok(None);
            }

            let mut solved = false;
            for _ in 0..=self.max_retries {
                let request = sampler.next();
                let result = self.evaluate(&mut component, &sampler, request, job.index)?;
                summary.attempts += 1;
                sampler.update(&result);

                if result.accepted {
                    shard.write(&result)?;
                    summary.accepted += 1;
                    solved = true;
                    break;
                }
            }
            if !solved {
                summary.non_convergent += 1;
            }
            self.progress.inc(1);
        }

        // The component is released before the shard becomes visible.
        drop(component);
        let committed = shard.commit()?;

        debug!(
            batch = job.index,
            accepted = summary.accepted,
            non_convergent = summary.non_convergent,
            attempts = summary.attempts,
            "Batch finished"
        );
        Ok(Some((committed, summary)))
    }

    /// Evaluate a single candidate.
    ///
    /// Variable access failures are setup errors; a solver that does not
    /// converge or yields non-finite outputs only rejects the sample.
    fn evaluate(
        &self,
        component: &mut ScopedComponent,
        sampler: &Sampler,
        request: SampleRequest,
        batch: usize,
    ) -> Result<SampleResult> {
        let equation_id = self.equation.id;
        let component_err = |source: ComponentError| NlsgenError::Component {
            equation_id,
            batch,
            source,
        };

        for (bound, value) in self.bounds.iter().zip(&request.inputs) {
            component
                .set_real(&bound.name, *value)
                .map_err(component_err)?;
        }
        if let Some(guess) = sampler.initial_guess() {
            for (name, value) in self.equation.outputs.iter().zip(guess) {
                component.set_real(name, *value).map_err(component_err)?;
            }
        }

        let status = component.evaluate(equation_id);
        if status != EvalStatus::Ok {
            trace!(batch, ?status, inputs = ?request.inputs, "Sample rejected");
            return Ok(SampleResult::rejected(request.inputs));
        }

        let outputs = self
            .equation
            .outputs
            .iter()
            .map(|name| component.get_real(name).map_err(component_err))
            .collect::<Result<Vec<f64>>>()?;

        if outputs.iter().all(|v| v.is_finite()) {
            Ok(SampleResult::accepted(request.inputs, outputs))
        } else {
            trace!(batch, outputs = ?outputs, "Non-finite outputs rejected");
            Ok(SampleResult::rejected(request.inputs))
        }
    }
}
