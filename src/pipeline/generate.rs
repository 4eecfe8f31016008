//! Training data generation pipeline.
//!
//! Pipeline flow:
//! Recover → Open dataset → Plan → Worker Pool (one shard per batch) →
//! Merge shards in batch order → Report
//!
//! K_i: Only this coordinator writes the dataset, and only after every
//! worker has finished.

use crate::component::{ComponentFactory, ComponentRegistry};
use crate::models::{
    Config, DataGenOptions, EquationSpec, GenerationPlan, GenerationReport, Method, OutputConfig,
    Result, WalkState, available_parallelism,
};
use crate::pool::{BatchOutcome, BatchWorker, WorkerPool};
use crate::shard::{Dataset, MergeLog};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Generation pipeline for one component binding.
pub struct GenerationPipeline {
    options: DataGenOptions,
    output: OutputConfig,
    factory: Arc<dyn ComponentFactory>,
    run_id: Option<String>,
}

impl GenerationPipeline {
    /// Create a pipeline; options are validated up front.
    pub fn new(
        options: DataGenOptions,
        output: OutputConfig,
        factory: Arc<dyn ComponentFactory>,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            output,
            factory,
            run_id: None,
        })
    }

    /// Create a pipeline from configuration, resolving the component binding.
    pub fn from_config(config: &Config, registry: &ComponentRegistry) -> Result<Self> {
        let factory = registry.resolve(&config.component.model)?;
        Self::new(config.generation.clone(), config.output.clone(), factory)
    }

    /// Use a fixed run id instead of a random one. Shard names derive from it.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Generate datasets for several equations, one after the other.
    ///
    /// Every equation is validated before the first one runs. Stops at the
    /// first error.
    pub async fn run_all(&self, equations: &[EquationSpec]) -> Result<Vec<GenerationReport>> {
        for equation in equations {
            equation.validate()?;
        }

        let mut reports = Vec::with_capacity(equations.len());
        for equation in equations {
            reports.push(self.run(equation).await?);
        }
        Ok(reports)
    }

    /// Generate `n` new rows for `equation`.
    pub async fn run(&self, equation: &EquationSpec) -> Result<GenerationReport> {
        let start = Instant::now();
        equation.validate()?;

        let dataset_path = self.output.dataset_path(equation);
        let work_dir = self.output.work_dir_for(equation);

        let recovery = MergeLog::recover(&work_dir, &dataset_path)?;
        if let Some(previous) = &recovery.previous_run {
            debug!(
                previous_run = %previous,
                unmerged = recovery.unmerged.len(),
                "Recovered previous run"
            );
        }

        let mut dataset = Dataset::open(&dataset_path, &equation.columns(), self.options.append)?;
        let prior_rows = dataset.row_count();

        let resume = match self.options.method {
            Method::RandomWalk { .. } if self.options.append => dataset
                .last_row()
                .and_then(|row| WalkState::from_row(row, equation.inputs.len())),
            _ => None,
        };

        let seed = self.options.seed.unwrap_or_else(|| rand::rng().random());
        let run_seed = seed.wrapping_add(prior_rows as u64);

        let plan = GenerationPlan::new(self.options.n, self.options.n_batches)?;
        let available = available_parallelism();
        if self.options.n_threads > available {
            warn!(
                requested = self.options.n_threads,
                available, "More threads requested than available, clamping"
            );
        }
        let threads = self.options.effective_threads();

        let run_id = self
            .run_id
            .clone()
            .unwrap_or_else(|| format!("run_{}", Uuid::new_v4().simple()));

        info!(
            equation_id = equation.id,
            method = self.options.method.name(),
            n = self.options.n,
            batches = plan.batch_count,
            threads,
            seed,
            prior_rows,
            dataset = %dataset_path.display(),
            "Starting generation"
        );

        let mut log = MergeLog::begin(&work_dir, &run_id, equation.id, &dataset_path, &plan)?;

        let pb = self.progress_bar(self.options.n as u64);
        let worker = BatchWorker {
            factory: Arc::clone(&self.factory),
            equation: Arc::new(equation.clone()),
            bounds: Arc::from(equation.inputs.clone()),
            method: self.options.method,
            seed: run_seed,
            max_retries: self.options.max_retries,
            resume,
            shard_dir: work_dir.clone(),
            run_id: run_id.clone(),
            progress: pb.clone(),
        };

        let run = WorkerPool::new(threads).run(worker, &plan).await;
        pb.finish_and_clear();

        for outcome in &run.outcomes {
            match outcome {
                BatchOutcome::Committed { shard, summary } => {
                    log.mark_committed(shard, summary.clone())?
                }
                BatchOutcome::Failed { index, reason } => log.mark_failed(*index, reason.clone())?,
                BatchOutcome::Skipped { index } => {
                    log.mark_failed(*index, "skipped after run was aborted")?
                }
            }
        }

        if let Some(e) = run.fatal {
            error!(
                equation_id = equation.id,
                work_dir = %work_dir.display(),
                "Generation aborted, nothing merged"
            );
            return Err(e);
        }

        let mut report = GenerationReport {
            equation_id: equation.id,
            dataset: dataset_path.clone(),
            requested: self.options.n,
            prior_rows,
            ..Default::default()
        };

        for entry in log.committed() {
            let (Some(path), Some(summary)) = (entry.path, entry.summary) else {
                log.mark_failed(entry.batch, "committed entry without shard")?;
                continue;
            };

            let offset = dataset.byte_len()?;
            log.mark_merging(entry.batch, offset)?;
            match dataset.append_shard(&path) {
                Ok(rows) => {
                    log.mark_merged(entry.batch)?;
                    report.absorb(&summary);
                    debug!(batch = entry.batch, rows, "Shard merged");
                }
                Err(e) => {
                    warn!(batch = entry.batch, error = %e, "Merge failed, rolling back shard");
                    Dataset::truncate(dataset.path(), offset)?;
                    log.mark_failed(entry.batch, e.to_string())?;
                }
            }
        }

        report.failed_batches = log.failed_batches();
        report.runtime_secs = start.elapsed().as_secs_f64();
        report.finalize();

        if report.failed_batches.is_empty() {
            if self.options.clean {
                log.cleanup()?;
            }
        } else {
            warn!(
                batches = ?report.failed_batches,
                work_dir = %work_dir.display(),
                "Some batches were not merged, keeping shards"
            );
        }

        info!(
            equation_id = equation.id,
            accepted = report.accepted,
            failed = report.failed,
            total_rows = report.total_rows,
            acceptance_rate = format!("{:.1}%", report.acceptance_rate * 100.0),
            throughput = format!("{:.0}/hr", report.throughput_per_hour),
            "Generation complete"
        );

        Ok(report)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.output.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    }
}
