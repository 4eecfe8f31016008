//! nlsgen - Training data generation for surrogates of non-linear equation systems.
//!
//! ## Architecture
//!
//! nlsgen evaluates one slow equation of an exported simulation component
//! many times in isolation and records input → output pairs:
//! - **Sampling**: uniform random draws, or a random walk that keeps the
//!   solver on one solution branch
//! - **Worker Pool**: batches run in parallel, each with its own component
//!   instance, writing its own shard
//! - **Merge**: committed shards are appended to the dataset in batch order
//!   under a crash-tolerant merge log
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Compile-time enforced invariants (types, enums)
//! - B_i (Beliefs): Runtime fallible operations (Result, Option)
//! - I^R (Resolvable): User-configurable parameters
//! - I^B (Bounded): Solver non-convergence and I/O failures (retry, per-batch failure)

pub mod component;
pub mod models;
pub mod pipeline;
pub mod pool;
pub mod sampling;
pub mod shard;

// Re-exports for convenience
pub use component::{ComponentFactory, ComponentRegistry, EquationComponent, EvalStatus};
pub use models::{
    Config, DataGenOptions, EquationSpec, GenerationReport, Method, NlsgenError, Result,
    VariableBound,
};
pub use pipeline::GenerationPipeline;
pub use pool::WorkerPool;
pub use shard::{Dataset, MergeLog};
