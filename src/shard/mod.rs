//! Shard module - per-batch shards, the merge log and the final dataset.
//!
//! Workers never touch the dataset. Each batch writes its own shard; the
//! coordinator appends committed shards in batch order and records every
//! step in the merge log, so an interrupted merge can be rolled back.

mod dataset;
mod merge_log;
mod writer;

pub use dataset::*;
pub use merge_log::*;
pub use writer::*;
