//! Aggregation pipeline: concurrent fan-out, normalisation, fuzzy dedup.
//!
//! [`dispatch`] fans a fetch out to the selected sources under a bounded
//! worker pool, [`normalize`] turns raw listings into canonical ones and
//! [`dedup`] merges near-duplicates into canonical products using the
//! title similarity in [`similarity`].

pub mod dedup;
pub mod dispatch;
pub mod normalize;
pub mod pool;
pub mod similarity;

pub use dedup::{cluster, deduplicate, MergeGroup};
pub use dispatch::{Dispatch, Orchestrator, SourceBatch};
pub use normalize::{NormalizeError, Normalizer};
pub use pool::WorkerPool;
