//! Hybrid-embedding recommendation engine.
//!
//! Two text-derived embeddings per item — the free-text overview and a
//! structured genres/cast/director line — are fused into one unit vector and
//! searched by exact inner product over the precomputed catalog index.
//!
//! # Architecture
//!
//! - `compose`: canonical text formatting shared by both pipelines
//! - `embedder`: local and remote embedding backends behind one trait
//! - `combine`: weighted fusion and normalization
//! - `index`: ordinal-addressed exact inner-product search
//! - `snapshot`: the persisted index + item-table artifact pair
//! - `pipeline`: the offline precomputation job
//! - `service`: the online query path and snapshot lifecycle

pub mod combine;
pub mod compose;
pub mod embedder;
pub mod index;
pub mod pipeline;
pub mod service;
pub mod snapshot;

pub use embedder::{EmbeddingError, TextEmbedder};
pub use index::{Hit, QueryError, SimilarityIndex};
pub use pipeline::{PipelineError, PrecomputeOptions};
pub use service::{RecommendError, Recommendation, Recommender};
pub use snapshot::{Snapshot, SnapshotError, SnapshotStorage};

/// Default number of results per query.
pub const DEFAULT_TOP_K: usize = 50;

/// Default embedding batch size for the offline job.
pub const DEFAULT_BATCH_SIZE: usize = 100;
