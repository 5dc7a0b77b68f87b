//! Offline catalog precomputation.
//!
//! One-shot batch job: compose both text lists, embed them batch-wise,
//! combine per item, build the similarity index in catalog order, persist
//! the snapshot pair. Any unrecoverable item failure aborts the whole run;
//! a partial snapshot is never written, since a vector set shorter than the
//! item table breaks the ordinal invariant for every query thereafter.

use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;

use crate::catalog::Movie;
use crate::recommend::combine::{self, CombineError};
use crate::recommend::compose;
use crate::recommend::embedder::{embed_in_batches, EmbeddingError, TextEmbedder};
use crate::recommend::index::{IndexError, SimilarityIndex};
use crate::recommend::snapshot::{Snapshot, SnapshotError, SnapshotStorage};
use crate::recommend::DEFAULT_BATCH_SIZE;

static BAR_STYLE: Lazy<ProgressStyle> = Lazy::new(|| {
    ProgressStyle::with_template("{msg:>10} [{bar:40}] {pos}/{len} batches")
        .unwrap()
        .progress_chars("=> ")
});

/// Tunables for one precomputation run.
#[derive(Debug, Clone)]
pub struct PrecomputeOptions {
    pub alpha: f32,
    pub beta: f32,
    pub batch_size: usize,
    pub show_progress: bool,
}

impl Default for PrecomputeOptions {
    fn default() -> Self {
        Self {
            alpha: combine::DEFAULT_ALPHA,
            beta: combine::DEFAULT_BETA,
            batch_size: DEFAULT_BATCH_SIZE,
            show_progress: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("catalog is empty, nothing to index")]
    EmptyCatalog,

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("failed to combine embeddings for item {position}: {source}")]
    Combine {
        position: usize,
        source: CombineError,
    },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Build a snapshot in memory from the full catalog.
///
/// Item order is the catalog order handed in; ordinal i of the returned
/// snapshot is `items[i]`.
pub fn build(
    items: Vec<Movie>,
    embedder: &dyn TextEmbedder,
    options: &PrecomputeOptions,
) -> Result<Snapshot, PipelineError> {
    if items.is_empty() {
        return Err(PipelineError::EmptyCatalog);
    }

    let mut semantic_texts = Vec::with_capacity(items.len());
    let mut feature_texts = Vec::with_capacity(items.len());
    for item in &items {
        let composed = compose::compose(&item.features());
        semantic_texts.push(composed.semantic);
        feature_texts.push(composed.feature);
    }

    let batch_count = items.len().div_ceil(options.batch_size.max(1)) as u64;
    log::info!(
        "embedding {} items with '{}' in {} batches of {}",
        items.len(),
        embedder.model_name(),
        batch_count,
        options.batch_size
    );

    let overview_vecs = {
        let bar = progress_bar(options, batch_count, "overviews");
        let result = embed_in_batches(embedder, &semantic_texts, options.batch_size, bar.as_ref());
        finish(bar);
        result?
    };

    let feature_vecs = {
        let bar = progress_bar(options, batch_count, "features");
        let result = embed_in_batches(embedder, &feature_texts, options.batch_size, bar.as_ref());
        finish(bar);
        result?
    };

    let mut index = SimilarityIndex::new(embedder.dimensions());
    for (position, (overview, feature)) in overview_vecs.iter().zip(feature_vecs.iter()).enumerate()
    {
        let combined = combine::combine(overview, feature, options.alpha, options.beta)
            .map_err(|source| PipelineError::Combine { position, source })?;
        index.push(combined)?;
    }

    Ok(Snapshot::new(items, index)?)
}

/// Build and persist: the full offline job.
pub fn run(
    items: Vec<Movie>,
    embedder: &dyn TextEmbedder,
    storage: &SnapshotStorage,
    options: &PrecomputeOptions,
) -> Result<Snapshot, PipelineError> {
    let snapshot = build(items, embedder, options)?;
    storage.save(&snapshot, &embedder.model_id())?;
    Ok(snapshot)
}

fn progress_bar(
    options: &PrecomputeOptions,
    batch_count: u64,
    message: &'static str,
) -> Option<ProgressBar> {
    if !options.show_progress {
        return None;
    }
    let bar = ProgressBar::new(batch_count).with_style(BAR_STYLE.clone());
    bar.set_message(message);
    Some(bar)
}

fn finish(bar: Option<ProgressBar>) {
    if let Some(bar) = bar {
        bar.finish();
    }
}
