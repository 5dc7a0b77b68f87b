//! The online query pipeline behind an explicit, immutable context object.
//!
//! A `Recommender` owns the embedding backend and the loaded snapshot.
//! Lifecycle: build (offline) -> load -> read-only serve -> full-rebuild
//! refresh. Concurrent requests clone the snapshot `Arc` under a read lock
//! and search without further synchronization; `reload` swaps the `Arc`
//! atomically, so readers see either the old snapshot or the new one, never
//! a mix.

use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::catalog::MovieFeatures;
use crate::recommend::combine::{self, CombineError};
use crate::recommend::compose;
use crate::recommend::embedder::{embed_in_batches, EmbeddingError, TextEmbedder};
use crate::recommend::index::QueryError;
use crate::recommend::snapshot::{Snapshot, SnapshotError, SnapshotStorage};

/// One ranked result, most similar first in the returned list.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub id: u64,
    pub title: String,
    pub score: f32,
    pub poster_path: Option<String>,
    pub overview: Option<String>,
    pub genres: Vec<String>,
    pub director: Option<String>,
    pub release_date: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Combine(#[from] CombineError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Serves similarity queries against a loaded snapshot.
pub struct Recommender {
    embedder: Arc<dyn TextEmbedder>,
    snapshot: RwLock<Arc<Snapshot>>,
    alpha: f32,
    beta: f32,
    default_top_k: usize,
}

impl Recommender {
    /// Wrap an already-built snapshot (tests, or build-then-serve flows).
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        snapshot: Snapshot,
        alpha: f32,
        beta: f32,
        default_top_k: usize,
    ) -> Self {
        Self {
            embedder,
            snapshot: RwLock::new(Arc::new(snapshot)),
            alpha,
            beta,
            default_top_k: default_top_k.max(1),
        }
    }

    /// Load the persisted snapshot and refuse to serve if it does not match
    /// the configured embedder or fails its pair validation.
    pub fn load(
        embedder: Arc<dyn TextEmbedder>,
        storage: &SnapshotStorage,
        alpha: f32,
        beta: f32,
        default_top_k: usize,
    ) -> Result<Self, RecommendError> {
        let snapshot = storage.load(&embedder.model_id(), embedder.dimensions())?;
        Ok(Self::new(embedder, snapshot, alpha, beta, default_top_k))
    }

    /// Atomically swap in a freshly built snapshot. In-flight queries keep
    /// the snapshot they already hold.
    pub fn reload(&self, storage: &SnapshotStorage) -> Result<(), RecommendError> {
        let fresh = storage.load(&self.embedder.model_id(), self.embedder.dimensions())?;
        let mut guard = self
            .snapshot
            .write()
            .map_err(|e| RecommendError::Internal(format!("snapshot lock poisoned: {}", e)))?;
        *guard = Arc::new(fresh);
        log::info!("snapshot swapped: {} items", guard.len());
        Ok(())
    }

    pub fn catalog_len(&self) -> usize {
        self.current().map(|s| s.len()).unwrap_or(0)
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Rank catalog items by similarity to the query record.
    ///
    /// Composes the query's two texts, embeds exactly those two strings,
    /// fuses them with the same weights the catalog was built with, and
    /// maps the index hits back to catalog records.
    pub fn recommend(
        &self,
        query: &MovieFeatures,
        top_k: Option<usize>,
    ) -> Result<Vec<Recommendation>, RecommendError> {
        let snapshot = self.current()?;

        let composed = compose::compose(query);
        let texts = vec![composed.semantic, composed.feature];
        let vectors = embed_in_batches(self.embedder.as_ref(), &texts, texts.len(), None)?;
        let combined = combine::combine(&vectors[0], &vectors[1], self.alpha, self.beta)?;

        let top_k = top_k.unwrap_or(self.default_top_k);
        let hits = snapshot.index().search(&combined, top_k)?;

        hits.into_iter()
            .map(|hit| {
                let item = snapshot.item(hit.ordinal).ok_or_else(|| {
                    RecommendError::Internal(format!(
                        "index returned ordinal {} outside item table",
                        hit.ordinal
                    ))
                })?;
                Ok(Recommendation {
                    id: item.id,
                    title: item.title.clone(),
                    score: hit.score,
                    poster_path: item.poster_path.clone(),
                    overview: item.overview.clone(),
                    genres: item.genres.clone(),
                    director: item.director.clone(),
                    release_date: item.release_date.clone(),
                })
            })
            .collect()
    }

    fn current(&self) -> Result<Arc<Snapshot>, RecommendError> {
        let guard = self
            .snapshot
            .read()
            .map_err(|e| RecommendError::Internal(format!("snapshot lock poisoned: {}", e)))?;
        Ok(Arc::clone(&guard))
    }
}
