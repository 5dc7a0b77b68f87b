//! Embedding backends behind a single capability trait.
//!
//! Two backends produce fixed-dimension vectors for batches of text:
//! - `LocalEmbedder`: fastembed inference, synchronous and CPU-bound
//! - `OpenAiEmbedder`: an OpenAI-compatible `/embeddings` endpoint over
//!   blocking HTTP, with bounded retry on transient failures
//!
//! Backends hand through raw vectors; normalization happens once, in the
//! combiner. `embed_in_batches` is the shared batching layer used by both
//! pipelines: it fans batches out in parallel, restores input order on
//! reassembly, and isolates a failing batch down to the individual item so
//! the error names the exact position instead of desynchronizing the
//! ordinal mapping.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use fastembed::{InitOptions, TextEmbedding};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;

/// Request timeout for the remote backend.
const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Base delay between remote retries; doubles per attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default endpoint for the remote backend.
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// How much of a failing item's text is carried in the error.
const ERROR_TEXT_LIMIT: usize = 500;

/// Capability interface for embedding backends.
///
/// `embed_batch` must return exactly one vector per input, in input order;
/// anything else is an error, never a shorter or reordered result.
pub trait TextEmbedder: Send + Sync {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Output dimension D; every produced vector has exactly this length.
    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;

    /// SHA-256 of the model name; binds snapshots to the model that
    /// produced them.
    fn model_id(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.model_name().as_bytes());
        hasher.finalize().into()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("model initialization failed: {0}")]
    InitFailed(String),

    #[error("unknown embedding model: {0}")]
    InvalidModel(String),

    #[error("unknown embedding backend: {0}")]
    InvalidBackend(String),

    #[error("embedding backend error: {0}")]
    Backend(String),

    #[error("backend returned {got} vectors for {expected} inputs")]
    BatchShape { expected: usize, got: usize },

    #[error("failed to embed item {position}: {reason} (text: {text:?})")]
    Item {
        position: usize,
        text: String,
        reason: String,
    },

    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
}

/// Construct the backend named by the configuration.
pub fn from_config(
    config: &EmbeddingConfig,
    cache_dir: &Path,
) -> Result<Box<dyn TextEmbedder>, EmbeddingError> {
    match config.backend.as_str() {
        "local" => Ok(Box::new(LocalEmbedder::new(&config.model, cache_dir.to_path_buf())?)),
        "openai" => {
            let api_key =
                std::env::var("OPENAI_API_KEY").map_err(|_| EmbeddingError::MissingApiKey)?;
            Ok(Box::new(OpenAiEmbedder::new(
                api_key,
                &config.model,
                config.dimensions,
                config.max_retries,
            )?))
        }
        other => Err(EmbeddingError::InvalidBackend(other.to_string())),
    }
}

/// Embed `texts` in batches of `batch_size`, preserving input order.
///
/// Independent batches run in parallel; results are reassembled in input
/// order before anything downstream sees them. A failing batch is retried
/// item by item, and an item that still fails aborts the whole call with its
/// global position and content. No item is ever dropped or zero-filled.
pub fn embed_in_batches(
    embedder: &dyn TextEmbedder,
    texts: &[String],
    batch_size: usize,
    progress: Option<&indicatif::ProgressBar>,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let batch_size = batch_size.max(1);
    let batches: Vec<(usize, &[String])> = texts
        .chunks(batch_size)
        .enumerate()
        .map(|(i, chunk)| (i * batch_size, chunk))
        .collect();

    // Indexed parallel collect keeps batch order; within a batch the backend
    // contract keeps item order.
    let per_batch: Vec<Vec<Vec<f32>>> = batches
        .par_iter()
        .map(|(start, batch)| {
            let result = embed_batch_isolating(embedder, batch, *start);
            if let Some(bar) = progress {
                bar.inc(1);
            }
            result
        })
        .collect::<Result<_, _>>()?;

    let embeddings: Vec<Vec<f32>> = per_batch.into_iter().flatten().collect();
    if embeddings.len() != texts.len() {
        return Err(EmbeddingError::BatchShape {
            expected: texts.len(),
            got: embeddings.len(),
        });
    }

    Ok(embeddings)
}

/// Embed one batch; on failure, retry each item alone to pin down the fault.
fn embed_batch_isolating(
    embedder: &dyn TextEmbedder,
    batch: &[String],
    start: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let batch_error = match embedder.embed_batch(batch) {
        Ok(vectors) => return Ok(vectors),
        Err(err) => err,
    };

    log::warn!(
        "batch of {} starting at item {} failed ({}), retrying items individually",
        batch.len(),
        start,
        batch_error
    );

    let mut vectors = Vec::with_capacity(batch.len());
    for (offset, text) in batch.iter().enumerate() {
        match embedder.embed_batch(std::slice::from_ref(text)) {
            Ok(mut single) if single.len() == 1 => vectors.push(single.remove(0)),
            Ok(single) => {
                return Err(EmbeddingError::BatchShape {
                    expected: 1,
                    got: single.len(),
                })
            }
            Err(err) => {
                return Err(EmbeddingError::Item {
                    position: start + offset,
                    text: truncate_for_error(text),
                    reason: err.to_string(),
                })
            }
        }
    }

    Ok(vectors)
}

fn truncate_for_error(text: &str) -> String {
    if text.len() <= ERROR_TEXT_LIMIT {
        return text.to_string();
    }
    text.chars().take(ERROR_TEXT_LIMIT).collect()
}

/// Local inference via fastembed. The model downloads to the cache dir on
/// first use; a `Mutex` guards it because `embed()` takes `&mut self`.
pub struct LocalEmbedder {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let model_enum = parse_model_name(model_name)?;

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("failed to create models directory: {}", e))
        })?;

        log::info!("loading local embedding model '{}'", model_name);
        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);
        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let dimensions = probe_dimensions(&mut model)?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }
}

impl TextEmbedder for LocalEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut model = self
            .model
            .lock()
            .map_err(|e| EmbeddingError::Backend(format!("model lock poisoned: {}", e)))?;

        let vectors = model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::Backend(e.to_string()))?;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::BatchShape {
                expected: texts.len(),
                got: vectors.len(),
            });
        }

        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l6-v2-q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-small-en-v1.5-q" => Ok(fastembed::EmbeddingModel::BGESmallENV15Q),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-base-en-v1.5-q" => Ok(fastembed::EmbeddingModel::BGEBaseENV15Q),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "bge-large-en-v1.5-q" => Ok(fastembed::EmbeddingModel::BGELargeENV15Q),
        _ => Err(EmbeddingError::InvalidModel(format!(
            "{} (supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5; add -q for quantized)",
            name
        ))),
    }
}

fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
    let probe = model
        .embed(vec!["dimension probe"], None)
        .map_err(|e| EmbeddingError::InitFailed(format!("failed to probe dimensions: {}", e)))?;

    probe
        .first()
        .map(|v| v.len())
        .ok_or_else(|| EmbeddingError::InitFailed("model returned no embedding".to_string()))
}

/// Remote embeddings from an OpenAI-compatible endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::blocking::Client,
    api_base: String,
    api_key: String,
    model: String,
    dimensions: usize,
    max_retries: u32,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRecord>,
}

#[derive(Deserialize)]
struct EmbeddingRecord {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        model: &str,
        dimensions: Option<usize>,
        max_retries: u32,
    ) -> Result<Self, EmbeddingError> {
        let dimensions = match dimensions {
            Some(d) => d,
            None => known_remote_dimensions(model).ok_or_else(|| {
                EmbeddingError::InvalidModel(format!(
                    "{} (set embedding.dimensions explicitly for models without a known dimension)",
                    model
                ))
            })?,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(REMOTE_TIMEOUT)
            .build()
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        Ok(Self {
            client,
            api_base: OPENAI_API_BASE.to_string(),
            api_key,
            model: model.to_string(),
            dimensions,
            max_retries,
        })
    }

    /// Point the client at a different endpoint (self-hosted gateways,
    /// tests).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn request(&self, texts: &[String]) -> Result<EmbeddingResponse, EmbeddingError> {
        let url = format!("{}/embeddings", self.api_base);
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut attempt = 0;
        loop {
            let outcome = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send();

            let retryable = match outcome {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<EmbeddingResponse>()
                        .map_err(|e| EmbeddingError::Backend(e.to_string()));
                }
                Ok(response) => {
                    let status = response.status();
                    if !(status.as_u16() == 429 || status.is_server_error()) {
                        return Err(EmbeddingError::Backend(format!(
                            "embedding endpoint returned status {}",
                            status
                        )));
                    }
                    format!("status {}", status)
                }
                Err(err) => err.to_string(),
            };

            if attempt >= self.max_retries {
                return Err(EmbeddingError::Backend(format!(
                    "giving up after {} retries: {}",
                    self.max_retries, retryable
                )));
            }

            let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt);
            log::warn!(
                "embedding request failed ({}), retrying in {:?} ({}/{})",
                retryable,
                delay,
                attempt + 1,
                self.max_retries
            );
            std::thread::sleep(delay);
            attempt += 1;
        }
    }
}

impl TextEmbedder for OpenAiEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut response = self.request(texts)?;

        // The endpoint tags each vector with its input index; restore input
        // order rather than trusting response order.
        response.data.sort_by_key(|record| record.index);

        if response.data.len() != texts.len() {
            return Err(EmbeddingError::BatchShape {
                expected: texts.len(),
                got: response.data.len(),
            });
        }

        let mut vectors = Vec::with_capacity(response.data.len());
        for record in response.data {
            if record.embedding.len() != self.dimensions {
                return Err(EmbeddingError::Backend(format!(
                    "endpoint returned a {}-dim vector, expected {}",
                    record.embedding.len(),
                    self.dimensions
                )));
            }
            vectors.push(record.embedding);
        }

        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn known_remote_dimensions(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        "text-embedding-ada-002" => Some(1536),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommend::testing::StubEmbedder;

    fn texts(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_invalid_local_model_name() {
        let result = LocalEmbedder::new("nonexistent-model", std::env::temp_dir());
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
    }

    #[test]
    fn test_remote_unknown_model_requires_dimensions() {
        let result = OpenAiEmbedder::new("key".into(), "mystery-model", None, 3);
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));

        let embedder = OpenAiEmbedder::new("key".into(), "mystery-model", Some(256), 3).unwrap();
        assert_eq!(embedder.dimensions(), 256);
    }

    #[test]
    fn test_remote_known_model_dimensions() {
        let embedder =
            OpenAiEmbedder::new("key".into(), "text-embedding-3-small", None, 3).unwrap();
        assert_eq!(embedder.dimensions(), 1536);
        assert_eq!(embedder.model_name(), "text-embedding-3-small");
    }

    #[test]
    fn test_model_id_is_stable_per_model_name() {
        let a = OpenAiEmbedder::new("k1".into(), "text-embedding-3-small", None, 0).unwrap();
        let b = OpenAiEmbedder::new("k2".into(), "text-embedding-3-small", None, 5).unwrap();
        let c = OpenAiEmbedder::new("k1".into(), "text-embedding-3-large", None, 0).unwrap();

        assert_eq!(a.model_id(), b.model_id());
        assert_ne!(a.model_id(), c.model_id());
    }

    #[test]
    fn test_embed_in_batches_preserves_order() {
        let embedder = StubEmbedder::hashed(8);
        let inputs = texts(&["alpha", "beta", "gamma", "delta", "epsilon"]);

        let expected = embedder.embed_batch(&inputs).unwrap();
        let batched = embed_in_batches(&embedder, &inputs, 2, None).unwrap();

        assert_eq!(batched.len(), inputs.len());
        assert_eq!(batched, expected);
    }

    #[test]
    fn test_embed_in_batches_empty_input() {
        let embedder = StubEmbedder::hashed(8);
        let result = embed_in_batches(&embedder, &[], 10, None).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_failing_item_reported_with_global_position() {
        // 100 items, batches of 10; item 7 is poisoned. The run must fail
        // naming position 7 instead of emitting a 99-length result.
        let inputs: Vec<String> = (0..100).map(|i| format!("movie text {}", i)).collect();
        let embedder = StubEmbedder::hashed(8).with_poison("movie text 7");

        let result = embed_in_batches(&embedder, &inputs, 10, None);
        match result {
            Err(EmbeddingError::Item { position, text, .. }) => {
                assert_eq!(position, 7);
                assert_eq!(text, "movie text 7");
            }
            other => panic!("expected Item error, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_batch_failure_recovers_via_individual_retry() {
        // The stub fails multi-item batches containing the marked text but
        // succeeds on single items, modeling a batch-level fault. Isolation
        // must recover the full, ordered result.
        let inputs = texts(&["a", "b", "flaky", "d"]);
        let embedder = StubEmbedder::hashed(8).with_batch_poison("flaky");

        let vectors = embed_in_batches(&embedder, &inputs, 4, None).unwrap();
        assert_eq!(vectors.len(), 4);
        assert_eq!(vectors, StubEmbedder::hashed(8).embed_batch(&inputs).unwrap());
    }

    #[test]
    fn test_error_text_is_truncated() {
        let long = "x".repeat(2000);
        assert_eq!(truncate_for_error(&long).len(), ERROR_TEXT_LIMIT);
        assert_eq!(truncate_for_error("short"), "short");
    }
}
