use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::recommend::combine::{DEFAULT_ALPHA, DEFAULT_BETA};
use crate::recommend::{DEFAULT_BATCH_SIZE, DEFAULT_TOP_K};

/// Default local embedding model (bge-base offers +13% accuracy vs MiniLM)
const DEFAULT_LOCAL_MODEL: &str = "bge-base-en-v1.5";
/// Default retry count for the remote embedding backend
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Embedding backend configuration. Immutable during a run; changing the
/// backend or model invalidates any existing snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend kind: "local" (fastembed) or "openai" (remote endpoint)
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Model name (e.g. "bge-base-en-v1.5" or "text-embedding-3-small")
    #[serde(default = "default_model")]
    pub model: String,

    /// Vector dimension override for remote models the client does not know
    #[serde(default)]
    pub dimensions: Option<usize>,

    /// Items per embedding batch during precompute
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Retries on transient remote failures (429/5xx)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model: default_model(),
            dimensions: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_backend() -> String {
    "local".to_string()
}

fn default_model() -> String {
    DEFAULT_LOCAL_MODEL.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Relevance weight of the overview embedding
    #[serde(default = "default_alpha")]
    pub alpha: f32,

    /// Relevance weight of the feature embedding
    #[serde(default = "default_beta")]
    pub beta: f32,

    /// Results per query unless the caller overrides
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            alpha: default_alpha(),
            beta: default_beta(),
            default_top_k: default_top_k(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_alpha() -> f32 {
    DEFAULT_ALPHA
}

fn default_beta() -> f32 {
    DEFAULT_BETA
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// Default data dir: `~/.reelrec`
pub fn default_base_path() -> PathBuf {
    homedir::my_home()
        .ok()
        .flatten()
        .map(|home| home.join(".reelrec"))
        .unwrap_or_else(|| PathBuf::from(".reelrec"))
}

impl Config {
    fn validate(&self) {
        match self.embedding.backend.as_str() {
            "local" | "openai" => {}
            other => panic!("embedding.backend must be 'local' or 'openai', got '{other}'"),
        }

        if self.embedding.batch_size == 0 {
            panic!("embedding.batch_size must be greater than 0");
        }

        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            panic!("alpha must be a positive number, got {}", self.alpha);
        }
        if !(self.beta.is_finite() && self.beta > 0.0) {
            panic!("beta must be a positive number, got {}", self.beta);
        }

        if self.default_top_k == 0 {
            panic!("default_top_k must be greater than 0");
        }
    }

    pub fn load_with(base_path: &Path) -> Self {
        let config_path = base_path.join("config.yaml");

        // create new if does not exist
        if !config_path.exists() {
            std::fs::create_dir_all(base_path).expect("cannot create data directory");
            std::fs::write(
                &config_path,
                serde_yml::to_string(&Self::default()).unwrap().as_bytes(),
            )
            .expect("cannot write default config");
        }

        let config_str = std::fs::read_to_string(&config_path).expect("cannot read config file");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_path_buf();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let config_str = serde_yml::to_string(&self).unwrap();
        std::fs::write(self.base_path.join("config.yaml"), config_str)
            .expect("cannot write config file");
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Where the snapshot pair lives.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.base_path.join("snapshot")
    }
}
