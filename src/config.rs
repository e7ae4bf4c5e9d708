//! Runtime configuration utilities for medner.

use std::{
    env,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;

/// Default location of the full-tier model pack.
pub const DEFAULT_MODEL_PATH: &str = "./data/models/ner-pack";

/// Per-tier confidence constants.
///
/// Relative tier rankings, not calibrated probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ConfidenceConfig {
    /// Lightweight confidence with no hits.
    pub lightweight_base: f64,
    /// Added per entity found by the lightweight tier.
    pub lightweight_step: f64,
    /// Upper bound of lightweight confidence.
    pub lightweight_cap: f64,
    pub partial: f64,
    pub full: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            lightweight_base: 0.5,
            lightweight_step: 0.05,
            lightweight_cap: 0.7,
            partial: 0.85,
            full: 0.95,
        }
    }
}

impl ConfidenceConfig {
    /// Lightweight confidence for `found` distinct entities.
    pub fn lightweight(&self, found: usize) -> f64 {
        (self.lightweight_base + self.lightweight_step * found as f64)
            .min(self.lightweight_cap)
            .clamp(0.0, 1.0)
    }
}

/// Scheduling and caching knobs for the hybrid coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Delay before the partial tier starts loading.
    pub partial_warmup: Duration,
    /// Delay between the partial tier settling and the full tier starting.
    pub full_delay: Duration,
    /// Upper bound on a single load attempt.
    pub load_timeout: Duration,
    /// Attempts per tier before it is marked failed.
    pub load_attempts: u32,
    /// Base backoff between attempts, multiplied by the attempt number.
    pub retry_backoff: Duration,
    /// Soft cap on cached extraction results.
    pub cache_capacity: usize,
    pub confidence: ConfidenceConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            partial_warmup: Duration::from_millis(1000),
            full_delay: Duration::from_millis(3000),
            load_timeout: Duration::from_secs(120),
            load_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            cache_capacity: 1000,
            confidence: ConfidenceConfig::default(),
        }
    }
}

/// Application configuration resolved from `.env` and defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root folder for cached data artefacts.
    pub data_dir: PathBuf,
    /// Directory holding `concept_db.json`.
    pub concept_db_dir: PathBuf,
    /// Full-tier model pack directory.
    pub model_path: PathBuf,
    /// Directory holding corpus, vector index and their metadata.
    pub resource_dir: PathBuf,
    /// Optional JSON dictionary replacing the built-in term dictionary.
    pub term_dictionary: Option<PathBuf>,
    /// Dimension of the fallback hashing embedder.
    pub embedding_dim: usize,
    pub coordinator: CoordinatorConfig,
}

impl Settings {
    /// Load configuration from environment with reasonable defaults.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let concept_db_dir = env::var("CONCEPT_DB_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("concepts"));
        let model_path = env::var("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_MODEL_PATH));
        let resource_dir = env::var("RESOURCE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("resources"));
        let term_dictionary = env::var("TERM_DICTIONARY_PATH").ok().map(PathBuf::from);

        let defaults = CoordinatorConfig::default();
        let confidence_defaults = ConfidenceConfig::default();
        let coordinator = CoordinatorConfig {
            partial_warmup: Duration::from_millis(env_or(
                "PARTIAL_WARMUP_MS",
                defaults.partial_warmup.as_millis() as u64,
            )),
            full_delay: Duration::from_millis(env_or(
                "FULL_DELAY_MS",
                defaults.full_delay.as_millis() as u64,
            )),
            load_timeout: Duration::from_secs(env_or(
                "LOAD_TIMEOUT_SECS",
                defaults.load_timeout.as_secs(),
            )),
            load_attempts: env_or("LOAD_ATTEMPTS", defaults.load_attempts).max(1),
            retry_backoff: defaults.retry_backoff,
            cache_capacity: env_or("CACHE_CAPACITY", defaults.cache_capacity),
            confidence: ConfidenceConfig {
                lightweight_base: env_or(
                    "CONFIDENCE_LIGHTWEIGHT_BASE",
                    confidence_defaults.lightweight_base,
                ),
                lightweight_step: env_or(
                    "CONFIDENCE_LIGHTWEIGHT_STEP",
                    confidence_defaults.lightweight_step,
                ),
                lightweight_cap: env_or(
                    "CONFIDENCE_LIGHTWEIGHT_CAP",
                    confidence_defaults.lightweight_cap,
                ),
                partial: env_or("CONFIDENCE_PARTIAL", confidence_defaults.partial),
                full: env_or("CONFIDENCE_FULL", confidence_defaults.full),
            },
        };

        std::fs::create_dir_all(&data_dir).context("creating data dir")?;

        Ok(Self {
            data_dir,
            concept_db_dir,
            model_path,
            resource_dir,
            term_dictionary,
            embedding_dim: env_or("EMBEDDING_DIM", 384),
            coordinator,
        })
    }

    /// Settings rooted at `data_dir` with default scheduling, for tests and embedding.
    pub fn rooted_at<P: AsRef<Path>>(data_dir: P) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            concept_db_dir: data_dir.join("concepts"),
            model_path: data_dir.join("models/ner-pack"),
            resource_dir: data_dir.join("resources"),
            term_dictionary: None,
            embedding_dim: 384,
            coordinator: CoordinatorConfig::default(),
            data_dir,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
