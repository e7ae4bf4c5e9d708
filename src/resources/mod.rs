//! Process-wide cache of heavy retrieval resources.
//!
//! Six resources are loaded lazily and independently: corpus, corpus metadata,
//! vector index, vector-index metadata, embedding model and keyword index.
//! Each getter either returns the cached value (a hit) or performs the load
//! (a load) while holding that resource's lock, so concurrent first callers of
//! one getter trigger exactly one load.
//!
//! Lock order is keyword index -> corpus; no other getter nests.

pub mod embedding;
pub mod keyword;
pub mod loader;
pub mod search;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info};

use crate::{config::Settings, error::ResourceError};

pub use embedding::Embedder;
pub use keyword::KeywordIndex;
pub use loader::{
    Corpus, CorpusMetadata, FsResourceLoader, ResourceLoader, VectorIndex, VectorIndexMeta,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Corpus,
    CorpusMetadata,
    VectorIndex,
    VectorIndexMeta,
    EmbeddingModel,
    KeywordIndex,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        Self::Corpus,
        Self::CorpusMetadata,
        Self::VectorIndex,
        Self::VectorIndexMeta,
        Self::EmbeddingModel,
        Self::KeywordIndex,
    ];
}

/// Cumulative counters for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceStats {
    pub kind: ResourceKind,
    pub loaded: bool,
    pub loads: u64,
    pub hits: u64,
}

struct Slot<T: ?Sized> {
    value: Mutex<Option<Arc<T>>>,
    loads: AtomicU64,
    hits: AtomicU64,
}

impl<T: ?Sized> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: Mutex::new(None),
            loads: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }
}

impl<T: ?Sized> Slot<T> {
    /// Attempts count as loads even when they fail; a failed load leaves the slot empty.
    fn get_or_load<F>(&self, kind: ResourceKind, load: F) -> Result<Arc<T>, ResourceError>
    where
        F: FnOnce() -> Result<Arc<T>, ResourceError>,
    {
        let mut value = self.value.lock();
        if let Some(cached) = value.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached.clone());
        }
        self.loads.fetch_add(1, Ordering::Relaxed);
        debug!(?kind, "loading shared resource");
        let loaded = load()?;
        *value = Some(loaded.clone());
        Ok(loaded)
    }

    fn clear(&self) {
        self.value.lock().take();
    }

    fn stats(&self, kind: ResourceKind) -> ResourceStats {
        ResourceStats {
            kind,
            loaded: self.value.lock().is_some(),
            loads: self.loads.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }
}

static GLOBAL: OnceCell<Arc<SharedResourceCache>> = OnceCell::new();

/// Lazily loaded, shared retrieval resources.
pub struct SharedResourceCache {
    loader: Arc<dyn ResourceLoader>,
    /// Held shared by getters and exclusively by [`Self::reset`].
    gate: RwLock<()>,
    corpus: Slot<Corpus>,
    corpus_metadata: Slot<CorpusMetadata>,
    vector_index: Slot<VectorIndex>,
    vector_index_meta: Slot<VectorIndexMeta>,
    embedding_model: Slot<dyn Embedder>,
    keyword_index: Slot<KeywordIndex>,
}

impl SharedResourceCache {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            loader,
            gate: RwLock::new(()),
            corpus: Slot::default(),
            corpus_metadata: Slot::default(),
            vector_index: Slot::default(),
            vector_index_meta: Slot::default(),
            embedding_model: Slot::default(),
            keyword_index: Slot::default(),
        }
    }

    /// Cache over [`FsResourceLoader`] rooted at the configured resource directory.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(Arc::new(FsResourceLoader::new(
            settings.resource_dir.clone(),
            settings.embedding_dim,
        )))
    }

    /// Install `cache` as the process-wide instance unless one is already
    /// installed; returns the installed instance either way.
    pub fn install(cache: Arc<SharedResourceCache>) -> Arc<SharedResourceCache> {
        GLOBAL.get_or_init(|| cache).clone()
    }

    pub fn global() -> Option<Arc<SharedResourceCache>> {
        GLOBAL.get().cloned()
    }

    pub fn corpus(&self) -> Result<Arc<Corpus>, ResourceError> {
        let _gate = self.gate.read_recursive();
        self.corpus.get_or_load(ResourceKind::Corpus, || {
            self.loader.load_corpus().map(Arc::new)
        })
    }

    pub fn corpus_metadata(&self) -> Result<Arc<CorpusMetadata>, ResourceError> {
        let _gate = self.gate.read_recursive();
        self.corpus_metadata
            .get_or_load(ResourceKind::CorpusMetadata, || {
                self.loader.load_corpus_metadata().map(Arc::new)
            })
    }

    pub fn vector_index(&self) -> Result<Arc<VectorIndex>, ResourceError> {
        let _gate = self.gate.read_recursive();
        self.vector_index.get_or_load(ResourceKind::VectorIndex, || {
            self.loader.load_vector_index().map(Arc::new)
        })
    }

    pub fn vector_index_meta(&self) -> Result<Arc<VectorIndexMeta>, ResourceError> {
        let _gate = self.gate.read_recursive();
        self.vector_index_meta
            .get_or_load(ResourceKind::VectorIndexMeta, || {
                self.loader.load_vector_index_meta().map(Arc::new)
            })
    }

    pub fn embedding_model(&self) -> Result<Arc<dyn Embedder>, ResourceError> {
        let _gate = self.gate.read_recursive();
        self.embedding_model
            .get_or_load(ResourceKind::EmbeddingModel, || {
                self.loader.load_embedding_model()
            })
    }

    /// BM25 index over `texts` (ids are positions), or over the cached corpus
    /// when `texts` is `None`. `texts` only matters for the call that performs
    /// the load.
    pub fn keyword_index(
        &self,
        texts: Option<&[String]>,
    ) -> Result<Arc<KeywordIndex>, ResourceError> {
        let _gate = self.gate.read_recursive();
        self.keyword_index
            .get_or_load(ResourceKind::KeywordIndex, || {
                let index = match texts {
                    Some(texts) => KeywordIndex::build(texts),
                    None => {
                        let corpus: Arc<Corpus> = self.corpus()?;
                        KeywordIndex::from_corpus(&corpus)
                    },
                };
                info!(documents = index.len(), "built keyword index");
                Ok(Arc::new(index))
            })
    }

    /// Drop every cached resource. Counters are kept.
    pub fn reset(&self) {
        let _gate = self.gate.write();
        self.corpus.clear();
        self.corpus_metadata.clear();
        self.vector_index.clear();
        self.vector_index_meta.clear();
        self.embedding_model.clear();
        self.keyword_index.clear();
        info!("shared resource cache reset");
    }

    pub fn stats_for(&self, kind: ResourceKind) -> ResourceStats {
        match kind {
            ResourceKind::Corpus => self.corpus.stats(kind),
            ResourceKind::CorpusMetadata => self.corpus_metadata.stats(kind),
            ResourceKind::VectorIndex => self.vector_index.stats(kind),
            ResourceKind::VectorIndexMeta => self.vector_index_meta.stats(kind),
            ResourceKind::EmbeddingModel => self.embedding_model.stats(kind),
            ResourceKind::KeywordIndex => self.keyword_index.stats(kind),
        }
    }

    pub fn stats(&self) -> Vec<ResourceStats> {
        ResourceKind::ALL
            .iter()
            .map(|&kind| self.stats_for(kind))
            .collect()
    }
}
