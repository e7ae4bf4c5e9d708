//! Hybrid keyword + vector retrieval over the shared resources.

use std::{collections::HashMap, sync::Arc};

use ndarray::Array1;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::ResourceError,
    resources::{embedding::cosine, KeywordIndex, SharedResourceCache},
};

/// Reciprocal rank fusion constant.
const RRF_K: f64 = 60.0;
/// Candidates pulled from each ranking per requested hit.
const CANDIDATE_FACTOR: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub title: Option<String>,
    pub score: f64,
    pub keyword_rank: Option<usize>,
    pub vector_rank: Option<usize>,
}

/// Fuses BM25 and embedding rankings with reciprocal rank fusion.
#[derive(Clone)]
pub struct Retriever {
    cache: Arc<SharedResourceCache>,
}

impl Retriever {
    pub fn new(cache: Arc<SharedResourceCache>) -> Self {
        Self { cache }
    }

    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, ResourceError> {
        let candidates = k.max(1) * CANDIDATE_FACTOR;
        let keyword = self.keyword_ranking(query, candidates)?;
        let vector = self.vector_ranking(query, candidates)?;

        let mut fused: HashMap<String, SearchHit> = HashMap::new();
        for (ranking, is_keyword) in [(&keyword, true), (&vector, false)] {
            for (idx, doc_id) in ranking.iter().enumerate() {
                let rank = idx + 1;
                let hit = fused.entry(doc_id.clone()).or_insert_with(|| SearchHit {
                    doc_id: doc_id.clone(),
                    title: None,
                    score: 0.0,
                    keyword_rank: None,
                    vector_rank: None,
                });
                hit.score += 1.0 / (RRF_K + rank as f64);
                if is_keyword {
                    hit.keyword_rank = Some(rank);
                } else {
                    hit.vector_rank = Some(rank);
                }
            }
        }

        let metadata = match self.cache.corpus_metadata() {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                warn!(error = %err, "corpus metadata unavailable; hits will have no titles");
                None
            }
        };
        let mut hits: Vec<SearchHit> = fused.into_values().collect();
        for hit in &mut hits {
            hit.title = metadata
                .as_ref()
                .and_then(|m| m.get(&hit.doc_id))
                .map(|meta| meta.title.clone());
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
        hits.truncate(k);
        debug!(query, hits = hits.len(), "hybrid search");
        Ok(hits)
    }

    /// BM25 ranking over the corpus. A cached index built from other texts is
    /// bypassed with a one-off index over the corpus.
    fn keyword_ranking(&self, query: &str, limit: usize) -> Result<Vec<String>, ResourceError> {
        let corpus = self.cache.corpus()?;
        let cached = self.cache.keyword_index(None)?;
        let index = if cached.covers(&corpus) {
            cached
        } else {
            warn!(
                indexed = cached.len(),
                corpus = corpus.len(),
                "cached keyword index was not built from the corpus; indexing corpus for this query"
            );
            Arc::new(KeywordIndex::from_corpus(&corpus))
        };
        Ok(index
            .search(query, limit)
            .into_iter()
            .map(|(doc_id, _)| doc_id.to_string())
            .collect())
    }

    fn vector_ranking(&self, query: &str, limit: usize) -> Result<Vec<String>, ResourceError> {
        let index = self.cache.vector_index()?;
        let meta = self.cache.vector_index_meta()?;
        let embedder = self.cache.embedding_model()?;
        if meta.doc_ids.len() != index.len() {
            return Err(ResourceError::Shape(format!(
                "{} vectors but {} document ids",
                index.len(),
                meta.doc_ids.len()
            )));
        }
        if embedder.dim() != index.dim() {
            warn!(
                embedder = embedder.dim(),
                index = index.dim(),
                "embedding dimension mismatch; skipping vector ranking"
            );
            return Ok(Vec::new());
        }
        let query = embedder
            .embed(&[query])?
            .pop()
            .map(Array1::from)
            .ok_or_else(|| ResourceError::Embedding("empty embedding batch".into()))?;
        let mut scored: Vec<(usize, f32)> = index
            .vectors
            .rows()
            .into_iter()
            .enumerate()
            .map(|(row, vector)| (row, cosine(vector, query.view())))
            .filter(|(_, sim)| *sim > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(limit);
        Ok(scored
            .into_iter()
            .map(|(row, _)| meta.doc_ids[row].clone())
            .collect())
    }
}
