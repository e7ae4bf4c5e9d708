//! Query embedding backends.

#[cfg(not(feature = "embeddings"))]
use std::sync::Arc;

use ndarray::ArrayView1;

use crate::{error::ResourceError, nlp::words};

#[cfg(feature = "embeddings")]
use fastembed::TextEmbedding;

/// Embedding-model seam used by retrieval.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ResourceError>;
}

/// Feature-hashed bag of words, L2-normalised. Deterministic and model-free.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for token in words(text) {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&bytes[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dim as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ResourceError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// MiniLM embeddings through fastembed.
#[cfg(feature = "embeddings")]
pub struct FastEmbedder {
    inner: parking_lot::Mutex<TextEmbedding>,
    dim: usize,
}

#[cfg(feature = "embeddings")]
impl FastEmbedder {
    pub fn try_new() -> Result<Self, ResourceError> {
        let model = TextEmbedding::try_new(Default::default())
            .map_err(|e| ResourceError::Embedding(e.to_string()))?;
        let inner = parking_lot::Mutex::new(model);
        let probe = inner
            .lock()
            .embed(vec!["dimension probe"], None)
            .map_err(|e| ResourceError::Embedding(e.to_string()))?;
        let dim = probe.first().map(Vec::len).unwrap_or(0);
        Ok(Self { inner, dim })
    }
}

#[cfg(feature = "embeddings")]
impl Embedder for FastEmbedder {
    fn name(&self) -> &str {
        "fastembed"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ResourceError> {
        self.inner
            .lock()
            .embed(texts.to_vec(), None)
            .map_err(|e| ResourceError::Embedding(e.to_string()))
    }
}

/// Embedder selected by cargo features.
#[cfg(feature = "embeddings")]
pub fn default_embedder(_dim: usize) -> Result<std::sync::Arc<dyn Embedder>, ResourceError> {
    Ok(std::sync::Arc::new(FastEmbedder::try_new()?))
}

/// Embedder selected by cargo features.
#[cfg(not(feature = "embeddings"))]
pub fn default_embedder(dim: usize) -> Result<Arc<dyn Embedder>, ResourceError> {
    Ok(Arc::new(HashingEmbedder::new(dim)))
}

pub fn cosine(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let dot = a.dot(&b);
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array1;

    use super::*;

    #[test]
    fn hashing_embedder_is_deterministic_and_normalised() {
        let embedder = HashingEmbedder::new(64);
        let first = embedder.embed(&["metformin lowers glucose"]).unwrap();
        let second = embedder.embed(&["metformin lowers glucose"]).unwrap();
        assert_eq!(first, second);
        let norm = first[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_words_raise_similarity() {
        let embedder = HashingEmbedder::new(256);
        let vectors = embedder
            .embed(&["insulin dosing", "insulin dosing schedule", "chest radiograph"])
            .unwrap();
        let a = Array1::from(vectors[0].clone());
        let b = Array1::from(vectors[1].clone());
        let c = Array1::from(vectors[2].clone());
        assert!(cosine(a.view(), b.view()) > cosine(a.view(), c.view()));
    }

    #[test]
    fn zero_vector_has_zero_similarity() {
        let zero = Array1::<f32>::zeros(3);
        let one = Array1::from(vec![1.0f32, 0.0, 0.0]);
        assert_eq!(cosine(zero.view(), one.view()), 0.0);
    }
}
