//! Disk loaders for the shared retrieval resources.
//!
//! Expected layout under the resource directory:
//!
//! ```text
//! corpus/                  *.txt (one document each) and *.jsonl ({"id", "text"} per line)
//! corpus_metadata.csv      doc_id,title,source
//! vector_index.json        {"dim": 384, "vectors": [[...], ...]}
//! vector_index_meta.json   {"model": "...", "dim": 384, "doc_ids": [...]}
//! ```

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::IndexMap;
use ndarray::Array2;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::info;
use walkdir::WalkDir;

use crate::{
    error::ResourceError,
    resources::embedding::{default_embedder, Embedder},
};

pub const CORPUS_DIR: &str = "corpus";
pub const CORPUS_METADATA_FILE: &str = "corpus_metadata.csv";
pub const VECTOR_INDEX_FILE: &str = "vector_index.json";
pub const VECTOR_INDEX_META_FILE: &str = "vector_index_meta.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub documents: Vec<Document>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub doc_id: String,
    pub title: String,
    #[serde(default)]
    pub source: String,
}

/// Per-document metadata keyed by document id.
#[derive(Debug, Clone, Default)]
pub struct CorpusMetadata {
    pub documents: IndexMap<String, DocumentMeta>,
}

impl CorpusMetadata {
    pub fn get(&self, doc_id: &str) -> Option<&DocumentMeta> {
        self.documents.get(doc_id)
    }
}

/// Dense document vectors, one row per document.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    pub vectors: Array2<f32>,
}

impl VectorIndex {
    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.nrows() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndexMeta {
    pub model: String,
    pub dim: usize,
    /// Document id of each vector row.
    pub doc_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawVectors {
    dim: usize,
    vectors: Vec<Vec<f32>>,
}

/// Source of the five loadable resources. The keyword index is derived from
/// the corpus by the cache itself.
pub trait ResourceLoader: Send + Sync {
    fn load_corpus(&self) -> Result<Corpus, ResourceError>;
    fn load_corpus_metadata(&self) -> Result<CorpusMetadata, ResourceError>;
    fn load_vector_index(&self) -> Result<VectorIndex, ResourceError>;
    fn load_vector_index_meta(&self) -> Result<VectorIndexMeta, ResourceError>;
    fn load_embedding_model(&self) -> Result<Arc<dyn Embedder>, ResourceError>;
}

/// Loads resources from a directory on disk.
#[derive(Debug, Clone)]
pub struct FsResourceLoader {
    root: PathBuf,
    embedding_dim: usize,
}

impl FsResourceLoader {
    pub fn new(root: impl Into<PathBuf>, embedding_dim: usize) -> Self {
        Self {
            root: root.into(),
            embedding_dim,
        }
    }

    fn existing(&self, name: &str) -> Result<PathBuf, ResourceError> {
        let path = self.root.join(name);
        if path.exists() {
            Ok(path)
        } else {
            Err(ResourceError::Missing(path))
        }
    }
}

impl ResourceLoader for FsResourceLoader {
    fn load_corpus(&self) -> Result<Corpus, ResourceError> {
        let dir = self.existing(CORPUS_DIR)?;
        let mut documents = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|err| ResourceError::Io {
                path: err.path().map(Path::to_path_buf).unwrap_or_else(|| dir.clone()),
                source: err.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            match path.extension().and_then(|s| s.to_str()) {
                Some("txt") => {
                    let text = read_text(path)?;
                    let id = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("unknown")
                        .to_string();
                    documents.push(Document { id, text });
                }
                Some("jsonl") => {
                    for line in read_text(path)?.lines().filter(|l| !l.trim().is_empty()) {
                        let doc: Document =
                            serde_json::from_str(line).map_err(|e| ResourceError::Parse {
                                path: path.to_path_buf(),
                                message: e.to_string(),
                            })?;
                        documents.push(doc);
                    }
                }
                _ => continue,
            }
        }
        info!(dir = %dir.display(), documents = documents.len(), "loaded corpus");
        Ok(Corpus { documents })
    }

    fn load_corpus_metadata(&self) -> Result<CorpusMetadata, ResourceError> {
        let path = self.existing(CORPUS_METADATA_FILE)?;
        let parse_err = |e: csv::Error| ResourceError::Parse {
            path: path.clone(),
            message: e.to_string(),
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .map_err(parse_err)?;
        let mut documents = IndexMap::new();
        for row in reader.deserialize::<DocumentMeta>() {
            let meta = row.map_err(parse_err)?;
            documents.insert(meta.doc_id.clone(), meta);
        }
        info!(path = %path.display(), rows = documents.len(), "loaded corpus metadata");
        Ok(CorpusMetadata { documents })
    }

    fn load_vector_index(&self) -> Result<VectorIndex, ResourceError> {
        let path = self.existing(VECTOR_INDEX_FILE)?;
        let raw: RawVectors = read_json(&path)?;
        let rows = raw.vectors.len();
        if let Some(bad) = raw.vectors.iter().position(|v| v.len() != raw.dim) {
            return Err(ResourceError::Shape(format!(
                "row {bad} has {} values, expected {}",
                raw.vectors[bad].len(),
                raw.dim
            )));
        }
        let flat: Vec<f32> = raw.vectors.into_iter().flatten().collect();
        let vectors = Array2::from_shape_vec((rows, raw.dim), flat)
            .map_err(|e| ResourceError::Shape(e.to_string()))?;
        info!(path = %path.display(), rows, dim = raw.dim, "loaded vector index");
        Ok(VectorIndex { vectors })
    }

    fn load_vector_index_meta(&self) -> Result<VectorIndexMeta, ResourceError> {
        let path = self.existing(VECTOR_INDEX_META_FILE)?;
        read_json(&path)
    }

    fn load_embedding_model(&self) -> Result<Arc<dyn Embedder>, ResourceError> {
        let embedder = default_embedder(self.embedding_dim)?;
        info!(model = embedder.name(), dim = embedder.dim(), "loaded embedding model");
        Ok(embedder)
    }
}

fn read_text(path: &Path) -> Result<String, ResourceError> {
    std::fs::read_to_string(path).map_err(|source| ResourceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ResourceError> {
    serde_json::from_str(&read_text(path)?).map_err(|e| ResourceError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corpus_reads_txt_and_jsonl_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let corpus_dir = dir.path().join(CORPUS_DIR);
        std::fs::create_dir_all(corpus_dir.join("nested")).unwrap();
        std::fs::write(corpus_dir.join("a.txt"), "fever and cough").unwrap();
        std::fs::write(
            corpus_dir.join("nested/b.jsonl"),
            "{\"id\": \"b1\", \"text\": \"insulin\"}\n\n{\"id\": \"b2\", \"text\": \"asthma\"}\n",
        )
        .unwrap();
        std::fs::write(corpus_dir.join("ignored.md"), "# nope").unwrap();

        let corpus = FsResourceLoader::new(dir.path(), 8).load_corpus().unwrap();
        let ids: Vec<&str> = corpus.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b1", "b2"]);
    }

    #[test]
    fn ragged_vector_rows_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(VECTOR_INDEX_FILE),
            r#"{"dim": 2, "vectors": [[1.0, 0.0], [1.0]]}"#,
        )
        .unwrap();
        let err = FsResourceLoader::new(dir.path(), 2)
            .load_vector_index()
            .unwrap_err();
        assert!(matches!(err, ResourceError::Shape(_)));
    }

    #[test]
    fn metadata_csv_is_keyed_by_doc_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CORPUS_METADATA_FILE),
            "doc_id,title,source\na,Fever review,pubmed\n",
        )
        .unwrap();
        let meta = FsResourceLoader::new(dir.path(), 2)
            .load_corpus_metadata()
            .unwrap();
        assert_eq!(meta.get("a").unwrap().title, "Fever review");
    }

    #[test]
    fn missing_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsResourceLoader::new(dir.path(), 2)
            .load_vector_index_meta()
            .unwrap_err();
        assert!(matches!(err, ResourceError::Missing(_)));
    }
}
