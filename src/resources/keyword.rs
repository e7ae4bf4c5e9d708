//! In-memory BM25 keyword index.

use std::collections::HashMap;

use crate::{nlp::words, resources::loader::Corpus};

const K1: f32 = 1.5;
const B: f32 = 0.75;

/// BM25 index whose hits carry the id of the indexed document.
#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
    doc_ids: Vec<String>,
    postings: HashMap<String, Vec<(usize, u32)>>,
    doc_lens: Vec<u32>,
    avg_len: f32,
}

impl KeywordIndex {
    /// Index bare texts; each document's id is its position.
    pub fn build<S: AsRef<str>>(texts: &[S]) -> Self {
        Self::build_with_ids(
            texts
                .iter()
                .enumerate()
                .map(|(idx, text)| (idx.to_string(), AsRef::<str>::as_ref(text))),
        )
    }

    /// Index every corpus document under its own id.
    pub fn from_corpus(corpus: &Corpus) -> Self {
        Self::build_with_ids(
            corpus
                .documents
                .iter()
                .map(|doc| (doc.id.as_str(), doc.text.as_str())),
        )
    }

    pub fn build_with_ids<I, K, S>(docs: I) -> Self
    where
        I: IntoIterator<Item = (K, S)>,
        K: Into<String>,
        S: AsRef<str>,
    {
        let mut doc_ids = Vec::new();
        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();
        let mut doc_lens = Vec::new();
        for (doc, (id, text)) in docs.into_iter().enumerate() {
            let mut counts: HashMap<String, u32> = HashMap::new();
            let mut len = 0u32;
            for token in words(text.as_ref()) {
                *counts.entry(token).or_insert(0) += 1;
                len += 1;
            }
            doc_ids.push(id.into());
            doc_lens.push(len);
            for (token, tf) in counts {
                postings.entry(token).or_default().push((doc, tf));
            }
        }
        let total: u64 = doc_lens.iter().map(|&l| l as u64).sum();
        let avg_len = if doc_lens.is_empty() {
            0.0
        } else {
            total as f32 / doc_lens.len() as f32
        };
        Self {
            doc_ids,
            postings,
            doc_lens,
            avg_len,
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    /// Ids of the indexed documents, in index order.
    pub fn doc_ids(&self) -> &[String] {
        &self.doc_ids
    }

    /// Whether this index holds exactly the documents of `corpus`, in order.
    pub fn covers(&self, corpus: &Corpus) -> bool {
        self.doc_ids
            .iter()
            .eq(corpus.documents.iter().map(|doc| &doc.id))
    }

    /// Top `k` documents as `(doc_id, score)`, best first.
    pub fn search(&self, query: &str, k: usize) -> Vec<(&str, f32)> {
        let n = self.doc_lens.len() as f32;
        let mut scores: HashMap<usize, f32> = HashMap::new();
        for token in words(query) {
            let Some(posting) = self.postings.get(&token) else {
                continue;
            };
            let df = posting.len() as f32;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            for &(doc, tf) in posting {
                let tf = tf as f32;
                let len_norm = if self.avg_len > 0.0 {
                    self.doc_lens[doc] as f32 / self.avg_len
                } else {
                    1.0
                };
                let score = idf * tf * (K1 + 1.0) / (tf + K1 * (1.0 - B + B * len_norm));
                *scores.entry(doc).or_insert(0.0) += score;
            }
        }
        let mut ranked: Vec<(usize, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);
        ranked
            .into_iter()
            .map(|(doc, score)| (self.doc_ids[doc].as_str(), score))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::loader::Document;

    #[test]
    fn ranks_documents_with_query_terms_first() {
        let index = KeywordIndex::build(&[
            "metformin is first line for type 2 diabetes",
            "asthma inhaler technique",
            "diabetes diet and metformin adherence",
        ]);
        assert_eq!(index.len(), 3);
        let hits = index.search("metformin diabetes", 10);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|(doc, _)| *doc != "1"));
        assert!(hits[0].1 >= hits[1].1);
    }

    #[test]
    fn corpus_index_reports_document_ids() {
        let corpus = Corpus {
            documents: vec![
                Document {
                    id: "pm-17".into(),
                    text: "salbutamol for asthma".into(),
                },
                Document {
                    id: "pm-42".into(),
                    text: "metformin for diabetes".into(),
                },
            ],
        };
        let index = KeywordIndex::from_corpus(&corpus);
        assert!(index.covers(&corpus));
        assert_eq!(index.search("metformin", 3)[0].0, "pm-42");

        let other = KeywordIndex::build(&["metformin for diabetes"]);
        assert!(!other.covers(&corpus));
        assert_eq!(other.doc_ids(), ["0".to_string()]);
    }

    #[test]
    fn unknown_terms_and_empty_index_return_nothing() {
        assert!(KeywordIndex::build::<&str>(&[]).search("fever", 5).is_empty());
        let index = KeywordIndex::build(&["cough"]);
        assert!(index.search("zzz", 5).is_empty());
    }
}
