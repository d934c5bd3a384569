//! BM25 inverted index over sparse term-weight vectors.
//!
//! - Term → postings with term weights
//! - Document lengths (sum of weights) and average length
//! - Query-time scoring, ties broken by document id

use std::collections::HashMap;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::scorer::{bm25_term_score, idf, Bm25Params};
use super::tokenizer::TokenizerConfig;
use super::{Bm25Config, Bm25SearchResult};
use crate::embedding::SparseVector;

/// Statistics for a single document in the index.
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct DocumentStats {
    /// Sum of the document's term weights.
    pub length: f32,
    /// External document id (report id).
    pub doc_id: String,
}

/// Posting entry: document index and term weight.
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct Posting {
    pub doc_idx: usize,
    pub weight: f32,
}

/// BM25 inverted index.
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct Bm25Index {
    params: Bm25Params,
    /// Tokenizer settings the indexed vectors were produced with.
    tokenizer_config: TokenizerConfig,
    /// Term → (document frequency, postings).
    inverted_index: HashMap<String, (usize, Vec<Posting>)>,
    documents: Vec<DocumentStats>,
    doc_lookup: HashMap<String, usize>,
    avg_doc_len: f32,
    total_weight: f32,
}

impl Bm25Index {
    pub fn new(config: &Bm25Config) -> Self {
        Self {
            params: Bm25Params {
                k1: config.k1,
                b: config.b,
            },
            tokenizer_config: config.tokenizer_config(),
            inverted_index: HashMap::new(),
            documents: Vec::new(),
            doc_lookup: HashMap::new(),
            avg_doc_len: 0.0,
            total_weight: 0.0,
        }
    }

    /// Add a document. Returns `false` without touching the index when the
    /// id is already present.
    pub fn add_document(&mut self, doc_id: &str, terms: &SparseVector) -> bool {
        if self.doc_lookup.contains_key(doc_id) {
            return false;
        }

        let doc_idx = self.documents.len();
        let length = terms.total_weight();
        self.documents.push(DocumentStats {
            length,
            doc_id: doc_id.to_string(),
        });
        self.doc_lookup.insert(doc_id.to_string(), doc_idx);

        for (term, weight) in terms.iter() {
            let entry = self
                .inverted_index
                .entry(term.to_string())
                .or_insert((0, Vec::new()));
            entry.0 += 1;
            entry.1.push(Posting { doc_idx, weight });
        }

        self.total_weight += length;
        self.avg_doc_len = self.total_weight / self.documents.len() as f32;
        true
    }

    /// Score every document containing at least one query term.
    ///
    /// Each distinct query term counts once; query weights are ignored.
    pub fn search(&self, query: &SparseVector, top_k: usize) -> Vec<Bm25SearchResult> {
        if self.documents.is_empty() || query.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let num_docs = self.documents.len();
        let mut scores: HashMap<usize, f32> = HashMap::new();

        for term in query.terms() {
            let Some((df, postings)) = self.inverted_index.get(term) else {
                continue;
            };
            let idf_val = idf(num_docs, *df);
            for posting in postings {
                let doc = &self.documents[posting.doc_idx];
                let term_score = bm25_term_score(
                    posting.weight,
                    doc.length,
                    self.avg_doc_len,
                    idf_val,
                    &self.params,
                );
                *scores.entry(posting.doc_idx).or_insert(0.0) += term_score;
            }
        }

        let mut scored: Vec<(&str, f32)> = scores
            .into_iter()
            .map(|(idx, score)| (self.documents[idx].doc_id.as_str(), score))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        scored
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(rank, (doc_id, score))| Bm25SearchResult {
                doc_id: doc_id.to_string(),
                score,
                rank: rank + 1,
            })
            .collect()
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.doc_lookup.contains_key(doc_id)
    }

    pub fn num_documents(&self) -> usize {
        self.documents.len()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.inverted_index.len()
    }

    pub fn document_frequency(&self, term: &str) -> usize {
        self.inverted_index
            .get(term)
            .map(|(df, _)| *df)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn tokenizer_config(&self) -> &TokenizerConfig {
        &self.tokenizer_config
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn stats(&self) -> Bm25IndexStats {
        Bm25IndexStats {
            num_documents: self.documents.len(),
            vocabulary_size: self.inverted_index.len(),
            total_weight: self.total_weight,
            avg_doc_length: self.avg_doc_len,
        }
    }
}

/// Statistics about the BM25 index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bm25IndexStats {
    pub num_documents: usize,
    pub vocabulary_size: usize,
    pub total_weight: f32,
    pub avg_doc_length: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::SparseEncoder;

    fn add(index: &mut Bm25Index, id: &str, text: &str) {
        let encoder = SparseEncoder::default();
        index.add_document(id, &encoder.encode(text));
    }

    fn query(text: &str) -> SparseVector {
        SparseEncoder::default().encode(text)
    }

    fn create_test_index() -> Bm25Index {
        let mut index = Bm25Index::new(&Bm25Config::default());
        add(&mut index, "r1", "SQL injection in login form username parameter");
        add(&mut index, "r2", "Stored XSS in comment body rendered without escaping");
        add(&mut index, "r3", "SQL injection in search endpoint order parameter");
        add(&mut index, "r4", "Race condition in coupon redemption");
        index
    }

    #[test]
    fn test_add_document() {
        let mut index = Bm25Index::new(&Bm25Config::default());
        assert!(index.add_document("r1", &query("token refresh")));
        assert_eq!(index.num_documents(), 1);
        assert_eq!(index.vocabulary_size(), 2);
        assert!(index.contains("r1"));
    }

    #[test]
    fn test_add_existing_id_is_ignored() {
        let mut index = Bm25Index::new(&Bm25Config::default());
        assert!(index.add_document("r1", &query("token refresh")));
        assert!(!index.add_document("r1", &query("something else entirely")));
        assert_eq!(index.num_documents(), 1);
        assert_eq!(index.document_frequency("token"), 1);
        assert_eq!(index.vocabulary_size(), 2);
    }

    #[test]
    fn test_search_basic() {
        let index = create_test_index();
        let results = index.search(&query("sql injection"), 10);

        let ids: Vec<_> = results.iter().map(|r| r.doc_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"r1"));
        assert!(ids.contains(&"r3"));
    }

    #[test]
    fn test_search_no_match() {
        let index = create_test_index();
        assert!(index.search(&query("deserialization gadget"), 10).is_empty());
        assert!(index.search(&SparseVector::new(), 10).is_empty());
    }

    #[test]
    fn test_ranking_prefers_higher_weight() {
        let mut index = Bm25Index::new(&Bm25Config::default());
        add(&mut index, "many", "redos redos redos regex");
        add(&mut index, "one", "redos regex");
        add(&mut index, "none", "regex only");

        let results = index.search(&query("redos"), 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].doc_id, "many");
        assert_eq!(results[1].doc_id, "one");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_equal_scores_break_by_id() {
        let mut index = Bm25Index::new(&Bm25Config::default());
        add(&mut index, "b", "open redirect");
        add(&mut index, "c", "open redirect");
        add(&mut index, "a", "open redirect");

        let ids: Vec<_> = index
            .search(&query("redirect"), 10)
            .into_iter()
            .map(|r| r.doc_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_top_k_limit_and_ranks() {
        let mut index = Bm25Index::new(&Bm25Config::default());
        for i in 0..30 {
            add(&mut index, &format!("doc{:02}", i), "shared term");
        }

        let results = index.search(&query("shared"), 5);
        assert_eq!(results.len(), 5);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.rank, i + 1);
        }
        assert_eq!(index.search(&query("shared"), 100).len(), 30);
    }

    #[test]
    fn test_stats() {
        let index = create_test_index();
        let stats = index.stats();
        assert_eq!(stats.num_documents, 4);
        assert!(stats.vocabulary_size > 0);
        assert!(stats.total_weight > 0.0);
        assert!(stats.avg_doc_length > 0.0);
    }
}
