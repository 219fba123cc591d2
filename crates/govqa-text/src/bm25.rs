//! Okapi BM25 over a tokenized corpus.
//!
//! ```text
//! score(q, d) = sum over q_i of idf(q_i) * tf * (k1 + 1) / (tf + k1 * (1 - b + b * |d| / avgdl))
//! idf(t)      = ln(N - df + 0.5) - ln(df + 0.5)
//! ```
//!
//! Terms present in more than half the corpus get a negative raw idf; those
//! are floored to `epsilon * mean(idf)`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use govqa_core::corpus;
use govqa_core::persist::{read_json, stage_json, Staged};
use govqa_core::{Document, Error, RankedResult, Result, SourceKind};

use crate::tokenize::tokenize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    pub epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75, epsilon: 0.25 }
    }
}

/// Persisted sparse index. `tokenized_corpus[i]`, `doc_freqs[i]` and
/// `documents[i]` always describe the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseIndex {
    params: Bm25Params,
    tokenized_corpus: Vec<Vec<String>>,
    doc_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<usize>,
    avgdl: f64,
    idf: HashMap<String, f64>,
    fingerprint: String,
    documents: Vec<Document>,
}

impl SparseIndex {
    pub fn build(documents: Vec<Document>) -> Self {
        Self::build_with(documents, Bm25Params::default())
    }

    pub fn build_with(documents: Vec<Document>, params: Bm25Params) -> Self {
        tracing::info!(documents = documents.len(), "building BM25 index");

        let tokenized_corpus: Vec<Vec<String>> = documents.iter().map(|d| tokenize(&d.text)).collect();

        let mut doc_freqs = Vec::with_capacity(tokenized_corpus.len());
        let mut doc_lens = Vec::with_capacity(tokenized_corpus.len());
        let mut df: HashMap<String, u32> = HashMap::new();
        for tokens in &tokenized_corpus {
            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *df.entry(term.clone()).or_insert(0) += 1;
            }
            doc_lens.push(tokens.len());
            doc_freqs.push(freqs);
        }

        let n = tokenized_corpus.len() as f64;
        let total_len: usize = doc_lens.iter().sum();
        let avgdl = if tokenized_corpus.is_empty() { 0.0 } else { total_len as f64 / n };

        let mut idf: HashMap<String, f64> = HashMap::with_capacity(df.len());
        let mut idf_sum = 0.0;
        let mut negative = Vec::new();
        for (term, freq) in df {
            let freq = f64::from(freq);
            let value = (n - freq + 0.5).ln() - (freq + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term, value);
        }
        if !idf.is_empty() {
            let floor = params.epsilon * (idf_sum / idf.len() as f64);
            for term in negative {
                idf.insert(term, floor);
            }
        }

        let fingerprint = corpus::fingerprint(&documents);
        Self { params, tokenized_corpus, doc_freqs, doc_lens, avgdl, idf, fingerprint, documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Matches the vector store's fingerprint when both were built together.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn tokens(&self, doc_index: usize) -> Option<&[String]> {
        self.tokenized_corpus.get(doc_index).map(Vec::as_slice)
    }

    /// BM25 score of `doc_index` for the given query tokens. Repeated query
    /// tokens contribute once per occurrence; unknown terms contribute 0.
    pub fn score(&self, query_tokens: &[String], doc_index: usize) -> f64 {
        let Some(freqs) = self.doc_freqs.get(doc_index) else {
            return 0.0;
        };
        let Bm25Params { k1, b, .. } = self.params;
        let avgdl = if self.avgdl > 0.0 { self.avgdl } else { 1.0 };
        let norm = k1 * (1.0 - b + b * self.doc_lens[doc_index] as f64 / avgdl);

        query_tokens
            .iter()
            .map(|token| {
                let tf = f64::from(freqs.get(token).copied().unwrap_or(0));
                let idf = self.idf.get(token).copied().unwrap_or(0.0);
                idf * tf * (k1 + 1.0) / (tf + norm)
            })
            .sum()
    }

    pub fn scores(&self, query_tokens: &[String]) -> Vec<f64> {
        (0..self.len()).map(|i| self.score(query_tokens, i)).collect()
    }

    /// Top-`k` documents by descending score. Every document is a candidate,
    /// including zero scorers; equal scores keep corpus order.
    pub fn search(&self, query: &str, k: usize) -> Vec<RankedResult> {
        let query_tokens = tokenize(query);
        tracing::debug!(tokens = ?query_tokens, "BM25 query");

        let scores = self.scores(&query_tokens);
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        order.truncate(k);

        let results: Vec<RankedResult> = order
            .into_iter()
            .enumerate()
            .map(|(pos, idx)| RankedResult {
                document: self.documents[idx].clone(),
                score: scores[idx] as f32,
                rank: pos + 1,
                source: SourceKind::Lexical,
            })
            .collect();
        tracing::debug!(results = results.len(), "BM25 search done");
        results
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.stage(path)?.commit()?;
        tracing::info!(path = %path.display(), documents = self.len(), "BM25 index saved");
        Ok(())
    }

    /// Writes the index next to `path` without replacing it; see [`Staged`].
    pub fn stage(&self, path: &Path) -> Result<Staged> {
        stage_json(self, path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let index: Self = read_json(path)?;
        index.check_aligned()?;
        tracing::info!(path = %path.display(), documents = index.len(), "BM25 index loaded");
        Ok(index)
    }

    fn check_aligned(&self) -> Result<()> {
        let n = self.documents.len();
        if self.tokenized_corpus.len() != n || self.doc_freqs.len() != n || self.doc_lens.len() != n {
            return Err(Error::Index(format!(
                "sparse index misaligned: {} documents, {} token lists, {} frequency tables, {} lengths",
                n,
                self.tokenized_corpus.len(),
                self.doc_freqs.len(),
                self.doc_lens.len()
            )));
        }
        if corpus::fingerprint(&self.documents) != self.fingerprint {
            return Err(Error::Index("sparse index does not match its recorded corpus fingerprint".to_string()));
        }
        Ok(())
    }
}
