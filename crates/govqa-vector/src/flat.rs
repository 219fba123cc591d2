use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use govqa_core::corpus;
use govqa_core::persist::{read_json, stage_json, Staged};
use govqa_core::{
    Document, Error, RankedResult, Result, SourceKind, VectorIndexer, VectorStore,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    document: Document,
    vector: Vec<f32>,
}

/// Exact nearest-neighbour store scored by squared L2 distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dim: usize,
    built_at: DateTime<Utc>,
    fingerprint: String,
    entries: Vec<Entry>,
}

impl FlatIndex {
    pub fn new(dim: usize, embeddings: Vec<Vec<f32>>, documents: Vec<Document>) -> Result<Self> {
        if embeddings.len() != documents.len() {
            return Err(Error::Index(format!(
                "{} embeddings for {} documents",
                embeddings.len(),
                documents.len()
            )));
        }
        if let Some(bad) = embeddings.iter().position(|v| v.len() != dim) {
            return Err(Error::Index(format!(
                "embedding {} has dimension {}, expected {}",
                bad,
                embeddings[bad].len(),
                dim
            )));
        }
        let fingerprint = corpus::fingerprint(&documents);
        let entries = embeddings
            .into_iter()
            .zip(documents)
            .map(|(vector, document)| Entry { document, vector })
            .collect();
        Ok(Self { dim, built_at: Utc::now(), fingerprint, entries })
    }

    /// Ascending by distance; equal distances keep insertion order.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<RankedResult>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            return Err(Error::retrieval(
                "vector",
                format!("query dimension {} does not match index dimension {}", query.len(), self.dim),
            ));
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, squared_l2(query, &e.vector)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(pos, (i, distance))| RankedResult {
                document: self.entries[i].document.clone(),
                score: distance,
                rank: pos + 1,
                source: SourceKind::Vector,
            })
            .collect())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[async_trait]
impl VectorStore for FlatIndex {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<RankedResult>> {
        self.nearest(query_vector, k)
    }
}

/// Builds [`FlatIndex`] files. `dim` is used when the corpus is empty and
/// to validate every embedding otherwise.
#[derive(Debug, Clone)]
pub struct FlatIndexer {
    dim: usize,
}

impl FlatIndexer {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl VectorIndexer for FlatIndexer {
    fn build(
        &self,
        embeddings: Vec<Vec<f32>>,
        documents: Vec<Document>,
        path: &Path,
    ) -> Result<(Arc<dyn VectorStore>, Staged)> {
        let index = FlatIndex::new(self.dim, embeddings, documents)?;
        let staged = stage_json(&index, path)?;
        tracing::info!(path = %path.display(), vectors = index.entries.len(), dim = self.dim, "vector index staged");
        Ok((Arc::new(index), staged))
    }

    fn load(&self, path: &Path) -> Result<Arc<dyn VectorStore>> {
        let index: FlatIndex = read_json(path)?;
        if index.dim != self.dim {
            return Err(Error::Index(format!(
                "vector index at {} has dimension {}, configured {}",
                path.display(),
                index.dim,
                self.dim
            )));
        }
        if let Some(bad) = index.entries.iter().position(|e| e.vector.len() != index.dim) {
            return Err(Error::Index(format!("vector {} in {} has wrong dimension", bad, path.display())));
        }
        let documents: Vec<Document> = index.entries.iter().map(|e| e.document.clone()).collect();
        if corpus::fingerprint(&documents) != index.fingerprint {
            return Err(Error::Index(format!(
                "vector index at {} does not match its recorded corpus fingerprint",
                path.display()
            )));
        }
        tracing::info!(
            path = %path.display(),
            vectors = index.entries.len(),
            built_at = %index.built_at.to_rfc3339(),
            "vector index loaded"
        );
        Ok(Arc::new(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govqa_core::{DocId, DocKind, DocMetadata};

    fn doc(i: u32) -> Document {
        Document { id: DocId(i), text: format!("doc {i}"), metadata: DocMetadata::new(DocKind::Faq) }
    }

    #[test]
    fn nearest_orders_by_distance_then_position() {
        let index = FlatIndex::new(
            2,
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![0.6, 0.8]],
            (0..4).map(doc).collect(),
        )
        .unwrap();
        let hits = index.nearest(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<u32> = hits.iter().map(|h| h.document.id.0).collect();
        assert_eq!(ids, vec![0, 2, 3]);
        assert_eq!(hits[0].score, 0.0);
        assert_eq!(hits[2].rank, 3);
        assert!((hits[2].score - 0.8).abs() < 1e-6);
        assert!(hits.iter().all(|h| h.source == SourceKind::Vector));
    }

    #[test]
    fn dimension_mismatch_is_retrieval_error() {
        let index = FlatIndex::new(2, vec![vec![1.0, 0.0]], vec![doc(0)]).unwrap();
        assert!(matches!(index.nearest(&[1.0, 0.0, 0.0], 1), Err(Error::Retrieval { .. })));
    }

    #[test]
    fn misaligned_inputs_are_rejected() {
        assert!(matches!(FlatIndex::new(2, vec![vec![1.0, 0.0]], vec![]), Err(Error::Index(_))));
        assert!(matches!(FlatIndex::new(2, vec![vec![1.0]], vec![doc(0)]), Err(Error::Index(_))));
    }

    #[test]
    fn fingerprint_follows_documents() {
        let index = FlatIndex::new(2, vec![vec![1.0, 0.0]], vec![doc(0)]).unwrap();
        assert_eq!(index.fingerprint(), corpus::fingerprint(&[doc(0)]));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn empty_index_returns_nothing_for_any_query() {
        let index = FlatIndex::new(4, vec![], vec![]).unwrap();
        assert!(index.nearest(&[1.0], 5).unwrap().is_empty());
    }
}
