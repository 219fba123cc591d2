use govqa_core::config::{RerankConfig, RetrievalConfig};
use govqa_core::RankedResult;

/// Distance cut-off with a never-empty fallback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    pub threshold: f32,
    pub fallback_k: usize,
}

impl ThresholdPolicy {
    pub fn from_config(retrieval: &RetrievalConfig) -> Self {
        Self { threshold: retrieval.similarity_threshold, fallback_k: retrieval.fallback_k }
    }

    /// Keeps candidates with distance strictly below the threshold. When none
    /// pass, returns the `fallback_k` closest candidates instead, so the
    /// result is empty only when `candidates` is.
    pub fn apply(&self, mut candidates: Vec<RankedResult>) -> Vec<RankedResult> {
        let total = candidates.len();
        let passing: Vec<RankedResult> =
            candidates.iter().filter(|c| c.score < self.threshold).cloned().collect();
        if !passing.is_empty() {
            tracing::debug!(kept = passing.len(), total, threshold = self.threshold, "threshold filter");
            return passing;
        }

        candidates.sort_by(|a, b| a.score.total_cmp(&b.score));
        candidates.truncate(self.fallback_k);
        if total > 0 {
            tracing::info!(
                returned = candidates.len(),
                total,
                threshold = self.threshold,
                "no candidate under threshold, falling back to closest"
            );
        }
        candidates
    }
}

/// Vector candidates to request: a larger pool only when a reranker is
/// installed and enabled to refine it.
pub fn vector_pool_size(k: usize, rerank: &RerankConfig, has_reranker: bool) -> usize {
    if rerank.enabled && has_reranker {
        k.saturating_mul(rerank.retrieval_multiplier.max(1))
    } else {
        k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govqa_core::{DocId, DocKind, DocMetadata, Document, SourceKind};

    fn candidates(distances: &[f32]) -> Vec<RankedResult> {
        distances
            .iter()
            .enumerate()
            .map(|(i, &d)| RankedResult {
                document: Document {
                    id: DocId(i as u32),
                    text: String::new(),
                    metadata: DocMetadata::new(DocKind::Guide),
                },
                score: d,
                rank: i + 1,
                source: SourceKind::Vector,
            })
            .collect()
    }

    const POLICY: ThresholdPolicy = ThresholdPolicy { threshold: 1.2, fallback_k: 3 };

    #[test]
    fn keeps_only_candidates_below_threshold() {
        let kept = POLICY.apply(candidates(&[0.4, 1.19, 1.2, 1.5]));
        let ids: Vec<u32> = kept.iter().map(|c| c.document.id.0).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn falls_back_when_nothing_passes() {
        let kept = POLICY.apply(candidates(&[1.2, 1.3, 1.25, 1.9, 2.0]));
        assert_eq!(kept.len(), 3);
        let ids: Vec<u32> = kept.iter().map(|c| c.document.id.0).collect();
        assert_eq!(ids, vec![0, 2, 1]);
    }

    #[test]
    fn fallback_is_capped_by_available() {
        assert_eq!(POLICY.apply(candidates(&[1.4, 1.6])).len(), 2);
        assert!(POLICY.apply(Vec::new()).is_empty());
    }

    #[test]
    fn pool_grows_only_with_reranking() {
        let mut rerank = RerankConfig::default();
        assert_eq!(vector_pool_size(10, &rerank, true), 30);
        assert_eq!(vector_pool_size(10, &rerank, false), 10);
        rerank.enabled = false;
        assert_eq!(vector_pool_size(10, &rerank, true), 10);
    }
}
