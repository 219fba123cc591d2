use std::collections::HashSet;

use async_trait::async_trait;

use govqa_core::{Error, FusedResult, Reranker, Result};
use govqa_text::tokenize;

/// Reorders `candidates` with `reranker` and keeps the best `top_k`.
///
/// Never fails: if the reranker errors or returns an out-of-range index, the
/// incoming order truncated to `top_k` is returned. Candidates the reranker
/// did not score follow the scored ones in their incoming order.
pub async fn apply_rerank(
    reranker: &dyn Reranker,
    query: &str,
    candidates: Vec<FusedResult>,
    top_k: usize,
) -> Vec<FusedResult> {
    if candidates.is_empty() {
        return candidates;
    }
    let texts: Vec<String> = candidates.iter().map(|c| c.document.text.clone()).collect();

    let scored = match reranker.rerank(query, &texts).await {
        Ok(scored) => scored,
        Err(e) => return fail_open(candidates, top_k, &e),
    };
    if let Some(&(bad, _)) = scored.iter().find(|(i, _)| *i >= candidates.len()) {
        let e = Error::Rerank(format!("index {} out of range for {} candidates", bad, candidates.len()));
        return fail_open(candidates, top_k, &e);
    }

    let mut order: Vec<(usize, f32)> = Vec::with_capacity(scored.len());
    let mut seen = HashSet::new();
    for (i, score) in scored {
        if seen.insert(i) {
            order.push((i, score));
        }
    }
    order.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut slots: Vec<Option<FusedResult>> = candidates.into_iter().map(Some).collect();
    let mut reranked = Vec::with_capacity(slots.len());
    for (i, score) in order {
        if let Some(mut result) = slots[i].take() {
            result.rerank_score = Some(score);
            reranked.push(result);
        }
    }
    reranked.extend(slots.into_iter().flatten());
    reranked.truncate(top_k);

    tracing::debug!(kept = reranked.len(), "reranked candidates");
    reranked
}

fn fail_open(mut candidates: Vec<FusedResult>, top_k: usize, error: &Error) -> Vec<FusedResult> {
    tracing::warn!(error = %error, "reranking failed, keeping retrieval order");
    candidates.truncate(top_k);
    candidates
}

/// Offline reranker: the share of distinct query tokens found in each
/// candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TermOverlapReranker;

#[async_trait]
impl Reranker for TermOverlapReranker {
    async fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<(usize, f32)>> {
        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        if query_terms.is_empty() {
            return Ok(candidates.iter().enumerate().map(|(i, _)| (i, 0.0)).collect());
        }
        Ok(candidates
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let terms: HashSet<String> = tokenize(text).into_iter().collect();
                let hits = query_terms.intersection(&terms).count();
                (i, hits as f32 / query_terms.len() as f32)
            })
            .collect())
    }
}
