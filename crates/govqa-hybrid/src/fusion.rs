//! Merging lexical and vector result lists into one ordering.
//!
//! Both strategies join on [`DocId`], are deterministic for identical input,
//! and break score ties by the order documents first appear across the input
//! lists (lexical list first).

use std::collections::HashMap;

use govqa_core::config::{FusionMethod, HybridConfig};
use govqa_core::{DocId, FusedResult, RankedResult, SourceKind};

pub const DEFAULT_RRF_K: f32 = 60.0;

/// Collects documents in first-appearance order with an accumulated score.
struct Accumulator {
    slots: HashMap<DocId, usize>,
    fused: Vec<(FusedResult, f32)>,
}

impl Accumulator {
    fn new() -> Self {
        Self { slots: HashMap::new(), fused: Vec::new() }
    }

    fn add(&mut self, hit: &RankedResult, contribution: f32, distance: Option<f32>) {
        let slot = match self.slots.get(&hit.document.id) {
            Some(&slot) => slot,
            None => {
                self.fused.push((FusedResult::new(hit.document.clone()), 0.0));
                self.slots.insert(hit.document.id, self.fused.len() - 1);
                self.fused.len() - 1
            }
        };
        let (result, score) = &mut self.fused[slot];
        *score += contribution;
        if distance.is_some() {
            result.distance = distance;
        }
    }

    /// Stable sort, so equal scores keep first-appearance order.
    fn into_sorted(mut self, top_k: usize) -> Vec<(FusedResult, f32)> {
        self.fused.sort_by(|a, b| b.1.total_cmp(&a.1));
        self.fused.truncate(top_k);
        self.fused
    }
}

/// Reciprocal rank fusion: each list adds `1 / (k + rank)` per document,
/// with 1-based rank taken from list position.
pub fn fuse_rrf(lists: &[&[RankedResult]], k: f32, top_k: usize) -> Vec<FusedResult> {
    let mut acc = Accumulator::new();
    for list in lists {
        for (pos, hit) in list.iter().enumerate() {
            let distance = (hit.source == SourceKind::Vector).then_some(hit.score);
            acc.add(hit, 1.0 / (k + (pos + 1) as f32), distance);
        }
    }
    acc.into_sorted(top_k)
        .into_iter()
        .map(|(mut result, score)| {
            result.rrf_score = Some(score);
            result
        })
        .collect()
}

/// Min-max normalization into [0, 1]; a constant list maps to all 1.0.
pub fn normalize(scores: &[f32]) -> Vec<f32> {
    let Some(min) = scores.iter().copied().reduce(f32::min) else {
        return Vec::new();
    };
    let max = scores.iter().copied().fold(min, f32::max);
    if max == min {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

/// Weighted score fusion over the union of both lists.
///
/// Lexical scores contribute `bm25_weight * norm`; vector distances, where
/// lower is better, contribute `vector_weight * (1 - norm)`.
pub fn fuse_weighted(
    lexical: &[RankedResult],
    vector: &[RankedResult],
    bm25_weight: f32,
    vector_weight: f32,
    top_k: usize,
) -> Vec<FusedResult> {
    let mut acc = Accumulator::new();

    let lexical_norm = normalize(&lexical.iter().map(|h| h.score).collect::<Vec<_>>());
    for (hit, norm) in lexical.iter().zip(lexical_norm) {
        acc.add(hit, bm25_weight * norm, None);
    }

    let vector_norm = normalize(&vector.iter().map(|h| h.score).collect::<Vec<_>>());
    for (hit, norm) in vector.iter().zip(vector_norm) {
        acc.add(hit, vector_weight * (1.0 - norm), Some(hit.score));
    }

    acc.into_sorted(top_k)
        .into_iter()
        .map(|(mut result, score)| {
            result.hybrid_score = Some(score);
            result
        })
        .collect()
}

/// Fuses with the configured strategy. Lexical results go first.
pub fn fuse(
    config: &HybridConfig,
    lexical: &[RankedResult],
    vector: &[RankedResult],
    top_k: usize,
) -> Vec<FusedResult> {
    match config.fusion_method() {
        FusionMethod::Rrf => fuse_rrf(&[lexical, vector], config.rrf_k, top_k),
        FusionMethod::Weighted => {
            fuse_weighted(lexical, vector, config.bm25_weight, config.vector_weight, top_k)
        }
    }
}
