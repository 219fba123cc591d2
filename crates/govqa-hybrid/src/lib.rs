//! govqa-hybrid
//!
//! Composes the retrieval engines into the question-answering pipeline:
//! fusion, threshold fallback, reranking, the answer cache and the
//! [`Orchestrator`] that owns the index lifecycle.

pub mod cache;
pub mod fusion;
pub mod orchestrator;
pub mod rerank;
pub mod threshold;

pub use cache::{generate_key, CacheStats, Clock, ManualClock, ResultCache, SystemClock};
pub use fusion::{fuse, fuse_rrf, fuse_weighted, DEFAULT_RRF_K};
pub use orchestrator::{
    indexes_present, Answer, AnswerStream, CachedAnswer, IndexSnapshot, Orchestrator, Progress, Source,
    Status,
};
pub use rerank::{apply_rerank, TermOverlapReranker};
pub use threshold::{vector_pool_size, ThresholdPolicy};
