//! Contracts for the external collaborators the retrieval core consumes.
//!
//! Every async method here is a suspension point: dropping the calling
//! future cancels the request.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::Result;
use crate::persist::Staged;
use crate::types::{ChatMessage, Document, RankedResult};

/// Maps text to fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Nearest-neighbour search over document vectors.
///
/// Results carry the distance as `score` (lower is more similar), ordered
/// ascending, with 1-based ranks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn len(&self) -> usize;

    /// [`crate::corpus::fingerprint`] of the documents the store was built from.
    fn fingerprint(&self) -> &str;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<RankedResult>>;
}

/// Builds, persists and loads a [`VectorStore`] by path.
pub trait VectorIndexer: Send + Sync {
    /// Build a store from aligned `embeddings` and `documents` and stage its
    /// file for `path`. Nothing is replaced until the caller commits.
    fn build(
        &self,
        embeddings: Vec<Vec<f32>>,
        documents: Vec<Document>,
        path: &Path,
    ) -> Result<(Arc<dyn VectorStore>, Staged)>;

    fn load(&self, path: &Path) -> Result<Arc<dyn VectorStore>>;
}

/// Second-pass relevance scoring over retrieved candidates.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Returns `(candidate index, score)` pairs, higher score is more relevant.
    async fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<(usize, f32)>>;
}

pub type TextStream = BoxStream<'static, Result<String>>;

/// Generative language model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Streams the completion as text chunks. Defaults to a single chunk
    /// holding the full [`ChatModel::generate`] output.
    async fn generate_stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let text = self.generate(messages).await?;
        Ok(futures::stream::once(async move { Ok(text) }).boxed())
    }
}
