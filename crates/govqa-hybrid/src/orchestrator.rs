//! Per-question pipeline and index lifecycle.
//!
//! ```text
//! smalltalk? -> cache lookup -> vector search -> threshold/fallback
//!            -> fusion (hybrid) -> rerank -> truncate -> generate -> cache write
//! ```
//!
//! Queries read an immutable [`IndexSnapshot`] through an `Arc`; rebuild
//! builds a new one and swaps the pointer, so a search never sees a partly
//! written index.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use govqa_context::ContextClassifier;
use govqa_core::config::{FusionMethod, Settings};
use govqa_core::corpus::CorpusLoader;
use govqa_core::{
    preview, ChatMessage, ChatModel, DocKind, Document, Embedder, Error, FusedResult, Reranker,
    Result, TextStream, VectorIndexer, VectorStore,
};
use govqa_llm::{build_messages, APOLOGY};
use govqa_text::{SparseIndex, SparseIndexHandle};

use crate::cache::{generate_key, CacheStats, Clock, ResultCache};
use crate::fusion::fuse;
use crate::rerank::apply_rerank;
use crate::threshold::{vector_pool_size, ThresholdPolicy};

const SOURCES_SHOWN: usize = 3;
const UNTITLED: &str = "Không có tiêu đề";

/// Progress callback for rebuilds: `(embedded, total)`.
pub type Progress<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// Indexes a query runs against. Never mutated once published.
pub struct IndexSnapshot {
    pub generation: u64,
    pub vector: Arc<dyn VectorStore>,
    pub sparse: Option<Arc<SparseIndex>>,
}

/// What the cache stores per question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAnswer {
    pub answer: String,
    pub contexts: Vec<FusedResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub label: String,
    pub kind: DocKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Score of the last ranking stage that ran, higher is better.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub query: String,
    pub answer: String,
    pub contexts: Vec<FusedResult>,
    pub sources: Vec<Source>,
    pub use_history: bool,
    pub from_cache: bool,
}

/// Streaming counterpart of [`Answer`]: retrieval is finished, the text
/// arrives through `chunks`.
pub struct AnswerStream {
    pub query: String,
    pub contexts: Vec<FusedResult>,
    pub sources: Vec<Source>,
    pub use_history: bool,
    pub from_cache: bool,
    pub chunks: TextStream,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub vector_index_present: bool,
    pub sparse_index_present: bool,
    pub hybrid_enabled: bool,
    pub ready: bool,
    pub loaded: bool,
    pub generation: u64,
    pub documents: usize,
    pub rebuilding: bool,
    pub cache: CacheStats,
}

pub struct Orchestrator {
    settings: Settings,
    embedder: Arc<dyn Embedder>,
    indexer: Arc<dyn VectorIndexer>,
    chat: Arc<dyn ChatModel>,
    reranker: Option<Arc<dyn Reranker>>,
    classifier: ContextClassifier,
    cache: Arc<ResultCache<CachedAnswer>>,
    sparse: Arc<SparseIndexHandle>,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    generation: AtomicU64,
    rebuild_lock: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        indexer: Arc<dyn VectorIndexer>,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        let cache = Arc::new(ResultCache::from_config(&settings.cache));
        let sparse = Arc::new(SparseIndexHandle::new(settings.paths.sparse_index.clone()));
        Self {
            settings,
            embedder,
            indexer,
            chat,
            reranker: None,
            classifier: ContextClassifier::default(),
            cache,
            sparse,
            snapshot: RwLock::new(None),
            generation: AtomicU64::new(0),
            rebuild_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        let cache = &self.settings.cache;
        self.cache = Arc::new(ResultCache::with_clock(cache.max_size, cache.ttl_secs, clock));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &ResultCache<CachedAnswer> {
        &self.cache
    }

    pub fn sparse_handle(&self) -> &SparseIndexHandle {
        &self.sparse
    }

    fn current(&self) -> Option<Arc<IndexSnapshot>> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn publish(&self, vector: Arc<dyn VectorStore>, sparse: Option<Arc<SparseIndex>>) -> Arc<IndexSnapshot> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(IndexSnapshot { generation, vector, sparse });
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        self.cache.clear();
        tracing::info!(generation, documents = snapshot.vector.len(), "index snapshot published");
        snapshot
    }

    fn index_files_present(&self) -> (bool, bool) {
        (self.settings.paths.vector_index.exists(), self.settings.paths.sparse_index.exists())
    }

    pub fn is_ready(&self) -> bool {
        indexes_present(&self.settings)
    }

    pub fn status(&self) -> Status {
        let (vector_index_present, sparse_index_present) = self.index_files_present();
        let snapshot = self.current();
        Status {
            vector_index_present,
            sparse_index_present,
            hybrid_enabled: self.settings.hybrid.enabled,
            ready: self.is_ready(),
            loaded: snapshot.is_some(),
            generation: snapshot.as_ref().map_or(0, |s| s.generation),
            documents: snapshot.as_ref().map_or(0, |s| s.vector.len()),
            rebuilding: self.rebuild_lock.try_lock().is_err(),
            cache: self.cache.stats(),
        }
    }

    /// Returns the published snapshot, loading the persisted indexes (or
    /// rebuilding when a required file is missing or the two files describe
    /// different corpora) on first use.
    pub async fn ensure_ready(&self) -> Result<Arc<IndexSnapshot>> {
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }
        let _guard = self.rebuild_lock.lock().await;
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }

        if self.is_ready() {
            let (vector, sparse) = self.load_indexes().await?;
            match check_pair(vector.as_ref(), sparse.as_deref()) {
                Ok(()) => return Ok(self.publish(vector, sparse)),
                Err(e) => tracing::warn!(error = %e, "persisted indexes disagree, building from corpus"),
            }
        } else {
            tracing::info!("index files missing, building from corpus");
        }
        let documents = self.load_corpus().await?;
        self.build_locked(documents, None).await
    }

    async fn load_indexes(&self) -> Result<(Arc<dyn VectorStore>, Option<Arc<SparseIndex>>)> {
        let indexer = Arc::clone(&self.indexer);
        let handle = Arc::clone(&self.sparse);
        let vector_path = self.settings.paths.vector_index.clone();
        let hybrid = self.settings.hybrid.enabled;
        tokio::task::spawn_blocking(move || -> Result<(Arc<dyn VectorStore>, Option<Arc<SparseIndex>>)> {
            let vector = indexer.load(&vector_path)?;
            let sparse = if hybrid { Some(handle.get()?) } else { None };
            Ok((vector, sparse))
        })
        .await
        .map_err(|e| Error::Operation(format!("index load task failed: {}", e)))?
    }

    async fn load_corpus(&self) -> Result<Vec<Document>> {
        let loader = CorpusLoader::new(self.settings.paths.data_dir.clone());
        tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| Error::Operation(format!("corpus load task failed: {}", e)))?
    }

    /// Rebuilds both indexes from the configured data directory.
    pub async fn rebuild(&self) -> Result<Arc<IndexSnapshot>> {
        self.rebuild_with_progress(None).await
    }

    pub async fn rebuild_with_progress(&self, progress: Option<Progress<'_>>) -> Result<Arc<IndexSnapshot>> {
        let _guard = self.rebuild_lock.try_lock().map_err(|_| Error::RebuildInProgress)?;
        let documents = self.load_corpus().await?;
        self.build_locked(documents, progress).await
    }

    pub async fn rebuild_from(&self, documents: Vec<Document>) -> Result<Arc<IndexSnapshot>> {
        let _guard = self.rebuild_lock.try_lock().map_err(|_| Error::RebuildInProgress)?;
        self.build_locked(documents, None).await
    }

    /// Drops in-memory indexes and reads both files again.
    pub async fn reload(&self) -> Result<Arc<IndexSnapshot>> {
        let _guard = self.rebuild_lock.try_lock().map_err(|_| Error::RebuildInProgress)?;
        self.sparse.invalidate();
        let (vector, sparse) = self.load_indexes().await?;
        check_pair(vector.as_ref(), sparse.as_deref())?;
        Ok(self.publish(vector, sparse))
    }

    /// Caller holds `rebuild_lock`.
    async fn build_locked(
        &self,
        documents: Vec<Document>,
        progress: Option<Progress<'_>>,
    ) -> Result<Arc<IndexSnapshot>> {
        let total = documents.len();
        tracing::info!(documents = total, "rebuilding indexes");

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let batch_size = self.settings.embedding.batch_size.max(1);
        let mut embeddings = Vec::with_capacity(total);
        for batch in texts.chunks(batch_size) {
            let vectors = self.embedder.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            embeddings.extend(vectors);
            if let Some(report) = progress {
                report(embeddings.len(), total);
            }
        }

        let indexer = Arc::clone(&self.indexer);
        let vector_path = self.settings.paths.vector_index.clone();
        let sparse_path = self.settings.paths.sparse_index.clone();
        let (vector, sparse, staged) = tokio::task::spawn_blocking(move || -> Result<_> {
            let (vector, vector_file) = indexer.build(embeddings, documents.clone(), &vector_path)?;
            let sparse = SparseIndex::build(documents);
            let sparse_file = sparse.stage(&sparse_path)?;
            Ok((vector, Arc::new(sparse), [vector_file, sparse_file]))
        })
        .await
        .map_err(|e| Error::Operation(format!("index build task failed: {}", e)))??;

        // Both files are complete on disk before either replaces its
        // predecessor. A dropped rebuild drops the staged files uncommitted.
        for file in staged {
            let target = file.target().display().to_string();
            file.commit()?;
            tracing::debug!(path = %target, "index file committed");
        }

        self.sparse.replace(Arc::clone(&sparse));
        Ok(self.publish(vector, Some(sparse)))
    }

    /// Contexts for `query` at the configured `retrieval.top_k`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<FusedResult>> {
        self.retrieve_k(query, self.settings.retrieval.top_k).await
    }

    pub async fn retrieve_k(&self, query: &str, k: usize) -> Result<Vec<FusedResult>> {
        let snapshot = self.ensure_ready().await?;
        self.search(&snapshot, query, k).await
    }

    async fn search(&self, snapshot: &IndexSnapshot, query: &str, k: usize) -> Result<Vec<FusedResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let settings = &self.settings;
        let pool = vector_pool_size(k, &settings.rerank, self.reranker.is_some());

        let query_vector = self
            .embedder
            .embed_batch(&[query.to_lowercase()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("embedder returned no vector for the query".to_string()))?;
        let hits = snapshot.vector.search(&query_vector, pool).await?;
        let hits = ThresholdPolicy::from_config(&settings.retrieval).apply(hits);
        tracing::debug!(vector_hits = hits.len(), pool, "vector stage done");

        let mut results = match snapshot.sparse.as_deref() {
            Some(sparse) if settings.hybrid.enabled => {
                let lexical_k = pool.saturating_mul(settings.hybrid.bm25_retrieval_multiplier.max(1));
                let lexical = sparse.search(query, lexical_k);
                let fused = fuse(&settings.hybrid, &lexical, &hits, pool);
                tracing::debug!(lexical_hits = lexical.len(), fused = fused.len(), "hybrid fusion done");
                fused
            }
            _ => hits.into_iter().map(FusedResult::from_vector).collect(),
        };

        if let Some(reranker) = self.reranker.as_ref().filter(|_| settings.rerank.enabled) {
            results = apply_rerank(reranker.as_ref(), query, results, settings.rerank.top_k).await;
        }
        results.truncate(k);
        tracing::info!(query = %preview(query, 50), contexts = results.len(), "retrieval done");
        Ok(results)
    }

    fn validate_query<'q>(&self, query: &'q str) -> Result<&'q str> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidQuery("query is empty".to_string()));
        }
        let max = self.settings.chat.max_query_length;
        if query.chars().count() > max {
            return Err(Error::InvalidQuery(format!("query exceeds {} characters", max)));
        }
        Ok(query)
    }

    fn cache_key(&self, query: &str, generation: u64) -> Option<String> {
        if !self.settings.cache.enabled {
            return None;
        }
        let fusion = match self.settings.hybrid.fusion_method() {
            FusionMethod::Rrf => "rrf",
            FusionMethod::Weighted => "weighted",
        };
        let mut extra = BTreeMap::new();
        extra.insert("generation".to_string(), generation.to_string());
        extra.insert("hybrid".to_string(), self.settings.hybrid.enabled.to_string());
        extra.insert("fusion".to_string(), fusion.to_string());
        let reranking = self.settings.rerank.enabled && self.reranker.is_some();
        extra.insert("rerank".to_string(), reranking.to_string());
        Some(generate_key(query, self.settings.retrieval.top_k, &extra))
    }

    /// Everything before generation: validation, smalltalk and follow-up
    /// checks, cache lookup, retrieval and message assembly.
    async fn prepare(&self, query: &str, history: &[ChatMessage]) -> Result<Prepared> {
        let query = self.validate_query(query)?.to_string();
        let history = &history[history.len().saturating_sub(self.settings.chat.max_history)..];
        let chat = &self.settings.chat;
        let max_contexts = self.settings.retrieval.max_contexts_in_prompt;

        if self.classifier.is_smalltalk(&query) {
            tracing::info!(query = %preview(&query, 50), "smalltalk, skipping retrieval");
            let messages = build_messages(&query, &[], history, false, chat.context_window_messages, max_contexts);
            return Ok(Prepared::Generate { query, contexts: Vec::new(), use_history: false, key: None, messages });
        }

        let use_history = self.classifier.should_use_history(&query, history);
        let snapshot = self.ensure_ready().await?;
        let key = if use_history { None } else { self.cache_key(&query, snapshot.generation) };

        if let Some(cached) = key.as_deref().and_then(|k| self.cache.get(k)) {
            tracing::info!(query = %preview(&query, 50), "answer served from cache");
            return Ok(Prepared::Cached { query, cached });
        }

        let contexts = self.search(&snapshot, &query, self.settings.retrieval.top_k).await?;
        let docs: Vec<&Document> = contexts.iter().map(|c| &c.document).collect();
        let messages =
            build_messages(&query, &docs, history, use_history, chat.context_window_messages, max_contexts);
        Ok(Prepared::Generate { query, contexts, use_history, key, messages })
    }

    /// Answers `query` given prior turns. Retrieval failures are errors;
    /// generation failures produce the apology text and are not cached.
    pub async fn answer(&self, query: &str, history: &[ChatMessage]) -> Result<Answer> {
        let (query, contexts, use_history, key, messages) = match self.prepare(query, history).await? {
            Prepared::Cached { query, cached } => {
                return Ok(Answer {
                    query,
                    sources: sources(&cached.contexts),
                    answer: cached.answer,
                    contexts: cached.contexts,
                    use_history: false,
                    from_cache: true,
                });
            }
            Prepared::Generate { query, contexts, use_history, key, messages } => {
                (query, contexts, use_history, key, messages)
            }
        };

        let answer = match self.chat.generate(&messages).await {
            Ok(text) if !text.trim().is_empty() => {
                if let Some(key) = key {
                    self.cache.set(&key, CachedAnswer { answer: text.clone(), contexts: contexts.clone() });
                }
                text
            }
            Ok(_) => {
                tracing::warn!(query = %preview(&query, 50), "model returned an empty answer");
                APOLOGY.to_string()
            }
            Err(e) => {
                tracing::error!(error = %e, query = %preview(&query, 50), "answer generation failed");
                APOLOGY.to_string()
            }
        };

        Ok(Answer { sources: sources(&contexts), query, answer, contexts, use_history, from_cache: false })
    }

    /// Like [`answer`](Self::answer) but streams the text. The cache is
    /// written only once the stream has been read to a clean end.
    pub async fn answer_stream(&self, query: &str, history: &[ChatMessage]) -> Result<AnswerStream> {
        match self.prepare(query, history).await? {
            Prepared::Cached { query, cached } => {
                let CachedAnswer { answer, contexts } = cached;
                Ok(AnswerStream {
                    query,
                    sources: sources(&contexts),
                    contexts,
                    use_history: false,
                    from_cache: true,
                    chunks: stream::once(async move { Ok(answer) }).boxed(),
                })
            }
            Prepared::Generate { query, contexts, use_history, key, messages } => {
                let inner = match self.chat.generate_stream(&messages).await {
                    Ok(inner) => Some(inner),
                    Err(e) => {
                        tracing::error!(error = %e, query = %preview(&query, 50), "answer stream failed to start");
                        None
                    }
                };
                let sink = key.map(|key| CacheSink {
                    cache: Arc::clone(&self.cache),
                    key,
                    contexts: contexts.clone(),
                });
                Ok(AnswerStream {
                    query,
                    sources: sources(&contexts),
                    contexts,
                    use_history,
                    from_cache: false,
                    chunks: guarded_stream(inner, sink),
                })
            }
        }
    }
}

enum Prepared {
    Cached {
        query: String,
        cached: CachedAnswer,
    },
    Generate {
        query: String,
        contexts: Vec<FusedResult>,
        use_history: bool,
        key: Option<String>,
        messages: Vec<ChatMessage>,
    },
}

struct CacheSink {
    cache: Arc<ResultCache<CachedAnswer>>,
    key: String,
    contexts: Vec<FusedResult>,
}

struct StreamState {
    inner: Option<TextStream>,
    text: String,
    sink: Option<CacheSink>,
    done: bool,
}

/// Passes model chunks through, ending with the apology text if the model
/// fails or says nothing. A clean, non-empty completion is cached.
fn guarded_stream(inner: Option<TextStream>, sink: Option<CacheSink>) -> TextStream {
    let state = StreamState { inner, text: String::new(), sink, done: false };
    stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        let Some(inner) = st.inner.as_mut() else {
            st.done = true;
            return Some((Ok(APOLOGY.to_string()), st));
        };
        match inner.next().await {
            Some(Ok(chunk)) => {
                st.text.push_str(&chunk);
                Some((Ok(chunk), st))
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "answer stream failed");
                st.done = true;
                Some((Ok(APOLOGY.to_string()), st))
            }
            None => {
                st.done = true;
                if st.text.trim().is_empty() {
                    tracing::warn!("model stream ended without text");
                    return Some((Ok(APOLOGY.to_string()), st));
                }
                if let Some(sink) = st.sink.take() {
                    let answer = std::mem::take(&mut st.text);
                    sink.cache.set(&sink.key, CachedAnswer { answer, contexts: sink.contexts });
                }
                None
            }
        }
    })
    .boxed()
}

/// Labels for the first few contexts, as shown under an answer.
pub fn sources(contexts: &[FusedResult]) -> Vec<Source> {
    contexts
        .iter()
        .take(SOURCES_SHOWN)
        .enumerate()
        .map(|(i, c)| {
            let meta = &c.document.metadata;
            Source {
                label: format!("Nguồn {}", i + 1),
                kind: meta.kind,
                title: meta.title.clone().filter(|t| !t.is_empty()).unwrap_or_else(|| UNTITLED.to_string()),
                href: meta.href.clone(),
                score: c.ranking_score(),
            }
        })
        .collect()
}

/// Both indexes must come from the same corpus: fusion joins on `DocId`.
fn check_pair(vector: &dyn VectorStore, sparse: Option<&SparseIndex>) -> Result<()> {
    let Some(sparse) = sparse else {
        return Ok(());
    };
    if vector.fingerprint() != sparse.fingerprint() || vector.len() != sparse.len() {
        return Err(Error::Index(format!(
            "vector index ({} documents) and BM25 index ({} documents) were built from different corpora",
            vector.len(),
            sparse.len()
        )));
    }
    Ok(())
}

/// True when both index files required by `settings` exist.
pub fn indexes_present(settings: &Settings) -> bool {
    let paths = &settings.paths;
    paths.vector_index.exists() && (!settings.hybrid.enabled || paths.sparse_index.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use govqa_core::{DocId, DocMetadata};

    fn context(id: u32, title: Option<&str>) -> FusedResult {
        let mut metadata = DocMetadata::new(DocKind::Guide);
        metadata.title = title.map(str::to_string);
        FusedResult::new(Document { id: DocId(id), text: String::new(), metadata })
    }

    #[test]
    fn sources_label_first_three_contexts() {
        let mut contexts = vec![context(0, Some("Khai sinh")), context(1, None), context(2, Some("")), context(3, None)];
        contexts[0].rrf_score = Some(0.03);
        contexts[0].rerank_score = Some(0.8);
        contexts[1].distance = Some(0.4);
        let sources = sources(&contexts);
        assert_eq!(sources[0].score, Some(0.8));
        assert_eq!(sources[1].score, None);
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].label, "Nguồn 1");
        assert_eq!(sources[0].title, "Khai sinh");
        assert_eq!(sources[1].title, UNTITLED);
        assert_eq!(sources[2].title, UNTITLED);
    }

    #[tokio::test]
    async fn stream_without_model_yields_apology_once() {
        let chunks: Vec<String> = guarded_stream(None, None).map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec![APOLOGY.to_string()]);
    }

    #[tokio::test]
    async fn stream_error_appends_apology_and_skips_cache() {
        let cache = Arc::new(ResultCache::new(10, 60));
        let inner: TextStream = stream::iter(vec![
            Ok("Bước 1".to_string()),
            Err(Error::Generation("connection reset".to_string())),
            Ok("never".to_string()),
        ])
        .boxed();
        let sink = CacheSink { cache: Arc::clone(&cache), key: "k".to_string(), contexts: Vec::new() };

        let chunks: Vec<String> = guarded_stream(Some(inner), Some(sink)).map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec!["Bước 1".to_string(), APOLOGY.to_string()]);
        assert!(cache.is_empty());
    }
}
