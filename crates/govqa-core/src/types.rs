//! Domain types shared by the retrieval engines and the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable synthetic identity of a document within one corpus snapshot.
///
/// Assigned at ingestion as the document's position in the loaded corpus.
/// Fusion joins result lists on this id, never on the document text, so two
/// passages with identical text remain distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(pub u32);

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc:{}", self.0)
    }
}

/// Kind of knowledge-base entry a passage was rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocKind {
    Faq,
    Guide,
}

impl DocKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocKind::Faq => "faq",
            DocKind::Guide => "guide",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    #[serde(rename = "type")]
    pub kind: DocKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl DocMetadata {
    pub fn new(kind: DocKind) -> Self {
        Self { kind, title: None, href: None, category: None }
    }
}

/// An indexed passage. Immutable once indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub text: String,
    pub metadata: DocMetadata,
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Vector,
    Lexical,
}

/// One hit from a single retrieval source.
///
/// `score` is source-specific: a distance (lower is better) for
/// [`SourceKind::Vector`], a relevance score (higher is better) for
/// [`SourceKind::Lexical`]. `rank` is 1-based within its list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub document: Document,
    pub score: f32,
    pub rank: usize,
    pub source: SourceKind,
}

/// A document after fusion and, optionally, reranking.
///
/// Earlier stage scores are retained for observability; ordering is decided
/// by the most recently applied stage (see [`FusedResult::ranking_score`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub document: Document,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrf_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hybrid_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl FusedResult {
    pub fn new(document: Document) -> Self {
        Self { document, distance: None, rrf_score: None, hybrid_score: None, rerank_score: None }
    }

    /// Wraps a vector hit that bypassed fusion (hybrid mode off).
    pub fn from_vector(hit: RankedResult) -> Self {
        let distance = hit.score;
        Self { distance: Some(distance), ..Self::new(hit.document) }
    }

    /// Score of the authoritative stage, higher is better. `None` when only a
    /// raw vector distance is known.
    pub fn ranking_score(&self) -> Option<f32> {
        self.rerank_score.or(self.hybrid_score).or(self.rrf_score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A chat turn; used both for conversation history and model input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}
