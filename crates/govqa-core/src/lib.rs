#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod corpus;
pub mod error;
pub mod persist;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{ChatModel, Embedder, Reranker, TextStream, VectorIndexer, VectorStore};
pub use types::{
    ChatMessage, DocId, DocKind, DocMetadata, Document, FusedResult, RankedResult, Role,
    SourceKind,
};

/// Truncates `text` to at most `max` characters for log output.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
