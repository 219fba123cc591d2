use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Retrieval backend '{backend}' failed: {message}")]
    Retrieval { backend: String, message: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Reranking failed: {0}")]
    Rerank(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Index rebuild already in progress")]
    RebuildInProgress,

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl Error {
    pub fn retrieval(backend: impl Into<String>, message: impl Display) -> Self {
        Error::Retrieval { backend: backend.into(), message: message.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
