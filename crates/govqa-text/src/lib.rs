//! govqa-text
//!
//! Sparse lexical retrieval: a Unicode tokenizer, an Okapi BM25 index with
//! JSON persistence, and a shared handle that loads the persisted index once.

pub mod bm25;
pub mod handle;
pub mod tokenize;

pub use bm25::{Bm25Params, SparseIndex};
pub use handle::SparseIndexHandle;
pub use tokenize::tokenize;
