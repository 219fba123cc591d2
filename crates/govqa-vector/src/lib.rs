//! govqa-vector
//!
//! Exact vector search persisted as a JSON file, behind the core
//! `VectorStore` / `VectorIndexer` traits.

pub mod flat;

pub use flat::{FlatIndex, FlatIndexer};
