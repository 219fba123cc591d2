use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use govqa_core::Result;

use crate::bm25::SparseIndex;

/// Shared, lazily loaded reference to the sparse index persisted at `path`.
///
/// The first [`get`](Self::get) loads from disk; concurrent first callers
/// wait on the write lock and reuse that load. The rebuild path calls
/// [`replace`](Self::replace) or [`invalidate`](Self::invalidate) so stale
/// in-memory copies are never served after the file changes.
#[derive(Debug)]
pub struct SparseIndexHandle {
    path: PathBuf,
    slot: RwLock<Option<Arc<SparseIndex>>>,
}

impl SparseIndexHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), slot: RwLock::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Blocking: may read and deserialize the index file.
    pub fn get(&self) -> Result<Arc<SparseIndex>> {
        if let Some(index) = self.slot.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Arc::clone(index));
        }

        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = slot.as_ref() {
            return Ok(Arc::clone(index));
        }
        let index = Arc::new(SparseIndex::load(&self.path)?);
        *slot = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Drops the in-memory copy; the next `get` reloads from disk.
    pub fn invalidate(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::debug!(path = %self.path.display(), "sparse index handle invalidated");
    }

    pub fn reload(&self) -> Result<Arc<SparseIndex>> {
        let index = Arc::new(SparseIndex::load(&self.path)?);
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Installs a freshly built index that has already been saved to `path`.
    pub fn replace(&self, index: Arc<SparseIndex>) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(index);
    }
}
