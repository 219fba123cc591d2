//! Loads the knowledge base from JSON files into indexed [`Document`]s.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::types::{DocId, DocKind, DocMetadata, Document};

#[derive(Debug, Clone, Deserialize)]
pub struct FaqItem {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub href: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuideItem {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub href: String,
}

pub fn render_faq(item: &FaqItem) -> String {
    format!("Câu hỏi: {}\nTrả lời: {}\nĐường dẫn: {}", item.question, item.answer, item.href)
}

pub fn render_guide(item: &GuideItem) -> String {
    format!("Tiêu đề: {}\nNội dung: {}\nĐường dẫn: {}", item.title, item.content, item.href)
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

pub struct CorpusLoader {
    data_dir: PathBuf,
}

impl CorpusLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Reads every `faq*.json` and `guide*.json` file in path order.
    /// `DocId`s are assigned by position in the returned corpus.
    pub fn load(&self) -> Result<Vec<Document>> {
        if !self.data_dir.is_dir() {
            return Err(Error::NotFound(format!("data directory {}", self.data_dir.display())));
        }

        let mut documents = Vec::new();
        for path in self.list_json_files() {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let before = documents.len();
            if stem.starts_with("faq") {
                let items: Vec<FaqItem> = read_json(&path)?;
                for item in items {
                    let mut metadata = DocMetadata::new(DocKind::Faq);
                    metadata.title = non_empty(&item.question);
                    metadata.href = non_empty(&item.href);
                    push(&mut documents, render_faq(&item), metadata)?;
                }
            } else if stem.starts_with("guide") {
                let items: Vec<GuideItem> = read_json(&path)?;
                for item in items {
                    let mut metadata = DocMetadata::new(DocKind::Guide);
                    metadata.title = non_empty(&item.title);
                    metadata.href = non_empty(&item.href);
                    push(&mut documents, render_guide(&item), metadata)?;
                }
            } else {
                tracing::warn!(path = %path.display(), "skipping file with unknown corpus kind");
                continue;
            }
            tracing::debug!(path = %path.display(), documents = documents.len() - before, "loaded corpus file");
        }

        tracing::info!(documents = documents.len(), dir = %self.data_dir.display(), "corpus loaded");
        Ok(documents)
    }

    fn list_json_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.data_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
            .collect();
        files.sort();
        files
    }
}

fn push(documents: &mut Vec<Document>, text: String, metadata: DocMetadata) -> Result<()> {
    let id = next_id(documents.len())?;
    documents.push(Document { id, text, metadata });
    Ok(())
}

fn next_id(position: usize) -> Result<DocId> {
    u32::try_from(position)
        .map(DocId)
        .map_err(|_| Error::Corpus(format!("corpus exceeds {} documents", u32::MAX)))
}

/// BLAKE3 digest over every document id and text, in order. Both index
/// files record it so a vector/BM25 pair built from different corpora is
/// detected on load.
pub fn fingerprint(documents: &[Document]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(documents.len() as u64).to_le_bytes());
    for doc in documents {
        hasher.update(&doc.id.0.to_le_bytes());
        hasher.update(&(doc.text.len() as u64).to_le_bytes());
        hasher.update(doc.text.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| Error::Index(format!("failed to parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(i: u32, text: &str) -> Document {
        Document { id: DocId(i), text: text.to_string(), metadata: DocMetadata::new(DocKind::Faq) }
    }

    #[test]
    fn ids_beyond_u32_are_a_corpus_error() {
        assert_eq!(next_id(7).unwrap(), DocId(7));
        assert_eq!(next_id(u32::MAX as usize).unwrap(), DocId(u32::MAX));
        if let Ok(too_many) = usize::try_from(u64::from(u32::MAX) + 1) {
            assert!(matches!(next_id(too_many), Err(Error::Corpus(_))));
        }
    }

    #[test]
    fn fingerprint_tracks_ids_and_text() {
        let base = vec![doc(0, "hộ chiếu"), doc(1, "căn cước")];
        assert_eq!(fingerprint(&base), fingerprint(&base.clone()));
        assert_ne!(fingerprint(&base), fingerprint(&base[..1]));
        assert_ne!(fingerprint(&base), fingerprint(&[doc(0, "hộ chiếu"), doc(1, "căn cước công dân")]));
        assert_ne!(fingerprint(&base), fingerprint(&[doc(1, "hộ chiếu"), doc(0, "căn cước")]));
        // Boundaries between texts are part of the digest.
        assert_ne!(fingerprint(&[doc(0, "ab"), doc(1, "c")]), fingerprint(&[doc(0, "a"), doc(1, "bc")]));
    }
}
