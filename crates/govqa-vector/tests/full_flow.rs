use std::fs;

use tempfile::TempDir;

use govqa_core::{DocId, DocKind, DocMetadata, Document, Embedder, Error, VectorIndexer};
use govqa_embed::HashingEmbedder;
use govqa_vector::FlatIndexer;

fn docs(texts: &[&str]) -> Vec<Document> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| Document {
            id: DocId(i as u32),
            text: (*t).to_string(),
            metadata: DocMetadata::new(DocKind::Faq),
        })
        .collect()
}

#[tokio::test]
async fn build_persist_load_and_search() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("embeddings/vector_index.json");
    let embedder = HashingEmbedder::new(128).unwrap();
    let corpus = docs(&[
        "Thủ tục cấp đổi giấy phép lái xe",
        "Đăng ký thường trú cho công dân",
        "Cấp lại giấy phép lái xe bị mất",
    ]);
    let texts: Vec<String> = corpus.iter().map(|d| d.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts).await.unwrap();

    let indexer = FlatIndexer::new(128);
    let (built, staged) = indexer.build(vectors, corpus, &path).expect("build");
    assert_eq!(built.len(), 3);
    assert!(!path.exists());
    staged.commit().expect("commit");
    assert!(path.exists());

    let loaded = indexer.load(&path).expect("load");
    assert_eq!(loaded.fingerprint(), built.fingerprint());
    let query = embedder.embed_batch(&["giấy phép lái xe".to_string()]).await.unwrap().remove(0);
    let hits = loaded.search(&query, 3).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert_ne!(hits[0].document.id, DocId(1));
    assert!(hits.windows(2).all(|w| w[0].score <= w[1].score));
}

#[test]
fn load_with_wrong_dimension_fails() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("v.json");
    FlatIndexer::new(2).build(vec![vec![0.0, 1.0]], docs(&["a b"]), &path).unwrap().1.commit().unwrap();
    assert!(matches!(FlatIndexer::new(3).load(&path), Err(Error::Index(_))));
}

#[test]
fn edited_documents_fail_the_fingerprint_check() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("v.json");
    FlatIndexer::new(2).build(vec![vec![0.0, 1.0]], docs(&["hộ chiếu"]), &path).unwrap().1.commit().unwrap();

    let raw = fs::read_to_string(&path).unwrap().replace("hộ chiếu", "giấy phép");
    fs::write(&path, raw).unwrap();
    assert!(matches!(FlatIndexer::new(2).load(&path), Err(Error::Index(_))));
}

#[test]
fn load_missing_file_fails() {
    let tmp = TempDir::new().unwrap();
    assert!(FlatIndexer::new(2).load(&tmp.path().join("absent.json")).is_err());
}
