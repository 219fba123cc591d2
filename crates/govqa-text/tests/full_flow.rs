use std::fs;
use std::sync::Arc;
use std::thread;

use govqa_core::{DocId, DocKind, DocMetadata, Document, Error};
use govqa_text::{SparseIndex, SparseIndexHandle};
use tempfile::TempDir;

fn corpus(texts: &[&str]) -> Vec<Document> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let mut metadata = DocMetadata::new(DocKind::Guide);
            metadata.title = Some(format!("title {i}"));
            Document { id: DocId(i as u32), text: (*t).to_string(), metadata }
        })
        .collect()
}

#[test]
fn save_load_round_trip_preserves_alignment_and_scores() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("embeddings/bm25_index.json");
    let index = SparseIndex::build(corpus(&[
        "Cấp lại căn cước công dân",
        "Đăng ký khai sinh cho trẻ",
        "Gia hạn hộ chiếu phổ thông",
    ]));
    index.save(&path).expect("save");

    let loaded = SparseIndex::load(&path).expect("load");
    assert_eq!(loaded.len(), 3);
    for (i, doc) in loaded.documents().iter().enumerate() {
        assert_eq!(doc, &index.documents()[i]);
        assert_eq!(loaded.tokens(i), index.tokens(i));
    }

    let before = index.search("hộ chiếu", 3);
    let after = loaded.search("hộ chiếu", 3);
    assert_eq!(after[0].document.id, DocId(2));
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.document.id, b.document.id);
        assert!((a.score - b.score).abs() < 1e-5);
    }
}

#[test]
fn corrupt_file_is_index_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bm25.json");
    fs::write(&path, "{\"documents\": 3}").unwrap();
    assert!(matches!(SparseIndex::load(&path), Err(Error::Index(_))));
}

#[test]
fn fingerprint_survives_save_and_rejects_edited_documents() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bm25.json");
    let docs = corpus(&["Cấp lại căn cước công dân", "Gia hạn hộ chiếu phổ thông"]);
    let index = SparseIndex::build(docs.clone());
    assert_eq!(index.fingerprint(), govqa_core::corpus::fingerprint(&docs));

    let staged = index.stage(&path).unwrap();
    assert!(!path.exists());
    staged.commit().unwrap();
    assert_eq!(SparseIndex::load(&path).unwrap().fingerprint(), index.fingerprint());

    let raw = fs::read_to_string(&path).unwrap().replace("Gia hạn hộ chiếu", "Đổi giấy phép");
    fs::write(&path, raw).unwrap();
    assert!(matches!(SparseIndex::load(&path), Err(Error::Index(_))));
}

#[test]
fn handle_loads_once_and_shares_the_instance() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bm25.json");
    SparseIndex::build(corpus(&["một hai ba", "bốn năm sáu"])).save(&path).unwrap();

    let handle = Arc::new(SparseIndexHandle::new(&path));
    assert!(!handle.is_loaded());

    let loaded: Vec<_> = (0..8)
        .map(|_| {
            let h = Arc::clone(&handle);
            thread::spawn(move || h.get().expect("get"))
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|t| t.join().unwrap())
        .collect();
    for other in &loaded[1..] {
        assert!(Arc::ptr_eq(&loaded[0], other));
    }

    // Cached: deleting the file does not affect a loaded handle.
    fs::remove_file(&path).unwrap();
    assert_eq!(handle.get().unwrap().len(), 2);
}

#[test]
fn invalidate_picks_up_rebuilt_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bm25.json");
    SparseIndex::build(corpus(&["cũ"])).save(&path).unwrap();

    let handle = SparseIndexHandle::new(&path);
    assert_eq!(handle.get().unwrap().len(), 1);

    SparseIndex::build(corpus(&["mới một", "mới hai", "mới ba"])).save(&path).unwrap();
    assert_eq!(handle.get().unwrap().len(), 1, "still the cached copy");

    handle.invalidate();
    assert_eq!(handle.get().unwrap().len(), 3);

    SparseIndex::build(corpus(&["lần nữa"])).save(&path).unwrap();
    assert_eq!(handle.reload().unwrap().len(), 1);
}

#[test]
fn replace_installs_without_disk_read() {
    let tmp = TempDir::new().unwrap();
    let handle = SparseIndexHandle::new(tmp.path().join("never-written.json"));
    assert!(matches!(handle.get(), Err(Error::Index(_))));

    let fresh = Arc::new(SparseIndex::build(corpus(&["thẻ bảo hiểm y tế"])));
    handle.replace(Arc::clone(&fresh));
    assert!(Arc::ptr_eq(&handle.get().unwrap(), &fresh));
}
