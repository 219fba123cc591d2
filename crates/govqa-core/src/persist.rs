//! JSON persistence for index artifacts.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// A fully written and synced temp file waiting to be renamed onto its
/// target. Dropping it without [`Staged::commit`] removes the temp file and
/// leaves the target untouched.
#[derive(Debug)]
pub struct Staged {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl Staged {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn commit(self) -> Result<()> {
        self.tmp.persist(&self.target).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

/// Serializes `value` into a temp file in the directory of `path`, so the
/// later rename stays on one filesystem.
pub fn stage_json<T: Serialize>(value: &T, path: &Path) -> Result<Staged> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    Ok(Staged { tmp, target: path.to_path_buf() })
}

/// Readers see either the previous file or the complete new one.
pub fn write_json_atomic<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    stage_json(value, path)?.commit()
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = fs::File::open(path)
        .map_err(|e| Error::Index(format!("cannot open {}: {}", path.display(), e)))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::Index(format!("corrupt index file {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_replaces_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/index.json");
        write_json_atomic(&vec![1, 2, 3], &path).unwrap();
        write_json_atomic(&vec![4], &path).unwrap();
        let back: Vec<i32> = read_json(&path).unwrap();
        assert_eq!(back, vec![4]);
    }

    #[test]
    fn staged_file_appears_only_on_commit() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.json");
        write_json_atomic(&vec![1], &path).unwrap();

        let staged = stage_json(&vec![2], &path).unwrap();
        assert_eq!(staged.target(), path.as_path());
        assert_eq!(read_json::<Vec<i32>>(&path).unwrap(), vec![1]);
        staged.commit().unwrap();
        assert_eq!(read_json::<Vec<i32>>(&path).unwrap(), vec![2]);

        drop(stage_json(&vec![3], &path).unwrap());
        assert_eq!(read_json::<Vec<i32>>(&path).unwrap(), vec![2]);
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_file_is_index_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_json::<Vec<i32>>(&tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::Index(_)));
    }
}
