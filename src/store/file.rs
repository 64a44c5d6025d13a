//! Filesystem-backed document store

use super::{DocumentStore, StoreError};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

/// Stores each document as `<dir>/<name>.json`
///
/// Writes go through a temporary file and a rename so a crash mid-write
/// never leaves a truncated document behind.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn load(&self, name: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let path = self.path_for(name);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let doc = serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            name: name.to_string(),
            source,
        })?;
        Ok(Some(doc))
    }

    async fn save(&self, name: &str, doc: &serde_json::Value) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(name);
        let tmp = self.dir.join(format!("{name}.json.tmp"));
        let bytes = serde_json::to_vec_pretty(doc).expect("document serialization is infallible");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
