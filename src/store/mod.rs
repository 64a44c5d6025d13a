//! Durable document storage
//!
//! The ledger and the regime map are persisted as whole JSON documents,
//! read and written by a fixed name. Storage is a thin external
//! collaborator: the engine never partially updates a document.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Document exists but could not be decoded
    #[error("corrupt document '{name}': {source}")]
    Corrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Whole-document blob store
///
/// `load` returns `None` when the document has never been written.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document by name
    async fn load(&self, name: &str) -> Result<Option<serde_json::Value>, StoreError>;
    /// Write (replace) a document by name
    async fn save(&self, name: &str, doc: &serde_json::Value) -> Result<(), StoreError>;
}
