//! In-memory document store for tests

use super::{DocumentStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Non-durable store backed by a map; used in tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, name: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let docs = self.docs.lock().expect("store mutex poisoned");
        Ok(docs.get(name).cloned())
    }

    async fn save(&self, name: &str, doc: &serde_json::Value) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().expect("store mutex poisoned");
        docs.insert(name.to_string(), doc.clone());
        Ok(())
    }
}
