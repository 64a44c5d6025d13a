//! Higher-timeframe market regime
//!
//! A slower signal class marks each symbol as consolidating or trending.
//! The flag gates new entries and has no expiry: last write wins until
//! the next higher-timeframe alert overwrites it.

use crate::store::{DocumentStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Document name in the backing store
const REGIME_DOC: &str = "regimes";

/// Coarse market-state classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    /// Range-bound; most entries are gated off
    Consolidating,
    /// Directional; entries admitted
    Trending,
}

/// Last-known regime per symbol, persisted across restarts
pub struct RegimeTracker {
    regimes: RwLock<HashMap<String, Regime>>,
    store: Arc<dyn DocumentStore>,
}

impl RegimeTracker {
    /// Load the regime map from durable storage
    pub async fn load(store: Arc<dyn DocumentStore>) -> Result<Self, StoreError> {
        let regimes = match store.load(REGIME_DOC).await? {
            Some(doc) => serde_json::from_value(doc).map_err(|source| StoreError::Corrupt {
                name: REGIME_DOC.to_string(),
                source,
            })?,
            None => HashMap::new(),
        };

        Ok(Self {
            regimes: RwLock::new(regimes),
            store,
        })
    }

    /// Current regime for a symbol; unknown symbols default to trending
    pub async fn get(&self, symbol: &str) -> Regime {
        let regimes = self.regimes.read().await;
        regimes.get(symbol).copied().unwrap_or(Regime::Trending)
    }

    /// Overwrite a symbol's regime and persist
    pub async fn set(&self, symbol: &str, regime: Regime) {
        {
            let mut regimes = self.regimes.write().await;
            regimes.insert(symbol.to_string(), regime);
        }
        tracing::info!(symbol, ?regime, "Regime updated");

        let doc = {
            let regimes = self.regimes.read().await;
            serde_json::to_value(&*regimes).expect("regime serialization is infallible")
        };
        if let Err(e) = self.store.save(REGIME_DOC, &doc).await {
            metrics::counter!("capguard_persist_failures_total").increment(1);
            tracing::warn!(error = %e, "Regime persist failed; continuing with in-memory state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_unknown_symbol_defaults_to_trending() {
        let tracker = RegimeTracker::load(Arc::new(MemoryStore::new())).await.unwrap();
        assert_eq!(tracker.get("EURUSD").await, Regime::Trending);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let tracker = RegimeTracker::load(Arc::new(MemoryStore::new())).await.unwrap();
        tracker.set("USDMXN", Regime::Consolidating).await;
        tracker.set("USDMXN", Regime::Trending).await;
        assert_eq!(tracker.get("USDMXN").await, Regime::Trending);
    }

    #[tokio::test]
    async fn test_survives_reload() {
        let store = Arc::new(MemoryStore::new());
        {
            let tracker = RegimeTracker::load(store.clone()).await.unwrap();
            tracker.set("USDMXN", Regime::Consolidating).await;
        }
        let reloaded = RegimeTracker::load(store).await.unwrap();
        assert_eq!(reloaded.get("USDMXN").await, Regime::Consolidating);
    }
}
