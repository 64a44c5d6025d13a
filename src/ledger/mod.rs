//! Position ledger
//!
//! The local mirror of open positions, at most one per symbol. Every
//! mutation persists the whole ledger document; on process start the
//! ledger is reloaded before any trading decision is made.

mod position;

pub use position::{Direction, Position, StrategySource};

use crate::store::{DocumentStore, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedMutexGuard, RwLock};

/// Document name in the backing store
const LEDGER_DOC: &str = "positions";

/// Lock-guarded map of symbol to open position
///
/// Two execution contexts touch the ledger: webhook signal handling and
/// the reconciliation loop. Both must hold the symbol's lock across
/// their whole read-broker-write sequence, via [`PositionLedger::lock_symbol`].
pub struct PositionLedger {
    positions: RwLock<HashMap<String, Position>>,
    symbol_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    store: Arc<dyn DocumentStore>,
}

impl PositionLedger {
    /// Load the ledger from durable storage
    pub async fn load(store: Arc<dyn DocumentStore>) -> Result<Self, StoreError> {
        let positions = match store.load(LEDGER_DOC).await? {
            Some(doc) => serde_json::from_value(doc).map_err(|source| StoreError::Corrupt {
                name: LEDGER_DOC.to_string(),
                source,
            })?,
            None => HashMap::new(),
        };

        tracing::info!(count = positions.len(), "Loaded position ledger");

        Ok(Self {
            positions: RwLock::new(positions),
            symbol_locks: Mutex::new(HashMap::new()),
            store,
        })
    }

    /// Acquire the per-symbol critical section
    ///
    /// Held across "read ledger, call broker, write ledger" so a signal
    /// and a reconciliation cycle for the same symbol never interleave.
    pub async fn lock_symbol(&self, symbol: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.symbol_locks.lock().expect("symbol lock map poisoned");
            locks
                .entry(symbol.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Get the open position for a symbol, if any
    pub async fn get(&self, symbol: &str) -> Option<Position> {
        let positions = self.positions.read().await;
        positions.get(symbol).cloned()
    }

    /// Insert or replace the position for its symbol and persist
    pub async fn put(&self, position: Position) {
        {
            let mut positions = self.positions.write().await;
            positions.insert(position.symbol.clone(), position);
        }
        self.persist().await;
    }

    /// Remove a symbol's position and persist; returns the removed entry
    pub async fn remove(&self, symbol: &str) -> Option<Position> {
        let removed = {
            let mut positions = self.positions.write().await;
            positions.remove(symbol)
        };
        if removed.is_some() {
            self.persist().await;
        }
        removed
    }

    /// Snapshot of all open positions
    pub async fn all(&self) -> Vec<Position> {
        let positions = self.positions.read().await;
        positions.values().cloned().collect()
    }

    /// Number of open positions
    pub async fn len(&self) -> usize {
        let positions = self.positions.read().await;
        positions.len()
    }

    /// True when no positions are open
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Write the whole ledger document
    ///
    /// A failed write is a warning, not an abort: the in-memory state
    /// stays authoritative until the next successful persist.
    async fn persist(&self) {
        let doc = {
            let positions = self.positions.read().await;
            serde_json::to_value(&*positions).expect("ledger serialization is infallible")
        };
        if let Err(e) = self.store.save(LEDGER_DOC, &doc).await {
            metrics::counter!("capguard_persist_failures_total").increment(1);
            tracing::warn!(error = %e, "Ledger persist failed; continuing with in-memory state");
        }
        metrics::gauge!("capguard_open_positions").set(doc.as_object().map_or(0, |m| m.len()) as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    fn sample_position(symbol: &str) -> Position {
        Position::new(
            symbol.to_string(),
            Direction::Long,
            dec!(1.0850),
            dec!(10000),
            dec!(30),
            "USD".to_string(),
            "deal-1".to_string(),
            StrategySource::Volatility,
            dec!(0.0002),
        )
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let store = Arc::new(MemoryStore::new());
        let ledger = PositionLedger::load(store).await.unwrap();

        ledger.put(sample_position("EURUSD")).await;
        assert!(ledger.get("EURUSD").await.is_some());
        assert_eq!(ledger.len().await, 1);

        let removed = ledger.remove("EURUSD").await.unwrap();
        assert_eq!(removed.symbol, "EURUSD");
        assert!(ledger.get("EURUSD").await.is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_same_symbol() {
        let store = Arc::new(MemoryStore::new());
        let ledger = PositionLedger::load(store).await.unwrap();

        ledger.put(sample_position("EURUSD")).await;
        let mut second = sample_position("EURUSD");
        second.deal_id = "deal-2".to_string();
        ledger.put(second).await;

        assert_eq!(ledger.len().await, 1);
        assert_eq!(ledger.get("EURUSD").await.unwrap().deal_id, "deal-2");
    }

    #[tokio::test]
    async fn test_survives_reload() {
        let store = Arc::new(MemoryStore::new());
        {
            let ledger = PositionLedger::load(store.clone()).await.unwrap();
            ledger.put(sample_position("USDCAD")).await;
        }

        let reloaded = PositionLedger::load(store).await.unwrap();
        let position = reloaded.get("USDCAD").await.unwrap();
        assert_eq!(position.entry_price, dec!(1.0850));
        assert_eq!(position.direction, Direction::Long);
    }

    #[tokio::test]
    async fn test_symbol_lock_serializes_access() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(PositionLedger::load(store).await.unwrap());

        let guard = ledger.lock_symbol("EURUSD").await;

        // A second lock on the same symbol must wait
        let ledger2 = ledger.clone();
        let contender =
            tokio::spawn(async move { ledger2.lock_symbol("EURUSD").await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }
}
