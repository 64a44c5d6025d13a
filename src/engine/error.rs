//! Engine error taxonomy

use crate::broker::BrokerError;
use thiserror::Error;

/// Errors surfaced by admission and reconciliation
#[derive(Debug, Error)]
pub enum EngineError {
    /// Login failed after the single re-auth retry
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    /// Instrument rules or quote could not be fetched; abort the
    /// current signal/cycle, retry next interval
    #[error("market data unavailable for {symbol}: {reason}")]
    MarketDataUnavailable { symbol: String, reason: String },
    /// Broker declined the order's size or levels; ledger unchanged
    #[error("order rejected: {0}")]
    OrderRejected(String),
    /// Broker state disagrees with the ledger in an unexpected way;
    /// broker wins, the conflict is logged
    #[error("reconciliation conflict: {0}")]
    ReconciliationConflict(String),
    /// Durable write failed; in-memory state carries on
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
    /// Transport or API failure talking to the broker
    #[error(transparent)]
    Broker(#[from] BrokerError),
}
