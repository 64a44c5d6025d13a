//! Position & risk engine
//!
//! The stateful core: admission of incoming signals, and the
//! reconciliation loop that keeps the ledger honest against the
//! broker's authoritative position list.

mod admission;
mod error;
mod reconciler;

pub use admission::AdmissionGate;
pub use error::EngineError;
pub use reconciler::{CycleReport, Reconciler};

use crate::ledger::{Direction, StrategySource};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// A tradeable signal after payload validation
#[derive(Debug, Clone)]
pub struct TradeSignal {
    /// Unique signal identifier, for log correlation
    pub id: Uuid,
    /// Instrument symbol (broker epic)
    pub symbol: String,
    /// Requested direction
    pub direction: Direction,
    /// Requested size, before scaling and minimum-size normalization
    pub quantity: Decimal,
    /// Strategy tag from the alert template
    pub source: StrategySource,
    /// Monetary loss target carried by the signal, if any
    pub loss_usd: Option<Decimal>,
}

/// Reason a signal was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Symbol regime is consolidating and the source does not override it
    RegimeGate,
    /// A position in the same direction is already open
    DuplicateExposure,
}

/// Terminal outcome of an admitted signal
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// A new position was opened
    Opened {
        symbol: String,
        direction: Direction,
        deal_id: String,
        entry_price: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    },
    /// The signal was rejected; ledger untouched
    Rejected {
        symbol: String,
        reason: RejectReason,
    },
    /// An opposite-direction position was closed first
    Reversed {
        symbol: String,
        closed_deal_id: String,
        realized_pnl: Decimal,
        /// Deal id of the replacement position; `None` when the reopen
        /// failed and the book is flat
        reopened_deal_id: Option<String>,
    },
}
