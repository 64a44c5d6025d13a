//! Broker-facing types and errors

use crate::ledger::Direction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broker capability errors
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Transport-level failure (includes timeouts)
    #[error("broker transport error: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success API response
    #[error("broker API error: {status} - {body}")]
    Api { status: u16, body: String },
    /// Login was rejected or returned no session tokens
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// Session tokens are no longer accepted
    #[error("session expired")]
    SessionExpired,
    /// Deal confirmation did not arrive within the retry budget
    #[error("deal {0} not confirmed")]
    DealNotConfirmed(String),
}

impl BrokerError {
    /// Whether the failure is worth retrying on the next cycle
    pub fn is_transient(&self) -> bool {
        match self {
            BrokerError::Http(e) => e.is_timeout() || e.is_connect(),
            BrokerError::Api { status, .. } => *status >= 500,
            BrokerError::SessionExpired => true,
            _ => false,
        }
    }
}

/// Unit of a broker-reported protective-distance rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleUnit {
    /// Absolute price points
    Points,
    /// Percentage of the current price
    Percentage,
}

/// A dealing rule as reported by the broker
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct DealingRule {
    pub unit: RuleUnit,
    pub value: Decimal,
}

/// Trading constraints and live quote for one instrument
#[derive(Debug, Clone)]
pub struct MarketDetails {
    pub epic: String,
    pub min_deal_size: Decimal,
    pub min_stop_distance: DealingRule,
    pub max_stop_distance: Option<DealingRule>,
    pub bid: Decimal,
    pub offer: Decimal,
    pub decimal_places: u32,
}

/// One open position as reported by the broker's position list
///
/// Carries the live quote of the attached market record so a
/// reconciliation pass does not need a second fetch per symbol.
#[derive(Debug, Clone)]
pub struct BrokerPosition {
    pub deal_id: String,
    pub epic: String,
    pub direction: Direction,
    pub size: Decimal,
    pub level: Decimal,
    pub currency: String,
    pub leverage: Decimal,
    pub stop_level: Option<Decimal>,
    pub profit_level: Option<Decimal>,
    /// Broker-reported unrealized P&L, when present
    pub upl: Option<Decimal>,
    pub bid: Decimal,
    pub offer: Decimal,
}

/// Market order request
#[derive(Debug, Clone)]
pub struct OpenOrder {
    pub epic: String,
    pub direction: Direction,
    pub size: Decimal,
    pub stop_level: Option<Decimal>,
    pub profit_level: Option<Decimal>,
    pub currency_code: String,
}

/// Outcome of a deal confirmation lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealStatus {
    Accepted,
    Rejected,
}

/// A confirmed (or rejected) deal
#[derive(Debug, Clone)]
pub struct DealConfirmation {
    pub deal_reference: String,
    pub deal_id: String,
    pub status: DealStatus,
    /// Execution price, when reported
    pub level: Option<Decimal>,
    /// Realized profit for closes, when reported
    pub profit: Option<Decimal>,
    pub reason: Option<String>,
}

impl Direction {
    /// Broker wire code for this direction
    pub fn broker_code(self) -> &'static str {
        match self {
            Direction::Long => "BUY",
            Direction::Short => "SELL",
        }
    }

    /// Parse a broker wire code
    pub fn from_broker_code(code: &str) -> Option<Self> {
        match code {
            "BUY" => Some(Direction::Long),
            "SELL" => Some(Direction::Short),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_round_trip() {
        assert_eq!(Direction::Long.broker_code(), "BUY");
        assert_eq!(Direction::from_broker_code("SELL"), Some(Direction::Short));
        assert_eq!(Direction::from_broker_code("HOLD"), None);
    }

    #[test]
    fn test_transient_classification() {
        let api = BrokerError::Api {
            status: 503,
            body: "maintenance".to_string(),
        };
        assert!(api.is_transient());

        let rejected = BrokerError::AuthFailed("bad key".to_string());
        assert!(!rejected.is_transient());
        assert!(BrokerError::SessionExpired.is_transient());
    }
}
