//! Instrument trading rules
//!
//! Fetches per-symbol constraints (minimum size, protective-distance
//! bounds) and the live quote, normalizing broker-reported distance
//! units into absolute price distances. Snapshots are ephemeral: they
//! are re-fetched per operation and treated as possibly stale the
//! moment they are used.

use crate::broker::{Broker, DealingRule, RuleUnit};
use crate::engine::EngineError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

/// Normalized trading constraints plus the live quote for one instrument
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Instrument symbol (broker epic)
    pub epic: String,
    /// Smallest order size the broker accepts
    pub min_deal_size: Decimal,
    /// Minimum protective-level distance, absolute price
    pub min_stop_distance: Decimal,
    /// Maximum protective-level distance, absolute price
    pub max_stop_distance: Option<Decimal>,
    /// Live bid
    pub bid: Decimal,
    /// Live offer
    pub offer: Decimal,
    /// Price precision for this instrument
    pub decimal_places: u32,
}

impl Snapshot {
    /// Current bid/offer spread
    pub fn spread(&self) -> Decimal {
        self.offer - self.bid
    }
}

/// Fetches and normalizes instrument rules through the broker
pub struct InstrumentRules {
    broker: Arc<dyn Broker>,
    /// Floor applied to degenerate broker-reported distances
    distance_floor: Decimal,
}

impl InstrumentRules {
    /// Create the rules service with the default distance floor
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            distance_floor: dec!(0.0001),
        }
    }

    /// Override the distance floor
    pub fn with_distance_floor(mut self, floor: Decimal) -> Self {
        self.distance_floor = floor;
        self
    }

    /// Fetch a fresh snapshot for a symbol
    ///
    /// Any broker failure surfaces as `MarketDataUnavailable`; callers
    /// must not place orders without a fresh snapshot.
    pub async fn snapshot(&self, epic: &str) -> Result<Snapshot, EngineError> {
        let details = self.broker.market_details(epic).await.map_err(|e| {
            EngineError::MarketDataUnavailable {
                symbol: epic.to_string(),
                reason: e.to_string(),
            }
        })?;

        let min_stop_distance = self.normalize(details.min_stop_distance, details.bid);
        let max_stop_distance = details
            .max_stop_distance
            .map(|rule| self.normalize(rule, details.bid));

        Ok(Snapshot {
            epic: details.epic,
            min_deal_size: details.min_deal_size,
            min_stop_distance,
            max_stop_distance,
            bid: details.bid,
            offer: details.offer,
            decimal_places: details.decimal_places,
        })
    }

    /// Convert a broker distance rule into an absolute price distance
    ///
    /// Percentage rules are taken against the current bid. A zero or
    /// negative broker value never yields a zero protective distance.
    fn normalize(&self, rule: DealingRule, bid: Decimal) -> Decimal {
        let absolute = match rule.unit {
            RuleUnit::Points => rule.value,
            RuleUnit::Percentage => bid * rule.value / dec!(100),
        };
        absolute.max(self.distance_floor)
    }
}
