//! Position model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Profit when price rises
    Long,
    /// Profit when price falls
    Short,
}

impl Direction {
    /// The opposite direction
    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

/// Strategy tag carried by the signal source
///
/// Selects which risk table applies and whether the regime gate may be
/// bypassed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategySource {
    /// Volatility breakout alerts; fixed take-profit target
    Volatility,
    /// Alerts allowed to trade through a consolidating regime
    NoConsolidation,
    /// Conservative default for positions adopted from the broker
    Adopted,
}

impl StrategySource {
    /// Parse the signal's `source` tag; unknown tags get the conservative default
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "volatility" => StrategySource::Volatility,
            "no-consolidation" | "no_consolidation" => StrategySource::NoConsolidation,
            _ => StrategySource::Adopted,
        }
    }

    /// Key into the per-symbol risk distance tables
    pub fn as_tag(self) -> &'static str {
        match self {
            StrategySource::Volatility => "volatility",
            StrategySource::NoConsolidation => "no-consolidation",
            StrategySource::Adopted => "adopted",
        }
    }

    /// Whether this strategy attaches a fixed take-profit at entry
    pub fn has_fixed_target(self) -> bool {
        matches!(self, StrategySource::Volatility)
    }

    /// Whether entries are admitted during a consolidating regime
    pub fn overrides_consolidation(self) -> bool {
        matches!(self, StrategySource::NoConsolidation)
    }
}

/// An open position mirrored at the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Instrument symbol (broker epic)
    pub symbol: String,
    /// Trade direction
    pub direction: Direction,
    /// Confirmed entry price
    pub entry_price: Decimal,
    /// Position size
    pub quantity: Decimal,
    /// Account leverage applied to this instrument
    pub leverage: Decimal,
    /// Quote currency
    pub currency: String,
    /// Current protective stop, if set
    pub stop_loss: Option<Decimal>,
    /// Current take-profit, if set
    pub take_profit: Option<Decimal>,
    /// Broker deal identifier; required to mutate or close
    pub deal_id: String,
    /// Strategy tag selecting the risk table
    pub source: StrategySource,
    /// Bid/offer spread captured once at open
    pub spread_at_open: Decimal,
    /// Highest price seen since open
    pub highest_seen: Decimal,
    /// Lowest price seen since open
    pub lowest_seen: Decimal,
    /// Whether the trailing stop has been activated
    pub trailing_active: bool,
    /// Whether the stop has already been moved to entry
    pub stop_at_breakeven: bool,
    /// Open timestamp
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Create a position at its entry state
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: String,
        direction: Direction,
        entry_price: Decimal,
        quantity: Decimal,
        leverage: Decimal,
        currency: String,
        deal_id: String,
        source: StrategySource,
        spread_at_open: Decimal,
    ) -> Self {
        Self {
            symbol,
            direction,
            entry_price,
            quantity,
            leverage,
            currency,
            stop_loss: None,
            take_profit: None,
            deal_id,
            source,
            spread_at_open,
            highest_seen: entry_price,
            lowest_seen: entry_price,
            trailing_active: false,
            stop_at_breakeven: false,
            opened_at: Utc::now(),
        }
    }

    /// Fold a live price into the extrema; returns true when an extreme moved
    pub fn observe_price(&mut self, price: Decimal) -> bool {
        let mut moved = false;
        if price > self.highest_seen {
            self.highest_seen = price;
            moved = true;
        }
        if price < self.lowest_seen {
            self.lowest_seen = price;
            moved = true;
        }
        moved
    }

    /// Unrealized P&L from a live quote, used when the broker omits its figure
    ///
    /// Long positions value against the bid, shorts against the offer.
    pub fn unrealized_pnl(&self, bid: Decimal, offer: Decimal) -> Decimal {
        match self.direction {
            Direction::Long => (bid - self.entry_price) * self.quantity / self.leverage,
            Direction::Short => (self.entry_price - offer) * self.quantity / self.leverage,
        }
    }
}
