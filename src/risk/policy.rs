//! Protective-level policy
//!
//! Entry stops net the captured spread out of the target distance so
//! realized loss matches the monetary target. Broker distance
//! constraints are always evaluated against the live quote, not the
//! entry price: price may have moved between quote-fetch and
//! submission. Escalation is one-way - breakeven, then trailing, and a
//! proposed stop is only ever a tightening of the current one.
//!
//! Prices are rounded to the instrument's precision after every
//! derived calculation, never before, so successive trailing updates do
//! not compound rounding error.

use super::rules::RiskRules;
use crate::instrument::Snapshot;
use crate::ledger::{Direction, Position, StrategySource};
use rust_decimal::Decimal;

/// Pure protective-level calculator
pub struct RiskPolicy {
    rules: RiskRules,
}

impl RiskPolicy {
    /// Create a policy over a loaded rule set
    pub fn new(rules: RiskRules) -> Self {
        Self { rules }
    }

    /// The underlying rule tables
    pub fn rules(&self) -> &RiskRules {
        &self.rules
    }

    /// Entry stop-loss for a new position
    #[allow(clippy::too_many_arguments)]
    pub fn entry_stop(
        &self,
        entry_price: Decimal,
        direction: Direction,
        symbol: &str,
        source: StrategySource,
        spread: Decimal,
        snapshot: &Snapshot,
        signal_loss_usd: Option<Decimal>,
        quantity: Decimal,
        leverage: Decimal,
    ) -> Decimal {
        let target =
            self.rules
                .stop_distance(symbol, source, signal_loss_usd, quantity, leverage);
        // Net of spread, so the realized loss matches the target
        let distance = (target - spread).max(self.rules.distance_epsilon);
        let proposed = match direction {
            Direction::Long => entry_price - distance,
            Direction::Short => entry_price + distance,
        };
        self.clamp_stop(direction, proposed, snapshot)
            .round_dp(snapshot.decimal_places)
    }

    /// Entry take-profit; only fixed-target strategies get one
    #[allow(clippy::too_many_arguments)]
    pub fn entry_take_profit(
        &self,
        entry_price: Decimal,
        direction: Direction,
        symbol: &str,
        source: StrategySource,
        spread: Decimal,
        snapshot: &Snapshot,
        quantity: Decimal,
        leverage: Decimal,
    ) -> Option<Decimal> {
        if !source.has_fixed_target() {
            return None;
        }
        let target = self.rules.profit_distance(symbol, source, quantity, leverage);
        // Price must travel the spread past the target to net it
        let distance = (target + spread).max(self.rules.distance_epsilon);
        let proposed = match direction {
            Direction::Long => entry_price + distance,
            Direction::Short => entry_price - distance,
        };
        Some(
            self.clamp_target(direction, proposed, snapshot)
                .round_dp(snapshot.decimal_places),
        )
    }

    /// Whether unrealized profit justifies moving the stop to entry
    pub fn should_move_to_breakeven(&self, unrealized_usd: Decimal, position: &Position) -> bool {
        unrealized_usd >= self.rules.breakeven_threshold_usd
            && !position.stop_at_breakeven
            && position.stop_loss != Some(position.entry_price)
    }

    /// Whether unrealized profit justifies activating the trailing stop
    ///
    /// Activation is monotonic; callers latch the flag on the position
    /// and never clear it.
    pub fn should_activate_trailing(&self, unrealized_usd: Decimal) -> bool {
        unrealized_usd >= self.rules.trailing_threshold_usd
    }

    /// Unclamped trailing stop from the position's favorable extreme
    pub fn trailing_candidate(&self, position: &Position) -> Decimal {
        let trail = self.rules.trail_distance(
            &position.symbol,
            position.source,
            position.quantity,
            position.leverage,
        );
        match position.direction {
            Direction::Long => position.highest_seen - trail,
            Direction::Short => position.lowest_seen + trail,
        }
    }

    /// Trailing stop respecting broker constraints and monotonicity
    ///
    /// Returns `None` when the candidate would not strictly tighten the
    /// current stop: long stops only move up, short stops only move down.
    pub fn trailing_stop(&self, position: &Position, snapshot: &Snapshot) -> Option<Decimal> {
        let candidate = self.trailing_candidate(position);
        let rounded = self
            .clamp_stop(position.direction, candidate, snapshot)
            .round_dp(snapshot.decimal_places);
        self.tightens(position, rounded).then_some(rounded)
    }

    /// Stop at entry price, clamped and monotonic like any other stop
    pub fn breakeven_stop(&self, position: &Position, snapshot: &Snapshot) -> Option<Decimal> {
        let rounded = self
            .clamp_stop(position.direction, position.entry_price, snapshot)
            .round_dp(snapshot.decimal_places);
        self.tightens(position, rounded).then_some(rounded)
    }

    /// True when the proposed stop is strictly more protective
    pub fn tightens(&self, position: &Position, proposed: Decimal) -> bool {
        match (position.direction, position.stop_loss) {
            (Direction::Long, Some(stop)) => proposed > stop,
            (Direction::Short, Some(stop)) => proposed < stop,
            (_, None) => true,
        }
    }

    /// Clamp a stop against the broker's distance bounds from the live quote
    fn clamp_stop(&self, direction: Direction, proposed: Decimal, snapshot: &Snapshot) -> Decimal {
        match direction {
            Direction::Long => {
                let mut stop = proposed.min(snapshot.bid - snapshot.min_stop_distance);
                if let Some(max) = snapshot.max_stop_distance {
                    stop = stop.max(snapshot.bid - max);
                }
                stop
            }
            Direction::Short => {
                let mut stop = proposed.max(snapshot.offer + snapshot.min_stop_distance);
                if let Some(max) = snapshot.max_stop_distance {
                    stop = stop.min(snapshot.offer + max);
                }
                stop
            }
        }
    }

    /// Clamp a take-profit against the broker's distance bounds
    fn clamp_target(&self, direction: Direction, proposed: Decimal, snapshot: &Snapshot) -> Decimal {
        match direction {
            Direction::Long => {
                let mut target = proposed.max(snapshot.offer + snapshot.min_stop_distance);
                if let Some(max) = snapshot.max_stop_distance {
                    target = target.min(snapshot.offer + max);
                }
                target
            }
            Direction::Short => {
                let mut target = proposed.min(snapshot.bid - snapshot.min_stop_distance);
                if let Some(max) = snapshot.max_stop_distance {
                    target = target.max(snapshot.bid - max);
                }
                target
            }
        }
    }
}
