//! Risk rule tables
//!
//! Static configuration converting monetary loss/profit targets into
//! price distances per (symbol, strategy source). Threshold constants
//! are configuration, not invariants; the defaults mirror the live
//! deployment's values.

use crate::ledger::StrategySource;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;

/// Explicit price-distance overrides for one strategy source
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceDistances {
    /// Stop distance in absolute price
    #[serde(default)]
    pub stop: Option<Decimal>,
    /// Take-profit distance in absolute price
    #[serde(default)]
    pub profit: Option<Decimal>,
    /// Trailing distance in absolute price
    #[serde(default)]
    pub trail: Option<Decimal>,
}

/// Per-symbol risk configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SymbolRules {
    /// Monetary loss target, overrides the global default
    #[serde(default)]
    pub loss_usd: Option<Decimal>,
    /// Monetary profit target, overrides the global default
    #[serde(default)]
    pub profit_usd: Option<Decimal>,
    /// Multiplier applied to the signal's quantity before submission
    #[serde(default)]
    pub quantity_scale: Option<Decimal>,
    /// Account leverage for this instrument
    #[serde(default)]
    pub leverage: Option<Decimal>,
    /// Trailing distance in absolute price
    #[serde(default)]
    pub trail_distance: Option<Decimal>,
    /// Price-distance overrides keyed by strategy source tag
    #[serde(default)]
    pub distances: HashMap<String, SourceDistances>,
}

/// Full risk rule set, loaded once from configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RiskRules {
    /// Unrealized profit at which the stop moves to entry
    #[serde(default = "default_breakeven_threshold")]
    pub breakeven_threshold_usd: Decimal,
    /// Unrealized profit at which trailing activates; once active it
    /// stays active for the life of the position
    #[serde(default = "default_trailing_threshold")]
    pub trailing_threshold_usd: Decimal,
    /// Smallest protective distance the policy will ever propose
    #[serde(default = "default_distance_epsilon")]
    pub distance_epsilon: Decimal,
    /// Monetary loss target when neither signal nor symbol supplies one
    #[serde(default = "default_loss_usd")]
    pub default_loss_usd: Decimal,
    /// Monetary profit target for fixed-target strategies
    #[serde(default = "default_profit_usd")]
    pub default_profit_usd: Decimal,
    /// Account leverage when a symbol does not override it
    #[serde(default = "default_leverage")]
    pub default_leverage: Decimal,
    /// Per-symbol overrides
    #[serde(default)]
    pub symbols: HashMap<String, SymbolRules>,
}

fn default_breakeven_threshold() -> Decimal {
    dec!(10)
}

fn default_trailing_threshold() -> Decimal {
    dec!(13)
}

fn default_distance_epsilon() -> Decimal {
    dec!(0.00005)
}

fn default_loss_usd() -> Decimal {
    dec!(10)
}

fn default_profit_usd() -> Decimal {
    dec!(15)
}

fn default_leverage() -> Decimal {
    dec!(30)
}

impl Default for RiskRules {
    fn default() -> Self {
        Self {
            breakeven_threshold_usd: default_breakeven_threshold(),
            trailing_threshold_usd: default_trailing_threshold(),
            distance_epsilon: default_distance_epsilon(),
            default_loss_usd: default_loss_usd(),
            default_profit_usd: default_profit_usd(),
            default_leverage: default_leverage(),
            symbols: HashMap::new(),
        }
    }
}

impl RiskRules {
    fn symbol(&self, symbol: &str) -> Option<&SymbolRules> {
        self.symbols.get(symbol)
    }

    fn source_distances(&self, symbol: &str, source: StrategySource) -> Option<&SourceDistances> {
        self.symbol(symbol)?.distances.get(source.as_tag())
    }

    /// Convert a dollar amount into a price distance for a sized position
    fn dollars_to_distance(&self, usd: Decimal, quantity: Decimal, leverage: Decimal) -> Decimal {
        if quantity <= Decimal::ZERO {
            return self.distance_epsilon;
        }
        (usd * leverage / quantity).max(self.distance_epsilon)
    }

    /// Target-loss price distance for (symbol, source)
    ///
    /// An explicit distance table wins; otherwise the monetary target
    /// (signal-supplied, per-symbol, then global) is converted through
    /// quantity and leverage.
    pub fn stop_distance(
        &self,
        symbol: &str,
        source: StrategySource,
        signal_loss_usd: Option<Decimal>,
        quantity: Decimal,
        leverage: Decimal,
    ) -> Decimal {
        if let Some(stop) = self.source_distances(symbol, source).and_then(|d| d.stop) {
            return stop;
        }
        let usd = signal_loss_usd
            .or_else(|| self.symbol(symbol).and_then(|s| s.loss_usd))
            .unwrap_or(self.default_loss_usd);
        self.dollars_to_distance(usd, quantity, leverage)
    }

    /// Take-profit price distance for (symbol, source)
    pub fn profit_distance(
        &self,
        symbol: &str,
        source: StrategySource,
        quantity: Decimal,
        leverage: Decimal,
    ) -> Decimal {
        if let Some(profit) = self.source_distances(symbol, source).and_then(|d| d.profit) {
            return profit;
        }
        let usd = self.profit_target_usd(symbol);
        self.dollars_to_distance(usd, quantity, leverage)
    }

    /// Trailing distance for (symbol, source)
    pub fn trail_distance(
        &self,
        symbol: &str,
        source: StrategySource,
        quantity: Decimal,
        leverage: Decimal,
    ) -> Decimal {
        if let Some(trail) = self.source_distances(symbol, source).and_then(|d| d.trail) {
            return trail;
        }
        if let Some(trail) = self.symbol(symbol).and_then(|s| s.trail_distance) {
            return trail;
        }
        let usd = self
            .symbol(symbol)
            .and_then(|s| s.loss_usd)
            .unwrap_or(self.default_loss_usd);
        self.dollars_to_distance(usd, quantity, leverage)
    }

    /// Monetary profit target used for "target hit" reporting
    pub fn profit_target_usd(&self, symbol: &str) -> Decimal {
        self.symbol(symbol)
            .and_then(|s| s.profit_usd)
            .unwrap_or(self.default_profit_usd)
    }

    /// Account leverage for a symbol
    pub fn leverage(&self, symbol: &str) -> Decimal {
        self.symbol(symbol)
            .and_then(|s| s.leverage)
            .unwrap_or(self.default_leverage)
    }

    /// Quantity multiplier for a symbol
    pub fn quantity_scale(&self, symbol: &str) -> Decimal {
        self.symbol(symbol)
            .and_then(|s| s.quantity_scale)
            .unwrap_or(Decimal::ONE)
    }
}
