//! Broker capability
//!
//! The remote trading API consumed by the engine: session management,
//! position listing, order placement, protective-level updates and deal
//! confirmations. The live implementation speaks Capital.com's REST
//! protocol; the engine only sees the [`Broker`] trait.

mod capital;
mod types;

pub use capital::{CapitalClient, CapitalConfig, DEMO_API_URL};
pub use types::{
    BrokerError, BrokerPosition, DealConfirmation, DealStatus, DealingRule, MarketDetails,
    OpenOrder, RuleUnit,
};

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Trait for broker implementations
#[async_trait]
pub trait Broker: Send + Sync {
    /// Establish a fresh session with the broker
    async fn authenticate(&self) -> Result<(), BrokerError>;
    /// List all open positions (authoritative view)
    async fn list_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;
    /// Place a market order and wait for its confirmation
    async fn open_position(&self, order: &OpenOrder) -> Result<DealConfirmation, BrokerError>;
    /// Close an open position and wait for its confirmation
    async fn close_position(&self, deal_id: &str) -> Result<DealConfirmation, BrokerError>;
    /// Update protective levels on an open position
    async fn update_position(
        &self,
        deal_id: &str,
        stop_level: Option<Decimal>,
        profit_level: Option<Decimal>,
    ) -> Result<(), BrokerError>;
    /// Fetch trading rules and the live quote for an instrument
    async fn market_details(&self, epic: &str) -> Result<MarketDetails, BrokerError>;
}
