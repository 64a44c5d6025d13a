//! capguard: position-risk manager between chart-pattern alerts and
//! the Capital.com trading API
//!
//! This library provides the core components for:
//! - Signal admission (regime gate, duplicate exposure, reversal)
//! - Entry stop/target computation under broker distance constraints
//! - A persisted position ledger mirroring broker state
//! - Continuous reconciliation with closure classification
//! - Breakeven and trailing-stop escalation
//! - Webhook ingestion, notifications and full observability stack

pub mod broker;
pub mod cli;
pub mod config;
pub mod engine;
pub mod instrument;
pub mod ledger;
pub mod notify;
pub mod regime;
pub mod risk;
pub mod server;
pub mod store;
pub mod telemetry;
