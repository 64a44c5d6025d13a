//! Signal admission
//!
//! Decides, under the symbol's lock, whether a signal opens, reverses
//! or is turned away. This is where the one-position-per-symbol
//! invariant is enforced locally rather than delegated to the broker.

use super::{Decision, EngineError, RejectReason, TradeSignal};
use crate::broker::{Broker, DealStatus, OpenOrder};
use crate::instrument::InstrumentRules;
use crate::ledger::{Direction, Position, PositionLedger};
use crate::notify::Notifier;
use crate::regime::{Regime, RegimeTracker};
use crate::risk::RiskPolicy;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Routes validated signals into broker actions and ledger updates
pub struct AdmissionGate {
    broker: Arc<dyn Broker>,
    instruments: Arc<InstrumentRules>,
    policy: Arc<RiskPolicy>,
    ledger: Arc<PositionLedger>,
    regimes: Arc<RegimeTracker>,
    notifier: Arc<dyn Notifier>,
    currency_code: String,
}

impl AdmissionGate {
    /// Wire the gate to its collaborators
    pub fn new(
        broker: Arc<dyn Broker>,
        instruments: Arc<InstrumentRules>,
        policy: Arc<RiskPolicy>,
        ledger: Arc<PositionLedger>,
        regimes: Arc<RegimeTracker>,
        notifier: Arc<dyn Notifier>,
        currency_code: String,
    ) -> Self {
        Self {
            broker,
            instruments,
            policy,
            ledger,
            regimes,
            notifier,
            currency_code,
        }
    }

    /// Admit one signal; exactly one notification per terminal outcome
    pub async fn handle(&self, signal: TradeSignal) -> Result<Decision, EngineError> {
        tracing::info!(
            signal_id = %signal.id,
            symbol = %signal.symbol,
            direction = ?signal.direction,
            "Signal received"
        );
        let _guard = self.ledger.lock_symbol(&signal.symbol).await;

        if self.regimes.get(&signal.symbol).await == Regime::Consolidating
            && !signal.source.overrides_consolidation()
        {
            metrics::counter!("capguard_signals_total", "outcome" => "regime_gate").increment(1);
            self.notifier
                .push(&format!(
                    "{}: signal rejected, regime gate (consolidating)",
                    signal.symbol
                ))
                .await;
            return Ok(Decision::Rejected {
                symbol: signal.symbol,
                reason: RejectReason::RegimeGate,
            });
        }

        match self.ledger.get(&signal.symbol).await {
            None => self.admit_entry(&signal).await,
            Some(existing) if existing.direction == signal.direction => {
                metrics::counter!("capguard_signals_total", "outcome" => "duplicate").increment(1);
                self.notifier
                    .push(&format!(
                        "{}: signal rejected, already {:?}",
                        signal.symbol, existing.direction
                    ))
                    .await;
                Ok(Decision::Rejected {
                    symbol: signal.symbol,
                    reason: RejectReason::DuplicateExposure,
                })
            }
            Some(existing) => self.admit_reverse(&signal, existing).await,
        }
    }

    /// Open a new position for a flat symbol
    async fn admit_entry(&self, signal: &TradeSignal) -> Result<Decision, EngineError> {
        match self.open_position(signal).await {
            Ok(position) => {
                metrics::counter!("capguard_signals_total", "outcome" => "opened").increment(1);
                self.notifier
                    .push(&format!(
                        "{}: opened {:?} {} @ {}, stop {}, target {}",
                        position.symbol,
                        position.direction,
                        position.quantity,
                        position.entry_price,
                        display_level(position.stop_loss),
                        display_level(position.take_profit),
                    ))
                    .await;
                Ok(Decision::Opened {
                    symbol: position.symbol,
                    direction: position.direction,
                    deal_id: position.deal_id,
                    entry_price: position.entry_price,
                    stop_loss: position.stop_loss,
                    take_profit: position.take_profit,
                })
            }
            Err(e) => {
                metrics::counter!("capguard_signals_total", "outcome" => "error").increment(1);
                self.notifier
                    .push(&format!("{}: entry failed, {}", signal.symbol, e))
                    .await;
                Err(e)
            }
        }
    }

    /// Close the opposite position, then re-enter in the new direction
    ///
    /// The close commits before the reopen is attempted; a failed
    /// reopen leaves the book flat rather than pretending the old
    /// position still exists.
    async fn admit_reverse(
        &self,
        signal: &TradeSignal,
        existing: Position,
    ) -> Result<Decision, EngineError> {
        let closed_deal_id = existing.deal_id.clone();
        let realized = match self.close_position(&existing).await {
            Ok(realized) => realized,
            Err(e) => {
                metrics::counter!("capguard_signals_total", "outcome" => "error").increment(1);
                self.notifier
                    .push(&format!(
                        "{}: reverse failed closing {:?}, {}",
                        signal.symbol, existing.direction, e
                    ))
                    .await;
                return Err(e);
            }
        };
        self.ledger.remove(&signal.symbol).await;

        match self.open_position(signal).await {
            Ok(position) => {
                metrics::counter!("capguard_signals_total", "outcome" => "reversed").increment(1);
                self.notifier
                    .push(&format!(
                        "{}: reversed {:?} -> {:?}, realized {} USD, reopened @ {}",
                        signal.symbol,
                        existing.direction,
                        position.direction,
                        realized.round_dp(2),
                        position.entry_price,
                    ))
                    .await;
                Ok(Decision::Reversed {
                    symbol: signal.symbol.clone(),
                    closed_deal_id,
                    realized_pnl: realized,
                    reopened_deal_id: Some(position.deal_id),
                })
            }
            Err(e) => {
                metrics::counter!("capguard_signals_total", "outcome" => "reverse_flat").increment(1);
                self.notifier
                    .push(&format!(
                        "{}: reversed {:?}, realized {} USD, reopen failed ({}); now flat",
                        signal.symbol,
                        existing.direction,
                        realized.round_dp(2),
                        e
                    ))
                    .await;
                Ok(Decision::Reversed {
                    symbol: signal.symbol.clone(),
                    closed_deal_id,
                    realized_pnl: realized,
                    reopened_deal_id: None,
                })
            }
        }
    }

    /// Submit the market order and ledger the confirmed position
    async fn open_position(&self, signal: &TradeSignal) -> Result<Position, EngineError> {
        let snapshot = self.instruments.snapshot(&signal.symbol).await?;

        let rules = self.policy.rules();
        let scaled = signal.quantity * rules.quantity_scale(&signal.symbol);
        let quantity = if scaled < snapshot.min_deal_size {
            tracing::warn!(
                symbol = %signal.symbol,
                requested = %scaled,
                minimum = %snapshot.min_deal_size,
                "Quantity below broker minimum, raising"
            );
            snapshot.min_deal_size
        } else {
            scaled
        };
        let leverage = rules.leverage(&signal.symbol);

        let entry_estimate = match signal.direction {
            Direction::Long => snapshot.offer,
            Direction::Short => snapshot.bid,
        };
        let spread = snapshot.spread();

        let stop_loss = self.policy.entry_stop(
            entry_estimate,
            signal.direction,
            &signal.symbol,
            signal.source,
            spread,
            &snapshot,
            signal.loss_usd,
            quantity,
            leverage,
        );
        let take_profit = self.policy.entry_take_profit(
            entry_estimate,
            signal.direction,
            &signal.symbol,
            signal.source,
            spread,
            &snapshot,
            quantity,
            leverage,
        );

        let order = OpenOrder {
            epic: signal.symbol.clone(),
            direction: signal.direction,
            size: quantity,
            stop_level: Some(stop_loss),
            profit_level: take_profit,
            currency_code: self.currency_code.clone(),
        };
        let confirmation = self.broker.open_position(&order).await?;
        if confirmation.status == DealStatus::Rejected {
            return Err(EngineError::OrderRejected(
                confirmation
                    .reason
                    .unwrap_or_else(|| "no reason reported".to_string()),
            ));
        }
        if confirmation.deal_id.is_empty() {
            return Err(EngineError::ReconciliationConflict(format!(
                "confirmation {} carried no deal id",
                confirmation.deal_reference
            )));
        }

        let mut position = Position::new(
            signal.symbol.clone(),
            signal.direction,
            confirmation.level.unwrap_or(entry_estimate),
            quantity,
            leverage,
            self.currency_code.clone(),
            confirmation.deal_id,
            signal.source,
            spread,
        );
        position.stop_loss = Some(stop_loss);
        position.take_profit = take_profit;

        self.ledger.put(position.clone()).await;
        Ok(position)
    }

    /// Close at the broker and settle on a realized P&L figure
    ///
    /// The confirmation's profit is ground truth; when it is delayed or
    /// incomplete, fall back to an estimate from the close level or the
    /// live quote.
    async fn close_position(&self, position: &Position) -> Result<Decimal, EngineError> {
        let confirmation = self.broker.close_position(&position.deal_id).await?;
        if confirmation.status == DealStatus::Rejected {
            return Err(EngineError::OrderRejected(
                confirmation
                    .reason
                    .unwrap_or_else(|| "close rejected".to_string()),
            ));
        }

        if let Some(profit) = confirmation.profit {
            return Ok(profit);
        }
        if let Some(level) = confirmation.level {
            let delta = match position.direction {
                Direction::Long => level - position.entry_price,
                Direction::Short => position.entry_price - level,
            };
            return Ok(delta * position.quantity / position.leverage);
        }

        match self.instruments.snapshot(&position.symbol).await {
            Ok(snapshot) => Ok(position.unrealized_pnl(snapshot.bid, snapshot.offer)),
            Err(e) => {
                tracing::warn!(
                    symbol = %position.symbol,
                    error = %e,
                    "No confirmation profit and no live quote; reporting zero"
                );
                Ok(Decimal::ZERO)
            }
        }
    }
}

fn display_level(level: Option<Decimal>) -> String {
    level.map_or_else(|| "none".to_string(), |l| l.to_string())
}
