//! Reconciliation loop
//!
//! Periodically diffs the ledger against the broker's position list.
//! Per symbol and per cycle, exactly one of three transitions applies:
//! both sides present (manage protective levels), ledger-only
//! (classify the external closure), broker-only (adopt the orphan so
//! it is never left unmanaged).

use super::EngineError;
use crate::broker::{Broker, BrokerError, BrokerPosition};
use crate::instrument::InstrumentRules;
use crate::ledger::{Direction, Position, PositionLedger, StrategySource};
use crate::notify::Notifier;
use crate::risk::RiskPolicy;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// What a single cycle did; drives idempotence assertions in tests
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Positions present on both sides and evaluated
    pub managed: usize,
    /// Protective-level updates pushed to the broker
    pub stop_updates: usize,
    /// Externally-closed positions removed from the ledger
    pub closures: usize,
    /// Broker-only positions adopted into the ledger
    pub adoptions: usize,
}

/// Why an externally-closed position went away
#[derive(Debug, Clone, Copy, PartialEq)]
enum ClosureCause {
    /// Protective stop on the loss side was hit; carries realized loss
    StoppedOut(Decimal),
    /// Fixed take-profit was hit; carries the configured target
    TargetHit(Decimal),
    /// Closed manually or for an unknown reason
    Unknown,
}

/// Periodic ledger-vs-broker reconciliation
pub struct Reconciler {
    broker: Arc<dyn Broker>,
    instruments: Arc<InstrumentRules>,
    policy: Arc<RiskPolicy>,
    ledger: Arc<PositionLedger>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
}

impl Reconciler {
    /// Wire the reconciler to its collaborators
    pub fn new(
        broker: Arc<dyn Broker>,
        instruments: Arc<InstrumentRules>,
        policy: Arc<RiskPolicy>,
        ledger: Arc<PositionLedger>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
    ) -> Self {
        Self {
            broker,
            instruments,
            policy,
            ledger,
            notifier,
            interval,
        }
    }

    /// Run cycles forever; a failed cycle is skipped, never fatal
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.run_cycle().await {
                Ok(report) => {
                    tracing::debug!(?report, "Reconciliation cycle complete");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Reconciliation cycle failed; retrying next interval");
                    self.notifier
                        .push(&format!("reconciliation cycle failed: {e}"))
                        .await;
                }
            }
        }
    }

    /// One reconciliation pass over every symbol
    pub async fn run_cycle(&self) -> Result<CycleReport, EngineError> {
        metrics::counter!("capguard_reconcile_cycles_total").increment(1);

        // Broker truth first; one re-auth retry on an expired session
        let listed = match self.broker.list_positions().await {
            Ok(listed) => listed,
            Err(BrokerError::SessionExpired) => {
                tracing::info!("Session expired mid-cycle, re-authenticating once");
                self.broker
                    .authenticate()
                    .await
                    .map_err(|e| EngineError::AuthenticationFailed(e.to_string()))?;
                self.broker.list_positions().await?
            }
            Err(e) => return Err(e.into()),
        };
        let by_epic: HashMap<String, BrokerPosition> = listed
            .into_iter()
            .map(|p| (p.epic.clone(), p))
            .collect();

        let mut report = CycleReport::default();

        let ledgered: Vec<String> = self.ledger.all().await.into_iter().map(|p| p.symbol).collect();
        for symbol in ledgered {
            let _guard = self.ledger.lock_symbol(&symbol).await;
            // A signal may have closed or replaced the position while we
            // waited for the lock
            let Some(position) = self.ledger.get(&symbol).await else {
                continue;
            };
            match by_epic.get(&symbol) {
                Some(broker_position) => {
                    report.managed += 1;
                    self.manage(position, broker_position, &mut report).await;
                }
                None => {
                    self.handle_closure(position).await;
                    report.closures += 1;
                }
            }
        }

        for (epic, broker_position) in &by_epic {
            let _guard = self.ledger.lock_symbol(epic).await;
            if self.ledger.get(epic).await.is_none() {
                self.adopt(broker_position).await;
                report.adoptions += 1;
            }
        }

        Ok(report)
    }

    /// Escalate protection on a position present on both sides
    ///
    /// Failures here are logged and left for the next cycle; they never
    /// abort the rest of the pass.
    async fn manage(
        &self,
        mut position: Position,
        broker_position: &BrokerPosition,
        report: &mut CycleReport,
    ) {
        let mut changed = false;

        if position.deal_id != broker_position.deal_id {
            tracing::warn!(
                symbol = %position.symbol,
                ledgered = %position.deal_id,
                broker = %broker_position.deal_id,
                "Deal id mismatch; broker is authoritative"
            );
            position.deal_id = broker_position.deal_id.clone();
            changed = true;
        }
        if position.stop_loss != broker_position.stop_level {
            tracing::warn!(
                symbol = %position.symbol,
                ledgered = ?position.stop_loss,
                broker = ?broker_position.stop_level,
                "Stop level changed outside the engine; adopting broker value"
            );
            position.stop_loss = broker_position.stop_level;
            changed = true;
        }
        if position.take_profit != broker_position.profit_level {
            position.take_profit = broker_position.profit_level;
            changed = true;
        }

        // Extrema follow the side the position would close at
        let close_price = match position.direction {
            Direction::Long => broker_position.bid,
            Direction::Short => broker_position.offer,
        };
        changed |= position.observe_price(close_price);

        // Broker-reported unrealized P&L is ground truth; local math is
        // the fallback
        let unrealized = broker_position
            .upl
            .unwrap_or_else(|| position.unrealized_pnl(broker_position.bid, broker_position.offer));

        if !position.trailing_active && self.policy.should_activate_trailing(unrealized) {
            tracing::info!(symbol = %position.symbol, %unrealized, "Trailing stop activated");
            position.trailing_active = true;
            changed = true;
        }

        let wants_update = if position.trailing_active {
            // Cheap precheck on the unclamped candidate avoids a market
            // details fetch when the extreme has not advanced
            self.policy
                .tightens(&position, self.policy.trailing_candidate(&position))
        } else {
            self.policy.should_move_to_breakeven(unrealized, &position)
        };

        if wants_update {
            match self.instruments.snapshot(&position.symbol).await {
                Ok(snapshot) => {
                    let proposed = if position.trailing_active {
                        self.policy.trailing_stop(&position, &snapshot)
                    } else {
                        self.policy.breakeven_stop(&position, &snapshot)
                    };
                    if let Some(new_stop) = proposed {
                        match self
                            .broker
                            .update_position(&position.deal_id, Some(new_stop), position.take_profit)
                            .await
                        {
                            Ok(()) => {
                                position.stop_loss = Some(new_stop);
                                if !position.trailing_active && new_stop == position.entry_price {
                                    position.stop_at_breakeven = true;
                                }
                                changed = true;
                                report.stop_updates += 1;
                                metrics::counter!("capguard_stop_updates_total").increment(1);
                                let kind = if position.trailing_active {
                                    "trailing stop"
                                } else {
                                    "breakeven stop"
                                };
                                self.notifier
                                    .push(&format!(
                                        "{}: {} -> {}",
                                        position.symbol, kind, new_stop
                                    ))
                                    .await;
                            }
                            Err(e) => {
                                tracing::warn!(
                                    symbol = %position.symbol,
                                    error = %e,
                                    "Stop update failed; retrying next cycle"
                                );
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        symbol = %position.symbol,
                        error = %e,
                        "No snapshot for stop escalation; retrying next cycle"
                    );
                }
            }
        }

        if changed {
            self.ledger.put(position).await;
        }
    }

    /// Classify and report a position the broker no longer lists
    async fn handle_closure(&self, position: Position) {
        let cause = classify_closure(&position, self.policy.rules().profit_target_usd(&position.symbol));
        let message = match cause {
            ClosureCause::StoppedOut(loss) => format!(
                "{}: stopped out, realized {} USD",
                position.symbol,
                loss.round_dp(2)
            ),
            ClosureCause::TargetHit(profit) => format!(
                "{}: target hit, realized {} USD",
                position.symbol,
                profit.round_dp(2)
            ),
            ClosureCause::Unknown => {
                format!("{}: closed externally (manual or unknown)", position.symbol)
            }
        };
        tracing::info!(symbol = %position.symbol, ?cause, "Position closed externally");
        metrics::counter!("capguard_external_closures_total").increment(1);
        self.notifier.push(&message).await;
        self.ledger.remove(&position.symbol).await;
    }

    /// Ledger a broker-only position so it is never left unmanaged
    async fn adopt(&self, broker_position: &BrokerPosition) {
        let mut position = Position::new(
            broker_position.epic.clone(),
            broker_position.direction,
            broker_position.level,
            broker_position.size,
            broker_position.leverage,
            broker_position.currency.clone(),
            broker_position.deal_id.clone(),
            StrategySource::Adopted,
            broker_position.offer - broker_position.bid,
        );
        position.stop_loss = broker_position.stop_level;
        position.take_profit = broker_position.profit_level;
        let close_price = match position.direction {
            Direction::Long => broker_position.bid,
            Direction::Short => broker_position.offer,
        };
        position.observe_price(close_price);

        tracing::info!(
            symbol = %position.symbol,
            deal_id = %position.deal_id,
            "Adopted position found only at the broker"
        );
        self.notifier
            .push(&format!(
                "{}: adopted unmanaged {:?} position ({})",
                position.symbol, position.direction, position.deal_id
            ))
            .await;
        self.ledger.put(position).await;
    }
}

/// Infer why the broker closed a position we still had ledgered
fn classify_closure(position: &Position, profit_target_usd: Decimal) -> ClosureCause {
    if let Some(stop) = position.stop_loss {
        let on_loss_side = match position.direction {
            Direction::Long => stop < position.entry_price,
            Direction::Short => stop > position.entry_price,
        };
        if on_loss_side {
            let delta = match position.direction {
                Direction::Long => stop - position.entry_price,
                Direction::Short => position.entry_price - stop,
            };
            return ClosureCause::StoppedOut(delta * position.quantity / position.leverage);
        }
    }
    if position.take_profit.is_some() {
        return ClosureCause::TargetHit(profit_target_usd);
    }
    ClosureCause::Unknown
}
