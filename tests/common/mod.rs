//! Shared test harness: a scripted in-memory broker and a fully wired
//! engine over the in-memory store.

#![allow(dead_code)]

use async_trait::async_trait;
use capguard::broker::{
    Broker, BrokerError, BrokerPosition, DealConfirmation, DealStatus, DealingRule, MarketDetails,
    OpenOrder, RuleUnit,
};
use capguard::engine::{AdmissionGate, Reconciler};
use capguard::instrument::InstrumentRules;
use capguard::ledger::{Direction, Position, PositionLedger, StrategySource};
use capguard::notify::Notifier;
use capguard::regime::RegimeTracker;
use capguard::risk::{RiskPolicy, RiskRules};
use capguard::store::MemoryStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Notifier that records every pushed line
#[derive(Default)]
pub struct CollectingNotifier {
    lines: Mutex<Vec<String>>,
}

impl CollectingNotifier {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn push(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }
}

#[derive(Default)]
pub struct MockState {
    pub positions: Vec<BrokerPosition>,
    pub details: HashMap<String, MarketDetails>,
    pub calls: Vec<String>,
    pub auth_count: u32,
    pub next_deal_seq: u32,
    /// Fail the next open with an API error
    pub fail_next_open: bool,
    /// Reject the next open at confirmation time
    pub reject_next_open: bool,
    /// Return `SessionExpired` from the next position listing
    pub expire_list_once: bool,
    /// Realized profit reported by close confirmations
    pub close_profit: Option<Decimal>,
}

/// Scripted broker double
#[derive(Default)]
pub struct MockBroker {
    pub state: Mutex<MockState>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed dealing rules and a live quote for a symbol
    pub fn seed_market(&self, epic: &str, bid: Decimal, offer: Decimal) {
        let mut state = self.state.lock().unwrap();
        state.details.insert(
            epic.to_string(),
            MarketDetails {
                epic: epic.to_string(),
                min_deal_size: dec!(100),
                min_stop_distance: DealingRule {
                    unit: RuleUnit::Points,
                    value: dec!(0.0008),
                },
                max_stop_distance: None,
                bid,
                offer,
                decimal_places: 5,
            },
        );
    }

    /// Move a symbol's quote, in both the details and the position list
    pub fn set_quote(&self, epic: &str, bid: Decimal, offer: Decimal) {
        let mut state = self.state.lock().unwrap();
        if let Some(details) = state.details.get_mut(epic) {
            details.bid = bid;
            details.offer = offer;
        }
        for position in state.positions.iter_mut().filter(|p| p.epic == epic) {
            position.bid = bid;
            position.offer = offer;
        }
    }

    /// Set the broker-reported unrealized P&L for a symbol's position
    pub fn set_upl(&self, epic: &str, upl: Decimal) {
        let mut state = self.state.lock().unwrap();
        for position in state.positions.iter_mut().filter(|p| p.epic == epic) {
            position.upl = Some(upl);
        }
    }

    /// Place a position directly into the broker's list
    pub fn push_position(&self, position: BrokerPosition) {
        self.state.lock().unwrap().positions.push(position);
    }

    /// Drop a position from the broker's list, simulating an external close
    pub fn drop_position(&self, deal_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.positions.retain(|p| p.deal_id != deal_id);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn auth_count(&self) -> u32 {
        self.state.lock().unwrap().auth_count
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn authenticate(&self) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.auth_count += 1;
        Ok(())
    }

    async fn list_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("list".to_string());
        if state.expire_list_once {
            state.expire_list_once = false;
            return Err(BrokerError::SessionExpired);
        }
        Ok(state.positions.clone())
    }

    async fn open_position(&self, order: &OpenOrder) -> Result<DealConfirmation, BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("open:{}", order.epic));
        if state.fail_next_open {
            state.fail_next_open = false;
            return Err(BrokerError::Api {
                status: 400,
                body: "market closed".to_string(),
            });
        }
        if state.reject_next_open {
            state.reject_next_open = false;
            return Ok(DealConfirmation {
                deal_reference: "ref-rejected".to_string(),
                deal_id: String::new(),
                status: DealStatus::Rejected,
                level: None,
                profit: None,
                reason: Some("RISK_CHECK".to_string()),
            });
        }

        let details = state
            .details
            .get(&order.epic)
            .cloned()
            .expect("market not seeded");
        state.next_deal_seq += 1;
        let deal_id = format!("DEAL-{}", state.next_deal_seq);
        let level = match order.direction {
            Direction::Long => details.offer,
            Direction::Short => details.bid,
        };
        state.positions.push(BrokerPosition {
            deal_id: deal_id.clone(),
            epic: order.epic.clone(),
            direction: order.direction,
            size: order.size,
            level,
            currency: order.currency_code.clone(),
            leverage: dec!(30),
            stop_level: order.stop_level,
            profit_level: order.profit_level,
            upl: None,
            bid: details.bid,
            offer: details.offer,
        });
        Ok(DealConfirmation {
            deal_reference: format!("ref-{}", state.next_deal_seq),
            deal_id,
            status: DealStatus::Accepted,
            level: Some(level),
            profit: None,
            reason: None,
        })
    }

    async fn close_position(&self, deal_id: &str) -> Result<DealConfirmation, BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("close:{deal_id}"));
        let before = state.positions.len();
        state.positions.retain(|p| p.deal_id != deal_id);
        if state.positions.len() == before {
            return Err(BrokerError::Api {
                status: 404,
                body: format!("position {deal_id} not found"),
            });
        }
        Ok(DealConfirmation {
            deal_reference: format!("ref-close-{deal_id}"),
            deal_id: deal_id.to_string(),
            status: DealStatus::Accepted,
            level: None,
            profit: state.close_profit,
            reason: None,
        })
    }

    async fn update_position(
        &self,
        deal_id: &str,
        stop_level: Option<Decimal>,
        profit_level: Option<Decimal>,
    ) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("update:{deal_id}"));
        for position in state.positions.iter_mut().filter(|p| p.deal_id == deal_id) {
            position.stop_level = stop_level;
            position.profit_level = profit_level;
        }
        Ok(())
    }

    async fn market_details(&self, epic: &str) -> Result<MarketDetails, BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("details:{epic}"));
        state
            .details
            .get(epic)
            .cloned()
            .ok_or_else(|| BrokerError::Api {
                status: 404,
                body: format!("unknown epic {epic}"),
            })
    }
}

/// Fully wired engine over the mock broker and in-memory store
pub struct Harness {
    pub broker: Arc<MockBroker>,
    pub ledger: Arc<PositionLedger>,
    pub regimes: Arc<RegimeTracker>,
    pub gate: Arc<AdmissionGate>,
    pub reconciler: Arc<Reconciler>,
    pub notifications: Arc<CollectingNotifier>,
}

pub async fn harness() -> Harness {
    harness_with(RiskRules::default()).await
}

pub async fn harness_with(rules: RiskRules) -> Harness {
    let broker = Arc::new(MockBroker::new());
    broker.seed_market("EURUSD", dec!(1.0850), dec!(1.0852));
    broker.seed_market("USDCAD", dec!(1.3600), dec!(1.3602));
    broker.seed_market("USDMXN", dec!(18.500), dec!(18.505));

    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(PositionLedger::load(store.clone()).await.unwrap());
    let regimes = Arc::new(RegimeTracker::load(store).await.unwrap());
    let notifications = Arc::new(CollectingNotifier::default());

    let broker_dyn: Arc<dyn Broker> = broker.clone();
    let instruments = Arc::new(InstrumentRules::new(broker_dyn.clone()));
    let policy = Arc::new(RiskPolicy::new(rules));

    let gate = Arc::new(AdmissionGate::new(
        broker_dyn.clone(),
        instruments.clone(),
        policy.clone(),
        ledger.clone(),
        regimes.clone(),
        notifications.clone(),
        "USD".to_string(),
    ));
    let reconciler = Arc::new(Reconciler::new(
        broker_dyn,
        instruments,
        policy,
        ledger.clone(),
        notifications.clone(),
        Duration::from_secs(15),
    ));

    Harness {
        broker,
        ledger,
        regimes,
        gate,
        reconciler,
        notifications,
    }
}

/// A ledgered position mirrored into the mock broker's list
pub async fn seed_open_position(
    harness: &Harness,
    symbol: &str,
    direction: Direction,
    entry: Decimal,
    stop: Option<Decimal>,
    target: Option<Decimal>,
) -> Position {
    let deal_id = format!("SEED-{symbol}");
    let mut position = Position::new(
        symbol.to_string(),
        direction,
        entry,
        dec!(10000),
        dec!(30),
        "USD".to_string(),
        deal_id.clone(),
        StrategySource::Volatility,
        dec!(0.0002),
    );
    position.stop_loss = stop;
    position.take_profit = target;
    harness.ledger.put(position.clone()).await;

    let (bid, offer) = {
        let state = harness.broker.state.lock().unwrap();
        let details = state.details.get(symbol).expect("market not seeded");
        (details.bid, details.offer)
    };
    harness.broker.push_position(BrokerPosition {
        deal_id,
        epic: symbol.to_string(),
        direction,
        size: dec!(10000),
        level: entry,
        currency: "USD".to_string(),
        leverage: dec!(30),
        stop_level: stop,
        profit_level: target,
        upl: None,
        bid,
        offer,
    });
    position
}
