//! Admission gate integration tests over the scripted broker

mod common;

use capguard::engine::{Decision, RejectReason, TradeSignal};
use capguard::ledger::{Direction, StrategySource};
use capguard::regime::Regime;
use common::{harness, seed_open_position};
use rust_decimal_macros::dec;

fn buy_signal(symbol: &str) -> TradeSignal {
    TradeSignal {
        id: uuid::Uuid::new_v4(),
        symbol: symbol.to_string(),
        direction: Direction::Long,
        quantity: dec!(10000),
        source: StrategySource::Volatility,
        loss_usd: Some(dec!(10)),
    }
}

fn sell_signal(symbol: &str) -> TradeSignal {
    TradeSignal {
        direction: Direction::Short,
        ..buy_signal(symbol)
    }
}

#[tokio::test]
async fn test_entry_opens_position_with_policy_stop() {
    let h = harness().await;

    let decision = h.gate.handle(buy_signal("EURUSD")).await.unwrap();
    assert!(matches!(decision, Decision::Opened { .. }));

    let position = h.ledger.get("EURUSD").await.expect("position ledgered");
    assert_eq!(position.direction, Direction::Long);
    assert_eq!(position.entry_price, dec!(1.0852));
    // $10 target at 30x over 10000 units is 0.03, net of the 0.0002 spread
    assert_eq!(position.stop_loss, Some(dec!(1.0554)));
    assert_eq!(position.take_profit, Some(dec!(1.1304)));
    assert!(!position.deal_id.is_empty());

    assert_eq!(h.broker.call_count("open:"), 1);
    assert_eq!(h.notifications.lines().len(), 1);
}

#[tokio::test]
async fn test_consolidating_regime_rejects_without_broker_call() {
    let h = harness().await;
    h.regimes.set("USDMXN", Regime::Consolidating).await;

    let decision = h.gate.handle(sell_signal("USDMXN")).await.unwrap();
    assert!(matches!(
        decision,
        Decision::Rejected {
            reason: RejectReason::RegimeGate,
            ..
        }
    ));
    assert!(h.ledger.get("USDMXN").await.is_none());
    assert!(h.broker.calls().is_empty());
}

#[tokio::test]
async fn test_consolidation_override_source_trades_through_gate() {
    let h = harness().await;
    h.regimes.set("EURUSD", Regime::Consolidating).await;

    let mut signal = buy_signal("EURUSD");
    signal.source = StrategySource::NoConsolidation;
    let decision = h.gate.handle(signal).await.unwrap();
    assert!(matches!(decision, Decision::Opened { .. }));
    // Non-fixed-target source carries no take-profit
    let position = h.ledger.get("EURUSD").await.unwrap();
    assert_eq!(position.take_profit, None);
}

#[tokio::test]
async fn test_same_direction_signal_rejected_as_duplicate() {
    let h = harness().await;
    seed_open_position(&h, "EURUSD", Direction::Long, dec!(1.0850), None, None).await;

    let decision = h.gate.handle(buy_signal("EURUSD")).await.unwrap();
    assert!(matches!(
        decision,
        Decision::Rejected {
            reason: RejectReason::DuplicateExposure,
            ..
        }
    ));
    assert_eq!(h.broker.call_count("open:"), 0);
    assert_eq!(h.ledger.len().await, 1);
}

#[tokio::test]
async fn test_opposite_signal_reverses_position() {
    let h = harness().await;
    seed_open_position(
        &h,
        "USDCAD",
        Direction::Long,
        dec!(1.3590),
        Some(dec!(1.3560)),
        None,
    )
    .await;
    h.broker.state.lock().unwrap().close_profit = Some(dec!(4.25));

    let decision = h.gate.handle(sell_signal("USDCAD")).await.unwrap();
    match decision {
        Decision::Reversed {
            realized_pnl,
            reopened_deal_id,
            ..
        } => {
            assert_eq!(realized_pnl, dec!(4.25));
            assert!(reopened_deal_id.is_some());
        }
        other => panic!("expected reversal, got {other:?}"),
    }

    let position = h.ledger.get("USDCAD").await.expect("reopened position");
    assert_eq!(position.direction, Direction::Short);
    assert!(position.stop_loss.is_some());
    assert_eq!(h.broker.call_count("close:"), 1);
    assert_eq!(h.broker.call_count("open:"), 1);
}

#[tokio::test]
async fn test_failed_reopen_leaves_book_flat() {
    let h = harness().await;
    seed_open_position(&h, "USDCAD", Direction::Long, dec!(1.3590), None, None).await;
    h.broker.state.lock().unwrap().fail_next_open = true;

    let decision = h.gate.handle(sell_signal("USDCAD")).await.unwrap();
    match decision {
        Decision::Reversed {
            reopened_deal_id, ..
        } => assert!(reopened_deal_id.is_none()),
        other => panic!("expected reversal, got {other:?}"),
    }
    // Flat beats stale: the closed position must not linger
    assert!(h.ledger.get("USDCAD").await.is_none());
}

#[tokio::test]
async fn test_rejected_order_leaves_ledger_unchanged() {
    let h = harness().await;
    h.broker.state.lock().unwrap().reject_next_open = true;

    let result = h.gate.handle(buy_signal("EURUSD")).await;
    assert!(result.is_err());
    assert!(h.ledger.get("EURUSD").await.is_none());
    assert_eq!(h.notifications.lines().len(), 1);
}

#[tokio::test]
async fn test_quantity_raised_to_broker_minimum() {
    let h = harness().await;
    let mut signal = buy_signal("EURUSD");
    signal.quantity = dec!(10);

    h.gate.handle(signal).await.unwrap();
    let position = h.ledger.get("EURUSD").await.unwrap();
    assert_eq!(position.quantity, dec!(100));
}

#[tokio::test]
async fn test_concurrent_signals_open_at_most_one_position() {
    let h = harness().await;

    let (first, second) = tokio::join!(
        h.gate.handle(buy_signal("EURUSD")),
        h.gate.handle(buy_signal("EURUSD")),
    );
    let decisions = [first.unwrap(), second.unwrap()];

    let opened = decisions
        .iter()
        .filter(|d| matches!(d, Decision::Opened { .. }))
        .count();
    let rejected = decisions
        .iter()
        .filter(|d| {
            matches!(
                d,
                Decision::Rejected {
                    reason: RejectReason::DuplicateExposure,
                    ..
                }
            )
        })
        .count();
    assert_eq!(opened, 1);
    assert_eq!(rejected, 1);
    assert_eq!(h.ledger.len().await, 1);
    assert_eq!(h.broker.call_count("open:"), 1);
}
