//! Benchmarks for protective-level calculation

use capguard::instrument::Snapshot;
use capguard::ledger::{Direction, Position, StrategySource};
use capguard::risk::{RiskPolicy, RiskRules};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal_macros::dec;

fn snapshot() -> Snapshot {
    Snapshot {
        epic: "EURUSD".to_string(),
        min_deal_size: dec!(100),
        min_stop_distance: dec!(0.0008),
        max_stop_distance: Some(dec!(0.10)),
        bid: dec!(1.0850),
        offer: dec!(1.0852),
        decimal_places: 5,
    }
}

fn benchmark_entry_stop(c: &mut Criterion) {
    let policy = RiskPolicy::new(RiskRules::default());
    let snapshot = snapshot();

    c.bench_function("entry_stop", |b| {
        b.iter(|| {
            policy.entry_stop(
                black_box(dec!(1.0852)),
                Direction::Long,
                "EURUSD",
                StrategySource::Volatility,
                dec!(0.0002),
                &snapshot,
                Some(dec!(10)),
                dec!(10000),
                dec!(30),
            )
        })
    });
}

fn benchmark_trailing_stop(c: &mut Criterion) {
    let policy = RiskPolicy::new(RiskRules::default());
    let snapshot = snapshot();
    let mut position = Position::new(
        "EURUSD".to_string(),
        Direction::Long,
        dec!(1.0550),
        dec!(10000),
        dec!(30),
        "USD".to_string(),
        "DEAL-1".to_string(),
        StrategySource::Volatility,
        dec!(0.0002),
    );
    position.stop_loss = Some(dec!(1.0600));
    position.highest_seen = dec!(1.0840);
    position.trailing_active = true;

    c.bench_function("trailing_stop", |b| {
        b.iter(|| policy.trailing_stop(black_box(&position), &snapshot))
    });
}

criterion_group!(benches, benchmark_entry_stop, benchmark_trailing_stop);
criterion_main!(benches);
