//! Status command implementation

use crate::config::Config;
use crate::ledger::PositionLedger;
use crate::store::FileStore;
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct StatusArgs {}

impl StatusArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let store = Arc::new(FileStore::new(&config.persistence.data_dir));
        let ledger = PositionLedger::load(store).await?;

        let mut positions = ledger.all().await;
        if positions.is_empty() {
            println!("No open positions");
            return Ok(());
        }

        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        for p in positions {
            println!(
                "{} {:?} {} @ {} (stop {}, target {}, trailing {})",
                p.symbol,
                p.direction,
                p.quantity,
                p.entry_price,
                p.stop_loss.map_or("none".to_string(), |l| l.to_string()),
                p.take_profit.map_or("none".to_string(), |l| l.to_string()),
                if p.trailing_active { "on" } else { "off" },
            );
        }
        Ok(())
    }
}
