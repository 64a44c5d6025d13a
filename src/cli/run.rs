//! Run command implementation
//!
//! Boot order is part of the contract: load durable state, establish a
//! session, run one reconciliation pass, and only then accept signals,
//! so the first decision is made against broker-confirmed truth.

use crate::broker::{Broker, CapitalClient};
use crate::config::Config;
use crate::engine::{AdmissionGate, Reconciler};
use crate::instrument::InstrumentRules;
use crate::ledger::PositionLedger;
use crate::notify::{LogNotifier, Notifier, WebhookNotifier};
use crate::regime::RegimeTracker;
use crate::risk::RiskPolicy;
use crate::server::{self, AppState};
use crate::store::FileStore;
use clap::Args;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let store = Arc::new(FileStore::new(&config.persistence.data_dir));
        let ledger = Arc::new(PositionLedger::load(store.clone()).await?);
        let regimes = Arc::new(RegimeTracker::load(store).await?);

        let broker: Arc<dyn Broker> =
            Arc::new(CapitalClient::new(config.broker.to_capital_config()));
        let instruments = Arc::new(InstrumentRules::new(broker.clone()));
        let policy = Arc::new(RiskPolicy::new(config.risk.clone()));
        let notifier: Arc<dyn Notifier> = match &config.notify.push_url {
            Some(url) => Arc::new(WebhookNotifier::new(
                url.clone(),
                Duration::from_secs(config.notify.timeout_secs),
            )),
            None => Arc::new(LogNotifier),
        };

        broker.authenticate().await?;
        tracing::info!("Broker session established");

        let reconciler = Arc::new(Reconciler::new(
            broker.clone(),
            instruments.clone(),
            policy.clone(),
            ledger.clone(),
            notifier.clone(),
            Duration::from_secs(config.reconciler.interval_secs),
        ));

        let report = reconciler.run_cycle().await?;
        tracing::info!(?report, "Initial reconciliation pass complete");

        let gate = Arc::new(AdmissionGate::new(
            broker,
            instruments,
            policy,
            ledger,
            regimes.clone(),
            notifier,
            config.broker.currency_code.clone(),
        ));

        tokio::spawn(reconciler.run());

        let state = AppState {
            gate,
            regimes,
            regime_timeframe: config.server.regime_timeframe.clone(),
        };
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

        tokio::select! {
            result = server::serve(state, addr) => result?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
            }
        }

        Ok(())
    }
}
