//! Prometheus metrics exporter

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;

    metrics::describe_counter!(
        "capguard_signals_total",
        "Inbound trade signals by terminal outcome"
    );
    metrics::describe_counter!(
        "capguard_reconcile_cycles_total",
        "Reconciliation cycles started"
    );
    metrics::describe_counter!(
        "capguard_stop_updates_total",
        "Protective-level updates pushed to the broker"
    );
    metrics::describe_counter!(
        "capguard_external_closures_total",
        "Positions found closed at the broker"
    );
    metrics::describe_counter!(
        "capguard_persist_failures_total",
        "Failed durable-store writes"
    );
    metrics::describe_gauge!("capguard_open_positions", "Open positions in the ledger");

    Ok(())
}
