use capguard::cli::{Cli, Commands};
use capguard::config::Config;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        toml::from_str(include_str!("../config.toml.example")).expect("Invalid default config")
    });

    // Initialize telemetry
    let _guard = capguard::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting capguard");
            args.execute(config).await?;
        }
        Commands::Status(args) => {
            args.execute(config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Broker: {}", config.broker.base_url);
            println!("  Webhook port: {}", config.server.port);
            println!("  Reconcile interval: {}s", config.reconciler.interval_secs);
            println!(
                "  Risk: breakeven ${}, trailing ${}",
                config.risk.breakeven_threshold_usd, config.risk.trailing_threshold_usd
            );
            println!("  Data dir: {}", config.persistence.data_dir.display());
        }
    }

    Ok(())
}
