//! ledlink - weather and exchange-rate bridge to an MQTT LED display.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Weather and exchange-rate bridge to an MQTT LED display
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via LEDLINK_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    ledlink_telemetry::init_logging()?;

    info!("Starting ledlink v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > LEDLINK_CONFIG > default
    let config_path = args
        .config
        .or_else(|| std::env::var("LEDLINK_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = ledlink_app::AppConfig::load(&config_path)?;
    info!(
        broker = %format!("{}:{}", config.broker.host, config.broker.port),
        database = %config.database.path.display(),
        "Configuration loaded"
    );

    let app = ledlink_app::Application::start(config).await?;
    app.run().await?;

    Ok(())
}
