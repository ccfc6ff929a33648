//! Order fan-out runner - Entry Point
//!
//! Executes one trade intent across every configured account and prints the
//! execution report to stdout.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Multi-account order fan-out for OKX
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via FANOUT_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Webhook payload JSON file, or `-` for stdin
    #[arg(short, long, default_value = fanout_bot::STDIN_SOURCE)]
    intent: String,

    /// Print Prometheus metrics to stderr after the run
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config path: CLI arg > FANOUT_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("FANOUT_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = fanout_bot::AppConfig::from_file(&config_path)?;
    fanout_telemetry::init_logging(&config.telemetry.log_level)?;

    info!("Starting fanout-bot v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = %config_path,
        base_url = %config.exchange.base_url,
        simulated = config.exchange.simulated,
        "Configuration loaded"
    );

    let intents = fanout_bot::read_intents(&args.intent)?;
    let app = fanout_bot::Application::new(config)?;
    let report = app.run(&intents).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.metrics {
        eprintln!("{}", fanout_telemetry::Metrics::gather_text()?);
    }

    Ok(())
}
