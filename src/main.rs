//! VOLSCAN: perpetual-futures volume spike scanner
//!
//! Entry point. Loads configuration, initialises structured logging,
//! connects to the exchange, and runs the scan→alert loop until Ctrl+C.

use anyhow::Result;
use tracing::info;

use volscan::alerts::{self, AlertPolicy};
use volscan::config;
use volscan::engine::scanner::ScanOrchestrator;
use volscan::engine::supervisor::Supervisor;
use volscan::exchange;

const BANNER: &str = r#"
 __     _____  _     ____   ____    _    _   _
 \ \   / / _ \| |   / ___| / ___|  / \  | \ | |
  \ \ / / | | | |   \___ \| |     / _ \ |  \| |
   \ V /| |_| | |___ ___) | |___ / ___ \| |\  |
    \_/  \___/|_____|____/ \____/_/   \_\_| \_|

  Perpetual-futures volume spike scanner
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load and validate configuration; any error here is fatal
    let config_path =
        std::env::var("VOLSCAN_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        exchange = %cfg.exchange.id,
        timeframe = %cfg.scan.timeframe,
        lookback = cfg.scan.lookback,
        max_workers = cfg.scan.max_workers,
        settlement = %cfg.scan.settlement_suffix,
        interval_secs = cfg.scan.check_interval_secs,
        "VOLSCAN starting up"
    );

    // -- Initialise components -------------------------------------------

    let client = exchange::connect(&cfg.exchange)?;
    let exchange_name = client.name().to_string();

    let scanner = ScanOrchestrator::new(client, &cfg.scan);
    let notifier = alerts::build_notifier(&cfg.alerts)?;
    let policy = AlertPolicy::new(&cfg.alerts, exchange_name, scanner.timeframe());

    let supervisor = Supervisor::new(scanner, notifier, policy, cfg.scan.check_interval());

    // -- Main loop -------------------------------------------------------

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let cycles = supervisor.run_forever(shutdown).await;

    info!(cycles, "VOLSCAN shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("volscan=info"));

    let json_logging = std::env::var("VOLSCAN_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
