//! Multi-Forum DAO Monitor — Binary Entrypoint
//! Boots the heartbeat loop that polls forums, prices, on-chain transfers,
//! governance, video commentary and the tracked collateral position, then
//! pushes the merged state to the dashboard.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dao_activity_monitor::config::Config;
use dao_activity_monitor::monitor::Monitor;
use dao_activity_monitor::scheduler::SystemClock;
use dao_activity_monitor::state::FileStateRepository;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dao_activity_monitor=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Config::from_env();
    let repo = FileStateRepository::new(cfg.state_file.clone());
    let monitor = Monitor::new(cfg, Box::new(repo), Box::new(SystemClock));
    monitor.run().await
}
