//! Main entry point for the kon8-dash daemon.

use kon8_dash::{config::DashConfig, daemon::Daemon, tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();

    let daemon = Daemon::new(DashConfig::from_env())?;
    daemon.run().await
}
