mod bot;

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use trade_orchestrator::analysis::AnalysisClient;
use trade_orchestrator::config::Config;
use trade_orchestrator::exchange::GatewayClient;
use trade_orchestrator::store::{self, JsonStore};

use crate::bot::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    if cfg.service_secret.is_empty() {
        tracing::warn!("SERVICE_SECRET is empty; service tokens will be signed with an empty key");
    }

    let ledger = Arc::new(JsonStore::open(&cfg.data_dir)?);
    store::bootstrap(ledger.as_ref(), &cfg).await?;

    let gateway = Arc::new(GatewayClient::new(&cfg)?);
    let analysis = Arc::new(AnalysisClient::new(&cfg)?);
    let shared_config = cfg.shared();

    let mut orchestrator = Orchestrator::new(shared_config, ledger, gateway, analysis).await;
    orchestrator.run().await?;

    Ok(())
}
