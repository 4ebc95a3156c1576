use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::analysis::{AnalysisRequest, AnalysisService};
use crate::config::Config;
use crate::error::TradeError;
use crate::exchange::ExecutionGateway;
use crate::models::{ScanMode, SignalStatus, UserSettings};
use crate::store::Store;
use crate::trading::executor::ExecutionCoordinator;
use crate::trading::ingestion::SignalIngestor;

/// Outcome of one scan run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: ScanMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub candidates: usize,
    pub new_signals: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Positions created (OPEN or PENDING_APPROVAL).
    pub executed: usize,
    /// Attempts rejected by the risk gate or the ledger check.
    pub rejected: usize,
    /// Attempts that failed at the gateway or the ledger.
    pub failed: usize,
}

impl RunSummary {
    fn empty(mode: ScanMode, started_at: DateTime<Utc>) -> Self {
        Self {
            mode,
            started_at,
            finished_at: started_at,
            candidates: 0,
            new_signals: 0,
            updated: 0,
            skipped: 0,
            executed: 0,
            rejected: 0,
            failed: 0,
        }
    }
}

/// One scan: analysis -> ingestion -> per-user execution.
pub struct ScanPipeline {
    store: Arc<dyn Store>,
    gateway: Arc<dyn ExecutionGateway>,
    analysis: Arc<dyn AnalysisService>,
    ingestor: SignalIngestor,
    executor: ExecutionCoordinator,
}

impl ScanPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn ExecutionGateway>,
        analysis: Arc<dyn AnalysisService>,
        cfg: &Config,
    ) -> Self {
        Self {
            ingestor: SignalIngestor::new(store.clone(), gateway.clone(), cfg),
            executor: ExecutionCoordinator::new(store.clone(), gateway.clone(), cfg),
            store,
            gateway,
            analysis,
        }
    }

    pub async fn run(&self, mode: ScanMode) -> Result<RunSummary, TradeError> {
        let mut summary = RunSummary::empty(mode, Utc::now());

        let mut users: Vec<UserSettings> = self
            .store
            .list_users()
            .await?
            .into_iter()
            .filter(|u| u.active)
            .collect();
        if users.is_empty() {
            info!("No active users, scan skipped");
            summary.finished_at = Utc::now();
            return Ok(summary);
        }

        self.refresh_live_balances(&mut users).await;

        let request = AnalysisRequest {
            balance: users[0].balance(),
            mode,
            symbols: None,
        };
        let candidates = self
            .analysis
            .analyze(&request)
            .await
            .map_err(TradeError::Analysis)?;
        info!(
            "Analysis returned {} candidate(s) (mode {}, balance {:.2})",
            candidates.len(),
            mode,
            request.balance
        );

        let remote = users
            .iter()
            .find(|u| u.is_live())
            .and_then(|u| u.credentials.as_ref());
        let report = self.ingestor.ingest(candidates, remote).await?;

        summary.candidates = report.candidates;
        summary.new_signals = report.new_signals.len();
        summary.updated = report.updated;
        summary.skipped = report.skipped();

        // Sequential on purpose: the ledger check before each submission
        // only holds if no other submission is in flight.
        for signal in &report.new_signals {
            let mut succeeded = 0;
            for user in &users {
                match self.executor.execute(&user.id, signal).await {
                    Ok(position) => {
                        succeeded += 1;
                        debug!(user = %user.id, position = %position.id, "Executed {}", signal.symbol);
                    }
                    Err(e) if e.is_pre_trade_rejection() => {
                        summary.rejected += 1;
                        info!(user = %user.id, "{} rejected: {}", signal.symbol, e);
                    }
                    Err(e) => {
                        summary.failed += 1;
                        error!(user = %user.id, "{} execution failed: {}", signal.symbol, e);
                    }
                }
            }
            summary.executed += succeeded;

            if succeeded == 0 {
                if let Err(e) = self
                    .store
                    .set_signal_status(signal.id, SignalStatus::Failed)
                    .await
                {
                    warn!("Signal {} could not be marked FAILED: {}", signal.id, e);
                }
            }
        }

        summary.finished_at = Utc::now();
        info!(
            "Scan complete: {} candidates, {} new, {} updated, {} skipped, {} executed, {} rejected, {} failed",
            summary.candidates,
            summary.new_signals,
            summary.updated,
            summary.skipped,
            summary.executed,
            summary.rejected,
            summary.failed
        );
        Ok(summary)
    }

    /// Live balances are cached on the user row; a failed refresh keeps the
    /// previous value.
    async fn refresh_live_balances(&self, users: &mut [UserSettings]) {
        for user in users.iter_mut().filter(|u| u.is_live()) {
            let Some(credentials) = user.credentials.as_ref() else {
                continue;
            };
            match self.gateway.get_balance(credentials).await {
                Ok(balance) => {
                    user.live_balance = balance;
                    if let Err(e) = self.store.save_user(user).await {
                        warn!(user = %user.id, "Could not cache live balance: {}", e);
                    }
                }
                Err(e) => warn!(user = %user.id, "Balance refresh failed: {:#}", e),
            }
        }
    }
}
