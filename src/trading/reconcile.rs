use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::TradeError;
use crate::exchange::ExecutionGateway;
use crate::models::{
    ClosedBy, Position, PositionStatus, TradingMode, UserSettings, SYNC_CLOSE_REASON,
};
use crate::store::Store;

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub users_checked: usize,
    pub users_failed: usize,
    pub positions_checked: usize,
    pub closed: Vec<Position>,
}

/// Closes ledger positions the exchange no longer holds.
pub struct Reconciler {
    store: Arc<dyn Store>,
    gateway: Arc<dyn ExecutionGateway>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn ExecutionGateway>) -> Self {
        Self { store, gateway }
    }

    /// Reconcile every user holding OPEN live positions, whatever mode the
    /// user is in now. A failing user is logged and skipped.
    pub async fn run_all(&self) -> Result<ReconcileReport, TradeError> {
        let mut report = ReconcileReport::default();

        for user in self.store.list_users().await? {
            let live = self.open_live_positions(&user.id).await?;
            if live.is_empty() {
                continue;
            }
            if user.credentials.is_none() {
                warn!(
                    user = %user.id,
                    "{} open live position(s) but no credentials, cannot reconcile",
                    live.len()
                );
                continue;
            }
            report.users_checked += 1;
            match self.reconcile_user(&user).await {
                Ok((checked, closed)) => {
                    report.positions_checked += checked;
                    report.closed.extend(closed);
                }
                Err(e) => {
                    report.users_failed += 1;
                    warn!(user = %user.id, "Reconciliation skipped: {}", e);
                }
            }
        }

        if !report.closed.is_empty() {
            info!(
                "Reconciliation closed {} ghost position(s) across {} user(s)",
                report.closed.len(),
                report.users_checked
            );
        }
        Ok(report)
    }

    /// Returns (positions checked, positions closed) for one user.
    pub async fn reconcile_user(
        &self,
        user: &UserSettings,
    ) -> Result<(usize, Vec<Position>), TradeError> {
        let credentials = user
            .credentials
            .as_ref()
            .ok_or_else(|| TradeError::MissingCredentials(user.id.clone()))?;

        let open = self.open_live_positions(&user.id).await?;
        if open.is_empty() {
            return Ok((0, Vec::new()));
        }

        let mut symbols: Vec<String> = open.iter().map(|p| p.symbol.clone()).collect();
        symbols.sort();
        symbols.dedup();

        let held = self
            .gateway
            .check_positions(&symbols, credentials)
            .await
            .map_err(TradeError::Gateway)?;

        let mut closed = Vec::new();
        for pos in &open {
            if held.get(&pos.symbol).copied().unwrap_or(false) {
                continue;
            }

            // Skip anything closed by another path since the listing.
            let mut current = self.store.get_position(pos.id).await?;
            if current.status != PositionStatus::Open {
                debug!(position = %pos.id, "Already {}, not reconciling", current.status);
                continue;
            }

            current.mark_closed(PositionStatus::ClosedManual, ClosedBy::Manual, None, 0.0, 0.0);
            current.close_reason = Some(SYNC_CLOSE_REASON.to_string());
            self.store.update_position(&current).await?;

            warn!(
                user = %user.id,
                position = %current.id,
                "{} {} not held on exchange, closed as ghost",
                current.side,
                current.symbol
            );
            closed.push(current);
        }

        Ok((open.len(), closed))
    }

    /// Paper positions never reach the exchange and are left to the exit monitor.
    async fn open_live_positions(&self, user_id: &str) -> Result<Vec<Position>, TradeError> {
        let mut open = self.store.open_positions(user_id).await?;
        open.retain(|p| p.mode == TradingMode::Live);
        Ok(open)
    }
}
