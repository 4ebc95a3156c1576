use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{StoreError, TradeError};
use crate::exchange::{CloseOrder, ExecutionGateway};
use crate::models::{
    ClosedBy, Position, PositionStatus, SignalOutcome, SignalStatus, TradingMode,
};
use crate::store::{self, Store};
use crate::trading::feedback::FeedbackDispatcher;

#[derive(Debug, Default)]
pub struct CloseAllReport {
    pub closed: Vec<Position>,
    pub failed: Vec<(Uuid, String)>,
}

/// Manual actions on positions: approve, decline, close, close-all.
pub struct LifecycleManager {
    store: Arc<dyn Store>,
    gateway: Arc<dyn ExecutionGateway>,
    feedback: FeedbackDispatcher,
    fee_rate: f64,
    closing: Mutex<HashSet<Uuid>>,
}

/// Releases a position's in-flight close marker on drop.
struct CloseGuard<'a> {
    closing: &'a Mutex<HashSet<Uuid>>,
    id: Uuid,
}

impl Drop for CloseGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.closing.lock() {
            set.remove(&self.id);
        }
    }
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn ExecutionGateway>,
        feedback: FeedbackDispatcher,
        cfg: &Config,
    ) -> Self {
        Self {
            store,
            gateway,
            feedback,
            fee_rate: cfg.taker_fee_rate,
            closing: Mutex::new(HashSet::new()),
        }
    }

    async fn owned_position(&self, position_id: Uuid, user_id: &str) -> Result<Position, TradeError> {
        let position = self.store.get_position(position_id).await.map_err(|e| match e {
            StoreError::NotFound { .. } => TradeError::PositionNotFound(position_id),
            other => TradeError::Store(other),
        })?;
        if position.user_id != user_id {
            warn!(
                user = %user_id,
                position = %position_id,
                "Rejected lifecycle action on a position owned by {}",
                position.user_id
            );
            return Err(TradeError::Unauthorized {
                user_id: user_id.to_string(),
                position_id,
            });
        }
        Ok(position)
    }

    /// PENDING_APPROVAL -> OPEN, signal -> EXECUTED.
    pub async fn approve(&self, position_id: Uuid, user_id: &str) -> Result<Position, TradeError> {
        let mut position = self.owned_position(position_id, user_id).await?;
        if position.status != PositionStatus::PendingApproval {
            return Err(TradeError::InvalidState {
                position_id,
                status: position.status,
                action: "approve",
            });
        }

        position.status = PositionStatus::Open;
        self.store.update_position(&position).await?;
        if let Some(signal_id) = position.signal_id {
            if let Err(e) = self.store.set_signal_status(signal_id, SignalStatus::Executed).await {
                error!("Signal {} could not be marked EXECUTED: {}", signal_id, e);
            }
        }

        info!(user = %user_id, position = %position_id, "Approved {} {}", position.side, position.symbol);
        Ok(position)
    }

    /// PENDING_APPROVAL -> REJECTED. The signal becomes REJECTED when no
    /// other position was opened from it.
    pub async fn decline(&self, position_id: Uuid, user_id: &str) -> Result<Position, TradeError> {
        let mut position = self.owned_position(position_id, user_id).await?;
        if position.status != PositionStatus::PendingApproval {
            return Err(TradeError::InvalidState {
                position_id,
                status: position.status,
                action: "decline",
            });
        }

        position.status = PositionStatus::Rejected;
        self.store.update_position(&position).await?;
        // Another user's copy of the signal may still be held, open or closed.
        if let Some(signal_id) = position.signal_id {
            match store::signal_in_use(self.store.as_ref(), signal_id, position.id).await {
                Ok(true) => debug!("Signal {} is in use elsewhere, not marking REJECTED", signal_id),
                Ok(false) => {
                    if let Err(e) =
                        self.store.set_signal_status(signal_id, SignalStatus::Rejected).await
                    {
                        error!("Signal {} could not be marked REJECTED: {}", signal_id, e);
                    }
                }
                Err(e) => error!("Signal {} status check failed: {}", signal_id, e),
            }
        }

        info!(user = %user_id, position = %position_id, "Declined {} {}", position.side, position.symbol);
        Ok(position)
    }

    /// OPEN -> CLOSED_MANUAL at the exchange fill (live) or market price (paper).
    pub async fn close_position(
        &self,
        position_id: Uuid,
        user_id: &str,
    ) -> Result<Position, TradeError> {
        let position = self.owned_position(position_id, user_id).await?;
        if position.status != PositionStatus::Open {
            return Err(TradeError::InvalidState {
                position_id,
                status: position.status,
                action: "close",
            });
        }

        let _guard = self.begin_close(&position)?;
        // Re-read under the guard; a concurrent close may have finished.
        let position = self.owned_position(position_id, user_id).await?;
        if position.status != PositionStatus::Open {
            return Err(TradeError::InvalidState {
                position_id,
                status: position.status,
                action: "close",
            });
        }

        let exit_price = match position.mode {
            TradingMode::Live => self.close_on_exchange(&position).await?,
            TradingMode::Paper => self
                .gateway
                .get_current_price(&position.symbol)
                .await
                .map_err(TradeError::Gateway)?,
        };

        self.settle(
            position,
            exit_price,
            PositionStatus::ClosedManual,
            ClosedBy::Manual,
        )
        .await
    }

    /// Close every OPEN position of `user_id`. Individual failures are
    /// logged and collected; the rest are still closed.
    pub async fn close_all(&self, user_id: &str) -> Result<CloseAllReport, TradeError> {
        let open = self.store.open_positions(user_id).await?;
        warn!(user = %user_id, "Closing all {} open positions", open.len());

        let mut report = CloseAllReport::default();
        for position in open {
            match self.close_position(position.id, user_id).await {
                Ok(closed) => report.closed.push(closed),
                Err(e) => {
                    error!(
                        user = %user_id,
                        position = %position.id,
                        "Close of {} failed during close-all: {}",
                        position.symbol,
                        e
                    );
                    report.failed.push((position.id, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Close an OPEN position at a price already known to the caller, such
    /// as a triggered paper stop.
    pub(crate) async fn close_at(
        &self,
        position: &Position,
        exit_price: f64,
        status: PositionStatus,
        closed_by: ClosedBy,
    ) -> Result<Position, TradeError> {
        let _guard = self.begin_close(position)?;
        let current = self
            .owned_position(position.id, &position.user_id)
            .await?;
        if current.status != PositionStatus::Open {
            return Err(TradeError::InvalidState {
                position_id: current.id,
                status: current.status,
                action: "close",
            });
        }
        self.settle(current, exit_price, status, closed_by).await
    }

    fn begin_close(&self, position: &Position) -> Result<CloseGuard<'_>, TradeError> {
        let mut set = self
            .closing
            .lock()
            .map_err(|_| TradeError::Store(StoreError::Backend("close registry poisoned".into())))?;
        if !set.insert(position.id) {
            return Err(TradeError::InvalidState {
                position_id: position.id,
                status: position.status,
                action: "close while another close is in progress",
            });
        }
        Ok(CloseGuard {
            closing: &self.closing,
            id: position.id,
        })
    }

    async fn close_on_exchange(&self, position: &Position) -> Result<f64, TradeError> {
        let user = self.store.get_user(&position.user_id).await?;
        let credentials = user
            .credentials
            .ok_or_else(|| TradeError::MissingCredentials(user.id.clone()))?;

        let order = CloseOrder {
            symbol: position.symbol.clone(),
            side: position.side.close_side(),
            quantity: position.size,
            credentials,
        };
        let fill = self
            .gateway
            .place_close(&order)
            .await
            .map_err(TradeError::Gateway)?;

        if !fill.is_filled() {
            return Err(TradeError::NotFilled {
                symbol: position.symbol.clone(),
                status: fill.status,
            });
        }
        if fill.avg_price > 0.0 {
            return Ok(fill.avg_price);
        }

        warn!(position = %position.id, "Close fill without price, using market price");
        self.gateway
            .get_current_price(&position.symbol)
            .await
            .map_err(TradeError::Gateway)
    }

    /// Stamp the close on the ledger, then update balance, signal review and
    /// feedback. Only the ledger write can fail the close.
    pub(crate) async fn settle(
        &self,
        mut position: Position,
        exit_price: f64,
        status: PositionStatus,
        closed_by: ClosedBy,
    ) -> Result<Position, TradeError> {
        let pnl = position.pnl_at(exit_price, self.fee_rate);
        position.mark_closed(status, closed_by, Some(exit_price), pnl.net, pnl.percent);
        self.store.update_position(&position).await?;

        let net = position.pnl.unwrap_or(0.0);
        info!(
            user = %position.user_id,
            position = %position.id,
            "Position {} {} {} closed ({}): ${:.4} -> ${:.4} PnL {:+.2} ({:+.2}%)",
            position.side,
            position.symbol,
            position.status,
            closed_by,
            position.entry_price,
            exit_price,
            net,
            position.pnl_percent.unwrap_or(0.0)
        );

        match self.store.get_user(&position.user_id).await {
            Ok(mut user) => {
                user.apply_pnl(position.mode, net);
                if let Err(e) = self.store.save_user(&user).await {
                    warn!(user = %user.id, "Balance update failed: {}", e);
                }
            }
            Err(e) => warn!(user = %position.user_id, "Balance update skipped: {}", e),
        }

        if let Some(signal_id) = position.signal_id {
            let outcome = SignalOutcome::from_pnl(net);
            if let Err(e) = self.store.record_signal_outcome(signal_id, outcome, net).await {
                warn!("Signal {} review update failed: {}", signal_id, e);
            }
            match self.store.get_signal(signal_id).await {
                Ok(signal) => {
                    self.feedback.dispatch(&position, &signal, net);
                }
                Err(e) => warn!("Feedback skipped, signal {} unavailable: {}", signal_id, e),
            }
        }

        Ok(position)
    }
}
