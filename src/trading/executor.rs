use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{StoreError, TradeError};
use crate::exchange::{EntryOrder, ExecutionGateway, OrderFill};
use crate::models::position::round8;
use crate::models::{
    Position, PositionStatus, Signal, SignalStatus, TradingMode, UserSettings,
};
use crate::store::{self, Store};
use crate::trading::risk::{BalanceCheck, RiskGate, SizedOrder};

/// Turns a gated signal into a ledger position for one user.
pub struct ExecutionCoordinator {
    store: Arc<dyn Store>,
    gateway: Arc<dyn ExecutionGateway>,
    gate: RiskGate,
    trailing_callback_rate: Option<f64>,
}

impl ExecutionCoordinator {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn ExecutionGateway>, cfg: &Config) -> Self {
        Self {
            store,
            gateway,
            gate: RiskGate::new(cfg),
            trailing_callback_rate: cfg.trailing_callback_rate,
        }
    }

    /// Execute `signal` for `user_id`. Returns the persisted position, which
    /// is OPEN, or PENDING_APPROVAL for paper users without auto-trade.
    pub async fn execute(&self, user_id: &str, signal: &Signal) -> Result<Position, TradeError> {
        let mut user = self.store.get_user(user_id).await.map_err(|e| match e {
            StoreError::NotFound { .. } => TradeError::UserNotFound(user_id.to_string()),
            other => TradeError::Store(other),
        })?;

        let (sized, balance) = self.gate.evaluate(&mut user, signal)?;
        if let BalanceCheck::Replenished { .. } = balance {
            self.store.save_user(&user).await?;
        }

        // The batched remote check and order placement are not atomic; the
        // ledger is checked again right before submitting.
        if let Some(existing) = self.store.active_position(&user.id, &signal.symbol).await? {
            info!(
                user = %user.id,
                symbol = %signal.symbol,
                position = %existing.id,
                "Skipping {}: already {}",
                signal.symbol,
                existing.status
            );
            return Err(TradeError::DuplicatePosition {
                user_id: user.id.clone(),
                symbol: signal.symbol.clone(),
            });
        }

        match user.mode {
            TradingMode::Live => self.execute_live(&user, signal, &sized).await,
            TradingMode::Paper => self.execute_paper(&user, signal, &sized).await,
        }
    }

    async fn execute_live(
        &self,
        user: &UserSettings,
        signal: &Signal,
        sized: &SizedOrder,
    ) -> Result<Position, TradeError> {
        let credentials = user
            .credentials
            .clone()
            .ok_or_else(|| TradeError::MissingCredentials(user.id.clone()))?;

        let order = EntryOrder {
            symbol: signal.symbol.clone(),
            side: signal.direction.entry_side(),
            notional: sized.notional,
            leverage: sized.leverage,
            credentials,
            stop_loss: Some(signal.stop_loss).filter(|p| *p > 0.0),
            take_profit: Some(signal.take_profit).filter(|p| *p > 0.0),
            trailing_callback_rate: self.trailing_callback_rate,
        };

        info!(
            user = %user.id,
            "Submitting {} {} notional ${:.2} @ {}x",
            order.side, order.symbol, order.notional, order.leverage
        );

        let fill = self
            .gateway
            .place_entry(&order)
            .await
            .map_err(TradeError::Gateway)?;

        if !fill.is_filled() {
            warn!(
                user = %user.id,
                symbol = %signal.symbol,
                "Entry not filled: status {}",
                fill.status
            );
            return Err(TradeError::NotFilled {
                symbol: signal.symbol.clone(),
                status: fill.status,
            });
        }

        let (price, quantity) = fill_terms(&fill, sized);
        let mut position = new_position(
            user,
            signal,
            sized.leverage,
            price,
            quantity,
            PositionStatus::Open,
        );
        position.entry_order_id = fill.order_id.clone();

        // Persist before touching protective orders: the exchange position
        // must never exist without a ledger row if anything after this fails.
        if let Err(e) = self.store.insert_position(&position).await {
            error!(
                user = %user.id,
                symbol = %position.symbol,
                side = %position.side,
                quantity = position.size,
                price = position.entry_price,
                order_id = ?fill.order_id,
                "CRITICAL: entry filled on exchange but ledger write failed, reconcile manually: {}",
                e
            );
            self.fail_signal_unless_traded(signal, position.id).await;
            return Err(TradeError::PersistAfterFill {
                symbol: position.symbol,
                quantity: position.size,
                price: position.entry_price,
                source: e,
            });
        }

        self.record_protection(&mut position, &order, &fill).await;
        self.mark_executed(signal).await;

        info!(
            user = %user.id,
            position = %position.id,
            "Position opened: {} {} {:.8} @ ${:.4} ({}x)",
            position.side, position.symbol, position.size, position.entry_price, position.leverage
        );
        Ok(position)
    }

    async fn execute_paper(
        &self,
        user: &UserSettings,
        signal: &Signal,
        sized: &SizedOrder,
    ) -> Result<Position, TradeError> {
        let status = if user.auto_trade {
            PositionStatus::Open
        } else {
            PositionStatus::PendingApproval
        };
        let position = new_position(
            user,
            signal,
            sized.leverage,
            sized.entry_price,
            sized.quantity,
            status,
        );

        self.store
            .insert_position(&position)
            .await
            .map_err(|e| match e {
                StoreError::DuplicateActive { user_id, symbol } => {
                    TradeError::DuplicatePosition { user_id, symbol }
                }
                other => TradeError::Store(other),
            })?;

        if status == PositionStatus::Open {
            self.mark_executed(signal).await;
        }

        info!(
            user = %user.id,
            position = %position.id,
            "Paper position {}: {} {} {:.8} @ ${:.4} ({}x)",
            position.status, position.side, position.symbol, position.size, position.entry_price,
            position.leverage
        );
        Ok(position)
    }

    /// Best effort: a missing protective order is logged, never rolled back.
    async fn record_protection(&self, position: &mut Position, order: &EntryOrder, fill: &OrderFill) {
        if order.stop_loss.is_some() && fill.sl_order_id.is_none() {
            warn!(
                position = %position.id,
                "Stop-loss for {} was not placed; position is unprotected",
                position.symbol
            );
        }
        if order.take_profit.is_some() && fill.tp_order_id.is_none() {
            warn!(
                position = %position.id,
                "Take-profit for {} was not placed",
                position.symbol
            );
        }
        for err in &fill.protective_errors {
            warn!(position = %position.id, "Protective order error on {}: {}", position.symbol, err);
        }

        if fill.sl_order_id.is_none() && fill.tp_order_id.is_none() {
            return;
        }
        position.sl_order_id = fill.sl_order_id.clone();
        position.tp_order_id = fill.tp_order_id.clone();
        if let Err(e) = self.store.update_position(position).await {
            warn!(position = %position.id, "Failed to record protective order ids: {}", e);
        }
    }

    /// Other users' positions on the same signal keep it as it is.
    async fn fail_signal_unless_traded(&self, signal: &Signal, position_id: Uuid) {
        match store::signal_in_use(self.store.as_ref(), signal.id, position_id).await {
            Ok(true) => info!("Signal {} not marked FAILED: other positions use it", signal.id),
            Ok(false) => {
                if let Err(e) = self.store.set_signal_status(signal.id, SignalStatus::Failed).await {
                    error!("Signal {} status update failed: {}", signal.id, e);
                }
            }
            Err(e) => error!("Signal {} status update skipped: {}", signal.id, e),
        }
    }

    async fn mark_executed(&self, signal: &Signal) {
        if let Err(e) = self
            .store
            .set_signal_status(signal.id, SignalStatus::Executed)
            .await
        {
            error!("Signal {} could not be marked EXECUTED: {}", signal.id, e);
        }
    }
}

/// Actual fill terms, falling back to the estimate when the gateway omits them.
fn fill_terms(fill: &OrderFill, sized: &SizedOrder) -> (f64, f64) {
    let price = if fill.avg_price > 0.0 {
        fill.avg_price
    } else {
        warn!("Fill without average price, using quoted entry {}", sized.entry_price);
        sized.entry_price
    };
    let quantity = if fill.executed_qty > 0.0 {
        fill.executed_qty
    } else {
        warn!("Fill without executed quantity, using estimate {}", sized.quantity);
        sized.quantity
    };
    (price, round8(quantity))
}

fn new_position(
    user: &UserSettings,
    signal: &Signal,
    leverage: u32,
    entry_price: f64,
    size: f64,
    status: PositionStatus,
) -> Position {
    Position {
        id: Uuid::new_v4(),
        user_id: user.id.clone(),
        signal_id: Some(signal.id),
        symbol: signal.symbol.clone(),
        side: signal.direction,
        entry_price,
        stop_loss: signal.stop_loss,
        take_profit: signal.take_profit,
        size,
        leverage,
        mode: user.mode,
        status,
        closed_by: None,
        close_reason: None,
        exit_price: None,
        pnl: None,
        pnl_percent: None,
        entry_order_id: None,
        sl_order_id: None,
        tp_order_id: None,
        opened_at: Utc::now(),
        closed_at: None,
    }
}
