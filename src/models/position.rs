use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ClosedBy, Direction, PositionStatus, TradingMode};

/// Close reason recorded when reconciliation removes a ghost position.
pub const SYNC_CLOSE_REASON: &str = "sync";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub user_id: String,
    #[serde(default)]
    pub signal_id: Option<Uuid>,
    pub symbol: String,
    pub side: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Base-asset quantity.
    pub size: f64,
    pub leverage: u32,
    pub mode: TradingMode,
    pub status: PositionStatus,
    #[serde(default)]
    pub closed_by: Option<ClosedBy>,
    #[serde(default)]
    pub close_reason: Option<String>,
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub pnl: Option<f64>,
    #[serde(default)]
    pub pnl_percent: Option<f64>,
    #[serde(default)]
    pub entry_order_id: Option<String>,
    #[serde(default)]
    pub sl_order_id: Option<String>,
    #[serde(default)]
    pub tp_order_id: Option<String>,
    pub opened_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

/// Realized result of closing `size` at `exit_price`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PnlBreakdown {
    pub gross: f64,
    pub fees: f64,
    pub net: f64,
    /// Net PnL relative to margin, in percent.
    pub percent: f64,
}

impl Position {
    pub fn notional(&self) -> f64 {
        self.size * self.entry_price
    }

    /// Capital committed: notional divided by leverage.
    pub fn margin(&self) -> f64 {
        self.notional() / self.leverage.max(1) as f64
    }

    /// PnL of a full close at `exit_price`, charging `fee_rate` on both the
    /// entry and the exit leg.
    pub fn pnl_at(&self, exit_price: f64, fee_rate: f64) -> PnlBreakdown {
        let gross = match self.side {
            Direction::Long => (exit_price - self.entry_price) * self.size,
            Direction::Short => (self.entry_price - exit_price) * self.size,
        };
        let fees = (self.entry_price * self.size + exit_price * self.size) * fee_rate;
        let net = gross - fees;
        let margin = self.margin();
        let percent = if margin > 0.0 { net / margin * 100.0 } else { 0.0 };

        PnlBreakdown {
            gross,
            fees,
            net,
            percent,
        }
    }

    /// Move an OPEN position into a closed state and stamp the outcome.
    pub fn mark_closed(
        &mut self,
        status: PositionStatus,
        closed_by: ClosedBy,
        exit_price: Option<f64>,
        pnl: f64,
        pnl_percent: f64,
    ) {
        self.status = status;
        self.closed_by = Some(closed_by);
        self.exit_price = exit_price;
        self.pnl = Some(round2(pnl));
        self.pnl_percent = Some(round2(pnl_percent));
        self.closed_at = Some(Utc::now());
    }
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn round8(x: f64) -> f64 {
    (x * 1e8).round() / 1e8
}
