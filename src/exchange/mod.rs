pub mod gateway;

pub use gateway::GatewayClient;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{Credentials, OrderSide};

/// Market entry with attached protective orders.
#[derive(Debug, Clone, Serialize)]
pub struct EntryOrder {
    pub symbol: String,
    pub side: OrderSide,
    /// Target notional in quote currency.
    pub notional: f64,
    pub leverage: u32,
    pub credentials: Credentials,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailing_callback_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CloseOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    /// Exchange order status, e.g. "FILLED", "NEW", "REJECTED".
    pub status: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub avg_price: f64,
    #[serde(default)]
    pub executed_qty: f64,
    #[serde(default)]
    pub sl_order_id: Option<String>,
    #[serde(default)]
    pub tp_order_id: Option<String>,
    #[serde(default)]
    pub trailing_order_id: Option<String>,
    /// Errors the gateway hit while placing protective orders.
    #[serde(default)]
    pub protective_errors: Vec<String>,
}

impl OrderFill {
    pub fn is_filled(&self) -> bool {
        self.status.eq_ignore_ascii_case("FILLED")
    }
}

/// Execution gateway in front of the exchange account.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn place_entry(&self, order: &EntryOrder) -> Result<OrderFill>;
    async fn place_close(&self, order: &CloseOrder) -> Result<OrderFill>;
    /// One round trip for all `symbols`; `true` means the exchange holds a
    /// position. Symbols missing from the map are treated as `false`.
    async fn check_positions(
        &self,
        symbols: &[String],
        credentials: &Credentials,
    ) -> Result<HashMap<String, bool>>;
    async fn get_balance(&self, credentials: &Credentials) -> Result<f64>;
    async fn get_current_price(&self, symbol: &str) -> Result<f64>;
    async fn health(&self) -> Result<()>;
}
