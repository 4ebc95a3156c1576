use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::TradingMode;

/// Exchange API credentials forwarded to the execution gateway.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("api_secret", &"***")
            .finish()
    }
}

fn mask(key: &str) -> String {
    if key.chars().count() <= 4 {
        "***".to_string()
    } else {
        format!("{}***", key.chars().take(4).collect::<String>())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub mode: TradingMode,
    /// When off, paper positions wait in PENDING_APPROVAL.
    #[serde(default)]
    pub auto_trade: bool,
    /// Margin committed per order, in quote currency.
    #[serde(default)]
    pub fixed_margin: Option<f64>,
    pub leverage: u32,
    #[serde(default)]
    pub paper_balance: f64,
    /// Last balance reported by the exchange. Zero means unknown.
    #[serde(default)]
    pub live_balance: f64,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl UserSettings {
    pub fn is_live(&self) -> bool {
        self.mode == TradingMode::Live
    }

    pub fn balance(&self) -> f64 {
        match self.mode {
            TradingMode::Paper => self.paper_balance,
            TradingMode::Live => self.live_balance,
        }
    }

    /// Apply realized PnL to whichever balance the position traded against.
    pub fn apply_pnl(&mut self, mode: TradingMode, pnl: f64) {
        match mode {
            TradingMode::Paper => self.paper_balance += pnl,
            TradingMode::Live => self.live_balance += pnl,
        }
    }
}
