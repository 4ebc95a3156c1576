use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::models::{Credentials, ScanMode, TradingMode, UserSettings};

pub type SharedConfig = Arc<RwLock<Config>>;

/// A daily window, as (hour, minute) pairs in the scan timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWindow {
    pub start: (u32, u32),
    pub end: (u32, u32),
}

impl ScanWindow {
    /// Parse `"HH:MM-HH:MM"`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (start, end) = raw.trim().split_once('-')?;
        Some(Self {
            start: parse_hm(start)?,
            end: parse_hm(end)?,
        })
    }

    /// Parse a comma-separated list, skipping malformed entries.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.split(',')
            .filter(|s| !s.trim().is_empty())
            .filter_map(|s| {
                let parsed = Self::parse(s);
                if parsed.is_none() {
                    warn!("Ignoring malformed scan window '{}'", s.trim());
                }
                parsed
            })
            .collect()
    }
}

fn parse_hm(raw: &str) -> Option<(u32, u32)> {
    let (h, m) = raw.trim().split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    (h < 24 && m < 60).then_some((h, m))
}

/// User created on first start when the ledger has none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapUser {
    pub id: String,
    pub mode: TradingMode,
    pub auto_trade: bool,
    pub fixed_margin: Option<f64>,
    pub leverage: u32,
    pub api_key: String,
    pub api_secret: String,
}

impl BootstrapUser {
    pub fn to_user(&self, paper_balance: f64) -> UserSettings {
        let credentials = (!self.api_key.is_empty() && !self.api_secret.is_empty()).then(|| {
            Credentials {
                api_key: self.api_key.clone(),
                api_secret: self.api_secret.clone(),
            }
        });
        UserSettings {
            id: self.id.clone(),
            name: self.id.clone(),
            mode: self.mode,
            auto_trade: self.auto_trade,
            fixed_margin: self.fixed_margin,
            leverage: self.leverage,
            paper_balance,
            live_balance: 0.0,
            credentials,
            active: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Collaborators
    pub analysis_url: String,
    pub gateway_url: String,
    pub service_secret: String,
    pub http_timeout_secs: u64,

    // Cadence
    pub scan_interval_secs: u64,
    pub reconcile_interval_secs: u64,
    pub health_interval_secs: u64,
    pub monitor_interval_secs: u64,

    // Scan gating
    pub scan_windows: Vec<ScanWindow>,
    pub scan_timezone: Tz,
    pub scan_mode: ScanMode,

    // Ingestion
    /// 0-100
    pub min_confidence: f64,
    pub signal_recency_secs: i64,

    // Risk & sizing
    pub min_notional: f64,
    pub max_leverage: u32,
    pub default_margin: f64,
    /// Per leg, as fraction (0.0005 = 0.05%).
    pub taker_fee_rate: f64,
    pub paper_balance: f64,
    pub trailing_callback_rate: Option<f64>,

    // Feedback
    pub feedback_timeout_secs: u64,

    // Storage & logging
    pub data_dir: String,
    pub log_level: String,

    pub bootstrap_user: BootstrapUser,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let scan_timezone: Tz = env("SCAN_TIMEZONE", "UTC").parse().unwrap_or(Tz::UTC);
        let fixed_margin: Option<f64> = std::env::var("DEFAULT_USER_MARGIN")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|m: &f64| *m > 0.0);

        Config {
            analysis_url: env("ANALYSIS_URL", "http://127.0.0.1:8001"),
            gateway_url: env("GATEWAY_URL", "http://127.0.0.1:8002"),
            service_secret: env("SERVICE_SECRET", ""),
            http_timeout_secs: env("HTTP_TIMEOUT_SECS", "30").parse().unwrap_or(30),
            scan_interval_secs: env("SCAN_INTERVAL_SECS", "300").parse().unwrap_or(300),
            reconcile_interval_secs: env("RECONCILE_INTERVAL_SECS", "60").parse().unwrap_or(60),
            health_interval_secs: env("HEALTH_INTERVAL_SECS", "60").parse().unwrap_or(60),
            monitor_interval_secs: env("MONITOR_INTERVAL_SECS", "15").parse().unwrap_or(15),
            scan_windows: ScanWindow::parse_list(&env("SCAN_WINDOWS", "")),
            scan_timezone,
            scan_mode: ScanMode::parse(&env("SCAN_MODE", "BALANCED")).unwrap_or(ScanMode::Balanced),
            min_confidence: env("MIN_CONFIDENCE", "70").parse().unwrap_or(70.0),
            signal_recency_secs: env("SIGNAL_RECENCY_SECS", "300").parse().unwrap_or(300),
            min_notional: env("MIN_NOTIONAL", "5").parse().unwrap_or(5.0),
            max_leverage: env("MAX_LEVERAGE", "125").parse().unwrap_or(125),
            default_margin: env("DEFAULT_MARGIN", "10").parse().unwrap_or(10.0),
            taker_fee_rate: env("TAKER_FEE_RATE", "0.0005").parse().unwrap_or(0.0005),
            paper_balance: env("PAPER_BALANCE", "10000").parse().unwrap_or(10_000.0),
            trailing_callback_rate: std::env::var("TRAILING_CALLBACK_RATE")
                .ok()
                .and_then(|s| s.parse().ok()),
            feedback_timeout_secs: env("FEEDBACK_TIMEOUT_SECS", "10").parse().unwrap_or(10),
            data_dir: env("DATA_DIR", "data"),
            log_level: env("LOG_LEVEL", "info"),
            bootstrap_user: BootstrapUser {
                id: env("DEFAULT_USER_ID", "default"),
                mode: TradingMode::parse(&env("DEFAULT_USER_MODE", "PAPER"))
                    .unwrap_or(TradingMode::Paper),
                auto_trade: env("DEFAULT_USER_AUTO_TRADE", "true").to_lowercase() == "true",
                fixed_margin,
                leverage: env("DEFAULT_USER_LEVERAGE", "10").parse().unwrap_or(10),
                api_key: env("EXCHANGE_API_KEY", ""),
                api_secret: env("EXCHANGE_API_SECRET", ""),
            },
        }
    }

    pub fn shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }
}
