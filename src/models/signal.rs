use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{Direction, SignalOutcome, SignalStatus};

/// Indicator values captured when a signal was produced. Sent back to the
/// analysis service with the trade outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macd_signal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macd_histogram: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ema_fast: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ema_slow: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bb_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_interest_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fear_greed: Option<f64>,
}

impl SignalMetrics {
    /// Build from the analysis service's free-form map. Numbers and numeric
    /// strings are accepted, anything else is dropped.
    pub fn from_map(raw: &HashMap<String, Value>) -> Self {
        let num = |keys: &[&str]| -> Option<f64> {
            keys.iter().find_map(|k| match raw.get(*k)? {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            })
            .filter(|v| v.is_finite())
        };

        Self {
            rsi: num(&["rsi", "rsi_14"]),
            macd: num(&["macd"]),
            macd_signal: num(&["macd_signal"]),
            macd_histogram: num(&["macd_histogram", "macd_hist"]),
            atr: num(&["atr", "atr_14"]),
            adx: num(&["adx"]),
            ema_fast: num(&["ema_fast", "ema_20"]),
            ema_slow: num(&["ema_slow", "ema_50"]),
            bb_width: num(&["bb_width", "bollinger_width"]),
            volume_ratio: num(&["volume_ratio"]),
            funding_rate: num(&["funding_rate"]),
            open_interest_change: num(&["open_interest_change", "oi_change"]),
            fear_greed: num(&["fear_greed", "fear_greed_index"]),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == SignalMetrics::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// 0-100
    pub confidence: f64,
    #[serde(default)]
    pub technical_reasoning: String,
    #[serde(default)]
    pub sentiment_reasoning: String,
    #[serde(default)]
    pub suggested_margin: Option<f64>,
    #[serde(default)]
    pub metrics: SignalMetrics,
    pub status: SignalStatus,
    #[serde(default)]
    pub outcome: Option<SignalOutcome>,
    #[serde(default)]
    pub outcome_pnl: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Signal {
    /// Copy the trade parameters of a fresher emission into this record,
    /// keeping identity, status and creation time.
    pub fn refresh_from(&mut self, newer: &Signal) {
        self.direction = newer.direction;
        self.entry_price = newer.entry_price;
        self.stop_loss = newer.stop_loss;
        self.take_profit = newer.take_profit;
        self.confidence = newer.confidence;
        self.technical_reasoning = newer.technical_reasoning.clone();
        self.sentiment_reasoning = newer.sentiment_reasoning.clone();
        self.suggested_margin = newer.suggested_margin;
        self.metrics = newer.metrics.clone();
        self.updated_at = newer.updated_at;
    }
}
