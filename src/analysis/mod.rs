pub mod client;

pub use client::AnalysisClient;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::models::{ScanMode, SignalMetrics, SignalOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub balance: f64,
    pub mode: ScanMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Vec<String>>,
}

/// One trade candidate as the analysis service returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    /// "LONG", "SHORT", or a neutral answer such as "WAIT".
    pub direction: String,
    /// 0-100
    pub confidence: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    #[serde(default)]
    pub technical_reasoning: String,
    #[serde(default)]
    pub sentiment_reasoning: String,
    #[serde(default)]
    pub suggested_margin: Option<f64>,
    #[serde(default)]
    pub metrics: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackRequest {
    pub symbol: String,
    pub outcome: SignalOutcome,
    pub pnl: f64,
    pub metrics: SignalMetrics,
}

#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Vec<Candidate>>;
    async fn send_feedback(&self, feedback: &FeedbackRequest) -> Result<()>;
    async fn health(&self) -> Result<()>;
}
