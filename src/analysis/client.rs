use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::analysis::{AnalysisRequest, AnalysisService, Candidate, FeedbackRequest};
use crate::config::Config;
use crate::http::ServiceClient;

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

/// HTTP client for the analysis (candidate scoring) service.
pub struct AnalysisClient {
    http: ServiceClient,
}

impl AnalysisClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        Ok(Self {
            http: ServiceClient::new(
                &cfg.analysis_url,
                "analysis",
                &cfg.service_secret,
                Duration::from_secs(cfg.http_timeout_secs),
            )?,
        })
    }
}

#[async_trait]
impl AnalysisService for AnalysisClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Vec<Candidate>> {
        let resp: AnalysisResponse = self
            .http
            .post_json("/analyze", request)
            .await
            .context("Analysis request failed")?;
        Ok(resp.candidates)
    }

    async fn send_feedback(&self, feedback: &FeedbackRequest) -> Result<()> {
        let _: serde_json::Value = self
            .http
            .post_json("/feedback", feedback)
            .await
            .with_context(|| format!("Feedback for {} failed", feedback.symbol))?;
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        self.http.ping("/health").await
    }
}
