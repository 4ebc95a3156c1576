use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::analysis::{AnalysisService, FeedbackRequest};
use crate::models::{Position, Signal, SignalOutcome};

/// Fire-and-forget delivery of trade outcomes to the analysis service.
#[derive(Clone)]
pub struct FeedbackDispatcher {
    analysis: Arc<dyn AnalysisService>,
    timeout: Duration,
}

impl FeedbackDispatcher {
    pub fn new(analysis: Arc<dyn AnalysisService>, timeout: Duration) -> Self {
        Self { analysis, timeout }
    }

    /// Spawn delivery for a closed position. The handle is only useful to
    /// tests; callers drop it.
    pub fn dispatch(&self, position: &Position, signal: &Signal, pnl: f64) -> JoinHandle<()> {
        let request = FeedbackRequest {
            symbol: position.symbol.clone(),
            outcome: SignalOutcome::from_pnl(pnl),
            pnl,
            metrics: signal.metrics.clone(),
        };
        let analysis = Arc::clone(&self.analysis);
        let timeout = self.timeout;

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, analysis.send_feedback(&request)).await {
                Ok(Ok(())) => debug!(
                    "Feedback delivered: {} {} {:+.2}",
                    request.symbol, request.outcome, request.pnl
                ),
                Ok(Err(e)) => warn!("Feedback for {} failed: {:#}", request.symbol, e),
                Err(_) => warn!(
                    "Feedback for {} timed out after {:?}",
                    request.symbol, timeout
                ),
            }
        })
    }
}
