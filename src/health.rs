use serde::Serialize;
use tracing::{debug, warn};

use crate::analysis::AnalysisService;
use crate::exchange::ExecutionGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub gateway: bool,
    pub analysis: bool,
}

impl HealthReport {
    pub fn all_up(&self) -> bool {
        self.gateway && self.analysis
    }
}

/// Ping both collaborators. Failures are logged, never raised.
pub async fn check(gateway: &dyn ExecutionGateway, analysis: &dyn AnalysisService) -> HealthReport {
    let (g, a) = tokio::join!(gateway.health(), analysis.health());

    let report = HealthReport {
        gateway: g.is_ok(),
        analysis: a.is_ok(),
    };
    if let Err(e) = g {
        warn!("Execution gateway unhealthy: {:#}", e);
    }
    if let Err(e) = a {
        warn!("Analysis service unhealthy: {:#}", e);
    }
    if report.all_up() {
        debug!("Health check passed");
    }
    report
}
