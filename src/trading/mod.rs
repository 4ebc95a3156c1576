pub mod executor;
pub mod feedback;
pub mod ingestion;
pub mod lifecycle;
pub mod monitor;
pub mod pipeline;
pub mod reconcile;
pub mod risk;

pub use executor::ExecutionCoordinator;
pub use feedback::FeedbackDispatcher;
pub use ingestion::{IngestReport, SignalIngestor};
pub use lifecycle::{CloseAllReport, LifecycleManager};
pub use monitor::ExitMonitor;
pub use pipeline::{RunSummary, ScanPipeline};
pub use reconcile::{ReconcileReport, Reconciler};
pub use risk::{BalanceCheck, RiskGate, SizedOrder};
