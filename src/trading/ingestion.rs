use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::Candidate;
use crate::config::Config;
use crate::error::TradeError;
use crate::exchange::ExecutionGateway;
use crate::models::{Credentials, Direction, Signal, SignalMetrics, SignalStatus};
use crate::store::{Store, UpsertOutcome};

/// Counts for one ingestion pass. Only `new_signals` go on to execution.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub candidates: usize,
    pub new_signals: Vec<Signal>,
    pub updated: usize,
    pub already_executed: usize,
    pub duplicate_in_batch: usize,
    pub remote_open: usize,
    pub not_actionable: usize,
    pub low_confidence: usize,
}

impl IngestReport {
    pub fn skipped(&self) -> usize {
        self.already_executed
            + self.duplicate_in_batch
            + self.remote_open
            + self.not_actionable
            + self.low_confidence
    }
}

pub struct SignalIngestor {
    store: Arc<dyn Store>,
    gateway: Arc<dyn ExecutionGateway>,
    min_confidence: f64,
    recency: Duration,
}

impl SignalIngestor {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn ExecutionGateway>, cfg: &Config) -> Self {
        Self {
            store,
            gateway,
            min_confidence: cfg.min_confidence,
            recency: Duration::seconds(cfg.signal_recency_secs),
        }
    }

    /// Filter and persist one batch of candidates.
    ///
    /// `remote` is the account whose exchange positions are checked; with
    /// `None` the remote layer is skipped and only the ledger protects
    /// against re-entry. A failed remote check aborts the batch.
    pub async fn ingest(
        &self,
        candidates: Vec<Candidate>,
        remote: Option<&Credentials>,
    ) -> Result<IngestReport, TradeError> {
        let mut report = IngestReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        if candidates.is_empty() {
            return Ok(report);
        }

        let mut symbols: Vec<String> = Vec::new();
        for c in &candidates {
            let symbol = normalize_symbol(&c.symbol);
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }

        // One round trip for the whole batch.
        let remote_open = match remote {
            Some(creds) => self
                .gateway
                .check_positions(&symbols, creds)
                .await
                .map_err(TradeError::Gateway)?,
            None => Default::default(),
        };

        let mut seen: HashSet<String> = HashSet::new();
        for candidate in candidates {
            let symbol = normalize_symbol(&candidate.symbol);

            if !seen.insert(symbol.clone()) {
                debug!("{}: duplicate candidate in batch, skipped", symbol);
                report.duplicate_in_batch += 1;
                continue;
            }

            if remote_open.get(&symbol).copied().unwrap_or(false) {
                debug!("{}: exchange already holds a position, skipped", symbol);
                report.remote_open += 1;
                continue;
            }

            let Some(direction) = Direction::parse_actionable(&candidate.direction) else {
                debug!("{}: {} is not actionable", symbol, candidate.direction);
                report.not_actionable += 1;
                continue;
            };

            if candidate.confidence < self.min_confidence {
                debug!(
                    "{}: confidence {:.1} below {:.1}",
                    symbol, candidate.confidence, self.min_confidence
                );
                report.low_confidence += 1;
                continue;
            }

            let signal = to_signal(symbol, direction, candidate);
            match self.store.upsert_signal(signal, self.recency).await? {
                UpsertOutcome::Inserted(signal) => {
                    info!(
                        signal = %signal.id,
                        "New signal: {} {} @ {} (SL {} / TP {}) confidence {:.1}",
                        signal.direction,
                        signal.symbol,
                        signal.entry_price,
                        signal.stop_loss,
                        signal.take_profit,
                        signal.confidence
                    );
                    report.new_signals.push(signal);
                }
                UpsertOutcome::Updated(signal) => {
                    debug!(signal = %signal.id, "Refreshed pending signal {}", signal.symbol);
                    report.updated += 1;
                }
                UpsertOutcome::AlreadyExecuted(signal) => {
                    debug!(signal = %signal.id, "{} already executed recently", signal.symbol);
                    report.already_executed += 1;
                }
            }
        }

        Ok(report)
    }
}

pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

fn to_signal(symbol: String, direction: Direction, c: Candidate) -> Signal {
    let now = Utc::now();
    Signal {
        id: Uuid::new_v4(),
        symbol,
        direction,
        entry_price: c.entry_price,
        stop_loss: c.stop_loss,
        take_profit: c.take_profit,
        confidence: c.confidence,
        technical_reasoning: c.technical_reasoning,
        sentiment_reasoning: c.sentiment_reasoning,
        suggested_margin: c.suggested_margin,
        metrics: SignalMetrics::from_map(&c.metrics),
        status: SignalStatus::Pending,
        outcome: None,
        outcome_pnl: None,
        created_at: now,
        updated_at: now,
    }
}
