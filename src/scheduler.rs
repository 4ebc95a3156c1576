//! Scan scheduling with a single-flight guard.
//!
//! Overlapping triggers are dropped, not queued. The guard flag lives in a
//! plain mutex that is never held across an await; the in-flight scan holds
//! a [`ScanGuard`] whose drop clears the flag on every exit path.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::core::ScanWindows;
use crate::models::ScanMode;
use crate::trading::pipeline::{RunSummary, ScanPipeline};

#[derive(Debug)]
struct ScanState {
    scanning: bool,
    mode: ScanMode,
    last_run_at: Option<DateTime<Utc>>,
    last_summary: Option<RunSummary>,
    last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub scanning: bool,
    pub mode: ScanMode,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_summary: Option<RunSummary>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Completed(RunSummary),
    /// Another scan was in flight; this trigger was dropped.
    Busy,
    OutsideWindow,
    Failed(String),
}

pub struct Scheduler {
    pipeline: Arc<ScanPipeline>,
    windows: ScanWindows,
    state: Mutex<ScanState>,
}

struct ScanGuard<'a> {
    state: &'a Mutex<ScanState>,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).scanning = false;
    }
}

fn lock(state: &Mutex<ScanState>) -> MutexGuard<'_, ScanState> {
    // The state is plain data; a panic elsewhere leaves it usable.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Scheduler {
    pub fn new(pipeline: Arc<ScanPipeline>, windows: ScanWindows, mode: ScanMode) -> Self {
        Self {
            pipeline,
            windows,
            state: Mutex::new(ScanState {
                scanning: false,
                mode,
                last_run_at: None,
                last_summary: None,
                last_error: None,
            }),
        }
    }

    pub fn mode(&self) -> ScanMode {
        lock(&self.state).mode
    }

    /// Takes effect from the next scan.
    pub fn set_mode(&self, mode: ScanMode) {
        let mut state = lock(&self.state);
        if state.mode != mode {
            info!("Scan mode changed: {} -> {}", state.mode, mode);
            state.mode = mode;
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = lock(&self.state);
        SchedulerStatus {
            scanning: state.scanning,
            mode: state.mode,
            last_run_at: state.last_run_at,
            last_summary: state.last_summary.clone(),
            last_error: state.last_error.clone(),
        }
    }

    /// Scheduled trigger: honours the configured scan windows.
    pub async fn tick(&self, now: DateTime<Utc>) -> TriggerOutcome {
        if !self.windows.is_open(now) {
            debug!("Outside scan windows, tick skipped");
            return TriggerOutcome::OutsideWindow;
        }
        self.run_single_flight("scheduled").await
    }

    /// Manual trigger: same guard, no window check.
    pub async fn trigger_manual(&self) -> TriggerOutcome {
        self.run_single_flight("manual").await
    }

    /// Run a tick on its own task so a slow scan never delays the next tick;
    /// the overlap is then dropped by the guard.
    pub fn spawn_tick(self: &Arc<Self>) -> JoinHandle<TriggerOutcome> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.tick(Utc::now()).await })
    }

    fn try_begin(&self) -> Option<(ScanGuard<'_>, ScanMode)> {
        let mut state = lock(&self.state);
        if state.scanning {
            return None;
        }
        state.scanning = true;
        let mode = state.mode;
        drop(state);
        Some((ScanGuard { state: &self.state }, mode))
    }

    async fn run_single_flight(&self, trigger: &str) -> TriggerOutcome {
        let Some((_guard, mode)) = self.try_begin() else {
            info!("Scan already in progress, {} trigger dropped", trigger);
            return TriggerOutcome::Busy;
        };

        info!("Starting {} scan (mode {})", trigger, mode);
        let result = self.pipeline.run(mode).await;

        let mut state = lock(&self.state);
        state.last_run_at = Some(Utc::now());
        match result {
            Ok(summary) => {
                state.last_summary = Some(summary.clone());
                state.last_error = None;
                TriggerOutcome::Completed(summary)
            }
            Err(e) => {
                error!("Scan failed: {}", e);
                state.last_error = Some(e.to_string());
                TriggerOutcome::Failed(e.to_string())
            }
        }
    }
}
