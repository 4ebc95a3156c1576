use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use trade_orchestrator::analysis::AnalysisService;
use trade_orchestrator::config::SharedConfig;
use trade_orchestrator::core::ScanWindows;
use trade_orchestrator::exchange::ExecutionGateway;
use trade_orchestrator::health;
use trade_orchestrator::scheduler::{Scheduler, TriggerOutcome};
use trade_orchestrator::store::Store;
use trade_orchestrator::trading::{
    ExitMonitor, FeedbackDispatcher, LifecycleManager, Reconciler, ScanPipeline,
};

/// Wait for an in-flight scan before exiting so no order is cut mid-way.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub struct Orchestrator {
    config: SharedConfig,
    store: Arc<dyn Store>,
    gateway: Arc<dyn ExecutionGateway>,
    analysis: Arc<dyn AnalysisService>,
    scheduler: Arc<Scheduler>,
    reconciler: Arc<Reconciler>,
    monitor: Arc<ExitMonitor>,
    drivers: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    pub async fn new(
        config: SharedConfig,
        store: Arc<dyn Store>,
        gateway: Arc<dyn ExecutionGateway>,
        analysis: Arc<dyn AnalysisService>,
    ) -> Self {
        let cfg = config.read().await;

        info!("{}", "=".repeat(60));
        info!("Trade orchestrator starting up");
        info!("Analysis service: {}", cfg.analysis_url);
        info!("Execution gateway: {}", cfg.gateway_url);
        info!("Scan: every {}s, mode {}", cfg.scan_interval_secs, cfg.scan_mode);
        if cfg.scan_windows.is_empty() {
            info!("Scan windows: always open");
        } else {
            for w in &cfg.scan_windows {
                info!(
                    "Scan window: {:02}:{:02}-{:02}:{:02} {}",
                    w.start.0, w.start.1, w.end.0, w.end.1, cfg.scan_timezone
                );
            }
        }
        info!(
            "Reconcile every {}s | exit monitor every {}s | health every {}s",
            cfg.reconcile_interval_secs, cfg.monitor_interval_secs, cfg.health_interval_secs
        );
        info!("{}", "=".repeat(60));

        let pipeline = Arc::new(ScanPipeline::new(
            store.clone(),
            gateway.clone(),
            analysis.clone(),
            &cfg,
        ));
        let scheduler = Arc::new(Scheduler::new(
            pipeline,
            ScanWindows::from_config(&cfg),
            cfg.scan_mode,
        ));
        let feedback = FeedbackDispatcher::new(
            analysis.clone(),
            Duration::from_secs(cfg.feedback_timeout_secs),
        );
        let lifecycle = Arc::new(LifecycleManager::new(
            store.clone(),
            gateway.clone(),
            feedback,
            &cfg,
        ));
        let monitor = Arc::new(ExitMonitor::new(
            store.clone(),
            gateway.clone(),
            lifecycle,
            &cfg,
        ));
        let reconciler = Arc::new(Reconciler::new(store.clone(), gateway.clone()));

        drop(cfg);

        Self {
            config,
            store,
            gateway,
            analysis,
            scheduler,
            reconciler,
            monitor,
            drivers: Vec::new(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let cfg = self.config.read().await.clone();

        self.spawn_scan_driver(cfg.scan_interval_secs);
        self.spawn_reconcile_driver(cfg.reconcile_interval_secs);
        self.spawn_monitor_driver(cfg.monitor_interval_secs);
        self.spawn_health_driver(cfg.health_interval_secs);
        #[cfg(unix)]
        self.spawn_manual_trigger()?;

        info!("Orchestrator is now running. Press Ctrl+C to stop.");
        self.print_status().await;

        tokio::signal::ctrl_c().await?;
        self.shutdown().await;
        Ok(())
    }

    fn spawn_scan_driver(&mut self, secs: u64) {
        let scheduler = self.scheduler.clone();
        self.drivers.push(tokio::spawn(async move {
            let mut ticker = every(secs);
            loop {
                ticker.tick().await;
                // Spawned: a tick that lands on a running scan is dropped by
                // the scheduler instead of waiting here.
                let handle = scheduler.spawn_tick();
                tokio::spawn(async move {
                    match handle.await {
                        Ok(TriggerOutcome::Failed(e)) => error!("Scheduled scan failed: {}", e),
                        Ok(_) => {}
                        Err(e) => error!("Scan task panicked: {}", e),
                    }
                });
            }
        }));
    }

    fn spawn_reconcile_driver(&mut self, secs: u64) {
        let reconciler = self.reconciler.clone();
        self.drivers.push(tokio::spawn(async move {
            let mut ticker = every(secs);
            loop {
                ticker.tick().await;
                if let Err(e) = reconciler.run_all().await {
                    error!("Reconciliation failed: {}", e);
                }
            }
        }));
    }

    fn spawn_monitor_driver(&mut self, secs: u64) {
        let monitor = self.monitor.clone();
        self.drivers.push(tokio::spawn(async move {
            let mut ticker = every(secs);
            loop {
                ticker.tick().await;
                if let Err(e) = monitor.check_positions().await {
                    error!("Exit monitor failed: {}", e);
                }
            }
        }));
    }

    fn spawn_health_driver(&mut self, secs: u64) {
        let gateway = self.gateway.clone();
        let analysis = self.analysis.clone();
        self.drivers.push(tokio::spawn(async move {
            let mut ticker = every(secs);
            loop {
                ticker.tick().await;
                health::check(gateway.as_ref(), analysis.as_ref()).await;
            }
        }));
    }

    /// `kill -USR1 <pid>` runs a scan now, outside the scan windows.
    #[cfg(unix)]
    fn spawn_manual_trigger(&mut self) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut usr1 = signal(SignalKind::user_defined1())?;
        let scheduler = self.scheduler.clone();
        self.drivers.push(tokio::spawn(async move {
            while usr1.recv().await.is_some() {
                info!("Manual scan requested");
                let scheduler = scheduler.clone();
                tokio::spawn(async move {
                    match scheduler.trigger_manual().await {
                        TriggerOutcome::Completed(s) => info!(
                            "Manual scan done: {} new, {} executed",
                            s.new_signals, s.executed
                        ),
                        TriggerOutcome::Busy => warn!("Manual scan dropped: scan in progress"),
                        TriggerOutcome::Failed(e) => error!("Manual scan failed: {}", e),
                        TriggerOutcome::OutsideWindow => {}
                    }
                });
            }
        }));
        Ok(())
    }

    async fn print_status(&self) {
        let status = self.scheduler.status();
        info!("Scan mode: {} | scanning: {}", status.mode, status.scanning);
        if let Some(at) = status.last_run_at {
            info!("Last scan: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        if let Some(s) = &status.last_summary {
            info!(
                "Last result: {} candidates, {} new, {} executed, {} failed",
                s.candidates, s.new_signals, s.executed, s.failed
            );
        }
        if let Some(e) = &status.last_error {
            warn!("Last error: {}", e);
        }

        match self.store.list_users().await {
            Ok(users) => {
                for user in users.iter().filter(|u| u.active) {
                    let open = self
                        .store
                        .open_positions(&user.id)
                        .await
                        .map(|p| p.len())
                        .unwrap_or(0);
                    info!(
                        "User {}: {} | balance ${:.2} | open positions: {}",
                        user.id,
                        user.mode,
                        user.balance(),
                        open
                    );
                }
            }
            Err(e) => warn!("Could not read users: {}", e),
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down...");
        for driver in self.drivers.drain(..) {
            driver.abort();
        }

        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while self.scheduler.status().scanning {
            if tokio::time::Instant::now() >= deadline {
                warn!("Scan still running after {:?}, exiting anyway", SHUTDOWN_GRACE);
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        self.print_status().await;
        info!("Orchestrator stopped.");
    }
}

fn every(secs: u64) -> tokio::time::Interval {
    let mut ticker = interval(Duration::from_secs(secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
