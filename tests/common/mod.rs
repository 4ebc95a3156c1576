#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Duration;
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uuid::Uuid;

use trade_orchestrator::analysis::{AnalysisRequest, AnalysisService, Candidate, FeedbackRequest};
use trade_orchestrator::config::{BootstrapUser, Config};
use trade_orchestrator::error::StoreError;
use trade_orchestrator::exchange::{CloseOrder, EntryOrder, ExecutionGateway, OrderFill};
use trade_orchestrator::models::{
    Credentials, Position, ScanMode, Signal, SignalOutcome, SignalStatus, TradingMode,
    UserSettings,
};
use trade_orchestrator::store::{JsonStore, Store, StoreResult, UpsertOutcome};

pub fn test_config() -> Config {
    Config {
        analysis_url: "http://127.0.0.1:9".to_string(),
        gateway_url: "http://127.0.0.1:9".to_string(),
        service_secret: "secret".to_string(),
        http_timeout_secs: 5,
        scan_interval_secs: 300,
        reconcile_interval_secs: 60,
        health_interval_secs: 60,
        monitor_interval_secs: 15,
        scan_windows: Vec::new(),
        scan_timezone: Tz::UTC,
        scan_mode: ScanMode::Balanced,
        min_confidence: 70.0,
        signal_recency_secs: 300,
        min_notional: 5.0,
        max_leverage: 125,
        default_margin: 10.0,
        taker_fee_rate: 0.0,
        paper_balance: 10_000.0,
        trailing_callback_rate: None,
        feedback_timeout_secs: 1,
        data_dir: std::env::temp_dir()
            .join(format!("orchestrator_it_{}", Uuid::new_v4()))
            .to_string_lossy()
            .to_string(),
        log_level: "error".to_string(),
        bootstrap_user: BootstrapUser {
            id: "default".to_string(),
            mode: TradingMode::Paper,
            auto_trade: true,
            fixed_margin: None,
            leverage: 10,
            api_key: String::new(),
            api_secret: String::new(),
        },
    }
}

pub fn user(id: &str, mode: TradingMode, margin: f64, leverage: u32) -> UserSettings {
    UserSettings {
        id: id.to_string(),
        name: id.to_string(),
        mode,
        auto_trade: true,
        fixed_margin: Some(margin),
        leverage,
        paper_balance: 10_000.0,
        live_balance: if mode == TradingMode::Live { 500.0 } else { 0.0 },
        credentials: (mode == TradingMode::Live).then(|| Credentials {
            api_key: "it-key".to_string(),
            api_secret: "it-secret".to_string(),
        }),
        active: true,
    }
}

pub fn candidate(symbol: &str, direction: &str, confidence: f64, entry: f64) -> Candidate {
    Candidate {
        symbol: symbol.to_string(),
        direction: direction.to_string(),
        confidence,
        entry_price: entry,
        stop_loss: entry * 0.98,
        take_profit: entry * 1.03,
        technical_reasoning: "higher lows on 4h".to_string(),
        sentiment_reasoning: "funding flat".to_string(),
        suggested_margin: None,
        metrics: HashMap::from([
            ("rsi".to_string(), serde_json::json!(58.2)),
            ("adx".to_string(), serde_json::json!("24.5")),
        ]),
    }
}

pub fn fill(price: f64, qty: f64) -> OrderFill {
    OrderFill {
        status: "FILLED".to_string(),
        order_id: Some("E-1".to_string()),
        avg_price: price,
        executed_qty: qty,
        sl_order_id: Some("SL-1".to_string()),
        tp_order_id: Some("TP-1".to_string()),
        trailing_order_id: None,
        protective_errors: Vec::new(),
    }
}

/// Exchange double. Entries fill at the signal's notional unless a result
/// is scripted; `remote_open` is what position checks report.
#[derive(Default)]
pub struct MockGateway {
    pub entry_results: Mutex<VecDeque<Result<OrderFill>>>,
    pub close_results: Mutex<VecDeque<Result<OrderFill>>>,
    pub entries: Mutex<Vec<EntryOrder>>,
    pub closes: Mutex<Vec<CloseOrder>>,
    pub remote_open: Mutex<HashSet<String>>,
    pub checks: Mutex<Vec<Vec<String>>>,
    pub prices: Mutex<HashMap<String, f64>>,
    pub calls: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_entry(&self, result: Result<OrderFill>) {
        self.entry_results.lock().unwrap().push_back(result);
    }

    pub fn script_close(&self, result: Result<OrderFill>) {
        self.close_results.lock().unwrap().push_back(result);
    }

    pub fn open_remotely(&self, symbol: &str) {
        self.remote_open.lock().unwrap().insert(symbol.to_string());
    }

    pub fn close_remotely(&self, symbol: &str) {
        self.remote_open.lock().unwrap().remove(symbol);
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionGateway for MockGateway {
    async fn place_entry(&self, order: &EntryOrder) -> Result<OrderFill> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().push(order.clone());
        let scripted = self.entry_results.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => {
                let price = self
                    .prices
                    .lock()
                    .unwrap()
                    .get(&order.symbol)
                    .copied()
                    .unwrap_or(45_000.0);
                Ok(fill(price, order.notional / price))
            }
        }
    }

    async fn place_close(&self, order: &CloseOrder) -> Result<OrderFill> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.closes.lock().unwrap().push(order.clone());
        let scripted = self.close_results.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Err(anyhow!("no close scripted")))
    }

    async fn check_positions(
        &self,
        symbols: &[String],
        _credentials: &Credentials,
    ) -> Result<HashMap<String, bool>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.checks.lock().unwrap().push(symbols.to_vec());
        let open = self.remote_open.lock().unwrap().clone();
        Ok(symbols.iter().map(|s| (s.clone(), open.contains(s))).collect())
    }

    async fn get_balance(&self, _credentials: &Credentials) -> Result<f64> {
        Ok(500.0)
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64> {
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| anyhow!("no price for {}", symbol))
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MockAnalysis {
    pub batches: Mutex<VecDeque<Vec<Candidate>>>,
    pub repeat: Mutex<Option<Vec<Candidate>>>,
    pub calls: AtomicUsize,
    pub feedback: Mutex<Vec<FeedbackRequest>>,
    pub feedback_fails: AtomicBool,
    pub gate: Mutex<Option<Arc<Notify>>>,
}

impl MockAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `batch` on every call.
    pub fn always(&self, batch: Vec<Candidate>) {
        *self.repeat.lock().unwrap() = Some(batch);
    }

    pub fn block_next(&self, release: Arc<Notify>) {
        *self.gate.lock().unwrap() = Some(release);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisService for MockAnalysis {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<Vec<Candidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        if let Some(release) = gate {
            release.notified().await;
        }
        if let Some(batch) = self.batches.lock().unwrap().pop_front() {
            return Ok(batch);
        }
        Ok(self.repeat.lock().unwrap().clone().unwrap_or_default())
    }

    async fn send_feedback(&self, feedback: &FeedbackRequest) -> Result<()> {
        self.feedback.lock().unwrap().push(feedback.clone());
        if self.feedback_fails.load(Ordering::SeqCst) {
            bail!("learning endpoint returned 503");
        }
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

/// Ledger whose position inserts can be made to fail, to simulate a database
/// outage between fill and persistence.
pub struct FlakyStore {
    pub inner: JsonStore,
    pub fail_inserts: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: JsonStore::in_memory(),
            fail_inserts: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn list_users(&self) -> StoreResult<Vec<UserSettings>> {
        self.inner.list_users().await
    }
    async fn get_user(&self, user_id: &str) -> StoreResult<UserSettings> {
        self.inner.get_user(user_id).await
    }
    async fn save_user(&self, user: &UserSettings) -> StoreResult<()> {
        self.inner.save_user(user).await
    }
    async fn upsert_signal(&self, signal: Signal, window: Duration) -> StoreResult<UpsertOutcome> {
        self.inner.upsert_signal(signal, window).await
    }
    async fn get_signal(&self, id: Uuid) -> StoreResult<Signal> {
        self.inner.get_signal(id).await
    }
    async fn set_signal_status(&self, id: Uuid, status: SignalStatus) -> StoreResult<bool> {
        self.inner.set_signal_status(id, status).await
    }
    async fn record_signal_outcome(
        &self,
        id: Uuid,
        outcome: SignalOutcome,
        pnl: f64,
    ) -> StoreResult<()> {
        self.inner.record_signal_outcome(id, outcome, pnl).await
    }
    async fn list_signals(&self) -> StoreResult<Vec<Signal>> {
        self.inner.list_signals().await
    }
    async fn insert_position(&self, position: &Position) -> StoreResult<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection refused".to_string()));
        }
        self.inner.insert_position(position).await
    }
    async fn get_position(&self, id: Uuid) -> StoreResult<Position> {
        self.inner.get_position(id).await
    }
    async fn update_position(&self, position: &Position) -> StoreResult<()> {
        self.inner.update_position(position).await
    }
    async fn open_positions(&self, user_id: &str) -> StoreResult<Vec<Position>> {
        self.inner.open_positions(user_id).await
    }
    async fn active_position(
        &self,
        user_id: &str,
        symbol: &str,
    ) -> StoreResult<Option<Position>> {
        self.inner.active_position(user_id, symbol).await
    }
    async fn list_positions(&self) -> StoreResult<Vec<Position>> {
        self.inner.list_positions().await
    }
}
