use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::analysis::{AnalysisRequest, AnalysisService, Candidate, FeedbackRequest};
use crate::config::{BootstrapUser, Config};
use crate::exchange::{CloseOrder, EntryOrder, ExecutionGateway, OrderFill};
use crate::models::{
    Credentials, Direction, Position, PositionStatus, ScanMode, Signal, SignalMetrics,
    SignalStatus, TradingMode, UserSettings,
};
use crate::store::Store;

pub fn default_test_config() -> Config {
    Config {
        analysis_url: "http://127.0.0.1:9".to_string(),
        gateway_url: "http://127.0.0.1:9".to_string(),
        service_secret: "test-secret".to_string(),
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
            .join("trade_orchestrator_test")
            .to_string_lossy()
            .to_string(),
        log_level: "ERROR".to_string(),
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

pub fn credentials() -> Credentials {
    Credentials {
        api_key: "test-key".to_string(),
        api_secret: "test-secret".to_string(),
    }
}

/// Active auto-trading user; live users carry credentials and a known balance.
pub fn make_user(id: &str, mode: TradingMode) -> UserSettings {
    UserSettings {
        id: id.to_string(),
        name: id.to_string(),
        mode,
        auto_trade: true,
        fixed_margin: Some(10.0),
        leverage: 10,
        paper_balance: 10_000.0,
        live_balance: if mode == TradingMode::Live { 1_000.0 } else { 0.0 },
        credentials: (mode == TradingMode::Live).then(credentials),
        active: true,
    }
}

pub fn make_signal(symbol: &str, direction: Direction, confidence: f64) -> Signal {
    let (stop_loss, take_profit) = match direction {
        Direction::Long => (44_000.0, 47_000.0),
        Direction::Short => (46_000.0, 43_000.0),
    };
    let now = Utc::now();
    Signal {
        id: Uuid::new_v4(),
        symbol: symbol.to_string(),
        direction,
        entry_price: 45_000.0,
        stop_loss,
        take_profit,
        confidence,
        technical_reasoning: "trend continuation".to_string(),
        sentiment_reasoning: "neutral funding".to_string(),
        suggested_margin: None,
        metrics: SignalMetrics {
            rsi: Some(55.0),
            ..Default::default()
        },
        status: SignalStatus::Pending,
        outcome: None,
        outcome_pnl: None,
        created_at: now,
        updated_at: now,
    }
}

/// Long paper position: entry 100, size 1, 10x, SL 95, TP 110.
pub fn make_position(user_id: &str, symbol: &str, status: PositionStatus) -> Position {
    Position {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        signal_id: None,
        symbol: symbol.to_string(),
        side: Direction::Long,
        entry_price: 100.0,
        stop_loss: 95.0,
        take_profit: 110.0,
        size: 1.0,
        leverage: 10,
        mode: TradingMode::Paper,
        status,
        closed_by: None,
        close_reason: None,
        exit_price: None,
        pnl: None,
        pnl_percent: None,
        entry_order_id: None,
        sl_order_id: None,
        tp_order_id: None,
        opened_at: Utc::now(),
        closed_at: None,
    }
}

/// Persist `signal` and return the stored copy.
pub async fn seed_signal(store: &dyn Store, signal: Signal) -> Signal {
    store
        .upsert_signal(signal, Duration::seconds(300))
        .await
        .unwrap()
        .signal()
        .clone()
}

pub fn filled(avg_price: f64, executed_qty: f64) -> OrderFill {
    OrderFill {
        status: "FILLED".to_string(),
        order_id: Some("ord-1".to_string()),
        avg_price,
        executed_qty,
        sl_order_id: Some("sl-1".to_string()),
        tp_order_id: Some("tp-1".to_string()),
        trailing_order_id: None,
        protective_errors: Vec::new(),
    }
}

pub fn candidate(symbol: &str, direction: &str, confidence: f64) -> Candidate {
    let short = direction.eq_ignore_ascii_case("SHORT");
    Candidate {
        symbol: symbol.to_string(),
        direction: direction.to_string(),
        confidence,
        entry_price: 45_000.0,
        stop_loss: if short { 46_000.0 } else { 44_000.0 },
        take_profit: if short { 43_000.0 } else { 47_000.0 },
        technical_reasoning: "breakout".to_string(),
        sentiment_reasoning: "positive".to_string(),
        suggested_margin: None,
        metrics: HashMap::from([("rsi".to_string(), serde_json::json!(61.5))]),
    }
}

/// Scripted gateway. Unscripted entries fill at the known price (45000 by
/// default); unscripted closes fill at the known price or fail.
#[derive(Default)]
pub struct MockGateway {
    entries: Mutex<VecDeque<Result<OrderFill>>>,
    closes: Mutex<VecDeque<Result<OrderFill>>>,
    entry_orders: Mutex<Vec<EntryOrder>>,
    close_orders: Mutex<Vec<CloseOrder>>,
    remote_open: Mutex<HashSet<String>>,
    position_checks: Mutex<Vec<Vec<String>>>,
    fail_checks: Mutex<bool>,
    prices: Mutex<HashMap<String, f64>>,
    balance: Mutex<Option<f64>>,
    unhealthy: Mutex<bool>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_entry(&self, result: Result<OrderFill>) {
        self.entries.lock().unwrap().push_back(result);
    }

    pub fn push_close(&self, result: Result<OrderFill>) {
        self.closes.lock().unwrap().push_back(result);
    }

    pub fn entry_calls(&self) -> usize {
        self.entry_orders.lock().unwrap().len()
    }

    pub fn entry_orders(&self) -> Vec<EntryOrder> {
        self.entry_orders.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_orders.lock().unwrap().len()
    }

    pub fn close_orders(&self) -> Vec<CloseOrder> {
        self.close_orders.lock().unwrap().clone()
    }

    pub fn set_remote_open(&self, symbols: &[&str]) {
        *self.remote_open.lock().unwrap() = symbols.iter().map(|s| s.to_string()).collect();
    }

    pub fn position_checks(&self) -> Vec<Vec<String>> {
        self.position_checks.lock().unwrap().clone()
    }

    pub fn fail_position_checks(&self, fail: bool) {
        *self.fail_checks.lock().unwrap() = fail;
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn set_balance(&self, balance: f64) {
        *self.balance.lock().unwrap() = Some(balance);
    }

    pub fn set_healthy(&self, healthy: bool) {
        *self.unhealthy.lock().unwrap() = !healthy;
    }

    fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.lock().unwrap().get(symbol).copied()
    }
}

#[async_trait]
impl ExecutionGateway for MockGateway {
    async fn place_entry(&self, order: &EntryOrder) -> Result<OrderFill> {
        self.entry_orders.lock().unwrap().push(order.clone());
        if let Some(result) = self.entries.lock().unwrap().pop_front() {
            return result;
        }
        let price = self.price(&order.symbol).unwrap_or(45_000.0);
        Ok(filled(price, order.notional / price))
    }

    async fn place_close(&self, order: &CloseOrder) -> Result<OrderFill> {
        self.close_orders.lock().unwrap().push(order.clone());
        if let Some(result) = self.closes.lock().unwrap().pop_front() {
            return result;
        }
        match self.price(&order.symbol) {
            Some(price) => Ok(filled(price, order.quantity)),
            None => Err(anyhow!("no market for {}", order.symbol)),
        }
    }

    async fn check_positions(
        &self,
        symbols: &[String],
        _credentials: &Credentials,
    ) -> Result<HashMap<String, bool>> {
        self.position_checks.lock().unwrap().push(symbols.to_vec());
        if *self.fail_checks.lock().unwrap() {
            bail!("position check timed out");
        }
        let open = self.remote_open.lock().unwrap();
        Ok(symbols
            .iter()
            .map(|s| (s.clone(), open.contains(s)))
            .collect())
    }

    async fn get_balance(&self, _credentials: &Credentials) -> Result<f64> {
        Ok((*self.balance.lock().unwrap()).unwrap_or(1_000.0))
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64> {
        self.price(symbol)
            .ok_or_else(|| anyhow!("no price for {}", symbol))
    }

    async fn health(&self) -> Result<()> {
        if *self.unhealthy.lock().unwrap() {
            bail!("gateway down");
        }
        Ok(())
    }
}

/// Scripted analysis service. Each `analyze` call pops one queued batch
/// (empty once the queue is drained).
#[derive(Default)]
pub struct MockAnalysis {
    batches: Mutex<VecDeque<Vec<Candidate>>>,
    requests: Mutex<Vec<AnalysisRequest>>,
    feedback: Mutex<Vec<FeedbackRequest>>,
    fail_analyze: Mutex<bool>,
    fail_feedback: Mutex<bool>,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl MockAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_candidates(&self, batch: Vec<Candidate>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    pub fn analyze_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn feedback(&self) -> Vec<FeedbackRequest> {
        self.feedback.lock().unwrap().clone()
    }

    pub fn fail_analyze(&self, fail: bool) {
        *self.fail_analyze.lock().unwrap() = fail;
    }

    pub fn fail_feedback(&self, fail: bool) {
        *self.fail_feedback.lock().unwrap() = fail;
    }

    /// Block the next `analyze` call until `release` is notified.
    pub fn hold_analyze(&self, release: Arc<Notify>) {
        *self.hold.lock().unwrap() = Some(release);
    }
}

#[async_trait]
impl AnalysisService for MockAnalysis {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Vec<Candidate>> {
        self.requests.lock().unwrap().push(request.clone());
        let hold = self.hold.lock().unwrap().take();
        if let Some(release) = hold {
            release.notified().await;
        }
        if *self.fail_analyze.lock().unwrap() {
            bail!("analysis unavailable");
        }
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn send_feedback(&self, feedback: &FeedbackRequest) -> Result<()> {
        self.feedback.lock().unwrap().push(feedback.clone());
        if *self.fail_feedback.lock().unwrap() {
            bail!("feedback rejected");
        }
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}
