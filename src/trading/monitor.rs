use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::TradeError;
use crate::exchange::ExecutionGateway;
use crate::models::{ClosedBy, Direction, Position, PositionStatus, TradingMode};
use crate::store::Store;
use crate::trading::lifecycle::LifecycleManager;

/// Stop-loss / take-profit simulation for paper positions. Live positions
/// are protected by exchange-side orders and are not touched here.
pub struct ExitMonitor {
    store: Arc<dyn Store>,
    gateway: Arc<dyn ExecutionGateway>,
    lifecycle: Arc<LifecycleManager>,
    fee_rate: f64,
}

impl ExitMonitor {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn ExecutionGateway>,
        lifecycle: Arc<LifecycleManager>,
        cfg: &Config,
    ) -> Self {
        Self {
            store,
            gateway,
            lifecycle,
            fee_rate: cfg.taker_fee_rate,
        }
    }

    /// One pass over every OPEN paper position. Returns the positions closed.
    pub async fn check_positions(&self) -> Result<Vec<Position>, TradeError> {
        let mut open = Vec::new();
        for user in self.store.list_users().await? {
            for pos in self.store.open_positions(&user.id).await? {
                if pos.mode == TradingMode::Paper {
                    open.push(pos);
                }
            }
        }
        if open.is_empty() {
            return Ok(Vec::new());
        }

        // One quote per symbol per pass.
        let mut prices: HashMap<String, Option<f64>> = HashMap::new();
        let mut closed = Vec::new();

        for pos in open {
            let price = match prices.get(&pos.symbol) {
                Some(p) => *p,
                None => {
                    let quote = match self.gateway.get_current_price(&pos.symbol).await {
                        Ok(p) => Some(p),
                        Err(e) => {
                            warn!("Price for {} unavailable, skipping exit check: {:#}", pos.symbol, e);
                            None
                        }
                    };
                    prices.insert(pos.symbol.clone(), quote);
                    quote
                }
            };
            let Some(price) = price else { continue };

            let Some((exit, closed_by)) = triggered(&pos, price) else {
                continue;
            };

            let net = pos.pnl_at(exit, self.fee_rate).net;
            let status = if net > 0.0 {
                PositionStatus::ClosedWin
            } else {
                PositionStatus::ClosedLoss
            };

            debug!(
                position = %pos.id,
                "{} {} hit {} at {} (level {})",
                pos.side, pos.symbol, closed_by, price, exit
            );
            match self.lifecycle.close_at(&pos, exit, status, closed_by).await {
                Ok(p) => closed.push(p),
                Err(TradeError::InvalidState { .. }) => {
                    debug!(position = %pos.id, "Already closed elsewhere");
                }
                Err(e) => warn!(position = %pos.id, "Exit close failed: {}", e),
            }
        }

        if !closed.is_empty() {
            info!("Exit monitor closed {} paper position(s)", closed.len());
        }
        Ok(closed)
    }
}

/// Level crossed by `price`, stop-loss first. A zero level is unset.
fn triggered(pos: &Position, price: f64) -> Option<(f64, ClosedBy)> {
    let sl = pos.stop_loss;
    let tp = pos.take_profit;
    let (hit_sl, hit_tp) = match pos.side {
        Direction::Long => (sl > 0.0 && price <= sl, tp > 0.0 && price >= tp),
        Direction::Short => (sl > 0.0 && price >= sl, tp > 0.0 && price <= tp),
    };
    if hit_sl {
        Some((sl, ClosedBy::StopLoss))
    } else if hit_tp {
        Some((tp, ClosedBy::TakeProfit))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonStore;
    use crate::test_helpers::{
        default_test_config, make_position, make_user, MockAnalysis, MockGateway,
    };
    use crate::trading::feedback::FeedbackDispatcher;
    use std::time::Duration;

    async fn monitor() -> (Arc<JsonStore>, Arc<MockGateway>, ExitMonitor) {
        let store = Arc::new(JsonStore::in_memory());
        let gateway = Arc::new(MockGateway::new());
        store.save_user(&make_user("u1", TradingMode::Paper)).await.unwrap();
        let cfg = default_test_config();
        let feedback = FeedbackDispatcher::new(Arc::new(MockAnalysis::new()), Duration::from_secs(1));
        let lifecycle = Arc::new(LifecycleManager::new(
            store.clone(),
            gateway.clone(),
            feedback,
            &cfg,
        ));
        let monitor = ExitMonitor::new(store.clone(), gateway.clone(), lifecycle, &cfg);
        (store, gateway, monitor)
    }

    fn long(symbol: &str) -> Position {
        let mut p = make_position("u1", symbol, PositionStatus::Open);
        p.side = Direction::Long;
        p.entry_price = 50000.0;
        p.stop_loss = 49500.0;
        p.take_profit = 51000.0;
        p.size = 0.01;
        p
    }

    #[test]
    fn trigger_levels() {
        let p = long("BTCUSDT");
        assert_eq!(triggered(&p, 49400.0), Some((49500.0, ClosedBy::StopLoss)));
        assert_eq!(triggered(&p, 51100.0), Some((51000.0, ClosedBy::TakeProfit)));
        assert_eq!(triggered(&p, 50200.0), None);

        let mut s = p.clone();
        s.side = Direction::Short;
        s.stop_loss = 50500.0;
        s.take_profit = 49000.0;
        assert_eq!(triggered(&s, 50600.0), Some((50500.0, ClosedBy::StopLoss)));
        assert_eq!(triggered(&s, 48900.0), Some((49000.0, ClosedBy::TakeProfit)));

        s.stop_loss = 0.0;
        assert_eq!(triggered(&s, 99999.0), None);
    }

    #[tokio::test]
    async fn closes_stop_loss_as_loss() {
        let (store, gateway, monitor) = monitor().await;
        let pos = long("BTCUSDT");
        store.insert_position(&pos).await.unwrap();
        gateway.set_price("BTCUSDT", 49400.0);

        let closed = monitor.check_positions().await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].status, PositionStatus::ClosedLoss);
        assert_eq!(closed[0].closed_by, Some(ClosedBy::StopLoss));
        assert_eq!(closed[0].exit_price, Some(49500.0));
        assert_eq!(closed[0].pnl, Some(-5.0));
    }

    #[tokio::test]
    async fn closes_take_profit_as_win() {
        let (store, gateway, monitor) = monitor().await;
        store.insert_position(&long("BTCUSDT")).await.unwrap();
        gateway.set_price("BTCUSDT", 51100.0);

        let closed = monitor.check_positions().await.unwrap();
        assert_eq!(closed[0].status, PositionStatus::ClosedWin);
        assert_eq!(closed[0].closed_by, Some(ClosedBy::TakeProfit));
        assert!(store.open_positions("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn live_and_untriggered_positions_stay_open() {
        let (store, gateway, monitor) = monitor().await;
        let mut live = long("ETHUSDT");
        live.mode = TradingMode::Live;
        store.insert_position(&live).await.unwrap();
        store.insert_position(&long("BTCUSDT")).await.unwrap();
        gateway.set_price("BTCUSDT", 50100.0);
        gateway.set_price("ETHUSDT", 1.0);

        assert!(monitor.check_positions().await.unwrap().is_empty());
        assert_eq!(store.open_positions("u1").await.unwrap().len(), 2);
    }
}
