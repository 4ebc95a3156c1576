use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::Config;
use crate::exchange::{CloseOrder, EntryOrder, ExecutionGateway, OrderFill};
use crate::http::ServiceClient;
use crate::models::Credentials;

#[derive(Debug, Serialize)]
struct PositionCheckRequest<'a> {
    symbols: &'a [String],
    credentials: &'a Credentials,
}

#[derive(Debug, Deserialize)]
struct PositionCheckResponse {
    positions: HashMap<String, bool>,
}

#[derive(Debug, Serialize)]
struct BalanceRequest<'a> {
    credentials: &'a Credentials,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: f64,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: f64,
}

/// HTTP client for the execution gateway service.
pub struct GatewayClient {
    http: ServiceClient,
}

impl GatewayClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        Ok(Self {
            http: ServiceClient::new(
                &cfg.gateway_url,
                "gateway",
                &cfg.service_secret,
                Duration::from_secs(cfg.http_timeout_secs),
            )?,
        })
    }
}

#[async_trait]
impl ExecutionGateway for GatewayClient {
    async fn place_entry(&self, order: &EntryOrder) -> Result<OrderFill> {
        self.http
            .post_json("/orders/entry", order)
            .await
            .with_context(|| format!("Entry order for {} failed", order.symbol))
    }

    async fn place_close(&self, order: &CloseOrder) -> Result<OrderFill> {
        self.http
            .post_json("/orders/close", order)
            .await
            .with_context(|| format!("Close order for {} failed", order.symbol))
    }

    async fn check_positions(
        &self,
        symbols: &[String],
        credentials: &Credentials,
    ) -> Result<HashMap<String, bool>> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }
        let resp: PositionCheckResponse = self
            .http
            .post_json(
                "/positions/check",
                &PositionCheckRequest {
                    symbols,
                    credentials,
                },
            )
            .await?;
        Ok(resp.positions)
    }

    async fn get_balance(&self, credentials: &Credentials) -> Result<f64> {
        let resp: BalanceResponse = self
            .http
            .post_json("/balance", &BalanceRequest { credentials })
            .await?;
        Ok(resp.balance)
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64> {
        let resp: PriceResponse = self
            .http
            .get_json(&format!("/price/{}", symbol))
            .await?;
        if resp.price <= 0.0 {
            anyhow::bail!("Gateway returned non-positive price {} for {}", resp.price, symbol);
        }
        Ok(resp.price)
    }

    async fn health(&self) -> Result<()> {
        self.http.ping("/health").await
    }
}
