use tracing::{info, warn};

use crate::config::Config;
use crate::error::TradeError;
use crate::models::position::round8;
use crate::models::{Signal, TradingMode, UserSettings};

/// Margin used when neither the user nor the signal names one and the
/// configured default is unusable.
const FALLBACK_MARGIN: f64 = 10.0;

/// Sizing of one order, computed before any gateway call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizedOrder {
    pub margin: f64,
    pub leverage: u32,
    pub notional: f64,
    /// Base-asset quantity at the signal's entry price.
    pub quantity: f64,
    pub entry_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BalanceCheck {
    Sufficient,
    /// Paper balance was topped up to cover the order.
    Replenished { from: f64, to: f64 },
    /// Live balance not cached yet; the exchange will reject if short.
    Unknown,
}

pub struct RiskGate {
    min_notional: f64,
    max_leverage: u32,
    default_margin: f64,
    paper_balance: f64,
}

impl RiskGate {
    pub fn new(cfg: &Config) -> Self {
        Self {
            min_notional: cfg.min_notional,
            max_leverage: cfg.max_leverage.max(1),
            default_margin: cfg.default_margin,
            paper_balance: cfg.paper_balance,
        }
    }

    pub fn margin_for(&self, user: &UserSettings, signal: &Signal) -> f64 {
        user.fixed_margin
            .filter(|m| *m > 0.0)
            .or(signal.suggested_margin.filter(|m| *m > 0.0))
            .unwrap_or(if self.default_margin > 0.0 {
                self.default_margin
            } else {
                FALLBACK_MARGIN
            })
    }

    pub fn leverage_for(&self, user: &UserSettings) -> u32 {
        user.leverage.clamp(1, self.max_leverage)
    }

    /// Pure sizing: no balance check, no side effects.
    pub fn size(&self, user: &UserSettings, signal: &Signal) -> Result<SizedOrder, TradeError> {
        if !signal.entry_price.is_finite() || signal.entry_price <= 0.0 {
            return Err(TradeError::InvalidPrice(signal.entry_price, signal.symbol.clone()));
        }

        let margin = self.margin_for(user, signal);
        let leverage = self.leverage_for(user);
        let notional = margin * leverage as f64;

        if notional < self.min_notional {
            return Err(TradeError::BelowMinNotional {
                notional,
                min: self.min_notional,
            });
        }

        Ok(SizedOrder {
            margin,
            leverage,
            notional,
            quantity: round8(notional / signal.entry_price),
            entry_price: signal.entry_price,
        })
    }

    /// Balance policy. Paper balances are replenished in place; live
    /// balances block only when known to be short.
    pub fn check_balance(
        &self,
        user: &mut UserSettings,
        margin: f64,
    ) -> Result<BalanceCheck, TradeError> {
        match user.mode {
            TradingMode::Paper => {
                if user.paper_balance >= margin {
                    return Ok(BalanceCheck::Sufficient);
                }
                let from = user.paper_balance;
                let to = self.paper_balance.max(margin);
                user.paper_balance = to;
                info!(
                    "Paper balance for {} replenished: {:.2} -> {:.2}",
                    user.id, from, to
                );
                Ok(BalanceCheck::Replenished { from, to })
            }
            TradingMode::Live => {
                if user.live_balance <= 0.0 {
                    // Unknown balance: let the exchange be the judge.
                    warn!(
                        "Live balance for {} unknown, deferring balance check to the exchange",
                        user.id
                    );
                    return Ok(BalanceCheck::Unknown);
                }
                if user.live_balance < margin {
                    return Err(TradeError::InsufficientBalance {
                        available: user.live_balance,
                        required: margin,
                    });
                }
                Ok(BalanceCheck::Sufficient)
            }
        }
    }

    /// Size the order and apply the balance policy.
    pub fn evaluate(
        &self,
        user: &mut UserSettings,
        signal: &Signal,
    ) -> Result<(SizedOrder, BalanceCheck), TradeError> {
        let sized = self.size(user, signal)?;
        let balance = self.check_balance(user, sized.margin)?;
        Ok((sized, balance))
    }
}
