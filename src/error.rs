//! Typed errors for the trading core.
//!
//! External clients return `anyhow::Result`; the core wraps those failures
//! into [`TradeError`] so callers can tell a risk rejection from a gateway
//! outage or an authorization failure.

use thiserror::Error;
use uuid::Uuid;

use crate::models::PositionStatus;

/// Ledger failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// A second OPEN/PENDING_APPROVAL position for the same user and symbol.
    #[error("user {user_id} already has an active position on {symbol}")]
    DuplicateActive { user_id: String, symbol: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum TradeError {
    #[error("notional {notional:.4} below exchange minimum {min:.4}")]
    BelowMinNotional { notional: f64, min: f64 },

    #[error("invalid entry price {0} for {1}")]
    InvalidPrice(f64, String),

    #[error("insufficient balance: {available:.2} available, {required:.2} required")]
    InsufficientBalance { available: f64, required: f64 },

    #[error("user {user_id} already has an active position on {symbol}")]
    DuplicatePosition { user_id: String, symbol: String },

    #[error("user {0} has no exchange credentials")]
    MissingCredentials(String),

    #[error("gateway error: {0:#}")]
    Gateway(anyhow::Error),

    #[error("analysis service error: {0:#}")]
    Analysis(anyhow::Error),

    #[error("order for {symbol} not filled (status {status})")]
    NotFilled { symbol: String, status: String },

    /// The exchange filled the order but the ledger write failed. Needs a
    /// manual reconciliation; never retried automatically.
    #[error("CRITICAL: {symbol} filled ({quantity} @ {price}) but not persisted: {source}")]
    PersistAfterFill {
        symbol: String,
        quantity: f64,
        price: f64,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("position {0} not found")]
    PositionNotFound(Uuid),

    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("user {user_id} is not allowed to act on position {position_id}")]
    Unauthorized { user_id: String, position_id: Uuid },

    #[error("position {position_id} is {status}, cannot {action}")]
    InvalidState {
        position_id: Uuid,
        status: PositionStatus,
        action: &'static str,
    },
}

impl TradeError {
    /// True for rejections raised before any gateway call.
    pub fn is_pre_trade_rejection(&self) -> bool {
        matches!(
            self,
            TradeError::BelowMinNotional { .. }
                | TradeError::InvalidPrice(..)
                | TradeError::InsufficientBalance { .. }
                | TradeError::DuplicatePosition { .. }
                | TradeError::MissingCredentials(_)
        )
    }
}
