//! Durable ledger of users, signals and positions.

pub mod json;

pub use json::JsonStore;

use async_trait::async_trait;
use chrono::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::StoreError;
use crate::models::{Position, Signal, SignalOutcome, SignalStatus, UserSettings};

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of [`Store::upsert_signal`].
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    /// No equivalent recent signal existed.
    Inserted(Signal),
    /// A recent PENDING signal for the same symbol was refreshed in place,
    /// direction included.
    Updated(Signal),
    /// A recent equivalent signal was already executed; nothing changed.
    AlreadyExecuted(Signal),
}

impl UpsertOutcome {
    pub fn is_new(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted(_))
    }

    pub fn signal(&self) -> &Signal {
        match self {
            UpsertOutcome::Inserted(s)
            | UpsertOutcome::Updated(s)
            | UpsertOutcome::AlreadyExecuted(s) => s,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn list_users(&self) -> StoreResult<Vec<UserSettings>>;
    async fn get_user(&self, user_id: &str) -> StoreResult<UserSettings>;
    /// Insert or replace by id.
    async fn save_user(&self, user: &UserSettings) -> StoreResult<()>;

    /// Insert `signal` unless an equivalent one was created within `window`.
    async fn upsert_signal(&self, signal: Signal, window: Duration) -> StoreResult<UpsertOutcome>;
    async fn get_signal(&self, id: Uuid) -> StoreResult<Signal>;
    /// Returns false, leaving the record alone, when the current status may
    /// not become `status` (see [`SignalStatus::can_become`]).
    async fn set_signal_status(&self, id: Uuid, status: SignalStatus) -> StoreResult<bool>;
    async fn record_signal_outcome(
        &self,
        id: Uuid,
        outcome: SignalOutcome,
        pnl: f64,
    ) -> StoreResult<()>;
    async fn list_signals(&self) -> StoreResult<Vec<Signal>>;

    /// Fails with [`StoreError::DuplicateActive`] when the user already has an
    /// OPEN or PENDING_APPROVAL position on the symbol.
    async fn insert_position(&self, position: &Position) -> StoreResult<()>;
    async fn get_position(&self, id: Uuid) -> StoreResult<Position>;
    async fn update_position(&self, position: &Position) -> StoreResult<()>;
    /// OPEN positions of one user.
    async fn open_positions(&self, user_id: &str) -> StoreResult<Vec<Position>>;
    /// OPEN or PENDING_APPROVAL position of one user on one symbol.
    async fn active_position(&self, user_id: &str, symbol: &str)
        -> StoreResult<Option<Position>>;
    async fn list_positions(&self) -> StoreResult<Vec<Position>>;
}

/// Whether any position other than `except` was opened from `signal_id`,
/// counting held, open and closed ones.
pub async fn signal_in_use(store: &dyn Store, signal_id: Uuid, except: Uuid) -> StoreResult<bool> {
    Ok(store.list_positions().await?.iter().any(|p| {
        p.id != except
            && p.signal_id == Some(signal_id)
            && (p.status.is_active() || p.status.is_closed())
    }))
}

/// Create the configured default user when the ledger has no users yet.
pub async fn bootstrap(store: &dyn Store, cfg: &Config) -> StoreResult<Option<UserSettings>> {
    if !store.list_users().await?.is_empty() {
        return Ok(None);
    }

    let user = cfg.bootstrap_user.to_user(cfg.paper_balance);
    if user.is_live() && user.credentials.is_none() {
        warn!(
            "Default user {} is LIVE but has no exchange credentials; live orders will be rejected",
            user.id
        );
    }
    store.save_user(&user).await?;
    info!("Created default user {} ({})", user.id, user.mode);
    Ok(Some(user))
}
