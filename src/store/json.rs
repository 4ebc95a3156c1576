use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Position, PositionStatus, Signal, SignalOutcome, SignalStatus, UserSettings,
};
use crate::store::{Store, StoreResult, UpsertOutcome};

const LEDGER_FILE: &str = "ledger.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Ledger {
    #[serde(default)]
    users: Vec<UserSettings>,
    #[serde(default)]
    signals: Vec<Signal>,
    #[serde(default)]
    positions: Vec<Position>,
}

/// Ledger kept in memory and snapshotted to a JSON file after every write.
///
/// Each write is applied to a copy, persisted, and only then swapped in, so a
/// failed write leaves the in-memory state untouched.
pub struct JsonStore {
    state: Mutex<Ledger>,
    path: Option<PathBuf>,
}

impl JsonStore {
    /// Open (or create) `<data_dir>/ledger.json`.
    pub fn open(data_dir: &str) -> StoreResult<Self> {
        let path = Path::new(data_dir).join(LEDGER_FILE);
        let ledger = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<Ledger>(&content)
                .map_err(|e| StoreError::Backend(format!("corrupt ledger {}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ledger::default(),
            Err(e) => return Err(StoreError::Backend(e.to_string())),
        };

        info!(
            "Ledger loaded from {}: {} users, {} signals, {} positions",
            path.display(),
            ledger.users.len(),
            ledger.signals.len(),
            ledger.positions.len()
        );

        Ok(Self {
            state: Mutex::new(ledger),
            path: Some(path),
        })
    }

    /// Ledger without a backing file.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(Ledger::default()),
            path: None,
        }
    }

    fn persist(&self, ledger: &Ledger) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(ledger)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        // Write-then-rename so a crash never leaves a half-written ledger.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| StoreError::Backend(e.to_string()))?;
        fs::rename(&tmp, path).map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut Ledger) -> StoreResult<R> + Send,
    ) -> StoreResult<R> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let result = f(&mut next)?;
        if let Err(e) = self.persist(&next) {
            warn!("Ledger write failed, change discarded: {}", e);
            return Err(e);
        }
        *state = next;
        Ok(result)
    }
}

fn signal_mut(ledger: &mut Ledger, id: Uuid) -> StoreResult<&mut Signal> {
    ledger
        .signals
        .iter_mut()
        .find(|s| s.id == id)
        .ok_or_else(|| StoreError::NotFound {
            kind: "signal",
            id: id.to_string(),
        })
}

#[async_trait]
impl Store for JsonStore {
    async fn list_users(&self) -> StoreResult<Vec<UserSettings>> {
        Ok(self.state.lock().await.users.clone())
    }

    async fn get_user(&self, user_id: &str) -> StoreResult<UserSettings> {
        self.state
            .lock()
            .await
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "user",
                id: user_id.to_string(),
            })
    }

    async fn save_user(&self, user: &UserSettings) -> StoreResult<()> {
        let user = user.clone();
        self.mutate(move |ledger| {
            match ledger.users.iter_mut().find(|u| u.id == user.id) {
                Some(existing) => *existing = user,
                None => ledger.users.push(user),
            }
            Ok(())
        })
        .await
    }

    async fn upsert_signal(&self, signal: Signal, window: Duration) -> StoreResult<UpsertOutcome> {
        let cutoff = Utc::now() - window;
        self.mutate(move |ledger| {
            let recent = ledger
                .signals
                .iter()
                .enumerate()
                .filter(|(_, s)| s.symbol == signal.symbol && s.created_at >= cutoff)
                .max_by_key(|(_, s)| s.created_at)
                .map(|(i, s)| (i, s.status));

            match recent {
                Some((i, SignalStatus::Pending)) => {
                    let existing = &mut ledger.signals[i];
                    existing.refresh_from(&signal);
                    Ok(UpsertOutcome::Updated(existing.clone()))
                }
                Some((i, SignalStatus::Executed)) => {
                    Ok(UpsertOutcome::AlreadyExecuted(ledger.signals[i].clone()))
                }
                _ => {
                    ledger.signals.push(signal.clone());
                    Ok(UpsertOutcome::Inserted(signal))
                }
            }
        })
        .await
    }

    async fn get_signal(&self, id: Uuid) -> StoreResult<Signal> {
        let mut state = self.state.lock().await;
        signal_mut(&mut state, id).map(|s| s.clone())
    }

    async fn set_signal_status(&self, id: Uuid, status: SignalStatus) -> StoreResult<bool> {
        self.mutate(move |ledger| {
            let signal = signal_mut(ledger, id)?;
            if signal.status == status || !signal.status.can_become(status) {
                return Ok(false);
            }
            signal.status = status;
            signal.updated_at = Utc::now();
            Ok(true)
        })
        .await
    }

    async fn record_signal_outcome(
        &self,
        id: Uuid,
        outcome: SignalOutcome,
        pnl: f64,
    ) -> StoreResult<()> {
        self.mutate(move |ledger| {
            let signal = signal_mut(ledger, id)?;
            signal.outcome = Some(outcome);
            signal.outcome_pnl = Some(pnl);
            signal.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    async fn list_signals(&self) -> StoreResult<Vec<Signal>> {
        Ok(self.state.lock().await.signals.clone())
    }

    async fn insert_position(&self, position: &Position) -> StoreResult<()> {
        let position = position.clone();
        self.mutate(move |ledger| {
            if position.status.is_active()
                && ledger.positions.iter().any(|p| {
                    p.user_id == position.user_id
                        && p.symbol == position.symbol
                        && p.status.is_active()
                })
            {
                return Err(StoreError::DuplicateActive {
                    user_id: position.user_id.clone(),
                    symbol: position.symbol.clone(),
                });
            }
            ledger.positions.push(position);
            Ok(())
        })
        .await
    }

    async fn get_position(&self, id: Uuid) -> StoreResult<Position> {
        self.state
            .lock()
            .await
            .positions
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "position",
                id: id.to_string(),
            })
    }

    async fn update_position(&self, position: &Position) -> StoreResult<()> {
        let position = position.clone();
        self.mutate(move |ledger| {
            let conflict = position.status.is_active()
                && ledger.positions.iter().any(|p| {
                    p.id != position.id
                        && p.user_id == position.user_id
                        && p.symbol == position.symbol
                        && p.status.is_active()
                });
            if conflict {
                return Err(StoreError::DuplicateActive {
                    user_id: position.user_id.clone(),
                    symbol: position.symbol.clone(),
                });
            }
            let slot = ledger
                .positions
                .iter_mut()
                .find(|p| p.id == position.id)
                .ok_or_else(|| StoreError::NotFound {
                    kind: "position",
                    id: position.id.to_string(),
                })?;
            *slot = position;
            Ok(())
        })
        .await
    }

    async fn open_positions(&self, user_id: &str) -> StoreResult<Vec<Position>> {
        Ok(self
            .state
            .lock()
            .await
            .positions
            .iter()
            .filter(|p| p.user_id == user_id && p.status == PositionStatus::Open)
            .cloned()
            .collect())
    }

    async fn active_position(
        &self,
        user_id: &str,
        symbol: &str,
    ) -> StoreResult<Option<Position>> {
        Ok(self
            .state
            .lock()
            .await
            .positions
            .iter()
            .find(|p| p.user_id == user_id && p.symbol == symbol && p.status.is_active())
            .cloned())
    }

    async fn list_positions(&self) -> StoreResult<Vec<Position>> {
        Ok(self.state.lock().await.positions.clone())
    }
}
