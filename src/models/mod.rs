pub mod direction;
pub mod position;
pub mod signal;
pub mod user;

pub use direction::*;
pub use position::{Position, PnlBreakdown, SYNC_CLOSE_REASON};
pub use signal::{Signal, SignalMetrics};
pub use user::{Credentials, UserSettings};
