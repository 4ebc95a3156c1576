use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }

    /// Side of the order that opens a position in this direction.
    pub fn entry_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }

    /// Side of the order that flattens a position in this direction.
    pub fn close_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Sell,
            Direction::Short => OrderSide::Buy,
        }
    }

    /// Parse an analysis-service direction. Neutral answers ("WAIT",
    /// "NEUTRAL", "HOLD", empty) are not actionable and map to `None`.
    pub fn parse_actionable(raw: &str) -> Option<Direction> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "LONG" | "BUY" => Some(Direction::Long),
            "SHORT" | "SELL" => Some(Direction::Short),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStatus {
    Pending,
    Executed,
    Failed,
    Rejected,
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalStatus::Pending => write!(f, "PENDING"),
            SignalStatus::Executed => write!(f, "EXECUTED"),
            SignalStatus::Failed => write!(f, "FAILED"),
            SignalStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

impl SignalStatus {
    /// EXECUTED is final. FAILED and REJECTED only give way to EXECUTED, when
    /// another user's held copy of the signal is approved later.
    pub fn can_become(self, next: SignalStatus) -> bool {
        match self {
            SignalStatus::Pending => true,
            SignalStatus::Executed => false,
            SignalStatus::Failed | SignalStatus::Rejected => next == SignalStatus::Executed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    PendingApproval,
    Open,
    ClosedWin,
    ClosedLoss,
    ClosedManual,
    Rejected,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::PendingApproval => write!(f, "PENDING_APPROVAL"),
            PositionStatus::Open => write!(f, "OPEN"),
            PositionStatus::ClosedWin => write!(f, "CLOSED_WIN"),
            PositionStatus::ClosedLoss => write!(f, "CLOSED_LOSS"),
            PositionStatus::ClosedManual => write!(f, "CLOSED_MANUAL"),
            PositionStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

impl PositionStatus {
    /// OPEN and PENDING_APPROVAL both occupy the (user, symbol) slot.
    pub fn is_active(&self) -> bool {
        matches!(self, PositionStatus::Open | PositionStatus::PendingApproval)
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            PositionStatus::ClosedWin | PositionStatus::ClosedLoss | PositionStatus::ClosedManual
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClosedBy {
    #[serde(rename = "TP")]
    TakeProfit,
    #[serde(rename = "SL")]
    StopLoss,
    Trailing,
    Manual,
}

impl fmt::Display for ClosedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClosedBy::TakeProfit => write!(f, "TP"),
            ClosedBy::StopLoss => write!(f, "SL"),
            ClosedBy::Trailing => write!(f, "TRAILING"),
            ClosedBy::Manual => write!(f, "MANUAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradingMode {
    Paper,
    Live,
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Paper => write!(f, "PAPER"),
            TradingMode::Live => write!(f, "LIVE"),
        }
    }
}

impl TradingMode {
    pub fn parse(raw: &str) -> Option<TradingMode> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PAPER" => Some(TradingMode::Paper),
            "LIVE" => Some(TradingMode::Live),
            _ => None,
        }
    }
}

/// Scan aggressiveness forwarded to the analysis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanMode {
    Conservative,
    Balanced,
    Aggressive,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::Conservative => write!(f, "CONSERVATIVE"),
            ScanMode::Balanced => write!(f, "BALANCED"),
            ScanMode::Aggressive => write!(f, "AGGRESSIVE"),
        }
    }
}

impl ScanMode {
    pub fn parse(raw: &str) -> Option<ScanMode> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CONSERVATIVE" => Some(ScanMode::Conservative),
            "BALANCED" => Some(ScanMode::Balanced),
            "AGGRESSIVE" => Some(ScanMode::Aggressive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalOutcome {
    Win,
    Loss,
}

impl fmt::Display for SignalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalOutcome::Win => write!(f, "WIN"),
            SignalOutcome::Loss => write!(f, "LOSS"),
        }
    }
}

impl SignalOutcome {
    pub fn from_pnl(pnl: f64) -> SignalOutcome {
        if pnl > 0.0 {
            SignalOutcome::Win
        } else {
            SignalOutcome::Loss
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_serialize_as_fixed_strings() {
        assert_eq!(
            serde_json::to_string(&PositionStatus::PendingApproval).unwrap(),
            "\"PENDING_APPROVAL\""
        );
        assert_eq!(
            serde_json::to_string(&PositionStatus::ClosedWin).unwrap(),
            "\"CLOSED_WIN\""
        );
        assert_eq!(serde_json::to_string(&SignalStatus::Executed).unwrap(), "\"EXECUTED\"");
        assert_eq!(serde_json::to_string(&ClosedBy::TakeProfit).unwrap(), "\"TP\"");
        assert_eq!(serde_json::to_string(&ClosedBy::Trailing).unwrap(), "\"TRAILING\"");
        assert_eq!(PositionStatus::ClosedManual.to_string(), "CLOSED_MANUAL");
    }

    #[test]
    fn neutral_directions_are_not_actionable() {
        assert_eq!(Direction::parse_actionable("long"), Some(Direction::Long));
        assert_eq!(Direction::parse_actionable(" SHORT "), Some(Direction::Short));
        assert_eq!(Direction::parse_actionable("WAIT"), None);
        assert_eq!(Direction::parse_actionable("neutral"), None);
        assert_eq!(Direction::parse_actionable(""), None);
    }

    #[test]
    fn close_side_is_opposite_of_entry() {
        assert_eq!(Direction::Long.entry_side(), OrderSide::Buy);
        assert_eq!(Direction::Long.close_side(), OrderSide::Sell);
        assert_eq!(Direction::Short.close_side(), OrderSide::Buy);
    }

    #[test]
    fn terminal_signal_statuses_stay_put() {
        assert!(SignalStatus::Pending.can_become(SignalStatus::Rejected));
        assert!(SignalStatus::Failed.can_become(SignalStatus::Executed));
        assert!(!SignalStatus::Executed.can_become(SignalStatus::Rejected));
        assert!(!SignalStatus::Executed.can_become(SignalStatus::Failed));
        assert!(!SignalStatus::Rejected.can_become(SignalStatus::Failed));
    }

    #[test]
    fn active_statuses() {
        assert!(PositionStatus::Open.is_active());
        assert!(PositionStatus::PendingApproval.is_active());
        assert!(!PositionStatus::ClosedManual.is_active());
        assert!(!PositionStatus::Rejected.is_active());
        assert!(!PositionStatus::Rejected.is_closed());
    }
}
