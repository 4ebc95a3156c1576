use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::config::{Config, ScanWindow};

/// Daily time windows in which scheduled scans may run.
#[derive(Debug, Clone)]
pub struct ScanWindows {
    windows: Vec<ScanWindow>,
    tz: Tz,
}

impl ScanWindows {
    pub fn new(windows: Vec<ScanWindow>, tz: Tz) -> Self {
        Self { windows, tz }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.scan_windows.clone(), cfg.scan_timezone)
    }

    /// Everything is open when no window is configured.
    pub fn always_open() -> Self {
        Self::new(Vec::new(), Tz::UTC)
    }

    pub fn is_open(&self, utc_now: DateTime<Utc>) -> bool {
        if self.windows.is_empty() {
            return true;
        }

        let local = utc_now.with_timezone(&self.tz);
        let current = local.hour() * 60 + local.minute();

        self.windows.iter().any(|w| {
            let start = w.start.0 * 60 + w.start.1;
            let end = w.end.0 * 60 + w.end.1;
            if start < end {
                current >= start && current < end
            } else {
                // Wraps midnight (e.g. 22:00 - 02:00)
                current >= start || current < end
            }
        })
    }
}
