use serde::{Deserialize, Serialize};

use crate::done_ranges::DoneRanges;

/// Persisted per attempt and handed to the orchestrator's heartbeat API
/// (§4.8). On resume, the driver asks for the prior attempt's details so
/// `done_ranges`/`records_completed` survive a re-drive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatDetails {
    pub done_ranges: DoneRanges,
    pub records_completed: u64,
}

impl HeartbeatDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_flush(&mut self, rows: u64, start: Option<chrono::DateTime<chrono::Utc>>, end: chrono::DateTime<chrono::Utc>, fallback_start: chrono::DateTime<chrono::Utc>) {
        self.records_completed = self.records_completed.saturating_add(rows);
        self.done_ranges.track_done_range(start, end, fallback_start);
    }
}
