use pgexport_types::{BackfillDetails, DoneRanges, Field, Window};

/// Everything a `Producer` needs to stream one model/window (spec §4.6).
#[derive(Debug, Clone)]
pub struct SourceQuery {
    pub team_id: i64,
    pub model_name: String,
    pub full_range: Window,
    pub done_ranges: DoneRanges,
    pub fields: Vec<Field>,
    pub destination_default_fields: Vec<Field>,
    pub filters: serde_json::Value,
    pub exclude_events: Vec<String>,
    pub include_events: Vec<String>,
    pub is_backfill: bool,
    pub backfill_details: Option<BackfillDetails>,
    pub extra_params: serde_json::Value,
}

impl SourceQuery {
    /// The sub-ranges still needing export: `full_range` minus `done_ranges`.
    pub fn remaining_ranges(&self) -> Vec<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> {
        self.done_ranges.remaining(&self.full_range)
    }
}
