use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{model::BatchExportModel, secret::Secret};

fn default_port() -> u16 {
    5432
}

fn default_schema() -> String {
    "public".to_string()
}

/// Details of an earliest-backfill request; only meaningful when
/// `is_backfill` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfillDetails {
    pub backfill_id: Uuid,
    pub is_earliest_backfill: bool,
}

/// The activity's own input record (§6 `PostgresInsertInputs`). Deliberately
/// an explicit, fully enumerated struct rather than a pass-through
/// dict/kwargs bag (spec §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresInsertInputs {
    pub team_id: i64,
    pub user: String,
    pub password: Secret<String>,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table_name: String,
    #[serde(default)]
    pub has_self_signed_cert: bool,
    pub data_interval_start: Option<DateTime<Utc>>,
    pub data_interval_end: DateTime<Utc>,
    #[serde(default)]
    pub exclude_events: Vec<String>,
    #[serde(default)]
    pub include_events: Vec<String>,
    pub run_id: Uuid,
    pub backfill_details: Option<BackfillDetails>,
    #[serde(default)]
    pub is_backfill: bool,
    pub batch_export_model: BatchExportModel,
    /// Opaque to this crate: field names/types the model-registry surfaces,
    /// consumed only by the out-of-scope source query layer.
    #[serde(default)]
    pub batch_export_schema: Option<serde_json::Value>,
}

impl PostgresInsertInputs {
    pub fn window(&self) -> Result<crate::window::Window, crate::window::WindowError> {
        crate::window::Window::new(self.data_interval_start, self.data_interval_end)
    }
}

/// The workflow's own input record (§6 `PostgresBatchExportInputs`):
/// connection/table fields plus scheduling metadata that never crosses into
/// the activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresBatchExportInputs {
    pub team_id: i64,
    pub user: String,
    pub password: Secret<String>,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table_name: String,
    #[serde(default)]
    pub has_self_signed_cert: bool,
    pub interval: String,
    pub batch_export_id: Uuid,
}
