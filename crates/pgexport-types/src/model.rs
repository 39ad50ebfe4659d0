use serde::{Deserialize, Serialize};

/// Which batch export model is being run; drives the canonical-schema
/// override and the merge-key decision of §4.9 step 8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchExportModel {
    Events,
    Persons,
    Sessions,
    Custom(String),
}

impl BatchExportModel {
    pub fn name(&self) -> &str {
        match self {
            BatchExportModel::Events => "events",
            BatchExportModel::Persons => "persons",
            BatchExportModel::Sessions => "sessions",
            BatchExportModel::Custom(name) => name,
        }
    }
}

/// The merge protocol parameters for one model, or `None` for a direct
/// insert into the final table (§4.9 step 8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConfig {
    pub merge_key: Vec<String>,
    pub update_key: Vec<String>,
}

impl BatchExportModel {
    pub fn merge_config(&self) -> Option<MergeConfig> {
        match self {
            BatchExportModel::Persons => Some(MergeConfig {
                merge_key: vec!["team_id".into(), "distinct_id".into()],
                update_key: vec!["person_version".into(), "person_distinct_id_version".into()],
            }),
            BatchExportModel::Sessions => Some(MergeConfig {
                merge_key: vec!["team_id".into(), "session_id".into()],
                update_key: vec!["end_timestamp".into()],
            }),
            BatchExportModel::Events | BatchExportModel::Custom(_) => None,
        }
    }

    /// §4.2: the `events` model's fixed canonical column list overrides
    /// schema derivation.
    pub fn canonical_events_fields() -> Vec<crate::table::DestinationField> {
        use crate::table::{DestinationField as F, PgType::*};
        vec![
            F::new("uuid", Varchar(200)),
            F::new("event", Varchar(200)),
            F::new("properties", Jsonb),
            F::new("elements", Jsonb),
            F::new("set", Jsonb),
            F::new("set_once", Jsonb),
            F::new("distinct_id", Varchar(200)),
            F::new("team_id", Integer),
            F::new("ip", Varchar(200)),
            F::new("site_url", Varchar(200)),
            F::new("timestamp", TimestampTz),
        ]
    }
}
