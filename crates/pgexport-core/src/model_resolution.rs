use pgexport_types::{BatchExportModel, Field, LogicalType};

/// What the driver hands to the `Producer` for a given model (§4.9 step 3).
/// `destination_default_fields` lets the producer request a sensible
/// fallback shape before the customer-specified `batch_export_schema` (if
/// any) narrows it; the latter is opaque to this crate and passed through
/// by the caller.
pub struct ResolvedModel {
    pub destination_default_fields: Vec<Field>,
    pub filters: serde_json::Value,
}

pub fn resolve_model(model: &BatchExportModel) -> ResolvedModel {
    let destination_default_fields = match model {
        BatchExportModel::Events => vec![
            Field::new("uuid", LogicalType::String, false),
            Field::new("event", LogicalType::String, false),
            Field::new("properties", LogicalType::String, true),
            Field::new("elements", LogicalType::String, true),
            Field::new("set", LogicalType::String, true),
            Field::new("set_once", LogicalType::String, true),
            Field::new("distinct_id", LogicalType::String, false),
            Field::new("team_id", LogicalType::Int32, false),
            Field::new("ip", LogicalType::String, true),
            Field::new("site_url", LogicalType::String, true),
            Field::new("timestamp", LogicalType::TimestampTz, false),
        ],
        BatchExportModel::Persons => vec![
            Field::new("team_id", LogicalType::Int64, false),
            Field::new("distinct_id", LogicalType::String, false),
            Field::new("person_version", LogicalType::Int64, false),
            Field::new("person_distinct_id_version", LogicalType::Int64, false),
        ],
        BatchExportModel::Sessions => vec![
            Field::new("team_id", LogicalType::Int64, false),
            Field::new("session_id", LogicalType::String, false),
            Field::new("end_timestamp", LogicalType::TimestampTz, false),
        ],
        BatchExportModel::Custom(_) => vec![],
    };

    ResolvedModel {
        destination_default_fields,
        filters: serde_json::Value::Null,
    }
}
