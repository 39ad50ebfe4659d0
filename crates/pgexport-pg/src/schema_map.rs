use pgexport_types::{DestinationField, ExportError, Field, LogicalType, PgType, Schema};

/// Maps one source field to a destination column, per spec §4.2. `name`
/// membership in `known_json_fields` routes string columns to `JSONB`
/// instead of `TEXT`.
pub fn map_field(field: &Field, known_json_fields: &[&str]) -> Result<DestinationField, ExportError> {
    let pg_type = match field.logical_type {
        LogicalType::String | LogicalType::Json => {
            if known_json_fields.contains(&field.name.as_str()) {
                PgType::Jsonb
            } else {
                PgType::Text
            }
        }
        LogicalType::Int64 | LogicalType::UInt64 => PgType::BigInt,
        LogicalType::Int8
        | LogicalType::Int16
        | LogicalType::Int32
        | LogicalType::UInt8
        | LogicalType::UInt16
        | LogicalType::UInt32 => PgType::Integer,
        LogicalType::Float64 => PgType::DoublePrecision,
        LogicalType::Float32 => PgType::Real,
        LogicalType::Bool => PgType::Boolean,
        LogicalType::TimestampTz => PgType::TimestampTz,
        LogicalType::TimestampNaive => PgType::Timestamp,
        LogicalType::ListString => PgType::TextArray,
    };
    Ok(DestinationField::new(field.name.clone(), pg_type))
}

/// Derives the full destination column list for a schema, failing on the
/// first unsupported source type.
pub fn map_schema(
    schema: &Schema,
    known_json_fields: &[&str],
) -> Result<Vec<DestinationField>, ExportError> {
    schema
        .fields
        .iter()
        .map(|f| map_field(f, known_json_fields))
        .collect()
}
