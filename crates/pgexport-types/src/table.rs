use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed set of destination column types §4.2 maps source fields to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PgType {
    Jsonb,
    Text,
    /// `VARCHAR(n)`, used by the canonical `events` schema so the
    /// `StringDataRightTruncation` case (§7) is reachable the way it is for
    /// the original model's fixed-width string columns.
    Varchar(u32),
    BigInt,
    Integer,
    DoublePrecision,
    Real,
    Boolean,
    TimestampTz,
    Timestamp,
    TextArray,
}

impl fmt::Display for PgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgType::Jsonb => f.write_str("JSONB"),
            PgType::Text => f.write_str("TEXT"),
            PgType::Varchar(n) => write!(f, "VARCHAR({n})"),
            PgType::BigInt => f.write_str("BIGINT"),
            PgType::Integer => f.write_str("INTEGER"),
            PgType::DoublePrecision => f.write_str("DOUBLE PRECISION"),
            PgType::Real => f.write_str("REAL"),
            PgType::Boolean => f.write_str("BOOLEAN"),
            PgType::TimestampTz => f.write_str("TIMESTAMPTZ"),
            PgType::Timestamp => f.write_str("TIMESTAMP"),
            PgType::TextArray => f.write_str("TEXT[]"),
        }
    }
}

/// `(name, pg_type)`, the unit SchemaMapper produces and PgClient consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationField {
    pub name: String,
    pub pg_type: PgType,
}

impl DestinationField {
    pub fn new(name: impl Into<String>, pg_type: PgType) -> Self {
        Self {
            name: name.into(),
            pg_type,
        }
    }
}

/// Describes a table a `ManagedTable` scope should acquire: the final
/// destination table, or an ephemeral staging table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedTableDescriptor {
    pub schema: String,
    pub table: String,
    pub fields: Vec<DestinationField>,
    pub primary_key: Option<Vec<String>>,
    pub create: bool,
    pub delete_on_exit: bool,
}

impl ManagedTableDescriptor {
    /// PostgreSQL identifiers are limited to 63 bytes. Staging names are
    /// `stage_<table>_<timestamp>_<team_id>`; truncate the whole identifier
    /// (not just the table part) to that limit (spec §6, §8 S6).
    pub fn staging_name(table: &str, timestamp: &str, team_id: i64) -> String {
        const MAX_IDENTIFIER_BYTES: usize = 63;
        let full = format!("stage_{table}_{timestamp}_{team_id}");
        if full.len() <= MAX_IDENTIFIER_BYTES {
            full
        } else {
            // Truncate on a char boundary not exceeding the byte limit.
            let mut end = MAX_IDENTIFIER_BYTES;
            while !full.is_char_boundary(end) {
                end -= 1;
            }
            full[..end].to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_name_truncates_to_63_bytes() {
        let table = "a".repeat(80);
        let name = ManagedTableDescriptor::staging_name(&table, "2024-01-01_00-00-00", 42);
        assert_eq!(name.len(), 63);
        assert!(name.starts_with("stage_aaaa"));
    }

    #[test]
    fn staging_name_short_is_untouched() {
        let name = ManagedTableDescriptor::staging_name("events", "2024-01-01_00-00-00", 42);
        assert_eq!(name, "stage_events_2024-01-01_00-00-00_42");
        assert!(name.len() <= 63);
    }
}
