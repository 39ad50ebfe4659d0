use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::schema::Schema;

/// One column's values, column-major, one variant per storage shape backing
/// the logical types of §4.2 (bit-width distinctions live in the schema, not
/// in storage: an `Int16` field's values are still carried as `i64`).
#[derive(Debug, Clone)]
pub enum ColumnData {
    Utf8(Vec<Option<String>>),
    Int(Vec<Option<i64>>),
    UInt(Vec<Option<u64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    TimestampTz(Vec<Option<DateTime<Utc>>>),
    TimestampNaive(Vec<Option<NaiveDateTime>>),
    ListUtf8(Vec<Option<Vec<String>>>),
    Json(Vec<Option<serde_json::Value>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Utf8(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::UInt(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::TimestampTz(v) => v.len(),
            ColumnData::TimestampNaive(v) => v.len(),
            ColumnData::ListUtf8(v) => v.len(),
            ColumnData::Json(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rough heap footprint, used by the queue to bound memory by bytes
    /// rather than row count (§4.5).
    pub fn approx_size_bytes(&self) -> usize {
        match self {
            ColumnData::Utf8(v) => v.iter().map(|s| s.as_deref().map_or(0, str::len) + 8).sum(),
            ColumnData::Int(v) => v.len() * 8,
            ColumnData::UInt(v) => v.len() * 8,
            ColumnData::Float(v) => v.len() * 8,
            ColumnData::Bool(v) => v.len(),
            ColumnData::TimestampTz(v) => v.len() * 12,
            ColumnData::TimestampNaive(v) => v.len() * 12,
            ColumnData::ListUtf8(v) => v
                .iter()
                .map(|l| l.as_ref().map_or(0, |l| l.iter().map(String::len).sum::<usize>() + 8))
                .sum(),
            ColumnData::Json(v) => v
                .iter()
                .map(|j| j.as_ref().map_or(0, |j| j.to_string().len()))
                .sum(),
        }
    }
}

/// A column-major block of rows sharing one `Schema`, analogous to an Arrow
/// `RecordBatch` but restricted to the logical types this pipeline supports.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub schema: Arc<Schema>,
    pub columns: Vec<ColumnData>,
    pub num_rows: usize,
    /// Monotone watermark (e.g. `_inserted_at`) of the last row in this
    /// batch; producers must emit batches in non-decreasing order of this
    /// value (§4.6).
    pub watermark: DateTime<Utc>,
}

impl RecordBatch {
    pub fn new(schema: Arc<Schema>, columns: Vec<ColumnData>, watermark: DateTime<Utc>) -> Self {
        let num_rows = columns.first().map_or(0, ColumnData::len);
        debug_assert!(columns.iter().all(|c| c.len() == num_rows));
        Self {
            schema,
            columns,
            num_rows,
            watermark,
        }
    }

    pub fn approx_size_bytes(&self) -> usize {
        self.columns.iter().map(ColumnData::approx_size_bytes).sum()
    }
}
