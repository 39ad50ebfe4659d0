use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgexport_queue::RecordBatchQueue;
use pgexport_source::{InMemorySource, Producer, SourceQuery};
use pgexport_types::{ColumnData, ExportError, Field, LogicalType, RecordBatch, Schema};
use tokio::sync::oneshot;

#[derive(serde::Deserialize)]
struct JsonBatchFile {
    schema: Schema,
    batches: Vec<JsonBatch>,
}

#[derive(serde::Deserialize)]
struct JsonBatch {
    watermark: DateTime<Utc>,
    rows: Vec<HashMap<String, serde_json::Value>>,
}

fn column_for_field(field: &Field, rows: &[HashMap<String, serde_json::Value>]) -> anyhow::Result<ColumnData> {
    let get = |row: &HashMap<String, serde_json::Value>| row.get(&field.name).cloned().unwrap_or(serde_json::Value::Null);

    Ok(match field.logical_type {
        LogicalType::String => ColumnData::Utf8(
            rows.iter()
                .map(|r| match get(r) {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s),
                    other => Some(other.to_string()),
                })
                .collect(),
        ),
        LogicalType::Int8 | LogicalType::Int16 | LogicalType::Int32 | LogicalType::Int64 => ColumnData::Int(
            rows.iter()
                .map(|r| get(r).as_i64())
                .collect(),
        ),
        LogicalType::UInt8 | LogicalType::UInt16 | LogicalType::UInt32 | LogicalType::UInt64 => ColumnData::UInt(
            rows.iter()
                .map(|r| get(r).as_u64())
                .collect(),
        ),
        LogicalType::Float32 | LogicalType::Float64 => {
            ColumnData::Float(rows.iter().map(|r| get(r).as_f64()).collect())
        }
        LogicalType::Bool => ColumnData::Bool(rows.iter().map(|r| get(r).as_bool()).collect()),
        LogicalType::TimestampTz => ColumnData::TimestampTz(
            rows.iter()
                .map(|r| match get(r) {
                    serde_json::Value::String(s) => DateTime::parse_from_rfc3339(&s).ok().map(|t| t.with_timezone(&Utc)),
                    _ => None,
                })
                .collect(),
        ),
        LogicalType::TimestampNaive => ColumnData::TimestampNaive(
            rows.iter()
                .map(|r| match get(r) {
                    serde_json::Value::String(s) => chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S").ok(),
                    _ => None,
                })
                .collect(),
        ),
        LogicalType::ListString => ColumnData::ListUtf8(
            rows.iter()
                .map(|r| match get(r) {
                    serde_json::Value::Array(items) => Some(
                        items
                            .into_iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect(),
                    ),
                    _ => None,
                })
                .collect(),
        ),
        LogicalType::Json => ColumnData::Json(
            rows.iter()
                .map(|r| match get(r) {
                    serde_json::Value::Null => None,
                    other => Some(other),
                })
                .collect(),
        ),
    })
}

fn build_batch(schema: Arc<Schema>, batch: JsonBatch) -> anyhow::Result<RecordBatch> {
    let columns = schema
        .fields
        .iter()
        .map(|field| column_for_field(field, &batch.rows).with_context(|| format!("column {:?}", field.name)))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(RecordBatch::new(schema, columns, batch.watermark))
}

/// A `Producer` that replays a fixed set of batches from a JSON file on disk
/// instead of querying a live OLAP source (spec §1: "the source-store query
/// layer... only its contract is specified"). This is the thin CLI-side
/// adapter a manual invocation of this binary uses in place of that external
/// collaborator; it delegates the actual windowing/done-ranges filtering to
/// the same in-memory reference implementation the test suite exercises.
pub struct FileSource {
    inner: InMemorySource,
}

impl FileSource {
    pub async fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let body = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading batches file {}", path.display()))?;
        let file: JsonBatchFile = serde_json::from_slice(&body).with_context(|| format!("parsing batches file {}", path.display()))?;
        if file.schema.fields.is_empty() {
            bail!("batches file schema has no fields");
        }
        let schema_arc = Arc::new(file.schema.clone());
        let mut batches = Vec::with_capacity(file.batches.len());
        for batch in file.batches {
            batches.push(build_batch(Arc::clone(&schema_arc), batch)?);
        }
        Ok(Self {
            inner: InMemorySource::new(file.schema, batches),
        })
    }
}

#[async_trait]
impl Producer for FileSource {
    async fn run(
        &self,
        query: SourceQuery,
        queue: Arc<RecordBatchQueue>,
        schema_tx: oneshot::Sender<Schema>,
    ) -> Result<(), ExportError> {
        self.inner.run(query, queue, schema_tx).await
    }
}
