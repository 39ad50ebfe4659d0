use std::sync::Arc;

use chrono::{DateTime, Utc};
use pgexport_queue::RecordBatchQueue;
use pgexport_types::{ColumnData, Destination, ExportError, HeartbeatDetails};

use crate::heartbeat::{Heartbeater, HeartbeatSink};
use crate::spill::SpillFile;

fn pg_text_array_literal(items: &[String]) -> String {
    let escaped = items
        .iter()
        .map(|s| format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{escaped}}}")
}

fn column_value_to_string(column: &ColumnData, row: usize) -> String {
    match column {
        ColumnData::Utf8(v) => v[row].clone().unwrap_or_default(),
        ColumnData::Int(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
        ColumnData::UInt(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
        ColumnData::Float(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
        ColumnData::Bool(v) => v[row].map(|b| b.to_string()).unwrap_or_default(),
        ColumnData::TimestampTz(v) => v[row].map(|t| t.to_rfc3339()).unwrap_or_default(),
        ColumnData::TimestampNaive(v) => v[row].map(|t| t.to_string()).unwrap_or_default(),
        ColumnData::ListUtf8(v) => v[row]
            .as_ref()
            .map(|l| pg_text_array_literal(l))
            .unwrap_or_default(),
        ColumnData::Json(v) => v[row].as_ref().map(|j| j.to_string()).unwrap_or_default(),
    }
}

/// Drains the queue into a destination table, one spill-file flush at a
/// time (spec §4.7).
pub struct Consumer<D: Destination> {
    pg: Arc<D>,
    schema_name: String,
    table_name: String,
    destination_columns: Vec<String>,
    upload_chunk_size_bytes: u64,
}

impl<D: Destination> Consumer<D> {
    pub fn new(
        pg: Arc<D>,
        schema_name: String,
        table_name: String,
        destination_columns: Vec<String>,
        upload_chunk_size_bytes: u64,
    ) -> Self {
        Self {
            pg,
            schema_name,
            table_name,
            destination_columns,
            upload_chunk_size_bytes,
        }
    }

    /// Returns the total rows completed (including any already-resumed
    /// count carried in `details` on entry).
    pub async fn run<S: HeartbeatSink>(
        &self,
        queue: Arc<RecordBatchQueue>,
        heartbeater: &mut Heartbeater<S>,
        details: &mut HeartbeatDetails,
        fallback_start: DateTime<Utc>,
    ) -> Result<u64, ExportError> {
        let mut total_records_completed = details.records_completed;
        let mut spill = SpillFile::new();
        // A flush's done range always starts where the previous one (this
        // attempt's or a resumed one's) left off, never at the watermark of
        // its own first batch — otherwise consecutive flushes leave a gap
        // between them that `DoneRanges::remaining` would re-offer to the
        // producer on the next attempt.
        let mut last_done_end = details
            .done_ranges
            .ranges()
            .last()
            .map(|r| r.1)
            .unwrap_or(fallback_start);
        let mut current_end: Option<DateTime<Utc>> = None;

        loop {
            match queue.get().await {
                Ok(Some(batch)) => {
                    current_end = Some(batch.watermark);

                    let indices: Vec<usize> = self
                        .destination_columns
                        .iter()
                        .map(|name| {
                            batch
                                .schema
                                .fields
                                .iter()
                                .position(|f| &f.name == name)
                                .unwrap_or_else(|| {
                                    panic!("destination column {name:?} missing from batch schema")
                                })
                        })
                        .collect();

                    for row in 0..batch.num_rows {
                        let values: Vec<String> = indices
                            .iter()
                            .map(|&idx| column_value_to_string(&batch.columns[idx], row))
                            .collect();
                        spill.push_row(values);
                    }

                    if spill.bytes_buffered() >= self.upload_chunk_size_bytes {
                        let end = current_end.expect("a batch was just buffered");
                        total_records_completed += self
                            .flush(&mut spill, last_done_end, end, details, heartbeater)
                            .await?;
                        last_done_end = end;
                        current_end = None;
                    }
                }
                Ok(None) => {
                    if spill.row_count() > 0 {
                        let end = current_end.expect("buffered rows imply a batch was seen");
                        total_records_completed += self
                            .flush(&mut spill, last_done_end, end, details, heartbeater)
                            .await?;
                    }
                    break;
                }
                Err(err) => {
                    return Err(ExportError::Other(anyhow::anyhow!(err.to_string())));
                }
            }
        }

        Ok(total_records_completed)
    }

    async fn flush<S: HeartbeatSink>(
        &self,
        spill: &mut SpillFile,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        details: &mut HeartbeatDetails,
        heartbeater: &mut Heartbeater<S>,
    ) -> Result<u64, ExportError> {
        let _timer = pgexport_metrics::FLUSH_DURATION_SECONDS.start_timer();

        let flushed_rows = spill.row_count() as u64;
        let taken = std::mem::replace(spill, SpillFile::new());

        // Step 1: rewind (finalize writes then seeks to start).
        let file = taken
            .finalize()
            .await
            .map_err(|e| ExportError::Other(e.into()))?;

        // Step 2: COPY (sanitization happens inside).
        let reader: Box<dyn tokio::io::AsyncRead + Send + Unpin> = Box::new(file);
        let bytes_written = self
            .pg
            .copy_tsv_to_postgres(reader, &self.schema_name, &self.table_name, &self.destination_columns)
            .await?;

        // Step 3: metrics.
        pgexport_metrics::ROWS_EXPORTED_TOTAL.inc_by(flushed_rows);
        pgexport_metrics::BYTES_EXPORTED_TOTAL.inc_by(bytes_written);

        // Step 4: advance heartbeat details.
        details.record_flush(flushed_rows, Some(range_start), range_end, range_start);
        heartbeater.maybe_send(details).await;

        // Step 5: rotation happens implicitly — `spill` was already swapped
        // out for a fresh `SpillFile` above.
        Ok(flushed_rows)
    }
}
