use std::sync::Arc;

use async_trait::async_trait;
use pgexport_types::{ExportError, RecordBatch, Schema};
use tokio::sync::oneshot;

use crate::producer::Producer;
use crate::query::SourceQuery;

/// A fixed, pre-chunked in-memory source used by integration tests in place
/// of a live query engine. Batches whose watermark falls before the first
/// remaining range's start are treated as already covered by
/// `done_ranges` and skipped, mirroring how a real source would push the
/// `done_ranges` filter into its query. Mirrors the next-chunk eager-fetch
/// shape of a paginated HTTP source, generalized to time-range paging: each
/// chunk is prepared on its own task before being handed off to the queue.
pub struct InMemorySource {
    schema: Schema,
    batches: Vec<RecordBatch>,
    fail_after: Option<usize>,
}

impl InMemorySource {
    pub fn new(schema: Schema, batches: Vec<RecordBatch>) -> Self {
        Self {
            schema,
            batches,
            fail_after: None,
        }
    }

    /// Makes `run` return a `TransientSourceError` after emitting the given
    /// number of batches, for exercising partial-flush-then-retry scenarios.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }
}

#[async_trait]
impl Producer for InMemorySource {
    async fn run(
        &self,
        query: SourceQuery,
        queue: Arc<pgexport_queue::RecordBatchQueue>,
        schema_tx: oneshot::Sender<Schema>,
    ) -> Result<(), ExportError> {
        // The export window is half-open `(start, end]` (§4.9): a row whose
        // watermark equals a done range's end was already exported by it,
        // and must not be re-offered to this attempt.
        let remaining = query.remaining_ranges();
        let to_emit: Vec<&RecordBatch> = self
            .batches
            .iter()
            .filter(|b| {
                remaining
                    .iter()
                    .any(|(start, end)| b.watermark > *start && b.watermark <= *end)
            })
            .collect();

        if to_emit.is_empty() {
            // Drop schema_tx without sending: no data for this window.
            queue.mark_done().await;
            return Ok(());
        }

        let _ = schema_tx.send(self.schema.clone());

        for (i, batch) in to_emit.into_iter().enumerate() {
            if let Some(limit) = self.fail_after {
                if i >= limit {
                    let err = ExportError::TransientSourceError(anyhow::anyhow!(
                        "simulated source failure after {limit} batches"
                    ));
                    queue.mark_failed(ExportError::TransientSourceError(anyhow::anyhow!(
                        "simulated source failure after {limit} batches"
                    )))
                    .await;
                    return Err(err);
                }
            }

            let batch = batch.clone();
            let prepared = tokio::spawn(async move { batch }).await.map_err(|e| {
                ExportError::TransientSourceError(anyhow::anyhow!(e))
            })?;
            queue.put(prepared).await;
        }

        queue.mark_done().await;
        Ok(())
    }
}
